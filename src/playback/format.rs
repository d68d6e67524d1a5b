//! Stream format detection from the URL alone.
//!
//! No request is made: the decision is taken from the path extension and
//! from the query hints some station directories append.

use crate::playback::controller::StreamKind;

/// Query hints that mark an adaptive stream.
const ADAPTIVE_QUERY_HINTS: [(&str, &str); 3] =
    [("format", "m3u8"), ("type", "hls"), ("type", "m3u8")];

/// Classifies a stream URL.
///
/// A URL is adaptive when its path ends in `.m3u8` (case-insensitive), or
/// when the query carries `format=m3u8` or `type=hls`. Everything else is
/// played directly.
///
/// # Arguments
///
/// * `url` - Stream URL as supplied by the catalog.
///
/// # Returns
///
/// The controller flavour to use.
#[must_use]
pub fn detect_stream_format(url: &str) -> StreamKind {
    let without_fragment = url.split('#').next().unwrap_or_default();
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    };

    if path.to_ascii_lowercase().ends_with(".m3u8") {
        return StreamKind::Adaptive;
    }

    let hinted = query.is_some_and(|query| {
        query.split('&').any(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            ADAPTIVE_QUERY_HINTS
                .iter()
                .any(|(k, v)| key.eq_ignore_ascii_case(k) && value.eq_ignore_ascii_case(v))
        })
    });

    if hinted {
        StreamKind::Adaptive
    } else {
        StreamKind::Direct
    }
}

#[cfg(test)]
mod tests {
    use crate::playback::{controller::StreamKind, format::detect_stream_format};

    #[test]
    fn test_manifest_extension_is_adaptive() {
        assert_eq!(
            detect_stream_format("https://cdn.example/live/master.m3u8"),
            StreamKind::Adaptive
        );
        assert_eq!(
            detect_stream_format("https://cdn.example/LIVE/INDEX.M3U8?token=abc#t=10"),
            StreamKind::Adaptive
        );
    }

    #[test]
    fn test_query_hints() {
        assert_eq!(
            detect_stream_format("https://radio.example/stream?format=m3u8"),
            StreamKind::Adaptive
        );
        assert_eq!(
            detect_stream_format("https://radio.example/stream?id=4&type=HLS"),
            StreamKind::Adaptive
        );
        assert_eq!(
            detect_stream_format("https://radio.example/stream?type=mp3"),
            StreamKind::Direct
        );
    }

    #[test]
    fn test_plain_streams_are_direct() {
        assert_eq!(
            detect_stream_format("https://radio.example/live.mp3"),
            StreamKind::Direct
        );
        assert_eq!(
            detect_stream_format("https://radio.example/m3u8/live.aac"),
            StreamKind::Direct
        );
        assert_eq!(
            detect_stream_format("https://radio.example/a#.m3u8"),
            StreamKind::Direct
        );
        assert_eq!(detect_stream_format(""), StreamKind::Direct);
    }
}
