//! M3U8 playlist parsing.
//!
//! Parses master playlists (variant streams) and media playlists (segments)
//! into plain data, and derives the live-edge window the adaptive client is
//! configured against.

use {
    regex::Regex,
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Attribute list entry: `NAME=value` or `NAME="quoted value"`.
const ATTRIBUTE_PATTERN: &str = r#"([A-Z0-9-]+)=("[^"]*"|[^,]*)"#;

/// `WIDTHxHEIGHT`.
const RESOLUTION_PATTERN: &str = r"^(\d+)x(\d+)$";

/// Error type for manifest parsing.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The first line is not `#EXTM3U`.
    #[error("Missing #EXTM3U header")]
    MissingHeader,
    /// A required tag is absent.
    #[error("Missing required tag {tag}")]
    MissingTag { tag: &'static str },
    /// A tag expecting a URI line was not followed by one.
    #[error("Line {line}: tag is not followed by a URI")]
    MissingUri { line: usize },
    /// A tag value could not be parsed.
    #[error("Line {line}: invalid value {value:?} for {tag}")]
    InvalidValue {
        line: usize,
        tag: &'static str,
        value: String,
    },
    /// A built-in pattern failed to compile.
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

/// One rendition listed in a master playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Media playlist URI, as written.
    pub uri: String,
    /// Peak bandwidth in bits per second.
    pub bandwidth: u64,
    /// Codec list, if declared.
    pub codecs: Option<String>,
    /// Video resolution, if declared.
    pub resolution: Option<(u32, u32)>,
}

/// Master playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterPlaylist {
    /// Variants in declaration order.
    pub variants: Vec<Variant>,
}

/// One media segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment URI, as written.
    pub uri: String,
    /// Duration in seconds.
    pub duration: f64,
    /// Optional title from `#EXTINF`.
    pub title: Option<String>,
}

/// Media playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPlaylist {
    /// `#EXT-X-TARGETDURATION` in seconds.
    pub target_duration: f64,
    /// `#EXT-X-MEDIA-SEQUENCE` (0 when absent).
    pub media_sequence: u64,
    /// Segments in playback order.
    pub segments: Vec<Segment>,
    /// `true` when `#EXT-X-ENDLIST` is present.
    pub ended: bool,
}

/// Live-edge positions derived from a media playlist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiveWindow {
    /// Playlist duration in seconds: the live edge.
    pub edge: f64,
    /// Position the client should sync to.
    pub sync_position: f64,
    /// Maximum tolerated distance behind the edge, in seconds.
    pub max_latency: f64,
}

impl MediaPlaylist {
    /// Total duration of all segments.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.segments.iter().map(|segment| segment.duration).sum()
    }

    /// Whether the playlist is still growing.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.ended
    }

    /// Computes the live window, or `None` for finished playlists.
    ///
    /// # Arguments
    ///
    /// * `sync_count` - Target durations to stay behind the edge.
    /// * `max_latency_count` - Target durations after which the client must resync.
    #[must_use]
    pub fn live_window(&self, sync_count: u32, max_latency_count: u32) -> Option<LiveWindow> {
        if self.ended {
            return None;
        }

        let edge = self.duration();
        Some(LiveWindow {
            edge,
            sync_position: (edge - f64::from(sync_count) * self.target_duration).max(0.0),
            max_latency: f64::from(max_latency_count) * self.target_duration,
        })
    }
}

/// Parsed playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Playlist {
    /// Variant list.
    Master(MasterPlaylist),
    /// Segment list.
    Media(MediaPlaylist),
}

/// Parses M3U8 text.
pub struct ManifestParser {
    /// Attribute list pattern.
    attributes: Regex,
    /// Resolution pattern.
    resolution: Regex,
}

impl ManifestParser {
    /// Compiles the parser's patterns.
    ///
    /// # Errors
    ///
    /// Returns `ManifestError::Pattern` if a pattern fails to compile.
    pub fn new() -> Result<Self, ManifestError> {
        Ok(Self {
            attributes: Regex::new(ATTRIBUTE_PATTERN)?,
            resolution: Regex::new(RESOLUTION_PATTERN)?,
        })
    }

    /// Parses a master or media playlist.
    ///
    /// # Arguments
    ///
    /// * `text` - Playlist body.
    ///
    /// # Errors
    ///
    /// Returns `ManifestError` if the header is missing, a URI line is
    /// missing, a numeric value is malformed, or a media playlist lacks
    /// `#EXT-X-TARGETDURATION`.
    pub fn parse(&self, text: &str) -> Result<Playlist, ManifestError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        match lines.next() {
            Some((_, "#EXTM3U")) => {}
            _ => return Err(ManifestError::MissingHeader),
        }

        let lines: Vec<(usize, &str)> = lines.collect();
        if lines
            .iter()
            .any(|(_, line)| line.starts_with("#EXT-X-STREAM-INF:"))
        {
            self.parse_master(&lines).map(Playlist::Master)
        } else {
            Self::parse_media(&lines).map(Playlist::Media)
        }
    }

    fn parse_master(&self, lines: &[(usize, &str)]) -> Result<MasterPlaylist, ManifestError> {
        let mut variants = Vec::new();
        let mut iter = lines.iter();

        while let Some(&(line_no, line)) = iter.next() {
            let Some(attributes) = line.strip_prefix("#EXT-X-STREAM-INF:") else {
                continue;
            };

            let mut bandwidth = None;
            let mut codecs = None;
            let mut resolution = None;
            for captures in self.attributes.captures_iter(attributes) {
                let value = captures[2].trim_matches('"');
                match &captures[1] {
                    "BANDWIDTH" => {
                        bandwidth = Some(value.parse::<u64>().map_err(|_| {
                            ManifestError::InvalidValue {
                                line: line_no,
                                tag: "BANDWIDTH",
                                value: value.to_string(),
                            }
                        })?);
                    }
                    "CODECS" => codecs = Some(value.to_string()),
                    "RESOLUTION" => resolution = self.parse_resolution(value),
                    _ => {}
                }
            }

            let uri = Self::next_uri(&mut iter).ok_or(ManifestError::MissingUri { line: line_no })?;
            variants.push(Variant {
                uri,
                bandwidth: bandwidth.ok_or(ManifestError::MissingTag { tag: "BANDWIDTH" })?,
                codecs,
                resolution,
            });
        }

        Ok(MasterPlaylist { variants })
    }

    fn parse_media(lines: &[(usize, &str)]) -> Result<MediaPlaylist, ManifestError> {
        let mut target_duration = None;
        let mut media_sequence = 0;
        let mut segments = Vec::new();
        let mut ended = false;
        let mut iter = lines.iter();

        while let Some(&(line_no, line)) = iter.next() {
            if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                target_duration = Some(parse_number(value, line_no, "EXT-X-TARGETDURATION")?);
            } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                media_sequence = value.trim().parse::<u64>().map_err(|_| {
                    ManifestError::InvalidValue {
                        line: line_no,
                        tag: "EXT-X-MEDIA-SEQUENCE",
                        value: value.to_string(),
                    }
                })?;
            } else if let Some(value) = line.strip_prefix("#EXTINF:") {
                let (duration, title) = match value.split_once(',') {
                    Some((duration, title)) => (duration, Some(title.trim())),
                    None => (value, None),
                };
                let duration = parse_number(duration, line_no, "EXTINF")?;
                let uri =
                    Self::next_uri(&mut iter).ok_or(ManifestError::MissingUri { line: line_no })?;
                segments.push(Segment {
                    uri,
                    duration,
                    title: title.filter(|t| !t.is_empty()).map(str::to_string),
                });
            } else if line == "#EXT-X-ENDLIST" {
                ended = true;
            }
        }

        Ok(MediaPlaylist {
            target_duration: target_duration.ok_or(ManifestError::MissingTag {
                tag: "EXT-X-TARGETDURATION",
            })?,
            media_sequence,
            segments,
            ended,
        })
    }

    fn parse_resolution(&self, value: &str) -> Option<(u32, u32)> {
        let captures = self.resolution.captures(value)?;
        Some((captures[1].parse().ok()?, captures[2].parse().ok()?))
    }

    /// Next non-tag line. Comments and unknown tags in between are skipped.
    fn next_uri<'a>(iter: &mut impl Iterator<Item = &'a (usize, &'a str)>) -> Option<String> {
        iter.find(|(_, line)| !line.starts_with('#'))
            .map(|(_, line)| (*line).to_string())
    }
}

fn parse_number(value: &str, line: usize, tag: &'static str) -> Result<f64, ManifestError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite() && *number >= 0.0)
        .ok_or_else(|| ManifestError::InvalidValue {
            line,
            tag,
            value: value.to_string(),
        })
}
