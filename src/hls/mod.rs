//! HLS playlist support.

pub mod manifest;

pub use manifest::{
    LiveWindow, ManifestError, ManifestParser, MasterPlaylist, MediaPlaylist, Playlist, Segment,
    Variant,
};
