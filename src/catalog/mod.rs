//! Stream targets and the playlist accessor.
//!
//! The catalog itself (persistence, favorites, import/export) lives outside
//! this crate. The engine only sees an ordered list of [`StreamTarget`]s
//! through the [`PlaylistAccessor`] it is constructed with.

use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

use {
    parking_lot::RwLock,
    serde::{Deserialize, Serialize},
};

/// A playable station.
///
/// Two targets are equal when their URLs match ignoring ASCII case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamTarget {
    /// Stream URL.
    pub url: String,
    /// Display name.
    pub name: String,
    /// Broadcast language, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl StreamTarget {
    /// Creates a target without a language.
    #[must_use]
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            language: None,
        }
    }

    /// Returns a copy with the language set.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Case-insensitive URL comparison.
    #[must_use]
    pub fn matches_url(&self, url: &str) -> bool {
        self.url.eq_ignore_ascii_case(url)
    }
}

impl PartialEq for StreamTarget {
    fn eq(&self, other: &Self) -> bool {
        self.matches_url(&other.url)
    }
}

impl Eq for StreamTarget {}

impl Hash for StreamTarget {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.to_ascii_lowercase().hash(state);
    }
}

/// Read-only view of the ordered target list.
pub trait PlaylistAccessor: Send {
    /// Number of targets.
    fn len(&self) -> usize;

    /// Target at `index`, if in range.
    fn get(&self, index: usize) -> Option<StreamTarget>;

    /// Whether the playlist has no targets.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the first target whose URL matches, ignoring case.
    fn position_of(&self, url: &str) -> Option<usize> {
        (0..self.len()).find(|&index| self.get(index).is_some_and(|t| t.matches_url(url)))
    }
}

/// Shared, replaceable target list.
///
/// The catalog provider keeps one clone and replaces the contents when its
/// data changes; the orchestrator reads through another clone.
#[derive(Debug, Clone, Default)]
pub struct SharedPlaylist {
    targets: Arc<RwLock<Vec<StreamTarget>>>,
}

impl SharedPlaylist {
    /// Creates a playlist holding `targets`.
    #[must_use]
    pub fn new(targets: Vec<StreamTarget>) -> Self {
        Self {
            targets: Arc::new(RwLock::new(targets)),
        }
    }

    /// Replaces every target.
    pub fn replace(&self, targets: Vec<StreamTarget>) {
        *self.targets.write() = targets;
    }

    /// Copy of the current targets.
    #[must_use]
    pub fn targets(&self) -> Vec<StreamTarget> {
        self.targets.read().clone()
    }
}

impl PlaylistAccessor for SharedPlaylist {
    fn len(&self) -> usize {
        self.targets.read().len()
    }

    fn get(&self, index: usize) -> Option<StreamTarget> {
        self.targets.read().get(index).cloned()
    }

    fn position_of(&self, url: &str) -> Option<usize> {
        self.targets.read().iter().position(|t| t.matches_url(url))
    }
}
