//! Shared playlist with guarded, index-addressed edits
//!
//! Clients address items by position and prove they still mean the same item
//! by sending its primary URL. A guard that no longer matches means another
//! peer edited first; the request is dropped without touching anything.

use serde::{Deserialize, Serialize};

use super::peer::PeerSummary;
use crate::validation::{require_non_empty, Validate, ValidationIssue};

/// A subtitle track attached to a playlist item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    /// Primary URL; also the guard for edits and removals
    pub video: String,

    #[serde(default)]
    pub mirrors: Vec<String>,

    #[serde(default)]
    pub subtitles: Vec<Subtitle>,

    /// Who added the item; stamped by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_peer: Option<PeerSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_audio: Option<bool>,
}

impl PlaylistItem {
    pub fn new(video: impl Into<String>) -> Self {
        Self {
            video: video.into(),
            mirrors: Vec::new(),
            subtitles: Vec::new(),
            from_peer: None,
            is_audio: None,
        }
    }
}

impl Validate for PlaylistItem {
    fn collect_issues(&self, path: &str, issues: &mut Vec<ValidationIssue>) {
        require_non_empty(&self.video, &format!("{path}.video"), issues);
        for (index, mirror) in self.mirrors.iter().enumerate() {
            require_non_empty(mirror, &format!("{path}.mirrors[{index}]"), issues);
        }
        for (index, subtitle) in self.subtitles.iter().enumerate() {
            let sub_path = format!("{path}.subtitles[{index}]");
            require_non_empty(&subtitle.name, &format!("{sub_path}.name"), issues);
            require_non_empty(&subtitle.url, &format!("{sub_path}.url"), issues);
        }
    }
}

/// Result of a successful guarded removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    /// The active item itself was removed; playback must restart
    pub removed_current: bool,
}

/// Ordered items plus the active position
///
/// `index` is `Some(i)` with `i < items.len()` whenever a video is current.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playlist {
    items: Vec<PlaylistItem>,
    index: Option<usize>,
}

impl Playlist {
    /// A non-empty initial playlist starts on its first item
    pub fn new(items: Vec<PlaylistItem>) -> Self {
        let index = if items.is_empty() { None } else { Some(0) };
        Self { items, index }
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Active index as sent on the wire, `-1` when nothing is current
    pub fn wire_index(&self) -> i64 {
        self.index.map_or(-1, |index| index as i64)
    }

    pub fn current(&self) -> Option<&PlaylistItem> {
        self.index.and_then(|index| self.items.get(index))
    }

    /// Append without changing the active index
    pub fn append(&mut self, item: PlaylistItem) {
        self.items.push(item);
    }

    /// Remove `items[index]` if its video still equals `expected_video`
    pub fn remove(&mut self, index: usize, expected_video: &str) -> Option<Removal> {
        if self.items.get(index)?.video != expected_video {
            return None;
        }
        self.items.remove(index);

        let removed_current = match self.index {
            Some(current) if index < current => {
                self.index = Some(current - 1);
                false
            }
            Some(current) if index == current => {
                // The next item slides into place; fall back to the new tail.
                self.index = match self.items.len() {
                    0 => None,
                    len => Some(current.min(len - 1)),
                };
                true
            }
            _ => false,
        };

        Some(Removal { removed_current })
    }

    /// Replace mirrors and subtitles of `items[index]` when its video equals
    /// `replacement.video`
    pub fn edit(&mut self, index: usize, replacement: PlaylistItem) -> bool {
        match self.items.get_mut(index) {
            Some(item) if item.video == replacement.video => {
                item.mirrors = replacement.mirrors;
                item.subtitles = replacement.subtitles;
                true
            }
            _ => false,
        }
    }

    /// Make `index` the active item; out-of-range indices are refused
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        self.index = Some(index);
        true
    }
}
