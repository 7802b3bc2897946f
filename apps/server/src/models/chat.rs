//! Chat entries and their rich-text facets

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::peer::PeerSummary;
use crate::validation::{require_non_empty, Validate, ValidationIssue};

/// Formatting span over a chat message, offsets in UTF-16 code units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatFacet {
    Link { start: u32, end: u32, link: String },
    Strong { start: u32, end: u32 },
    Emphasis { start: u32, end: u32 },
    CustomEmoji { start: u32, end: u32, id: String },
    Color { start: u32, end: u32, color: String },
}

impl ChatFacet {
    pub fn span(&self) -> (u32, u32) {
        match self {
            Self::Link { start, end, .. }
            | Self::Strong { start, end }
            | Self::Emphasis { start, end }
            | Self::CustomEmoji { start, end, .. }
            | Self::Color { start, end, .. } => (*start, *end),
        }
    }
}

impl Validate for ChatFacet {
    fn collect_issues(&self, path: &str, issues: &mut Vec<ValidationIssue>) {
        let (start, end) = self.span();
        if start > end {
            issues.push(ValidationIssue::new(
                path,
                format!("start ({start}) must not exceed end ({end})"),
            ));
        }
        match self {
            Self::Link { link, .. } => require_non_empty(link, &format!("{path}.link"), issues),
            Self::CustomEmoji { id, .. } => require_non_empty(id, &format!("{path}.id"), issues),
            Self::Color { color, .. } => require_non_empty(color, &format!("{path}.color"), issues),
            Self::Strong { .. } | Self::Emphasis { .. } => {}
        }
    }
}

/// One line of chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub from: PeerSummary,
    pub text: String,
    #[serde(default)]
    pub facets: Vec<ChatFacet>,
    /// Synthetic joined/left lines; clients render `from.nickname` before `text`
    #[serde(default)]
    pub system: bool,
}

impl ChatEntry {
    pub fn message(from: PeerSummary, text: String, facets: Vec<ChatFacet>) -> Self {
        Self {
            from,
            text,
            facets,
            system: false,
        }
    }

    pub fn joined(peer: PeerSummary) -> Self {
        Self {
            text: "joined".into(),
            from: peer,
            facets: Vec::new(),
            system: true,
        }
    }

    pub fn left(peer: PeerSummary) -> Self {
        Self {
            text: "left".into(),
            from: peer,
            facets: Vec::new(),
            system: true,
        }
    }
}

/// Append-only history that forgets its oldest entries past `limit`
#[derive(Debug, Clone)]
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
    limit: usize,
}

impl ChatLog {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    pub fn push(&mut self, entry: ChatEntry) {
        if self.limit == 0 {
            return;
        }
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<ChatEntry> {
        self.entries.iter().cloned().collect()
    }
}
