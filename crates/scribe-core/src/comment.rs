//! Comment thread attached to a document instance
//!
//! Comments live on two levels: an append-only event stream (so consumers
//! can diff incrementally, deletions included) and a materialized set of the
//! currently live comments. The stream version counts events and is
//! independent of the document step version.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mapping::{Assoc, Mapping};

/// A comment anchored to a position range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub from: usize,
    pub to: usize,
    pub text: String,
    pub author: String,
}

impl Comment {
    pub fn new(
        from: usize,
        to: usize,
        text: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from,
            to,
            text: text.into(),
            author: author.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommentEvent {
    Created { comment: Comment },
    Deleted { id: String },
}

/// The comment state of one instance.
#[derive(Debug, Default)]
pub struct Comments {
    comments: Vec<Comment>,
    events: Vec<CommentEvent>,
    version: u64,
}

impl Comments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted comment set. Each saved comment is replayed
    /// as a creation event so that clients diffing from zero see the full
    /// thread.
    pub fn from_saved(saved: Vec<Comment>) -> Self {
        let events = saved
            .iter()
            .cloned()
            .map(|comment| CommentEvent::Created { comment })
            .collect::<Vec<_>>();
        let version = events.len() as u64;
        Self {
            comments: saved,
            events,
            version,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Currently live comments (deleted ones excluded).
    pub fn live(&self) -> &[Comment] {
        &self.comments
    }

    pub fn created(&mut self, comment: Comment) {
        self.events.push(CommentEvent::Created {
            comment: comment.clone(),
        });
        self.comments.push(comment);
        self.version += 1;
    }

    /// Delete by id. Unknown ids are ignored; the deletion of a known
    /// comment stays in the event stream so diffing consumers observe it.
    pub fn deleted(&mut self, id: &str) {
        if let Some(idx) = self.comments.iter().position(|c| c.id == id) {
            self.comments.remove(idx);
            self.events.push(CommentEvent::Deleted { id: id.to_string() });
            self.version += 1;
        }
    }

    pub fn apply_event(&mut self, event: CommentEvent) {
        match event {
            CommentEvent::Created { comment } => self.created(comment),
            CommentEvent::Deleted { id } => self.deleted(&id),
        }
    }

    /// Re-anchor every live comment. `from` sticks to the right of
    /// insertions at its position, `to` to the left, so text typed at a
    /// comment's edge stays outside it. A range that a deletion collapses
    /// clamps to an empty range at the boundary; the comment itself is kept.
    pub fn map_through(&mut self, mapping: &Mapping) {
        for comment in &mut self.comments {
            comment.from = mapping.map(comment.from, Assoc::After);
            comment.to = mapping.map(comment.to, Assoc::Before);
            if comment.to < comment.from {
                comment.to = comment.from;
            }
        }
    }

    /// Events from `index` onward. An index beyond the stream yields an
    /// empty result. Creation events are reported with the comment's
    /// current (mapped) anchors when it is still live.
    pub fn events_after(&self, index: usize) -> Vec<CommentEvent> {
        if index >= self.events.len() {
            return Vec::new();
        }
        self.events[index..]
            .iter()
            .map(|event| match event {
                CommentEvent::Created { comment } => {
                    let current = self
                        .comments
                        .iter()
                        .find(|c| c.id == comment.id)
                        .unwrap_or(comment);
                    CommentEvent::Created {
                        comment: current.clone(),
                    }
                }
                deleted => deleted.clone(),
            })
            .collect()
    }
}
