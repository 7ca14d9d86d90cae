//! A single live document
//!
//! An instance owns the authoritative document, its version counter, the
//! recent step log, and the ephemeral collaboration state (comments,
//! cursors, presence). All mutation goes through [`Instance::apply`], which
//! is strictly serial: a submission is accepted only against the exact
//! current version, and either commits whole or leaves no trace.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::comment::{Comment, CommentEvent, Comments};
use crate::cursor::{CursorSnapshot, Cursors, Selection};
use crate::encoding::{decode_steps, encode_steps};
use crate::error::{Error, Result};
use crate::history::merge_steps;
use crate::mapping::Mapping;
use crate::node::Node;
use crate::scope::ScopeKey;
use crate::step::ClientStep;
use crate::store::{DocumentRecord, StoredUser};

/// A participant as presented by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub email: String,
    pub name: String,
    pub durable_id: Option<String>,
}

#[derive(Debug, Clone)]
struct UserPresence {
    name: String,
    active: bool,
    durable_id: Option<String>,
}

/// The outcome of an accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Applied {
    pub version: u64,
    pub comment_version: u64,
    pub user_count: usize,
}

/// What a polling client gets back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diff {
    /// The caller already has everything.
    Unchanged,
    /// Incremental catch-up from the caller's version.
    Events {
        version: u64,
        steps: Vec<ClientStep>,
        comments: Vec<CommentEvent>,
        comment_version: u64,
        user_count: usize,
        cursors: Option<CursorSnapshot>,
    },
    /// The gap is not replayable; the caller must reload from this state.
    Resync {
        version: u64,
        doc: Node,
        comments: Vec<Comment>,
        comment_version: u64,
        user_count: usize,
        cursors: Option<CursorSnapshot>,
    },
}

/// One row of the engine's instance listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceSummary {
    pub key: ScopeKey,
    pub version: u64,
    pub user_count: usize,
    pub dirty: bool,
}

pub struct Instance {
    key: ScopeKey,
    doc: Node,
    version: u64,
    steps: Vec<ClientStep>,
    comments: Comments,
    cursors: Cursors,
    users: HashMap<String, UserPresence>,
    user_count: usize,
    /// How many trailing log entries still correspond 1:1 to versions.
    /// Hydration loads a merged log, so it starts at zero there.
    diffable: usize,
    dirty: bool,
    max_step_history: usize,
    pub(crate) last_active: Instant,
}

impl Instance {
    /// A brand-new document: a single empty paragraph at version zero. It is
    /// dirty from birth so it reaches the store even if nobody ever types.
    pub fn fresh(key: ScopeKey, max_step_history: usize) -> Self {
        Self {
            key,
            doc: Node::empty_doc(),
            version: 0,
            steps: Vec::new(),
            comments: Comments::new(),
            cursors: Cursors::new(),
            users: HashMap::new(),
            user_count: 0,
            diffable: 0,
            dirty: true,
            max_step_history,
            last_active: Instant::now(),
        }
    }

    /// Rebuild from a persisted record. Persisted users come back inactive;
    /// the merged step log cannot serve per-version diffs, so clients behind
    /// the hydrated version are resynced.
    pub fn hydrate(
        key: ScopeKey,
        record: DocumentRecord,
        max_step_history: usize,
    ) -> Result<Self> {
        record.doc.validate()?;
        let steps = decode_steps(&record.steps)?;
        let users = record
            .users
            .into_iter()
            .map(|u| {
                (
                    u.email.clone(),
                    UserPresence {
                        name: u.email,
                        active: false,
                        durable_id: Some(u.id),
                    },
                )
            })
            .collect();
        Ok(Self {
            key,
            doc: record.doc,
            version: record.version,
            steps,
            comments: Comments::from_saved(record.comments),
            cursors: Cursors::new(),
            users,
            user_count: 0,
            diffable: 0,
            dirty: false,
            max_step_history,
            last_active: Instant::now(),
        })
    }

    pub fn key(&self) -> &ScopeKey {
        &self.key
    }

    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn comment_version(&self) -> u64 {
        self.comments.version()
    }

    pub fn user_count(&self) -> usize {
        self.user_count
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn summary(&self) -> InstanceSummary {
        InstanceSummary {
            key: self.key.clone(),
            version: self.version,
            user_count: self.user_count,
            dirty: self.dirty,
        }
    }

    /// Accept a submission made against `base_version`. Steps are applied in
    /// order to a working copy; comment events follow after existing anchors
    /// have been mapped through the new steps. Any failure rejects the whole
    /// submission and the instance is left exactly as it was.
    pub fn apply(
        &mut self,
        base_version: u64,
        steps: Vec<ClientStep>,
        comment_events: Vec<CommentEvent>,
    ) -> Result<Applied> {
        self.last_active = Instant::now();
        if base_version != self.version {
            return Err(Error::VersionMismatch {
                submitted: base_version,
                current: self.version,
            });
        }

        let mut working = self.doc.clone();
        let mut mapping = Mapping::new();
        for entry in &steps {
            let (next, map) = entry.step.apply(&working)?;
            working = next;
            mapping.append_map(map);
        }

        let applied = steps.len();
        self.doc = working;
        self.version += applied as u64;
        self.steps.extend(steps);
        self.diffable += applied;
        if self.steps.len() > self.max_step_history {
            let excess = self.steps.len() - self.max_step_history;
            self.steps.drain(..excess);
            self.diffable = self.diffable.min(self.steps.len());
        }

        if !mapping.is_empty() {
            self.comments.map_through(&mapping);
            self.cursors.map_through(&mapping);
        }
        for event in comment_events {
            self.comments.apply_event(event);
        }

        self.dirty = true;
        debug!(key = %self.key, version = self.version, applied, "applied submission");
        Ok(Applied {
            version: self.version,
            comment_version: self.comments.version(),
            user_count: self.user_count,
        })
    }

    /// Catch a client up from the versions it has seen. Asking about a
    /// version the instance has not reached is a mismatch; a gap older than
    /// the replayable log tail falls back to a full resync.
    pub fn diff_since(
        &mut self,
        version: u64,
        comment_version: u64,
        cursor_version: u64,
    ) -> Result<Diff> {
        self.last_active = Instant::now();
        if version > self.version {
            return Err(Error::VersionMismatch {
                submitted: version,
                current: self.version,
            });
        }

        let behind = (self.version - version) as usize;
        if behind > self.diffable {
            return Ok(Diff::Resync {
                version: self.version,
                doc: self.doc.clone(),
                comments: self.comments.live().to_vec(),
                comment_version: self.comments.version(),
                user_count: self.user_count,
                cursors: self.cursors.list_since(cursor_version),
            });
        }

        let comments = self.comments.events_after(comment_version as usize);
        let cursors = self.cursors.list_since(cursor_version);
        if behind == 0 && comments.is_empty() && cursors.is_none() {
            return Ok(Diff::Unchanged);
        }
        Ok(Diff::Events {
            version: self.version,
            steps: self.steps[self.steps.len() - behind..].to_vec(),
            comments,
            comment_version: self.comments.version(),
            user_count: self.user_count,
            cursors,
        })
    }

    /// The complete current state, shaped as a resync so connecting clients
    /// and resyncing clients load the same payload.
    pub fn current_state(&mut self, cursor_version: u64) -> Diff {
        self.last_active = Instant::now();
        Diff::Resync {
            version: self.version,
            doc: self.doc.clone(),
            comments: self.comments.live().to_vec(),
            comment_version: self.comments.version(),
            user_count: self.user_count,
            cursors: self.cursors.list_since(cursor_version),
        }
    }

    /// Announce a participant. Registration is idempotent per email; a
    /// durable identity supplied later is merged in. Any cursor left behind
    /// under the same display name is stale and dropped.
    pub fn register_presence(&mut self, member: &Member) {
        self.last_active = Instant::now();
        self.cursors.remove(&member.name);
        match self.users.get_mut(&member.email) {
            Some(existing) => {
                existing.name = member.name.clone();
                if existing.durable_id.is_none() {
                    existing.durable_id = member.durable_id.clone();
                }
                if !existing.active {
                    existing.active = true;
                    self.user_count += 1;
                }
            }
            None => {
                self.users.insert(
                    member.email.clone(),
                    UserPresence {
                        name: member.name.clone(),
                        active: true,
                        durable_id: member.durable_id.clone(),
                    },
                );
                self.user_count += 1;
            }
        }
        self.dirty = true;
    }

    /// A participant left: deactivate them and drop their cursor. Unknown
    /// participants are ignored.
    pub fn remove_presence(&mut self, member: &Member) {
        self.last_active = Instant::now();
        self.cursors.remove(&member.name);
        if let Some(existing) = self.users.get_mut(&member.email) {
            if existing.active {
                existing.active = false;
                self.user_count = self.user_count.saturating_sub(1);
            }
        }
    }

    pub fn update_cursor(&mut self, member: &Member, selection: Selection) {
        self.last_active = Instant::now();
        self.cursors.update(member.name.clone(), selection);
    }

    /// Capture the persistable state. The step log is compacted before
    /// encoding; only participants with a durable identity are kept.
    pub fn snapshot(&self) -> Result<DocumentRecord> {
        let merged = merge_steps(self.steps.clone());
        let users = self
            .users
            .iter()
            .filter_map(|(email, presence)| {
                presence.durable_id.as_ref().map(|id| StoredUser {
                    email: email.clone(),
                    id: id.clone(),
                })
            })
            .collect();
        Ok(DocumentRecord {
            version: self.version,
            doc: self.doc.clone(),
            comments: self.comments.live().to_vec(),
            steps: encode_steps(&merged)?,
            users,
        })
    }

    /// Acknowledge a completed write. Clears the dirty flag only when no
    /// newer submission landed while the snapshot was in flight.
    pub fn mark_clean(&mut self, written_version: u64) {
        if self.version == written_version {
            self.dirty = false;
        }
    }
}
