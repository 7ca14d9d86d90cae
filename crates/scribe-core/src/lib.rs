//! Scribe Core - Collaborative Document Engine
//!
//! This crate provides the core functionality for Scribe:
//! - Rich-text document trees with steps and positional mapping
//! - Version-checked submission with incremental catch-up diffs
//! - Comments, cursors, and presence anchored to the document
//! - A bounded instance registry with debounced persistence

pub mod comment;
pub mod cursor;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod history;
pub mod instance;
pub mod mapping;
pub mod mark;
pub mod node;
pub mod persist;
pub mod registry;
pub mod scope;
pub mod step;
pub mod store;

pub use comment::{Comment, CommentEvent};
pub use cursor::{CursorSnapshot, Selection};
pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result};
pub use instance::{Applied, Diff, Instance, InstanceSummary, Member};
pub use mapping::{Assoc, Mapping, StepMap};
pub use mark::Mark;
pub use node::Node;
pub use scope::ScopeKey;
pub use step::{ClientStep, Step};
pub use store::{DocumentRecord, DocumentStore, StoreError, StoredUser};
