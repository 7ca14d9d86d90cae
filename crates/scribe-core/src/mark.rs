//! Inline formatting marks

use serde::{Deserialize, Serialize};

/// A formatting mark carried by text nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mark {
    Strong,
    Em,
    Code,
    Strike,
    Link { href: String },
}
