//! Step log compaction
//!
//! Before a snapshot is written, runs of steps from the same client are
//! folded together where the step algebra allows it. The merged log replays
//! to the same document but no longer has one entry per version, which is
//! why hydrated instances cannot serve incremental diffs until new steps
//! arrive.

use crate::step::ClientStep;

/// Fold mergeable neighbours from the same client. One pass is maximal:
/// each surviving entry absorbed every immediately following step it could.
pub fn merge_steps(steps: Vec<ClientStep>) -> Vec<ClientStep> {
    let mut merged: Vec<ClientStep> = Vec::with_capacity(steps.len());
    for entry in steps {
        match merged.last_mut() {
            Some(last) if last.client_id == entry.client_id => {
                if let Some(combined) = last.step.merge(&entry.step) {
                    last.step = combined;
                } else {
                    merged.push(entry);
                }
            }
            _ => merged.push(entry),
        }
    }
    merged
}
