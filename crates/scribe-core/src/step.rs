//! Atomic document transformations
//!
//! A step is the unit of change clients submit and the unit the instance
//! logs. The set is closed: each variant knows how to apply itself to a
//! document, report its positional effect, merge with a successor, and
//! invert against the document it was applied to.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mapping::StepMap;
use crate::mark::Mark;
use crate::node::Node;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    InsertText {
        pos: usize,
        text: String,
        #[serde(default)]
        marks: Vec<Mark>,
    },
    DeleteText {
        from: usize,
        to: usize,
    },
    AddMark {
        from: usize,
        to: usize,
        mark: Mark,
    },
    RemoveMark {
        from: usize,
        to: usize,
        mark: Mark,
    },
    InsertNode {
        pos: usize,
        node: Node,
    },
    DeleteNode {
        pos: usize,
    },
}

/// A step together with the client that produced it. History entries and
/// persisted logs keep the attribution so clients can recognize their own
/// steps when diffing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientStep {
    pub client_id: String,
    pub step: Step,
}

impl Step {
    /// Apply to a document, producing the next document and the step's
    /// positional map. The input document is never modified; on failure the
    /// working copy is discarded, so a failed step has no effect at all.
    pub fn apply(&self, doc: &Node) -> Result<(Node, StepMap)> {
        let mut next = doc.clone();
        let map = match self {
            Step::InsertText { pos, text, marks } => {
                if text.is_empty() {
                    return Err(Error::InvalidStep("empty text insertion".into()));
                }
                next.insert_text(*pos, text, marks)?;
                StepMap::new(vec![(*pos, 0, text.chars().count())])
            }
            Step::DeleteText { from, to } => {
                next.delete_text(*from, *to)?;
                StepMap::new(vec![(*from, to - from, 0)])
            }
            Step::AddMark { from, to, mark } => {
                next.mark_range(*from, *to, mark, true)?;
                StepMap::empty()
            }
            Step::RemoveMark { from, to, mark } => {
                next.mark_range(*from, *to, mark, false)?;
                StepMap::empty()
            }
            Step::InsertNode { pos, node } => {
                next.insert_node(*pos, node.clone())?;
                StepMap::new(vec![(*pos, 0, node.size())])
            }
            Step::DeleteNode { pos } => {
                let size = doc
                    .node_at(*pos)
                    .map(Node::size)
                    .ok_or_else(|| Error::InvalidStep(format!("no node at position {pos}")))?;
                next.delete_node(*pos)?;
                StepMap::new(vec![(*pos, size, 0)])
            }
        };
        Ok((next, map))
    }

    /// Try to combine with a step that was applied immediately after this
    /// one. Returns the single equivalent step, or `None` when the pair
    /// cannot be expressed as one step.
    pub fn merge(&self, other: &Step) -> Option<Step> {
        match (self, other) {
            (
                Step::InsertText { pos, text, marks },
                Step::InsertText {
                    pos: other_pos,
                    text: other_text,
                    marks: other_marks,
                },
            ) if marks == other_marks
                && *other_pos >= *pos
                && *other_pos <= pos + text.chars().count() =>
            {
                Some(Step::InsertText {
                    pos: *pos,
                    text: splice(text, other_pos - pos, other_text),
                    marks: marks.clone(),
                })
            }
            (
                Step::DeleteText { from, to },
                Step::DeleteText {
                    from: other_from,
                    to: other_to,
                },
            ) => {
                if *other_to == *from {
                    // deleting backwards: the second range sits right before
                    // the first in the original document
                    Some(Step::DeleteText {
                        from: *other_from,
                        to: *to,
                    })
                } else if *other_from == *from {
                    // deleting forwards at the same spot
                    Some(Step::DeleteText {
                        from: *from,
                        to: to + (other_to - other_from),
                    })
                } else {
                    None
                }
            }
            (
                Step::AddMark { from, to, mark },
                Step::AddMark {
                    from: other_from,
                    to: other_to,
                    mark: other_mark,
                },
            ) if mark == other_mark && *other_from <= *to && *from <= *other_to => {
                Some(Step::AddMark {
                    from: *from.min(other_from),
                    to: *to.max(other_to),
                    mark: mark.clone(),
                })
            }
            (
                Step::RemoveMark { from, to, mark },
                Step::RemoveMark {
                    from: other_from,
                    to: other_to,
                    mark: other_mark,
                },
            ) if mark == other_mark && *other_from <= *to && *from <= *other_to => {
                Some(Step::RemoveMark {
                    from: *from.min(other_from),
                    to: *to.max(other_to),
                    mark: mark.clone(),
                })
            }
            _ => None,
        }
    }

    /// The step that undoes this one, derived against the document the step
    /// was applied to. Deletions spanning mixed inline content cannot be
    /// expressed as a single inverse step and are reported as invalid.
    pub fn invert(&self, before: &Node) -> Result<Step> {
        match self {
            Step::InsertText { pos, text, .. } => Ok(Step::DeleteText {
                from: *pos,
                to: pos + text.chars().count(),
            }),
            Step::DeleteText { from, to } => {
                let slice = before.inline_slice(*from, *to)?;
                match slice.as_slice() {
                    [Node::Text { text, marks }] => Ok(Step::InsertText {
                        pos: *from,
                        text: text.clone(),
                        marks: marks.clone(),
                    }),
                    [node] if node.is_inline() => Ok(Step::InsertNode {
                        pos: *from,
                        node: node.clone(),
                    }),
                    _ => Err(Error::InvalidStep(
                        "cannot invert a deletion spanning mixed inline content".into(),
                    )),
                }
            }
            Step::AddMark { from, to, mark } => Ok(Step::RemoveMark {
                from: *from,
                to: *to,
                mark: mark.clone(),
            }),
            Step::RemoveMark { from, to, mark } => Ok(Step::AddMark {
                from: *from,
                to: *to,
                mark: mark.clone(),
            }),
            Step::InsertNode { pos, .. } => Ok(Step::DeleteNode { pos: *pos }),
            Step::DeleteNode { pos } => {
                let node = before
                    .node_at(*pos)
                    .cloned()
                    .ok_or_else(|| Error::InvalidStep(format!("no node at position {pos}")))?;
                Ok(Step::InsertNode { pos: *pos, node })
            }
        }
    }
}

/// Insert `insert` into `base` at character index `at`.
fn splice(base: &str, at: usize, insert: &str) -> String {
    let byte = base
        .char_indices()
        .nth(at)
        .map_or(base.len(), |(i, _)| i);
    let mut out = String::with_capacity(base.len() + insert.len());
    out.push_str(&base[..byte]);
    out.push_str(insert);
    out.push_str(&base[byte..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(text: &str) -> Node {
        Node::Doc {
            content: vec![Node::Paragraph {
                content: vec![Node::text(text)],
            }],
        }
    }

    #[test]
    fn test_apply_leaves_input_untouched() {
        let doc = doc_with("hello");
        let step = Step::InsertText {
            pos: 6,
            text: "!".into(),
            marks: vec![],
        };
        let (next, _) = step.apply(&doc).unwrap();
        assert_eq!(doc.text_content(), "hello");
        assert_eq!(next.text_content(), "hello!");
    }

    #[test]
    fn test_apply_failure_reports_invalid_step() {
        let doc = doc_with("hello");
        let step = Step::DeleteText { from: 3, to: 20 };
        assert!(matches!(step.apply(&doc), Err(Error::InvalidStep(_))));
    }

    #[test]
    fn test_replay_is_deterministic() {
        let steps = vec![
            Step::InsertText {
                pos: 6,
                text: " world".into(),
                marks: vec![],
            },
            Step::AddMark {
                from: 1,
                to: 6,
                mark: Mark::Strong,
            },
            Step::DeleteText { from: 1, to: 3 },
        ];
        let replay = |mut doc: Node| -> Node {
            for step in &steps {
                let (next, _) = step.apply(&doc).unwrap();
                doc = next;
            }
            doc
        };
        let a = replay(doc_with("hello"));
        let b = replay(doc_with("hello"));
        assert_eq!(a, b);
        assert_eq!(a.text_content(), "llo world");
    }

    #[test]
    fn test_merge_adjacent_insertions() {
        let a = Step::InsertText {
            pos: 1,
            text: "ab".into(),
            marks: vec![],
        };
        let b = Step::InsertText {
            pos: 3,
            text: "c".into(),
            marks: vec![],
        };
        let merged = a.merge(&b).unwrap();
        assert_eq!(
            merged,
            Step::InsertText {
                pos: 1,
                text: "abc".into(),
                marks: vec![]
            }
        );

        // merged step equals sequential application
        let doc = doc_with("xy");
        let (after_a, _) = a.apply(&doc).unwrap();
        let (sequential, _) = b.apply(&after_a).unwrap();
        let (combined, _) = merged.apply(&doc).unwrap();
        assert_eq!(sequential, combined);
    }

    #[test]
    fn test_merge_insertion_into_middle() {
        let a = Step::InsertText {
            pos: 1,
            text: "ac".into(),
            marks: vec![],
        };
        let b = Step::InsertText {
            pos: 2,
            text: "b".into(),
            marks: vec![],
        };
        assert_eq!(
            a.merge(&b).unwrap(),
            Step::InsertText {
                pos: 1,
                text: "abc".into(),
                marks: vec![]
            }
        );
    }

    #[test]
    fn test_merge_backspace_deletions() {
        // "abcd": delete "c" then delete "b"
        let a = Step::DeleteText { from: 3, to: 4 };
        let b = Step::DeleteText { from: 2, to: 3 };
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged, Step::DeleteText { from: 2, to: 4 });

        let doc = doc_with("abcd");
        let (after_a, _) = a.apply(&doc).unwrap();
        let (sequential, _) = b.apply(&after_a).unwrap();
        let (combined, _) = merged.apply(&doc).unwrap();
        assert_eq!(sequential.text_content(), "ad");
        assert_eq!(sequential, combined);
    }

    #[test]
    fn test_merge_forward_deletions() {
        let a = Step::DeleteText { from: 2, to: 3 };
        let b = Step::DeleteText { from: 2, to: 3 };
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged, Step::DeleteText { from: 2, to: 4 });
    }

    #[test]
    fn test_merge_mark_ranges() {
        let a = Step::AddMark {
            from: 1,
            to: 4,
            mark: Mark::Em,
        };
        let b = Step::AddMark {
            from: 4,
            to: 6,
            mark: Mark::Em,
        };
        assert_eq!(
            a.merge(&b).unwrap(),
            Step::AddMark {
                from: 1,
                to: 6,
                mark: Mark::Em
            }
        );
        // disjoint ranges stay separate
        let c = Step::AddMark {
            from: 8,
            to: 9,
            mark: Mark::Em,
        };
        assert!(a.merge(&c).is_none());
    }

    #[test]
    fn test_unrelated_steps_do_not_merge() {
        let a = Step::InsertText {
            pos: 1,
            text: "x".into(),
            marks: vec![],
        };
        let b = Step::DeleteText { from: 1, to: 2 };
        assert!(a.merge(&b).is_none());
        // insertion far from the first one
        let c = Step::InsertText {
            pos: 5,
            text: "y".into(),
            marks: vec![],
        };
        assert!(a.merge(&c).is_none());
    }

    #[test]
    fn test_invert_round_trips() {
        let doc = doc_with("hello");
        let step = Step::DeleteText { from: 2, to: 4 };
        let (after, _) = step.apply(&doc).unwrap();
        let inverse = step.invert(&doc).unwrap();
        let (restored, _) = inverse.apply(&after).unwrap();
        assert_eq!(restored, doc);

        let step = Step::InsertText {
            pos: 3,
            text: "xyz".into(),
            marks: vec![],
        };
        let (after, _) = step.apply(&doc).unwrap();
        let (restored, _) = step.invert(&doc).unwrap().apply(&after).unwrap();
        assert_eq!(restored, doc);
    }

    #[test]
    fn test_invert_node_steps() {
        let doc = doc_with("hello");
        let step = Step::InsertNode {
            pos: 7,
            node: Node::Paragraph {
                content: vec![Node::text("new")],
            },
        };
        let (after, _) = step.apply(&doc).unwrap();
        let (restored, _) = step.invert(&doc).unwrap().apply(&after).unwrap();
        assert_eq!(restored, doc);

        let step = Step::DeleteNode { pos: 0 };
        let (after, _) = step.apply(&doc).unwrap();
        let (restored, _) = step.invert(&doc).unwrap().apply(&after).unwrap();
        assert_eq!(restored, doc);
    }
}
