//! Step log wire format
//!
//! Persisted step logs are MessagePack with named fields; the tagged step
//! enums need map encoding, the compact array form cannot represent them.

use crate::error::{Error, Result};
use crate::step::ClientStep;

pub fn encode_steps(steps: &[ClientStep]) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(steps).map_err(|e| Error::Encoding(e.to_string()))
}

pub fn decode_steps(bytes: &[u8]) -> Result<Vec<ClientStep>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    rmp_serde::from_slice(bytes).map_err(|e| Error::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mark::Mark;
    use crate::node::Node;
    use crate::step::Step;

    #[test]
    fn test_round_trip_preserves_steps() {
        let steps = vec![
            ClientStep {
                client_id: "c1".into(),
                step: Step::InsertText {
                    pos: 1,
                    text: "hé".into(),
                    marks: vec![Mark::Strong, Mark::Link { href: "x".into() }],
                },
            },
            ClientStep {
                client_id: "c2".into(),
                step: Step::InsertNode {
                    pos: 3,
                    node: Node::Image {
                        src: "a.png".into(),
                        alt: String::new(),
                    },
                },
            },
            ClientStep {
                client_id: "c1".into(),
                step: Step::DeleteNode { pos: 0 },
            },
        ];
        let bytes = encode_steps(&steps).unwrap();
        assert_eq!(decode_steps(&bytes).unwrap(), steps);
    }

    #[test]
    fn test_empty_blob_decodes_to_empty_log() {
        assert!(decode_steps(&[]).unwrap().is_empty());
        assert!(decode_steps(&encode_steps(&[]).unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_reported() {
        assert!(matches!(
            decode_steps(&[0xc1, 0xff, 0x00]),
            Err(Error::Encoding(_))
        ));
    }
}
