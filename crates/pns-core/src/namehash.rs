//! Recursive keccak256 name-hash construction (EIP-137 shape).
//!
//! Every dotted name maps to a canonical 32-byte digest, independent of the
//! order in which names are observed. The digest doubles as the storage key
//! for name-addressed operations, so the fold below is load-bearing: any
//! deviation changes every derived node id.

use crate::primitives::{
    B256,
    NodeId,
    U256,
    keccak256,
};

/// Digest of the hierarchy root (the empty name).
pub const ROOT_NODE: B256 = B256::ZERO;

/// Label rendered for a parent that has no record yet.
pub const ROOT_LABEL: &str = "dot";

/// Computes the canonical 32-byte digest of a dotted name.
///
/// Labels are folded rightmost-first: `acc = keccak256(acc || keccak256(label))`,
/// starting from 32 zero bytes. The empty name returns the root digest
/// unchanged. Total over any string input; never fails.
pub fn namehash(name: &str) -> B256 {
    let mut node = ROOT_NODE;
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let label_hash = keccak256(label.as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(node.as_slice());
        buf[32..].copy_from_slice(label_hash.as_slice());
        node = keccak256(buf);
    }
    node
}

/// Normalizes a bare label to a fully-qualified name under `tld`.
///
/// Idempotent: an already-qualified name (or the bare TLD itself) passes
/// through unchanged, so `fqdn(fqdn(n, t), t) == fqdn(n, t)`.
pub fn fqdn(name: &str, tld: &str) -> String {
    if name == tld || name.ends_with(&format!(".{tld}")) {
        return name.to_string();
    }
    format!("{name}.{tld}")
}

/// Maps a contract-assigned token id into the canonical node-id space.
pub fn node_id(token: U256) -> NodeId {
    B256::from(token.to_be_bytes::<32>())
}

/// Big-integer decimal rendering of a node id, for integer-keyed consumers.
pub fn node_id_decimal(id: &NodeId) -> String {
    U256::from_be_bytes(id.0).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::b256;

    #[test]
    fn empty_name_is_root() {
        assert_eq!(namehash(""), ROOT_NODE);
        assert_eq!(namehash(""), B256::ZERO);
    }

    #[test]
    fn matches_reference_vectors() {
        // EIP-137 reference vectors; the construction is identical, only the
        // label strings differ between registries.
        assert_eq!(
            namehash("eth"),
            b256!("0x93cdeb708b7545dc668eb9280176169d1c33cfd8ed6f04690a0bcc88a93fc4ae")
        );
        assert_eq!(
            namehash("foo.eth"),
            b256!("0xde9b09fd7c5f901e23a3f19fecc54828e9c848539801e86591bd9801b019f84f")
        );
    }

    #[test]
    fn composition_is_the_two_step_fold() {
        // namehash("a.b") must equal one fold step applied to namehash("b").
        let parent = namehash("b");
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(parent.as_slice());
        buf[32..].copy_from_slice(keccak256("a".as_bytes()).as_slice());
        assert_eq!(namehash("a.b"), keccak256(buf));
    }

    #[test]
    fn deterministic_across_calls() {
        let first = namehash("alice.dot");
        for _ in 0..8 {
            assert_eq!(namehash("alice.dot"), first);
        }
        assert_ne!(namehash("alice.dot"), namehash("dot.alice"));
    }

    #[test]
    fn fqdn_appends_tld_once() {
        assert_eq!(fqdn("alice", ROOT_LABEL), "alice.dot");
        assert_eq!(fqdn("alice.dot", ROOT_LABEL), "alice.dot");
        assert_eq!(fqdn(&fqdn("alice", ROOT_LABEL), ROOT_LABEL), "alice.dot");
        assert_eq!(fqdn("dot", ROOT_LABEL), "dot");
        assert_eq!(fqdn("a.b.dot", ROOT_LABEL), "a.b.dot");
    }

    #[test]
    fn token_id_round_trips_through_decimal() {
        let token = U256::from(123_456_789_u64);
        let id = node_id(token);
        assert_eq!(node_id_decimal(&id), "123456789");
    }
}
