pub use alloy_primitives::{
    Address,
    B256,
    Bytes,
    FixedBytes,
    U256,
    address,
    b256,
    hex,
    keccak256,
};

/// Canonical node identifier: the 32-byte namehash digest, or a contract
/// token id mapped into the same space via its big-endian bytes.
pub type NodeId = B256;

/// Transaction hash, the reconciliation key within a node's history.
pub type TxHash = B256;
