//! Decoded feed items: the inbound interface of the indexer.
//!
//! The subscription/decoding layer is external; it delivers one [`FeedItem`]
//! at a time, already parsed into strongly-typed arguments. Events carry the
//! block timestamp and transaction hash; calls additionally carry the sender
//! and the chain-reported success flag.

use crate::primitives::{
    Address,
    Bytes,
    TxHash,
    U256,
};

use serde::{
    Deserialize,
    Serialize,
};

/// Context common to every contract event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    /// Block timestamp in seconds.
    pub block_timestamp: u64,
    pub tx_hash: TxHash,
}

/// Context common to every traced contract call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMeta {
    pub tx_hash: TxHash,
    /// Call sender.
    pub from: Address,
    /// Chain-reported outcome. Failed calls are still recorded.
    pub success: bool,
    /// Call timestamp in seconds.
    pub timestamp: u64,
}

/// Decoded registry/controller/resolver events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    NewSubdomain {
        to: Address,
        token_id: U256,
        subtoken_id: U256,
        name: String,
    },
    Transfer {
        from: Address,
        to: Address,
        token_id: U256,
    },
    NameRegistered {
        to: Address,
        node: U256,
        cost: U256,
        expires: U256,
        name: String,
    },
    NameRenewed {
        node: U256,
        cost: U256,
        expires: U256,
        name: String,
    },
    CapacityUpdated {
        token_id: U256,
        capacity: U256,
    },
    PriceChanged {
        base_prices: Vec<U256>,
        rent_prices: Vec<U256>,
    },
    Approval {
        owner: Address,
        approved: Address,
        token_id: U256,
    },
    ApprovalForAll {
        owner: Address,
        operator: Address,
        approved: bool,
    },
    NewResolver {
        token_id: U256,
        resolver: Address,
    },
    NewKey {
        key_index: String,
        key: String,
    },
    ResetRecords {
        token_id: U256,
    },
    Set {
        token_id: U256,
        key_hash: U256,
        value: String,
    },
    SetName {
        addr: Address,
        token_id: U256,
    },
    SetNftName {
        nft_addr: Address,
        nft_token_id: U256,
        token_id: U256,
    },
    PnsConfigUpdated {
        flags: U256,
    },
    ControllerConfigUpdated {
        flags: U256,
    },
    ManagerChanged {
        manager: Address,
        role: bool,
    },
    RootOwnershipTransferred {
        old_root: Address,
        new_root: Address,
    },
    MetadataUpdated {
        data: Vec<U256>,
    },
}

/// Decoded controller calls. These address nodes by human-readable name,
/// so the dispatcher derives the node id via the namehash fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    NameRegister {
        name: String,
        owner: Address,
        duration: U256,
    },
    NameRegisterByManager {
        name: String,
        owner: Address,
        duration: U256,
        key_hashes: Vec<U256>,
        values: Vec<String>,
    },
    NameRedeem {
        name: String,
        owner: Address,
        duration: U256,
        deadline: U256,
        code: Bytes,
    },
    Renew {
        name: String,
        duration: U256,
    },
    RenewByManager {
        name: String,
        duration: U256,
    },
}

/// One unit of the ordered feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedItem {
    Event { meta: EventMeta, event: DomainEvent },
    Call { meta: CallMeta, call: ContractCall },
}
