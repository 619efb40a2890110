//! Projected state: one [`Node`] per name, each owning its reconciled
//! action history.

use crate::primitives::{
    Address,
    NodeId,
    TxHash,
    U256,
};

use serde::{
    Deserialize,
    Serialize,
};

/// One entry in the name hierarchy (a "subdomain").
///
/// Records are never deleted: a transfer to the zero address only flips the
/// [`Node::removed`] tombstone. `name` is a snapshot taken the last time an
/// event supplied a fresh label; ancestor renames do not cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Fully-qualified dotted name, e.g. `alice.dot`.
    pub name: String,
    /// Id of the parent node; the root digest for top-level names.
    pub parent: NodeId,
    pub owner: Address,
    /// Absolute expiry timestamp in seconds; unset until first registration.
    pub expires: Option<u64>,
    /// Soft-delete flag set by transfers to the zero address.
    pub removed: bool,
    /// Reconciled action log, at most one record per transaction hash.
    pub history: Vec<HistoryRecord>,
}

impl Node {
    /// Fresh, unpersisted record for a node observed for the first time.
    pub fn empty(id: NodeId) -> Self {
        Self {
            id,
            name: String::new(),
            parent: NodeId::ZERO,
            owner: Address::ZERO,
            expires: None,
            removed: false,
            history: Vec::new(),
        }
    }
}

/// Classification of a history record.
///
/// Ranked by specificity: an event-derived `Transfer` observation can later
/// be refined into the registration that minted the token, and a plain
/// register/renew into its manager-initiated variant, but never the other
/// way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Transfer,
    Register,
    RegisterByManager,
    Renew,
    RenewByManager,
    Redeem,
}

impl ActionKind {
    fn rank(self) -> u8 {
        match self {
            Self::Transfer => 0,
            Self::Register | Self::Renew | Self::Redeem => 1,
            Self::RegisterByManager | Self::RenewByManager => 2,
        }
    }

    /// Whether an observation of `self` may overwrite an existing `prev`.
    pub fn refines(self, prev: Self) -> bool {
        self.rank() > prev.rank()
    }
}

/// One reconciled action against a node, keyed by transaction hash.
///
/// Field presence is kind-dependent: `cost`/`duration` only accompany
/// registrations and renewals, `success` only call-derived observations
/// (event-derived ones succeeded by construction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub tx_hash: TxHash,
    pub kind: ActionKind,
    pub from: Option<Address>,
    pub owner: Option<Address>,
    pub cost: Option<U256>,
    pub duration: Option<u64>,
    pub success: Option<bool>,
    /// Seconds since epoch.
    pub timestamp: u64,
}

impl HistoryRecord {
    /// Merges a later observation of the same transaction into this record.
    ///
    /// Only fields present in the update are overwritten; `kind` moves only
    /// toward a more specific classification. This is what lets an event and
    /// a call trace for the same transaction collapse into one entry.
    pub fn apply(&mut self, update: &ActionUpdate) {
        if update.kind.refines(self.kind) {
            self.kind = update.kind;
        }
        if let Some(from) = update.from {
            self.from = Some(from);
        }
        if let Some(owner) = update.owner {
            self.owner = Some(owner);
        }
        if let Some(cost) = update.cost {
            self.cost = Some(cost);
        }
        if let Some(duration) = update.duration {
            self.duration = Some(duration);
        }
        if let Some(success) = update.success {
            self.success = Some(success);
        }
        self.timestamp = update.timestamp;
    }
}

/// Partial-field payload for a single handler observation of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionUpdate {
    pub kind: ActionKind,
    pub from: Option<Address>,
    pub owner: Option<Address>,
    pub cost: Option<U256>,
    pub duration: Option<u64>,
    pub success: Option<bool>,
    pub timestamp: u64,
}

impl ActionUpdate {
    pub fn new(kind: ActionKind, timestamp: u64) -> Self {
        Self {
            kind,
            from: None,
            owner: None,
            cost: None,
            duration: None,
            success: None,
            timestamp,
        }
    }

    /// Materializes a new record from a first observation.
    pub fn into_record(self, tx_hash: TxHash) -> HistoryRecord {
        HistoryRecord {
            tx_hash,
            kind: self.kind,
            from: self.from,
            owner: self.owner,
            cost: self.cost,
            duration: self.duration,
            success: self.success,
            timestamp: self.timestamp,
        }
    }
}
