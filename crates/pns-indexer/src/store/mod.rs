//! Persistent projection of the name hierarchy.
//!
//! The store owns the authoritative per-node record (the Node Registry) and
//! each node's reconciled action history (the History Ledger). Every write is
//! an upsert: nodes are created lazily on first reference and never deleted,
//! only tombstoned. A secondary index maps transaction hashes to the nodes
//! they touched, which is what makes the history upsert-by-hash cheap.

use pns_core::{
    ROOT_LABEL,
    events::DomainEvent,
    model::{
        ActionUpdate,
        HistoryRecord,
        Node,
    },
    primitives::{
        Address,
        NodeId,
        TxHash,
    },
};

use std::{
    collections::{
        BTreeMap,
        HashMap,
    },
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
};

use bincode::{
    deserialize as de,
    serialize as ser,
};

use serde::{
    Deserialize,
    Serialize,
};

use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Sled error")]
    SledError(#[source] std::io::Error),
    #[error("Bincode error")]
    BincodeError(#[source] bincode::Error),
}

/// One append-only record for events outside the node/history projection
/// (prices, approvals, resolver config, manager roles, metadata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideLogEntry {
    pub timestamp: u64,
    pub tx_hash: TxHash,
    pub event: DomainEvent,
}

/// Tree name for the node records.
const NODES_TREE: &str = "nodes";
/// Tree name for the transaction-hash secondary index.
const TX_INDEX_TREE: &str = "tx_index";
/// Tree name for the append-only side log.
const SIDE_LOG_TREE: &str = "side_log";

/// Builds a side-log key from components.
/// Format: [`timestamp` (8 bytes BE) | `sequence` (8 bytes BE)]
/// Big-endian keeps lexicographic order equal to arrival order, and the
/// sequence suffix keeps two events in the same second from colliding.
#[inline]
fn side_log_key(timestamp: u64, sequence: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[0..8].copy_from_slice(&timestamp.to_be_bytes());
    key[8..16].copy_from_slice(&sequence.to_be_bytes());
    key
}

/// Extracts the sequence suffix from a side-log key.
#[inline]
fn side_log_seq(key: &[u8; 16]) -> u64 {
    let mut seq = [0u8; 8];
    seq.copy_from_slice(&key[8..16]);
    u64::from_be_bytes(seq)
}

/// Storage backend for the domain store.
/// Supports both in-memory (ephemeral) and persistent (sled) storage.
enum StoreBackend {
    /// In-memory storage. Data is lost when the store is dropped.
    InMemory {
        nodes: HashMap<NodeId, Node>,
        tx_index: HashMap<TxHash, Vec<NodeId>>,
        side_log: BTreeMap<[u8; 16], SideLogEntry>,
    },
    /// Persistent storage using sled. Data survives restarts.
    Sled {
        nodes: sled::Tree,
        tx_index: sled::Tree,
        side_log: sled::Tree,
    },
}

impl StoreBackend {
    fn new_in_memory() -> Self {
        Self::InMemory {
            nodes: HashMap::new(),
            tx_index: HashMap::new(),
            side_log: BTreeMap::new(),
        }
    }

    /// Creates a new sled backend.
    ///
    /// # Panics
    /// Panics if one of the trees cannot be opened.
    fn new_sled(db: &sled::Db) -> Self {
        let nodes = db.open_tree(NODES_TREE).expect("Failed to open nodes tree");
        let tx_index = db
            .open_tree(TX_INDEX_TREE)
            .expect("Failed to open tx index tree");
        let side_log = db
            .open_tree(SIDE_LOG_TREE)
            .expect("Failed to open side log tree");
        Self::Sled {
            nodes,
            tx_index,
            side_log,
        }
    }

    fn get_node(&self, id: &NodeId) -> Result<Option<Node>, StoreError> {
        match self {
            Self::InMemory { nodes, .. } => Ok(nodes.get(id).cloned()),
            Self::Sled { nodes, .. } => {
                nodes
                    .get(id.as_slice())
                    .map_err(StoreError::SledError)?
                    .map(|bytes| de(&bytes))
                    .transpose()
                    .map_err(StoreError::BincodeError)
            }
        }
    }

    fn insert_node(&mut self, node: &Node) -> Result<(), StoreError> {
        match self {
            Self::InMemory { nodes, .. } => {
                nodes.insert(node.id, node.clone());
                Ok(())
            }
            Self::Sled { nodes, .. } => {
                nodes
                    .insert(
                        node.id.as_slice(),
                        ser(node).map_err(StoreError::BincodeError)?,
                    )
                    .map_err(StoreError::SledError)?;
                Ok(())
            }
        }
    }

    fn tx_nodes(&self, tx_hash: &TxHash) -> Result<Vec<NodeId>, StoreError> {
        match self {
            Self::InMemory { tx_index, .. } => Ok(tx_index.get(tx_hash).cloned().unwrap_or_default()),
            Self::Sled { tx_index, .. } => {
                Ok(tx_index
                    .get(tx_hash.as_slice())
                    .map_err(StoreError::SledError)?
                    .map(|bytes| de(&bytes))
                    .transpose()
                    .map_err(StoreError::BincodeError)?
                    .unwrap_or_default())
            }
        }
    }

    fn index_tx(&mut self, tx_hash: TxHash, node_id: NodeId) -> Result<(), StoreError> {
        let mut ids = self.tx_nodes(&tx_hash)?;
        if ids.contains(&node_id) {
            return Ok(());
        }
        ids.push(node_id);
        match self {
            Self::InMemory { tx_index, .. } => {
                tx_index.insert(tx_hash, ids);
                Ok(())
            }
            Self::Sled { tx_index, .. } => {
                tx_index
                    .insert(
                        tx_hash.as_slice(),
                        ser(&ids).map_err(StoreError::BincodeError)?,
                    )
                    .map_err(StoreError::SledError)?;
                Ok(())
            }
        }
    }

    fn append_side(&mut self, key: [u8; 16], entry: &SideLogEntry) -> Result<(), StoreError> {
        match self {
            Self::InMemory { side_log, .. } => {
                side_log.insert(key, entry.clone());
                Ok(())
            }
            Self::Sled { side_log, .. } => {
                side_log
                    .insert(key, ser(entry).map_err(StoreError::BincodeError)?)
                    .map_err(StoreError::SledError)?;
                Ok(())
            }
        }
    }

    fn side_entries(&self) -> Result<Vec<SideLogEntry>, StoreError> {
        match self {
            Self::InMemory { side_log, .. } => Ok(side_log.values().cloned().collect()),
            Self::Sled { side_log, .. } => {
                side_log
                    .iter()
                    .map(|kv| {
                        let (_k, v) = kv.map_err(StoreError::SledError)?;
                        de(&v).map_err(StoreError::BincodeError)
                    })
                    .collect()
            }
        }
    }

    /// Largest sequence suffix among persisted side-log keys.
    fn max_side_seq(&self) -> Result<Option<u64>, StoreError> {
        match self {
            Self::InMemory { side_log, .. } => Ok(side_log.keys().map(side_log_seq).max()),
            Self::Sled { side_log, .. } => {
                let mut max = None;
                for kv in side_log.iter() {
                    let (k, _v) = kv.map_err(StoreError::SledError)?;
                    let Ok(key) = <[u8; 16]>::try_from(k.as_ref()) else {
                        continue;
                    };
                    let seq = side_log_seq(&key);
                    max = Some(max.map_or(seq, |m: u64| m.max(seq)));
                }
                Ok(max)
            }
        }
    }
}

/// Handle to the node/history projection. Cloneable; all clones share the
/// same backend.
#[derive(Clone)]
pub struct DomainStore {
    inner: Arc<Mutex<StoreBackend>>,
    /// Suffix for side-log keys within one timestamp.
    side_seq: Arc<AtomicU64>,
}

impl std::fmt::Debug for DomainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend_name = match &*self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
        {
            StoreBackend::InMemory { .. } => "InMemory",
            StoreBackend::Sled { .. } => "Sled",
        };
        f.debug_struct("DomainStore")
            .field("backend", &backend_name)
            .finish()
    }
}

impl DomainStore {
    /// Create a new domain store with a sled backend for persistence.
    ///
    /// # Panics
    ///
    /// Will panic if the trees cannot be opened in the sled DB, or if the
    /// existing side log cannot be scanned.
    pub fn new(db: &sled::Db) -> Self {
        Self::with_backend(StoreBackend::new_sled(db))
    }

    /// Creates a new domain store without persistence (in-memory).
    #[must_use]
    pub fn new_ephemeral() -> Self {
        Self::with_backend(StoreBackend::new_in_memory())
    }

    fn with_backend(backend: StoreBackend) -> Self {
        // Resume the sequence suffix past any persisted side-log keys, so a
        // reopened store cannot mint a key that is already taken.
        let next_seq = backend
            .max_side_seq()
            .expect("Failed to scan side log")
            .map_or(0, |seq| seq + 1);
        Self {
            inner: Arc::new(Mutex::new(backend)),
            side_seq: Arc::new(AtomicU64::new(next_seq)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreBackend> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Fetches the node record for `id`, if one has been persisted.
    pub fn node(&self, id: &NodeId) -> Result<Option<Node>, StoreError> {
        self.lock().get_node(id)
    }

    /// Fetches the existing record for `id` or constructs a fresh one in
    /// memory. The fresh record is not persisted until a later upsert.
    pub fn resolve_or_create(&self, id: NodeId) -> Result<Node, StoreError> {
        Ok(self.node(&id)?.unwrap_or_else(|| Node::empty(id)))
    }

    /// Upserts a node from a subdomain-creation observation.
    ///
    /// The fully-qualified name is resolved at write time from the parent's
    /// current name, falling back to the root label when the parent is
    /// unknown. The snapshot is deliberate: ancestor renames do not cascade.
    pub fn upsert_from_label_event(
        &self,
        child_id: NodeId,
        parent_id: NodeId,
        label: &str,
        owner: Address,
    ) -> Result<Node, StoreError> {
        let mut inner = self.lock();

        let parent_name = match inner.get_node(&parent_id)? {
            Some(parent) if !parent.name.is_empty() => parent.name,
            _ => ROOT_LABEL.to_string(),
        };

        let mut node = inner
            .get_node(&child_id)?
            .unwrap_or_else(|| Node::empty(child_id));
        node.name = format!("{label}.{parent_name}");
        node.parent = parent_id;
        node.owner = owner;
        node.removed = false;
        inner.insert_node(&node)?;

        debug!(
            target: "pns-indexer::store",
            node = %node.id,
            name = %node.name,
            owner = %node.owner,
            "Upserted node from label event"
        );
        Ok(node)
    }

    /// Upserts a node from a transfer observation.
    ///
    /// A transfer to the zero address tombstones the node instead of deleting
    /// it. A transfer may be the first-ever observation of a node (a mint),
    /// so the record is created on demand.
    pub fn upsert_from_transfer(
        &self,
        id: NodeId,
        from: Address,
        to: Address,
    ) -> Result<Node, StoreError> {
        let mut inner = self.lock();

        let mut node = inner.get_node(&id)?.unwrap_or_else(|| Node::empty(id));
        node.owner = to;
        if to == Address::ZERO {
            node.removed = true;
        }
        inner.insert_node(&node)?;

        debug!(
            target: "pns-indexer::store",
            node = %node.id,
            %from,
            %to,
            removed = node.removed,
            "Upserted node from transfer"
        );
        Ok(node)
    }

    /// Sets a node's expiry, and its owner when one accompanies the
    /// observation (registrations carry an owner, renewals do not).
    pub fn upsert_expiry(
        &self,
        id: NodeId,
        owner: Option<Address>,
        expires: u64,
    ) -> Result<Node, StoreError> {
        let mut inner = self.lock();

        let mut node = inner.get_node(&id)?.unwrap_or_else(|| Node::empty(id));
        if let Some(owner) = owner {
            node.owner = owner;
        }
        node.expires = Some(expires);
        inner.insert_node(&node)?;

        debug!(
            target: "pns-indexer::store",
            node = %node.id,
            expires,
            "Upserted node expiry"
        );
        Ok(node)
    }

    /// Records one observation of a transaction against a node.
    ///
    /// If the node's history already holds a record for `tx_hash`, the
    /// supplied fields are merged into it; otherwise a new record is
    /// appended. This upsert-by-hash is the idempotence mechanism that lets
    /// an event and a call trace for the same transaction collapse into one
    /// logical entry.
    pub fn record_action(
        &self,
        node_id: NodeId,
        tx_hash: TxHash,
        update: ActionUpdate,
    ) -> Result<Node, StoreError> {
        let mut inner = self.lock();

        let mut node = inner
            .get_node(&node_id)?
            .unwrap_or_else(|| Node::empty(node_id));

        match node.history.iter_mut().find(|r| r.tx_hash == tx_hash) {
            Some(record) => record.apply(&update),
            None => node.history.push(update.into_record(tx_hash)),
        }

        inner.insert_node(&node)?;
        inner.index_tx(tx_hash, node_id)?;

        debug!(
            target: "pns-indexer::store",
            node = %node.id,
            tx = %tx_hash,
            records = node.history.len(),
            "Recorded action"
        );
        Ok(node)
    }

    /// Nodes touched by the given transaction, via the secondary index.
    pub fn nodes_for_tx(&self, tx_hash: &TxHash) -> Result<Vec<Node>, StoreError> {
        let inner = self.lock();
        let mut nodes = Vec::new();
        for id in inner.tx_nodes(tx_hash)? {
            if let Some(node) = inner.get_node(&id)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// A node's history, ordered by timestamp.
    pub fn history(&self, id: &NodeId) -> Result<Vec<HistoryRecord>, StoreError> {
        let mut records = self
            .node(id)?
            .map(|node| node.history)
            .unwrap_or_default();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    /// Appends one immutable record to the side log.
    pub fn append_side_event(
        &self,
        timestamp: u64,
        tx_hash: TxHash,
        event: DomainEvent,
    ) -> Result<(), StoreError> {
        let seq = self.side_seq.fetch_add(1, Ordering::Relaxed);
        let key = side_log_key(timestamp, seq);
        self.lock().append_side(
            key,
            &SideLogEntry {
                timestamp,
                tx_hash,
                event,
            },
        )
    }

    /// All side-log records, in key (arrival) order.
    pub fn side_events(&self) -> Result<Vec<SideLogEntry>, StoreError> {
        self.lock().side_entries()
    }
}
