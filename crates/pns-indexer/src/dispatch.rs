//! Event dispatch: maps decoded feed items onto store mutations.
//!
//! Two addressing modes coexist. Registry events carry the numeric token id
//! directly; controller calls carry only a human-readable name, so their
//! handlers derive the node id through the namehash fold first. Every handler
//! is total: a malformed or unexpected item is recorded or skipped, never a
//! panic, since indexing must not stall on one event.

use pns_core::{
    ROOT_LABEL,
    events::{
        CallMeta,
        ContractCall,
        DomainEvent,
        EventMeta,
        FeedItem,
    },
    fqdn,
    model::{
        ActionKind,
        ActionUpdate,
        Node,
    },
    namehash,
    node_id,
    primitives::{
        Address,
        NodeId,
        U256,
    },
};

use crate::{
    IndexerError,
    metrics,
    store::DomainStore,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
};

/// Configuration for the dispatch layer.
#[derive(Debug, Clone)]
pub struct IndexerCfg {
    /// The projection store all handlers write into.
    pub store: DomainStore,
    /// Top-level suffix appended to bare labels before hashing.
    pub tld: String,
}

impl IndexerCfg {
    pub fn new(store: DomainStore) -> Self {
        Self {
            store,
            tld: ROOT_LABEL.to_string(),
        }
    }
}

/// Applies decoded events and calls, one at a time, in feed order.
#[derive(Debug, Clone)]
pub struct Indexer {
    store: DomainStore,
    tld: String,
}

impl Indexer {
    pub fn new(cfg: IndexerCfg) -> Self {
        Self {
            store: cfg.store,
            tld: cfg.tld,
        }
    }

    pub fn store(&self) -> &DomainStore {
        &self.store
    }

    /// Applies one feed item to the projection.
    pub fn apply(&self, item: FeedItem) -> Result<(), IndexerError> {
        match item {
            FeedItem::Event { meta, event } => self.apply_event(meta, event),
            FeedItem::Call { meta, call } => self.apply_call(meta, call),
        }
    }

    /// Consumes the feed channel until it closes or the token cancels.
    ///
    /// Items are applied strictly in arrival order; each handler runs to
    /// completion before the next item is taken.
    pub async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<FeedItem>,
        cancel_token: CancellationToken,
    ) -> Result<(), IndexerError> {
        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!(target: "pns-indexer::dispatch", "Indexer received cancellation signal, shutting down...");
                    break;
                }
                item = rx.recv() => {
                    let Some(item) = item else {
                        info!(target: "pns-indexer::dispatch", "Feed channel closed, stopping");
                        break;
                    };
                    self.apply(item)?;
                }
            }
        }
        Ok(())
    }

    fn apply_event(&self, meta: EventMeta, event: DomainEvent) -> Result<(), IndexerError> {
        match &event {
            DomainEvent::NewSubdomain {
                to,
                token_id: parent_token,
                subtoken_id,
                name,
            } => {
                let child = node_id(*subtoken_id);
                let parent = node_id(*parent_token);
                self.store
                    .upsert_from_label_event(child, parent, name, *to)?;
                self.store
                    .append_side_event(meta.block_timestamp, meta.tx_hash, event.clone())?;
            }
            DomainEvent::Transfer {
                from,
                to,
                token_id,
            } => {
                let node = node_id(*token_id);
                self.store.upsert_from_transfer(node, *from, *to)?;

                let mut update = ActionUpdate::new(ActionKind::Transfer, meta.block_timestamp);
                update.from = Some(*from);
                update.owner = Some(*to);
                self.store.record_action(node, meta.tx_hash, update)?;
            }
            DomainEvent::NameRegistered {
                to,
                node,
                cost,
                expires,
                name,
            } => {
                let node = node_id(*node);
                // Registrations are top-level labels under the TLD; resolving
                // the name here also covers nodes first seen by their mint
                // transfer.
                self.store.upsert_from_label_event(
                    node,
                    namehash(&self.tld),
                    self.bare_label(name),
                    *to,
                )?;
                self.store
                    .upsert_expiry(node, Some(*to), saturating_u64(*expires))?;

                // Zero cost marks a manager-initiated registration.
                let kind = if cost.is_zero() {
                    ActionKind::RegisterByManager
                } else {
                    ActionKind::Register
                };
                let mut update = ActionUpdate::new(kind, meta.block_timestamp);
                update.owner = Some(*to);
                update.cost = Some(*cost);
                self.store.record_action(node, meta.tx_hash, update)?;
            }
            DomainEvent::NameRenewed {
                node, cost, expires, ..
            } => {
                let node = node_id(*node);
                // Renewal moves the expiry but says nothing about ownership.
                self.store
                    .upsert_expiry(node, None, saturating_u64(*expires))?;

                let mut update = ActionUpdate::new(ActionKind::Renew, meta.block_timestamp);
                update.cost = Some(*cost);
                self.store.record_action(node, meta.tx_hash, update)?;
            }
            // Everything else is an immutable side record with no
            // reconciliation.
            _ => {
                self.store
                    .append_side_event(meta.block_timestamp, meta.tx_hash, event.clone())?;
            }
        }

        metrics::record_events_indexed(1);
        metrics::set_feed_timestamp(meta.block_timestamp);
        Ok(())
    }

    fn apply_call(&self, meta: CallMeta, call: ContractCall) -> Result<(), IndexerError> {
        match &call {
            ContractCall::NameRegister {
                name,
                owner,
                duration,
            } => {
                self.record_call(meta, name, ActionKind::Register, Some(*owner), *duration)?;
            }
            ContractCall::NameRegisterByManager {
                name,
                owner,
                duration,
                ..
            } => {
                self.record_call(
                    meta,
                    name,
                    ActionKind::RegisterByManager,
                    Some(*owner),
                    *duration,
                )?;
            }
            ContractCall::NameRedeem {
                name,
                owner,
                duration,
                ..
            } => {
                self.record_call(meta, name, ActionKind::Redeem, Some(*owner), *duration)?;
            }
            ContractCall::Renew { name, duration } => {
                self.record_call(meta, name, ActionKind::Renew, None, *duration)?;
            }
            ContractCall::RenewByManager { name, duration } => {
                self.record_call(meta, name, ActionKind::RenewByManager, None, *duration)?;
            }
        }

        metrics::record_calls_indexed(1);
        metrics::set_feed_timestamp(meta.timestamp);
        Ok(())
    }

    /// Records one name-addressed call observation.
    ///
    /// The history record always carries the chain-reported outcome; the
    /// registry mutation (ownership) is gated on `success`, and renewals
    /// mutate nothing here since a relative `duration` cannot produce an
    /// absolute expiry. The absolute value arrives with the matching
    /// `NameRegistered`/`NameRenewed` event under the same transaction hash.
    fn record_call(
        &self,
        meta: CallMeta,
        name: &str,
        kind: ActionKind,
        owner: Option<Address>,
        duration: U256,
    ) -> Result<(), IndexerError> {
        let node = self.named_node_id(name);

        let mut update = ActionUpdate::new(kind, meta.timestamp);
        update.from = Some(meta.from);
        update.owner = owner;
        update.duration = Some(saturating_u64(duration));
        update.success = Some(meta.success);
        self.store.record_action(node, meta.tx_hash, update)?;

        if meta.success && let Some(owner) = owner {
            self.store.upsert_from_label_event(
                node,
                namehash(&self.tld),
                self.bare_label(name),
                owner,
            )?;
        } else if !meta.success {
            debug!(
                target: "pns-indexer::dispatch",
                tx = %meta.tx_hash,
                ?kind,
                "Recorded failed call without state mutation"
            );
        }
        Ok(())
    }

    /// Looks a node up by its human-readable name.
    pub fn node_by_name(&self, name: &str) -> Result<Option<Node>, IndexerError> {
        Ok(self.store.node(&self.named_node_id(name))?)
    }

    /// Canonical node id for a name-addressed operation.
    fn named_node_id(&self, name: &str) -> NodeId {
        namehash(&fqdn(name, &self.tld))
    }

    /// Call arguments may arrive bare or already qualified; the label passed
    /// to the registry must be bare.
    fn bare_label<'a>(&self, name: &'a str) -> &'a str {
        name.strip_suffix(&format!(".{}", self.tld)).unwrap_or(name)
    }
}

fn saturating_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pns_core::primitives::B256;

    fn indexer() -> Indexer {
        Indexer::new(IndexerCfg::new(DomainStore::new_ephemeral()))
    }

    fn event(timestamp: u64, tx: u8, event: DomainEvent) -> FeedItem {
        FeedItem::Event {
            meta: EventMeta {
                block_timestamp: timestamp,
                tx_hash: B256::repeat_byte(tx),
            },
            event,
        }
    }

    fn call(timestamp: u64, tx: u8, success: bool, call: ContractCall) -> FeedItem {
        FeedItem::Call {
            meta: CallMeta {
                tx_hash: B256::repeat_byte(tx),
                from: Address::repeat_byte(0xf0),
                success,
                timestamp,
            },
            call,
        }
    }

    #[test]
    fn zero_cost_registration_classifies_as_by_manager() {
        let idx = indexer();
        let owner = Address::repeat_byte(0xa);
        let token = U256::from(77);

        idx.apply(event(
            1_000,
            1,
            DomainEvent::NameRegistered {
                to: owner,
                node: token,
                cost: U256::ZERO,
                expires: U256::from(1_000),
                name: "alice".to_string(),
            },
        ))
        .unwrap();

        let node = idx.store().node(&node_id(token)).unwrap().unwrap();
        assert_eq!(node.owner, owner);
        assert_eq!(node.expires, Some(1_000));
        assert_eq!(node.name, "alice.dot");
        assert_eq!(node.history.len(), 1);
        assert_eq!(node.history[0].kind, ActionKind::RegisterByManager);
        assert_eq!(node.history[0].owner, Some(owner));

        // Then burn it: tombstone, zero owner, record still there.
        idx.apply(event(
            1_100,
            2,
            DomainEvent::Transfer {
                from: owner,
                to: Address::ZERO,
                token_id: token,
            },
        ))
        .unwrap();

        let node = idx.store().node(&node_id(token)).unwrap().unwrap();
        assert!(node.removed);
        assert_eq!(node.owner, Address::ZERO);
        assert_eq!(node.history.len(), 2);
    }

    #[test]
    fn nonzero_cost_registration_classifies_as_register() {
        let idx = indexer();
        idx.apply(event(
            1_000,
            1,
            DomainEvent::NameRegistered {
                to: Address::repeat_byte(0xb),
                node: U256::from(5),
                cost: U256::from(250),
                expires: U256::from(2_000),
                name: "bob".to_string(),
            },
        ))
        .unwrap();

        let node = idx.store().node(&node_id(U256::from(5))).unwrap().unwrap();
        assert_eq!(node.history[0].kind, ActionKind::Register);
        assert_eq!(node.history[0].cost, Some(U256::from(250)));
    }

    #[test]
    fn mint_transfer_and_registration_collapse_into_one_record() {
        let idx = indexer();
        let owner = Address::repeat_byte(0xc);
        let token = U256::from(9);

        // Same transaction emits the mint transfer and the registration.
        idx.apply(event(
            500,
            7,
            DomainEvent::Transfer {
                from: Address::ZERO,
                to: owner,
                token_id: token,
            },
        ))
        .unwrap();
        idx.apply(event(
            500,
            7,
            DomainEvent::NameRegistered {
                to: owner,
                node: token,
                cost: U256::from(10),
                expires: U256::from(9_000),
                name: "carol".to_string(),
            },
        ))
        .unwrap();

        let node = idx.store().node(&node_id(token)).unwrap().unwrap();
        assert_eq!(node.history.len(), 1);
        let record = &node.history[0];
        // Refined from Transfer to Register, fields unioned.
        assert_eq!(record.kind, ActionKind::Register);
        assert_eq!(record.from, Some(Address::ZERO));
        assert_eq!(record.owner, Some(owner));
        assert_eq!(record.cost, Some(U256::from(10)));
    }

    #[test]
    fn renewal_moves_expiry_without_touching_owner() {
        let idx = indexer();
        let owner = Address::repeat_byte(0xd);
        let token = U256::from(3);

        idx.apply(event(
            100,
            1,
            DomainEvent::NameRegistered {
                to: owner,
                node: token,
                cost: U256::from(1),
                expires: U256::from(1_000),
                name: "dave".to_string(),
            },
        ))
        .unwrap();
        idx.apply(event(
            200,
            2,
            DomainEvent::NameRenewed {
                node: token,
                cost: U256::from(2),
                expires: U256::from(5_000),
                name: "dave".to_string(),
            },
        ))
        .unwrap();

        let node = idx.store().node(&node_id(token)).unwrap().unwrap();
        assert_eq!(node.owner, owner);
        assert_eq!(node.expires, Some(5_000));
        assert_eq!(node.history.len(), 2);
    }

    #[test]
    fn failed_call_is_recorded_but_mutates_nothing() {
        let idx = indexer();
        let claimed = Address::repeat_byte(0xe);

        idx.apply(call(
            300,
            4,
            false,
            ContractCall::NameRedeem {
                name: "eve".to_string(),
                owner: claimed,
                duration: U256::from(86_400),
                deadline: U256::from(400),
                code: Default::default(),
            },
        ))
        .unwrap();

        let id = namehash("eve.dot");
        let node = idx.store().node(&id).unwrap().unwrap();
        // The record exists with its outcome, but ownership never moved.
        assert_eq!(node.owner, Address::ZERO);
        assert!(node.name.is_empty());
        assert_eq!(node.history.len(), 1);
        assert_eq!(node.history[0].kind, ActionKind::Redeem);
        assert_eq!(node.history[0].success, Some(false));
        assert_eq!(node.history[0].duration, Some(86_400));
    }

    #[test]
    fn successful_register_call_claims_ownership() {
        let idx = indexer();
        let owner = Address::repeat_byte(0x1f);

        idx.apply(call(
            300,
            5,
            true,
            ContractCall::NameRegister {
                name: "frank".to_string(),
                owner,
                duration: U256::from(86_400),
            },
        ))
        .unwrap();

        let node = idx.node_by_name("frank").unwrap().unwrap();
        assert_eq!(node.owner, owner);
        assert_eq!(node.name, "frank.dot");
        // Duration is relative: expiry waits for the NameRegistered event.
        assert_eq!(node.expires, None);
        assert_eq!(node.history[0].kind, ActionKind::Register);
        assert_eq!(node.history[0].success, Some(true));
    }

    #[test]
    fn redelivered_manager_renew_call_collapses() {
        let idx = indexer();
        // The contract's token id is the namehash integer, so the by-id
        // event and the by-name calls address the same node.
        let token = U256::from_be_bytes(namehash("grace.dot").0);
        idx.apply(call(
            700,
            9,
            true,
            ContractCall::RenewByManager {
                name: "grace".to_string(),
                duration: U256::from(1_000),
            },
        ))
        .unwrap();
        idx.apply(call(
            700,
            9,
            true,
            ContractCall::RenewByManager {
                name: "grace".to_string(),
                duration: U256::from(1_000),
            },
        ))
        .unwrap();

        let node = idx.store().node(&namehash("grace.dot")).unwrap().unwrap();
        assert_eq!(node.history.len(), 1);
        assert_eq!(node.history[0].kind, ActionKind::RenewByManager);

        idx.apply(event(
            700,
            8,
            DomainEvent::NameRenewed {
                node: token,
                cost: U256::from(3),
                expires: U256::from(7_000),
                name: "grace".to_string(),
            },
        ))
        .unwrap();
        let by_id = idx.store().node(&node_id(token)).unwrap().unwrap();
        assert_eq!(by_id.expires, Some(7_000));
        // The by-id event landed on the same node as the by-name calls:
        // the collapsed call record plus the event's own transaction.
        assert_eq!(by_id.id, namehash("grace.dot"));
        assert_eq!(by_id.history.len(), 2);
    }

    #[test]
    fn unrelated_events_append_to_side_log() {
        let idx = indexer();
        idx.apply(event(
            50,
            1,
            DomainEvent::Approval {
                owner: Address::repeat_byte(1),
                approved: Address::repeat_byte(2),
                token_id: U256::from(1),
            },
        ))
        .unwrap();
        idx.apply(event(
            60,
            2,
            DomainEvent::ManagerChanged {
                manager: Address::repeat_byte(3),
                role: true,
            },
        ))
        .unwrap();

        let entries = idx.store().side_events().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp, 50);
        assert_eq!(entries[1].timestamp, 60);
    }

    #[tokio::test]
    async fn run_consumes_feed_in_order_until_close() {
        let idx = indexer();
        let store = idx.store().clone();

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(idx.run(rx, cancel_token.clone()));

        let owner = Address::repeat_byte(0xab);
        tx.send(event(
            10,
            1,
            DomainEvent::NameRegistered {
                to: owner,
                node: U256::from(1),
                cost: U256::ZERO,
                expires: U256::from(100),
                name: "alice".to_string(),
            },
        ))
        .unwrap();
        tx.send(event(
            20,
            2,
            DomainEvent::Transfer {
                from: owner,
                to: Address::repeat_byte(0xcd),
                token_id: U256::from(1),
            },
        ))
        .unwrap();

        // Closing the feed stops the loop after draining.
        drop(tx);
        handle.await.unwrap().unwrap();

        let node = store.node(&node_id(U256::from(1))).unwrap().unwrap();
        assert_eq!(node.owner, Address::repeat_byte(0xcd));
        assert_eq!(node.history.len(), 2);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let idx = indexer();
        let (_tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(idx.run(rx, cancel_token.clone()));

        cancel_token.cancel();
        handle.await.unwrap().unwrap();
    }
}
