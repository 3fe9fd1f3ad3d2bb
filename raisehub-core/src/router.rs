//! Dispatch of ledger logs to handlers under checkpoint discipline.
//!
//! Every log is applied in its own store transaction: the handler's entity
//! writes, the resulting [`StatsDelta`] and the advanced checkpoint commit
//! together. A log at or before the checkpoint is skipped, so replaying a
//! range that was already applied changes nothing.

use crate::aggregate::StatsDelta;
use crate::decoding::{self, ContractKind, DecodeError};
use crate::entities::{address_key, word_key};
use crate::handlers::{
    EventContext, EventHandler, HandlerError, IdentityHandler, RoundLifecycleHandler,
    SecondaryMarketHandler,
};
use crate::ledger::RawLog;
use crate::store::{Checkpoint, EntityStore, LedgerPosition, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("{kind}:{event} is already handled by {existing}")]
    DuplicateTrigger {
        kind: ContractKind,
        event: &'static str,
        existing: &'static str,
    },

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("handler {handler} failed at {position}: {error}")]
    Handler {
        handler: &'static str,
        position: LedgerPosition,
        #[source]
        error: HandlerError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("block timestamp {0} out of range")]
    Timestamp(u64),
}

/// What happened to a routed log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Effects committed together with the checkpoint.
    Applied(StatsDelta),
    /// Already covered by the checkpoint.
    Skipped,
    /// Not an event any handler tracks.
    Ignored,
}

pub struct EventRouter {
    handlers: HashMap<(ContractKind, &'static str), Arc<dyn EventHandler>>,
    store: Arc<dyn EntityStore>,
}

impl EventRouter {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            handlers: HashMap::new(),
            store,
        }
    }

    /// Router with the identity, round lifecycle and secondary market rules.
    pub fn with_default_handlers(store: Arc<dyn EntityStore>) -> Result<Self, RouterError> {
        let mut router = Self::new(store);
        router.register(IdentityHandler)?;
        router.register(RoundLifecycleHandler)?;
        router.register(SecondaryMarketHandler)?;
        Ok(router)
    }

    /// Register a handler for all of its triggers.
    ///
    /// Each (contract kind, event) pair has exactly one handler.
    pub fn register<H: EventHandler + 'static>(&mut self, handler: H) -> Result<(), RouterError> {
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        for trigger in handler.triggers() {
            let key = (trigger.source, trigger.event);
            if let Some(existing) = self.handlers.get(&key) {
                return Err(RouterError::DuplicateTrigger {
                    kind: trigger.source,
                    event: trigger.event,
                    existing: existing.name(),
                });
            }
            self.handlers.insert(key, handler.clone());
        }
        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Apply one log emitted by a contract of the given kind.
    pub async fn route(
        &self,
        log: &RawLog,
        kind: ContractKind,
        block_timestamp: u64,
    ) -> Result<RouteOutcome, RouterError> {
        let position = log.position();
        let checkpoint = self.store.checkpoint().await?;
        if checkpoint.is_applied(position) {
            debug!(block = log.block_number, log_index = log.log_index, "Already applied");
            return Ok(RouteOutcome::Skipped);
        }

        let Some(event) = decoding::decode_log(kind, log)? else {
            return Ok(RouteOutcome::Ignored);
        };
        let Some(handler) = self.handlers.get(&(kind, event.name())) else {
            warn!(%kind, event = event.name(), "No handler registered");
            return Ok(RouteOutcome::Ignored);
        };

        let ctx = EventContext {
            contract: address_key(&log.address),
            block_number: log.block_number,
            block_timestamp: i64::try_from(block_timestamp)
                .map_err(|_| RouterError::Timestamp(block_timestamp))?,
            tx_hash: word_key(&log.transaction_hash),
            log_index: log.log_index,
        };

        let mut tx = self.store.begin().await?;
        let delta = handler
            .handle(&ctx, &event, tx.as_mut())
            .await
            .map_err(|error| RouterError::Handler {
                handler: handler.name(),
                position,
                error,
            })?;
        if !delta.is_zero() {
            tx.apply_stats(&delta, ctx.block_timestamp).await?;
        }
        tx.save_checkpoint(&Checkpoint {
            last_event: Some(position),
            synced_block: checkpoint.synced_block,
        })
        .await?;
        tx.commit().await?;

        debug!(
            block = log.block_number,
            log_index = log.log_index,
            event = event.name(),
            handler = handler.name(),
            "Event applied"
        );
        Ok(RouteOutcome::Applied(delta))
    }

    /// Record that every log up to and including `block` has been applied.
    pub async fn mark_synced(&self, block: u64) -> Result<(), RouterError> {
        let checkpoint = self.store.checkpoint().await?;
        if checkpoint.synced_block.is_some_and(|synced| synced >= block) {
            return Ok(());
        }
        let mut tx = self.store.begin().await?;
        tx.save_checkpoint(&Checkpoint {
            last_event: checkpoint.last_event,
            synced_block: Some(block),
        })
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::abi;
    use crate::decoding::test_logs::{order_created, order_executed, raw};
    use crate::store::{MemorySnapshot, MemoryStore};
    use alloy::primitives::{Address, B256, U256};
    use rust_decimal::Decimal;

    fn registry() -> Address {
        Address::repeat_byte(0x01)
    }

    fn market() -> Address {
        Address::repeat_byte(0x02)
    }

    fn factory() -> Address {
        Address::repeat_byte(0xFA)
    }

    fn round() -> Address {
        Address::repeat_byte(0xA1)
    }

    fn router(store: &MemoryStore) -> EventRouter {
        EventRouter::with_default_handlers(Arc::new(store.clone())).unwrap()
    }

    fn role_log(user: u8, role: u8, block: u64, log_index: u64) -> RawLog {
        let event = abi::UserRoleRegistered {
            user: Address::repeat_byte(user),
            role,
        };
        raw(&event, registry(), block, log_index)
    }

    fn deployed_log(block: u64, log_index: u64) -> (RawLog, ContractKind) {
        let event = abi::RoundDeployed {
            roundAddress: round(),
            founder: Address::repeat_byte(0xAA),
            targetRaise: U256::from(10_000u64),
            metadataURI: "ipfs://round".to_string(),
        };
        (
            raw(&event, factory(), block, log_index),
            ContractKind::RoundFactory,
        )
    }

    fn invested_log(
        investor: u8,
        amount: U256,
        block: u64,
        log_index: u64,
    ) -> (RawLog, ContractKind) {
        let event = abi::Invested {
            investor: Address::repeat_byte(investor),
            amount,
            tokensIssued: U256::from(1u64),
        };
        (raw(&event, round(), block, log_index), ContractKind::Round)
    }

    /// A mixed history: three users, one round with two investors, one
    /// order filled in two trades.
    fn history() -> Vec<(RawLog, ContractKind)> {
        let seller = Address::repeat_byte(0x55);
        let buyer = Address::repeat_byte(0xBB);
        vec![
            (role_log(0xAA, 2, 1, 0), ContractKind::Registry),
            (role_log(0x55, 1, 1, 1), ContractKind::Registry),
            (
                raw(
                    &abi::ZKPassportVerified {
                        user: buyer,
                        nullifierHash: B256::repeat_byte(0x0E),
                    },
                    registry(),
                    2,
                    0,
                ),
                ContractKind::Registry,
            ),
            deployed_log(2, 1),
            (
                raw(&order_created(1, seller, 100, 5), market(), 3, 0),
                ContractKind::Market,
            ),
            invested_log(0x55, U256::from(100u64), 3, 1),
            (
                raw(&order_executed(1, buyer, seller, 40, 200), market(), 4, 0),
                ContractKind::Market,
            ),
            (
                raw(&order_executed(1, buyer, seller, 60, 300), market(), 4, 1),
                ContractKind::Market,
            ),
            (role_log(0xAA, 1, 5, 0), ContractKind::Registry),
            invested_log(0xBB, U256::from(50u64), 5, 1),
        ]
    }

    async fn apply_all(router: &EventRouter, logs: &[(RawLog, ContractKind)]) {
        for (log, kind) in logs {
            let ts = log.block_timestamp.unwrap_or_default();
            router.route(log, *kind, ts).await.unwrap();
        }
    }

    fn assert_invariants(snapshot: &MemorySnapshot) {
        let stats = &snapshot.platform_stats;
        assert_eq!(stats.total_users, snapshot.users.len() as i64);
        assert_eq!(stats.total_rounds, snapshot.rounds.len() as i64);
        assert_eq!(stats.total_trades, snapshot.trades.len() as i64);
        let volume: Decimal = snapshot.trades.values().map(|t| t.total_price).sum();
        assert_eq!(stats.total_trade_volume, volume);
        let raised: Decimal = snapshot.rounds.values().map(|r| r.total_raised).sum();
        assert_eq!(stats.total_raised, raised);
        for order in snapshot.sell_orders.values() {
            assert!(order.amount >= Decimal::ZERO);
            assert!(order.amount <= order.original_amount);
            if order.amount == Decimal::ZERO {
                assert!(!order.active);
            }
        }
    }

    #[tokio::test]
    async fn test_history_keeps_invariants() {
        let store = MemoryStore::new();
        let router = router(&store);
        let logs = history();

        for (log, kind) in &logs {
            router.route(log, *kind, 1_700_000_000).await.unwrap();
            assert_invariants(&store.snapshot());
        }

        let snapshot = store.snapshot();
        let stats = &snapshot.platform_stats;
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.total_founders, 1);
        assert_eq!(stats.total_investors, 1);
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.total_trade_volume, Decimal::from(500));
        assert_eq!(stats.total_rounds, 1);
        assert_eq!(stats.total_raised, Decimal::from(150));
        assert_eq!(snapshot.rounds[&address_key(&round())].investor_count, 2);
        assert_eq!(
            snapshot.checkpoint.last_event,
            Some(LedgerPosition::new(5, 1))
        );
        let order = &snapshot.sell_orders["1"];
        assert_eq!(order.amount, Decimal::ZERO);
        assert!(!order.active);
    }

    #[tokio::test]
    async fn test_replay_after_checkpoint_is_idempotent() {
        let logs = history();

        let once = MemoryStore::new();
        apply_all(&router(&once), &logs).await;

        let twice = MemoryStore::new();
        let replaying = router(&twice);
        apply_all(&replaying, &logs).await;
        for (log, kind) in &logs {
            let outcome = replaying.route(log, *kind, 0).await.unwrap();
            assert_eq!(outcome, RouteOutcome::Skipped);
        }

        assert_eq!(once.snapshot(), twice.snapshot());
    }

    #[tokio::test]
    async fn test_unavailable_store_leaves_event_unprocessed() {
        let store = MemoryStore::new();
        let router = router(&store);
        let log = role_log(0xAA, 2, 1, 0);

        store.set_unavailable(true);
        let result = router.route(&log, ContractKind::Registry, 1).await;
        assert!(matches!(result, Err(RouterError::Store(_))));
        store.set_unavailable(false);
        assert_eq!(store.snapshot(), MemorySnapshot::default());

        let outcome = router.route(&log, ContractKind::Registry, 1).await.unwrap();
        assert!(matches!(outcome, RouteOutcome::Applied(_)));
        assert_eq!(store.snapshot().platform_stats.total_users, 1);
    }

    #[tokio::test]
    async fn test_malformed_event_halts_without_effects() {
        let store = MemoryStore::new();
        let router = router(&store);

        let result = router
            .route(&role_log(0xAA, 9, 1, 0), ContractKind::Registry, 1)
            .await;
        assert!(matches!(result, Err(RouterError::Decode(_))));
        assert_eq!(store.snapshot(), MemorySnapshot::default());
    }

    #[tokio::test]
    async fn test_mark_synced_only_moves_forward() {
        let store = MemoryStore::new();
        let router = router(&store);

        router.mark_synced(10).await.unwrap();
        router.mark_synced(4).await.unwrap();
        assert_eq!(store.snapshot().checkpoint.synced_block, Some(10));

        // Logs in synced blocks are skipped.
        let outcome = router
            .route(&role_log(0xAA, 2, 9, 0), ContractKind::Registry, 1)
            .await
            .unwrap();
        assert_eq!(outcome, RouteOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_event_from_unexpected_contract_is_ignored() {
        let store = MemoryStore::new();
        let router = router(&store);
        let outcome = router
            .route(&role_log(0xAA, 2, 1, 0), ContractKind::Market, 1)
            .await
            .unwrap();
        assert_eq!(outcome, RouteOutcome::Ignored);
        assert_eq!(store.snapshot(), MemorySnapshot::default());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut router = EventRouter::new(Arc::new(MemoryStore::new()));
        router.register(IdentityHandler).unwrap();
        assert!(matches!(
            router.register(IdentityHandler),
            Err(RouterError::DuplicateTrigger {
                existing: "identity",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_amount_overflow_halts_before_commit() {
        let store = MemoryStore::new();
        let router = router(&store);
        let half = U256::from(1u8) << 95;

        let (deploy, deploy_kind) = deployed_log(1, 0);
        let (first, round_kind) = invested_log(0xBB, half, 2, 0);
        let (second, _) = invested_log(0xBB, half, 3, 0);
        router.route(&deploy, deploy_kind, 1).await.unwrap();
        router.route(&first, round_kind, 2).await.unwrap();
        let before = store.snapshot();

        let result = router.route(&second, round_kind, 3).await;
        assert!(matches!(
            result,
            Err(RouterError::Handler {
                error: HandlerError::Overflow(_),
                ..
            })
        ));
        assert_eq!(store.snapshot(), before);
        assert_eq!(
            before.checkpoint.last_event,
            Some(LedgerPosition::new(2, 0))
        );
    }
}
