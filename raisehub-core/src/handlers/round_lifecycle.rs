//! Round deployment from the factory and the events each round emits.

use super::{EventContext, EventHandler, EventTrigger, HandlerError};
use crate::aggregate::{StatsDelta, checked_sum};
use crate::decoding::{ContractKind, DecodedEvent};
use crate::entities::RoundState;
use crate::entities::investment::Investment;
use crate::entities::round::Round;
use crate::store::StoreTransaction;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, warn};

pub struct RoundLifecycleHandler;

impl RoundLifecycleHandler {
    async fn deployed(
        ctx: &EventContext,
        address: &str,
        founder: &str,
        target_raise: Decimal,
        metadata_uri: &str,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        let round = match tx.find_round(address).await? {
            Some(existing) => Round {
                founder: founder.to_string(),
                target_raise,
                metadata_uri: metadata_uri.to_string(),
                updated_at: ctx.block_timestamp,
                ..existing
            },
            None => Round {
                address: address.to_string(),
                founder: founder.to_string(),
                target_raise,
                metadata_uri: metadata_uri.to_string(),
                total_raised: Decimal::ZERO,
                total_withdrawn: Decimal::ZERO,
                tokens_issued: Decimal::ZERO,
                investor_count: 0,
                state: RoundState::Fundraising,
                deployed_block: ctx.block_number_i64()?,
                created_at: ctx.block_timestamp,
                updated_at: ctx.block_timestamp,
            },
        };

        let outcome = tx.upsert_round(&round).await?;
        debug!(
            round = %address,
            founder = %founder,
            created = outcome.is_inserted(),
            "Round deployed"
        );
        Ok(if outcome.is_inserted() {
            StatsDelta::round_created()
        } else {
            StatsDelta::default()
        })
    }

    async fn invested(
        ctx: &EventContext,
        investor: &str,
        amount: Decimal,
        tokens_issued: Decimal,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        let round_address = ctx.contract.as_str();
        let id = Investment::key(round_address, investor);

        let investment = match tx.find_investment(&id).await? {
            Some(existing) => Investment {
                amount: checked_sum("investment.amount", existing.amount, amount)?,
                tokens: checked_sum("investment.tokens", existing.tokens, tokens_issued)?,
                updated_at: ctx.block_timestamp,
                ..existing
            },
            None => Investment {
                id: id.clone(),
                round: round_address.to_string(),
                investor: investor.to_string(),
                amount,
                tokens: tokens_issued,
                first_invested_at: ctx.block_timestamp,
                updated_at: ctx.block_timestamp,
            },
        };
        let new_investor = tx.upsert_investment(&investment).await?.is_inserted();

        let Some(round) = tx.find_round(round_address).await? else {
            warn!(
                round = %round_address,
                investor = %investor,
                block = ctx.block_number,
                log_index = ctx.log_index,
                "Investment into unknown round, round totals left unchanged"
            );
            return Ok(StatsDelta::default());
        };

        tx.upsert_round(&Round {
            total_raised: checked_sum("round.total_raised", round.total_raised, amount)?,
            tokens_issued: checked_sum(
                "round.tokens_issued",
                round.tokens_issued,
                tokens_issued,
            )?,
            investor_count: round.investor_count + i64::from(new_investor),
            updated_at: ctx.block_timestamp,
            ..round
        })
        .await?;
        Ok(StatsDelta::capital_raised(amount))
    }

    async fn withdrawn(
        ctx: &EventContext,
        amount: Decimal,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        let Some(round) = tx.find_round(&ctx.contract).await? else {
            warn!(round = %ctx.contract, block = ctx.block_number, "Withdrawal from unknown round");
            return Ok(StatsDelta::default());
        };
        tx.upsert_round(&Round {
            total_withdrawn: checked_sum(
                "round.total_withdrawn",
                round.total_withdrawn,
                amount,
            )?,
            updated_at: ctx.block_timestamp,
            ..round
        })
        .await?;
        Ok(StatsDelta::default())
    }

    async fn state_changed(
        ctx: &EventContext,
        state: RoundState,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        let Some(round) = tx.find_round(&ctx.contract).await? else {
            warn!(round = %ctx.contract, ?state, "State change on unknown round");
            return Ok(StatsDelta::default());
        };
        debug!(round = %ctx.contract, from = ?round.state, to = ?state, "Round state changed");
        tx.upsert_round(&Round {
            state,
            updated_at: ctx.block_timestamp,
            ..round
        })
        .await?;
        Ok(StatsDelta::default())
    }
}

#[async_trait]
impl EventHandler for RoundLifecycleHandler {
    fn name(&self) -> &'static str {
        "round_lifecycle"
    }

    fn triggers(&self) -> Vec<EventTrigger> {
        vec![
            EventTrigger::new(ContractKind::RoundFactory, "RoundDeployed"),
            EventTrigger::new(ContractKind::Round, "Invested"),
            EventTrigger::new(ContractKind::Round, "FundsWithdrawn"),
            EventTrigger::new(ContractKind::Round, "RoundStateChanged"),
        ]
    }

    async fn handle(
        &self,
        ctx: &EventContext,
        event: &DecodedEvent,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        match event {
            DecodedEvent::RoundDeployed {
                round,
                founder,
                target_raise,
                metadata_uri,
            } => Self::deployed(ctx, round, founder, *target_raise, metadata_uri, tx).await,
            DecodedEvent::Invested {
                investor,
                amount,
                tokens_issued,
            } => Self::invested(ctx, investor, *amount, *tokens_issued, tx).await,
            DecodedEvent::FundsWithdrawn { amount, .. } => Self::withdrawn(ctx, *amount, tx).await,
            DecodedEvent::RoundStateChanged { state } => {
                Self::state_changed(ctx, *state, tx).await
            }
            other => Err(HandlerError::Unsupported {
                handler: self.name(),
                event: other.name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Overflow;
    use crate::handlers::testing::ctx;
    use crate::store::{EntityStore, MemoryStore};

    const FACTORY: &str = "0xfafafafafafafafafafafafafafafafafafafafa";
    const ROUND: &str = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";
    const FOUNDER: &str = "0xf0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0";
    const INVESTOR: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn deployed() -> DecodedEvent {
        DecodedEvent::RoundDeployed {
            round: ROUND.to_string(),
            founder: FOUNDER.to_string(),
            target_raise: Decimal::from(10_000),
            metadata_uri: "ipfs://round".to_string(),
        }
    }

    fn invested(amount: i64, tokens: i64) -> DecodedEvent {
        DecodedEvent::Invested {
            investor: INVESTOR.to_string(),
            amount: Decimal::from(amount),
            tokens_issued: Decimal::from(tokens),
        }
    }

    async fn run(
        tx: &mut dyn StoreTransaction,
        contract: &str,
        block: u64,
        event: DecodedEvent,
    ) -> StatsDelta {
        RoundLifecycleHandler
            .handle(&ctx(contract, block, 0), &event, tx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_deployment_initializes_round_once() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        assert_eq!(
            run(tx.as_mut(), FACTORY, 5, deployed()).await,
            StatsDelta::round_created()
        );
        let round = tx.find_round(ROUND).await.unwrap().unwrap();
        assert_eq!(round.state, RoundState::Fundraising);
        assert_eq!(round.total_raised, Decimal::ZERO);
        assert_eq!(round.investor_count, 0);
        assert_eq!(round.deployed_block, 5);

        // A second sighting does not count the round again.
        assert!(run(tx.as_mut(), FACTORY, 6, deployed()).await.is_zero());
        assert_eq!(tx.find_round(ROUND).await.unwrap().unwrap().deployed_block, 5);
    }

    #[tokio::test]
    async fn test_investments_accumulate_and_count_investor_once() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        run(tx.as_mut(), FACTORY, 5, deployed()).await;

        let first = run(tx.as_mut(), ROUND, 6, invested(100, 10)).await;
        let second = run(tx.as_mut(), ROUND, 7, invested(50, 5)).await;
        assert_eq!(first.raised + second.raised, Decimal::from(150));

        let round = tx.find_round(ROUND).await.unwrap().unwrap();
        assert_eq!(round.total_raised, Decimal::from(150));
        assert_eq!(round.tokens_issued, Decimal::from(15));
        assert_eq!(round.investor_count, 1);

        let investment = tx
            .find_investment(&Investment::key(ROUND, INVESTOR))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(investment.amount, Decimal::from(150));
        assert_eq!(investment.first_invested_at, ctx(ROUND, 6, 0).block_timestamp);
    }

    #[tokio::test]
    async fn test_investment_into_unknown_round_is_recorded_without_totals() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let delta = run(tx.as_mut(), ROUND, 6, invested(100, 10)).await;
        assert!(delta.is_zero());
        assert!(tx.find_round(ROUND).await.unwrap().is_none());
        assert!(
            tx.find_investment(&Investment::key(ROUND, INVESTOR))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_withdrawal_and_state_change() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        run(tx.as_mut(), FACTORY, 5, deployed()).await;

        let withdrawn = DecodedEvent::FundsWithdrawn {
            founder: FOUNDER.to_string(),
            amount: Decimal::from(70),
        };
        assert!(run(tx.as_mut(), ROUND, 8, withdrawn).await.is_zero());
        let funded = DecodedEvent::RoundStateChanged {
            state: RoundState::Funded,
        };
        run(tx.as_mut(), ROUND, 9, funded).await;

        let round = tx.find_round(ROUND).await.unwrap().unwrap();
        assert_eq!(round.total_withdrawn, Decimal::from(70));
        assert_eq!(round.state, RoundState::Funded);
        assert_eq!(round.updated_at, ctx(ROUND, 9, 0).block_timestamp);
    }

    #[tokio::test]
    async fn test_investment_beyond_decimal_range_fails_cleanly() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        run(tx.as_mut(), FACTORY, 5, deployed()).await;

        let half = Decimal::from_i128_with_scale(1i128 << 95, 0);
        let invest = DecodedEvent::Invested {
            investor: INVESTOR.to_string(),
            amount: half,
            tokens_issued: Decimal::ONE,
        };
        run(tx.as_mut(), ROUND, 6, invest.clone()).await;

        let err = RoundLifecycleHandler
            .handle(&ctx(ROUND, 7, 0), &invest, tx.as_mut())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandlerError::Overflow(Overflow("investment.amount"))
        ));
        let round = tx.find_round(ROUND).await.unwrap().unwrap();
        assert_eq!(round.total_raised, half);
    }
}
