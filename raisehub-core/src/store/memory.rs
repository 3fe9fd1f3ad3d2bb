//! In-process entity store.
//!
//! Transactions work on a private copy of the state taken at `begin` and
//! swap it back in on `commit`, which gives the same all-or-nothing
//! visibility as the PostgreSQL store under a single writer.

use super::{Checkpoint, EntityStore, StoreError, StoreTransaction, UpsertOutcome};
use crate::aggregate::StatsDelta;
use crate::entities::founder_profile::FounderProfile;
use crate::entities::investment::Investment;
use crate::entities::platform_stats::PlatformStats;
use crate::entities::round::Round;
use crate::entities::sell_order::{SellOrder, SellOrderUpdate};
use crate::entities::trade::Trade;
use crate::entities::user::User;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Full contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub users: BTreeMap<String, User>,
    pub founder_profiles: BTreeMap<String, FounderProfile>,
    pub rounds: BTreeMap<String, Round>,
    pub investments: BTreeMap<String, Investment>,
    pub sell_orders: BTreeMap<String, SellOrder>,
    pub trades: BTreeMap<String, Trade>,
    pub platform_stats: PlatformStats,
    pub checkpoint: Checkpoint,
}

#[derive(Default)]
struct MemoryStoreInner {
    state: Mutex<MemorySnapshot>,
    unavailable: AtomicBool,
}

/// Entity store that keeps everything in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state.
    pub fn snapshot(&self) -> MemorySnapshot {
        self.lock().clone()
    }

    /// Make every subsequent `begin` and `commit` fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn is_unavailable(&self) -> bool {
        self.inner.unavailable.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MemorySnapshot> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        if self.is_unavailable() {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            working: self.snapshot(),
        }))
    }

    async fn checkpoint(&self) -> Result<Checkpoint, StoreError> {
        Ok(self.lock().checkpoint)
    }

    async fn round_addresses(&self) -> Result<Vec<String>, StoreError> {
        let state = self.lock();
        let mut rounds: Vec<&Round> = state.rounds.values().collect();
        rounds.sort_by(|a, b| {
            a.deployed_block
                .cmp(&b.deployed_block)
                .then_with(|| a.address.cmp(&b.address))
        });
        Ok(rounds.into_iter().map(|r| r.address.clone()).collect())
    }
}

struct MemoryTransaction {
    store: MemoryStore,
    working: MemorySnapshot,
}

fn upsert<V: Clone>(map: &mut BTreeMap<String, V>, key: &str, value: &V) -> UpsertOutcome {
    UpsertOutcome::from_inserted(map.insert(key.to_string(), value.clone()).is_none())
}

fn insert_new<V: Clone>(map: &mut BTreeMap<String, V>, key: &str, value: &V) -> bool {
    if map.contains_key(key) {
        return false;
    }
    map.insert(key.to_string(), value.clone());
    true
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_user(&mut self, address: &str) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.get(address).cloned())
    }

    async fn upsert_user(&mut self, user: &User) -> Result<UpsertOutcome, StoreError> {
        let registered_at = self
            .working
            .users
            .get(&user.address)
            .map_or(user.registered_at, |existing| existing.registered_at);
        let user = User {
            registered_at,
            ..user.clone()
        };
        Ok(upsert(&mut self.working.users, &user.address, &user))
    }

    async fn find_founder_profile(
        &mut self,
        address: &str,
    ) -> Result<Option<FounderProfile>, StoreError> {
        Ok(self.working.founder_profiles.get(address).cloned())
    }

    async fn upsert_founder_profile(
        &mut self,
        profile: &FounderProfile,
    ) -> Result<UpsertOutcome, StoreError> {
        let created_at = self
            .working
            .founder_profiles
            .get(&profile.address)
            .map_or(profile.created_at, |existing| existing.created_at);
        let profile = FounderProfile {
            created_at,
            ..profile.clone()
        };
        Ok(upsert(
            &mut self.working.founder_profiles,
            &profile.address,
            &profile,
        ))
    }

    async fn find_round(&mut self, address: &str) -> Result<Option<Round>, StoreError> {
        Ok(self.working.rounds.get(address).cloned())
    }

    async fn upsert_round(&mut self, round: &Round) -> Result<UpsertOutcome, StoreError> {
        let round = match self.working.rounds.get(&round.address) {
            Some(existing) => Round {
                deployed_block: existing.deployed_block,
                created_at: existing.created_at,
                ..round.clone()
            },
            None => round.clone(),
        };
        Ok(upsert(&mut self.working.rounds, &round.address, &round))
    }

    async fn find_investment(&mut self, id: &str) -> Result<Option<Investment>, StoreError> {
        Ok(self.working.investments.get(id).cloned())
    }

    async fn upsert_investment(
        &mut self,
        investment: &Investment,
    ) -> Result<UpsertOutcome, StoreError> {
        let first_invested_at = self
            .working
            .investments
            .get(&investment.id)
            .map_or(investment.first_invested_at, |existing| {
                existing.first_invested_at
            });
        let investment = Investment {
            first_invested_at,
            ..investment.clone()
        };
        Ok(upsert(
            &mut self.working.investments,
            &investment.id,
            &investment,
        ))
    }

    async fn find_sell_order(&mut self, order_id: &str) -> Result<Option<SellOrder>, StoreError> {
        Ok(self.working.sell_orders.get(order_id).cloned())
    }

    async fn insert_sell_order(&mut self, order: &SellOrder) -> Result<bool, StoreError> {
        Ok(insert_new(
            &mut self.working.sell_orders,
            &order.order_id,
            order,
        ))
    }

    async fn update_sell_order(&mut self, update: &SellOrderUpdate) -> Result<bool, StoreError> {
        let Some(order) = self.working.sell_orders.get_mut(&update.order_id) else {
            return Ok(false);
        };
        if let Some(amount) = update.amount {
            order.amount = amount;
        }
        order.active = update.active;
        order.updated_at = update.updated_at;
        Ok(true)
    }

    async fn find_trade(&mut self, id: &str) -> Result<Option<Trade>, StoreError> {
        Ok(self.working.trades.get(id).cloned())
    }

    async fn insert_trade(&mut self, trade: &Trade) -> Result<bool, StoreError> {
        Ok(insert_new(&mut self.working.trades, &trade.id, trade))
    }

    async fn apply_stats(
        &mut self,
        delta: &StatsDelta,
        updated_at: i64,
    ) -> Result<(), StoreError> {
        Ok(self.working.platform_stats.apply(delta, updated_at)?)
    }

    async fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.working.checkpoint = *checkpoint;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.store.is_unavailable() {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        let MemoryTransaction { store, working } = *self;
        *store.lock() = working;
        Ok(())
    }
}
