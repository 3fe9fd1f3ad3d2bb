//! Discovery of round instances deployed by the factory.
//!
//! Two sources exist. At startup an eager backfill walks the factory's
//! deployment logs from the start block up to the head. While running, the
//! indexer registers every `RoundDeployed` it sees before fetching the
//! instance logs of the same window. The backfill result, when non-empty,
//! replaces the persisted set as the initial instance list; the two are
//! never merged.

use crate::config::{ContractsConfig, DiscoveryConfig};
use crate::decoding::{self, ContractKind};
use crate::ledger::{LedgerClient, LogQuery};
use crate::store::{EntityStore, StoreError};
use alloy::primitives::{Address, B256};
use itertools::Itertools;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Walk `[start_block, head]` in inclusive windows and collect every
/// instance address announced by `factory`.
///
/// The head is read once. Any failure abandons the walk and returns an
/// empty list so the caller falls back to the live factory rule.
pub async fn backfill_instances(
    client: &dyn LedgerClient,
    factory: Address,
    signature: B256,
    start_block: u64,
    chunk_size: u64,
) -> Vec<Address> {
    let head = match client.block_number().await {
        Ok(head) => head,
        Err(e) => {
            warn!(error = %e, "Backfill could not read chain head, using factory rule");
            return Vec::new();
        }
    };
    let chunk_size = chunk_size.max(1);

    let mut found = Vec::new();
    let mut from_block = start_block;
    while from_block <= head {
        let to_block = from_block.saturating_add(chunk_size - 1).min(head);
        let query = LogQuery::new(vec![factory], from_block, to_block).with_event(signature);

        let mut logs = match client.logs(&query).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(
                    from_block,
                    to_block,
                    error = %e,
                    "Backfill window failed, using factory rule"
                );
                return Vec::new();
            }
        };
        logs.sort_by_key(|log| log.position());

        for log in &logs {
            match decoding::instance_address(log) {
                Ok(address) => found.push(address),
                Err(e) => {
                    warn!(error = %e, "Backfill hit an undecodable deployment, using factory rule");
                    return Vec::new();
                }
            }
        }
        debug!(from_block, to_block, total = found.len(), "Backfill window scanned");

        from_block = to_block + 1;
    }

    found.into_iter().unique().collect()
}

/// How the initial round-instance set is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryStrategy {
    /// Instances found by the eager backfill.
    Explicit(Vec<Address>),
    /// Rely on the factory's deployment events seen while indexing.
    FactoryRule,
}

impl DiscoveryStrategy {
    /// Run the backfill once and pick the strategy.
    pub async fn resolve(
        client: &dyn LedgerClient,
        factory: Address,
        config: &DiscoveryConfig,
    ) -> Self {
        let instances = backfill_instances(
            client,
            factory,
            decoding::round_deployed_signature(),
            config.start_block,
            config.chunk_size,
        )
        .await;

        if instances.is_empty() {
            info!("No rounds found by backfill, discovering through factory events");
            DiscoveryStrategy::FactoryRule
        } else {
            info!(rounds = instances.len(), "Rounds discovered by backfill");
            DiscoveryStrategy::Explicit(instances)
        }
    }

    /// Build the monitored set.
    ///
    /// Under the factory rule the set is seeded from rounds already in the
    /// store, so a restart does not lose instances found by earlier runs.
    pub async fn monitored(
        self,
        contracts: ContractsConfig,
        store: &dyn EntityStore,
    ) -> Result<MonitoredContracts, StoreError> {
        let instances = match self {
            DiscoveryStrategy::Explicit(instances) => instances,
            DiscoveryStrategy::FactoryRule => store
                .round_addresses()
                .await?
                .iter()
                .filter_map(|address| match Address::from_str(address) {
                    Ok(address) => Some(address),
                    Err(e) => {
                        warn!(%address, error = %e, "Ignoring stored round with a bad address");
                        None
                    }
                })
                .collect(),
        };

        let mut monitored = MonitoredContracts::new(contracts);
        for instance in instances {
            monitored.register_instance(instance);
        }
        Ok(monitored)
    }
}

/// Every contract the indexer reads logs from.
#[derive(Debug, Clone)]
pub struct MonitoredContracts {
    contracts: ContractsConfig,
    instances: Vec<Address>,
    known: HashSet<Address>,
}

impl MonitoredContracts {
    pub fn new(contracts: ContractsConfig) -> Self {
        Self {
            contracts,
            instances: Vec::new(),
            known: HashSet::new(),
        }
    }

    pub fn factory(&self) -> Address {
        self.contracts.factory
    }

    /// Add a round instance. Returns false if it was already monitored.
    pub fn register_instance(&mut self, address: Address) -> bool {
        if self.kind_of(&address).is_some() {
            return false;
        }
        self.known.insert(address);
        self.instances.push(address);
        true
    }

    /// Round instances in the order they were registered.
    pub fn instances(&self) -> &[Address] {
        &self.instances
    }

    pub fn kind_of(&self, address: &Address) -> Option<ContractKind> {
        if *address == self.contracts.registry {
            Some(ContractKind::Registry)
        } else if *address == self.contracts.factory {
            Some(ContractKind::RoundFactory)
        } else if *address == self.contracts.market {
            Some(ContractKind::Market)
        } else if self.known.contains(address) {
            Some(ContractKind::Round)
        } else {
            None
        }
    }

    /// Log query for everything except the factory over a block range.
    pub fn event_query(&self, from_block: u64, to_block: u64) -> LogQuery {
        let mut addresses = vec![self.contracts.registry, self.contracts.market];
        addresses.extend_from_slice(&self.instances);

        let mut query = LogQuery::new(addresses, from_block, to_block);
        for kind in [ContractKind::Registry, ContractKind::Market, ContractKind::Round] {
            for signature in decoding::signatures_for(kind) {
                query = query.with_event(signature);
            }
        }
        query
    }

    /// Log query for the factory's deployment events over a block range.
    pub fn factory_query(&self, from_block: u64, to_block: u64) -> LogQuery {
        LogQuery::new(vec![self.contracts.factory], from_block, to_block)
            .with_event(decoding::round_deployed_signature())
    }
}
