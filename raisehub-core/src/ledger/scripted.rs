//! In-memory ledger used by tests.

use super::{LedgerClient, LedgerError, LogQuery, RawLog};
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Default)]
struct ScriptedState {
    head: u64,
    logs: Vec<RawLog>,
    fail_at_block: Option<u64>,
    fail_head: bool,
    queries: Vec<LogQuery>,
}

/// A ledger whose head and logs are set by the test.
#[derive(Default)]
pub struct ScriptedLedger {
    state: Mutex<ScriptedState>,
}

impl ScriptedLedger {
    pub fn new(head: u64) -> Self {
        let ledger = Self::default();
        ledger.set_head(head);
        ledger
    }

    pub fn set_head(&self, head: u64) {
        self.lock().head = head;
    }

    pub fn push(&self, log: RawLog) {
        self.lock().logs.push(log);
    }

    /// Fail any log query whose range covers `block`.
    pub fn fail_at_block(&self, block: Option<u64>) {
        self.lock().fail_at_block = block;
    }

    pub fn fail_head(&self, fail: bool) {
        self.lock().fail_head = fail;
    }

    pub fn queries(&self) -> Vec<LogQuery> {
        self.lock().queries.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptedState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn block_number(&self) -> Result<u64, LedgerError> {
        let state = self.lock();
        if state.fail_head {
            return Err(LedgerError::Transport("connection refused".to_string()));
        }
        Ok(state.head)
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, LedgerError> {
        let mut state = self.lock();
        state.queries.push(query.clone());
        if state
            .fail_at_block
            .is_some_and(|block| (query.from_block..=query.to_block).contains(&block))
        {
            return Err(LedgerError::Provider("503 service unavailable".to_string()));
        }

        // Returned newest first so callers cannot rely on node ordering.
        let mut logs: Vec<RawLog> = state
            .logs
            .iter()
            .filter(|log| (query.from_block..=query.to_block).contains(&log.block_number))
            .filter(|log| query.addresses.contains(&log.address))
            .filter(|log| {
                query.event_signatures.is_empty()
                    || log
                        .topic0()
                        .is_some_and(|t| query.event_signatures.contains(t))
            })
            .cloned()
            .collect();
        logs.reverse();
        Ok(logs)
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, LedgerError> {
        Ok(1_700_000_000 + block_number * 12)
    }
}
