//! Long-running processors.
//!
//! - `IndexerRunner`: walks the ledger from the checkpoint, routes every
//!   monitored log and keeps polling for new blocks until shutdown

pub mod indexer;

pub use indexer::{IndexerError, IndexerRunner, SyncReport};
