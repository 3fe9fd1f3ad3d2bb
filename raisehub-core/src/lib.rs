#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod aggregate;
pub mod config;
pub mod decoding;
pub mod discovery;
pub mod entities;
pub mod framework;
pub mod handlers;
pub mod ledger;
pub mod processors;
pub mod router;
pub mod store;
