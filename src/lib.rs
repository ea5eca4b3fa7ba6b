//! eth-failover - Ethereum JSON-RPC client with a failover endpoint
//!
//! [`FailoverClient`] holds a primary and a secondary connection to Ethereum
//! nodes and exposes the full [`EthClient`] surface over them. Each call is
//! tried on the primary first; if that fails for any reason other than the
//! caller canceling or running out of time, the same call is issued once
//! against the secondary and its outcome is returned as-is.
//!
//! Every attempt is recorded in Prometheus as `rpc_request_total` and
//! `rpc_latency_milliseconds`, labeled by operation, endpoint name and
//! outcome.
//!
//! # Example
//!
//! ```rust,no_run
//! use eth_failover::{CallContext, Config, EthClient, FailoverClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> eth_failover::Result<()> {
//!     let config = Config::new(
//!         "https://mainnet.example.org",
//!         "primary",
//!         "wss://backup.example.org",
//!         "backup",
//!     )?;
//!     let client = FailoverClient::new("indexer", "mainnet", config).await?;
//!
//!     let ctx = CallContext::background().with_timeout(Duration::from_secs(5));
//!     let head = client.block_number(&ctx).await?;
//!     println!("head: {head}");
//!
//!     client.close().await
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod failover;
pub mod logging;
pub mod telemetry;
pub mod traits;
pub mod types;

// Re-export main types at crate root
pub use config::Config;
pub use connection::Connection;
pub use error::{FailoverError, Result};
pub use failover::{
    CallFuture, FailoverClient, FailoverClientBuilder, FailoverDecision, FailoverPolicy,
};
pub use logging::Logger;
pub use telemetry::RpcMetrics;
pub use traits::EthClient;

pub use types::{CallContext, Header, Subscription, TransactionLookup};
