//! Primary/secondary failover facade.

mod builder;
mod client;
mod policy;

pub use builder::FailoverClientBuilder;
pub use client::{CallFuture, FailoverClient};
pub use policy::{FailoverDecision, FailoverPolicy};
