//! Public types for the eth-failover API.
//!
//! Chain data types come from `ethers` so callers can hand results
//! straight to the rest of the ethers ecosystem.

mod context;
mod subscription;

pub use context::CallContext;
pub use subscription::{DEFAULT_SUBSCRIPTION_BUFFER, Subscription};

pub use ethers::types::transaction::eip2718::TypedTransaction;
pub use ethers::types::{
    Address, Block, BlockId, BlockNumber, Bytes, Filter, Log, SyncingStatus, Transaction,
    TransactionReceipt, TxHash, H256, U256,
};

use serde::{Deserialize, Serialize};

/// Block without transaction bodies; the node's view of a block header.
pub type Header = Block<TxHash>;

/// Result of a transaction-by-hash lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLookup {
    pub transaction: Transaction,
    /// `true` while the transaction sits in the mempool (no block yet).
    pub is_pending: bool,
}

impl TransactionLookup {
    /// Build a lookup result, deriving the pending flag from the block hash.
    pub fn new(transaction: Transaction) -> Self {
        let is_pending = transaction.block_hash.is_none();
        Self {
            transaction,
            is_pending,
        }
    }
}
