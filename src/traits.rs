//! Core EthClient trait

use async_trait::async_trait;

use crate::types::{
    Address, Block, BlockId, BlockNumber, Bytes, CallContext, Filter, Header, Log, Subscription,
    SyncingStatus, Transaction, TransactionLookup, TransactionReceipt, TxHash, TypedTransaction,
    H256, U256,
};
use crate::{FailoverError, Result};

/// The logical operation set of an Ethereum node client.
///
/// Implemented by the physical [`Connection`](crate::Connection) and by the
/// [`FailoverClient`](crate::FailoverClient) facade, so the facade can stand
/// in anywhere a single client is expected. Every operation takes a
/// [`CallContext`] that bounds the call.
///
/// Lookups the node answers with `null` return [`FailoverError::NotFound`].
///
/// All operations default to [`FailoverError::NotImplemented`], so test
/// doubles only need to provide what they exercise.
#[async_trait]
pub trait EthClient: Send + Sync {
    // ===== Chain reading =====

    /// Full block (with transaction bodies) by hash.
    async fn block_by_hash(&self, _ctx: &CallContext, _hash: H256) -> Result<Block<Transaction>> {
        Err(FailoverError::NotImplemented("block_by_hash"))
    }

    /// Full block (with transaction bodies) by number or tag.
    async fn block_by_number(
        &self,
        _ctx: &CallContext,
        _number: BlockNumber,
    ) -> Result<Block<Transaction>> {
        Err(FailoverError::NotImplemented("block_by_number"))
    }

    /// Block header (transaction hashes only) by hash.
    async fn header_by_hash(&self, _ctx: &CallContext, _hash: H256) -> Result<Header> {
        Err(FailoverError::NotImplemented("header_by_hash"))
    }

    /// Block header (transaction hashes only) by number or tag.
    async fn header_by_number(&self, _ctx: &CallContext, _number: BlockNumber) -> Result<Header> {
        Err(FailoverError::NotImplemented("header_by_number"))
    }

    /// Number of transactions in the given block.
    async fn transaction_count(&self, _ctx: &CallContext, _block_hash: H256) -> Result<u64> {
        Err(FailoverError::NotImplemented("transaction_count"))
    }

    /// Transaction at `index` in the given block.
    async fn transaction_in_block(
        &self,
        _ctx: &CallContext,
        _block_hash: H256,
        _index: u64,
    ) -> Result<Transaction> {
        Err(FailoverError::NotImplemented("transaction_in_block"))
    }

    /// Subscribe to new chain heads.
    async fn subscribe_new_head(&self, _ctx: &CallContext) -> Result<Subscription<Header>> {
        Err(FailoverError::NotImplemented("subscribe_new_head"))
    }

    /// Most recent block number.
    async fn block_number(&self, _ctx: &CallContext) -> Result<u64> {
        Err(FailoverError::NotImplemented("block_number"))
    }

    // ===== Transactions =====

    /// Transaction by hash, with a flag telling whether it is still pending.
    async fn transaction_by_hash(
        &self,
        _ctx: &CallContext,
        _hash: TxHash,
    ) -> Result<TransactionLookup> {
        Err(FailoverError::NotImplemented("transaction_by_hash"))
    }

    /// Receipt of a mined transaction.
    async fn transaction_receipt(
        &self,
        _ctx: &CallContext,
        _hash: TxHash,
    ) -> Result<TransactionReceipt> {
        Err(FailoverError::NotImplemented("transaction_receipt"))
    }

    /// Sender of `tx`, given the block and index it was included at.
    async fn transaction_sender(
        &self,
        _ctx: &CallContext,
        _tx: &Transaction,
        _block_hash: H256,
        _index: u64,
    ) -> Result<Address> {
        Err(FailoverError::NotImplemented("transaction_sender"))
    }

    /// Submit a signed, RLP-encoded transaction. Returns its hash.
    async fn send_transaction(&self, _ctx: &CallContext, _raw: Bytes) -> Result<TxHash> {
        Err(FailoverError::NotImplemented("send_transaction"))
    }

    // ===== Account state =====

    /// Wei balance of `account` at `block` (latest when `None`).
    async fn balance_at(
        &self,
        _ctx: &CallContext,
        _account: Address,
        _block: Option<BlockId>,
    ) -> Result<U256> {
        Err(FailoverError::NotImplemented("balance_at"))
    }

    /// Storage slot `key` of `account` at `block` (latest when `None`).
    async fn storage_at(
        &self,
        _ctx: &CallContext,
        _account: Address,
        _key: H256,
        _block: Option<BlockId>,
    ) -> Result<H256> {
        Err(FailoverError::NotImplemented("storage_at"))
    }

    /// Contract code of `account` at `block` (latest when `None`).
    async fn code_at(
        &self,
        _ctx: &CallContext,
        _account: Address,
        _block: Option<BlockId>,
    ) -> Result<Bytes> {
        Err(FailoverError::NotImplemented("code_at"))
    }

    /// Nonce of `account` at `block` (latest when `None`).
    async fn nonce_at(
        &self,
        _ctx: &CallContext,
        _account: Address,
        _block: Option<BlockId>,
    ) -> Result<U256> {
        Err(FailoverError::NotImplemented("nonce_at"))
    }

    // ===== Pending state =====

    async fn pending_balance_at(&self, _ctx: &CallContext, _account: Address) -> Result<U256> {
        Err(FailoverError::NotImplemented("pending_balance_at"))
    }

    async fn pending_storage_at(
        &self,
        _ctx: &CallContext,
        _account: Address,
        _key: H256,
    ) -> Result<H256> {
        Err(FailoverError::NotImplemented("pending_storage_at"))
    }

    async fn pending_code_at(&self, _ctx: &CallContext, _account: Address) -> Result<Bytes> {
        Err(FailoverError::NotImplemented("pending_code_at"))
    }

    async fn pending_nonce_at(&self, _ctx: &CallContext, _account: Address) -> Result<U256> {
        Err(FailoverError::NotImplemented("pending_nonce_at"))
    }

    /// Number of transactions in the pending block.
    async fn pending_transaction_count(&self, _ctx: &CallContext) -> Result<u64> {
        Err(FailoverError::NotImplemented("pending_transaction_count"))
    }

    // ===== Contract calls and gas =====

    /// Execute a message call at `block` (latest when `None`) without
    /// creating a transaction.
    async fn call_contract(
        &self,
        _ctx: &CallContext,
        _msg: &TypedTransaction,
        _block: Option<BlockId>,
    ) -> Result<Bytes> {
        Err(FailoverError::NotImplemented("call_contract"))
    }

    /// Execute a message call against the state at `block_hash`.
    async fn call_contract_at_hash(
        &self,
        _ctx: &CallContext,
        _msg: &TypedTransaction,
        _block_hash: H256,
    ) -> Result<Bytes> {
        Err(FailoverError::NotImplemented("call_contract_at_hash"))
    }

    /// Execute a message call against the pending state.
    async fn pending_call_contract(
        &self,
        _ctx: &CallContext,
        _msg: &TypedTransaction,
    ) -> Result<Bytes> {
        Err(FailoverError::NotImplemented("pending_call_contract"))
    }

    /// Gas needed to execute `msg`.
    async fn estimate_gas(&self, _ctx: &CallContext, _msg: &TypedTransaction) -> Result<U256> {
        Err(FailoverError::NotImplemented("estimate_gas"))
    }

    /// Suggested legacy gas price.
    async fn suggest_gas_price(&self, _ctx: &CallContext) -> Result<U256> {
        Err(FailoverError::NotImplemented("suggest_gas_price"))
    }

    /// Suggested EIP-1559 priority fee.
    async fn suggest_gas_tip_cap(&self, _ctx: &CallContext) -> Result<U256> {
        Err(FailoverError::NotImplemented("suggest_gas_tip_cap"))
    }

    // ===== Logs =====

    /// Logs matching `filter`.
    async fn filter_logs(&self, _ctx: &CallContext, _filter: &Filter) -> Result<Vec<Log>> {
        Err(FailoverError::NotImplemented("filter_logs"))
    }

    /// Subscribe to logs matching `filter`.
    async fn subscribe_filter_logs(
        &self,
        _ctx: &CallContext,
        _filter: &Filter,
    ) -> Result<Subscription<Log>> {
        Err(FailoverError::NotImplemented("subscribe_filter_logs"))
    }

    // ===== Network =====

    /// EIP-155 chain id.
    async fn chain_id(&self, _ctx: &CallContext) -> Result<U256> {
        Err(FailoverError::NotImplemented("chain_id"))
    }

    /// Network id (`net_version`).
    async fn network_id(&self, _ctx: &CallContext) -> Result<U256> {
        Err(FailoverError::NotImplemented("network_id"))
    }

    /// Number of peers connected to the node.
    async fn peer_count(&self, _ctx: &CallContext) -> Result<u64> {
        Err(FailoverError::NotImplemented("peer_count"))
    }

    /// Sync progress; `SyncingStatus::IsFalse` when the node is not syncing.
    async fn sync_progress(&self, _ctx: &CallContext) -> Result<SyncingStatus> {
        Err(FailoverError::NotImplemented("sync_progress"))
    }

    // ===== Lifecycle =====

    /// Release the underlying connection(s).
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
