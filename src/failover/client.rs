//! The failover client facade.
//!
//! Every logical operation runs through [`FailoverClient::dispatch`]:
//!
//! ```text
//!   caller ──► dispatch("BalanceAt", |c| c.balance_at(..))
//!                 │
//!                 ▼
//!         ┌──────────────┐  ok   ┌───────────────────────────────┐
//!         │   primary    │ ────► │ observe(client=primary, true) │ ──► Ok
//!         └──────┬───────┘       └───────────────────────────────┘
//!                │ err: observe(client=primary, false)
//!                ▼
//!         canceled / deadline? ──yes──► return primary error
//!                │ no
//!                ▼
//!         ┌──────────────┐
//!         │  secondary   │ ──► observe(client=failover, ok?) ──► result as-is
//!         └──────────────┘
//! ```
//!
//! At most two attempts per call. Nothing is carried between calls.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::policy::{FailoverDecision, FailoverPolicy};
use crate::config::Config;
use crate::connection::Connection;
use crate::logging::Logger;
use crate::telemetry::RpcMetrics;
use crate::traits::EthClient;
use crate::types::{
    Address, Block, BlockId, BlockNumber, Bytes, CallContext, Filter, Header, Log, Subscription,
    SyncingStatus, Transaction, TransactionLookup, TransactionReceipt, TxHash, TypedTransaction,
    H256, U256,
};
use crate::Result;

use super::builder::FailoverClientBuilder;

/// Boxed future returned by a single attempt.
pub type CallFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Client facade over a primary and a secondary connection.
///
/// Implements [`EthClient`] by trying the primary first and, when the
/// primary fails with anything other than a caller-side cancellation or
/// deadline, trying the secondary exactly once. Each attempt is recorded in
/// [`RpcMetrics`] under the configured endpoint name.
pub struct FailoverClient<C = Connection> {
    pub(super) app: String,
    pub(super) chain: String,
    pub(super) config: Config,
    pub(super) primary: C,
    pub(super) secondary: C,
    pub(super) metrics: Option<RpcMetrics>,
    pub(super) policy: FailoverPolicy,
    pub(super) logger: Logger,
}

impl FailoverClient<Connection> {
    /// Create a builder for the given application and chain names.
    ///
    /// The names become the constant `app` and `chain` metric labels.
    pub fn builder(app: impl Into<String>, chain: impl Into<String>) -> FailoverClientBuilder {
        FailoverClientBuilder::new(app, chain)
    }

    /// Validate `config`, dial both endpoints and register metrics in the
    /// default Prometheus registry.
    ///
    /// Fails if either endpoint cannot be dialed; there is no primary-only mode.
    pub async fn new(
        app: impl Into<String>,
        chain: impl Into<String>,
        config: Config,
    ) -> Result<Self> {
        Self::builder(app, chain).config(config).build().await
    }
}

impl<C: EthClient> FailoverClient<C> {
    /// Build over two existing clients, registering metrics in the default
    /// registry. See [`FailoverClientBuilder::build_with`].
    pub fn from_clients(
        app: impl Into<String>,
        chain: impl Into<String>,
        config: Config,
        primary: C,
        secondary: C,
    ) -> Result<Self> {
        FailoverClientBuilder::new(app, chain)
            .config(config)
            .build_with(primary, secondary)
    }

    /// Configuration this client was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Application name (`app` label).
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Chain name (`chain` label).
    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Request metrics, or `None` when metrics are disabled.
    pub fn metrics(&self) -> Option<&RpcMetrics> {
        self.metrics.as_ref()
    }

    /// Primary client; every call goes here first.
    pub fn primary(&self) -> &C {
        &self.primary
    }

    /// Secondary client, used once when the primary fails.
    pub fn secondary(&self) -> &C {
        &self.secondary
    }

    /// Run one logical operation through the primary/failover sequence.
    ///
    /// `call` issues the operation against the client it is given; it is
    /// invoked with the primary and, if the policy allows, once more with
    /// the secondary. The secondary's outcome is returned unchanged.
    pub async fn dispatch<'a, T, F>(&'a self, method: &'static str, call: F) -> Result<T>
    where
        F: Fn(&'a C) -> CallFuture<'a, T>,
    {
        let started = Instant::now();
        let result = call(&self.primary).await;
        self.observe(method, started, &self.config.primary_name, result.is_ok());

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if self.policy.classify(&err) == FailoverDecision::NoFailover {
            self.logger.scope(|| {
                debug!(
                    method,
                    client = %self.config.primary_name,
                    error = %err,
                    "call aborted by caller context, not failing over"
                )
            });
            return Err(err);
        }

        self.logger.scope(|| {
            warn!(
                method,
                client = %self.config.primary_name,
                failover = %self.config.failover_name,
                error = %err,
                "primary rpc failed, using failover"
            )
        });
        drop(err);

        let started = Instant::now();
        let result = call(&self.secondary).await;
        self.observe(method, started, &self.config.failover_name, result.is_ok());
        result
    }

    fn observe(&self, method: &str, started: Instant, client: &str, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.observe(method, started, client, success);
        }
    }
}

#[async_trait]
impl<C: EthClient> EthClient for FailoverClient<C> {
    // ===== Chain reading =====

    async fn block_by_hash(&self, ctx: &CallContext, hash: H256) -> Result<Block<Transaction>> {
        self.dispatch("BlockByHash", |c| c.block_by_hash(ctx, hash)).await
    }

    async fn block_by_number(
        &self,
        ctx: &CallContext,
        number: BlockNumber,
    ) -> Result<Block<Transaction>> {
        self.dispatch("BlockByNumber", |c| c.block_by_number(ctx, number)).await
    }

    async fn header_by_hash(&self, ctx: &CallContext, hash: H256) -> Result<Header> {
        self.dispatch("HeaderByHash", |c| c.header_by_hash(ctx, hash)).await
    }

    async fn header_by_number(&self, ctx: &CallContext, number: BlockNumber) -> Result<Header> {
        self.dispatch("HeaderByNumber", |c| c.header_by_number(ctx, number)).await
    }

    async fn transaction_count(&self, ctx: &CallContext, block_hash: H256) -> Result<u64> {
        self.dispatch("TransactionCount", |c| c.transaction_count(ctx, block_hash)).await
    }

    async fn transaction_in_block(
        &self,
        ctx: &CallContext,
        block_hash: H256,
        index: u64,
    ) -> Result<Transaction> {
        self.dispatch("TransactionInBlock", |c| {
            c.transaction_in_block(ctx, block_hash, index)
        })
        .await
    }

    async fn subscribe_new_head(&self, ctx: &CallContext) -> Result<Subscription<Header>> {
        self.dispatch("SubscribeNewHead", |c| c.subscribe_new_head(ctx)).await
    }

    async fn block_number(&self, ctx: &CallContext) -> Result<u64> {
        self.dispatch("BlockNumber", |c| c.block_number(ctx)).await
    }

    // ===== Transactions =====

    async fn transaction_by_hash(
        &self,
        ctx: &CallContext,
        hash: TxHash,
    ) -> Result<TransactionLookup> {
        self.dispatch("TransactionByHash", |c| c.transaction_by_hash(ctx, hash)).await
    }

    async fn transaction_receipt(
        &self,
        ctx: &CallContext,
        hash: TxHash,
    ) -> Result<TransactionReceipt> {
        self.dispatch("TransactionReceipt", |c| c.transaction_receipt(ctx, hash)).await
    }

    async fn transaction_sender(
        &self,
        ctx: &CallContext,
        tx: &Transaction,
        block_hash: H256,
        index: u64,
    ) -> Result<Address> {
        self.dispatch("TransactionSender", |c| {
            c.transaction_sender(ctx, tx, block_hash, index)
        })
        .await
    }

    async fn send_transaction(&self, ctx: &CallContext, raw: Bytes) -> Result<TxHash> {
        self.dispatch("SendTransaction", |c| c.send_transaction(ctx, raw.clone())).await
    }

    // ===== Account state =====

    async fn balance_at(
        &self,
        ctx: &CallContext,
        account: Address,
        block: Option<BlockId>,
    ) -> Result<U256> {
        self.dispatch("BalanceAt", |c| c.balance_at(ctx, account, block)).await
    }

    async fn storage_at(
        &self,
        ctx: &CallContext,
        account: Address,
        key: H256,
        block: Option<BlockId>,
    ) -> Result<H256> {
        self.dispatch("StorageAt", |c| c.storage_at(ctx, account, key, block)).await
    }

    async fn code_at(
        &self,
        ctx: &CallContext,
        account: Address,
        block: Option<BlockId>,
    ) -> Result<Bytes> {
        self.dispatch("CodeAt", |c| c.code_at(ctx, account, block)).await
    }

    async fn nonce_at(
        &self,
        ctx: &CallContext,
        account: Address,
        block: Option<BlockId>,
    ) -> Result<U256> {
        self.dispatch("NonceAt", |c| c.nonce_at(ctx, account, block)).await
    }

    // ===== Pending state =====

    async fn pending_balance_at(&self, ctx: &CallContext, account: Address) -> Result<U256> {
        self.dispatch("PendingBalanceAt", |c| c.pending_balance_at(ctx, account)).await
    }

    async fn pending_storage_at(
        &self,
        ctx: &CallContext,
        account: Address,
        key: H256,
    ) -> Result<H256> {
        self.dispatch("PendingStorageAt", |c| {
            c.pending_storage_at(ctx, account, key)
        })
        .await
    }

    async fn pending_code_at(&self, ctx: &CallContext, account: Address) -> Result<Bytes> {
        self.dispatch("PendingCodeAt", |c| c.pending_code_at(ctx, account)).await
    }

    async fn pending_nonce_at(&self, ctx: &CallContext, account: Address) -> Result<U256> {
        self.dispatch("PendingNonceAt", |c| c.pending_nonce_at(ctx, account)).await
    }

    async fn pending_transaction_count(&self, ctx: &CallContext) -> Result<u64> {
        self.dispatch("PendingTransactionCount", |c| {
            c.pending_transaction_count(ctx)
        })
        .await
    }

    // ===== Contract calls and gas =====

    async fn call_contract(
        &self,
        ctx: &CallContext,
        msg: &TypedTransaction,
        block: Option<BlockId>,
    ) -> Result<Bytes> {
        self.dispatch("CallContract", |c| c.call_contract(ctx, msg, block)).await
    }

    async fn call_contract_at_hash(
        &self,
        ctx: &CallContext,
        msg: &TypedTransaction,
        block_hash: H256,
    ) -> Result<Bytes> {
        self.dispatch("CallContractAtHash", |c| {
            c.call_contract_at_hash(ctx, msg, block_hash)
        })
        .await
    }

    async fn pending_call_contract(
        &self,
        ctx: &CallContext,
        msg: &TypedTransaction,
    ) -> Result<Bytes> {
        self.dispatch("PendingCallContract", |c| c.pending_call_contract(ctx, msg)).await
    }

    async fn estimate_gas(&self, ctx: &CallContext, msg: &TypedTransaction) -> Result<U256> {
        self.dispatch("EstimateGas", |c| c.estimate_gas(ctx, msg)).await
    }

    async fn suggest_gas_price(&self, ctx: &CallContext) -> Result<U256> {
        self.dispatch("SuggestGasPrice", |c| c.suggest_gas_price(ctx)).await
    }

    async fn suggest_gas_tip_cap(&self, ctx: &CallContext) -> Result<U256> {
        self.dispatch("SuggestGasTipCap", |c| c.suggest_gas_tip_cap(ctx)).await
    }

    // ===== Logs =====

    async fn filter_logs(&self, ctx: &CallContext, filter: &Filter) -> Result<Vec<Log>> {
        self.dispatch("FilterLogs", |c| c.filter_logs(ctx, filter)).await
    }

    async fn subscribe_filter_logs(
        &self,
        ctx: &CallContext,
        filter: &Filter,
    ) -> Result<Subscription<Log>> {
        self.dispatch("SubscribeFilterLogs", |c| {
            c.subscribe_filter_logs(ctx, filter)
        })
        .await
    }

    // ===== Network =====

    async fn chain_id(&self, ctx: &CallContext) -> Result<U256> {
        self.dispatch("ChainID", |c| c.chain_id(ctx)).await
    }

    async fn network_id(&self, ctx: &CallContext) -> Result<U256> {
        self.dispatch("NetworkID", |c| c.network_id(ctx)).await
    }

    async fn peer_count(&self, ctx: &CallContext) -> Result<u64> {
        self.dispatch("PeerCount", |c| c.peer_count(ctx)).await
    }

    async fn sync_progress(&self, ctx: &CallContext) -> Result<SyncingStatus> {
        self.dispatch("SyncProgress", |c| c.sync_progress(ctx)).await
    }

    // ===== Lifecycle =====

    /// Close both connections, then unregister metrics.
    ///
    /// Both closes are always attempted; the first error is returned.
    async fn close(&self) -> Result<()> {
        let primary = self.primary.close().await;
        let secondary = self.secondary.close().await;
        if let Some(metrics) = &self.metrics {
            metrics.unregister();
        }
        self.logger.scope(|| {
            info!(app = %self.app, chain = %self.chain, "rpc client closed")
        });
        primary.and(secondary)
    }
}

impl<C> Drop for FailoverClient<C> {
    fn drop(&mut self) {
        if let Some(metrics) = &self.metrics {
            metrics.unregister();
        }
    }
}

impl<C> std::fmt::Debug for FailoverClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverClient")
            .field("app", &self.app)
            .field("chain", &self.chain)
            .field("primary", &self.config.primary_name)
            .field("failover", &self.config.failover_name)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}
