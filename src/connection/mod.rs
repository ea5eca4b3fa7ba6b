//! A single JSON-RPC connection to an Ethereum node.
//!
//! `ws://` and `wss://` addresses get a websocket provider, which also
//! supports push subscriptions. Anything else is treated as an HTTP endpoint;
//! HTTP dialing only parses the address, so an unreachable HTTP node surfaces
//! on the first call instead of at construction.

mod pubsub;

use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use ethers::providers::{Http, Provider, Ws};
use ethers::types::U64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::traits::EthClient;
use crate::types::{
    Address, Block, BlockId, BlockNumber, Bytes, CallContext, Filter, Header, Log, Subscription,
    SyncingStatus, Transaction, TransactionLookup, TransactionReceipt, TxHash, TypedTransaction,
    H256, U256,
};
use crate::{FailoverError, Result};

enum Transport {
    Http(Provider<Http>),
    Ws(Provider<Ws>),
}

/// Connection to one node.
pub struct Connection {
    endpoint: String,
    transport: RwLock<Option<Arc<Transport>>>,
    /// Ends every subscription producer started on this connection.
    shutdown: CancellationToken,
}

impl Connection {
    /// Dial `url`.
    pub async fn dial(url: &str) -> Result<Self> {
        let transport = if is_websocket(url) {
            let provider = Provider::<Ws>::connect(url)
                .await
                .map_err(|e| connect_error(url, e))?;
            Transport::Ws(provider)
        } else {
            let provider = Provider::<Http>::try_from(url).map_err(|e| connect_error(url, e))?;
            Transport::Http(provider)
        };

        Ok(Self {
            endpoint: url.to_string(),
            transport: RwLock::new(Some(Arc::new(transport))),
            shutdown: CancellationToken::new(),
        })
    }

    /// Address this connection was dialed with.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self.transport().as_deref(), Ok(Transport::Ws(_)))
    }

    pub fn is_closed(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn transport(&self) -> Result<Arc<Transport>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| FailoverError::Closed(self.endpoint.clone()))
    }

    fn websocket(&self) -> Result<Provider<Ws>> {
        match self.transport()?.as_ref() {
            Transport::Ws(provider) => Ok(provider.clone()),
            Transport::Http(_) => Err(FailoverError::Unsupported(
                "subscriptions require a websocket endpoint",
            )),
        }
    }

    /// Issue a raw JSON-RPC request bounded by `ctx`.
    pub async fn request<P, R>(&self, ctx: &CallContext, method: &str, params: P) -> Result<R>
    where
        P: Serialize + Debug + Send + Sync,
        R: Serialize + DeserializeOwned + Debug + Send,
    {
        let transport = self.transport()?;
        match transport.as_ref() {
            Transport::Http(provider) => ctx.run(provider.request(method, params)).await,
            Transport::Ws(provider) => ctx.run(provider.request(method, params)).await,
        }
    }

    /// Like [`request`](Self::request), mapping a `null` result to
    /// [`FailoverError::NotFound`].
    async fn request_opt<P, R>(&self, ctx: &CallContext, method: &str, params: P) -> Result<R>
    where
        P: Serialize + Debug + Send + Sync,
        R: Serialize + DeserializeOwned + Debug + Send,
    {
        self.request::<P, Option<R>>(ctx, method, params)
            .await?
            .ok_or(FailoverError::NotFound)
    }
}

fn is_websocket(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}

fn connect_error(url: &str, err: impl std::fmt::Display) -> FailoverError {
    FailoverError::Connection {
        endpoint: url.to_string(),
        reason: err.to_string(),
    }
}

fn at(block: Option<BlockId>) -> BlockId {
    block.unwrap_or(BlockId::Number(BlockNumber::Latest))
}

const PENDING: BlockId = BlockId::Number(BlockNumber::Pending);

#[async_trait]
impl EthClient for Connection {
    async fn block_by_hash(&self, ctx: &CallContext, hash: H256) -> Result<Block<Transaction>> {
        self.request_opt(ctx, "eth_getBlockByHash", (hash, true)).await
    }

    async fn block_by_number(
        &self,
        ctx: &CallContext,
        number: BlockNumber,
    ) -> Result<Block<Transaction>> {
        self.request_opt(ctx, "eth_getBlockByNumber", (number, true)).await
    }

    async fn header_by_hash(&self, ctx: &CallContext, hash: H256) -> Result<Header> {
        self.request_opt(ctx, "eth_getBlockByHash", (hash, false)).await
    }

    async fn header_by_number(&self, ctx: &CallContext, number: BlockNumber) -> Result<Header> {
        self.request_opt(ctx, "eth_getBlockByNumber", (number, false)).await
    }

    async fn transaction_count(&self, ctx: &CallContext, block_hash: H256) -> Result<u64> {
        let count: U64 = self
            .request_opt(ctx, "eth_getBlockTransactionCountByHash", [block_hash])
            .await?;
        Ok(count.as_u64())
    }

    async fn transaction_in_block(
        &self,
        ctx: &CallContext,
        block_hash: H256,
        index: u64,
    ) -> Result<Transaction> {
        self.request_opt(
            ctx,
            "eth_getTransactionByBlockHashAndIndex",
            (block_hash, U64::from(index)),
        )
        .await
    }

    async fn subscribe_new_head(&self, ctx: &CallContext) -> Result<Subscription<Header>> {
        let provider = self.websocket()?;
        pubsub::new_heads(ctx, &self.endpoint, provider, self.shutdown.clone()).await
    }

    async fn block_number(&self, ctx: &CallContext) -> Result<u64> {
        let number: U64 = self.request(ctx, "eth_blockNumber", ()).await?;
        Ok(number.as_u64())
    }

    async fn transaction_by_hash(
        &self,
        ctx: &CallContext,
        hash: TxHash,
    ) -> Result<TransactionLookup> {
        let tx: Transaction = self
            .request_opt(ctx, "eth_getTransactionByHash", [hash])
            .await?;
        Ok(TransactionLookup::new(tx))
    }

    async fn transaction_receipt(
        &self,
        ctx: &CallContext,
        hash: TxHash,
    ) -> Result<TransactionReceipt> {
        self.request_opt(ctx, "eth_getTransactionReceipt", [hash]).await
    }

    /// Reads the sender from the node's copy of the transaction at
    /// `(block_hash, index)`, which must be `tx`.
    async fn transaction_sender(
        &self,
        ctx: &CallContext,
        tx: &Transaction,
        block_hash: H256,
        index: u64,
    ) -> Result<Address> {
        let found = self.transaction_in_block(ctx, block_hash, index).await?;
        if found.hash != tx.hash {
            return Err(FailoverError::InvalidResponse(format!(
                "transaction at {block_hash:?}[{index}] is {:?}, expected {:?}",
                found.hash, tx.hash
            )));
        }
        Ok(found.from)
    }

    async fn send_transaction(&self, ctx: &CallContext, raw: Bytes) -> Result<TxHash> {
        self.request(ctx, "eth_sendRawTransaction", [raw]).await
    }

    async fn balance_at(
        &self,
        ctx: &CallContext,
        account: Address,
        block: Option<BlockId>,
    ) -> Result<U256> {
        self.request(ctx, "eth_getBalance", (account, at(block))).await
    }

    async fn storage_at(
        &self,
        ctx: &CallContext,
        account: Address,
        key: H256,
        block: Option<BlockId>,
    ) -> Result<H256> {
        self.request(ctx, "eth_getStorageAt", (account, key, at(block))).await
    }

    async fn code_at(
        &self,
        ctx: &CallContext,
        account: Address,
        block: Option<BlockId>,
    ) -> Result<Bytes> {
        self.request(ctx, "eth_getCode", (account, at(block))).await
    }

    async fn nonce_at(
        &self,
        ctx: &CallContext,
        account: Address,
        block: Option<BlockId>,
    ) -> Result<U256> {
        self.request(ctx, "eth_getTransactionCount", (account, at(block))).await
    }

    async fn pending_balance_at(&self, ctx: &CallContext, account: Address) -> Result<U256> {
        self.balance_at(ctx, account, Some(PENDING)).await
    }

    async fn pending_storage_at(
        &self,
        ctx: &CallContext,
        account: Address,
        key: H256,
    ) -> Result<H256> {
        self.storage_at(ctx, account, key, Some(PENDING)).await
    }

    async fn pending_code_at(&self, ctx: &CallContext, account: Address) -> Result<Bytes> {
        self.code_at(ctx, account, Some(PENDING)).await
    }

    async fn pending_nonce_at(&self, ctx: &CallContext, account: Address) -> Result<U256> {
        self.nonce_at(ctx, account, Some(PENDING)).await
    }

    async fn pending_transaction_count(&self, ctx: &CallContext) -> Result<u64> {
        let count: U64 = self
            .request_opt(
                ctx,
                "eth_getBlockTransactionCountByNumber",
                [BlockNumber::Pending],
            )
            .await?;
        Ok(count.as_u64())
    }

    async fn call_contract(
        &self,
        ctx: &CallContext,
        msg: &TypedTransaction,
        block: Option<BlockId>,
    ) -> Result<Bytes> {
        self.request(ctx, "eth_call", (msg, at(block))).await
    }

    async fn call_contract_at_hash(
        &self,
        ctx: &CallContext,
        msg: &TypedTransaction,
        block_hash: H256,
    ) -> Result<Bytes> {
        self.request(ctx, "eth_call", (msg, BlockId::Hash(block_hash))).await
    }

    async fn pending_call_contract(
        &self,
        ctx: &CallContext,
        msg: &TypedTransaction,
    ) -> Result<Bytes> {
        self.call_contract(ctx, msg, Some(PENDING)).await
    }

    async fn estimate_gas(&self, ctx: &CallContext, msg: &TypedTransaction) -> Result<U256> {
        self.request(ctx, "eth_estimateGas", [msg]).await
    }

    async fn suggest_gas_price(&self, ctx: &CallContext) -> Result<U256> {
        self.request(ctx, "eth_gasPrice", ()).await
    }

    async fn suggest_gas_tip_cap(&self, ctx: &CallContext) -> Result<U256> {
        self.request(ctx, "eth_maxPriorityFeePerGas", ()).await
    }

    async fn filter_logs(&self, ctx: &CallContext, filter: &Filter) -> Result<Vec<Log>> {
        self.request(ctx, "eth_getLogs", [filter]).await
    }

    async fn subscribe_filter_logs(
        &self,
        ctx: &CallContext,
        filter: &Filter,
    ) -> Result<Subscription<Log>> {
        let provider = self.websocket()?;
        let shutdown = self.shutdown.clone();
        pubsub::logs(ctx, &self.endpoint, provider, filter.clone(), shutdown).await
    }

    async fn chain_id(&self, ctx: &CallContext) -> Result<U256> {
        self.request(ctx, "eth_chainId", ()).await
    }

    async fn network_id(&self, ctx: &CallContext) -> Result<U256> {
        let version: String = self.request(ctx, "net_version", ()).await?;
        U256::from_dec_str(&version).map_err(|e| {
            FailoverError::InvalidResponse(format!("net_version {version:?}: {e}"))
        })
    }

    async fn peer_count(&self, ctx: &CallContext) -> Result<u64> {
        let count: U64 = self.request(ctx, "net_peerCount", ()).await?;
        Ok(count.as_u64())
    }

    async fn sync_progress(&self, ctx: &CallContext) -> Result<SyncingStatus> {
        self.request(ctx, "eth_syncing", ()).await
    }

    /// Release the underlying transport and end open subscriptions. Later
    /// calls fail with [`FailoverError::Closed`]; closing twice is a no-op.
    async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        self.transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish()
    }
}
