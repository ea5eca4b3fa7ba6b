//! Tests for the primary/secondary dispatch sequence.
//!
//! Scripted in-memory clients stand in for the two connections so each test
//! controls exactly how the primary and secondary answer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use prometheus::Registry;
use tokio_util::sync::CancellationToken;

use eth_failover::types::{Address, Bytes, Transaction, TxHash, H256, U256};
use eth_failover::{
    CallContext, Config, EthClient, FailoverClient, FailoverError, Logger, Result,
    TransactionLookup,
};

// ============================================================================
// Scripted client
// ============================================================================

type MakeError = fn() -> FailoverError;

struct Scripted {
    balance: U256,
    hash: TxHash,
    fail: Option<MakeError>,
    delay: Option<Duration>,
    close_error: Option<MakeError>,
    calls: AtomicUsize,
    closed: AtomicBool,
}

impl Scripted {
    fn ok(balance: u64) -> Self {
        Self {
            balance: U256::from(balance),
            hash: H256::from_low_u64_be(balance),
            fail: None,
            delay: None,
            close_error: None,
            calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn failing(make: MakeError) -> Self {
        Self {
            fail: Some(make),
            ..Self::ok(0)
        }
    }

    fn slow(balance: u64, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::ok(balance)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn answer<T: Send>(&self, ctx: &CallContext, value: T) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(make) = self.fail {
            return Err(make());
        }
        match self.delay {
            Some(delay) => {
                ctx.run(async move {
                    tokio::time::sleep(delay).await;
                    Ok::<_, FailoverError>(value)
                })
                .await
            }
            None => Ok(value),
        }
    }
}

#[async_trait]
impl EthClient for Scripted {
    async fn balance_at(
        &self,
        ctx: &CallContext,
        _account: Address,
        _block: Option<eth_failover::types::BlockId>,
    ) -> Result<U256> {
        self.answer(ctx, self.balance).await
    }

    async fn send_transaction(&self, ctx: &CallContext, _raw: Bytes) -> Result<TxHash> {
        self.answer(ctx, self.hash).await
    }

    async fn block_number(&self, ctx: &CallContext) -> Result<u64> {
        self.answer(ctx, self.balance.as_u64()).await
    }

    async fn transaction_by_hash(
        &self,
        ctx: &CallContext,
        hash: TxHash,
    ) -> Result<TransactionLookup> {
        let tx = Transaction {
            hash,
            ..Default::default()
        };
        self.answer(ctx, TransactionLookup::new(tx)).await
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        match self.close_error {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn config() -> Config {
    Config::new("mem://primary", "primary", "mem://backup", "backup").unwrap()
}

fn client(primary: Scripted, secondary: Scripted) -> (FailoverClient<Scripted>, Registry) {
    let registry = Registry::new();
    let client = FailoverClient::builder("test", "devnet")
        .config(config())
        .registry(registry.clone())
        .build_with(primary, secondary)
        .unwrap();
    (client, registry)
}

fn transport_error() -> FailoverError {
    FailoverError::Transport("connection reset by peer".into())
}

fn rpc_error() -> FailoverError {
    FailoverError::Rpc {
        code: -32000,
        message: "backup unavailable".into(),
        data: None,
    }
}

fn ctx() -> CallContext {
    CallContext::background()
}

fn count(client: &FailoverClient<Scripted>, method: &str, name: &str, success: bool) -> u64 {
    client
        .metrics()
        .expect("metrics enabled")
        .request_count(method, name, success)
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn primary_success_skips_secondary() {
    let (client, _registry) = client(Scripted::ok(100), Scripted::ok(200));

    let balance = client
        .balance_at(&ctx(), Address::repeat_byte(0x11), None)
        .await
        .unwrap();

    assert_eq!(balance, U256::from(100));
    assert_eq!(client.primary().calls(), 1);
    assert_eq!(client.secondary().calls(), 0);
    assert_eq!(count(&client, "BalanceAt", "primary", true), 1);
    assert_eq!(count(&client, "BalanceAt", "primary", false), 0);
    assert_eq!(count(&client, "BalanceAt", "backup", true), 0);
    assert_eq!(count(&client, "BalanceAt", "backup", false), 0);
}

#[tokio::test]
async fn primary_failure_uses_secondary() {
    let (client, _registry) = client(Scripted::failing(transport_error), Scripted::ok(7));

    let hash = client
        .send_transaction(&ctx(), Bytes::from(vec![0x02, 0xf8]))
        .await
        .unwrap();

    assert_eq!(hash, H256::from_low_u64_be(7));
    assert_eq!(client.primary().calls(), 1);
    assert_eq!(client.secondary().calls(), 1);
    assert_eq!(count(&client, "SendTransaction", "primary", false), 1);
    assert_eq!(count(&client, "SendTransaction", "backup", true), 1);

    let metrics = client.metrics().unwrap();
    assert_eq!(
        metrics.latency_sample_count("SendTransaction", "primary", false),
        1
    );
    assert_eq!(
        metrics.latency_sample_count("SendTransaction", "backup", true),
        1
    );
}

#[tokio::test]
async fn node_error_fails_over() {
    let (client, _registry) = client(Scripted::failing(rpc_error), Scripted::ok(9));
    assert_eq!(client.block_number(&ctx()).await.unwrap(), 9);
    assert_eq!(client.secondary().calls(), 1);
}

#[tokio::test]
async fn secondary_error_returned_verbatim() {
    let (client, _registry) = client(
        Scripted::failing(transport_error),
        Scripted::failing(rpc_error),
    );

    let err = client
        .balance_at(&ctx(), Address::zero(), None)
        .await
        .unwrap_err();

    match err {
        FailoverError::Rpc { code, message, .. } => {
            assert_eq!(code, -32000);
            assert_eq!(message, "backup unavailable");
        }
        other => panic!("expected the secondary's error, got {other:?}"),
    }
    assert_eq!(count(&client, "BalanceAt", "primary", false), 1);
    assert_eq!(count(&client, "BalanceAt", "backup", false), 1);
}

#[tokio::test]
async fn unimplemented_operation_fails_over_once() {
    let (client, _registry) = client(Scripted::ok(1), Scripted::ok(2));

    let err = client.peer_count(&ctx()).await.unwrap_err();

    assert!(matches!(err, FailoverError::NotImplemented("peer_count")));
    assert_eq!(count(&client, "PeerCount", "primary", false), 1);
    assert_eq!(count(&client, "PeerCount", "backup", false), 1);
}

// ============================================================================
// Cancellation and deadlines
// ============================================================================

#[tokio::test]
async fn canceled_primary_does_not_fail_over() {
    let (client, _registry) = client(Scripted::failing(|| FailoverError::Canceled), Scripted::ok(1));

    let err = client
        .balance_at(&ctx(), Address::zero(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, FailoverError::Canceled));
    assert_eq!(client.secondary().calls(), 0);
    assert_eq!(count(&client, "BalanceAt", "primary", false), 1);
    assert_eq!(count(&client, "BalanceAt", "backup", true), 0);
    assert_eq!(count(&client, "BalanceAt", "backup", false), 0);
}

#[tokio::test]
async fn deadline_exceeded_primary_does_not_fail_over() {
    let (client, _registry) = client(
        Scripted::failing(|| FailoverError::DeadlineExceeded),
        Scripted::ok(1),
    );

    let err = client.block_number(&ctx()).await.unwrap_err();

    assert!(matches!(err, FailoverError::DeadlineExceeded));
    assert_eq!(client.secondary().calls(), 0);
    assert_eq!(count(&client, "BlockNumber", "primary", false), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_context_stops_slow_primary() {
    let (client, _registry) = client(
        Scripted::slow(1, Duration::from_secs(30)),
        Scripted::ok(2),
    );
    let ctx = CallContext::background().with_timeout(Duration::from_millis(250));

    let err = client.block_number(&ctx).await.unwrap_err();

    assert!(matches!(err, FailoverError::DeadlineExceeded));
    assert_eq!(client.primary().calls(), 1);
    assert_eq!(client.secondary().calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn token_cancellation_stops_slow_primary() {
    let (client, _registry) = client(
        Scripted::slow(1, Duration::from_secs(30)),
        Scripted::ok(2),
    );
    let token = CancellationToken::new();
    let ctx = CallContext::background().with_cancellation(token.clone());

    let canceler = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    });

    let err = client.block_number(&ctx).await.unwrap_err();
    canceler.await.unwrap();

    assert!(matches!(err, FailoverError::Canceled));
    assert_eq!(client.secondary().calls(), 0);
}

// ============================================================================
// Labels and concurrency
// ============================================================================

#[tokio::test]
async fn transaction_by_hash_has_its_own_label() {
    let (client, _registry) = client(Scripted::ok(1), Scripted::ok(2));
    let hash = H256::repeat_byte(0xab);

    let lookup = client.transaction_by_hash(&ctx(), hash).await.unwrap();

    assert_eq!(lookup.transaction.hash, hash);
    assert!(lookup.is_pending);
    assert_eq!(count(&client, "TransactionByHash", "primary", true), 1);
    assert_eq!(count(&client, "TransactionReceipt", "primary", true), 0);
}

#[tokio::test]
async fn custom_operation_through_dispatch() {
    let (client, _registry) = client(Scripted::failing(transport_error), Scripted::ok(42));
    let ctx = ctx();

    let number = client
        .dispatch("LatestBlock", |c| c.block_number(&ctx))
        .await
        .unwrap();

    assert_eq!(number, 42);
    assert_eq!(count(&client, "LatestBlock", "primary", false), 1);
    assert_eq!(count(&client, "LatestBlock", "backup", true), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_are_counted_independently() {
    const OK_CALLS: usize = 40;
    const FAILOVER_CALLS: usize = 25;

    let (healthy, _r1) = client(Scripted::ok(1), Scripted::ok(2));
    let (degraded, _r2) = client(Scripted::failing(transport_error), Scripted::ok(2));
    let healthy = Arc::new(healthy);
    let degraded = Arc::new(degraded);

    let mut handles = Vec::new();
    for _ in 0..OK_CALLS {
        let client = Arc::clone(&healthy);
        handles.push(tokio::spawn(async move {
            client.block_number(&CallContext::background()).await
        }));
    }
    for _ in 0..FAILOVER_CALLS {
        let client = Arc::clone(&degraded);
        handles.push(tokio::spawn(async move {
            client.block_number(&CallContext::background()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(healthy.primary().calls(), OK_CALLS);
    assert_eq!(healthy.secondary().calls(), 0);
    assert_eq!(
        count(&healthy, "BlockNumber", "primary", true),
        OK_CALLS as u64
    );

    assert_eq!(degraded.primary().calls(), FAILOVER_CALLS);
    assert_eq!(degraded.secondary().calls(), FAILOVER_CALLS);
    assert_eq!(
        count(&degraded, "BlockNumber", "primary", false),
        FAILOVER_CALLS as u64
    );
    assert_eq!(
        count(&degraded, "BlockNumber", "backup", true),
        FAILOVER_CALLS as u64
    );
}

// ============================================================================
// Metrics lifecycle
// ============================================================================

#[tokio::test]
async fn metrics_disabled_records_nothing() {
    let registry = Registry::new();
    let client = FailoverClient::builder("test", "devnet")
        .config(config().enable_metrics(false))
        .registry(registry.clone())
        .build_with(Scripted::failing(transport_error), Scripted::ok(3))
        .unwrap();

    assert_eq!(client.block_number(&ctx()).await.unwrap(), 3);
    assert!(client.metrics().is_none());
    assert!(registry.gather().is_empty());
}

#[tokio::test]
async fn duplicate_app_chain_in_one_registry_is_rejected() {
    let (_first, registry) = client(Scripted::ok(1), Scripted::ok(2));

    let err = FailoverClient::builder("test", "devnet")
        .config(config())
        .registry(registry.clone())
        .build_with(Scripted::ok(1), Scripted::ok(2))
        .unwrap_err();

    assert!(matches!(err, FailoverError::Metrics(_)));
}

#[tokio::test]
async fn close_closes_both_and_unregisters() {
    let (client, registry) = client(Scripted::ok(1), Scripted::ok(2));
    client.block_number(&ctx()).await.unwrap();
    assert!(!registry.gather().is_empty());

    client.close().await.unwrap();

    assert!(client.primary().is_closed());
    assert!(client.secondary().is_closed());
    assert!(!client.metrics().unwrap().is_registered());
    assert!(registry.gather().is_empty());
}

#[tokio::test]
async fn close_reports_first_error_after_closing_both() {
    let primary = Scripted {
        close_error: Some(transport_error),
        ..Scripted::ok(1)
    };
    let secondary = Scripted {
        close_error: Some(rpc_error),
        ..Scripted::ok(2)
    };
    let (client, registry) = client(primary, secondary);

    let err = client.close().await.unwrap_err();

    assert!(matches!(err, FailoverError::Transport(_)));
    assert!(client.secondary().is_closed());
    assert!(registry.gather().is_empty());
}

#[tokio::test]
async fn drop_releases_registration() {
    let registry = Registry::new();
    for _ in 0..2 {
        let client = FailoverClient::builder("test", "devnet")
            .config(config())
            .registry(registry.clone())
            .build_with(Scripted::ok(1), Scripted::ok(2))
            .unwrap();
        client.block_number(&ctx()).await.unwrap();
    }
    assert!(registry.gather().is_empty());
}

// ============================================================================
// Logging
// ============================================================================

mod counting {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tracing::span::{Attributes, Id, Record};
    use tracing::{Event, Level, Metadata, Subscriber};

    /// Counts WARN events.
    pub struct Warnings(pub Arc<AtomicUsize>);

    impl Subscriber for Warnings {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, _: &Attributes<'_>) -> Id {
            Id::from_u64(1)
        }

        fn record(&self, _: &Id, _: &Record<'_>) {}

        fn record_follows_from(&self, _: &Id, _: &Id) {}

        fn event(&self, event: &Event<'_>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn enter(&self, _: &Id) {}

        fn exit(&self, _: &Id) {}
    }
}

#[tokio::test]
async fn failover_is_logged_through_injected_logger() {
    let warnings = Arc::new(AtomicUsize::new(0));
    let logger = Logger::new(tracing::Dispatch::new(counting::Warnings(Arc::clone(
        &warnings,
    ))));

    let client = FailoverClient::builder("test", "devnet")
        .config(config().enable_metrics(false))
        .logger(logger)
        .build_with(Scripted::failing(transport_error), Scripted::ok(1))
        .unwrap();

    client.block_number(&ctx()).await.unwrap();
    client.block_number(&ctx()).await.unwrap();

    assert_eq!(warnings.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancellation_is_not_logged_as_failover() {
    let warnings = Arc::new(AtomicUsize::new(0));
    let logger = Logger::new(tracing::Dispatch::new(counting::Warnings(Arc::clone(
        &warnings,
    ))));

    let client = FailoverClient::builder("test", "devnet")
        .config(config().enable_metrics(false))
        .logger(logger)
        .build_with(Scripted::failing(|| FailoverError::Canceled), Scripted::ok(1))
        .unwrap();

    assert!(client.block_number(&ctx()).await.is_err());
    assert_eq!(warnings.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn from_clients_without_metrics() {
    let client = FailoverClient::from_clients(
        "test",
        "devnet",
        config().enable_metrics(false),
        Scripted::ok(5),
        Scripted::ok(6),
    )
    .unwrap();

    assert_eq!(client.block_number(&ctx()).await.unwrap(), 5);
    assert!(client.metrics().is_none());
}
