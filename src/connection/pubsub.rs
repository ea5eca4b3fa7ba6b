//! Websocket subscription producers.
//!
//! Each subscription runs in its own task that owns a handle to the websocket
//! provider, opens the node subscription, and forwards items into a bounded
//! channel. The task reports whether the node accepted the subscription over a
//! oneshot before it starts forwarding. Canceling the connection's shutdown
//! token ends every producer, which closes its channel.

use ethers::providers::{Middleware, Provider, Ws};
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::types::{
    CallContext, DEFAULT_SUBSCRIPTION_BUFFER, Filter, Header, Log, Subscription,
};
use crate::{FailoverError, Result};

type Ready = oneshot::Sender<Result<()>>;

pub(super) async fn new_heads(
    ctx: &CallContext,
    endpoint: &str,
    provider: Provider<Ws>,
    shutdown: CancellationToken,
) -> Result<Subscription<Header>> {
    let (tx, rx) = mpsc::channel(DEFAULT_SUBSCRIPTION_BUFFER);
    let (ready_tx, ready_rx) = oneshot::channel();
    let closed = FailoverError::Closed(endpoint.to_string());

    let producer = tokio::spawn(async move {
        let subscribed = tokio::select! {
            _ = shutdown.cancelled() => return fail(ready_tx, closed),
            subscribed = provider.subscribe_blocks() => subscribed,
        };
        let stream = match subscribed {
            Ok(stream) => stream,
            Err(e) => return fail(ready_tx, e.into()),
        };
        let _ = ready_tx.send(Ok(()));
        forward(stream, tx, shutdown).await;
    });

    established(ctx, endpoint, ready_rx, producer, rx).await
}

pub(super) async fn logs(
    ctx: &CallContext,
    endpoint: &str,
    provider: Provider<Ws>,
    filter: Filter,
    shutdown: CancellationToken,
) -> Result<Subscription<Log>> {
    let (tx, rx) = mpsc::channel(DEFAULT_SUBSCRIPTION_BUFFER);
    let (ready_tx, ready_rx) = oneshot::channel();
    let closed = FailoverError::Closed(endpoint.to_string());

    let producer = tokio::spawn(async move {
        let subscribed = tokio::select! {
            _ = shutdown.cancelled() => return fail(ready_tx, closed),
            subscribed = provider.subscribe_logs(&filter) => subscribed,
        };
        let stream = match subscribed {
            Ok(stream) => stream,
            Err(e) => return fail(ready_tx, e.into()),
        };
        let _ = ready_tx.send(Ok(()));
        forward(stream, tx, shutdown).await;
    });

    established(ctx, endpoint, ready_rx, producer, rx).await
}

/// Copy items from `stream` into `tx` until the stream ends, the receiver
/// goes away, or `shutdown` is canceled.
async fn forward<S>(stream: S, tx: mpsc::Sender<S::Item>, shutdown: CancellationToken)
where
    S: Stream,
{
    tokio::pin!(stream);
    loop {
        let item = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            item = stream.next() => item,
        };
        let Some(item) = item else { break };
        let sent = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            sent = tx.send(item) => sent,
        };
        if sent.is_err() {
            break;
        }
    }
}

fn fail(ready: Ready, err: FailoverError) {
    let _ = ready.send(Err(err));
}

/// Wait, bounded by `ctx`, for the producer to report the node's answer.
async fn established<T>(
    ctx: &CallContext,
    endpoint: &str,
    ready: oneshot::Receiver<Result<()>>,
    producer: JoinHandle<()>,
    rx: mpsc::Receiver<T>,
) -> Result<Subscription<T>> {
    let setup = async {
        ready
            .await
            .unwrap_or_else(|_| Err(FailoverError::Closed(endpoint.to_string())))
    };
    match ctx.run(setup).await {
        Ok(()) => Ok(Subscription::new(rx, producer)),
        Err(e) => {
            producer.abort();
            Err(e)
        }
    }
}
