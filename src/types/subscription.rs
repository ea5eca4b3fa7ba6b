//! Push subscriptions (new heads, logs).
//!
//! A [`Subscription`] is the receiving half of a bounded channel fed by a
//! producer task. Dropping it, or calling [`Subscription::unsubscribe`],
//! aborts the producer, which in turn drops the upstream node subscription.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

/// Default number of items buffered between the producer task and the consumer.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 64;

pin_project! {
    /// Stream of items pushed by the node.
    ///
    /// Ends when the upstream subscription closes.
    pub struct Subscription<T> {
        #[pin]
        inner: ReceiverStream<T>,
        producer: Option<JoinHandle<()>>,
    }

    impl<T> PinnedDrop for Subscription<T> {
        fn drop(this: Pin<&mut Self>) {
            if let Some(producer) = this.project().producer.take() {
                producer.abort();
            }
        }
    }
}

impl<T> Subscription<T> {
    /// Wrap a receiver fed by `producer`.
    pub fn new(rx: mpsc::Receiver<T>, producer: JoinHandle<()>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
            producer: Some(producer),
        }
    }

    /// Subscription backed by a receiver with no producer task.
    ///
    /// Useful for tests and for clients that feed the channel themselves.
    pub fn from_receiver(rx: mpsc::Receiver<T>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
            producer: None,
        }
    }

    /// Stop the subscription and release the producer.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.project().inner.poll_next(cx)
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("has_producer", &self.producer.is_some())
            .finish()
    }
}
