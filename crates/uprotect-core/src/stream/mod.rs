// ── Update stream ──
//
// Everything between the websocket and the bootstrap: typed update
// messages, the reconnecting session driver, and the event coalescer.

mod coalesce;
mod reconnect;
mod update;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

pub use coalesce::{Coalesced, EventCoalescer};
pub use reconnect::{ConnectionEvent, ConnectionState, Reconnector};
pub use update::{UpdateAction, UpdateMessage};

/// `Stream` of coalesced deliveries.
///
/// A subscriber that falls behind skips the deliveries it missed rather
/// than ending the stream.
pub struct EventStream<T: Clone + Send + Sync + 'static> {
    inner: BroadcastStream<Arc<Coalesced<T>>>,
}

impl<T: Clone + Send + Sync + 'static> EventStream<T> {
    pub(crate) fn new(receiver: broadcast::Receiver<Arc<Coalesced<T>>>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Stream for EventStream<T> {
    type Item = Arc<Coalesced<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(item))) => return Poll::Ready(Some(item)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
