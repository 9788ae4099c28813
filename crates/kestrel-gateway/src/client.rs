use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tracing::debug;

use kestrel_types::events::WireEvent;

use crate::connection::Connection;
use crate::error::GatewayError;
use crate::frame::CacheRequest;
use crate::subscriptions::{SubscriptionHandle, SubscriptionId, SubscriptionMessage};

/// Every event received for one query, in receipt order.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub subscription_id: SubscriptionId,
    pub events: Vec<WireEvent>,
}

/// Request/response facade over a [`Connection`].
#[derive(Clone)]
pub struct CacheClient {
    connection: Arc<Connection>,
}

impl CacheClient {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Send `request` and collect its events up to `EOSE`.
    ///
    /// A `NOTICE` for the request fails it with [`GatewayError::Protocol`].
    /// Dropping the returned future cancels the request.
    pub async fn query(&self, request: CacheRequest) -> Result<QueryResult, GatewayError> {
        let mut handle = self.connection.send(&request)?;
        let mut events = Vec::new();

        loop {
            match handle.recv().await {
                Some(SubscriptionMessage::Event(event)) => events.push(event),
                Some(SubscriptionMessage::EndOfStream) => break,
                Some(SubscriptionMessage::Notice(message)) => {
                    return Err(GatewayError::Protocol(message));
                }
                Some(SubscriptionMessage::Failed(e)) => return Err(e),
                None => return Err(GatewayError::Closed),
            }
        }

        debug!("{} {} returned {} events", request.verb, handle.id(), events.len());
        Ok(QueryResult {
            subscription_id: handle.id().clone(),
            events,
        })
    }

    /// Open a long-lived subscription. Events are yielded as they arrive.
    pub fn subscribe(&self, request: CacheRequest) -> Result<LiveStream, GatewayError> {
        let handle = self.connection.send(&request)?;
        Ok(LiveStream { handle, done: false })
    }
}

/// Events pushed for one subscription.
///
/// Ends after `EOSE`, after yielding the error for a `NOTICE`, or after a
/// connection failure. Dropping the stream unsubscribes.
pub struct LiveStream {
    handle: SubscriptionHandle,
    done: bool,
}

impl LiveStream {
    pub fn id(&self) -> &SubscriptionId {
        self.handle.id()
    }

    pub fn cancel(self) {
        self.handle.cancel();
    }
}

impl Stream for LiveStream {
    type Item = Result<WireEvent, GatewayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let item = match std::task::ready!(this.handle.poll_recv(cx)) {
            Some(SubscriptionMessage::Event(event)) => return Poll::Ready(Some(Ok(event))),
            Some(SubscriptionMessage::EndOfStream) | None => None,
            Some(SubscriptionMessage::Notice(message)) => Some(Err(GatewayError::Protocol(message))),
            Some(SubscriptionMessage::Failed(e)) => Some(Err(e)),
        };
        this.done = true;
        Poll::Ready(item)
    }
}
