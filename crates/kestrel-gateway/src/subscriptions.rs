use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use kestrel_types::events::WireEvent;

use crate::error::GatewayError;
use crate::frame;

/// Correlation id of one request/stream over the shared socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubscriptionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for SubscriptionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Request sent, nothing received yet.
    Pending,
    /// At least one event received.
    Streaming,
    /// Ended with `EOSE`.
    Completed,
    /// Ended with a notice or a connection failure.
    Failed,
}

impl SubscriptionState {
    pub fn is_live(self) -> bool {
        matches!(self, Self::Pending | Self::Streaming)
    }
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub requested_at: DateTime<Utc>,
    pub state: SubscriptionState,
}

/// What a subscription's owner receives, in arrival order.
#[derive(Debug)]
pub enum SubscriptionMessage {
    Event(WireEvent),
    EndOfStream,
    Notice(String),
    Failed(GatewayError),
}

impl SubscriptionMessage {
    fn is_terminal(&self) -> bool {
        !matches!(self, Self::Event(_))
    }
}

/// A frame waiting for the socket.
#[derive(Debug)]
pub(crate) enum OutboundFrame {
    Request { id: SubscriptionId, text: String },
    Close(String),
}

/// How many finished subscriptions keep their final state around.
const RETIRED_HISTORY: usize = 64;

struct Slot {
    info: Subscription,
    tx: mpsc::UnboundedSender<SubscriptionMessage>,
}

#[derive(Default)]
struct Slots {
    live: HashMap<SubscriptionId, Slot>,
    /// Recently finished subscriptions, oldest first. Cancelled ones are
    /// not recorded.
    retired: VecDeque<Subscription>,
}

impl Slots {
    fn retire(&mut self, mut info: Subscription, state: SubscriptionState) {
        info.state = state;
        if self.retired.len() == RETIRED_HISTORY {
            self.retired.pop_front();
        }
        self.retired.push_back(info);
    }
}

/// Live subscription slots keyed by id.
///
/// The lock is only ever held for a map operation plus a non-blocking
/// channel send, never across an await point.
#[derive(Default)]
pub struct SubscriptionTable {
    slots: Mutex<Slots>,
}

impl SubscriptionTable {
    /// Create a slot under a fresh id that is not currently in use.
    pub fn register(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<SubscriptionMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        let mut id = SubscriptionId::generate();
        while slots.live.contains_key(&id) {
            id = SubscriptionId::generate();
        }

        slots.live.insert(
            id.clone(),
            Slot {
                info: Subscription {
                    id: id.clone(),
                    requested_at: Utc::now(),
                    state: SubscriptionState::Pending,
                },
                tx,
            },
        );
        (id, rx)
    }

    /// Hand a message to the slot for `id`. Terminal messages (end of
    /// stream, notice, failure) release the slot and record its final
    /// state. Returns `false` when no slot exists, in which case the message
    /// is dropped.
    pub fn deliver(&self, id: &str, message: SubscriptionMessage) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        if message.is_terminal() {
            let Some(slot) = slots.live.remove(id) else {
                return false;
            };
            let state = match message {
                SubscriptionMessage::EndOfStream => SubscriptionState::Completed,
                _ => SubscriptionState::Failed,
            };
            let _ = slot.tx.send(message);
            slots.retire(slot.info, state);
            return true;
        }

        let Some(slot) = slots.live.get_mut(id) else {
            return false;
        };
        slot.info.state = SubscriptionState::Streaming;
        if slot.tx.send(message).is_err() {
            // Receiver is gone; nobody will ever read this slot again.
            slots.live.remove(id);
            return false;
        }
        true
    }

    /// Release a slot without notifying its owner.
    pub fn remove(&self, id: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .remove(id)
            .is_some()
    }

    /// Whether `id` still holds a live slot.
    pub fn contains(&self, id: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .contains_key(id)
    }

    /// Fail and release every slot. Returns how many were live.
    pub fn fail_all(&self, error: &GatewayError) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let drained: Vec<Slot> = slots.live.drain().map(|(_, slot)| slot).collect();

        let failed = drained.len();
        for slot in drained {
            let _ = slot.tx.send(SubscriptionMessage::Failed(error.clone()));
            slots.retire(slot.info, SubscriptionState::Failed);
        }
        failed
    }

    /// A live subscription, or one of the most recently finished ones.
    pub fn get(&self, id: &str) -> Option<Subscription> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.live.get(id) {
            return Some(slot.info.clone());
        }
        slots
            .retired
            .iter()
            .rev()
            .find(|info| info.id.as_str() == id)
            .cloned()
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owner's end of one subscription.
///
/// Dropping the handle before the subscription finished releases the slot
/// and asks the server to stop with a CLOSE frame. Events that arrive after
/// that are discarded by the table.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<SubscriptionMessage>,
    table: Arc<SubscriptionTable>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    finished: bool,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        id: SubscriptionId,
        rx: mpsc::UnboundedReceiver<SubscriptionMessage>,
        table: Arc<SubscriptionTable>,
        outbound: mpsc::UnboundedSender<OutboundFrame>,
    ) -> Self {
        Self {
            id,
            rx,
            table,
            outbound,
            finished: false,
        }
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub async fn recv(&mut self) -> Option<SubscriptionMessage> {
        std::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<SubscriptionMessage>> {
        if self.finished {
            return Poll::Ready(None);
        }
        let message = std::task::ready!(self.rx.poll_recv(cx));
        match &message {
            Some(message) if !message.is_terminal() => {}
            _ => self.finished = true,
        }
        Poll::Ready(message)
    }

    /// Stop the subscription now. Same as dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.table.remove(self.id.as_str()) {
            debug!("Cancelling subscription {}", self.id);
            let _ = self
                .outbound
                .send(OutboundFrame::Close(frame::encode_close(&self.id)));
        }
    }
}
