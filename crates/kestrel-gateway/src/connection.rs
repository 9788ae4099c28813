use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{EndpointProvider, ReconnectPolicy, ServerRole};
use crate::error::GatewayError;
use crate::frame::{self, CacheRequest, IncomingFrame};
use crate::subscriptions::{
    OutboundFrame, Subscription, SubscriptionHandle, SubscriptionMessage, SubscriptionTable,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32, next_retry_ms: u64 },
}

/// One persistent websocket to the server for a single role, shared by every
/// subscription issued through it.
///
/// The socket is owned by a background worker task. Callers only touch the
/// subscription table and the outbound frame queue, so `send` never blocks
/// on the network. Dropping the connection stops the worker.
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    role: ServerRole,
    endpoints: Arc<dyn EndpointProvider>,
    policy: ReconnectPolicy,
    subscriptions: Arc<SubscriptionTable>,
    outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
    outbound_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<OutboundFrame>>>,
    state: watch::Sender<ConnectionState>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

enum LoopExit {
    Shutdown,
    EndpointChanged,
    Dropped(String),
}

impl Connection {
    pub fn new(
        role: ServerRole,
        endpoints: Arc<dyn EndpointProvider>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                role,
                endpoints,
                policy,
                subscriptions: Arc::new(SubscriptionTable::default()),
                outbound_tx,
                outbound_rx: Arc::new(tokio::sync::Mutex::new(outbound_rx)),
                state: watch::Sender::new(ConnectionState::Disconnected),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn role(&self) -> ServerRole {
        self.inner.role
    }

    /// Start the connection worker if it is not already running.
    /// Must be called from within a tokio runtime.
    pub fn open(&self) {
        let mut worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return;
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_connection_loop(self.inner.clone(), shutdown.clone()));
        *worker = Some(Worker { shutdown, handle });
    }

    /// Register a new subscription and queue its `REQ` frame.
    ///
    /// Returns as soon as the frame is queued. The frame goes out once the
    /// socket is up; if the connect attempt fails instead, the subscription
    /// receives the failure.
    pub fn send(&self, request: &CacheRequest) -> Result<SubscriptionHandle, GatewayError> {
        self.open();

        let (id, rx) = self.inner.subscriptions.register();
        let handle = SubscriptionHandle::new(
            id.clone(),
            rx,
            self.inner.subscriptions.clone(),
            self.inner.outbound_tx.clone(),
        );

        debug!("REQ {} {} on {}", id, request.verb, self.inner.role);
        self.inner
            .outbound_tx
            .send(OutboundFrame::Request {
                text: frame::encode_request(&id, request),
                id,
            })
            .map_err(|_| GatewayError::Closed)?;
        Ok(handle)
    }

    /// Stop the worker and close the socket. Every pending subscription
    /// fails with [`GatewayError::Closed`]. A later `send` reopens.
    pub async fn close(&self) {
        let worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            worker.shutdown.cancel();
            if let Err(e) = worker.handle.await {
                warn!("{} connection worker ended abnormally: {}", self.inner.role, e);
            }
        }

        self.inner.subscriptions.fail_all(&GatewayError::Closed);
        self.inner.set_state(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Number of subscriptions still holding a slot.
    pub fn pending_subscriptions(&self) -> usize {
        self.inner.subscriptions.len()
    }

    pub fn subscription(&self, id: &str) -> Option<Subscription> {
        self.inner.subscriptions.get(id)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.shutdown.cancel();
        }
    }
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("{} connection: {:?} -> {:?}", self.role, previous, state);
        }
    }
}

async fn run_connection_loop(inner: Arc<Inner>, shutdown: CancellationToken) {
    let mut outbound = inner.outbound_rx.clone().lock_owned().await;
    let mut endpoint_rx = inner.endpoints.watch_endpoint(inner.role);
    let mut backoff = inner.policy.initial_backoff;
    let mut attempt: u32 = 0;

    loop {
        if let Some(rx) = endpoint_rx.as_mut() {
            let _ = rx.borrow_and_update();
        }
        let url = inner.endpoints.current_endpoint(inner.role);
        inner.set_state(ConnectionState::Connecting);
        info!("Connecting to {} server at {}", inner.role, url);

        let connected = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
        };

        let reason = match connected {
            Ok((socket, _)) => {
                info!("Connected to {} server at {}", inner.role, url);
                attempt = 0;
                backoff = inner.policy.initial_backoff;
                inner.set_state(ConnectionState::Connected);

                match run_message_loop(&inner, socket, &mut outbound, &mut endpoint_rx, &shutdown)
                    .await
                {
                    LoopExit::Shutdown => break,
                    LoopExit::EndpointChanged => {
                        info!("{} endpoint changed, reconnecting", inner.role);
                        abort_in_flight(
                            &inner,
                            &mut outbound,
                            &GatewayError::Connection("endpoint changed".into()),
                        );
                        continue;
                    }
                    LoopExit::Dropped(reason) => reason,
                }
            }
            Err(e) => format!("connect to {} failed: {}", url, e),
        };

        warn!("{} connection lost: {}", inner.role, reason);
        abort_in_flight(&inner, &mut outbound, &GatewayError::Connection(reason));

        attempt += 1;
        let delay = with_jitter(backoff);
        inner.set_state(ConnectionState::Reconnecting {
            attempt,
            next_retry_ms: delay.as_millis() as u64,
        });

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {
                backoff = (backoff * 2).min(inner.policy.max_backoff);
            }
            _ = endpoint_changed(&mut endpoint_rx) => {
                attempt = 0;
                backoff = inner.policy.initial_backoff;
            }
        }
    }

    abort_in_flight(&inner, &mut outbound, &GatewayError::Closed);
    inner.set_state(ConnectionState::Disconnected);
    info!("{} connection closed", inner.role);
}

async fn run_message_loop(
    inner: &Inner,
    socket: Socket,
    outbound: &mut mpsc::UnboundedReceiver<OutboundFrame>,
    endpoint_rx: &mut Option<watch::Receiver<String>>,
    shutdown: &CancellationToken,
) -> LoopExit {
    let (mut sink, mut stream) = socket.split();

    let mut heartbeat = tokio::time::interval(inner.policy.heartbeat_interval);
    heartbeat.tick().await;
    let mut pong_received = true;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return LoopExit::Shutdown;
            }
            _ = endpoint_changed(endpoint_rx) => {
                let _ = sink.send(Message::Close(None)).await;
                return LoopExit::EndpointChanged;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    return LoopExit::Shutdown;
                };
                let Some(text) = outbound_text(&inner.subscriptions, frame) else {
                    continue;
                };
                trace!("-> {}", text);
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    return LoopExit::Dropped(e.to_string());
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    handle_incoming(&inner.subscriptions, text.as_str());
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = sink.send(Message::Pong(payload)).await {
                        return LoopExit::Dropped(e.to_string());
                    }
                }
                Some(Ok(Message::Pong(_))) => pong_received = true,
                Some(Ok(Message::Close(_))) | None => {
                    return LoopExit::Dropped("closed by server".into());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return LoopExit::Dropped(e.to_string()),
            },
            _ = heartbeat.tick() => {
                if std::mem::replace(&mut pong_received, false) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        return LoopExit::Dropped(format!(
                            "heartbeat timeout (missed {} pongs)",
                            missed_heartbeats
                        ));
                    }
                }
                if let Err(e) = sink.send(Message::Ping(Vec::new().into())).await {
                    return LoopExit::Dropped(e.to_string());
                }
            }
        }
    }
}

fn handle_incoming(table: &SubscriptionTable, text: &str) {
    match frame::decode(text) {
        Ok(IncomingFrame::Event {
            subscription_id,
            event,
        }) => {
            if let Some(invalid) = event.as_invalid() {
                debug!("Undecodable event for {}: {}", subscription_id, invalid.reason);
            }
            if !table.deliver(&subscription_id, SubscriptionMessage::Event(event)) {
                trace!("Dropping event for inactive subscription {}", subscription_id);
            }
        }
        Ok(IncomingFrame::EndOfStream { subscription_id }) => {
            if !table.deliver(&subscription_id, SubscriptionMessage::EndOfStream) {
                trace!("Dropping EOSE for inactive subscription {}", subscription_id);
            }
        }
        Ok(IncomingFrame::Notice {
            subscription_id: Some(subscription_id),
            message,
        }) => {
            warn!("NOTICE for {}: {}", subscription_id, message);
            table.deliver(&subscription_id, SubscriptionMessage::Notice(message));
        }
        Ok(IncomingFrame::Notice {
            subscription_id: None,
            message,
        }) => warn!("NOTICE: {}", message),
        Err(e) => {
            let raw: String = text.chars().take(200).collect();
            warn!("Bad frame: {} -- raw: {}", e, raw);
        }
    }
}

/// Wire text for a queued frame. A request whose slot was released before
/// it got out (failed by a disconnect, or cancelled) is not sent.
fn outbound_text(table: &SubscriptionTable, frame: OutboundFrame) -> Option<String> {
    match frame {
        OutboundFrame::Request { id, text } => {
            if table.contains(id.as_str()) {
                Some(text)
            } else {
                debug!("Not sending REQ for released subscription {}", id);
                None
            }
        }
        OutboundFrame::Close(text) => Some(text),
    }
}

/// Discard queued frames and fail every pending subscription.
fn abort_in_flight(
    inner: &Inner,
    outbound: &mut mpsc::UnboundedReceiver<OutboundFrame>,
    error: &GatewayError,
) {
    let mut discarded = 0usize;
    while outbound.try_recv().is_ok() {
        discarded += 1;
    }
    let failed = inner.subscriptions.fail_all(error);
    if failed > 0 || discarded > 0 {
        debug!(
            "{}: failed {} subscriptions, discarded {} queued frames ({})",
            inner.role, failed, discarded, error
        );
    }
}

/// Resolves when the watched endpoint changes. Pends forever if there is
/// nothing to watch.
async fn endpoint_changed(rx: &mut Option<watch::Receiver<String>>) {
    let Some(watcher) = rx.as_mut() else {
        return std::future::pending().await;
    };
    if watcher.changed().await.is_ok() {
        return;
    }
    *rx = None;
    std::future::pending().await
}

/// Up to 25% random extra delay so clients don't retry in lockstep.
fn with_jitter(backoff: Duration) -> Duration {
    let spread = backoff.as_millis() as u64 / 4;
    if spread == 0 {
        return backoff;
    }
    backoff + Duration::from_millis(rand::random::<u64>() % (spread + 1))
}
