//! Session-scoped real-time channel.
//!
//! [`RealtimeChannel`] is created once by the application shell and shared
//! as `Arc<RealtimeChannel>` with whatever needs live updates. It holds at
//! most one [`ChannelHandle`]: [`connect`](RealtimeChannel::connect) creates
//! it from a session token, [`disconnect`](RealtimeChannel::disconnect)
//! (on logout) tears it down. Consumers read the handle and subscribe to
//! events through it; they never open or close the connection themselves.
//!
//! State machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Reconnecting -> Connected
//!                     |                           |
//!                     +--> Reconnecting           +--> Disconnected (retries exhausted)
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::{ChannelClient, ChannelConnection};
use crate::config::ChannelConfig;
use crate::events::{RealtimeEvent, ServerEvent};
use crate::identity::{resolve_identity, RoutingIdentity};
use crate::reconnect::{reconnect_loop, ReconnectConfig, ReconnectOutcome};

/// Broadcast channel capacity for subscriber events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long `disconnect` waits for the connection task to wind down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the channel's connection currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live connection.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Live and delivering events.
    Connected,
    /// The connection dropped; the handle is kept while retries run.
    Reconnecting,
}

/// The session's connection handle.
///
/// Shared read-only with consumers: they can inspect it and subscribe to
/// its events, but only [`RealtimeChannel`] can shut it down.
pub struct ChannelHandle {
    identity: RoutingIdentity,
    state: watch::Receiver<ConnectionState>,
    hub: Arc<Mutex<EventHub>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Event fan-out shared by a handle and its connection task.
///
/// The first connection failure is kept here so subscribers that attach
/// after it fired still see it. Publishing and subscribing both happen under
/// the lock, so each subscriber gets the failure exactly once: live from the
/// broadcast or replayed on subscribe.
struct EventHub {
    sender: Option<broadcast::Sender<RealtimeEvent>>,
    connection_error: Option<String>,
}

impl EventHub {
    fn open() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sender: Some(sender),
            connection_error: None,
        }
    }

    fn closed() -> Self {
        Self {
            sender: None,
            connection_error: None,
        }
    }
}

fn lock_hub(hub: &Mutex<EventHub>) -> MutexGuard<'_, EventHub> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

fn publish(hub: &Mutex<EventHub>, event: RealtimeEvent) {
    if let Some(sender) = &lock_hub(hub).sender {
        let _ = sender.send(event);
    }
}

fn publish_failure(hub: &Mutex<EventHub>, error: String) {
    let mut hub = lock_hub(hub);
    if hub.connection_error.is_some() {
        return;
    }
    hub.connection_error = Some(error.clone());
    if let Some(sender) = &hub.sender {
        let _ = sender.send(RealtimeEvent::ConnectionFailed { error });
    }
}

impl ChannelHandle {
    pub fn identity(&self) -> &RoutingIdentity {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Why the first connection attempt failed, if it did.
    pub fn connection_error(&self) -> Option<String> {
        lock_hub(&self.hub).connection_error.clone()
    }

    /// Receive every event on this handle.
    ///
    /// A connection failure that happened before subscribing is delivered
    /// first.
    pub fn subscribe(&self) -> Subscription {
        self.subscription(None)
    }

    /// Receive only server events named `event_name`.
    pub fn on(&self, event_name: impl Into<String>) -> Subscription {
        self.subscription(Some(event_name.into()))
    }

    fn subscription(&self, event_name: Option<String>) -> Subscription {
        let hub = lock_hub(&self.hub);
        let receiver = hub.sender.as_ref().map(|tx| tx.subscribe());
        let pending = match (&receiver, &hub.connection_error) {
            (Some(_), Some(error)) => Some(RealtimeEvent::ConnectionFailed {
                error: error.clone(),
            }),
            _ => None,
        };
        Subscription {
            receiver,
            pending,
            event_name,
        }
    }

    /// Stop the connection task and close every subscription.
    async fn shutdown(&self) {
        self.cancel.cancel();

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let abort = task.abort_handle();
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                tracing::warn!(
                    identity = %self.identity.key(),
                    "Connection task did not stop in time, aborting",
                );
                abort.abort();
            }
        }

        // The hub holds the only sender, so receivers see the channel close.
        lock_hub(&self.hub).sender.take();
    }
}

/// A stream of channel events, optionally narrowed to one server event name.
///
/// Ends (yields `None`) once the channel is disconnected.
pub struct Subscription {
    receiver: Option<broadcast::Receiver<RealtimeEvent>>,
    pending: Option<RealtimeEvent>,
    event_name: Option<String>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        if let Some(event) = self.pending.take() {
            if wants(self.event_name.as_deref(), &event) {
                return Some(event);
            }
        }

        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if wants(self.event_name.as_deref(), &event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged behind, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }
}

fn wants(event_name: Option<&str>, event: &RealtimeEvent) -> bool {
    event_name.map_or(true, |name| event.server_event_name() == Some(name))
}

/// The session's real-time context.
pub struct RealtimeChannel {
    config: ChannelConfig,
    handle: RwLock<Option<Arc<ChannelHandle>>>,
    state: Arc<watch::Sender<ConnectionState>>,
    staleness: Arc<watch::Sender<u64>>,
}

impl RealtimeChannel {
    pub fn new(config: ChannelConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (staleness, _) = watch::channel(0);
        Self {
            config,
            handle: RwLock::new(None),
            state: Arc::new(state),
            staleness: Arc::new(staleness),
        }
    }

    /// Open the channel for the session that `token` belongs to.
    ///
    /// Does nothing and returns the existing handle when one is already
    /// held. Returns `None`, without creating a handle, when the token cannot
    /// be decoded or its role may not hold a real-time session. Connection
    /// failures are never returned: they are logged and reported to
    /// subscribers as [`RealtimeEvent::ConnectionFailed`].
    pub async fn connect(&self, token: &str) -> Option<Arc<ChannelHandle>> {
        let mut slot = self.handle.write().await;
        if let Some(existing) = slot.as_ref() {
            tracing::debug!(
                identity = %existing.identity.key(),
                "Real-time channel already open",
            );
            return Some(Arc::clone(existing));
        }

        let identity = match resolve_identity(token) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "Not opening real-time channel");
                return None;
            }
        };

        tracing::info!(
            identity = %identity.key(),
            company_id = identity.company_id(),
            "Opening real-time channel",
        );
        self.state.send_replace(ConnectionState::Connecting);

        let hub = Arc::new(Mutex::new(EventHub::open()));
        let cancel = CancellationToken::new();
        let client = ChannelClient::new(self.config.ws_url.clone(), identity.clone());

        let task = tokio::spawn(run_connection(
            client,
            self.config.reconnect(),
            cancel.clone(),
            Arc::clone(&hub),
            Arc::clone(&self.state),
            Arc::clone(&self.staleness),
        ));

        let handle = Arc::new(ChannelHandle {
            identity,
            state: self.state.subscribe(),
            hub,
            cancel,
            task: Mutex::new(Some(task)),
        });
        *slot = Some(Arc::clone(&handle));
        Some(handle)
    }

    /// Close the connection, end every subscription and drop the handle.
    ///
    /// Safe to call when nothing is connected. The handle slot stays locked
    /// until the old connection has stopped, so a `connect` racing with this
    /// call opens its handle only afterwards.
    pub async fn disconnect(&self) {
        let mut slot = self.handle.write().await;
        match slot.take() {
            Some(handle) => {
                handle.shutdown().await;
                self.state.send_replace(ConnectionState::Disconnected);
                tracing::info!(
                    identity = %handle.identity.key(),
                    "Real-time channel closed",
                );
            }
            None => {
                self.state.send_replace(ConnectionState::Disconnected);
                tracing::debug!("Real-time channel already closed");
            }
        }
    }

    /// The current handle, if the session has one.
    pub async fn handle(&self) -> Option<Arc<ChannelHandle>> {
        self.handle.read().await.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Opaque token that changes whenever dependent views should refetch.
    pub fn staleness(&self) -> u64 {
        *self.staleness.borrow()
    }

    pub fn set_staleness(&self, token: u64) {
        self.staleness.send_replace(token);
    }

    /// Move the staleness token on.
    pub fn mark_stale(&self) {
        bump(&self.staleness);
    }

    pub fn watch_staleness(&self) -> watch::Receiver<u64> {
        self.staleness.subscribe()
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.cancel.cancel();
        }
    }
}

fn bump(staleness: &watch::Sender<u64>) {
    staleness.send_modify(|token| *token = token.wrapping_add(1));
}

/// How a single live session ended.
enum SessionEnd {
    Cancelled,
    Dropped,
}

/// Connection task: connect -> deliver events -> reconnect, until cancelled
/// or out of retries.
async fn run_connection(
    client: ChannelClient,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    hub: Arc<Mutex<EventHub>>,
    state: Arc<watch::Sender<ConnectionState>>,
    staleness: Arc<watch::Sender<u64>>,
) {
    let first = tokio::select! {
        _ = cancel.cancelled() => return,
        result = client.connect() => result,
    };

    let mut conn = match first {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(
                identity = %client.identity().key(),
                error = %e,
                "Real-time connection failed, live updates unavailable",
            );
            publish_failure(&hub, e.to_string());
            match retry(&client, &reconnect, &cancel, &state).await {
                Some(conn) => conn,
                None => return,
            }
        }
    };

    loop {
        state.send_replace(ConnectionState::Connected);
        publish(
            &hub,
            RealtimeEvent::Connected {
                identity: client.identity().key().to_string(),
            },
        );

        match run_session(conn, &client, &cancel, &hub, &staleness).await {
            SessionEnd::Cancelled => return,
            SessionEnd::Dropped => {}
        }

        tracing::info!(
            identity = %client.identity().key(),
            "Real-time connection lost",
        );
        publish(&hub, RealtimeEvent::Disconnected);

        conn = match retry(&client, &reconnect, &cancel, &state).await {
            Some(conn) => conn,
            None => return,
        };
    }
}

/// Run the reconnect loop with the state machine kept in step. Returns
/// `None` when cancelled or out of retries.
async fn retry(
    client: &ChannelClient,
    reconnect: &ReconnectConfig,
    cancel: &CancellationToken,
    state: &watch::Sender<ConnectionState>,
) -> Option<ChannelConnection> {
    if reconnect.max_attempts > 0 {
        state.send_replace(ConnectionState::Reconnecting);
    }
    match reconnect_loop(client, reconnect, cancel).await {
        ReconnectOutcome::Connected(conn) => Some(conn),
        ReconnectOutcome::Exhausted => {
            state.send_replace(ConnectionState::Disconnected);
            None
        }
        ReconnectOutcome::Cancelled => None,
    }
}

/// Deliver server frames to subscribers until the connection drops or the
/// channel is cancelled.
async fn run_session(
    conn: ChannelConnection,
    client: &ChannelClient,
    cancel: &CancellationToken,
    hub: &Mutex<EventHub>,
    staleness: &watch::Sender<u64>,
) -> SessionEnd {
    let (mut sink, mut stream) = conn.ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "Failed to send close frame");
                }
                return SessionEnd::Cancelled;
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match ServerEvent::parse(&text) {
                        Ok(event) => {
                            tracing::debug!(
                                identity = %client.identity().key(),
                                event = %event.event,
                                "Server event received",
                            );
                            bump(staleness);
                            publish(hub, RealtimeEvent::Server(event));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, raw = %text, "Malformed server frame");
                        }
                    },
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Notification server closed the connection");
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(_)) => {
                        // Binary / Frame -- ignore.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket receive error");
                        return SessionEnd::Dropped;
                    }
                    None => {
                        tracing::info!("WebSocket stream exhausted");
                        return SessionEnd::Dropped;
                    }
                }
            }
        }
    }
}
