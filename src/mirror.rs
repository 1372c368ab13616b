//! WebSocket odds mirror.
//!
//! One socket per [`OddsMirror`]; clones share it. Callers register
//! callbacks per topic, and every inbound `{type, data, timestamp}` frame
//! is handed to the subscribers of its `type` in arrival order.
//!
//! ```text
//! OddsMirror::connect()
//!        │
//!        ├─► spawns the connection task
//!        │     connect ─► resubscribe ─► pump frames ─► (closed) ─► sleep base*n
//!        │
//!        └─► subscribe / unsubscribe / request ──mpsc──► connection task
//! ```
//!
//! Reconnects wait `base * attempt` and stop for good after
//! `max_reconnect_attempts` consecutive failures.

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::WebSocketConfig;

pub type SubscriptionId = u64;
pub type Callback = Arc<dyn Fn(&FeedMessage) + Send + Sync>;

/// Inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: serde_json::Value,
}

/// Outbound frame: `{"action": ..., "key": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub action: String,
    pub key: String,
}

impl ClientFrame {
    pub fn subscribe(topic: &str) -> Self {
        Self {
            action: "subscribe".into(),
            key: topic.into(),
        }
    }

    pub fn unsubscribe(topic: &str) -> Self {
        Self {
            action: "unsubscribe".into(),
            key: topic.into(),
        }
    }
}

/// Data requests the feed answers with a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    GetSports,
    GetMatches,
    GetOdds,
    GetDetails,
}

impl RequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestAction::GetSports => "getSports",
            RequestAction::GetMatches => "getMatches",
            RequestAction::GetOdds => "getOdds",
            RequestAction::GetDetails => "getDetails",
        }
    }
}

/// Linear reconnect backoff with a hard cap on attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_config(config: &WebSocketConfig) -> Self {
        Self {
            base: Duration::from_millis(config.reconnect_base_ms),
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Delay before reconnect number `attempt` (1-based), or `None` once
    /// the budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base * attempt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Reconnect budget exhausted; terminal.
    GaveUp,
    /// Every handle was dropped; terminal.
    Closed,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Hub {
    subscribers: RwLock<HashMap<String, Vec<(SubscriptionId, Callback)>>>,
    state: watch::Sender<MirrorState>,
}

impl Hub {
    fn topics(&self) -> Vec<String> {
        let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        let mut topics: Vec<String> = subs
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(t, _)| t.clone())
            .collect();
        topics.sort();
        topics
    }

    fn dispatch(&self, text: &str) {
        let msg: FeedMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Dropping unparseable frame");
                return;
            }
        };

        // Callbacks run outside the lock so they may (un)subscribe.
        let callbacks: Vec<Callback> = {
            let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            match subs.get(&msg.kind) {
                Some(set) => set.iter().map(|(_, cb)| cb.clone()).collect(),
                None => Vec::new(),
            }
        };
        debug!(kind = %msg.kind, subscribers = callbacks.len(), "Frame received");
        for cb in callbacks {
            cb(&msg);
        }
    }

    fn set_state(&self, state: MirrorState) {
        self.state.send_replace(state);
    }
}

struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct OddsMirror {
    hub: Arc<Hub>,
    commands: mpsc::UnboundedSender<ClientFrame>,
    next_id: Arc<AtomicU64>,
    _task: Arc<TaskGuard>,
}

impl OddsMirror {
    /// Open the mirror against `url`. Must be called inside a Tokio runtime.
    pub fn connect(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(MirrorState::Connecting);
        let hub = Arc::new(Hub {
            subscribers: RwLock::new(HashMap::new()),
            state: state_tx,
        });
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(url.into(), policy, hub.clone(), rx));

        Self {
            hub,
            commands: tx,
            next_id: Arc::new(AtomicU64::new(1)),
            _task: Arc::new(TaskGuard(task)),
        }
    }

    /// Register `callback` for `topic` and ask the feed for it.
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&FeedMessage) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Callback = Arc::new(callback);
        {
            let mut subs = self
                .hub
                .subscribers
                .write()
                .unwrap_or_else(|e| e.into_inner());
            subs.entry(topic.to_string())
                .or_default()
                .push((id, callback));
        }
        self.send(ClientFrame::subscribe(topic));
        debug!(topic, id, "Subscribed");
        id
    }

    /// Drop one subscription. The feed is told to stop sending the topic
    /// once its last subscriber is gone. Returns false for unknown ids.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let (removed, now_empty) = {
            let mut subs = self
                .hub
                .subscribers
                .write()
                .unwrap_or_else(|e| e.into_inner());
            let Some(set) = subs.get_mut(topic) else {
                return false;
            };
            let before = set.len();
            set.retain(|(sid, _)| *sid != id);
            let removed = set.len() != before;
            let empty = set.is_empty();
            if empty {
                subs.remove(topic);
            }
            (removed, empty)
        };
        if removed && now_empty {
            self.send(ClientFrame::unsubscribe(topic));
        }
        removed
    }

    pub fn request(&self, action: RequestAction, key: &str) {
        self.send(ClientFrame {
            action: action.as_str().to_string(),
            key: key.to_string(),
        });
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.hub
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .map_or(0, Vec::len)
    }

    pub fn state(&self) -> MirrorState {
        *self.hub.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<MirrorState> {
        self.hub.state.subscribe()
    }

    fn send(&self, frame: ClientFrame) {
        if self.commands.send(frame).is_err() {
            debug!("Mirror task has stopped, frame dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

enum SessionEnd {
    Disconnected(String),
    Shutdown,
}

async fn run(
    url: String,
    policy: ReconnectPolicy,
    hub: Arc<Hub>,
    mut commands: mpsc::UnboundedReceiver<ClientFrame>,
) {
    let mut attempts: u32 = 0;

    loop {
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                attempts = 0;
                hub.set_state(MirrorState::Connected);
                info!("Odds mirror connected");
                match session(ws, &hub, &mut commands).await {
                    SessionEnd::Shutdown => {
                        hub.set_state(MirrorState::Closed);
                        info!("Odds mirror closed");
                        return;
                    }
                    SessionEnd::Disconnected(reason) => {
                        warn!(reason = %reason, "Odds mirror disconnected");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, attempt = attempts, "Odds mirror connect failed");
            }
        }

        attempts += 1;
        let Some(delay) = policy.delay_for(attempts) else {
            error!(
                max_attempts = policy.max_attempts,
                "Odds mirror giving up after repeated failures"
            );
            hub.set_state(MirrorState::GaveUp);
            return;
        };
        hub.set_state(MirrorState::Reconnecting { attempt: attempts });
        debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, "Reconnecting");
        tokio::time::sleep(delay).await;
    }
}

async fn session(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    hub: &Hub,
    commands: &mut mpsc::UnboundedReceiver<ClientFrame>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    // Topics the feed is streaming on this connection. Subscribe frames
    // queued while offline are already covered by the resubscribe.
    let mut live: HashSet<String> = HashSet::new();
    for topic in hub.topics() {
        let frame = encode(&ClientFrame::subscribe(&topic));
        if let Err(e) = sink.send(frame).await {
            return SessionEnd::Disconnected(e.to_string());
        }
        live.insert(topic);
    }

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(frame) => {
                    match frame.action.as_str() {
                        "subscribe" if !live.insert(frame.key.clone()) => {
                            debug!(topic = %frame.key, "Already subscribed on this connection");
                            continue;
                        }
                        "unsubscribe" => {
                            live.remove(&frame.key);
                        }
                        _ => {}
                    }
                    if let Err(e) = sink.send(encode(&frame)).await {
                        return SessionEnd::Disconnected(e.to_string());
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => hub.dispatch(&text),
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = sink.send(Message::Pong(payload)).await {
                        return SessionEnd::Disconnected(e.to_string());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return SessionEnd::Disconnected(format!("closed by peer: {frame:?}"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Disconnected(e.to_string()),
                None => return SessionEnd::Disconnected("stream ended".into()),
            },
        }
    }
}

fn encode(frame: &ClientFrame) -> Message {
    // ClientFrame is two strings; serialization cannot fail.
    Message::Text(serde_json::to_string(frame).unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
