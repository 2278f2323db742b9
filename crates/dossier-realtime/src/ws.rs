//! WebSocket push transport.

use crate::messages::{Frame, FrameType};
use crate::{
    ChannelHandle, ChannelSpec, HeartbeatOutcome, PushCallback, PushEvent, RealtimeError,
    RealtimeResult, RealtimeTransport, TransportState,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Push endpoint URL (e.g. wss://realtime.dossier-sync.dev).
    pub url: String,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat ack deadline in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Channel join ack deadline in seconds.
    pub join_timeout_secs: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: dossier_core::Config::default().realtime_url,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 10,
            join_timeout_secs: 10,
        }
    }
}

/// State shared with the socket tasks.
struct WsShared {
    state: std::sync::RwLock<TransportState>,
    writer: Mutex<Option<mpsc::Sender<Message>>>,
    channels: RwLock<HashMap<u64, (ChannelSpec, PushCallback)>>,
    pending_joins: Mutex<HashMap<u64, oneshot::Sender<Result<(), String>>>>,
    heartbeat_tx: broadcast::Sender<HeartbeatOutcome>,
    heartbeat_pending: AtomicBool,
}

impl WsShared {
    fn set_state(&self, state: TransportState) {
        if let Ok(mut current) = self.state.write() {
            *current = state;
        }
    }

    fn get_state(&self) -> TransportState {
        self.state.read().map(|s| *s).unwrap_or(TransportState::Closed)
    }
}

/// WebSocket implementation of [`RealtimeTransport`].
///
/// Channels are multiplexed over one socket as JSON frames; a reconnect
/// discards every live channel, and the supervisor rebuilds them.
pub struct WsTransport {
    config: WsConfig,
    shared: Arc<WsShared>,
    next_channel_id: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WsTransport {
    /// Create a transport for the given endpoint.
    pub fn new(config: WsConfig) -> Self {
        let (heartbeat_tx, _) = broadcast::channel(64);

        Self {
            config,
            shared: Arc::new(WsShared {
                state: std::sync::RwLock::new(TransportState::Closed),
                writer: Mutex::new(None),
                channels: RwLock::new(HashMap::new()),
                pending_joins: Mutex::new(HashMap::new()),
                heartbeat_tx,
                heartbeat_pending: AtomicBool::new(false),
            }),
            next_channel_id: AtomicU64::new(1),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(WsConfig::default())
    }

    /// Close the socket and stop all socket tasks.
    pub async fn dispose(&self) {
        self.abort_tasks().await;
        *self.shared.writer.lock().await = None;
        self.shared.channels.write().await.clear();
        self.shared.pending_joins.lock().await.clear();
        self.shared.set_state(TransportState::Closed);
        info!("Push transport disposed");
    }

    async fn abort_tasks(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    fn spawn_heartbeat_task(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let interval_secs = self.config.heartbeat_interval_secs;
        let timeout_secs = self.config.heartbeat_timeout_secs;

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs));
            // The immediate first tick would race the handshake.
            ticker.tick().await;
            loop {
                ticker.tick().await;

                let json = match Frame::heartbeat().to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode heartbeat");
                        continue;
                    }
                };
                let sender = shared.writer.lock().await.clone();
                let Some(sender) = sender else { break };

                if sender.send(Message::Text(json.into())).await.is_err() {
                    let _ = shared.heartbeat_tx.send(HeartbeatOutcome::Error);
                    break;
                }
                shared.heartbeat_pending.store(true, Ordering::SeqCst);
                let _ = shared.heartbeat_tx.send(HeartbeatOutcome::Sent);

                // Ack watchdog; the read loop clears the pending flag.
                let watchdog = Arc::clone(&shared);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
                    if watchdog.heartbeat_pending.swap(false, Ordering::SeqCst) {
                        let _ = watchdog.heartbeat_tx.send(HeartbeatOutcome::Timeout);
                    }
                });
            }
        })
    }
}

#[async_trait]
impl RealtimeTransport for WsTransport {
    async fn connect(&self) -> RealtimeResult<()> {
        // A fresh socket invalidates every previous task and channel.
        self.abort_tasks().await;
        *self.shared.writer.lock().await = None;
        self.shared.channels.write().await.clear();
        self.shared.pending_joins.lock().await.clear();

        self.shared.set_state(TransportState::Connecting);
        info!(url = %self.config.url, "Connecting to push endpoint");

        let (ws_stream, _) = match connect_async(&self.config.url).await {
            Ok(connected) => connected,
            Err(e) => {
                self.shared.set_state(TransportState::Closed);
                return Err(e.into());
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(100);
        *self.shared.writer.lock().await = Some(msg_tx);
        self.shared.set_state(TransportState::Open);

        let writer_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let heartbeat_task = self.spawn_heartbeat_task();

        let shared = Arc::clone(&self.shared);
        let read_task = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match Frame::from_json(&text) {
                        Ok(frame) => handle_frame(&shared, frame).await,
                        Err(e) => {
                            warn!(error = %e, "Failed to parse push frame");
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!("Push connection closed");
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        if let Some(sender) = shared.writer.lock().await.as_ref() {
                            let _ = sender.send(Message::Pong(data)).await;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            *shared.writer.lock().await = None;
            shared.set_state(TransportState::Closed);
            let _ = shared.heartbeat_tx.send(HeartbeatOutcome::Disconnected);
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(writer_task);
        tasks.push(heartbeat_task);
        tasks.push(read_task);

        Ok(())
    }

    async fn open_channel(
        &self,
        spec: &ChannelSpec,
        on_push: PushCallback,
    ) -> RealtimeResult<ChannelHandle> {
        let sender = self
            .shared
            .writer
            .lock()
            .await
            .clone()
            .ok_or(RealtimeError::NotConnected)?;

        let id = self.next_channel_id.fetch_add(1, Ordering::SeqCst);
        let (ack_tx, ack_rx) = oneshot::channel();
        self.shared.pending_joins.lock().await.insert(id, ack_tx);
        // Register the handler before the join so a push arriving right
        // after the ack is never dropped.
        self.shared
            .channels
            .write()
            .await
            .insert(id, (spec.clone(), on_push));

        let json = Frame::join(id, spec).to_json()?;
        if sender.send(Message::Text(json.into())).await.is_err() {
            self.discard_channel(id).await;
            return Err(RealtimeError::Transport("join send failed".to_string()));
        }

        let deadline = Duration::from_secs(self.config.join_timeout_secs);
        match tokio::time::timeout(deadline, ack_rx).await {
            Ok(Ok(Ok(()))) => {
                debug!(channel_id = id, table = %spec.table, "Channel joined");
                Ok(ChannelHandle::new(id))
            }
            Ok(Ok(Err(message))) => {
                self.discard_channel(id).await;
                Err(RealtimeError::Subscription(message))
            }
            Ok(Err(_)) => {
                self.discard_channel(id).await;
                Err(RealtimeError::Transport(
                    "connection dropped during join".to_string(),
                ))
            }
            Err(_) => {
                self.discard_channel(id).await;
                Err(RealtimeError::Subscription("join ack timeout".to_string()))
            }
        }
    }

    async fn close_channel(&self, handle: ChannelHandle) -> RealtimeResult<()> {
        let id = handle.id();
        let was_live = self.shared.channels.write().await.remove(&id).is_some();
        self.shared.pending_joins.lock().await.remove(&id);

        if was_live {
            if let Some(sender) = self.shared.writer.lock().await.as_ref() {
                if let Ok(json) = Frame::leave(id).to_json() {
                    let _ = sender.send(Message::Text(json.into())).await;
                }
            }
            debug!(channel_id = id, "Channel closed");
        }
        Ok(())
    }

    fn connection_state(&self) -> TransportState {
        self.shared.get_state()
    }

    fn heartbeats(&self) -> broadcast::Receiver<HeartbeatOutcome> {
        self.shared.heartbeat_tx.subscribe()
    }
}

impl WsTransport {
    async fn discard_channel(&self, id: u64) {
        self.shared.channels.write().await.remove(&id);
        self.shared.pending_joins.lock().await.remove(&id);
    }
}

/// Dispatch one incoming frame.
async fn handle_frame(shared: &Arc<WsShared>, frame: Frame) {
    match frame.frame_type {
        FrameType::Joined => {
            if let Some(id) = frame.channel_id {
                if let Some(ack) = shared.pending_joins.lock().await.remove(&id) {
                    let result = if frame.success.unwrap_or(false) {
                        Ok(())
                    } else {
                        Err(frame
                            .error
                            .unwrap_or_else(|| "join rejected".to_string()))
                    };
                    let _ = ack.send(result);
                }
            }
        }
        FrameType::Push => {
            if let Some(id) = frame.channel_id {
                let callback = shared
                    .channels
                    .read()
                    .await
                    .get(&id)
                    .map(|(_, callback)| callback.clone());
                match callback {
                    Some(callback) => callback(PushEvent {
                        table: frame.table.unwrap_or_default(),
                        event: frame.event.unwrap_or_default(),
                        payload: frame.payload.unwrap_or(serde_json::Value::Null),
                    }),
                    None => debug!(channel_id = id, "Push for unknown channel"),
                }
            }
        }
        FrameType::HeartbeatAck => {
            shared.heartbeat_pending.store(false, Ordering::SeqCst);
            let _ = shared.heartbeat_tx.send(HeartbeatOutcome::Ok);
        }
        FrameType::Error => {
            warn!(error = ?frame.error, "Push endpoint error");
        }
        _ => {
            debug!(frame_type = ?frame.frame_type, "Ignoring frame");
        }
    }
}
