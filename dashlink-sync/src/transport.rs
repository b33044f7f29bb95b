//! WebSocket hub connection.
//!
//! [`connect`] opens the socket, completes the protocol handshake and
//! spawns two tasks:
//!
//! - a writer forwarding queued frames to the socket and sending a
//!   keepalive ping every [`KEEPALIVE_INTERVAL`];
//! - a reader splitting inbound text into frames, resolving completions of
//!   our own invocations, and forwarding decoded [`HubMessage`]s in arrival
//!   order on the event channel.
//!
//! The reader starts before `connect` returns, so no server call that
//! arrives after the handshake can be missed. There is no reconnect: when
//! the socket closes the event channel yields [`TransportEvent::Closed`] and
//! every pending invocation fails with [`TransportError::ConnectionClosed`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{
    handshake_request, parse_handshake_response, Frame, FrameBuffer, HubInvocation, HubMessage,
    ProtocolError,
};

pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
/// How long an invocation waits for its completion.
pub const INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to hub: {0}")]
    Connect(String),
    #[error("Hub rejected handshake: {0}")]
    Handshake(String),
    #[error("Hub connection closed")]
    ConnectionClosed,
    #[error("Hub call failed: {0}")]
    Hub(String),
    #[error("Timed out waiting for the hub")]
    Timeout,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What the reader task reports.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(HubMessage),
    Closed { error: Option<String> },
}

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Value, TransportError>>>>>;

/// Cloneable, `Send` handle for invoking hub methods.
#[derive(Clone)]
pub struct HubHandle {
    outgoing: mpsc::Sender<Message>,
    pending: Pending,
    next_id: Arc<AtomicU64>,
    state: Arc<RwLock<ConnectionState>>,
    invoke_timeout: Duration,
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl HubHandle {
    /// Invoke `target` and wait for its completion, at most
    /// [`INVOKE_TIMEOUT`] by default.
    pub async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, TransportError> {
        let invocation_id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let frame = Frame::invocation(invocation_id.clone(), target, arguments).encode()?;

        let (tx, rx) = oneshot::channel();
        {
            // The reader flips the state under this lock before failing the
            // pending calls, so a registered waiter is always resolved.
            let mut pending = self.pending.lock().await;
            if *self.state.read().await != ConnectionState::Connected {
                return Err(TransportError::ConnectionClosed);
            }
            pending.insert(invocation_id.clone(), tx);
        }

        if self.outgoing.send(Message::Text(frame.into())).await.is_err() {
            self.pending.lock().await.remove(&invocation_id);
            return Err(TransportError::ConnectionClosed);
        }
        log::trace!("Invoked {target} as #{invocation_id}");

        match timeout(self.invoke_timeout, rx).await {
            Ok(outcome) => outcome.map_err(|_| TransportError::ConnectionClosed)?,
            Err(_) => {
                self.pending.lock().await.remove(&invocation_id);
                log::warn!("{target} #{invocation_id} got no completion");
                Err(TransportError::Timeout)
            }
        }
    }

    pub async fn send(&self, invocation: &HubInvocation) -> Result<(), TransportError> {
        self.invoke(invocation.target(), invocation.arguments())
            .await
            .map(|_| ())
    }

    /// Close the socket. Pending calls fail once the reader sees the close.
    pub async fn close(&self) {
        *self.state.write().await = ConnectionState::Disconnected;
        let _ = self.outgoing.send(Message::Close(None)).await;
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }
}

/// Open a hub connection at `url` (a `ws://` or `wss://` URL).
pub async fn connect(url: &str) -> Result<(HubHandle, mpsc::Receiver<TransportEvent>), TransportError> {
    let state = Arc::new(RwLock::new(ConnectionState::Connecting));

    let (ws_stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    let (mut ws_writer, mut ws_reader) = ws_stream.split();
    log::info!("Connected to hub at {url}");

    ws_writer
        .send(Message::Text(handshake_request().into()))
        .await
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    // The handshake reply may share a message with the first invocations.
    let mut buffer = FrameBuffer::new();
    let mut backlog = timeout(HANDSHAKE_TIMEOUT, async {
        while let Some(message) = ws_reader.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let frames = buffer.push(text.as_str());
                    if !frames.is_empty() {
                        return Ok(frames);
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        Err(TransportError::ConnectionClosed)
    })
    .await
    .map_err(|_| TransportError::Timeout)??;

    let reply = backlog.remove(0);
    if let Some(error) = parse_handshake_response(&reply)? {
        return Err(TransportError::Handshake(error));
    }
    *state.write().await = ConnectionState::Connected;
    log::debug!("Hub handshake complete");

    let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(256);

    // Writer task: queued frames plus keepalive.
    tokio::spawn(async move {
        let mut keepalive = interval_at(Instant::now() + KEEPALIVE_INTERVAL, KEEPALIVE_INTERVAL);
        loop {
            let message = tokio::select! {
                queued = out_rx.recv() => match queued {
                    Some(message) => message,
                    None => break,
                },
                _ = keepalive.tick() => match Frame::Ping.encode() {
                    Ok(ping) => Message::Text(ping.into()),
                    Err(_) => continue,
                },
            };
            let closing = matches!(message, Message::Close(_));
            if ws_writer.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = ws_writer.close().await;
    });

    // Reader task: frames in arrival order.
    let reader_pending = Arc::clone(&pending);
    let reader_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut close_error = None;

        'frames: {
            for frame in backlog {
                if let Some(error) = dispatch_frame(&frame, &reader_pending, &event_tx).await {
                    close_error = error;
                    break 'frames;
                }
            }
            while let Some(message) = ws_reader.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        for frame in buffer.push(text.as_str()) {
                            if let Some(error) = dispatch_frame(&frame, &reader_pending, &event_tx).await {
                                close_error = error;
                                break 'frames;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        close_error = Some(e.to_string());
                        break;
                    }
                    Ok(_) => {}
                }
            }
        }

        {
            let mut waiters = reader_pending.lock().await;
            *reader_state.write().await = ConnectionState::Disconnected;
            for (_, waiter) in waiters.drain() {
                let _ = waiter.send(Err(TransportError::ConnectionClosed));
            }
        }
        log::info!("Hub connection closed{}", close_error.as_deref().map(|e| format!(": {e}")).unwrap_or_default());
        let _ = event_tx.send(TransportEvent::Closed { error: close_error }).await;
    });

    let handle = HubHandle {
        outgoing: out_tx,
        pending,
        next_id: Arc::new(AtomicU64::new(0)),
        state,
        invoke_timeout: INVOKE_TIMEOUT,
    };
    Ok((handle, event_rx))
}

/// Handle one inbound frame. Returns `Some(reason)` when the hub closed
/// the connection.
async fn dispatch_frame(
    frame: &str,
    pending: &Pending,
    events: &mpsc::Sender<TransportEvent>,
) -> Option<Option<String>> {
    match Frame::decode(frame) {
        Ok(Frame::Invocation { target, arguments, .. }) => match HubMessage::decode(&target, &arguments) {
            Ok(message) => {
                log::debug!("Hub -> {target}");
                let _ = events.send(TransportEvent::Message(message)).await;
            }
            Err(ProtocolError::UnknownTarget(target)) => {
                log::warn!("Ignoring unknown hub target {target}");
            }
            Err(e) => log::warn!("Dropping malformed hub call: {e}"),
        },
        Ok(Frame::Completion { invocation_id, result, error }) => {
            let waiter = pending.lock().await.remove(&invocation_id);
            match waiter {
                Some(waiter) => {
                    let outcome = match error {
                        Some(error) => Err(TransportError::Hub(error)),
                        None => Ok(result.unwrap_or(Value::Null)),
                    };
                    let _ = waiter.send(outcome);
                }
                None => log::debug!("Completion for unknown invocation {invocation_id}"),
            }
        }
        Ok(Frame::Ping) => log::trace!("Hub ping"),
        Ok(Frame::Close { error }) => return Some(error),
        Ok(Frame::Unsupported(kind)) => log::debug!("Ignoring hub frame type {kind}"),
        Err(e) => log::warn!("Undecodable hub frame: {e}"),
    }
    None
}
