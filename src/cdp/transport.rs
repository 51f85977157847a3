//! WebSocket transport for the DevTools protocol
//!
//! One connection per session. A reader task routes responses to pending
//! requests by (sessionId, id) and fans events out on a broadcast channel;
//! a writer task serializes outgoing frames. The browser's own processes
//! keep evolving while we're between commands, which is why events are a
//! broadcast stream rather than a polled queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::common::{Error, Result};

use super::types::{CommandEnvelope, IncomingMessage};

/// Broadcast capacity; a slow subscriber loses old events, never new ones
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// An event pushed by the browser
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// Target session the event belongs to; `None` for browser-level events
    pub session_id: Option<String>,
    pub method: String,
    pub params: Value,
}

type PendingMap = Arc<Mutex<HashMap<(String, u64), oneshot::Sender<Result<Value>>>>>;

/// Low-level CDP connection
pub struct CdpTransport {
    outgoing: mpsc::UnboundedSender<WsMessage>,
    pending: PendingMap,
    events: broadcast::Sender<CdpEvent>,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl CdpTransport {
    /// Connect to a browser-level WebSocket debugger URL
    pub async fn connect(ws_url: &str, request_timeout: Duration) -> Result<Self> {
        let (stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| Error::ConnectionLost(format!("WebSocket connect failed: {}", e)))?;

        let (mut sink, mut source) = stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<WsMessage>();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        // Writer task: serializes all outgoing frames
        tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        // Reader task: routes responses, fans out events
        let reader_pending = Arc::clone(&pending);
        let reader_events = events.clone();
        let reader_alive = Arc::clone(&alive);
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let message = match frame {
                    Ok(m) if m.is_text() => m,
                    Ok(m) if m.is_close() => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!("CDP socket read error: {}", e);
                        break;
                    }
                };

                let text = match message.into_text() {
                    Ok(t) => t,
                    Err(_) => continue,
                };

                let incoming: IncomingMessage = match serde_json::from_str(text.as_str()) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!("Unparseable CDP frame: {}", e);
                        continue;
                    }
                };

                if let Some(id) = incoming.id {
                    let key = (incoming.session_id.clone().unwrap_or_default(), id);
                    if let Some(tx) = reader_pending.lock().await.remove(&key) {
                        let outcome = match incoming.error {
                            Some(err) => Err(Error::CdpProtocol(err.message)),
                            None => Ok(incoming.result),
                        };
                        let _ = tx.send(outcome);
                    }
                } else if let Some(method) = incoming.method {
                    let _ = reader_events.send(CdpEvent {
                        session_id: incoming.session_id,
                        method,
                        params: incoming.params,
                    });
                }
            }

            reader_alive.store(false, Ordering::SeqCst);
            // Fail anything still waiting; their oneshot senders drop here
            reader_pending.lock().await.clear();
            tracing::debug!("CDP reader task ended");
        });

        Ok(Self {
            outgoing,
            pending,
            events,
            next_id: AtomicU64::new(1),
            alive,
            request_timeout,
        })
    }

    /// Whether the socket is still up
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Send a command and wait for its response
    ///
    /// `session_id` scopes the command to an attached target (flatten mode);
    /// `None` addresses the browser itself.
    pub async fn send(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        if !self.is_alive() {
            return Err(Error::ConnectionLost("socket closed".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let envelope = CommandEnvelope {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(String::from),
        };

        let (tx, rx) = oneshot::channel();
        let key = (session_id.unwrap_or_default().to_string(), id);
        self.pending.lock().await.insert(key.clone(), tx);

        let json = serde_json::to_string(&envelope)?;
        tracing::trace!("CDP >>> {}", json);
        if self.outgoing.send(WsMessage::text(json)).is_err() {
            self.pending.lock().await.remove(&key);
            return Err(Error::ConnectionLost("socket closed".to_string()));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome.map_err(|e| match e {
                Error::CdpProtocol(message) => Error::cdp_request_failed(method, &message),
                other => other,
            }),
            Ok(Err(_)) => Err(Error::ConnectionLost(
                "browser closed while request was in flight".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&key);
                Err(Error::CdpTimeout(
                    method.to_string(),
                    self.request_timeout.as_secs(),
                ))
            }
        }
    }
}
