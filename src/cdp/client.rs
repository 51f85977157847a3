//! Browser-level CDP client
//!
//! Wraps the transport with the Target-domain calls the engine needs and a
//! dedicated broadcast of newly created targets, so popup detection can be
//! armed independently of whoever else is reading events.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::common::Result;

use super::transport::{CdpEvent, CdpTransport};
use super::types::{AttachResult, CreateTargetResult, GetTargetsResult, TargetInfo};

struct ClientInner {
    transport: CdpTransport,
    targets: broadcast::Sender<TargetInfo>,
}

/// Cheaply clonable handle to one browser connection
#[derive(Clone)]
pub struct CdpClient {
    inner: Arc<ClientInner>,
}

impl CdpClient {
    /// Connect to the browser WebSocket and enable target discovery
    pub async fn connect(ws_url: &str, request_timeout: Duration) -> Result<Self> {
        let transport = CdpTransport::connect(ws_url, request_timeout).await?;
        let (targets, _) = broadcast::channel(64);

        // Forward Target.targetCreated announcements onto their own channel
        let mut events = transport.subscribe();
        let forward = targets.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(CdpEvent { method, params, .. })
                        if method == "Target.targetCreated" =>
                    {
                        if let Ok(info) =
                            serde_json::from_value::<TargetInfo>(params["targetInfo"].clone())
                        {
                            let _ = forward.send(info);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let client = Self {
            inner: Arc::new(ClientInner { transport, targets }),
        };

        client
            .send(None, "Target.setDiscoverTargets", json!({ "discover": true }))
            .await?;

        Ok(client)
    }

    /// Whether the underlying socket is still up
    pub fn is_alive(&self) -> bool {
        self.inner.transport.is_alive()
    }

    /// Raw command against the browser or an attached target
    pub async fn send(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        self.inner.transport.send(session_id, method, params).await
    }

    /// Subscribe to all protocol events
    pub fn subscribe_events(&self) -> broadcast::Receiver<CdpEvent> {
        self.inner.transport.subscribe()
    }

    /// Subscribe to new-target announcements
    pub fn subscribe_targets(&self) -> broadcast::Receiver<TargetInfo> {
        self.inner.targets.subscribe()
    }

    /// List all current targets
    pub async fn get_targets(&self) -> Result<Vec<TargetInfo>> {
        let result = self.send(None, "Target.getTargets", json!({})).await?;
        let parsed: GetTargetsResult = serde_json::from_value(result)?;
        Ok(parsed.target_infos)
    }

    /// Attach to a target in flatten mode, returning its session id
    pub async fn attach_to_target(&self, target_id: &str) -> Result<String> {
        let result = self
            .send(
                None,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let parsed: AttachResult = serde_json::from_value(result)?;
        Ok(parsed.session_id)
    }

    /// Open a new page target
    pub async fn create_target(&self, url: &str) -> Result<String> {
        let result = self
            .send(None, "Target.createTarget", json!({ "url": url }))
            .await?;
        let parsed: CreateTargetResult = serde_json::from_value(result)?;
        Ok(parsed.target_id)
    }

    /// Close one target
    pub async fn close_target(&self, target_id: &str) -> Result<()> {
        self.send(None, "Target.closeTarget", json!({ "targetId": target_id }))
            .await?;
        Ok(())
    }

    /// Ask the browser process to exit
    pub async fn close_browser(&self) -> Result<()> {
        self.send(None, "Browser.close", json!({})).await?;
        Ok(())
    }
}
