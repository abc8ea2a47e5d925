//! Per-server tool-server client: JSON-RPC request/response/notification
//! correlation on top of a [`crate::transport::McpTransport`], plus the
//! connection state machine and reconnect policy.
//!
//! The transport below this layer is "pure framing" (one `send`, one
//! `recv`); this module owns the single receiver task that demultiplexes
//! the inbound stream into responses (routed by id to a one-shot slot) and
//! notifications (dispatched by method name).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use parley_domain::config::{McpServerConfig, McpTransportKind};

use crate::protocol::{
    self, JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpToolDef, ToolCallAsyncAck,
    ToolCallAsyncParams, ToolCallResult, ToolProgressParams, ToolResultParams, ToolsListResult,
};
use crate::transport::{McpTransport, StdioTransport, TransportError, WebsocketTransport};

/// Connection state machine: a server starts disconnected, connects and
/// handshakes, and serves calls until enough consecutive health-check
/// failures demote it to degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Initializing,
    Ready,
    Degraded,
}

/// How long a discovered tool list is trusted before a refresh is forced.
const TOOL_CACHE_TTL: Duration = Duration::from_secs(300);

/// One item of an async-with-progress call — a lazy, finite sequence
/// terminated by exactly one `Result` item.
#[derive(Debug)]
pub enum AsyncCallItem {
    Progress(ToolProgressParams),
    Result(Result<Value, JsonRpcError>),
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("server returned an error: {0}")]
    Rpc(#[from] JsonRpcError),
    #[error("client is degraded and refuses new calls")]
    Degraded,
    #[error("request timed out")]
    Timeout,
}

struct Inner {
    transport: Arc<dyn McpTransport>,
    receiver_task: JoinHandle<()>,
}

/// Owns one tool server: connect, handshake, list tools, invoke,
/// health-check, reconnect.
pub struct McpClient {
    pub id: String,
    config: McpServerConfig,
    inner: RwLock<Option<Inner>>,
    state: RwLock<ClientState>,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, JsonRpcError>>>>>,
    progress_channels: Arc<Mutex<HashMap<String, mpsc::Sender<AsyncCallItem>>>>,
    progress_capable: RwLock<bool>,
    tools_cache: Arc<RwLock<Option<(Instant, Vec<McpToolDef>)>>>,
    consecutive_ping_failures: AtomicU32,
    request_timeout: Duration,
}

impl McpClient {
    /// Connect, handshake, and discover tools. Returns a client in `Ready`
    /// state, or `Degraded` groundwork is left to the caller via
    /// [`Self::reconnect`] if this fails after the process/socket is up.
    pub async fn connect(config: McpServerConfig, request_timeout: Duration) -> Result<Self, McpError> {
        let client = Self {
            id: config.id.clone(),
            config,
            inner: RwLock::new(None),
            state: RwLock::new(ClientState::Disconnected),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            progress_channels: Arc::new(Mutex::new(HashMap::new())),
            progress_capable: RwLock::new(false),
            tools_cache: Arc::new(RwLock::new(None)),
            consecutive_ping_failures: AtomicU32::new(0),
            request_timeout,
        };
        client.establish().await?;
        Ok(client)
    }

    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    pub fn is_progress_capable(&self) -> bool {
        *self.progress_capable.read()
    }

    // ── Connection lifecycle ────────────────────────────────────────

    async fn spawn_transport(&self) -> Result<Arc<dyn McpTransport>, McpError> {
        let transport: Arc<dyn McpTransport> = match self.config.transport {
            McpTransportKind::Stdio => {
                Arc::new(StdioTransport::spawn(&self.config).map_err(McpError::Transport)?)
            }
            McpTransportKind::Websocket => {
                let url = self.config.url.as_deref().ok_or_else(|| {
                    McpError::Protocol(format!(
                        "server '{}' uses websocket transport but has no url configured",
                        self.config.id
                    ))
                })?;
                Arc::new(
                    WebsocketTransport::connect(url)
                        .await
                        .map_err(McpError::Transport)?,
                )
            }
        };
        Ok(transport)
    }

    /// (Re)establish the connection: spawn/respawn the transport, restart
    /// the receiver task, and run the `initialize` handshake. Session-local
    /// server state is assumed lost across reconnects.
    async fn establish(&self) -> Result<(), McpError> {
        *self.state.write() = ClientState::Connecting;

        // Drop any stale pending requests — they can never be answered by
        // the new connection.
        self.pending.lock().await.clear();
        self.progress_channels.lock().await.clear();

        let transport = self.spawn_transport().await?;

        let receiver_task = tokio::spawn(receiver_loop(
            transport.clone(),
            self.pending.clone(),
            self.progress_channels.clone(),
            self.tools_cache.clone(),
        ));

        *self.inner.write() = Some(Inner {
            transport,
            receiver_task,
        });

        *self.state.write() = ClientState::Initializing;
        self.handshake().await?;
        *self.state.write() = ClientState::Ready;
        self.consecutive_ping_failures.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn handshake(&self) -> Result<(), McpError> {
        let params = protocol::initialize_params();
        let params_value = serde_json::to_value(&params)
            .map_err(|e| McpError::Protocol(format!("serializing initialize params: {e}")))?;

        let result = self.send_request("initialize", Some(params_value)).await?;

        *self.progress_capable.write() = result
            .get("capabilities")
            .and_then(|c| c.get("tools"))
            .and_then(|t| t.get("progress"))
            .and_then(|p| p.as_bool())
            .unwrap_or(false);

        self.send_notification("notifications/initialized", None)
            .await?;

        self.refresh_tools().await?;
        Ok(())
    }

    /// Exponential-backoff reconnect with a configurable attempt cap. The
    /// transport is fully recreated on each attempt.
    pub async fn reconnect(&self, max_attempts: u32) -> Result<(), McpError> {
        let mut attempt = 0u32;
        let mut delay = Duration::from_millis(500);
        loop {
            attempt += 1;
            tracing::info!(server_id = %self.id, attempt, "attempting MCP reconnect");
            match self.establish().await {
                Ok(()) => {
                    tracing::info!(server_id = %self.id, attempt, "MCP reconnect succeeded");
                    return Ok(());
                }
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(server_id = %self.id, attempt, error = %e, "MCP reconnect attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
                Err(e) => {
                    *self.state.write() = ClientState::Disconnected;
                    return Err(e);
                }
            }
        }
    }

    // ── Request/response/notification plumbing ──────────────────────

    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        self.send_request_with_timeout(method, params, self.request_timeout)
            .await
    }

    async fn send_request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let req = JsonRpcRequest::new(id, method, params);
        let raw = serde_json::to_string(&req)
            .map_err(|e| McpError::Protocol(format!("serializing request: {e}")))?;

        let transport = self.transport()?;
        if let Err(e) = transport.send(&raw).await {
            self.pending.lock().await.remove(&id);
            return Err(McpError::Transport(e));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result.map_err(McpError::Rpc),
            Ok(Err(_)) => Err(McpError::Protocol(
                "response channel closed before completion".into(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout)
            }
        }
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let mut notif = protocol::JsonRpcNotification::new(method);
        notif.params = params;
        let raw = serde_json::to_string(&notif)
            .map_err(|e| McpError::Protocol(format!("serializing notification: {e}")))?;
        self.transport()?.send(&raw).await.map_err(McpError::Transport)
    }

    fn transport(&self) -> Result<Arc<dyn McpTransport>, McpError> {
        self.inner
            .read()
            .as_ref()
            .map(|i| i.transport.clone())
            .ok_or(McpError::Degraded)
    }

    // ── Tools ────────────────────────────────────────────────────────

    async fn refresh_tools(&self) -> Result<(), McpError> {
        let result = self.send_request("tools/list", None).await?;
        let parsed: ToolsListResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("parsing tools/list result: {e}")))?;
        *self.tools_cache.write() = Some((Instant::now(), parsed.tools.clone()));
        Ok(())
    }

    /// Cached tool list, refreshing if the TTL has elapsed.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError> {
        let needs_refresh = match &*self.tools_cache.read() {
            Some((fetched_at, _)) => fetched_at.elapsed() > TOOL_CACHE_TTL,
            None => true,
        };
        if needs_refresh {
            self.refresh_tools().await?;
        }
        Ok(self
            .tools_cache
            .read()
            .as_ref()
            .map(|(_, tools)| tools.clone())
            .unwrap_or_default())
    }

    /// Synchronous call: returns one final result.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        if self.state() == ClientState::Degraded {
            return Err(McpError::Degraded);
        }
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result = self.send_request("tools/call", Some(params)).await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("parsing tools/call result: {e}")))
    }

    /// Async-with-progress call. If the server is not progress-capable,
    /// internally downgrades to `call_tool` and yields a single terminal
    /// item.
    pub async fn call_tool_async(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<mpsc::Receiver<AsyncCallItem>, McpError> {
        let (tx, rx) = mpsc::channel(32);

        if !self.is_progress_capable() {
            let result = self.call_tool(name, arguments).await;
            let item = match result {
                Ok(r) => AsyncCallItem::Result(Ok(serde_json::to_value(r).unwrap_or(Value::Null))),
                Err(McpError::Rpc(e)) => AsyncCallItem::Result(Err(e)),
                Err(e) => AsyncCallItem::Result(Err(JsonRpcError {
                    code: -32000,
                    message: e.to_string(),
                    data: None,
                })),
            };
            let _ = tx.send(item).await;
            return Ok(rx);
        }

        let params = ToolCallAsyncParams {
            name: name.to_string(),
            arguments,
            enable_progress: true,
            timeout: Some(timeout.as_secs()),
        };
        let params_value = serde_json::to_value(&params)
            .map_err(|e| McpError::Protocol(format!("serializing call_async params: {e}")))?;

        let result = self
            .send_request_with_timeout("tools/call_async", Some(params_value), timeout)
            .await?;
        let ack: ToolCallAsyncAck = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("parsing call_async ack: {e}")))?;

        self.progress_channels
            .lock()
            .await
            .insert(ack.task_id, tx);

        Ok(rx)
    }

    // ── Health ───────────────────────────────────────────────────────

    /// One health-check ping. Updates state to `Degraded` after
    /// `failure_threshold` consecutive failures.
    pub async fn ping(&self, failure_threshold: u32) -> bool {
        let ok = self
            .send_request_with_timeout("ping", None, Duration::from_secs(5))
            .await
            .is_ok();

        if ok {
            self.consecutive_ping_failures.store(0, Ordering::SeqCst);
            if self.state() == ClientState::Degraded {
                *self.state.write() = ClientState::Ready;
            }
        } else {
            let failures = self.consecutive_ping_failures.fetch_add(1, Ordering::SeqCst) + 1;
            if failures >= failure_threshold {
                *self.state.write() = ClientState::Degraded;
            }
        }
        ok
    }

    pub async fn close(&self) {
        if let Some(inner) = self.inner.write().take() {
            inner.transport.close().await;
            inner.receiver_task.abort();
        }
        *self.state.write() = ClientState::Disconnected;
    }
}

/// The single receiver task per connection: demultiplexes the inbound
/// stream into responses (by id) and notifications (by method).
async fn receiver_loop(
    transport: Arc<dyn McpTransport>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, JsonRpcError>>>>>,
    progress_channels: Arc<Mutex<HashMap<String, mpsc::Sender<AsyncCallItem>>>>,
    tools_cache: Arc<RwLock<Option<(Instant, Vec<McpToolDef>)>>>,
) {
    loop {
        let raw = match transport.recv().await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "MCP transport closed, receiver loop exiting");
                return;
            }
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, raw = %raw, "discarding malformed MCP message");
                continue;
            }
        };

        if value.get("id").is_some() && (value.get("result").is_some() || value.get("error").is_some()) {
            let resp: JsonRpcResponse = match serde_json::from_value(value) {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(error = %e, "malformed MCP response, discarding");
                    continue;
                }
            };
            let mut pending = pending.lock().await;
            if let Some(tx) = pending.remove(&resp.id) {
                let _ = tx.send(resp.into_result());
            } else {
                tracing::debug!(id = resp.id, "response for unknown request id, discarding");
            }
            continue;
        }

        let method = match value.get("method").and_then(|m| m.as_str()) {
            Some(m) => m.to_string(),
            None => {
                tracing::debug!("MCP message is neither response nor notification, discarding");
                continue;
            }
        };
        let params = value.get("params").cloned().unwrap_or(Value::Null);

        match method.as_str() {
            "tools/changed" => {
                tracing::debug!("received tools/changed notification, invalidating tool cache");
                *tools_cache.write() = None;
            }
            "tools/progress" => {
                let parsed: Result<ToolProgressParams, _> = serde_json::from_value(params);
                if let Ok(p) = parsed {
                    let channels = progress_channels.lock().await;
                    if let Some(tx) = channels.get(&p.task_id) {
                        let _ = tx.try_send(AsyncCallItem::Progress(p));
                    }
                }
            }
            "tools/result" => {
                let parsed: Result<ToolResultParams, _> = serde_json::from_value(params);
                if let Ok(p) = parsed {
                    let mut channels = progress_channels.lock().await;
                    if let Some(tx) = channels.remove(&p.task_id) {
                        let _ = tx.send(AsyncCallItem::Result(Ok(p.result))).await;
                    }
                }
            }
            other => {
                tracing::debug!(method = %other, "unhandled MCP notification");
            }
        }
    }
}
