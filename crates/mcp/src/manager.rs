//! Tool server manager: owns one [`McpClient`] per configured server,
//! bounds concurrent calls (a global semaphore plus an optional per-server
//! override), classifies servers into the shared scheduler pool or a
//! dedicated execution lane, and keeps each server's tool list warm with a
//! periodic health check.
//!
//! Namespacing and alias resolution live one layer up, in the tool
//! registry — this module only knows `(server_id, tool_name)` pairs.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Semaphore};

use parley_domain::config::{McpConfig, McpServerConfig};

use crate::client::{AsyncCallItem, ClientState, McpClient, McpError};
use crate::protocol::McpToolDef;

/// How many consecutive failed pings demote a server to `Degraded`.
const PING_FAILURE_THRESHOLD: u32 = 3;
/// Interval between health-check pings for every connected server.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
/// Reconnect attempts before a server is left degraded for one health cycle.
const RECONNECT_ATTEMPTS: u32 = 5;

/// A job dispatched onto a dedicated execution lane: call it and it runs
/// to completion on that lane's own runtime thread.
type LaneJob = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Thin, cloneable handle to a dedicated lane's job queue. A single-threaded
/// tokio runtime on its own OS thread is reserved for servers that block or
/// spin up heavyweight subprocesses per call (browser automation,
/// long-running generator-class servers) — isolating them keeps a slow
/// server from starving the shared pool's other work.
#[derive(Clone)]
struct LaneHandle {
    tx: mpsc::UnboundedSender<LaneJob>,
}

impl LaneHandle {
    fn spawn(server_id: String) -> (Self, std::thread::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<LaneJob>();
        let thread = std::thread::Builder::new()
            .name(format!("mcp-lane-{server_id}"))
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!(server_id = %server_id, error = %e, "failed to start dedicated execution lane runtime");
                        return;
                    }
                };
                rt.block_on(async move {
                    while let Some(job) = rx.recv().await {
                        tokio::spawn(job());
                    }
                });
            })
            .expect("spawning dedicated execution lane thread");
        (Self { tx }, thread)
    }

    /// Run a future to completion on this lane, returning its output.
    async fn run<F, T>(&self, fut: F) -> Result<T, McpError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: LaneJob = Box::new(move || {
            Box::pin(async move {
                let result = fut.await;
                let _ = tx.send(result);
            })
        });
        self.tx
            .send(job)
            .map_err(|_| McpError::Protocol("dedicated execution lane is gone".into()))?;
        rx.await
            .map_err(|_| McpError::Protocol("dedicated execution lane dropped the reply".into()))
    }
}

/// One managed tool server: the client plus its concurrency gate and,
/// if flagged, a dedicated execution lane.
struct ManagedServer {
    client: Arc<McpClient>,
    local_limit: Option<Arc<Semaphore>>,
    lane: Option<LaneHandle>,
    #[allow(dead_code)]
    lane_thread: Option<std::thread::JoinHandle<()>>,
}

/// Manages every configured tool server: connection lifecycle, concurrency
/// bounds, execution-lane dispatch, and health monitoring.
pub struct McpManager {
    servers: RwLock<HashMap<String, ManagedServer>>,
    global_limit: Arc<Semaphore>,
    request_timeout: Duration,
}

impl McpManager {
    /// An empty manager with no servers connected.
    pub fn empty(max_concurrency: usize, request_timeout: Duration) -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            global_limit: Arc::new(Semaphore::new(max_concurrency.max(1))),
            request_timeout,
        }
    }

    /// Connect to every enabled server (explicit entries plus enabled
    /// presets). A server that fails to connect is logged and skipped
    /// rather than failing the whole manager — the next health check will
    /// retry it.
    pub async fn from_config(config: &McpConfig, max_concurrency: usize, request_timeout: Duration) -> Self {
        let manager = Self::empty(max_concurrency, request_timeout);
        for server_config in config.effective_servers() {
            manager.connect_server(server_config).await;
        }
        manager
    }

    async fn connect_server(&self, server_config: McpServerConfig) {
        let id = server_config.id.clone();
        let dedicated = server_config.dedicated_execution_lane;
        let local_limit = server_config
            .max_concurrency
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        match McpClient::connect(server_config, self.request_timeout).await {
            Ok(client) => {
                let (lane, lane_thread) = if dedicated {
                    let (handle, thread) = LaneHandle::spawn(id.clone());
                    (Some(handle), Some(thread))
                } else {
                    (None, None)
                };
                self.servers.write().insert(
                    id.clone(),
                    ManagedServer {
                        client: Arc::new(client),
                        local_limit,
                        lane,
                        lane_thread,
                    },
                );
                tracing::info!(server_id = %id, "connected to MCP server");
            }
            Err(e) => {
                tracing::warn!(server_id = %id, error = %e, "failed to connect to MCP server, will retry on next health check");
            }
        }
    }

    /// Ids of every currently-known server (connected or not).
    pub fn server_ids(&self) -> Vec<String> {
        self.servers.read().keys().cloned().collect()
    }

    pub fn server_count(&self) -> usize {
        self.servers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }

    fn client_for(&self, server_id: &str) -> Option<Arc<McpClient>> {
        self.servers.read().get(server_id).map(|s| s.client.clone())
    }

    /// Every tool advertised by every server, tagged with its owning
    /// server id. A failure listing one server's tools does not prevent
    /// the others from being listed.
    pub async fn all_tools(&self) -> Vec<(String, McpToolDef)> {
        let clients: Vec<(String, Arc<McpClient>)> = self
            .servers
            .read()
            .iter()
            .map(|(id, s)| (id.clone(), s.client.clone()))
            .collect();

        let mut out = Vec::new();
        for (server_id, client) in clients {
            match client.list_tools().await {
                Ok(tools) => out.extend(tools.into_iter().map(|t| (server_id.clone(), t))),
                Err(e) => tracing::warn!(server_id = %server_id, error = %e, "failed to list tools"),
            }
        }
        out
    }

    pub async fn tools_for(&self, server_id: &str) -> Result<Vec<McpToolDef>, McpError> {
        let client = self.client_for(server_id).ok_or(McpError::Degraded)?;
        client.list_tools().await
    }

    /// Synchronous tool call: bounded by the global semaphore plus the
    /// server's own limit, dispatched on the shared pool or the server's
    /// dedicated lane as configured.
    pub async fn call_tool(&self, server_id: &str, tool_name: &str, arguments: Value) -> Result<Value, McpError> {
        let _global_permit = self
            .global_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| McpError::Protocol("tool concurrency semaphore closed".into()))?;

        let (client, local_limit, lane) = {
            let servers = self.servers.read();
            let managed = servers.get(server_id).ok_or(McpError::Degraded)?;
            (managed.client.clone(), managed.local_limit.clone(), managed.lane.clone())
        };

        let _local_permit = match &local_limit {
            Some(sem) => Some(
                sem.clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| McpError::Protocol("server concurrency semaphore closed".into()))?,
            ),
            None => None,
        };

        let name = tool_name.to_string();
        let result = match lane {
            Some(lane) => lane.run(async move { client.call_tool(&name, arguments).await }).await?,
            None => client.call_tool(&name, arguments).await,
        };
        result.map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
    }

    /// Async-with-progress call. The returned receiver yields zero or more
    /// `Progress` items followed by exactly one `Result` item. Dedicated
    /// lanes are not applied here — the call itself only enqueues the
    /// request; the server-side work happens out of band from there.
    ///
    /// The global permit is held for the entire lifetime of the stream, not
    /// just until this call returns a receiver: it's moved into the task
    /// that forwards items from the client's channel, and only drops (and
    /// so frees a concurrency slot) once that channel closes after its
    /// terminal item.
    pub async fn call_tool_async(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<mpsc::Receiver<AsyncCallItem>, McpError> {
        let global_permit = self
            .global_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| McpError::Protocol("tool concurrency semaphore closed".into()))?;

        let client = self.client_for(server_id).ok_or(McpError::Degraded)?;
        let mut source = client.call_tool_async(tool_name, arguments, timeout).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let _permit = global_permit;
            while let Some(item) = source.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    /// Ping every connected server once. A server that drops to `Degraded`
    /// is given a bounded number of reconnect attempts before being left
    /// degraded for the next cycle.
    pub async fn health_check(&self) {
        let clients: Vec<(String, Arc<McpClient>)> = self
            .servers
            .read()
            .iter()
            .map(|(id, s)| (id.clone(), s.client.clone()))
            .collect();

        for (server_id, client) in clients {
            let healthy = client.ping(PING_FAILURE_THRESHOLD).await;
            if !healthy && client.state() == ClientState::Degraded {
                tracing::warn!(server_id = %server_id, "MCP server degraded, attempting reconnect");
                if let Err(e) = client.reconnect(RECONNECT_ATTEMPTS).await {
                    tracing::warn!(server_id = %server_id, error = %e, "MCP server reconnect failed, will retry next health cycle");
                }
            }
        }
    }

    /// Spawn a background task that runs [`Self::health_check`] on a fixed
    /// interval until the manager is dropped.
    pub fn spawn_health_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            loop {
                ticker.tick().await;
                manager.health_check().await;
            }
        })
    }

    /// Close every server connection.
    pub async fn shutdown(&self) {
        let servers: Vec<Arc<McpClient>> = self.servers.write().drain().map(|(_, s)| s.client).collect();
        for client in servers {
            client.close().await;
        }
    }
}
