//! Tool server transports.
//!
//! A transport is a pure framing layer: send one message, receive one
//! message. It knows nothing about JSON-RPC — that demultiplexing lives one
//! layer up, in [`crate::client`]. Two transports are supported:
//!
//! - **Stdio**: spawn a child process, one newline-delimited JSON message
//!   per line over stdin/stdout.
//! - **WebSocket**: one connection per server, one JSON-RPC message per text
//!   frame.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use parley_domain::config::McpServerConfig;

/// Messages larger than this are rejected as oversize.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Trait for tool server transports. Pure framing: one `send` writes one
/// message, one `recv` reads the next. Demultiplexing by JSON-RPC id or
/// method happens in the protocol/client layer above.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send one raw JSON message.
    async fn send(&self, raw: &str) -> Result<(), TransportError>;

    /// Receive the next raw JSON message (blocks until one arrives).
    async fn recv(&self) -> Result<String, TransportError>;

    /// Whether the transport believes the connection is still usable.
    fn is_alive(&self) -> bool;

    /// Close the transport, releasing the underlying connection or process.
    async fn close(&self);
}

/// Errors that can occur during transport operations. Most are recovered
/// from by the client's reconnect logic.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connect failed: {0}")]
    ConnectError(String),

    #[error("transport closed")]
    TransportClosed,

    #[error("frame exceeds {MAX_FRAME_BYTES} bytes")]
    FrameTooLarge,

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("timeout waiting for response")]
    Timeout,

    #[error("transport not supported: {0}")]
    Unsupported(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stdio transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maximum number of non-JSON lines to skip before declaring the server broken.
const MAX_SKIP_LINES: usize = 1000;

/// Stdio transport: communicates with a child process over stdin/stdout.
///
/// Each JSON-RPC message is a single newline-delimited line. `recv_lock`
/// serializes concurrent reads so no two callers interleave partial lines.
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    alive: AtomicBool,
}

impl StdioTransport {
    /// Spawn a child process from the given server config.
    pub fn spawn(config: &McpServerConfig) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &config.working_directory {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(TransportError::Io)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdin",
            ))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdout",
            ))
        })?;

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            alive: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send(&self, raw: &str) -> Result<(), TransportError> {
        if raw.len() > MAX_FRAME_BYTES {
            return Err(TransportError::FrameTooLarge);
        }
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::TransportClosed);
        }
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(raw.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::TransportClosed);
        }

        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            let bytes_read = stdout.read_line(&mut line).await?;
            if bytes_read == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::TransportClosed);
            }
            if line.len() > MAX_FRAME_BYTES {
                return Err(TransportError::FrameTooLarge);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "MCP server produced too many non-JSON lines on stdout",
                )));
            }
            tracing::debug!(line = %trimmed, "skipping non-JSON line from MCP server stdout");
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(error = %e, "error closing MCP server stdin");
            }
        }
        // Grace window before a hard kill.
        let wait = tokio::time::timeout(tokio::time::Duration::from_secs(5), child.wait()).await;
        match wait {
            Ok(Ok(status)) => {
                tracing::debug!(?status, "MCP server process exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "error waiting for MCP server process");
            }
            Err(_) => {
                tracing::warn!("MCP server process did not exit within timeout, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill MCP server process");
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WebSocket transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// WebSocket transport: one connection per server, one JSON-RPC message per
/// text frame.
pub struct WebsocketTransport {
    sink: Mutex<futures_util::stream::SplitSink<WsStream, WsMessage>>,
    source: Mutex<futures_util::stream::SplitStream<WsStream>>,
    alive: AtomicBool,
}

impl WebsocketTransport {
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _resp) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectError(e.to_string()))?;
        let (sink, source) = ws.split();
        Ok(Self {
            sink: Mutex::new(sink),
            source: Mutex::new(source),
            alive: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl McpTransport for WebsocketTransport {
    async fn send(&self, raw: &str) -> Result<(), TransportError> {
        if raw.len() > MAX_FRAME_BYTES {
            return Err(TransportError::FrameTooLarge);
        }
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::TransportClosed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Text(raw.to_string()))
            .await
            .map_err(|e| TransportError::EncodingError(e.to_string()))?;
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::TransportClosed);
        }
        let mut source = self.source.lock().await;
        loop {
            match source.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    if text.len() > MAX_FRAME_BYTES {
                        return Err(TransportError::FrameTooLarge);
                    }
                    return Ok(text);
                }
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                Some(Ok(WsMessage::Close(_))) | None => {
                    self.alive.store(false, Ordering::SeqCst);
                    return Err(TransportError::TransportClosed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.alive.store(false, Ordering::SeqCst);
                    return Err(TransportError::EncodingError(e.to_string()));
                }
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut sink = self.sink.lock().await;
        let _ = sink.close().await;
    }
}
