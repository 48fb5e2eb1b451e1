//! Subprocess tool-server proxy.
//!
//! Speaks line-delimited JSON-RPC over a child process's stdio and adapts it
//! to the [`ToolSource`] seam: `initialize` / `notifications/initialized` /
//! `tools/list` at construction, `tools/call` per invocation. The composite
//! mounting a [`ProxySource`] cannot tell it apart from a local registry.
//!
//! The child is a scoped resource: `kill_on_drop` covers every exit path and
//! [`ProxySource::shutdown`] terminates it explicitly.

use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::composite::ToolSource;
use crate::registry::{Arguments, ToolError};
use crate::types::jsonrpc::JsonRpcReply;
use crate::types::protocol::PROTOCOL_VERSION;
use crate::types::tool::{CallToolResult, ListToolsResult, Tool};

/// Default per-request timeout. Generation tools can be slow; discovery is not.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Cap on a single reply line. Sized for base64 image payloads.
pub const MAX_REPLY_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to spawn tool server: {0}")]
    Spawn(std::io::Error),

    #[error("i/o error talking to tool server: {0}")]
    Io(#[from] std::io::Error),

    #[error("tool server did not reply within {0:?}")]
    Timeout(Duration),

    #[error("tool server closed its output stream")]
    ServerExited,

    #[error("tool server reply exceeded {0} bytes")]
    ReplyTooLarge(usize),

    #[error("malformed reply from tool server: {0}")]
    InvalidReply(String),

    #[error("tool server error: [{code}] {message}")]
    Rpc { code: i32, message: String },
}

/// Line-delimited JSON-RPC over any byte streams.
///
/// Generic over reader/writer so the framing is testable against in-memory
/// duplex streams; production wires it to a child's stdout/stdin.
struct RpcWire<R, W> {
    reader: Mutex<BufReader<R>>,
    writer: Mutex<W>,
    next_id: AtomicI64,
    timeout: Duration,
}

impl<R, W> RpcWire<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn new(reader: R, writer: W, request_timeout: Duration) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(writer),
            next_id: AtomicI64::new(1),
            timeout: request_timeout,
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProxyError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.write_line(&message).await?;

        timeout(self.timeout, self.read_reply(id))
            .await
            .map_err(|_| ProxyError::Timeout(self.timeout))?
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ProxyError> {
        let message = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or(Value::Null),
        });
        self.write_line(&message).await
    }

    async fn write_line(&self, message: &Value) -> Result<(), ProxyError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(message.to_string().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_reply(&self, id: i64) -> Result<Value, ProxyError> {
        let mut reader = self.reader.lock().await;
        loop {
            let mut line = String::new();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Err(ProxyError::ServerExited);
            }
            if line.len() > MAX_REPLY_BYTES {
                return Err(ProxyError::ReplyTooLarge(MAX_REPLY_BYTES));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(trimmed)
                .map_err(|e| ProxyError::InvalidReply(e.to_string()))?;

            // Server-initiated requests and notifications are not answered
            // here; skip them and keep waiting for our reply.
            if value.get("method").is_some() {
                tracing::debug!(
                    method = value["method"].as_str().unwrap_or(""),
                    "ignoring server-initiated message"
                );
                continue;
            }

            let reply: JsonRpcReply = serde_json::from_value(value)
                .map_err(|e| ProxyError::InvalidReply(e.to_string()))?;
            match reply.id.as_i64() {
                Some(got) if got == id => {}
                other => {
                    return Err(ProxyError::InvalidReply(format!(
                        "reply id mismatch: expected {}, got {:?}",
                        id, other
                    )));
                }
            }

            return reply.into_result().map_err(|e| ProxyError::Rpc {
                code: e.code,
                message: e.message,
            });
        }
    }
}

/// Run the MCP handshake and fetch the remote tool list.
async fn handshake<R, W>(
    wire: &RpcWire<R, W>,
    client_name: &str,
) -> Result<(String, Vec<Tool>), ProxyError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let init = wire
        .request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": client_name,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
        .await?;

    let server_name = init
        .get("serverInfo")
        .and_then(|info| info.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("remote-tools")
        .to_string();

    wire.notify("notifications/initialized", None).await?;

    let listed = wire.request("tools/list", json!({})).await?;
    let result: ListToolsResult = serde_json::from_value(listed)
        .map_err(|e| ProxyError::InvalidReply(format!("tools/list: {}", e)))?;

    Ok((server_name, result.tools))
}

/// A registry-shaped adapter whose tools live in a child process.
pub struct ProxySource {
    name: String,
    tools: Vec<Tool>,
    wire: RpcWire<ChildStdout, ChildStdin>,
    child: Mutex<Child>,
}

impl ProxySource {
    /// Spawn the tool server and complete the handshake.
    pub async fn spawn(command: &str, args: &[String]) -> Result<Self, ProxyError> {
        Self::spawn_with_timeout(command, args, DEFAULT_TIMEOUT).await
    }

    pub async fn spawn_with_timeout(
        command: &str,
        args: &[String],
        request_timeout: Duration,
    ) -> Result<Self, ProxyError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProxyError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProxyError::Spawn(std::io::Error::other("failed to capture stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProxyError::Spawn(std::io::Error::other("failed to capture stdout")))?;

        let wire = RpcWire::new(stdout, stdin, request_timeout);
        let (name, tools) = handshake(&wire, "easel").await?;
        tracing::info!(server = %name, tools = tools.len(), command, "subprocess tool server ready");

        Ok(Self {
            name,
            tools,
            wire,
            child: Mutex::new(child),
        })
    }

    /// Terminate the child process.
    pub async fn shutdown(&self) -> Result<(), ProxyError> {
        let mut child = self.child.lock().await;
        child.kill().await?;
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }
}

#[async_trait]
impl ToolSource for ProxySource {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Vec<Tool> {
        self.tools.clone()
    }

    async fn invoke(&self, name: &str, arguments: Arguments) -> Result<Value, ToolError> {
        let params = json!({
            "name": name,
            "arguments": Value::Object(arguments),
        });
        let raw = self
            .wire
            .request("tools/call", params)
            .await
            .map_err(|e| ToolError::OperationFailed(e.to_string()))?;

        let result: CallToolResult = serde_json::from_value(raw)
            .map_err(|e| ToolError::OperationFailed(format!("malformed tools/call reply: {}", e)))?;

        if result.is_error {
            let message = result
                .content
                .iter()
                .filter_map(|c| c.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            return Err(ToolError::OperationFailed(message));
        }

        Ok(result.into_value())
    }
}
