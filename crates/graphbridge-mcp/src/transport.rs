//! Transport layer for MCP communication.
//!
//! A server is a child process speaking JSON-RPC over its stdio. Frames are
//! either one JSON document per line (the MCP stdio convention) or prefixed
//! with a `Content-Length` header.
//!
//! The transport owns two background tasks:
//! - the writer drains an unbounded queue into the child's stdin, so a caller
//!   that gives up on a request never leaves half a frame on the wire;
//! - the reader decodes the child's stdout and hands each response to the
//!   waiter registered under its id.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{McpError, Result};
use crate::protocol::{
    IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};

/// How long shutdown waits for the server to exit on its own before killing it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Wire framing for stdio messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// One JSON message per line.
    #[default]
    #[serde(alias = "newline-delimited")]
    Newline,
    /// `Content-Length: N\r\n\r\n` header followed by N bytes of JSON.
    ContentLength,
}

/// Encode a serialized JSON message into a frame.
pub fn encode_frame(framing: Framing, json: &str) -> String {
    match framing {
        Framing::Newline => format!("{}\n", json),
        Framing::ContentLength => format!("Content-Length: {}\r\n\r\n{}", json.len(), json),
    }
}

/// Incremental frame decoder over an async byte stream.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    framing: Framing,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader.
    pub fn new(reader: R, framing: Framing) -> Self {
        Self {
            inner: BufReader::new(reader),
            framing,
            line: String::new(),
        }
    }

    /// Read the next frame body. Returns `None` at a clean end of stream.
    pub async fn next_frame(&mut self) -> Result<Option<String>> {
        match self.framing {
            Framing::Newline => loop {
                self.line.clear();
                if self.inner.read_line(&mut self.line).await? == 0 {
                    return Ok(None);
                }
                let trimmed = self.line.trim();
                if !trimmed.is_empty() {
                    return Ok(Some(trimmed.to_string()));
                }
            },
            Framing::ContentLength => {
                let mut content_length: Option<usize> = None;
                loop {
                    self.line.clear();
                    if self.inner.read_line(&mut self.line).await? == 0 {
                        return Ok(None);
                    }
                    let trimmed = self.line.trim();
                    if trimmed.is_empty() {
                        // Blank line ends the header block; stray blanks before it are skipped.
                        if content_length.is_some() {
                            break;
                        }
                        continue;
                    }
                    if let Some((name, value)) = trimmed.split_once(':') {
                        if name.trim().eq_ignore_ascii_case("content-length") {
                            content_length = Some(value.trim().parse().map_err(|e| {
                                McpError::protocol(format!("invalid Content-Length: {}", e))
                            })?);
                        }
                    }
                }

                let length = content_length
                    .ok_or_else(|| McpError::protocol("missing Content-Length header"))?;
                let mut body = vec![0u8; length];
                self.inner.read_exact(&mut body).await?;

                String::from_utf8(body)
                    .map(Some)
                    .map_err(|e| McpError::protocol(format!("invalid UTF-8 in frame: {}", e)))
            }
        }
    }
}

type PendingMap = Arc<Mutex<Option<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>>;

/// Removes a pending entry when the waiting request finishes, times out, or is dropped.
struct PendingSlot<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if let Some(map) = self.pending.lock().as_mut() {
            map.remove(&self.id);
        }
    }
}

/// Stdio transport to one MCP server.
pub struct McpTransport {
    framing: Framing,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    /// `None` once the reader has stopped; new requests fail fast.
    pending: PendingMap,
    reader_task: JoinHandle<()>,
    writer_task: Option<JoinHandle<()>>,
    child: Option<Child>,
}

impl McpTransport {
    /// Spawn a server process and attach to its stdio.
    ///
    /// The child inherits this process's environment plus `env`. It is killed
    /// if the transport is dropped without a shutdown. Must be called from
    /// within a Tokio runtime.
    pub fn spawn_stdio(
        command: &str,
        args: &[String],
        env: &[(String, String)],
        framing: Framing,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::spawn_failed(format!("failed to spawn '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;

        tracing::debug!(command, pid = child.id(), ?framing, "spawned MCP server");

        let mut transport = Self::from_io(stdout, stdin, framing);
        transport.child = Some(child);
        Ok(transport)
    }

    /// Build a transport over arbitrary byte streams (no child process).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_io<R, W>(reader: R, writer: W, framing: Framing) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(Some(HashMap::new())));
        let (tx, rx) = mpsc::unbounded_channel();

        let writer_task = tokio::spawn(write_loop(writer, framing, rx));
        let reader_task = tokio::spawn(read_loop(
            FrameReader::new(reader, framing),
            pending.clone(),
            tx.downgrade(),
        ));

        Self {
            framing,
            outgoing: Some(tx),
            pending,
            reader_task,
            writer_task: Some(writer_task),
            child: None,
        }
    }

    /// The framing in use.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Send a request and wait up to `timeout` for the response with the same id.
    pub async fn request(
        &self,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> Result<JsonRpcResponse> {
        let json = serde_json::to_string(request)?;
        let (tx, rx) = oneshot::channel();

        {
            let mut guard = self.pending.lock();
            let map = guard.as_mut().ok_or(McpError::ConnectionClosed)?;
            map.insert(request.id, tx);
        }
        let _slot = PendingSlot {
            pending: &self.pending,
            id: request.id,
        };

        self.send_raw(json)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(McpError::ConnectionClosed),
            Err(_) => {
                tracing::warn!(
                    id = request.id,
                    method = %request.method,
                    timeout_ms = timeout.as_millis() as u64,
                    "MCP request timed out"
                );
                Err(McpError::Timeout)
            }
        }
    }

    /// Send a notification (no response expected).
    pub fn notify(&self, notification: &JsonRpcNotification) -> Result<()> {
        self.send_raw(serde_json::to_string(notification)?)
    }

    fn send_raw(&self, json: String) -> Result<()> {
        self.outgoing
            .as_ref()
            .ok_or(McpError::ConnectionClosed)?
            .send(json)
            .map_err(|_| McpError::ConnectionClosed)
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().as_ref().map_or(0, HashMap::len)
    }

    /// Shut the transport down. Safe to call more than once.
    ///
    /// Closes the server's stdin, gives it a short grace period to exit, then
    /// kills it. Every request still in flight fails with `ConnectionClosed`.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.outgoing.take();
        if let Some(writer) = self.writer_task.take() {
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, writer).await;
        }

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "MCP server exited"),
                Ok(Err(e)) => tracing::warn!(error = %e, "failed to wait for MCP server"),
                Err(_) => {
                    tracing::debug!("MCP server still running after grace period, killing");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "failed to kill MCP server");
                    }
                }
            }
        }

        self.reader_task.abort();
        self.pending.lock().take();
        Ok(())
    }

    /// Check if the transport can still carry requests.
    pub fn is_connected(&mut self) -> bool {
        if self.outgoing.is_none() || self.reader_task.is_finished() {
            return false;
        }
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }
}

impl Drop for McpTransport {
    fn drop(&mut self) {
        // The child is reaped by kill_on_drop; the writer ends with the queue.
        self.reader_task.abort();
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    framing: Framing,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(json) = rx.recv().await {
        let frame = encode_frame(framing, &json);
        if let Err(e) = write_frame(&mut writer, frame.as_bytes()).await {
            tracing::warn!(error = %e, "failed to write to MCP server");
            break;
        }
        tracing::trace!(json = %json, "sent MCP message");
    }
    let _ = writer.shutdown().await;
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> std::io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut frames: FrameReader<R>,
    pending: PendingMap,
    replies: mpsc::WeakUnboundedSender<String>,
) {
    loop {
        let frame = match frames.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!("MCP server closed its output");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read from MCP server");
                break;
            }
        };

        tracing::trace!(json = %frame, "received MCP message");

        match IncomingMessage::parse(&frame) {
            Ok(IncomingMessage::Response(response)) => {
                let waiter = pending
                    .lock()
                    .as_mut()
                    .and_then(|map| map.remove(&response.id));
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => tracing::warn!(
                        id = response.id,
                        "dropping MCP response with no pending request"
                    ),
                }
            }
            Ok(IncomingMessage::Notification(notification)) => {
                tracing::debug!(method = %notification.method, "MCP server notification");
            }
            Ok(IncomingMessage::Request(request)) => {
                let reply = if request.method == "ping" {
                    JsonRpcResponse::success(request.id, serde_json::json!({}))
                } else {
                    tracing::debug!(method = %request.method, "rejecting server-initiated request");
                    JsonRpcResponse::error_reply(
                        request.id,
                        JsonRpcError::METHOD_NOT_FOUND,
                        format!("method not supported by client: {}", request.method),
                    )
                };
                if let (Some(tx), Ok(json)) = (replies.upgrade(), serde_json::to_string(&reply)) {
                    let _ = tx.send(json);
                }
            }
            Err(e) => tracing::warn!(error = %e, "ignoring malformed MCP frame"),
        }
    }

    // Dropping the senders wakes every waiter with ConnectionClosed.
    pending.lock().take();
}
