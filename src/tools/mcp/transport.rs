//! MCP transports.
//!
//! A transport moves [`Envelope`]s between the client and one server. Three
//! variants exist:
//!
//! - [`StdioTransport`]: a child process speaking newline-delimited JSON on
//!   stdin/stdout
//! - [`HttpTransport`]: one POST per envelope, the response body is the reply
//! - [`SseTransport`]: POST for sending; replies carried in the POST body as
//!   JSON or `data:` event lines are forwarded, nothing else is streamed
//!
//! Inbound envelopes are queued on an internal channel and drained by the
//! client's dispatcher through [`Transport::receive`].

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::{McpServerConfig, TransportKind};
use crate::error::{ConductorError, Result};

use super::protocol::Envelope;

/// Capacity of the inbound envelope queue.
const INBOUND_CAPACITY: usize = 64;

/// Grace period after closing stdin before SIGTERM.
const GRACEFUL_EXIT_WAIT: Duration = Duration::from_millis(100);
/// Grace period after SIGTERM before SIGKILL.
const TERMINATE_WAIT: Duration = Duration::from_millis(200);
/// Wait after SIGKILL; shutdown gives up after this.
const KILL_WAIT: Duration = Duration::from_millis(100);

/// Byte-level channel to one MCP server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one envelope.
    async fn send(&self, envelope: &Envelope) -> Result<()>;

    /// Next inbound envelope, or `None` once the transport is closed and
    /// drained.
    async fn receive(&self) -> Option<Envelope>;

    /// Shut the transport down. Never blocks indefinitely.
    async fn close(&self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// Open the transport described by `config`.
pub async fn open(config: &McpServerConfig) -> Result<Arc<dyn Transport>> {
    match config.transport_kind() {
        TransportKind::Stdio => {
            let command = config.command.as_deref().ok_or_else(|| {
                ConductorError::Mcp(format!(
                    "Server '{}' uses stdio transport but has no command",
                    config.name
                ))
            })?;
            let transport =
                StdioTransport::spawn(&config.name, command, &config.args, &config.env)?;
            Ok(Arc::new(transport))
        }
        TransportKind::Http => {
            let url = required_url(config)?;
            Ok(Arc::new(HttpTransport::new(
                &config.name,
                url,
                config.headers.clone(),
                config.timeout(),
            )?))
        }
        TransportKind::Sse => {
            let url = required_url(config)?;
            Ok(Arc::new(SseTransport::new(
                &config.name,
                url,
                config.headers.clone(),
                config.timeout(),
            )?))
        }
    }
}

fn required_url(config: &McpServerConfig) -> Result<&str> {
    config.url.as_deref().ok_or_else(|| {
        ConductorError::Mcp(format!(
            "Server '{}' uses {} transport but has no url",
            config.name,
            config.transport_kind()
        ))
    })
}

// ============================================================================
// Stdio
// ============================================================================

/// Child process transport.
pub struct StdioTransport {
    server: String,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    inbound: Mutex<mpsc::Receiver<Envelope>>,
    connected: Arc<AtomicBool>,
}

impl StdioTransport {
    /// Spawn the server process and start reading its stdout.
    pub fn spawn(
        server: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ConductorError::Mcp(format!("Failed to spawn MCP server '{}': {}", server, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConductorError::Mcp(format!("No stdin for MCP server '{}'", server)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConductorError::Mcp(format!("No stdout for MCP server '{}'", server)))?;

        let connected = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        tokio::spawn(read_envelopes(
            server.to_string(),
            stdout,
            tx,
            Arc::clone(&connected),
        ));
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(server.to_string(), stderr));
        }

        info!(server = %server, command = %command, pid = ?child.id(), "Spawned MCP server");

        Ok(Self {
            server: server.to_string(),
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            inbound: Mutex::new(rx),
            connected,
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        let mut line = serde_json::to_string(envelope)?;
        line.push('\n');

        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| {
            ConductorError::Mcp(format!("MCP server '{}' is not connected", self.server))
        })?;
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            self.connected.store(false, Ordering::SeqCst);
            return Err(ConductorError::Mcp(format!(
                "Failed to write to MCP server '{}': {}",
                self.server, e
            )));
        }
        Ok(())
    }

    async fn receive(&self) -> Option<Envelope> {
        self.inbound.lock().await.recv().await
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        // Dropping stdin signals EOF to the server.
        drop(self.stdin.lock().await.take());

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        if exited_within(&mut child, GRACEFUL_EXIT_WAIT).await {
            debug!(server = %self.server, "MCP server exited after stdin closed");
            return Ok(());
        }

        terminate(&mut child);
        if exited_within(&mut child, TERMINATE_WAIT).await {
            debug!(server = %self.server, "MCP server exited after SIGTERM");
            return Ok(());
        }

        warn!(server = %self.server, "MCP server ignored SIGTERM, killing");
        let _ = child.start_kill();
        if !exited_within(&mut child, KILL_WAIT).await {
            warn!(server = %self.server, "MCP server still running after kill, giving up");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn exited_within(child: &mut Child, wait: Duration) -> bool {
    matches!(tokio::time::timeout(wait, child.wait()).await, Ok(Ok(_)))
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!(pid, error = %e, "SIGTERM failed");
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

/// Read newline-delimited envelopes until EOF. Lines that do not parse are
/// logged and skipped.
async fn read_envelopes<R>(
    server: String,
    reader: R,
    tx: mpsc::Sender<Envelope>,
    connected: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Envelope>(line) {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(server = %server, error = %e, "Dropping unparseable line from MCP server");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(server = %server, error = %e, "Error reading from MCP server");
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
    debug!(server = %server, "MCP server output closed");
}

async fn forward_stderr<R>(server: String, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(server = %server, "stderr: {}", line);
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Shared POST plumbing for the HTTP and SSE transports.
struct HttpChannel {
    server: String,
    url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
    outbound: Mutex<Option<mpsc::Sender<Envelope>>>,
    inbound: Mutex<mpsc::Receiver<Envelope>>,
    connected: AtomicBool,
}

impl HttpChannel {
    fn new(
        server: &str,
        url: &str,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        Ok(Self {
            server: server.to_string(),
            url: url.to_string(),
            headers,
            client,
            outbound: Mutex::new(Some(tx)),
            inbound: Mutex::new(rx),
            connected: AtomicBool::new(true),
        })
    }

    async fn post(&self, envelope: &Envelope) -> Result<String> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ConductorError::Mcp(format!(
                "MCP server '{}' is not connected",
                self.server
            )));
        }

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream");
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.json(envelope).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConductorError::Mcp(format!(
                "MCP server '{}' returned HTTP {}",
                self.server,
                status.as_u16()
            )));
        }
        Ok(response.text().await?)
    }

    async fn enqueue(&self, envelopes: Vec<Envelope>) {
        let guard = self.outbound.lock().await;
        if let Some(tx) = guard.as_ref() {
            for envelope in envelopes {
                if tx.send(envelope).await.is_err() {
                    break;
                }
            }
        }
    }

    async fn receive(&self) -> Option<Envelope> {
        self.inbound.lock().await.recv().await
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        // Dropping the sender ends `receive` once the queue drains.
        self.outbound.lock().await.take();
    }
}

/// Request/response over HTTP POST.
pub struct HttpTransport {
    channel: HttpChannel,
}

impl HttpTransport {
    pub fn new(
        server: &str,
        url: &str,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            channel: HttpChannel::new(server, url, headers, timeout)?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        let body = self.channel.post(envelope).await?;
        if body.trim().is_empty() {
            // Notifications are acknowledged with an empty body.
            return Ok(());
        }
        // Servers may answer the `text/event-stream` offer with `data:` lines.
        let replies = match serde_json::from_str::<Envelope>(body.trim()) {
            Ok(reply) => vec![reply],
            Err(e) => {
                let events = parse_event_body(&body);
                if events.is_empty() {
                    return Err(ConductorError::Mcp(format!(
                        "Invalid response from MCP server '{}': {}",
                        self.channel.server, e
                    )));
                }
                events
            }
        };
        self.channel.enqueue(replies).await;
        Ok(())
    }

    async fn receive(&self) -> Option<Envelope> {
        self.channel.receive().await
    }

    async fn close(&self) -> Result<()> {
        self.channel.close().await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.channel.connected.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SSE
// ============================================================================

/// POST-based sender for servers that answer with event streams.
pub struct SseTransport {
    channel: HttpChannel,
}

impl SseTransport {
    pub fn new(
        server: &str,
        url: &str,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            channel: HttpChannel::new(server, url, headers, timeout)?,
        })
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        let body = self.channel.post(envelope).await?;
        let replies = parse_event_body(&body);
        if !replies.is_empty() {
            self.channel.enqueue(replies).await;
        }
        Ok(())
    }

    async fn receive(&self) -> Option<Envelope> {
        self.channel.receive().await
    }

    async fn close(&self) -> Result<()> {
        self.channel.close().await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.channel.connected.load(Ordering::SeqCst)
    }
}

/// Envelopes found in a POST body: either a plain JSON envelope or
/// `data:` lines of an event stream.
fn parse_event_body(body: &str) -> Vec<Envelope> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Ok(envelope) = serde_json::from_str::<Envelope>(trimmed) {
        return vec![envelope];
    }
    trimmed
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<Envelope>(data.trim()).ok())
        .collect()
}
