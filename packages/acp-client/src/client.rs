use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cardside_error::AssistantError;
use cardside_protocol::{EventEmitter, PromptBlock};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};

use crate::launch::LaunchSpec;

/// Ceiling for control calls (initialize, session/new).
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);
/// Ceiling for a full prompt/response cycle.
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(180);

const CLOSE_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug)]
struct RpcReply {
    result: Option<Value>,
    error: Option<String>,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<RpcReply>>>>;
type ChunkRoutes = Arc<Mutex<HashMap<String, EventEmitter>>>;

/// One agent subprocess: pipes, correlation table, chunk routing, and the
/// session registry. Created once per distinct (binary, arguments) pair and
/// shared by every prompt call that resolves to it.
pub struct AcpClient {
    stdin: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    child: Mutex<Option<Child>>,
    next_id: AtomicU64,
    pending: PendingMap,
    chunk_routes: ChunkRoutes,
    sessions: Mutex<HashMap<String, String>>,
    supports_images: AtomicBool,
    closing: AtomicBool,
}

impl AcpClient {
    /// Spawn the agent binary and perform the initialize handshake. Any
    /// startup failure surfaces as an error here; a client that starts is
    /// ready for sessions and prompts.
    pub async fn start(spec: &LaunchSpec) -> Result<Arc<Self>, AssistantError> {
        let binary = spec.program.to_string_lossy().into_owned();

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .env("PATH", spec.widened_path())
            .envs(&spec.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        tracing::info!(program = ?spec.program, args = ?spec.args, "spawning agent process");

        let mut child = command.spawn().map_err(|err| {
            tracing::error!(program = ?spec.program, error = %err, "failed to spawn agent process");
            if err.kind() == std::io::ErrorKind::NotFound {
                AssistantError::BinaryNotFound {
                    binary: binary.clone(),
                }
            } else {
                AssistantError::Spawn {
                    binary: binary.clone(),
                    message: err.to_string(),
                }
            }
        })?;

        let stdin = child.stdin.take().ok_or_else(|| AssistantError::Spawn {
            binary: binary.clone(),
            message: "failed to capture subprocess stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| AssistantError::Spawn {
            binary: binary.clone(),
            message: "failed to capture subprocess stdout".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| AssistantError::Spawn {
            binary,
            message: "failed to capture subprocess stderr".to_string(),
        })?;

        tracing::info!(pid = child.id().unwrap_or(0), "agent process spawned");

        let client = Self::attach(Box::new(stdin), Some(child));
        client.spawn_read_loop(stdout);
        client.spawn_stderr_drain(stderr);

        if let Err(err) = client.initialize().await {
            client.close().await;
            return Err(err);
        }
        Ok(client)
    }

    /// Attach to an already-connected transport (an in-process agent over
    /// duplex pipes). Performs the same handshake as [`AcpClient::start`].
    pub async fn connect<W, R>(writer: W, reader: R) -> Result<Arc<Self>, AssistantError>
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let client = Self::attach(Box::new(writer), None);
        client.spawn_read_loop(reader);
        client.initialize().await?;
        Ok(client)
    }

    fn attach(stdin: Box<dyn AsyncWrite + Send + Unpin>, child: Option<Child>) -> Arc<Self> {
        Arc::new(Self {
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            next_id: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
            chunk_routes: Arc::new(Mutex::new(HashMap::new())),
            sessions: Mutex::new(HashMap::new()),
            supports_images: AtomicBool::new(false),
            closing: AtomicBool::new(false),
        })
    }

    async fn initialize(&self) -> Result<(), AssistantError> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": 1,
                    "clientCapabilities": {},
                    "clientInfo": {
                        "name": "cardside",
                        "title": "Cardside",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
                CONTROL_TIMEOUT,
            )
            .await
            .map_err(|err| AssistantError::HandshakeFailed {
                message: err.user_message(),
            })?;

        let supports_images = result
            .pointer("/agentCapabilities/promptCapabilities/image")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.supports_images.store(supports_images, Ordering::SeqCst);
        tracing::debug!(supports_images, "agent handshake complete");
        Ok(())
    }

    /// Whether the handshake advertised image attachment support. Fixed for
    /// the lifetime of this process.
    pub fn supports_images(&self) -> bool {
        self.supports_images.load(Ordering::SeqCst)
    }

    /// Whether a backend session is already cached for this key, i.e. whether
    /// the next prompt on it is a follow-up turn.
    pub async fn has_session(&self, session_key: &str) -> bool {
        self.sessions.lock().await.contains_key(session_key)
    }

    /// Return the cached backend session for this key, creating one via
    /// `session/new` on first use. `None` always creates a fresh, uncached
    /// session. Concurrent first calls for one key may create two backend
    /// sessions; the registry keeps whichever wrote last.
    pub async fn get_or_create_session(
        &self,
        session_key: Option<&str>,
    ) -> Result<String, AssistantError> {
        if let Some(key) = session_key {
            if let Some(session_id) = self.sessions.lock().await.get(key) {
                return Ok(session_id.clone());
            }
        }

        let cwd = dirs::home_dir()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string());
        let result = self
            .call("session/new", json!({"cwd": cwd, "mcpServers": []}))
            .await
            .map_err(|err| AssistantError::SessionCreateFailed {
                message: err.user_message(),
            })?;

        let session_id = result
            .get("sessionId")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| AssistantError::SessionCreateFailed {
                message: "no sessionId in session/new response".to_string(),
            })?;

        if let Some(key) = session_key {
            self.sessions.lock().await.insert(key.to_string(), session_id.clone());
        }
        tracing::debug!(session_id = %session_id, key = ?session_key, "backend session ready");
        Ok(session_id)
    }

    /// Issue a control call and wait for its response.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, AssistantError> {
        self.request(method, params, CONTROL_TIMEOUT).await
    }

    /// Send one prompt turn. Chunks stream to `emitter` as the agent emits
    /// them; the result tells the caller which terminal event to deliver.
    pub async fn prompt(
        &self,
        session_id: &str,
        blocks: Vec<PromptBlock>,
        emitter: &EventEmitter,
    ) -> Result<(), AssistantError> {
        // Last registration wins; there is no concurrent-stream-per-session
        // support.
        self.chunk_routes
            .lock()
            .await
            .insert(session_id.to_string(), emitter.clone());

        let outcome = self
            .request(
                "session/prompt",
                json!({
                    "sessionId": session_id,
                    "prompt": blocks,
                }),
                PROMPT_TIMEOUT,
            )
            .await;

        self.chunk_routes.lock().await.remove(session_id);
        outcome.map(|_| ())
    }

    /// Best-effort shutdown: kill the subprocess and wait a bounded grace
    /// period. Failure here is not an error.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            let _ = child.start_kill();
            let _ = tokio::time::timeout(CLOSE_GRACE, child.wait()).await;
        }
        guard.take();
        self.pending.lock().await.clear();
    }

    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, AssistantError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await;
        tracing::debug!(method, id, "request sent");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => match reply.error {
                Some(message) => Err(AssistantError::Backend { message }),
                None => Ok(reply.result.unwrap_or(Value::Null)),
            },
            // Sender dropped: pending table cleared because the client is
            // closing. The caller sees it as a timeout, like a dead pipe.
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                Err(AssistantError::Timeout)
            }
            Err(_) => {
                tracing::warn!(method, id, timeout_ms = timeout.as_millis() as u64, "request timed out");
                self.pending.lock().await.remove(&id);
                Err(AssistantError::Timeout)
            }
        }
    }

    /// Write one message to the subprocess. Failures are logged and
    /// swallowed; the in-flight request then runs into its timeout.
    async fn send(&self, message: &Value) {
        let mut stdin = self.stdin.lock().await;
        let bytes = match serde_json::to_vec(message) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize outbound message");
                return;
            }
        };
        let write = async {
            stdin.write_all(&bytes).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        if let Err(err) = write.await {
            tracing::error!(error = %err, "stdin write failed");
        }
    }

    fn spawn_read_loop(&self, stdout: impl AsyncRead + Send + Unpin + 'static) {
        let pending = self.pending.clone();
        let chunk_routes = self.chunk_routes.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let message: Value = match serde_json::from_str(trimmed) {
                    Ok(message) => message,
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            raw = %truncate_line(trimmed),
                            "agent stdout: invalid JSON"
                        );
                        continue;
                    }
                };
                dispatch(&pending, &chunk_routes, message).await;
            }
            tracing::info!("agent stdout: stream ended");
        });
    }

    fn spawn_stderr_drain(&self, stderr: impl AsyncRead + Send + Unpin + 'static) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    tracing::info!("agent stderr: {}", line.trim_end());
                }
            }
        });
    }
}

/// Classify one inbound message: streaming notification, response to a
/// pending request, or unknown (silently ignored for forward compatibility).
async fn dispatch(pending: &PendingMap, chunk_routes: &ChunkRoutes, message: Value) {
    if let Some(method) = message.get("method").and_then(Value::as_str) {
        if method == "session/update" {
            route_session_update(chunk_routes, &message).await;
        }
        return;
    }

    let is_response = message.get("id").is_some();
    if !is_response {
        return;
    }
    let Some(id) = message.get("id").and_then(Value::as_u64) else {
        return;
    };

    let Some(tx) = pending.lock().await.remove(&id) else {
        tracing::debug!(id, "response has no matching pending request");
        return;
    };

    let reply = match message.get("error") {
        Some(error) => RpcReply {
            result: None,
            error: Some(
                error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| error.to_string()),
            ),
        },
        None => RpcReply {
            result: message.get("result").cloned(),
            error: None,
        },
    };
    let _ = tx.send(reply);
}

async fn route_session_update(chunk_routes: &ChunkRoutes, message: &Value) {
    let Some(params) = message.get("params") else {
        return;
    };
    let Some(session_id) = params.get("sessionId").and_then(Value::as_str) else {
        return;
    };
    let update = params.get("update");
    if update.and_then(|u| u.get("sessionUpdate")).and_then(Value::as_str)
        != Some("agent_message_chunk")
    {
        return;
    }
    let Some(text) = update
        .and_then(|u| u.pointer("/content/text"))
        .and_then(Value::as_str)
    else {
        return;
    };
    if text.is_empty() {
        return;
    }

    // Missing route is a silent no-op: the session already completed or the
    // caller unregistered early.
    if let Some(emitter) = chunk_routes.lock().await.get(session_id) {
        emitter.chunk(text);
    }
}

fn truncate_line(line: &str) -> String {
    if line.len() > 200 {
        let cut = line
            .char_indices()
            .take_while(|(index, _)| *index < 200)
            .last()
            .map(|(index, ch)| index + ch.len_utf8())
            .unwrap_or(0);
        format!("{}...", &line[..cut])
    } else {
        line.to_string()
    }
}
