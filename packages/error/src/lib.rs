use thiserror::Error;

/// Every failure a prompt call can surface. All variants render to a plain
/// human-readable string via [`AssistantError::user_message`], because errors
/// travel to the host through the same event channel as completed answers.
#[derive(Debug, Clone, Error)]
pub enum AssistantError {
    #[error("agent binary not found: {binary}")]
    BinaryNotFound { binary: String },
    #[error("failed to spawn agent process `{binary}`: {message}")]
    Spawn { binary: String, message: String },
    #[error("initialize failed: {message}")]
    HandshakeFailed { message: String },
    #[error("session/new failed: {message}")]
    SessionCreateFailed { message: String },
    #[error("Timeout waiting for response")]
    Timeout,
    /// Error reported by the backend itself; message text passed through verbatim.
    #[error("{message}")]
    Backend { message: String },
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("stream error: {message}")]
    Stream { message: String },
}

impl AssistantError {
    /// Short stable tag for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BinaryNotFound { .. } => "binary_not_found",
            Self::Spawn { .. } => "spawn",
            Self::HandshakeFailed { .. } => "handshake_failed",
            Self::SessionCreateFailed { .. } => "session_create_failed",
            Self::Timeout => "timeout",
            Self::Backend { .. } => "backend",
            Self::Http { .. } => "http",
            Self::Stream { .. } => "stream",
        }
    }

    /// The string delivered to the host, displayed inline where an answer
    /// would have appeared.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

/// Truncate a response body for inclusion in an error string.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let truncated: String = body.chars().take(max_chars).collect();
    format!("{truncated}...")
}
