//! Shared vocabulary between the backends and the host: the event contract a
//! prompt call delivers on, the tool-invocation value both the native and the
//! text-embedded decoders produce, and the prompt content blocks sent over the
//! agent wire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

pub mod tools;

pub use tools::ToolAction;

/// An image the host attached to a question. `data` is already base64 encoded
/// the way both the agent wire and the direct APIs expect it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub media_type: String,
    pub data: String,
}

/// One content block in an outbound `session/prompt`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptBlock {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },
}

/// A structured action request produced by the model, either as a native
/// streaming tool-use block or decoded from a text-embedded tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
}

/// Everything a prompt call can deliver. Zero or more `Chunk`/`ToolUse`
/// events, then exactly one `Done` or `Error`, in that order.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantEvent {
    Chunk(String),
    ToolUse(ToolInvocation),
    Done,
    Error(String),
}

/// Cooperative cancellation flag, one per in-flight prompt call. Setting it
/// suppresses further chunk delivery; the terminal event still fires and the
/// backend keeps computing.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Delivery side of a prompt call. Enforces the event contract structurally:
/// the terminal event fires at most once, nothing is delivered after it, and
/// the cancel flag is checked at every delivery point.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<AssistantEvent>,
    cancel: CancelToken,
    finished: Arc<AtomicBool>,
}

impl EventEmitter {
    pub fn channel(cancel: CancelToken) -> (Self, mpsc::UnboundedReceiver<AssistantEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                cancel,
                finished: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn chunk(&self, text: impl Into<String>) {
        if self.finished.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return;
        }
        let _ = self.tx.send(AssistantEvent::Chunk(text.into()));
    }

    pub fn tool_use(&self, invocation: ToolInvocation) {
        if self.finished.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return;
        }
        let _ = self.tx.send(AssistantEvent::ToolUse(invocation));
    }

    pub fn done(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(AssistantEvent::Done);
    }

    pub fn error(&self, message: impl Into<String>) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(AssistantEvent::Error(message.into()));
    }
}
