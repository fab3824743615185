use std::collections::HashMap;

use cardside_error::{truncate_body, AssistantError};
use cardside_protocol::{EventEmitter, ImageAttachment, ToolInvocation};
use futures::StreamExt;
use serde_json::{json, Value};

use crate::sse::{data_payload, SseBuffer};
use crate::tools;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const ERROR_BODY_CHARS: usize = 200;

/// A native tool-use block under reassembly. Claude streams the arguments as
/// JSON fragments keyed by content block index.
struct ToolBlock {
    name: String,
    partial_json: String,
}

/// Stream one turn against the Anthropic Messages API. Text deltas and
/// completed tool-use blocks go to `emitter`; the terminal event is the
/// caller's to send.
pub async fn stream_claude(
    http: &reqwest::Client,
    model: &str,
    api_key: &str,
    system: &str,
    user_text: &str,
    images: &[ImageAttachment],
    emitter: &EventEmitter,
) -> Result<(), AssistantError> {
    let mut content = Vec::new();
    for image in images {
        content.push(json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": image.media_type,
                "data": image.data,
            },
        }));
    }
    content.push(json!({"type": "text", "text": user_text}));

    let body = json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "system": system,
        "messages": [{"role": "user", "content": content}],
        "tools": tools::definitions(),
        "stream": true,
    });

    tracing::debug!(model, images = images.len(), "direct claude request");
    let response = http
        .post(MESSAGES_URL)
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&body)
        .send()
        .await
        .map_err(|err| AssistantError::Stream {
            message: err.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AssistantError::Http {
            status: status.as_u16(),
            body: truncate_body(&body, ERROR_BODY_CHARS),
        });
    }

    let mut buffer = SseBuffer::new();
    let mut open_tools: HashMap<u64, ToolBlock> = HashMap::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| AssistantError::Stream {
            message: err.to_string(),
        })?;
        for line in buffer.push(&chunk) {
            let Some(payload) = data_payload(&line) else {
                continue;
            };
            let event: Value = match serde_json::from_str(payload) {
                Ok(event) => event,
                Err(_) => continue,
            };
            if handle_event(&mut open_tools, &event, emitter) {
                return Ok(());
            }
        }
    }
    // Stream ended without message_stop; whatever arrived already streamed.
    Ok(())
}

/// Apply one SSE event to the reassembly state. Returns true on
/// `message_stop`.
fn handle_event(
    open_tools: &mut HashMap<u64, ToolBlock>,
    event: &Value,
    emitter: &EventEmitter,
) -> bool {
    match event.get("type").and_then(Value::as_str) {
        Some("content_block_start") => {
            let block = &event["content_block"];
            if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                open_tools.insert(
                    index,
                    ToolBlock {
                        name,
                        partial_json: String::new(),
                    },
                );
            }
        }
        Some("content_block_delta") => {
            let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);
            let delta = &event["delta"];
            match delta.get("type").and_then(Value::as_str) {
                Some("text_delta") => {
                    if let Some(text) = delta.get("text").and_then(Value::as_str) {
                        emitter.chunk(text);
                    }
                }
                Some("input_json_delta") => {
                    if let Some(block) = open_tools.get_mut(&index) {
                        if let Some(fragment) = delta.get("partial_json").and_then(Value::as_str) {
                            block.partial_json.push_str(fragment);
                        }
                    }
                }
                _ => {}
            }
        }
        Some("content_block_stop") => {
            let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);
            if let Some(block) = open_tools.remove(&index) {
                finish_tool_block(block, emitter);
            }
        }
        Some("message_stop") => return true,
        _ => {}
    }
    false
}

fn finish_tool_block(block: ToolBlock, emitter: &EventEmitter) {
    let arguments = if block.partial_json.is_empty() {
        json!({})
    } else {
        match serde_json::from_str(&block.partial_json) {
            Ok(arguments) => arguments,
            Err(err) => {
                tracing::debug!(tool = %block.name, error = %err, "dropping tool block with malformed arguments");
                return;
            }
        }
    };
    emitter.tool_use(ToolInvocation {
        name: block.name,
        arguments,
    });
}
