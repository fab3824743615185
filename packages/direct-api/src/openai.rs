use cardside_error::{truncate_body, AssistantError};
use cardside_protocol::EventEmitter;
use futures::StreamExt;
use serde_json::{json, Value};

use crate::sse::{data_payload, SseBuffer};

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const ERROR_BODY_CHARS: usize = 200;

/// Stream one turn against the OpenAI chat completions API. Content deltas
/// go to `emitter` as chunks; `[DONE]` ends the turn.
pub async fn stream_openai(
    http: &reqwest::Client,
    model: &str,
    api_key: &str,
    system: &str,
    user_text: &str,
    emitter: &EventEmitter,
) -> Result<(), AssistantError> {
    let body = json!({
        "model": model,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": user_text},
        ],
        "stream": true,
    });

    tracing::debug!(model, "direct openai request");
    let response = http
        .post(COMPLETIONS_URL)
        .bearer_auth(api_key)
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
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| AssistantError::Stream {
            message: err.to_string(),
        })?;
        for line in buffer.push(&chunk) {
            let Some(payload) = data_payload(&line) else {
                continue;
            };
            if payload == "[DONE]" {
                return Ok(());
            }
            if let Some(text) = delta_content(payload) {
                emitter.chunk(text);
            }
        }
    }
    Ok(())
}

/// The content delta inside one SSE payload, if any. Malformed payloads and
/// deltas without content (role headers, finish markers) yield `None`.
fn delta_content(payload: &str) -> Option<String> {
    let event: Value = serde_json::from_str(payload).ok()?;
    event
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}
