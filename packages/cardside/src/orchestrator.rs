use std::collections::HashMap;
use std::sync::Arc;

use cardside_acp_client::AcpClient;
use cardside_error::AssistantError;
use cardside_protocol::{
    AssistantEvent, CancelToken, EventEmitter, ImageAttachment, PromptBlock,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;

use crate::backend::BackendConfig;

/// One question from the host, with everything needed to route and phrase
/// it.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub system_prompt: String,
    pub card_context: String,
    pub question: String,
    pub backend: BackendConfig,
    /// Conversation continuity key, e.g. `"chat:<card id>"`. `None` asks
    /// statelessly.
    pub session_key: Option<String>,
    pub images: Vec<ImageAttachment>,
}

type ClientCache = Arc<Mutex<HashMap<String, Arc<AcpClient>>>>;

/// Entry point for the host. Owns the process-per-backend client cache and
/// the HTTP client for the direct backends.
pub struct Assistant {
    clients: ClientCache,
    http: reqwest::Client,
}

impl Default for Assistant {
    fn default() -> Self {
        Self::new()
    }
}

impl Assistant {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            http: reqwest::Client::new(),
        }
    }

    /// Ask a question. The receiver yields zero or more `Chunk`/`ToolUse`
    /// events followed by exactly one `Done` or `Error`. Setting `cancel`
    /// suppresses further chunk delivery; the terminal event still arrives
    /// and the backend call runs to completion.
    pub fn ask(
        &self,
        request: AskRequest,
        cancel: CancelToken,
    ) -> UnboundedReceiver<AssistantEvent> {
        let (emitter, rx) = EventEmitter::channel(cancel);
        let clients = self.clients.clone();
        let http = self.http.clone();
        tokio::spawn(async move {
            match run_ask(clients, http, request, &emitter).await {
                Ok(()) => emitter.done(),
                Err(err) => {
                    tracing::warn!(kind = err.kind(), "ask failed: {err}");
                    emitter.error(err.user_message());
                }
            }
        });
        rx
    }

    /// Drop every cached agent process. Called on model or backend switch;
    /// the next ask spawns fresh processes with empty session registries.
    pub async fn invalidate_clients(&self) {
        let dropped: Vec<Arc<AcpClient>> = self.clients.lock().await.drain().map(|(_, c)| c).collect();
        for client in dropped {
            client.close().await;
        }
    }
}

async fn run_ask(
    clients: ClientCache,
    http: reqwest::Client,
    request: AskRequest,
    emitter: &EventEmitter,
) -> Result<(), AssistantError> {
    match &request.backend {
        BackendConfig::ClaudeApi { model, api_key } => {
            let user_text = direct_user_text(&request);
            cardside_direct_api::stream_claude(
                &http,
                model,
                api_key,
                &request.system_prompt,
                &user_text,
                &request.images,
                emitter,
            )
            .await
        }
        BackendConfig::OpenAiApi { model, api_key } => {
            let user_text = direct_user_text(&request);
            cardside_direct_api::stream_openai(
                &http,
                model,
                api_key,
                &request.system_prompt,
                &user_text,
                emitter,
            )
            .await
        }
        BackendConfig::ClaudeAcp { .. } | BackendConfig::CodexAcp { .. } => {
            run_acp_ask(clients, &request, emitter).await
        }
    }
}

async fn run_acp_ask(
    clients: ClientCache,
    request: &AskRequest,
    emitter: &EventEmitter,
) -> Result<(), AssistantError> {
    let spec = request
        .backend
        .launch_spec()
        .ok_or_else(|| AssistantError::Backend {
            message: "backend has no agent binary".to_string(),
        })?;

    let client = {
        let cached = clients.lock().await.get(&spec.cache_key()).cloned();
        match cached {
            Some(client) => client,
            None => {
                let client = AcpClient::start(&spec).await?;
                // A concurrent first ask may have raced us here; last writer
                // wins, same as the session registry.
                clients
                    .lock()
                    .await
                    .insert(spec.cache_key(), client.clone());
                client
            }
        }
    };

    let first_turn = match request.session_key.as_deref() {
        Some(key) => !client.has_session(key).await,
        None => true,
    };
    let session_id = client
        .get_or_create_session(request.session_key.as_deref())
        .await?;

    let text = if first_turn
        && (!request.system_prompt.is_empty() || !request.card_context.is_empty())
    {
        let mut full = String::new();
        full.push_str(&request.system_prompt);
        full.push_str("\n\n");
        if !request.card_context.is_empty() {
            full.push_str(&request.card_context);
            full.push_str("\n\n");
        }
        full.push_str(&format!("Fråga: {}", request.question));
        full
    } else {
        format!("Fråga: {}", request.question)
    };

    let mut blocks = vec![PromptBlock::Text { text }];
    if first_turn && client.supports_images() {
        for image in &request.images {
            blocks.push(PromptBlock::Image {
                mime_type: image.media_type.clone(),
                data: image.data.clone(),
            });
        }
    }

    client.prompt(&session_id, blocks, emitter).await
}

/// The direct backends carry no session; context rides along on every call.
fn direct_user_text(request: &AskRequest) -> String {
    if request.card_context.is_empty() {
        format!("Fråga: {}", request.question)
    } else {
        format!("{}\n\nFråga: {}", request.card_context, request.question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Mutex as StdMutex;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// In-process agent on the far side of duplex pipes. Answers the three
    /// protocol methods and records every request for assertions.
    async fn fake_client(image: bool) -> (Arc<AcpClient>, Arc<StdMutex<Vec<Value>>>) {
        let (client_write, agent_read) = tokio::io::duplex(64 * 1024);
        let (mut agent_write, client_read) = tokio::io::duplex(64 * 1024);
        let requests: Arc<StdMutex<Vec<Value>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(agent_read).lines();
            let mut session_counter = 0u64;
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(message) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                seen.lock().unwrap().push(message.clone());
                let id = message.get("id").and_then(Value::as_u64).unwrap_or(0);
                let replies = match message.get("method").and_then(Value::as_str) {
                    Some("initialize") => vec![json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {
                            "agentCapabilities": {"promptCapabilities": {"image": image}}
                        },
                    })],
                    Some("session/new") => {
                        session_counter += 1;
                        vec![json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {"sessionId": format!("sess-{session_counter}")},
                        })]
                    }
                    Some("session/prompt") => {
                        let session_id = message
                            .pointer("/params/sessionId")
                            .and_then(Value::as_str)
                            .unwrap_or("");
                        vec![
                            json!({
                                "jsonrpc": "2.0",
                                "method": "session/update",
                                "params": {
                                    "sessionId": session_id,
                                    "update": {
                                        "sessionUpdate": "agent_message_chunk",
                                        "content": {"text": "svar"},
                                    },
                                },
                            }),
                            json!({
                                "jsonrpc": "2.0",
                                "id": id,
                                "result": {"stopReason": "end_turn"},
                            }),
                        ]
                    }
                    _ => Vec::new(),
                };
                for reply in replies {
                    let _ = agent_write.write_all(reply.to_string().as_bytes()).await;
                    let _ = agent_write.write_all(b"\n").await;
                }
            }
        });

        let client = AcpClient::connect(client_write, client_read)
            .await
            .expect("handshake");
        (client, requests)
    }

    fn acp_backend() -> BackendConfig {
        BackendConfig::ClaudeAcp {
            binary: "claude-agent-acp".to_string(),
            model: "claude-haiku-4-5-20251001".to_string(),
            api_key: String::new(),
        }
    }

    async fn assistant_with_fake(image: bool) -> (Assistant, Arc<StdMutex<Vec<Value>>>) {
        let assistant = Assistant::new();
        let (client, requests) = fake_client(image).await;
        let key = acp_backend().launch_spec().unwrap().cache_key();
        assistant.clients.lock().await.insert(key, client);
        (assistant, requests)
    }

    fn request(question: &str, session_key: Option<&str>) -> AskRequest {
        AskRequest {
            system_prompt: "Du är en studieassistent.".to_string(),
            card_context: "Kort: mitokondrien".to_string(),
            question: question.to_string(),
            backend: acp_backend(),
            session_key: session_key.map(ToString::to_string),
            images: Vec::new(),
        }
    }

    async fn collect(mut rx: UnboundedReceiver<AssistantEvent>) -> Vec<AssistantEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn prompt_texts(requests: &Arc<StdMutex<Vec<Value>>>) -> Vec<String> {
        requests
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.get("method").and_then(Value::as_str) == Some("session/prompt"))
            .map(|m| {
                m.pointer("/params/prompt/0/text")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn first_turn_carries_context_and_later_turns_do_not() {
        let (assistant, requests) = assistant_with_fake(true).await;

        let events = collect(assistant.ask(request("Vad gör ATP?", Some("chat:7")), CancelToken::new())).await;
        assert_eq!(events.last(), Some(&AssistantEvent::Done));

        let events = collect(assistant.ask(request("Och varför?", Some("chat:7")), CancelToken::new())).await;
        assert_eq!(events.last(), Some(&AssistantEvent::Done));

        let texts = prompt_texts(&requests);
        assert_eq!(texts.len(), 2);
        assert_eq!(
            texts[0],
            "Du är en studieassistent.\n\nKort: mitokondrien\n\nFråga: Vad gör ATP?"
        );
        assert_eq!(texts[1], "Fråga: Och varför?");
    }

    #[tokio::test]
    async fn keyless_asks_always_get_the_full_prompt() {
        let (assistant, requests) = assistant_with_fake(true).await;
        collect(assistant.ask(request("Ett", None), CancelToken::new())).await;
        collect(assistant.ask(request("Två", None), CancelToken::new())).await;

        let texts = prompt_texts(&requests);
        assert!(texts[0].starts_with("Du är en studieassistent."));
        assert!(texts[1].starts_with("Du är en studieassistent."));
    }

    #[tokio::test]
    async fn images_attach_only_on_the_first_turn_of_a_capable_agent() {
        let (assistant, requests) = assistant_with_fake(true).await;
        let mut ask = request("Vad visas på bilden?", Some("chat:9"));
        ask.images = vec![ImageAttachment {
            media_type: "image/png".to_string(),
            data: "aGVq".to_string(),
        }];
        collect(assistant.ask(ask.clone(), CancelToken::new())).await;
        collect(assistant.ask(ask, CancelToken::new())).await;

        let block_counts: Vec<usize> = requests
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.get("method").and_then(Value::as_str) == Some("session/prompt"))
            .map(|m| {
                m.pointer("/params/prompt")
                    .and_then(Value::as_array)
                    .map(Vec::len)
                    .unwrap_or(0)
            })
            .collect();
        assert_eq!(block_counts, vec![2, 1]);
    }

    #[tokio::test]
    async fn images_are_omitted_when_the_handshake_refused_them() {
        let (assistant, requests) = assistant_with_fake(false).await;
        let mut ask = request("Vad visas på bilden?", Some("chat:9"));
        ask.images = vec![ImageAttachment {
            media_type: "image/png".to_string(),
            data: "aGVq".to_string(),
        }];
        collect(assistant.ask(ask, CancelToken::new())).await;

        let texts = prompt_texts(&requests);
        assert_eq!(texts.len(), 1);
        let prompts = requests.lock().unwrap();
        let prompt = prompts
            .iter()
            .find(|m| m.get("method").and_then(Value::as_str) == Some("session/prompt"))
            .unwrap();
        assert_eq!(
            prompt
                .pointer("/params/prompt")
                .and_then(Value::as_array)
                .map(Vec::len),
            Some(1)
        );
    }

    #[tokio::test]
    async fn a_cancelled_ask_still_delivers_its_terminal_event() {
        let (assistant, _) = assistant_with_fake(true).await;
        let cancel = CancelToken::new();
        cancel.cancel();
        let events = collect(assistant.ask(request("Fråga", Some("chat:1")), cancel)).await;
        assert_eq!(events, vec![AssistantEvent::Done]);
    }

    #[tokio::test]
    async fn chunks_arrive_before_the_terminal_event() {
        let (assistant, _) = assistant_with_fake(true).await;
        let events = collect(assistant.ask(request("Fråga", Some("chat:2")), CancelToken::new())).await;
        assert_eq!(
            events,
            vec![
                AssistantEvent::Chunk("svar".to_string()),
                AssistantEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn a_missing_agent_binary_surfaces_as_one_error_event() {
        let assistant = Assistant::new();
        let mut ask = request("Fråga", None);
        ask.backend = BackendConfig::ClaudeAcp {
            binary: "/nonexistent/agent-binary".to_string(),
            model: "claude-haiku-4-5-20251001".to_string(),
            api_key: String::new(),
        };
        let events = collect(assistant.ask(ask, CancelToken::new())).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            AssistantEvent::Error(message) => {
                assert!(message.contains("agent binary not found"));
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalidation_empties_the_client_cache() {
        let (assistant, _) = assistant_with_fake(true).await;
        collect(assistant.ask(request("Fråga", Some("chat:5")), CancelToken::new())).await;
        assistant.invalidate_clients().await;
        assert!(assistant.clients.lock().await.is_empty());
    }
}
