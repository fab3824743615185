use std::fmt;
use std::path::PathBuf;

use cardside_acp_client::LaunchSpec;

/// Which backend answers a question. The two `*Acp` variants run an agent
/// subprocess; the two `*Api` variants call the provider's HTTP API
/// directly.
#[derive(Clone)]
pub enum BackendConfig {
    ClaudeAcp {
        binary: String,
        model: String,
        api_key: String,
    },
    CodexAcp {
        binary: String,
        api_key: String,
    },
    ClaudeApi {
        model: String,
        api_key: String,
    },
    OpenAiApi {
        model: String,
        api_key: String,
    },
}

impl BackendConfig {
    /// Launch spec for the subprocess variants; `None` for the direct HTTP
    /// ones. An empty API key means the agent resolves its own credentials.
    pub fn launch_spec(&self) -> Option<LaunchSpec> {
        match self {
            Self::ClaudeAcp {
                binary,
                model,
                api_key,
            } => {
                let mut spec = LaunchSpec::new(PathBuf::from(binary));
                spec.args = vec!["--model".to_string(), model.clone()];
                if !api_key.is_empty() {
                    spec.env
                        .insert("ANTHROPIC_API_KEY".to_string(), api_key.clone());
                }
                Some(spec)
            }
            Self::CodexAcp { binary, api_key } => {
                let mut spec = LaunchSpec::new(PathBuf::from(binary));
                if !api_key.is_empty() {
                    spec.env
                        .insert("OPENAI_API_KEY".to_string(), api_key.clone());
                }
                Some(spec)
            }
            Self::ClaudeApi { .. } | Self::OpenAiApi { .. } => None,
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // API keys stay out of logs.
        match self {
            Self::ClaudeAcp { binary, model, .. } => f
                .debug_struct("ClaudeAcp")
                .field("binary", binary)
                .field("model", model)
                .finish_non_exhaustive(),
            Self::CodexAcp { binary, .. } => f
                .debug_struct("CodexAcp")
                .field("binary", binary)
                .finish_non_exhaustive(),
            Self::ClaudeApi { model, .. } => f
                .debug_struct("ClaudeApi")
                .field("model", model)
                .finish_non_exhaustive(),
            Self::OpenAiApi { model, .. } => f
                .debug_struct("OpenAiApi")
                .field("model", model)
                .finish_non_exhaustive(),
        }
    }
}
