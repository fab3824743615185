//! Direct HTTP backends: streaming calls straight to the Anthropic and
//! OpenAI APIs, no subprocess in between. Each call is stateless; the caller
//! sends the full system prompt and context every turn.

mod claude;
mod openai;
mod sse;
pub mod tools;

pub use claude::stream_claude;
pub use openai::stream_openai;
