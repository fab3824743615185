//! Study-session assistant core. The host (a desktop flashcard reviewer)
//! builds an [`AskRequest`], hands it to [`Assistant::ask`], and consumes a
//! stream of [`AssistantEvent`]s: answer chunks, tool invocations, then one
//! `Done` or `Error`.

mod backend;
mod orchestrator;
mod tags;

pub use backend::BackendConfig;
pub use orchestrator::{AskRequest, Assistant};
pub use tags::{finalize_answer, FinalizedAnswer};

pub use cardside_error::AssistantError;
pub use cardside_lecture_search as lecture_search;
pub use cardside_protocol::{
    AssistantEvent, CancelToken, ImageAttachment, ToolAction, ToolInvocation,
};
