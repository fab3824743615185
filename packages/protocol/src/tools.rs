//! Typed dispatch surface for tool invocations. Both the native streaming
//! decoder and the text-tag decoder produce [`ToolInvocation`] values; hosts
//! convert them here before touching the collection.

use serde_json::Value;

use crate::ToolInvocation;

pub const CREATE_CARD: &str = "create_card";
pub const CREATE_CLOZE: &str = "create_cloze";
pub const SEARCH_CARDS: &str = "search_cards";
pub const CHANGE_DECK: &str = "change_deck";
pub const UPDATE_CARD_BACK: &str = "update_card_back";

/// Every tool name, in dispatch order.
pub const ALL: [&str; 5] = [
    CREATE_CARD,
    CREATE_CLOZE,
    SEARCH_CARDS,
    CHANGE_DECK,
    UPDATE_CARD_BACK,
];

/// A tool invocation the host knows how to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolAction {
    CreateCard { front: String, back: String },
    CreateCloze { text: String, extra: String },
    SearchCards { query: String },
    ChangeDeck { deck_name: String },
    UpdateCardBack { content: String },
}

impl ToolAction {
    /// Decode a raw invocation into a typed action. Unknown names and
    /// payloads missing their required fields yield `None`; the caller drops
    /// those silently.
    pub fn from_invocation(invocation: &ToolInvocation) -> Option<Self> {
        let args = &invocation.arguments;
        match invocation.name.as_str() {
            CREATE_CARD => Some(Self::CreateCard {
                front: required_str(args, "front")?,
                back: required_str(args, "back")?,
            }),
            CREATE_CLOZE => Some(Self::CreateCloze {
                text: required_str(args, "text")?,
                extra: optional_str(args, "extra"),
            }),
            SEARCH_CARDS => Some(Self::SearchCards {
                query: required_str(args, "query")?,
            }),
            CHANGE_DECK => Some(Self::ChangeDeck {
                deck_name: required_str(args, "deck_name")?,
            }),
            UPDATE_CARD_BACK => Some(Self::UpdateCardBack {
                content: required_str(args, "content")?,
            }),
            _ => None,
        }
    }
}

fn required_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn optional_str(args: &Value, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
