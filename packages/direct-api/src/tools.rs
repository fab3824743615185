//! Function-calling schemas sent with every direct Claude request. The names
//! and argument shapes match [`cardside_protocol::tools`], so a native
//! tool-use block decodes into the same actions as a text-embedded tag.

use cardside_protocol::tools;
use serde_json::{json, Value};

/// All five tool definitions, in the order they are sent.
pub fn definitions() -> Vec<Value> {
    vec![
        json!({
            "name": tools::CREATE_CARD,
            "description": "Create a new flashcard in the user's current deck. \
                Use this when the user asks for a card, or when something worth \
                memorising comes up that would make a good flashcard.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "front": {
                        "type": "string",
                        "description": "The question or prompt on the front of the card.",
                    },
                    "back": {
                        "type": "string",
                        "description": "The answer on the back of the card. Plain text or simple HTML.",
                    },
                },
                "required": ["front", "back"],
            },
        }),
        json!({
            "name": tools::CREATE_CLOZE,
            "description": "Create a new cloze-deletion card in the current deck. \
                Embed the blanks with standard cloze syntax: {{c1::term}}, {{c2::term}}, etc.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Full cloze text with {{c1::...}} markers, \
                            e.g. 'The mitochondria is the {{c1::powerhouse}} of the cell.'",
                    },
                    "extra": {
                        "type": "string",
                        "description": "Optional extra/hint text for the back of the card.",
                    },
                },
                "required": ["text"],
            },
        }),
        json!({
            "name": tools::SEARCH_CARDS,
            "description": "Search the user's collection and return matching cards as clickable links.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query, e.g. a topic keyword or 'tag:x'.",
                    },
                },
                "required": ["query"],
            },
        }),
        json!({
            "name": tools::CHANGE_DECK,
            "description": "Move the current card to a different deck.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "deck_name": {
                        "type": "string",
                        "description": "Name of the target deck (partial match is fine).",
                    },
                },
                "required": ["deck_name"],
            },
        }),
        json!({
            "name": tools::UPDATE_CARD_BACK,
            "description": "Replace the back/answer field of the current card with new content.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "New content for the back field. Plain text or markdown.",
                    },
                },
                "required": ["content"],
            },
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_cover_every_tool_in_dispatch_order() {
        let defs = definitions();
        let names: Vec<&str> = defs
            .iter()
            .map(|tool| tool["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, tools::ALL);
    }

    #[test]
    fn required_fields_match_the_decoder_expectations() {
        let defs = definitions();
        assert_eq!(defs[0]["input_schema"]["required"], json!(["front", "back"]));
        assert_eq!(defs[1]["input_schema"]["required"], json!(["text"]));
        assert_eq!(defs[2]["input_schema"]["required"], json!(["query"]));
    }
}
