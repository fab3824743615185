//! Text-embedded tool protocol. Backends without native tool calling emit
//! literal tagged blocks in the answer text; after the stream completes the
//! tags are decoded into the same [`ToolInvocation`] values the native
//! decoder produces, and stripped from the displayed answer.

use cardside_protocol::tools;
use cardside_protocol::ToolInvocation;
use serde_json::{json, Value};

/// A completed answer: the display text with all tool tags removed, and the
/// invocations decoded from them.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedAnswer {
    pub text: String,
    pub invocations: Vec<ToolInvocation>,
}

/// Decode and strip every tool tag from a raw streamed answer.
///
/// JSON-bodied tags (`create_card`, `create_cloze`) whose body is not a JSON
/// object are dropped; plain-bodied tags whose body trims to nothing are
/// dropped. Either way the tag text disappears from the answer, along with
/// any whitespace immediately before it. Runs of three or more newlines
/// collapse to two.
pub fn finalize_answer(raw: &str) -> FinalizedAnswer {
    let cleaned = collapse_newlines(raw);
    let cleaned = cleaned.trim();

    let mut invocations = Vec::new();
    for body in tag_bodies(cleaned, tools::CREATE_CARD) {
        if let Some(arguments) = parse_object(body) {
            invocations.push(ToolInvocation {
                name: tools::CREATE_CARD.to_string(),
                arguments,
            });
        }
    }
    for body in tag_bodies(cleaned, tools::SEARCH_CARDS) {
        let query = body.trim();
        if !query.is_empty() {
            invocations.push(ToolInvocation {
                name: tools::SEARCH_CARDS.to_string(),
                arguments: json!({"query": query}),
            });
        }
    }
    for body in tag_bodies(cleaned, tools::CHANGE_DECK) {
        let deck_name = body.trim();
        if !deck_name.is_empty() {
            invocations.push(ToolInvocation {
                name: tools::CHANGE_DECK.to_string(),
                arguments: json!({"deck_name": deck_name}),
            });
        }
    }
    for body in tag_bodies(cleaned, tools::UPDATE_CARD_BACK) {
        let content = body.trim();
        if !content.is_empty() {
            invocations.push(ToolInvocation {
                name: tools::UPDATE_CARD_BACK.to_string(),
                arguments: json!({"content": content}),
            });
        }
    }
    for body in tag_bodies(cleaned, tools::CREATE_CLOZE) {
        if let Some(arguments) = parse_object(body) {
            invocations.push(ToolInvocation {
                name: tools::CREATE_CLOZE.to_string(),
                arguments,
            });
        }
    }

    FinalizedAnswer {
        text: strip_tags(cleaned),
        invocations,
    }
}

fn parse_object(body: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(body) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Bodies of every well-formed `<name>...</name>` pair, left to right. An
/// opening tag without a closing one ends the scan.
fn tag_bodies<'a>(text: &'a str, name: &str) -> Vec<&'a str> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let mut bodies = Vec::new();
    let mut cursor = 0;
    while let Some(start) = text[cursor..].find(&open) {
        let body_start = cursor + start + open.len();
        let Some(end) = text[body_start..].find(&close) else {
            break;
        };
        bodies.push(&text[body_start..body_start + end]);
        cursor = body_start + end + close.len();
    }
    bodies
}

/// Remove every tag span, widened to cover the whitespace run immediately
/// before it, then trim.
fn strip_tags(text: &str) -> String {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    for name in tools::ALL {
        let open = format!("<{name}>");
        let close = format!("</{name}>");
        let mut cursor = 0;
        while let Some(start_rel) = text[cursor..].find(&open) {
            let start = cursor + start_rel;
            let body_start = start + open.len();
            let Some(end_rel) = text[body_start..].find(&close) else {
                break;
            };
            let end = body_start + end_rel + close.len();

            let prefix = &text[..start];
            let trailing_ws: usize = prefix
                .chars()
                .rev()
                .take_while(|ch| ch.is_whitespace())
                .map(char::len_utf8)
                .sum();
            spans.push((start - trailing_ws, end));
            cursor = end;
        }
    }

    spans.sort_unstable();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in spans {
        if start < cursor {
            cursor = cursor.max(end);
            continue;
        }
        out.push_str(&text[cursor..start]);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out.trim().to_string()
}

fn collapse_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            run += 1;
            if run <= 2 {
                out.push(ch);
            }
        } else {
            run = 0;
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_card_tag_round_trips_to_an_invocation_and_clean_prose() {
        let raw = "Mitokondrien driver cellens energiproduktion.\n\n\
                   <create_card>{\"front\":\"Q\",\"back\":\"A\"}</create_card>";
        let answer = finalize_answer(raw);
        assert_eq!(answer.text, "Mitokondrien driver cellens energiproduktion.");
        assert_eq!(
            answer.invocations,
            vec![ToolInvocation {
                name: "create_card".to_string(),
                arguments: json!({"front": "Q", "back": "A"}),
            }]
        );
    }

    #[test]
    fn plain_bodied_tags_wrap_into_argument_objects() {
        let raw = "Kollar korten.\n<search_cards>golgi</search_cards>\n\
                   <change_deck>Cellbiologi</change_deck>\n\
                   <update_card_back>Nytt svar</update_card_back>";
        let answer = finalize_answer(raw);
        assert_eq!(answer.text, "Kollar korten.");
        assert_eq!(
            answer.invocations,
            vec![
                ToolInvocation {
                    name: "search_cards".to_string(),
                    arguments: json!({"query": "golgi"}),
                },
                ToolInvocation {
                    name: "change_deck".to_string(),
                    arguments: json!({"deck_name": "Cellbiologi"}),
                },
                ToolInvocation {
                    name: "update_card_back".to_string(),
                    arguments: json!({"content": "Nytt svar"}),
                },
            ]
        );
    }

    #[test]
    fn malformed_json_bodies_are_dropped_but_still_stripped() {
        let raw = "Svar.\n<create_card>{\"front\": oops</create_card>";
        let answer = finalize_answer(raw);
        assert_eq!(answer.text, "Svar.");
        assert!(answer.invocations.is_empty());
    }

    #[test]
    fn empty_plain_bodies_are_dropped_but_still_stripped() {
        let raw = "Svar.\n<search_cards>   </search_cards>";
        let answer = finalize_answer(raw);
        assert_eq!(answer.text, "Svar.");
        assert!(answer.invocations.is_empty());
    }

    #[test]
    fn cloze_tags_parse_text_and_extra() {
        let raw = "<create_cloze>{\"text\":\"ATP bildas i {{c1::mitokondrien}}.\",\"extra\":\"T3\"}</create_cloze>Klart!";
        let answer = finalize_answer(raw);
        assert_eq!(answer.text, "Klart!");
        assert_eq!(answer.invocations.len(), 1);
        assert_eq!(answer.invocations[0].name, "create_cloze");
        assert_eq!(answer.invocations[0].arguments["extra"], "T3");
    }

    #[test]
    fn triple_newlines_collapse_to_two() {
        let answer = finalize_answer("Första stycket.\n\n\n\n\nAndra stycket.");
        assert_eq!(answer.text, "Första stycket.\n\nAndra stycket.");
    }

    #[test]
    fn unclosed_tags_are_left_in_place() {
        let raw = "Text <create_card>{\"front\":\"Q\"";
        let answer = finalize_answer(raw);
        assert_eq!(answer.text, raw);
        assert!(answer.invocations.is_empty());
    }

    #[test]
    fn multiple_tags_of_one_kind_all_dispatch() {
        let raw = "<create_card>{\"front\":\"1\",\"back\":\"a\"}</create_card>\n\
                   <create_card>{\"front\":\"2\",\"back\":\"b\"}</create_card>";
        let answer = finalize_answer(raw);
        assert!(answer.text.is_empty());
        assert_eq!(answer.invocations.len(), 2);
        assert_eq!(answer.invocations[1].arguments["front"], "2");
    }
}
