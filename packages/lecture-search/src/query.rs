//! Query sanitization: free text (a card front, an MCQ answer) in, an FTS5
//! `OR` expression of the most selective tokens out.

const MAX_QUERY_TOKENS: usize = 6;

/// Function words in both study languages, plus generic verbs that carry no
/// domain meaning. Lowercased.
const STOP_WORDS: &[&str] = &[
    // Swedish function words
    "och", "att", "det", "den", "en", "ett", "är", "av", "om", "för",
    "på", "med", "som", "till", "från", "kan", "de", "i", "vad", "har",
    "var", "sig", "men", "så", "när", "hur", "där", "här", "inte",
    "alla", "also", "bara", "dels", "dock", "även", "samt", "utan",
    "eller", "sedan", "inom", "över", "under", "efter", "igen", "deras",
    "dess", "vid", "mot", "hos", "via", "sina", "sitt", "hela", "just",
    "ofta", "vilken", "vilket", "vilka", "sant", "falskt",
    // Generic verbs/adverbs
    "gör", "göra", "leder", "sker", "finns", "inga", "olika", "andra",
    "detta", "dessa", "istället", "iväg", "skickas", "stannar",
    // English stop words
    "the", "of", "in", "a", "an", "or", "and", "is", "are", "that",
    "this", "with", "from", "which", "what", "when", "where", "how",
];

/// Reduce free text to at most six FTS5 tokens joined with ` OR `. Keeps
/// all-caps abbreviations of length >= 2 (ER, ATP, DNA) and any token longer
/// than three characters; drops stop words and punctuation. Longest tokens
/// win when there are more than six.
pub fn sanitize_query(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '_' {
                ch
            } else {
                ' '
            }
        })
        .collect();

    let mut tokens: Vec<&str> = Vec::new();
    for token in cleaned.split_whitespace() {
        let lower = token.to_lowercase();
        if STOP_WORDS.contains(&lower.as_str()) {
            continue;
        }
        let length = token.chars().count();
        let keep = (is_all_caps(token) && length >= 2) || length > 3;
        if keep && !tokens.contains(&token) {
            tokens.push(token);
        }
    }

    tokens.sort_by_key(|token| std::cmp::Reverse(token.chars().count()));
    tokens.truncate(MAX_QUERY_TOKENS);
    tokens.join(" OR ")
}

/// True when the token has at least one uppercase letter and no lowercase
/// ones. "ATP" and "A1" qualify; "mRNA" does not.
fn is_all_caps(token: &str) -> bool {
    let mut has_upper = false;
    for ch in token.chars() {
        if ch.is_lowercase() {
            return false;
        }
        if ch.is_uppercase() {
            has_upper = true;
        }
    }
    has_upper
}
