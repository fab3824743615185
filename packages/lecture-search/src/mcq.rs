//! Multiple-choice card detection. Card fronts arrive as HTML; an MCQ card
//! has a question followed by lettered or numbered options.

use regress::Regex;

/// Try to read a card front as an MCQ. Returns the question and the option
/// texts, or `None` when the card does not look like one (fewer than two
/// options, or no question text before the first option).
pub fn parse_mcq(card_html: &str) -> Option<(String, Vec<String>)> {
    let block_tags = Regex::with_flags(r"<(?:br|p|div|li|tr)[^>]*>", "i").expect("valid block tag regex");
    let any_tag = Regex::new(r"<[^>]+>").expect("valid tag regex");
    let spaces = Regex::new(r"[ \t]+").expect("valid spaces regex");
    let blank_lines = Regex::new(r"\n{3,}").expect("valid blank line regex");

    // Block-level tags become newlines so the option layout survives
    // stripping.
    let text = replace_all(&block_tags, card_html, "\n");
    let text = replace_all(&any_tag, &text, "");
    let text = text.replace("&nbsp;", " ");
    let text = replace_all(&spaces, &text, " ");
    let text = replace_all(&blank_lines, &text, "\n\n");
    let text = text.trim();

    let option_marker =
        Regex::new(r"(?:^|\n)\s*([a-dA-D1-4])[).]\s+(.+)").expect("valid option regex");

    let mut options: Vec<String> = Vec::new();
    let mut first_start: Option<usize> = None;
    for matched in option_marker.find_iter(text) {
        if first_start.is_none() {
            first_start = Some(matched.range().start);
        }
        let Some(group) = matched.group(2) else {
            continue;
        };
        let answer = text.get(group).unwrap_or("").trim().to_string();
        options.push(answer);
    }
    if options.len() < 2 {
        return None;
    }

    let question = text[..first_start?].replace('\n', " ").trim().to_string();
    if question.is_empty() {
        return None;
    }
    Some((question, options))
}

/// regress has no replace API; rebuild the string around the match spans.
fn replace_all(regex: &Regex, text: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for matched in regex.find_iter(text) {
        let range = matched.range();
        if range.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..range.start]);
        out.push_str(replacement);
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lettered_options_after_br_tags_parse() {
        let html = "Vilken organell producerar ATP?<br>\
                    a) Golgiapparaten<br>\
                    b) Mitokondrien<br>\
                    c) Lysosomen";
        let (question, answers) = parse_mcq(html).unwrap();
        assert_eq!(question, "Vilken organell producerar ATP?");
        assert_eq!(answers, vec!["Golgiapparaten", "Mitokondrien", "Lysosomen"]);
    }

    #[test]
    fn numbered_options_in_divs_parse() {
        let html = "<div>Hur många kromosomer har en human somatisk cell?</div>\
                    <div>1) 23</div><div>2) 46</div><div>3) 92</div>";
        let (question, answers) = parse_mcq(html).unwrap();
        assert_eq!(
            question,
            "Hur många kromosomer har en human somatisk cell?"
        );
        assert_eq!(answers, vec!["23", "46", "92"]);
    }

    #[test]
    fn entities_and_inline_tags_are_stripped() {
        let html = "Vad g&ouml;r ribosomen?&nbsp;<b>Ribosomen</b><br>A. Syntetiserar protein<br>B. Bryter ned protein";
        let (question, answers) = parse_mcq(html).unwrap();
        assert!(question.contains("Ribosomen"));
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0], "Syntetiserar protein");
    }

    #[test]
    fn one_option_is_not_an_mcq() {
        assert!(parse_mcq("Fråga?<br>a) Enda svaret").is_none());
    }

    #[test]
    fn options_without_a_question_are_rejected() {
        assert!(parse_mcq("a) Ett<br>b) Två").is_none());
    }

    #[test]
    fn plain_prose_is_not_an_mcq() {
        assert!(parse_mcq("Beskriv cellmembranets uppbyggnad och funktion.").is_none());
    }
}
