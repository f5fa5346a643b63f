use once_cell::sync::Lazy;
use regex::Regex;

/// Hard cap on spoken reply length. Anything longer is cut at the last
/// sentence boundary before the cap.
const MAX_SPEECH_CHARS: usize = 1200;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```.*?(```|$)").expect("code fence regex"));
static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("link regex"));
static HEADING_OR_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(#{1,6}\s+|[-*•]\s+|\d+\.\s+|>\s+)").expect("heading regex"));
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*_`~#|]").expect("emphasis regex"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\n\s*(\n\s*)*").expect("blank regex"));
static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("space regex"));

/// Rewrite a model reply into something a synthesis voice can speak.
///
/// Language models produce chat-shaped text: headings, bullet lists, code
/// fences, emphasis markers, emoji. None of that survives a phone line, so
/// structure becomes sentences and decoration is dropped.
pub fn sanitize_for_speech(text: &str) -> String {
    let text = CODE_FENCE.replace_all(text, " ");
    let text = MARKDOWN_LINK.replace_all(&text, "$1");
    let text = HEADING_OR_BULLET.replace_all(&text, "");
    let text = EMPHASIS.replace_all(&text, "");

    // Decorative symbols (emoji and friends) say nothing out loud
    let text: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || is_speech_punct(*c))
        .collect();

    let text = BLANK_RUNS.replace_all(&text, " ");
    let text = SPACE_RUNS.replace_all(&text, " ");
    let text = text.trim().to_string();

    truncate_at_sentence(&text, MAX_SPEECH_CHARS)
}

fn is_speech_punct(c: char) -> bool {
    matches!(
        c,
        '.' | ',' | '!' | '?' | ';' | ':' | '\'' | '"' | '(' | ')' | '-' | '%' | '$' | '€' | '/'
            | '&' | '+'
    )
}

/// Cut at the last sentence end before `max_chars`; fall back to the last
/// word boundary, then to a hard cut on a char boundary.
fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }

    let mut cut = max_chars;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = &text[..cut];

    let sentence_end = head
        .rmatch_indices(". ")
        .chain(head.rmatch_indices("! "))
        .chain(head.rmatch_indices("? "))
        .map(|(i, s)| i + s.len())
        .max();

    match sentence_end {
        Some(pos) => head[..pos].trim_end().to_string(),
        None => match head.rfind(' ') {
            Some(pos) => head[..pos].trim_end().to_string(),
            None => head.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let text = "We're open nine to five, Monday through Friday.";
        assert_eq!(sanitize_for_speech(text), text);
    }

    #[test]
    fn markdown_structure_becomes_sentences() {
        let text = "## Our rates\n\n- Standard: 4.5%\n- Premium: 3.9%\n\nCall us *today*!";
        let spoken = sanitize_for_speech(text);
        assert!(!spoken.contains('#'));
        assert!(!spoken.contains('-'));
        assert!(!spoken.contains('*'));
        assert!(spoken.contains("Standard: 4.5%"));
        assert!(spoken.contains("Call us today!"));
    }

    #[test]
    fn code_fences_are_dropped_entirely() {
        let text = "Here is an example:\n```\nlet x = 1;\n```\nThat's all.";
        let spoken = sanitize_for_speech(text);
        assert!(!spoken.contains("let x"));
        assert!(spoken.contains("That's all."));
    }

    #[test]
    fn links_keep_their_label_only() {
        let spoken = sanitize_for_speech("See [our site](https://example.com) for details.");
        assert_eq!(spoken, "See our site for details.");
    }

    #[test]
    fn emoji_and_decoration_vanish() {
        let spoken = sanitize_for_speech("Great news! 🎉🎉 Your rate is 3.9% ✨");
        assert_eq!(spoken, "Great news! Your rate is 3.9%");
    }

    #[test]
    fn blank_lines_collapse() {
        let spoken = sanitize_for_speech("First.\n\n\nSecond.");
        assert_eq!(spoken, "First. Second.");
    }

    #[test]
    fn long_replies_cut_at_sentence_boundary() {
        let sentence = "This sentence is repeated to exceed the cap. ";
        let long = sentence.repeat(60);
        let spoken = sanitize_for_speech(&long);
        assert!(spoken.len() <= MAX_SPEECH_CHARS);
        assert!(spoken.ends_with("cap."));
    }

    #[test]
    fn unbroken_text_still_caps() {
        let long = "a".repeat(5000);
        let spoken = sanitize_for_speech(&long);
        assert!(spoken.len() <= MAX_SPEECH_CHARS);
        assert!(!spoken.is_empty());
    }
}
