use std::sync::OnceLock;

use regex::Regex;

use crate::UNKNOWN;

const MAX_FREE_TEXT_CHARS: usize = 200;

fn tag_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").ok()).as_ref()
}

/// Removes HTML tags from catalog free text, collapses whitespace and caps the
/// length. Empty input becomes the `unknown` marker.
pub fn strip_markup(text: &str) -> String {
    let without_tags = match tag_pattern() {
        Some(pattern) => pattern.replace_all(text, ""),
        None => text.into(),
    };
    let collapsed = without_tags.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        return UNKNOWN.to_string();
    }

    if collapsed.chars().count() > MAX_FREE_TEXT_CHARS {
        let mut capped: String = collapsed.chars().take(MAX_FREE_TEXT_CHARS).collect();
        capped.push_str("...");
        return capped;
    }

    collapsed
}

/// Keeps the first sentence and caps it at `limit` chars.
pub fn first_sentence(text: &str, limit: usize) -> String {
    if text.is_empty() || text == UNKNOWN {
        return UNKNOWN.to_string();
    }

    let sentence = match text.find(". ") {
        Some(index) => &text[..=index],
        None => text,
    };

    if sentence.chars().count() > limit {
        let mut truncated: String = sentence.chars().take(limit.saturating_sub(3)).collect();
        truncated.push_str("...");
        return truncated;
    }

    sentence.to_string()
}

#[cfg(test)]
mod tests {
    use super::{first_sentence, strip_markup};

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        assert_eq!(
            strip_markup("<p>Daily   <b>orders</b>\n snapshot</p>"),
            "Daily orders snapshot"
        );
    }

    #[test]
    fn empty_or_tag_only_text_is_unknown() {
        assert_eq!(strip_markup(""), "unknown");
        assert_eq!(strip_markup("<p> </p>"), "unknown");
    }

    #[test]
    fn long_text_is_capped() {
        let stripped = strip_markup(&"word ".repeat(100));
        assert_eq!(stripped.chars().count(), 203);
        assert!(stripped.ends_with("..."));
    }

    #[test]
    fn first_sentence_stops_at_period() {
        assert_eq!(first_sentence("Orders fact table. Loaded nightly.", 120), "Orders fact table.");
        assert_eq!(first_sentence("abcdefghij", 8), "abcde...");
        assert_eq!(first_sentence("", 120), "unknown");
    }
}
