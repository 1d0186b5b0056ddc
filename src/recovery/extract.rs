//! Pull a title, steps and code out of free-form note text.

use std::sync::OnceLock;

use regex::Regex;

const MAX_TITLE_CHARS: usize = 80;
const SHORT_TITLE_CHARS: usize = 50;
const FALLBACK_SENTENCES: usize = 3;
const MIN_INLINE_SPANS: usize = 3;

fn sentence_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+\s+|[.!?]+$|\n+").expect("sentence regex"))
}

fn numbered_item() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\d+[.)]\s+(.+?)\s*$").expect("numbered regex"))
}

fn bullet_item() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*[-*•]\s+(.+?)\s*$").expect("bullet regex"))
}

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[\w+-]*[ \t]*\n?(.*?)```").expect("fence regex"))
}

fn inline_code() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`\n]+)`").expect("inline code regex"))
}

/// Sentences split on terminal punctuation followed by whitespace, or on newlines.
pub fn sentences(text: &str) -> Vec<&str> {
    sentence_break()
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// First sentence if it is short enough, otherwise the first 50 characters.
pub fn extract_title(content: &str) -> String {
    let trimmed = content.trim();
    match sentences(trimmed).first() {
        Some(first) if first.chars().count() <= MAX_TITLE_CHARS => first.to_string(),
        _ => trimmed.chars().take(SHORT_TITLE_CHARS).collect(),
    }
}

/// Numbered list items, else bulleted items, else the first three sentences.
pub fn extract_steps(content: &str) -> Vec<String> {
    let captured = |re: &Regex| -> Vec<String> {
        re.captures_iter(content)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    };

    let numbered = captured(numbered_item());
    if !numbered.is_empty() {
        return numbered;
    }
    let bullets = captured(bullet_item());
    if !bullets.is_empty() {
        return bullets;
    }
    sentences(content)
        .into_iter()
        .take(FALLBACK_SENTENCES)
        .map(str::to_string)
        .collect()
}

/// Body of the first fenced block, else at least three inline code spans
/// joined by newlines.
pub fn extract_code_example(content: &str) -> Option<String> {
    if let Some(body) = fenced_block()
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|b| !b.is_empty())
    {
        return Some(body.to_string());
    }

    let spans: Vec<&str> = inline_code()
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();
    (spans.len() >= MIN_INLINE_SPANS).then(|| spans.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_first_short_sentence() {
        assert_eq!(
            extract_title("Pin the toolchain. Then rebuild everything."),
            "Pin the toolchain"
        );
    }

    #[test]
    fn long_first_sentence_is_cut_to_fifty_chars() {
        let long = "a".repeat(120);
        assert_eq!(extract_title(&long).chars().count(), 50);
    }

    #[test]
    fn steps_prefer_numbered_list() {
        let content = "Fix:\n1. stop the server\n2) clear the cache\n- not this";
        assert_eq!(
            extract_steps(content),
            vec!["stop the server", "clear the cache"]
        );
    }

    #[test]
    fn steps_fall_back_to_bullets_then_sentences() {
        assert_eq!(
            extract_steps("Options:\n- retry\n* backoff"),
            vec!["retry", "backoff"]
        );
        assert_eq!(
            extract_steps("One. Two! Three? Four."),
            vec!["One", "Two", "Three"]
        );
    }

    #[test]
    fn code_example_from_fence() {
        let content = "Use this:\n```rust\nlet x = 1;\n```\nDone.";
        assert_eq!(extract_code_example(content).as_deref(), Some("let x = 1;"));
    }

    #[test]
    fn code_example_from_inline_spans() {
        assert_eq!(
            extract_code_example("run `a` then `b` and `c`").as_deref(),
            Some("a\nb\nc")
        );
        assert!(extract_code_example("just `one` and `two`").is_none());
    }
}
