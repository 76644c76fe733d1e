//! Raw upstream message to [`PostRecord`].
//!
//! Normalization never fails: anything missing or unreadable becomes an empty
//! value. Channels with analytics disabled still report `views`/`reactions`
//! fields on some messages; they are taken at face value and absent counters
//! become 0, so sorting by views on such a channel is only approximate.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::record::{PostRecord, ReactionCount};
use crate::upstream::RawMessage;

/// Emoji shown for custom reactions that carry no emoticon.
pub const CUSTOM_REACTION_EMOJI: &str = "👍";

/// Number of reactions kept for display.
pub const TOP_REACTIONS: usize = 3;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("valid markdown pattern"),
        replacement,
    }
}

/// Markdown removal rules, applied in order.
///
/// Underscore emphasis only matches at word boundaries so that handles and
/// URLs such as `t.me/rust_lang_news` survive.
static MARKDOWN_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"(?s)\*\*(.+?)\*\*", "$1"),
        rule(r"(?s)(^|[^\w/])__(.+?)__", "$1$2"),
        rule(r"\*([^*]+?)\*", "$1"),
        rule(r"(^|[^\w/])_([^_\n]+?)_($|[^\w])", "$1$2$3"),
        rule(r"(?s)~~(.+?)~~", "$1"),
        rule(r"(?s)```(.+?)```", "$1"),
        rule(r"`(.+?)`", "$1"),
        rule(r"\[(.+?)\]\(.+?\)", "$1"),
        rule(r"(?m)^\*+[ \t]*", ""),
        rule(r"(?m)[ \t]*\*+$", ""),
        rule(r"(?m)^_+[ \t]*", ""),
        rule(r"(?m)[ \t]*_+$", ""),
        rule(r"(?m)^[ \t]*[-*+][ \t]+", ""),
    ]
});

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:https?://|www\.|t\.me/)[^\s<>()\[\]{}"'`]+"#).expect("valid URL pattern")
});

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '*', '_', '~', '»', '…'];

/// Converts one raw message into a record.
pub fn normalize(raw: &RawMessage) -> PostRecord {
    let (text, entity_links) = raw
        .text
        .as_ref()
        .map(flatten_text)
        .unwrap_or_default();

    let links = merge_links(&text, entity_links);

    let results = raw
        .reactions
        .as_ref()
        .map(|r| r.results.as_slice())
        .unwrap_or_default();
    let reactions = results.iter().map(|r| r.count).sum();

    let mut ranked: Vec<ReactionCount> = results
        .iter()
        .map(|r| {
            let emoji = r
                .emoticon
                .as_deref()
                .filter(|e| !e.is_empty())
                .unwrap_or(CUSTOM_REACTION_EMOJI);
            ReactionCount::new(emoji, r.count)
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(TOP_REACTIONS);

    PostRecord::new(raw.id, raw.date, clean_markdown(&text).trim())
        .with_links(links)
        .with_reactions(reactions)
        .with_views(raw.views.unwrap_or(0))
        .with_top_reactions(ranked)
}

/// A `text_link` target and the byte offset in the flattened text where its
/// entity starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityLink {
    pub offset: usize,
    pub href: String,
}

/// Flattens message text into a plain string plus the targets of
/// `text_link` entities.
///
/// Upstream text is either a plain string or an array mixing strings and
/// entity objects (`{"type": "bold", "text": "..."}`).
pub fn flatten_text(value: &Value) -> (String, Vec<EntityLink>) {
    match value {
        Value::String(s) => (s.clone(), Vec::new()),
        Value::Array(items) => {
            let mut text = String::new();
            let mut links = Vec::new();
            for item in items {
                match item {
                    Value::String(s) => text.push_str(s),
                    Value::Object(obj) => {
                        let offset = text.len();
                        if let Some(part) = obj.get("text").and_then(Value::as_str) {
                            text.push_str(part);
                        }
                        let is_link = obj.get("type").and_then(Value::as_str) == Some("text_link");
                        if let Some(href) = obj.get("href").and_then(Value::as_str).filter(|_| is_link) {
                            links.push(EntityLink {
                                offset,
                                href: href.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            (text, links)
        }
        _ => (String::new(), Vec::new()),
    }
}

/// Removes markdown markers, keeping the marked-up text.
///
/// ```rust
/// use postpack::normalize::clean_markdown;
///
/// assert_eq!(clean_markdown("**Big** news, see [docs](https://x.org)"), "Big news, see docs");
/// ```
pub fn clean_markdown(text: &str) -> String {
    MARKDOWN_RULES
        .iter()
        .fold(text.to_string(), |acc, rule| {
            rule.pattern.replace_all(&acc, rule.replacement).into_owned()
        })
}

/// URL-shaped substrings of `text`, in first-appearance order, without
/// duplicates.
pub fn extract_links(text: &str) -> Vec<String> {
    merge_links(text, Vec::new())
}

/// URLs found in `text` and entity targets, ordered by where they appear.
/// A plain URL and an entity starting at the same offset keep that order.
fn merge_links(text: &str, entity_links: Vec<EntityLink>) -> Vec<String> {
    let mut found: Vec<(usize, String)> = URL
        .find_iter(text)
        .map(|m| (m.start(), m.as_str().trim_end_matches(TRAILING_PUNCTUATION).to_string()))
        .chain(entity_links.into_iter().map(|e| (e.offset, e.href)))
        .collect();
    found.sort_by_key(|(offset, _)| *offset);

    let mut links: Vec<String> = Vec::new();
    for (_, link) in found {
        if link.is_empty() || links.contains(&link) {
            continue;
        }
        links.push(link);
    }
    links
}
