//! Item-level grammar inside a section body
//!
//! Covers item splitting, scene-code tokens, priority markers, and the
//! entity-key and status fields of rolling items.

use std::sync::LazyLock;

use regex::Regex;

/// Well-formed scene code: `[S<n>:<m>]` or `(S<n>:<m>)`.
static SCENE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[S(\d+):(\d+)\]|\(S(\d+):(\d+)\)").expect("scene code pattern is valid")
});

static ITEM_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•+](?:\s|$)|\d+[.)](?:\s|$)|\||->|→|=>|\[S\d+:\d+\]|\(S\d+:\d+\))")
        .expect("item start pattern is valid")
});

static BULLET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•+]|\d+[.)]|->|→|=>)\s*").expect("bullet pattern is valid")
});

static STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bstatus\s*:\s*([A-Za-z_]+)").expect("status pattern is valid"));

static RELATIONSHIP_ARROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\[\]]+)\]\s*(?:->|→|=>)\s*\[([^\[\]]+)\]").expect("arrow pattern is valid")
});

/// Priority markers and the importance each implies.
pub const PRIORITY_MARKERS: &[(&str, u8)] = &[
    ("🔴", 95),
    ("‼", 95),
    ("[CRITICAL]", 95),
    ("⚠️", 85),
    ("⚠", 85),
    ("❗", 85),
    ("[!]", 85),
    ("[HIGH]", 85),
    ("⭐", 75),
    ("★", 75),
    ("[KEY]", 75),
    ("[IMPORTANT]", 75),
    ("🟡", 65),
    ("[MEDIUM]", 65),
];

/// Split a section body into items.
///
/// Item-start lines open a new item; other non-blank lines continue the
/// current one and blank lines close it.
pub fn split_items(body: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush(&mut current, &mut items);
            continue;
        }
        if is_table_separator(trimmed) {
            continue;
        }
        if ITEM_START.is_match(line) {
            flush(&mut current, &mut items);
        }
        current.push(trimmed);
    }
    flush(&mut current, &mut items);

    items
}

fn flush(current: &mut Vec<&str>, items: &mut Vec<String>) {
    if !current.is_empty() {
        items.push(current.join("\n"));
        current.clear();
    }
}

/// `|---|:--:|` style rows carry no content.
fn is_table_separator(line: &str) -> bool {
    line.starts_with('|')
        && line.contains('-')
        && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
}

/// First well-formed scene code in `text`, without brackets.
pub fn extract_scene_code(text: &str) -> Option<String> {
    let caps = SCENE_CODE.captures(text)?;
    let (scene, beat) = match (caps.get(1), caps.get(2)) {
        (Some(s), Some(b)) => (s.as_str(), b.as_str()),
        _ => (caps.get(3)?.as_str(), caps.get(4)?.as_str()),
    };
    Some(format!("S{scene}:{beat}"))
}

/// Highest priority weight among markers found in `text`, or 0.
pub fn priority_weight(text: &str) -> u8 {
    PRIORITY_MARKERS
        .iter()
        .filter(|(marker, _)| text.contains(marker))
        .map(|(_, weight)| *weight)
        .max()
        .unwrap_or(0)
}

/// Remove scene-code tokens and priority markers, tidying leftover spacing.
pub fn strip_presentation_tokens(text: &str) -> String {
    let mut stripped = SCENE_CODE.replace_all(text, "").into_owned();
    for (marker, _) in PRIORITY_MARKERS {
        stripped = stripped.replace(marker, "");
    }
    stripped = stripped.replace('\u{FE0F}', "");

    stripped
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .map(|line| {
            // a bare bullet left behind by a removed token
            if matches!(line.as_str(), "-" | "*" | "•" | "+") {
                String::new()
            } else {
                line
            }
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Uppercased value of a `status: WORD` field.
pub fn parse_status(text: &str) -> Option<String> {
    STATUS
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase())
}

fn normalize_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `"a->b"` from the first `[A] -> [B]` pattern in the item.
pub fn relationship_key(item: &str) -> Option<String> {
    let cleaned = SCENE_CODE.replace_all(item, "");
    let caps = RELATIONSHIP_ARROW.captures(&cleaned)?;
    let from = normalize_key(caps.get(1)?.as_str());
    let to = normalize_key(caps.get(2)?.as_str());
    if from.is_empty() || to.is_empty() {
        return None;
    }
    Some(format!("{from}->{to}"))
}

/// Lowercased first pipe-delimited field of the item.
pub fn leading_field_key(item: &str) -> Option<String> {
    let first_line = item.lines().next()?;
    let without_bullet = BULLET.replace(first_line, "");
    let cleaned = strip_presentation_tokens(&without_bullet);
    let field = cleaned
        .trim()
        .trim_start_matches('|')
        .split('|')
        .next()
        .unwrap_or_default();
    let key = normalize_key(field.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace()));
    if key.is_empty() { None } else { Some(key) }
}
