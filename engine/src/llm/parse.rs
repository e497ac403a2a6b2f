//! Parsing of model output
//!
//! JSON-mode replies are usually a bare object, but some models still wrap
//! them in a markdown fence or surround them with prose. Extraction tries the
//! whole reply, then the first fenced block, then the first balanced object.
//! Failures are values ([`Validated::Invalid`]), never errors.

use serde_json::Value;

/// Outcome of validating a model reply against an expected shape
#[derive(Debug, Clone, PartialEq)]
pub enum Validated<T> {
    Parsed(T),
    Invalid(String),
}

impl<T> Validated<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Validated::Parsed(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Validated::Parsed(v) => Some(v),
            Validated::Invalid(_) => None,
        }
    }
}

/// Locate and parse the JSON object in a model reply
pub fn extract_json_object(content: &str) -> Validated<serde_json::Map<String, Value>> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Validated::Invalid("empty reply".to_string());
    }

    let candidates = [
        Some(trimmed),
        extract_fenced_json(trimmed).map(str::trim),
        trimmed.find('{').and_then(|pos| extract_balanced_json(&trimmed[pos..])),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
            return Validated::Parsed(map);
        }
    }

    Validated::Invalid("reply does not contain a JSON object".to_string())
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Non-empty trimmed string field of a JSON object
pub fn non_empty_str<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_object() {
        let parsed = extract_json_object(r#"{"tasks": []}"#).ok().unwrap();
        assert!(parsed.contains_key("tasks"));
    }

    #[test]
    fn test_fenced_object_with_trailing_prose() {
        let reply = "Here you go:\n```json\n{\"a\": 1}\n```\nHope that helps";
        let parsed = extract_json_object(reply).ok().unwrap();
        assert_eq!(parsed["a"], 1);
    }

    #[test]
    fn test_object_embedded_in_prose() {
        let reply = r#"Sure! {"note": "brace } in string", "n": {"x": 2}} done"#;
        let parsed = extract_json_object(reply).ok().unwrap();
        assert_eq!(parsed["n"]["x"], 2);
    }

    #[test]
    fn test_invalid_replies() {
        assert!(!extract_json_object("").is_parsed());
        assert!(!extract_json_object("no json here").is_parsed());
        assert!(!extract_json_object("[1, 2, 3]").is_parsed());
        assert!(!extract_json_object("{\"unterminated\": ").is_parsed());
    }

    #[test]
    fn test_non_empty_str() {
        let obj = extract_json_object(r#"{"a": "  x ", "b": "   ", "c": 3}"#)
            .ok()
            .unwrap();
        assert_eq!(non_empty_str(&obj, "a"), Some("x"));
        assert_eq!(non_empty_str(&obj, "b"), None);
        assert_eq!(non_empty_str(&obj, "c"), None);
        assert_eq!(non_empty_str(&obj, "d"), None);
    }
}
