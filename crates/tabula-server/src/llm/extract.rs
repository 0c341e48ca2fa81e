// crates/tabula-server/src/llm/extract.rs
// Tolerant JSON extraction for model output

use serde::de::DeserializeOwned;
use tracing::debug;

/// Parse a JSON object out of free-form model output.
///
/// Tries, in order: the outermost `{...}` after stripping markdown fences;
/// the same text with single quotes turned into double quotes; either text with
/// `//` and `/* */` comments removed. Returns `None` once every attempt fails.
pub fn extract_json<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let block = outer_object(strip_fences(raw))?;

    if let Ok(value) = serde_json::from_str(block) {
        return Some(value);
    }

    let requoted = block.replace('\'', "\"");
    if let Ok(value) = serde_json::from_str(&requoted) {
        debug!("JSON recovered after quote normalization");
        return Some(value);
    }

    if let Ok(value) = serde_json::from_str(&strip_comments(block)) {
        debug!("JSON recovered after comment removal");
        return Some(value);
    }

    match serde_json::from_str(&strip_comments(&requoted)) {
        Ok(value) => {
            debug!("JSON recovered after quote normalization and comment removal");
            Some(value)
        }
        Err(e) => {
            debug!(error = %e, "JSON extraction exhausted");
            None
        }
    }
}

/// Drop a surrounding ```json ... ``` (or bare ```) fence if present
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // Skip a language tag on the opening fence line
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// First `{` through last `}`
fn outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Remove `//` line comments and `/* */` block comments outside string literals
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escape_next {
                escape_next = false;
            } else if ch == '\\' {
                escape_next = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => out.push(ch),
        }
    }

    out
}
