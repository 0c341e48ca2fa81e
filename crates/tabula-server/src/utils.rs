//! crates/tabula-server/src/utils.rs
//! Shared utility functions used across the codebase

use serde_json::Value;

/// Truncate a string to `max_chars` characters with ellipsis.
///
/// Counts characters, not bytes, so multi-byte text never splits mid-char.
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Number formatting convention for rendered tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    /// `1.234,56`
    #[default]
    PtBr,
    /// `1,234.56`
    EnUs,
}

impl Locale {
    /// Parse a locale tag; anything not English falls back to pt-BR.
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim().to_lowercase().replace('_', "-");
        if tag == "en" || tag.starts_with("en-") {
            Self::EnUs
        } else {
            Self::PtBr
        }
    }

    fn separators(self) -> (char, char) {
        match self {
            Self::PtBr => ('.', ','),
            Self::EnUs => (',', '.'),
        }
    }
}

/// Format an integer with thousands separators
pub fn format_integer(n: i64, locale: Locale) -> String {
    let (thousands, _) = locale.separators();
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(thousands);
        }
        out.push(ch);
    }
    if n < 0 {
        out.insert(0, '-');
    }
    out
}

/// Format a float with two decimals (whole numbers render as integers)
pub fn format_decimal(x: f64, locale: Locale) -> String {
    if !x.is_finite() {
        return x.to_string();
    }
    if x.fract() == 0.0 && x.abs() < i64::MAX as f64 {
        return format_integer(x as i64, locale);
    }
    let (_, decimal) = locale.separators();
    let rounded = format!("{:.2}", x.abs());
    let (int_part, frac_part) = rounded.split_once('.').unwrap_or((&rounded, "00"));
    let int_value: i64 = int_part.parse().unwrap_or(0);
    let sign = if x < 0.0 { "-" } else { "" };
    format!(
        "{}{}{}{}",
        sign,
        format_integer(int_value, locale),
        decimal,
        frac_part
    )
}

/// Render a JSON cell value for display
pub fn format_value(value: &Value, locale: Locale) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                format_integer(i, locale)
            } else if let Some(f) = n.as_f64() {
                format_decimal(f, locale)
            } else {
                n.to_string()
            }
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Current time as RFC 3339
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
