//! Credential redaction for log lines and error bodies.

use std::sync::LazyLock;

use regex::Regex;

/// Upper bound on any message we echo back to a caller.
pub const MAX_MESSAGE_CHARS: usize = 500;

const REDACTED: &str = "[REDACTED]";

static PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+", "Bearer [REDACTED]"),
        (r"\br8_[A-Za-z0-9]{8,}", REDACTED),
        (r"\bsk-[A-Za-z0-9_-]{8,}", REDACTED),
        (r"\bhf_[A-Za-z0-9]{8,}", REDACTED),
        (
            r#"(?i)\b(api[_-]?key|token|secret|password)(["']?\s*[=:]\s*["']?)[^\s"'&,}]+"#,
            "${1}${2}[REDACTED]",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Replace known secret shapes and bound the length.
pub fn redact(text: &str) -> String {
    let mut out = text.to_string();
    for (re, replacement) in PATTERNS.iter() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *replacement).into_owned();
        }
    }
    truncate(&out, MAX_MESSAGE_CHARS)
}

/// Truncate to `max` characters, appending an ellipsis when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_token_shapes() {
        let input = "auth failed: Bearer r8_abcdefghijklmnop and sk-proj_ABCDEFGH1234 hf_abcdEFGH1234";
        let out = redact(input);
        assert!(!out.contains("r8_abcdefghijklmnop"));
        assert!(!out.contains("sk-proj_ABCDEFGH1234"));
        assert!(!out.contains("hf_abcdEFGH1234"));
        assert!(out.starts_with("auth failed: Bearer [REDACTED]"));
    }

    #[test]
    fn test_redacts_assignments() {
        let out = redact("GET /x?api_key=abc123&token=zzz done");
        assert_eq!(out, "GET /x?api_key=[REDACTED]&token=[REDACTED] done");

        let out = redact(r#"{"password": "hunter2"}"#);
        assert_eq!(out, r#"{"password": "[REDACTED]"}"#);
    }

    #[test]
    fn test_leaves_plain_text() {
        assert_eq!(redact("model not found"), "model not found");
    }

    #[test]
    fn test_truncates_long_messages() {
        let long = "x".repeat(2000);
        let out = redact(&long);
        assert_eq!(out.chars().count(), MAX_MESSAGE_CHARS);
        assert!(out.ends_with('…'));
    }
}
