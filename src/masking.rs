use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Replacement written in place of anything that looks like a secret.
pub const REDACTION_MARKER: &str = "[REDACTED]";

struct Rules {
    key_value: Regex,
    bearer: Regex,
    email: Regex,
    long_hex: Regex,
    base64ish: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        key_value: Regex::new(
            // `_` is a word character, so `\b` alone misses `DB_PASSWORD=`.
            r#"(?i)((?:\b|_)(?:(?:access[_-]?)?token|password|passwd|pwd|secret|api[_-]?key|access[_-]?key|auth|credentials?))(\s*[=:]\s*)("[^"]*"|'[^']*'|[^\s"'&;,]+)"#,
        )
        .expect("valid key/value pattern"),
        bearer: Regex::new(r"(?i)\b(bearer\s+)[A-Za-z0-9\-._~+/]+=*").expect("valid bearer pattern"),
        email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email pattern"),
        long_hex: Regex::new(r"\b[0-9a-fA-F]{32,}\b").expect("valid hex pattern"),
        base64ish: Regex::new(r"[A-Za-z0-9+/_-]{20,}={0,2}").expect("valid base64 pattern"),
    })
}

fn looks_like_token(candidate: &str) -> bool {
    let has_upper = candidate.bytes().any(|b| b.is_ascii_uppercase());
    let has_lower = candidate.bytes().any(|b| b.is_ascii_lowercase());
    let has_digit = candidate.bytes().any(|b| b.is_ascii_digit());
    has_upper && has_lower && has_digit
}

/// Redact likely secrets in `text`.
///
/// Rules run in a fixed order: key/value pairs, bearer tokens, email
/// addresses, hex strings of 32+ digits, then mixed-case base64-like runs
/// of 20+ characters. The marker itself never matches a later rule.
pub fn mask(text: &str) -> String {
    let rules = rules();

    let masked = rules.key_value.replace_all(text, |caps: &Captures| {
        format!("{}{}{}", &caps[1], &caps[2], REDACTION_MARKER)
    });
    let masked = rules
        .bearer
        .replace_all(&masked, |caps: &Captures| format!("{}{}", &caps[1], REDACTION_MARKER));
    let masked = rules.email.replace_all(&masked, REDACTION_MARKER);
    let masked = rules.long_hex.replace_all(&masked, REDACTION_MARKER);
    let masked = rules.base64ish.replace_all(&masked, |caps: &Captures| {
        let candidate = &caps[0];
        if looks_like_token(candidate) {
            REDACTION_MARKER.to_string()
        } else {
            candidate.to_string()
        }
    });

    masked.into_owned()
}
