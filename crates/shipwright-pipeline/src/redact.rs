use regex::Regex;
use std::sync::OnceLock;

fn secret_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Credentials embedded in URLs
            (r"(https?://)[^/\s:@]+:[^/\s@]+@", "${1}[MASKED]@"),
            (r"(https?://)[^/\s:@]{20,}@", "${1}[MASKED]@"),
            // API keys
            (r"sk-[a-zA-Z0-9_\-]{20,}", "[MASKED]"),
            (r"pk-[a-zA-Z0-9]{20,}", "[MASKED]"),
            // GitHub tokens
            (r"gh[pousr]_[A-Za-z0-9]{20,}", "[MASKED]"),
            (r"github_pat_[A-Za-z0-9_]{20,}", "[MASKED]"),
            // Bearer tokens
            (r"Bearer\s+[a-zA-Z0-9._\-]+", "Bearer [MASKED]"),
            // key=value patterns
            (
                r"(?i)(password|secret|token|key|api_key|apikey)=[^\s&]+",
                "$1=[MASKED]",
            ),
        ]
        .into_iter()
        .filter_map(|(p, r)| Regex::new(p).ok().map(|re| (re, r)))
        .collect()
    })
}

/// Mask secrets in output strings before logging or returning them.
pub fn mask_secrets(text: &str) -> String {
    let mut result = text.to_string();
    for (re, replacement) in secret_patterns() {
        result = re.replace_all(&result, *replacement).into_owned();
    }
    result
}

/// Truncate to at most `max_chars` characters, appending "..." when cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}
