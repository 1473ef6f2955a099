const SLUG_LIMIT: usize = 40;

/// Lowercase ASCII slug with single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= SLUG_LIMIT {
            break;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Name for a fresh automation branch.
///
/// Every attempt gets its own branch: the creation timestamp is always part
/// of the name, so nothing from an earlier attempt is reused.
pub fn branch_name(prefix: &str, issue: Option<u64>, title: &str, unix_ms: u64) -> String {
    let prefix = prefix.trim_matches('/');
    match issue {
        Some(n) => format!("{prefix}/issue-{n}-{unix_ms}"),
        None => {
            let slug = slugify(title);
            if slug.is_empty() {
                format!("{prefix}/change-{unix_ms}")
            } else {
                format!("{prefix}/{slug}-{unix_ms}")
            }
        }
    }
}
