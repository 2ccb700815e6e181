// ETag comparison helpers for conditional canvas writes.

/// Compare an If-Match header value against the current etag.
///
/// - `"*"` always matches.
/// - Weak etags (`W/`) are stripped before comparison.
/// - Surrounding quotes are stripped.
pub fn etag_matches(if_match: &str, current_etag: &str) -> bool {
    if if_match.trim() == "*" {
        return true;
    }
    normalize_etag(if_match) == normalize_etag(current_etag)
}

/// Strip optional `W/` prefix and surrounding quotes from an etag value.
pub fn normalize_etag(value: &str) -> &str {
    let trimmed = value.trim();
    let without_weak = trimmed.strip_prefix("W/").unwrap_or(trimmed);
    without_weak.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(without_weak)
}

/// Quote a revision counter as a strong etag: `"<rev>"`.
pub fn etag_for_revision(revision: u64) -> String {
    format!("\"{revision}\"")
}
