//! URL helpers.

/// Drop the query component of a URL.
///
/// Pre-signed upload URLs carry their authorization in the query, so the
/// stripped form is the stable download location.
pub fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// Join a base URL and a path without doubling or dropping the slash.
pub fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
