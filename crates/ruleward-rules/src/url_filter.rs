//! Helpers for host-anchored url filters.

/// Build the url filter that matches a host and all of its subdomains.
pub fn host_url_filter(host: &str) -> String {
    format!("||{}^", host.trim().to_ascii_lowercase())
}

/// Recover the host a url filter is anchored to.
///
/// Understands the domain-anchor form (`||example.com^`) and scheme forms
/// (`*://example.com/*`, `https://*.example.com/path`). Returns `None` for
/// filters that do not name a host, such as bare keywords.
pub fn host_from_url_filter(filter: &str) -> Option<String> {
    let filter = filter.trim();
    let rest = if let Some(rest) = filter.strip_prefix("||") {
        rest
    } else if let Some(idx) = filter.find("://") {
        &filter[idx + 3..]
    } else {
        return None;
    };

    let rest = rest.strip_prefix("*.").unwrap_or(rest);
    let end = rest.find(['^', '/', '*', ':', '|', '?']).unwrap_or(rest.len());
    let host = rest[..end].trim_end_matches('.').to_ascii_lowercase();

    if host.is_empty() || (!host.contains('.') && host != "localhost") {
        return None;
    }
    Some(host)
}
