//! Origin validation for widget traffic.
//!
//! The widget token is exposed in tenant page source, so the Origin/Referer
//! header acts as the second factor: the declared origin must match one of
//! the tenant's allowed patterns. Loopback hosts are always allowed to keep
//! local development workable; that bypass is deliberate.

/// Extract a lowercased host from an origin or referer value. Scheme
/// defaults to `https` when missing; the port is stripped. Returns `None`
/// for anything unparsable (callers treat that as "not allowed").
pub fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let rest = match raw.split_once("://") {
        Some((scheme, rest)) => {
            if !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
                return None;
            }
            rest
        }
        None => raw,
    };
    // Drop any path, then the port.
    let host_port = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = host_port.split(':').next().unwrap_or("");
    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

pub fn is_loopback(raw: &str) -> bool {
    match normalize_host(raw) {
        Some(host) => host == "localhost" || host == "127.0.0.1",
        None => false,
    }
}

/// A pattern matches when it equals the host exactly, or has the form
/// `*.<suffix>` and the host ends with `<suffix>`. No other wildcard forms.
pub fn is_allowed(origin: &str, allowed: &[String]) -> bool {
    if is_loopback(origin) {
        return true;
    }
    let Some(host) = normalize_host(origin) else {
        return false;
    };
    for pattern in allowed {
        let pattern = pattern.trim().to_ascii_lowercase();
        if pattern == host {
            return true;
        }
        if let Some(suffix) = pattern.strip_prefix("*.") {
            if host.ends_with(suffix) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pats(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_match() {
        assert!(is_allowed("https://shop.example.com", &pats(&["shop.example.com"])));
        assert!(!is_allowed("https://shop.example.com", &pats(&["example.com"])));
    }

    #[test]
    fn wildcard_matches_subdomains() {
        assert!(is_allowed("https://shop.example.com", &pats(&["*.example.com"])));
        assert!(!is_allowed("https://evil.com", &pats(&["*.example.com"])));
    }

    #[test]
    fn loopback_bypasses_pattern_list() {
        assert!(is_allowed("http://localhost:5173", &pats(&[])));
        assert!(is_allowed("http://127.0.0.1:8080", &pats(&[])));
        assert!(!is_allowed("http://localhost.evil.com", &pats(&[])));
    }

    #[test]
    fn scheme_defaults_and_port_stripped() {
        assert_eq!(normalize_host("shop.example.com:8443").as_deref(), Some("shop.example.com"));
        assert_eq!(normalize_host("HTTPS://Shop.Example.COM/path").as_deref(), Some("shop.example.com"));
        assert_eq!(normalize_host("https://shop.example.com:443/a?b#c").as_deref(), Some("shop.example.com"));
    }

    #[test]
    fn parse_failures_fail_closed() {
        assert!(!is_allowed("", &pats(&["*.example.com"])));
        assert!(!is_allowed("   ", &pats(&["*.example.com"])));
        assert!(!is_allowed("https://", &pats(&["*.example.com"])));
        assert_eq!(normalize_host("ht tp://bad host"), None);
    }
}
