//! URL helpers shared by the pattern parser and the matcher
//!
//! Pattern strings are sliced by hand (they may contain `*` where a URL
//! parser would refuse them); candidate URLs arrive as parsed [`Url`] values.

use std::borrow::Cow;
use std::net::IpAddr;

use url::Url;

/// Schemes userscripts may run on unless configured otherwise.
pub const DEFAULT_GREASEABLE_SCHEMES: &[&str] = &["http", "https", "ftp", "file"];

// =============================================================================
// Ports
// =============================================================================

/// Default port for schemes that have one.
#[inline]
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        "ftp" => Some(21),
        _ => None,
    }
}

/// Port of a URL, falling back to the scheme default when omitted.
#[inline]
pub fn effective_port(url: &Url) -> Option<u16> {
    url.port().or_else(|| default_port(url.scheme()))
}

// =============================================================================
// Hosts
// =============================================================================

/// Lower-case a host and drop trailing dots.
pub fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Whether a host is an IPv4 or (bracketed) IPv6 literal.
pub fn is_ip_literal(host: &str) -> bool {
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    bare.parse::<IpAddr>().is_ok()
}

// =============================================================================
// Paths
// =============================================================================

/// The part of a URL a pattern path is matched against: path plus query.
pub fn path_with_query(url: &Url) -> Cow<'_, str> {
    match url.query() {
        Some(query) => Cow::Owned(format!("{}?{}", url.path(), query)),
        None => Cow::Borrowed(url.path()),
    }
}

// =============================================================================
// Pattern Slicing
// =============================================================================

/// Split a pattern at the scheme separator.
/// Returns `None` if there is no `:` or the scheme is not `*` or a valid name.
pub fn split_scheme(pattern: &str) -> Option<(&str, &str)> {
    let colon = pattern.find(':')?;
    let scheme = &pattern[..colon];
    if scheme == "*" || is_scheme_name(scheme) {
        Some((scheme, &pattern[colon + 1..]))
    } else {
        None
    }
}

fn is_scheme_name(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.')
}

/// Split `authority/path` at the first `/`. The path keeps its leading slash.
#[inline]
pub fn split_authority(rest: &str) -> (&str, &str) {
    match rest.find('/') {
        Some(pos) => (&rest[..pos], &rest[pos..]),
        None => (rest, ""),
    }
}

/// Drop a `user:pass@` prefix from an authority.
#[inline]
pub fn strip_userinfo(authority: &str) -> &str {
    match authority.rfind('@') {
        Some(at_pos) => &authority[at_pos + 1..],
        None => authority,
    }
}

/// Split `host[:port]`, keeping IPv6 brackets on the host.
/// An unterminated bracket yields the whole authority as host.
pub fn split_host_port(authority: &str) -> (&str, Option<&str>) {
    if authority.starts_with('[') {
        if let Some(close) = authority.find(']') {
            let host = &authority[..=close];
            let tail = &authority[close + 1..];
            return match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                // Garbage after the bracket is reported as a bad port
                None => (host, Some(tail)),
            };
        }
        return (authority, None);
    }

    match authority.find(':') {
        Some(pos) => (&authority[..pos], Some(&authority[pos + 1..])),
        None => (authority, None),
    }
}
