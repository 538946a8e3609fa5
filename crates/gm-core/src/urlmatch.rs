//! Match patterns
//!
//! A match pattern scopes a userscript to a set of URLs:
//!
//! ```text
//! <all_urls>
//! scheme://host[:port]/path
//! ```
//!
//! where `scheme` is `*` (http and https) or a literal scheme, `host` is `*`,
//! `*.` followed by a domain, or a literal domain, and `path` is a glob in
//! which `*` matches any run of characters.
//!
//! # Examples
//!
//! ```
//! use gm_core::UrlPattern;
//!
//! let pattern = UrlPattern::parse("http://*.google.com/foo*bar").unwrap();
//! assert!(pattern.matches_str("http://monkey.images.google.com/foooobar"));
//! assert!(!pattern.matches_str("http://yahoo.com/foobar"));
//! ```

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::glob::Glob;
use crate::types::SchemeFlags;
use crate::url::{
    effective_port, is_ip_literal, normalize_host, path_with_query, split_authority,
    split_host_port, split_scheme, strip_userinfo,
};

/// The sentinel pattern matching every URL.
pub const ALL_URLS: &str = "<all_urls>";

/// Error type for pattern parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("May not contain NUL byte")]
    NulByte,
    #[error("No scheme given")]
    NoScheme,
    #[error("Pattern without host")]
    NoHost,
    #[error("Pattern without path")]
    NoPath,
    #[error("Invalid host wildcard")]
    InvalidHostWildcard,
    #[error("TLD wildcards are not implemented yet")]
    TldWildcard,
    #[error("Empty port")]
    EmptyPort,
    #[error("Invalid port: {0}")]
    InvalidPort(String),
    #[error("Ports are unsupported with {0} scheme")]
    PortsUnsupported(String),
}

// =============================================================================
// UrlPattern
// =============================================================================

/// A parsed match pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    pattern: String,
    /// `None` for the `*` wildcard
    scheme: Option<String>,
    /// Empty means any host
    host: String,
    match_subdomains: bool,
    match_all: bool,
    /// `None` means any port
    port: Option<u16>,
    path: Glob,
}

impl UrlPattern {
    /// Parse a match pattern.
    pub fn parse(pattern: &str) -> Result<Self, ParseError> {
        if pattern.contains('\0') {
            return Err(ParseError::NulByte);
        }

        let mut parsed = Self {
            pattern: pattern.to_string(),
            scheme: None,
            host: String::new(),
            match_subdomains: false,
            match_all: false,
            port: None,
            path: Glob::new("/*"),
        };

        if pattern == ALL_URLS {
            parsed.match_all = true;
            parsed.path = Glob::new("*");
            return Ok(parsed);
        }

        let (scheme, rest) = split_scheme(pattern).ok_or(ParseError::NoScheme)?;
        let scheme = scheme.to_ascii_lowercase();
        let flags = if scheme == "*" {
            SchemeFlags::WILDCARD
        } else {
            SchemeFlags::for_scheme(&scheme)
        };

        if !flags.contains(SchemeFlags::AUTHORITY) {
            let path = rest.strip_prefix("//").unwrap_or(rest);
            if path.trim().is_empty() {
                return Err(ParseError::NoPath);
            }
            parsed.scheme = Some(scheme);
            parsed.path = Glob::new(path);
            return Ok(parsed);
        }

        let rest = rest.strip_prefix("//").ok_or(ParseError::NoHost)?;
        let (authority, path) = split_authority(rest);

        if flags.contains(SchemeFlags::AUTHORITY_IGNORED) {
            if path.is_empty() {
                return Err(ParseError::NoPath);
            }
            parsed.scheme = Some(scheme);
            parsed.path = Glob::new(path);
            return Ok(parsed);
        }

        let (host, port) = split_host_port(strip_userinfo(authority));
        parsed.init_host(host)?;
        parsed.port = parse_port(port)?;

        if parsed.port.is_some() && !flags.contains(SchemeFlags::PORTS) {
            return Err(ParseError::PortsUnsupported(scheme));
        }

        if !path.is_empty() {
            parsed.path = Glob::new(path);
        }
        if scheme != "*" {
            parsed.scheme = Some(scheme);
        }

        Ok(parsed)
    }

    fn init_host(&mut self, host: &str) -> Result<(), ParseError> {
        if host.trim().is_empty() {
            return Err(ParseError::NoHost);
        }

        let host = normalize_host(host);
        if host == "*" {
            self.match_subdomains = true;
            return Ok(());
        }

        let host = match host.strip_prefix("*.") {
            Some(rest) => {
                self.match_subdomains = true;
                rest
            }
            None => host.as_str(),
        };

        if host.ends_with(".*") {
            return Err(ParseError::TldWildcard);
        }
        if host.contains('*') {
            return Err(ParseError::InvalidHostWildcard);
        }

        // Match the ASCII form the URL parser produces for IDN hosts.
        self.host = if host.is_ascii() {
            host.to_string()
        } else {
            match url::Host::parse(host) {
                Ok(parsed) => parsed.to_string(),
                Err(e) => {
                    log::debug!("keeping unconvertible host {:?} as written: {}", host, e);
                    host.to_string()
                }
            }
        };

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Literal scheme, or `None` for the `*` wildcard.
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Host without any `*.` prefix. Empty means any host.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn match_subdomains(&self) -> bool {
        self.match_subdomains
    }

    pub fn match_all(&self) -> bool {
        self.match_all
    }

    /// Explicit port, or `None` for any port.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Path glob.
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    // -------------------------------------------------------------------------
    // Matching
    // -------------------------------------------------------------------------

    /// Check whether `url` falls inside this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        if self.match_all {
            return true;
        }

        self.matches_scheme(url.scheme())
            && self.matches_host(url)
            && self.matches_port(url)
            && self.matches_path(&path_with_query(url))
    }

    /// Parse `url` and match it. Unparseable URLs never match.
    pub fn matches_str(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(url) => self.matches(&url),
            Err(_) => false,
        }
    }

    fn matches_scheme(&self, scheme: &str) -> bool {
        match &self.scheme {
            None => scheme == "http" || scheme == "https",
            Some(own) => own.eq_ignore_ascii_case(scheme),
        }
    }

    fn matches_host(&self, url: &Url) -> bool {
        if self.host.is_empty() {
            return true;
        }

        let host = match url.host_str() {
            Some(host) => normalize_host(host),
            None => return false,
        };

        if host == self.host {
            return true;
        }

        // IP addresses never match as a subdomain
        if !self.match_subdomains || is_ip_literal(&host) {
            return false;
        }

        host.len() > self.host.len() + 1
            && host.ends_with(self.host.as_str())
            && host.as_bytes()[host.len() - self.host.len() - 1] == b'.'
    }

    fn matches_port(&self, url: &Url) -> bool {
        match self.port {
            None => true,
            Some(port) => effective_port(url) == Some(port),
        }
    }

    fn matches_path(&self, path: &str) -> bool {
        // "http://google.com/*" also matches the bare "http://google.com"
        if self.path.as_str().strip_suffix("/*") == Some(path) {
            return true;
        }
        self.path.matches(path)
    }
}

fn parse_port(port: Option<&str>) -> Result<Option<u16>, ParseError> {
    let port = match port {
        None | Some("*") => return Ok(None),
        Some("") => return Err(ParseError::EmptyPort),
        Some(port) => port,
    };

    if port.len() > 5 || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidPort(port.to_string()));
    }

    port.parse::<u16>()
        .map(Some)
        .map_err(|_| ParseError::InvalidPort(port.to_string()))
}

impl FromStr for UrlPattern {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
