//! Core type definitions for gmkit
//!
//! Scheme classification used by both the pattern parser and the matcher.

// =============================================================================
// Scheme Flags
// =============================================================================

bitflags::bitflags! {
    /// Properties of a URL scheme relevant to match patterns.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SchemeFlags: u8 {
        /// Pattern must carry a `//host` authority
        const AUTHORITY = 1 << 0;
        /// Authority is accepted but never inspected (file://)
        const AUTHORITY_IGNORED = 1 << 1;
        /// Explicit ports are meaningful
        const PORTS = 1 << 2;

        /// Flags used for the `*` scheme wildcard
        const WILDCARD = Self::AUTHORITY.bits() | Self::PORTS.bits();
    }
}

impl SchemeFlags {
    /// Classify a lower-cased scheme name.
    pub fn for_scheme(scheme: &str) -> Self {
        match scheme {
            "http" | "https" | "ftp" | "ws" | "wss" => Self::AUTHORITY | Self::PORTS,
            "file" => Self::AUTHORITY | Self::AUTHORITY_IGNORED,
            "about" | "data" | "javascript" | "blob" | "mailto" | "view-source" => Self::empty(),
            // chrome://, qute:// and other internal schemes
            _ => Self::AUTHORITY,
        }
    }

    /// Whether patterns for this scheme have a host component at all.
    #[inline]
    pub fn has_host(self) -> bool {
        self.contains(Self::AUTHORITY) && !self.contains(Self::AUTHORITY_IGNORED)
    }
}
