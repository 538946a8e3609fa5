//! gmkit Core Library
//!
//! This crate provides the URL match pattern engine used to scope userscripts.
//! Patterns are parsed once, are immutable afterwards, and matching is a pure
//! function of the pattern and the candidate URL.
//!
//! # Modules
//!
//! - `urlmatch`: `scheme://host[:port]/path` match patterns
//! - `glob`: `*`-only glob matching for pattern paths and include globs
//! - `url`: scheme tables and slicing helpers
//! - `types`: Shared type definitions

pub mod glob;
pub mod types;
pub mod url;
pub mod urlmatch;

// Re-export commonly used types
pub use glob::Glob;
pub use types::SchemeFlags;
pub use urlmatch::{ParseError, UrlPattern, ALL_URLS};
