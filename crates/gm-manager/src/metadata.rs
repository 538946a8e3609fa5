//! Userscript metadata block parser
//!
//! ```text
//! // ==UserScript==
//! // @name     Example
//! // @include  http://*.example.com/*
//! // @run-at   document-start
//! // ==/UserScript==
//! ```
//!
//! Parsing never fails. Problems are collected as [`MetadataWarning`]s, logged,
//! and the script falls back to permissive defaults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::rule::{RuleError, RuleKind, UrlRule};

const HEADER_START: &str = "// ==UserScript==";
const HEADER_END: &str = "// ==/UserScript==";

// =============================================================================
// Run-at Timing
// =============================================================================

/// Document lifecycle point a script is injected at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunAt {
    DocumentStart,
    #[default]
    DocumentEnd,
    DocumentIdle,
}

impl RunAt {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DocumentStart => "document-start",
            Self::DocumentEnd => "document-end",
            Self::DocumentIdle => "document-idle",
        }
    }
}

impl FromStr for RunAt {
    type Err = MetadataWarning;

    /// Parse a `@run-at` value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document-start" => Ok(Self::DocumentStart),
            "document-end" => Ok(Self::DocumentEnd),
            "document-idle" => Ok(Self::DocumentIdle),
            other => Err(MetadataWarning::UnknownRunAt(other.to_string())),
        }
    }
}

impl fmt::Display for RunAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Warnings
// =============================================================================

/// Non-fatal problem found while reading a metadata block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataWarning {
    #[error("no ==UserScript== metadata block found")]
    MissingBlock,
    #[error("metadata block is not terminated by ==/UserScript==")]
    UnterminatedBlock,
    #[error("@{0} has no value")]
    EmptyValue(String),
    #[error("unknown @run-at value {0:?}, using document-end")]
    UnknownRunAt(String),
    #[error("skipping @{kind} {value:?}: {error}")]
    InvalidRule {
        kind: RuleKind,
        value: String,
        error: RuleError,
    },
}

// =============================================================================
// Script Metadata
// =============================================================================

/// Parsed metadata of one userscript.
#[derive(Debug, Clone, Default)]
pub struct ScriptMetadata {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub includes: Vec<UrlRule>,
    pub excludes: Vec<UrlRule>,
    pub matches: Vec<UrlRule>,
    pub run_at: RunAt,
    pub requires: Vec<String>,
    pub grants: Vec<String>,
    /// `@noframes`: do not run inside sub-frames
    pub noframes: bool,
    /// Directive lines of the block as written
    pub header: String,
    /// Set once any `@include` or `@match` line appears, even one that was
    /// rejected
    pub declared_scope: bool,
}

impl ScriptMetadata {
    /// Whether the script declares neither `@include` nor `@match`.
    ///
    /// A script whose scope lines were all rejected runs nowhere.
    pub fn runs_everywhere(&self) -> bool {
        !self.declared_scope && self.includes.is_empty() && self.matches.is_empty()
    }
}

/// Result of [`parse_metadata`].
#[derive(Debug, Clone, Default)]
pub struct ParsedMetadata {
    pub metadata: ScriptMetadata,
    pub warnings: Vec<MetadataWarning>,
}

/// Parse the metadata block of a userscript source.
pub fn parse_metadata(source: &str) -> ParsedMetadata {
    let mut parsed = ParsedMetadata::default();

    let (block, terminated) = match find_block(source) {
        Some(found) => found,
        None => {
            parsed.warnings.push(MetadataWarning::MissingBlock);
            return parsed;
        }
    };
    if !terminated {
        parsed.warnings.push(MetadataWarning::UnterminatedBlock);
    }

    let meta = &mut parsed.metadata;
    let mut header_lines = Vec::new();

    for line in block {
        let (key, value) = match parse_directive(line) {
            Some(directive) => directive,
            None => continue,
        };
        header_lines.push(line.trim());

        if key == "include" || key == "match" {
            meta.declared_scope = true;
        }

        match key {
            "name" => meta.name = non_empty(value),
            "namespace" => meta.namespace = non_empty(value),
            "description" => meta.description = non_empty(value),
            "version" => meta.version = non_empty(value),
            "noframes" => meta.noframes = true,
            "grant" => meta.grants.extend(non_empty(value)),
            "include" | "exclude" | "exclude-match" | "match" | "require" | "run-at"
                if value.is_empty() =>
            {
                parsed.warnings.push(MetadataWarning::EmptyValue(key.to_string()));
            }
            "include" => push_rule(&mut meta.includes, &mut parsed.warnings, RuleKind::Include, value),
            "exclude" | "exclude-match" => {
                push_rule(&mut meta.excludes, &mut parsed.warnings, RuleKind::Exclude, value)
            }
            "match" => push_rule(&mut meta.matches, &mut parsed.warnings, RuleKind::Match, value),
            "require" => meta.requires.push(value.to_string()),
            "run-at" => match value.parse::<RunAt>() {
                Ok(run_at) => meta.run_at = run_at,
                Err(warning) => parsed.warnings.push(warning),
            },
            other => log::debug!("ignoring unknown metadata key @{}", other),
        }
    }

    meta.header = header_lines.join("\n");
    parsed
}

/// Lines between the block markers, and whether the end marker was found.
fn find_block(source: &str) -> Option<(Vec<&str>, bool)> {
    let mut lines = source.lines().skip_while(|line| line.trim() != HEADER_START);
    lines.next()?;

    let mut block = Vec::new();
    for line in lines {
        if line.trim() == HEADER_END {
            return Some((block, true));
        }
        block.push(line);
    }
    Some((block, false))
}

/// Split `// @key value` into its key and trimmed value.
fn parse_directive(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim().strip_prefix("//")?.trim_start();
    let rest = rest.strip_prefix('@')?;
    let key_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let key = &rest[..key_end];
    if key.is_empty() {
        return None;
    }
    Some((key, rest[key_end..].trim()))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn push_rule(rules: &mut Vec<UrlRule>, warnings: &mut Vec<MetadataWarning>, kind: RuleKind, value: &str) {
    match UrlRule::compile(kind, value) {
        Ok(rule) => rules.push(rule),
        Err(error) => warnings.push(MetadataWarning::InvalidRule {
            kind,
            value: value.to_string(),
            error,
        }),
    }
}
