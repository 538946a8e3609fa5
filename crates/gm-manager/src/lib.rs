//! Greasemonkey-style userscript manager
//!
//! This crate parses userscript metadata blocks, resolves `@require`
//! dependencies through a pluggable [`Downloader`], and answers which scripts
//! run on a given URL. URL pattern matching itself lives in `gm-core`.

pub mod config;
pub mod download;
pub mod manager;
pub mod metadata;
pub mod resolver;
pub mod rule;
pub mod script;
pub mod storage;

pub use config::{ConfigError, ManagerConfig};
pub use download::{CompletionSink, DownloadError, DownloadEvent, Downloader};
pub use manager::{ManagerEvent, Registry, ScriptManager, ScriptSets};
pub use metadata::{parse_metadata, MetadataWarning, ParsedMetadata, RunAt, ScriptMetadata};
pub use resolver::{Progress, Registration, RequirementResolver, ScriptKey};
pub use rule::{RuleError, RuleKind, UrlRule};
pub use script::{Script, ScriptState};
pub use storage::{DirStorage, MemoryStorage, ScriptStorage, StorageError};
