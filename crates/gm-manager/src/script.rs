//! Userscripts and their injectable code

use serde_json::json;
use url::Url;

use crate::metadata::{parse_metadata, RunAt, ScriptMetadata};

/// Readiness of a script's `@require` dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    /// Requirements are still downloading
    Pending { outstanding: usize },
    /// All requirements fetched (or there were none)
    Ready,
}

/// A parsed userscript.
#[derive(Debug, Clone)]
pub struct Script {
    filename: String,
    metadata: ScriptMetadata,
    source: String,
    /// Requirement sources in declaration order, once resolved
    required: Vec<String>,
    state: ScriptState,
}

impl Script {
    /// Parse a script file. Metadata problems are logged, never fatal.
    pub fn parse(filename: &str, source: &str) -> Self {
        let parsed = parse_metadata(source);
        for warning in &parsed.warnings {
            log::warn!("{}: {}", filename, warning);
        }
        Self::new(filename, parsed.metadata, source)
    }

    /// Build a script from already-parsed metadata.
    pub fn new(filename: &str, metadata: ScriptMetadata, source: &str) -> Self {
        let state = if metadata.requires.is_empty() {
            ScriptState::Ready
        } else {
            ScriptState::Pending {
                outstanding: metadata.requires.len(),
            }
        };

        Self {
            filename: filename.to_string(),
            metadata,
            source: source.to_string(),
            required: Vec::new(),
            state,
        }
    }

    /// Copy of this script with its requirements resolved.
    pub fn with_requirements(&self, required: Vec<String>) -> Self {
        Self {
            required,
            state: ScriptState::Ready,
            ..self.clone()
        }
    }

    /// Copy of this script with an updated outstanding count.
    pub(crate) fn with_outstanding(&self, outstanding: usize) -> Self {
        Self {
            state: ScriptState::Pending { outstanding },
            ..self.clone()
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// File the script was loaded from; also its registry identity.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// `@name`, or the filename when the script has none.
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or(&self.filename)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }

    pub fn metadata(&self) -> &ScriptMetadata {
        &self.metadata
    }

    pub fn run_at(&self) -> RunAt {
        self.metadata.run_at
    }

    pub fn requires(&self) -> &[String] {
        &self.metadata.requires
    }

    /// Raw script source, metadata block included.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> ScriptState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ScriptState::Ready
    }

    pub fn runs_on_sub_frames(&self) -> bool {
        !self.metadata.noframes
    }

    // -------------------------------------------------------------------------
    // Matching
    // -------------------------------------------------------------------------

    /// Whether the script's own rules select `url`.
    ///
    /// Excludes win over includes; a script declaring neither `@include` nor
    /// `@match` applies everywhere. Scheme restrictions are the registry's job.
    pub fn applies_to(&self, url: &Url) -> bool {
        let meta = &self.metadata;
        if meta.excludes.iter().any(|rule| rule.test(url)) {
            return false;
        }
        if meta.runs_everywhere() {
            return true;
        }
        meta.includes.iter().chain(&meta.matches).any(|rule| rule.test(url))
    }

    // -------------------------------------------------------------------------
    // Code
    // -------------------------------------------------------------------------

    /// Injectable code: requirements then the script, inside the isolation wrapper.
    pub fn code(&self) -> String {
        let meta = &self.metadata;
        let info = json!({
            "script": {
                "name": self.name(),
                "namespace": meta.namespace,
                "description": meta.description,
                "version": meta.version,
                "includes": meta.includes.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "matches": meta.matches.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "excludes": meta.excludes.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "run-at": meta.run_at,
                "requires": meta.requires,
                "grants": meta.grants,
            },
            "scriptMetaStr": meta.header,
            "scriptHandler": "gmkit",
            "version": env!("CARGO_PKG_VERSION"),
        });
        let storage_key = json!(format!(
            "_gmkit_{}/{}:",
            meta.namespace.as_deref().unwrap_or(""),
            self.name()
        ));

        let mut code = String::with_capacity(
            WRAPPER_PRELUDE.len() + WRAPPER_EPILOGUE.len() + self.source.len() + 512,
        );
        code.push_str("(function() {\n    const GM_info = ");
        code.push_str(&info.to_string());
        code.push_str(";\n    const _gmStoragePrefix = ");
        code.push_str(&storage_key.to_string());
        code.push_str(";\n");
        code.push_str(WRAPPER_PRELUDE);
        for required in &self.required {
            code.push_str(required);
            code.push('\n');
        }
        code.push_str(&self.source);
        code.push_str(WRAPPER_EPILOGUE);
        code
    }
}

// Writes through the window proxy land in a shadow object, so the script's
// globals and the page's globals never overwrite each other.
const WRAPPER_PRELUDE: &str = r#"    const unsafeWindow = window;

    function GM_log(message) {
        console.log(message);
    }

    function GM_addStyle(css) {
        const style = document.createElement("style");
        style.textContent = css;
        (document.head || document.documentElement).appendChild(style);
        return style;
    }

    function GM_setValue(key, value) {
        localStorage.setItem(_gmStoragePrefix + key, JSON.stringify(value));
    }

    function GM_getValue(key, fallback) {
        const raw = localStorage.getItem(_gmStoragePrefix + key);
        return raw === null ? fallback : JSON.parse(raw);
    }

    function GM_deleteValue(key) {
        localStorage.removeItem(_gmStoragePrefix + key);
    }

    function GM_listValues() {
        const keys = [];
        for (let i = 0; i < localStorage.length; i++) {
            const key = localStorage.key(i);
            if (key.startsWith(_gmStoragePrefix)) {
                keys.push(key.slice(_gmStoragePrefix.length));
            }
        }
        return keys;
    }

    const _gmWindowShadow = {};
    const _gmWindowProxy = new Proxy(unsafeWindow, {
        get: function(target, prop) {
            if (prop in _gmWindowShadow) {
                return _gmWindowShadow[prop];
            }
            const value = target[prop];
            if (typeof value === "function" && typeof value.prototype === "undefined") {
                return value.bind(target);
            }
            return value;
        },
        set: function(target, prop, value) {
            _gmWindowShadow[prop] = value;
            return true;
        },
        has: function(target, prop) {
            return prop in _gmWindowShadow || prop in target;
        },
    });

    with (_gmWindowProxy) {
        const window = _gmWindowProxy;
        // ==== script ====
"#;

const WRAPPER_EPILOGUE: &str = r#"
        // ==== end of script ====
    }
})();
"#;
