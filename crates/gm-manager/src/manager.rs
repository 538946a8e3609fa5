//! Script registry and manager
//!
//! The manager owns a generation-counted [`Registry`] behind an `Arc`. A
//! reload builds the next generation completely and then swaps it in, so a
//! [`Registry`] snapshot taken before the reload keeps seeing the old scripts
//! and a query never observes a half-loaded set. Requirement completions
//! replace single scripts copy-on-write in the same way.

use std::sync::Arc;

use url::Url;

use crate::config::ManagerConfig;
use crate::download::{CompletionChannel, DownloadEvent, Downloader};
use crate::metadata::RunAt;
use crate::resolver::{Progress, Registration, RequirementResolver, ScriptKey};
use crate::script::Script;
use crate::storage::{ScriptStorage, StorageError};

// =============================================================================
// Query Results
// =============================================================================

/// Scripts applying to one URL, bucketed by injection point.
#[derive(Debug, Clone, Default)]
pub struct ScriptSets {
    pub start: Vec<Arc<Script>>,
    pub end: Vec<Arc<Script>>,
    pub idle: Vec<Arc<Script>>,
}

impl ScriptSets {
    pub fn bucket(&self, run_at: RunAt) -> &[Arc<Script>] {
        match run_at {
            RunAt::DocumentStart => &self.start,
            RunAt::DocumentEnd => &self.end,
            RunAt::DocumentIdle => &self.idle,
        }
    }

    fn bucket_mut(&mut self, run_at: RunAt) -> &mut Vec<Arc<Script>> {
        match run_at {
            RunAt::DocumentStart => &mut self.start,
            RunAt::DocumentEnd => &mut self.end,
            RunAt::DocumentIdle => &mut self.idle,
        }
    }

    pub fn len(&self) -> usize {
        self.start.len() + self.end.len() + self.idle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All scripts, start bucket first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Script>> {
        self.start.iter().chain(&self.end).chain(&self.idle)
    }

    /// The subset allowed to run inside sub-frames (no `@noframes`).
    pub fn for_sub_frame(&self) -> Self {
        let keep = |scripts: &[Arc<Script>]| -> Vec<Arc<Script>> {
            scripts
                .iter()
                .filter(|script| script.runs_on_sub_frames())
                .cloned()
                .collect()
        };
        Self {
            start: keep(&self.start),
            end: keep(&self.end),
            idle: keep(&self.idle),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// One generation of loaded scripts, in registration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    generation: u64,
    scripts: Vec<Arc<Script>>,
}

impl Registry {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn scripts(&self) -> &[Arc<Script>] {
        &self.scripts
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Look a script up by filename.
    pub fn get(&self, filename: &str) -> Option<&Arc<Script>> {
        self.scripts.iter().find(|script| script.filename() == filename)
    }

    /// Scripts applying to `url`. Scripts still waiting on requirements are
    /// included; their metadata is complete as soon as they are parsed.
    pub fn scripts_for(&self, url: &Url, config: &ManagerConfig) -> ScriptSets {
        let mut sets = ScriptSets::default();
        if !config.is_greaseable(url.scheme()) {
            log::debug!("not running scripts on {} (scheme {})", url, url.scheme());
            return sets;
        }

        for script in &self.scripts {
            if script.applies_to(url) {
                sets.bucket_mut(script.run_at()).push(Arc::clone(script));
            }
        }
        sets
    }
}

// =============================================================================
// Events
// =============================================================================

/// Notification sent to manager listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// A new generation replaced the registry
    Reloaded { generation: u64, scripts: usize },
    /// A script was saved and registered in the current generation
    Installed { generation: u64, filename: String },
    /// A script's requirements finished and its code is complete
    ScriptReady { generation: u64, filename: String },
}

type Listener = Box<dyn FnMut(&ManagerEvent) + Send>;

// =============================================================================
// Manager
// =============================================================================

/// Loads userscripts, resolves their requirements and answers URL queries.
pub struct ScriptManager<S, D> {
    config: ManagerConfig,
    storage: S,
    downloader: D,
    registry: Arc<Registry>,
    resolver: RequirementResolver,
    channel: CompletionChannel,
    listeners: Vec<Listener>,
}

impl<S: ScriptStorage, D: Downloader> ScriptManager<S, D> {
    /// Create a manager with an empty registry. Call
    /// [`ScriptManager::load_scripts`] to populate it.
    pub fn new(config: ManagerConfig, storage: S, downloader: D) -> Self {
        Self {
            config,
            storage,
            downloader,
            registry: Arc::new(Registry::default()),
            resolver: RequirementResolver::new(),
            channel: CompletionChannel::new(),
            listeners: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------------

    /// Reload every script from storage. Cached requirements are reused.
    ///
    /// Returns the number of scripts registered. If storage cannot be listed
    /// the previous registry stays in place.
    pub fn load_scripts(&mut self) -> Result<usize, StorageError> {
        self.load(false)
    }

    /// Reload every script and download all requirements again.
    pub fn load_scripts_forced(&mut self) -> Result<usize, StorageError> {
        self.load(true)
    }

    fn load(&mut self, force: bool) -> Result<usize, StorageError> {
        let names = self.storage.list_scripts()?;
        let generation = self.registry.generation + 1;
        self.resolver.retain_generation(generation);

        let mut scripts = Vec::with_capacity(names.len());
        let mut fetch = Vec::new();
        for name in names {
            let source = match self.storage.read_script(&name) {
                Ok(source) => source,
                Err(e) => {
                    log::warn!("skipping script {}: {}", name, e);
                    continue;
                }
            };

            let key = ScriptKey {
                generation,
                index: scripts.len(),
            };
            let script = self.register_requirements(key, Script::parse(&name, &source), force, &mut fetch);
            log::debug!("loaded script {}", script.name());
            scripts.push(Arc::new(script));
        }

        let count = scripts.len();
        self.registry = Arc::new(Registry { generation, scripts });
        self.start_downloads(fetch);

        log::debug!("registry generation {} holds {} scripts", generation, count);
        self.emit(&ManagerEvent::Reloaded {
            generation,
            scripts: count,
        });
        Ok(count)
    }

    /// Save a new script and register it in the current generation,
    /// replacing a loaded script with the same filename.
    pub fn install_script(&mut self, filename: &str, source: &str) -> Result<Arc<Script>, StorageError> {
        self.storage.save_script(filename, source)?;

        let generation = self.registry.generation;
        let index = self
            .registry
            .scripts
            .iter()
            .position(|script| script.filename() == filename)
            .unwrap_or(self.registry.scripts.len());

        let mut fetch = Vec::new();
        let key = ScriptKey { generation, index };
        let script = Arc::new(self.register_requirements(key, Script::parse(filename, source), false, &mut fetch));

        let registry = Arc::make_mut(&mut self.registry);
        if index < registry.scripts.len() {
            registry.scripts[index] = Arc::clone(&script);
        } else {
            registry.scripts.push(Arc::clone(&script));
        }
        self.start_downloads(fetch);

        self.emit(&ManagerEvent::Installed {
            generation,
            filename: filename.to_string(),
        });
        Ok(script)
    }

    fn register_requirements(&mut self, key: ScriptKey, script: Script, force: bool, fetch: &mut Vec<String>) -> Script {
        if script.requires().is_empty() {
            self.resolver.forget(key);
            return script;
        }

        let storage = &self.storage;
        let registration = self.resolver.register(key, script.requires(), |url| {
            if force {
                None
            } else {
                storage.read_required(url)
            }
        });

        match registration {
            Registration::Ready(sources) => {
                log::debug!("all requirements of {} are cached", script.name());
                script.with_requirements(sources)
            }
            Registration::Pending { outstanding, fetch: urls } => {
                log::debug!(
                    "deferring script {} until {} requirement(s) are fetched",
                    script.name(),
                    outstanding
                );
                fetch.extend(urls);
                script.with_outstanding(outstanding)
            }
        }
    }

    fn start_downloads(&mut self, urls: Vec<String>) {
        for url in urls {
            log::debug!("downloading required script {}", url);
            let sink = self.channel.sink(&url);
            self.downloader.fetch(&url, sink);
        }
    }

    // -------------------------------------------------------------------------
    // Completions
    // -------------------------------------------------------------------------

    /// Apply every download completion received so far. Returns how many
    /// completions were applied.
    pub fn process_completions(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.channel.rx.try_recv() {
            self.apply_completion(event);
            handled += 1;
        }
        handled
    }

    /// Apply completions until no requirement download is in flight.
    pub async fn wait_for_requirements(&mut self) {
        while self.resolver.has_in_flight() {
            match self.channel.rx.recv().await {
                Some(event) => self.apply_completion(event),
                None => break,
            }
        }
    }

    fn apply_completion(&mut self, event: DownloadEvent) {
        let DownloadEvent { url, result } = event;
        let body = match result {
            Ok(bytes) => {
                let body = String::from_utf8_lossy(&bytes).into_owned();
                if let Err(e) = self.storage.write_required(&url, &body) {
                    log::warn!("failed to cache required script {}: {}", url, e);
                }
                body
            }
            Err(e) => {
                log::error!("failed to download required script {}: {}", url, e);
                String::new()
            }
        };

        for progress in self.resolver.complete(&url, &body) {
            match progress {
                Progress::Waiting { key, outstanding } => {
                    self.replace_script(key, |script| script.with_outstanding(outstanding));
                }
                Progress::Ready { key, sources } => {
                    if let Some(filename) = self.replace_script(key, |script| script.with_requirements(sources)) {
                        log::debug!("requirements of {} fulfilled", filename);
                        self.emit(&ManagerEvent::ScriptReady {
                            generation: key.generation,
                            filename,
                        });
                    }
                }
            }
        }
    }

    fn replace_script<F>(&mut self, key: ScriptKey, update: F) -> Option<String>
    where
        F: FnOnce(&Script) -> Script,
    {
        if key.generation != self.registry.generation {
            return None;
        }
        let registry = Arc::make_mut(&mut self.registry);
        let slot = registry.scripts.get_mut(key.index)?;
        let updated = update(slot);
        *slot = Arc::new(updated);
        Some(slot.filename().to_string())
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Scripts applying to `url`, bucketed by run-at timing.
    pub fn scripts_for(&self, url: &Url) -> ScriptSets {
        self.registry.scripts_for(url, &self.config)
    }

    /// Every registered script, in registration order.
    pub fn all_scripts(&self) -> Vec<Arc<Script>> {
        self.registry.scripts.clone()
    }

    pub fn get(&self, filename: &str) -> Option<Arc<Script>> {
        self.registry.get(filename).cloned()
    }

    /// The current registry generation, unaffected by later reloads.
    pub fn snapshot(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn generation(&self) -> u64 {
        self.registry.generation
    }

    /// Requirement URLs currently downloading, sorted.
    pub fn in_flight_downloads(&self) -> Vec<&str> {
        self.resolver.in_flight()
    }

    // -------------------------------------------------------------------------
    // Listeners
    // -------------------------------------------------------------------------

    /// Register a listener. Listeners run in registration order.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&ManagerEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: &ManagerEvent) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }

    // -------------------------------------------------------------------------
    // Collaborators
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn downloader(&self) -> &D {
        &self.downloader
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::download::{CompletionSink, DownloadError};
    use crate::script::ScriptState;
    use crate::storage::MemoryStorage;

    const TEST_GM_SCRIPT: &str = r#"
// ==UserScript==
// @name qutebrowser test userscript
// @namespace invalid.org
// @include http://localhost:*/data/title.html
// @match http://*.trolol.com/*
// @exclude https://badhost.xxx/*
// @run-at document-start
// ==/UserScript==
console.log("Script is running.");
"#;

    const TEST_REQUIRE_SCRIPT: &str = r#"
// ==UserScript==
// @name qutebrowser test userscript
// @namespace invalid.org
// @include http://localhost:*/data/title.html
// @match http://trolol*
// @exclude https://badhost.xxx/*
// @run-at document-start
// @require http://localhost/test.js
// ==/UserScript==
console.log("Script is running.");
"#;

    /// Records fetches; tests finish them by hand.
    #[derive(Default)]
    struct StubDownloader {
        requests: Mutex<Vec<CompletionSink>>,
    }

    impl StubDownloader {
        fn take(&self) -> Vec<CompletionSink> {
            std::mem::take(&mut *self.requests.lock().unwrap())
        }
    }

    impl Downloader for StubDownloader {
        fn fetch(&self, _url: &str, sink: CompletionSink) {
            self.requests.lock().unwrap().push(sink);
        }
    }

    /// Completes every fetch immediately from a fixed table.
    struct TableDownloader(HashMap<String, String>);

    impl Downloader for TableDownloader {
        fn fetch(&self, url: &str, sink: CompletionSink) {
            let result = match self.0.get(url) {
                Some(body) => Ok(body.clone().into_bytes()),
                None => Err(DownloadError::Status(404)),
            };
            sink.finish(result);
        }
    }

    fn manager_with(scripts: &[(&str, &str)]) -> ScriptManager<MemoryStorage, StubDownloader> {
        let storage = scripts
            .iter()
            .fold(MemoryStorage::new(), |storage, (name, source)| storage.with_script(name, source));
        let mut manager = ScriptManager::new(ManagerConfig::default(), storage, StubDownloader::default());
        manager.load_scripts().unwrap();
        manager
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn count_for(manager: &ScriptManager<MemoryStorage, StubDownloader>, u: &str) -> usize {
        manager.scripts_for(&url(u)).len()
    }

    #[test]
    fn test_all() {
        let manager = manager_with(&[("test.user.js", TEST_GM_SCRIPT)]);
        assert_eq!(manager.all_scripts()[0].name(), "qutebrowser test userscript");
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn test_get_scripts_by_url() {
        let manager = manager_with(&[("test.user.js", TEST_GM_SCRIPT)]);
        // included
        assert_eq!(count_for(&manager, "http://trolol.com/"), 1);
        assert_eq!(count_for(&manager, "http://localhost:5000/data/title.html"), 1);
        // neither included nor excluded
        assert_eq!(count_for(&manager, "http://aaaaaaaaaa.com/"), 0);
        // excluded
        assert_eq!(count_for(&manager, "https://badhost.xxx/"), 0);
    }

    #[test]
    fn test_regex_includes_scripts_for() {
        let source = r"
            // ==UserScript==
            // @include     /^https?://((gist|guides|help|raw|status|developer)\.)?github\.com/((?!generated_pages\/preview).)*$/
            // @exclude     /https?://github\.com/foo/
            // @run-at document-start
            // ==/UserScript==
        ";
        let manager = manager_with(&[("test.user.js", source)]);
        // included
        assert_eq!(count_for(&manager, "https://github.com/qutebrowser/qutebrowser/"), 1);
        // neither included nor excluded
        assert_eq!(count_for(&manager, "http://aaaaaaaaaa.com/"), 0);
        // excluded takes priority
        assert_eq!(count_for(&manager, "http://github.com/foo"), 0);
    }

    #[test]
    fn test_no_metadata() {
        let manager = manager_with(&[("nothing.user.js", "var nothing = true;\n")]);
        let scripts = manager.scripts_for(&url("http://notamatch.invalid/"));
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts.end.len(), 1);
    }

    #[test]
    fn test_bad_scheme() {
        let manager = manager_with(&[("nothing.user.js", "var nothing = true;\n")]);
        assert_eq!(count_for(&manager, "qute://settings"), 0);
    }

    #[test]
    fn test_script_with_only_rejected_scope_runs_nowhere() {
        let bad_match = "// ==UserScript==\n// @match http://foo.*/bar\n// ==/UserScript==\n";
        let bad_include = "// ==UserScript==\n// @include /(unclosed/\n// ==/UserScript==\n";
        let manager = manager_with(&[("a.user.js", bad_match), ("b.user.js", bad_include)]);
        assert_eq!(manager.all_scripts().len(), 2);
        assert_eq!(count_for(&manager, "https://bank.example/login"), 0);
    }

    #[test]
    fn test_disallowed_scheme_beats_matching_pattern() {
        let source = "// ==UserScript==\n// @match <all_urls>\n// ==/UserScript==\n";
        let manager = manager_with(&[("all.user.js", source)]);
        assert_eq!(count_for(&manager, "https://example.com/"), 1);
        assert_eq!(count_for(&manager, "chrome://settings/"), 0);
    }

    #[test]
    fn test_buckets_keep_registration_order() {
        let start = "// ==UserScript==\n// @run-at document-start\n// ==/UserScript==\n";
        let idle = "// ==UserScript==\n// @run-at document-idle\n// ==/UserScript==\n";
        let manager = manager_with(&[
            ("a.user.js", start),
            ("b.user.js", "// plain\n"),
            ("c.user.js", start),
            ("d.user.js", idle),
        ]);

        let sets = manager.scripts_for(&url("https://example.com/"));
        let names = |bucket: &[Arc<Script>]| bucket.iter().map(|s| s.filename().to_string()).collect::<Vec<_>>();
        assert_eq!(names(sets.bucket(RunAt::DocumentStart)), vec!["a.user.js", "c.user.js"]);
        assert_eq!(names(sets.bucket(RunAt::DocumentEnd)), vec!["b.user.js"]);
        assert_eq!(names(sets.bucket(RunAt::DocumentIdle)), vec!["d.user.js"]);
    }

    #[test]
    fn test_load_emits_event() {
        let mut manager = manager_with(&[]);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        manager.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        manager.load_scripts().unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec![ManagerEvent::Reloaded {
                generation: 2,
                scripts: 0
            }]
        );
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let mut manager = manager_with(&[]);
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            let order = Arc::clone(&order);
            manager.subscribe(move |_| order.lock().unwrap().push(id));
        }
        manager.load_scripts().unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_required_scripts_are_included() {
        let mut manager = manager_with(&[("requiring.user.js", TEST_REQUIRE_SCRIPT)]);
        assert_eq!(manager.in_flight_downloads(), vec!["http://localhost/test.js"]);

        let pending = manager.all_scripts();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].state(), ScriptState::Pending { outstanding: 1 });
        assert!(!pending[0].code().contains("REQUIRED SCRIPT"));

        for sink in manager.downloader().take() {
            sink.finish(Ok(b"REQUIRED SCRIPT".to_vec()));
        }
        assert_eq!(manager.process_completions(), 1);
        assert!(manager.in_flight_downloads().is_empty());

        let scripts = manager.all_scripts();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].is_ready());
        let code = scripts[0].code();
        let required = code.find("REQUIRED SCRIPT").unwrap();
        let body = code.find("Script is running.").unwrap();
        assert!(required < body);
        // The base script is still parsed correctly
        assert!(!scripts[0].metadata().excludes.is_empty());

        // The old Arc handed out earlier is untouched
        assert!(!pending[0].is_ready());
    }

    #[test]
    fn test_pending_scripts_are_matchable() {
        let manager = manager_with(&[("requiring.user.js", TEST_REQUIRE_SCRIPT)]);
        let sets = manager.scripts_for(&url("http://localhost:8080/data/title.html"));
        assert_eq!(sets.start.len(), 1);
        assert!(!sets.start[0].is_ready());
    }

    #[test]
    fn test_failed_download_still_resolves() {
        let mut manager = manager_with(&[("requiring.user.js", TEST_REQUIRE_SCRIPT)]);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        manager.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        for sink in manager.downloader().take() {
            sink.finish(Err(DownloadError::Transport("connection refused".into())));
        }
        manager.process_completions();

        let script = manager.get("requiring.user.js").unwrap();
        assert!(script.is_ready());
        assert!(script.code().contains("Script is running."));
        // Failures are not cached
        assert!(manager.storage().read_required("http://localhost/test.js").is_none());
        assert_eq!(
            *events.lock().unwrap(),
            vec![ManagerEvent::ScriptReady {
                generation: 1,
                filename: "requiring.user.js".to_string()
            }]
        );
    }

    #[test]
    fn test_shared_requirement_downloads_once() {
        let other = TEST_REQUIRE_SCRIPT.replace("@name qutebrowser test userscript", "@name other");
        let mut manager = manager_with(&[("a.user.js", TEST_REQUIRE_SCRIPT), ("b.user.js", other.as_str())]);

        let sinks = manager.downloader().take();
        assert_eq!(sinks.len(), 1);
        for sink in sinks {
            sink.finish(Ok(b"SHARED".to_vec()));
        }
        manager.process_completions();

        for script in manager.all_scripts() {
            assert!(script.is_ready(), "{}", script.name());
            assert!(script.code().contains("SHARED"));
        }
    }

    #[test]
    fn test_cached_requirement_skips_download() {
        let storage = MemoryStorage::new()
            .with_script("requiring.user.js", TEST_REQUIRE_SCRIPT)
            .with_required("http://localhost/test.js", "CACHED SCRIPT");
        let mut manager = ScriptManager::new(ManagerConfig::default(), storage, StubDownloader::default());
        manager.load_scripts().unwrap();

        assert!(manager.downloader().take().is_empty());
        let script = manager.get("requiring.user.js").unwrap();
        assert!(script.is_ready());
        assert!(script.code().contains("CACHED SCRIPT"));
    }

    #[test]
    fn test_completed_download_is_cached_and_forced_reload_refetches() {
        let mut manager = manager_with(&[("requiring.user.js", TEST_REQUIRE_SCRIPT)]);
        for sink in manager.downloader().take() {
            sink.finish(Ok(b"REQUIRED SCRIPT".to_vec()));
        }
        manager.process_completions();
        assert_eq!(
            manager.storage().read_required("http://localhost/test.js").as_deref(),
            Some("REQUIRED SCRIPT")
        );

        manager.load_scripts().unwrap();
        assert!(manager.downloader().take().is_empty());
        assert!(manager.get("requiring.user.js").unwrap().is_ready());

        manager.load_scripts_forced().unwrap();
        assert_eq!(manager.downloader().take().len(), 1);
        assert!(!manager.get("requiring.user.js").unwrap().is_ready());
    }

    #[test]
    fn test_reload_is_atomic_for_snapshots() {
        let mut manager = manager_with(&[("a.user.js", "// a\n")]);
        let before = manager.snapshot();

        manager.storage_mut().save_script("b.user.js", "// b\n").unwrap();
        manager.load_scripts().unwrap();
        let after = manager.snapshot();

        assert_eq!(before.generation(), 1);
        assert_eq!(before.len(), 1);
        assert_eq!(after.generation(), 2);
        assert_eq!(after.len(), 2);

        let config = ManagerConfig::default();
        let target = url("https://example.com/");
        assert_eq!(before.scripts_for(&target, &config).len(), 1);
        assert_eq!(after.scripts_for(&target, &config).len(), 2);
    }

    #[test]
    fn test_download_spanning_reload_completes_new_generation() {
        let mut manager = manager_with(&[("requiring.user.js", TEST_REQUIRE_SCRIPT)]);
        let old = manager.snapshot();
        let sinks = manager.downloader().take();
        assert_eq!(sinks.len(), 1);

        // Still in flight: the reload subscribes instead of fetching again
        manager.load_scripts().unwrap();
        assert!(manager.downloader().take().is_empty());

        for sink in sinks {
            sink.finish(Ok(b"REQUIRED SCRIPT".to_vec()));
        }
        manager.process_completions();

        assert!(manager.get("requiring.user.js").unwrap().is_ready());
        assert!(!old.scripts()[0].is_ready());
    }

    #[test]
    fn test_install_script() {
        let mut manager = manager_with(&[("test.user.js", TEST_GM_SCRIPT)]);
        let installed = manager
            .install_script("new.user.js", "// ==UserScript==\n// @name new\n// ==/UserScript==\n")
            .unwrap();
        assert_eq!(installed.name(), "new");
        assert_eq!(manager.all_scripts().len(), 2);
        assert!(manager.storage().read_script("new.user.js").is_ok());

        // Same filename replaces in place
        manager
            .install_script("new.user.js", "// ==UserScript==\n// @name newer\n// ==/UserScript==\n")
            .unwrap();
        let names: Vec<String> = manager.all_scripts().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["qutebrowser test userscript", "newer"]);
    }

    #[test]
    fn test_sub_frame_filter() {
        let noframes = "// ==UserScript==\n// @noframes\n// ==/UserScript==\n";
        let manager = manager_with(&[("a.user.js", noframes), ("b.user.js", "// plain\n")]);
        let sets = manager.scripts_for(&url("https://example.com/"));
        assert_eq!(sets.len(), 2);
        let sub = sets.for_sub_frame();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.iter().next().unwrap().filename(), "b.user.js");
    }

    #[test]
    fn test_unreadable_script_is_skipped() {
        struct FlakyStorage(MemoryStorage);

        impl ScriptStorage for FlakyStorage {
            fn list_scripts(&self) -> Result<Vec<String>, StorageError> {
                let mut names = self.0.list_scripts()?;
                names.push("gone.user.js".to_string());
                Ok(names)
            }
            fn read_script(&self, name: &str) -> Result<String, StorageError> {
                self.0.read_script(name)
            }
            fn save_script(&mut self, name: &str, source: &str) -> Result<(), StorageError> {
                self.0.save_script(name, source)
            }
            fn read_required(&self, url: &str) -> Option<String> {
                self.0.read_required(url)
            }
            fn write_required(&mut self, url: &str, source: &str) -> Result<(), StorageError> {
                self.0.write_required(url, source)
            }
        }

        let storage = FlakyStorage(MemoryStorage::new().with_script("a.user.js", "// a\n"));
        let mut manager = ScriptManager::new(ManagerConfig::default(), storage, StubDownloader::default());
        assert_eq!(manager.load_scripts().unwrap(), 1);
    }

    #[test]
    fn test_empty_registry_answers_empty() {
        let manager = ScriptManager::new(ManagerConfig::default(), MemoryStorage::new(), StubDownloader::default());
        assert!(manager.scripts_for(&url("https://example.com/")).is_empty());
        assert_eq!(manager.generation(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_requirements() {
        let table = HashMap::from([("http://localhost/test.js".to_string(), "REQUIRED SCRIPT".to_string())]);
        let storage = MemoryStorage::new().with_script("requiring.user.js", TEST_REQUIRE_SCRIPT);
        let mut manager = ScriptManager::new(ManagerConfig::default(), storage, TableDownloader(table));
        manager.load_scripts().unwrap();

        manager.wait_for_requirements().await;

        let script = manager.get("requiring.user.js").unwrap();
        assert!(script.is_ready());
        assert!(script.code().contains("REQUIRED SCRIPT"));
    }
}
