//! `@require` resolution
//!
//! The resolver tracks which scripts wait on which URLs. It never fetches
//! anything itself: [`RequirementResolver::register`] tells the caller which
//! URLs need a new download, and [`RequirementResolver::complete`] is fed the
//! results. At most one download per URL is in flight across the registry;
//! later scripts requiring the same URL subscribe to the running download.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Identity of a script inside one registry generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptKey {
    pub generation: u64,
    pub index: usize,
}

/// Outcome of registering a script's requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Every requirement was cached; sources in declaration order
    Ready(Vec<String>),
    /// Some requirements are outstanding; `fetch` lists URLs not yet in flight
    Pending { outstanding: usize, fetch: Vec<String> },
}

/// Effect of one completed download on a waiting script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Waiting { key: ScriptKey, outstanding: usize },
    Ready { key: ScriptKey, sources: Vec<String> },
}

#[derive(Debug)]
struct PendingScript {
    urls: Vec<String>,
    slots: Vec<Option<String>>,
    outstanding: usize,
}

/// Deduplicating requirement tracker.
#[derive(Debug, Default)]
pub struct RequirementResolver {
    /// URL -> scripts waiting for it
    in_flight: HashMap<String, Vec<ScriptKey>>,
    pending: HashMap<ScriptKey, PendingScript>,
}

impl RequirementResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the ordered requirement URLs of the script `key`.
    ///
    /// `cached` supplies bodies that need no download. Checking the in-flight
    /// map and subscribing happen in this one call.
    pub fn register<F>(&mut self, key: ScriptKey, urls: &[String], cached: F) -> Registration
    where
        F: Fn(&str) -> Option<String>,
    {
        self.forget(key);

        let slots: Vec<Option<String>> = urls.iter().map(|url| cached(url)).collect();
        let outstanding = slots.iter().filter(|slot| slot.is_none()).count();
        if outstanding == 0 {
            return Registration::Ready(slots.into_iter().flatten().collect());
        }

        let mut fetch = Vec::new();
        for (url, slot) in urls.iter().zip(&slots) {
            if slot.is_some() {
                continue;
            }
            match self.in_flight.entry(url.clone()) {
                Entry::Occupied(mut waiters) => {
                    if !waiters.get().contains(&key) {
                        log::debug!("{} already in flight, subscribing", url);
                        waiters.get_mut().push(key);
                    }
                }
                Entry::Vacant(waiters) => {
                    waiters.insert(vec![key]);
                    fetch.push(url.clone());
                }
            }
        }

        self.pending.insert(
            key,
            PendingScript {
                urls: urls.to_vec(),
                slots,
                outstanding,
            },
        );

        Registration::Pending { outstanding, fetch }
    }

    /// Record the body of a finished download. Failed downloads pass an
    /// empty body so their scripts still become ready.
    pub fn complete(&mut self, url: &str, body: &str) -> Vec<Progress> {
        let waiters = match self.in_flight.remove(url) {
            Some(waiters) => waiters,
            None => {
                log::debug!("completion for {} which nobody is waiting on", url);
                return Vec::new();
            }
        };

        let mut progress = Vec::new();
        for key in waiters {
            let pending = match self.pending.get_mut(&key) {
                Some(pending) => pending,
                None => continue,
            };

            for (slot_url, slot) in pending.urls.iter().zip(pending.slots.iter_mut()) {
                if slot_url == url && slot.is_none() {
                    *slot = Some(body.to_string());
                    pending.outstanding -= 1;
                }
            }

            if pending.outstanding > 0 {
                progress.push(Progress::Waiting {
                    key,
                    outstanding: pending.outstanding,
                });
            } else if let Some(done) = self.pending.remove(&key) {
                progress.push(Progress::Ready {
                    key,
                    sources: done.slots.into_iter().flatten().collect(),
                });
            }
        }

        progress
    }

    /// Drop whatever `key` was waiting on. Re-registering a key does this
    /// implicitly.
    pub fn forget(&mut self, key: ScriptKey) {
        self.pending.remove(&key);
    }

    /// Forget scripts from any generation other than `generation`.
    /// Downloads stay in flight so a new generation can reuse them.
    pub fn retain_generation(&mut self, generation: u64) {
        self.pending.retain(|key, _| key.generation == generation);
        for waiters in self.in_flight.values_mut() {
            waiters.retain(|key| key.generation == generation);
        }
    }

    pub fn is_in_flight(&self, url: &str) -> bool {
        self.in_flight.contains_key(url)
    }

    /// URLs currently downloading, sorted.
    pub fn in_flight(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = self.in_flight.keys().map(String::as_str).collect();
        urls.sort_unstable();
        urls
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Number of scripts still waiting on requirements.
    pub fn pending_scripts(&self) -> usize {
        self.pending.len()
    }
}
