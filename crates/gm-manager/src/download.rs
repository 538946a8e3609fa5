//! Download seam for `@require` resources
//!
//! The manager never performs I/O itself. A [`Downloader`] starts fetches
//! wherever it likes and reports each one exactly once through the
//! [`CompletionSink`] it was handed; the manager applies completions when it
//! drains its channel.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Error type for a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("download was dropped before completing")]
    Dropped,
}

/// A finished fetch.
#[derive(Debug, Clone)]
pub struct DownloadEvent {
    pub url: String,
    pub result: Result<Vec<u8>, DownloadError>,
}

/// Handle a downloader uses to report one fetch's completion.
///
/// A sink dropped without [`CompletionSink::finish`] reports
/// [`DownloadError::Dropped`], so waiters are never stranded.
#[derive(Debug)]
pub struct CompletionSink {
    url: String,
    tx: UnboundedSender<DownloadEvent>,
    finished: bool,
}

impl CompletionSink {
    /// URL this sink reports for.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Report the fetch result.
    pub fn finish(mut self, result: Result<Vec<u8>, DownloadError>) {
        self.send(result);
        self.finished = true;
    }

    fn send(&self, result: Result<Vec<u8>, DownloadError>) {
        let event = DownloadEvent {
            url: self.url.clone(),
            result,
        };
        // The manager is gone; nobody is waiting for this anymore.
        if self.tx.send(event).is_err() {
            log::debug!("dropping download completion for {}, manager shut down", self.url);
        }
    }
}

impl Drop for CompletionSink {
    fn drop(&mut self) {
        if !self.finished {
            self.send(Err(DownloadError::Dropped));
        }
    }
}

/// Something that can fetch `@require` URLs.
pub trait Downloader {
    /// Start fetching `url`. Completion must be reported through `sink`.
    fn fetch(&self, url: &str, sink: CompletionSink);
}

/// Channel pair the manager owns for completions.
pub(crate) struct CompletionChannel {
    tx: UnboundedSender<DownloadEvent>,
    pub(crate) rx: UnboundedReceiver<DownloadEvent>,
}

impl CompletionChannel {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub(crate) fn sink(&self, url: &str) -> CompletionSink {
        CompletionSink {
            url: url.to_string(),
            tx: self.tx.clone(),
            finished: false,
        }
    }
}
