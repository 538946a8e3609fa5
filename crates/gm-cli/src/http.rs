//! HTTP downloader for `@require` resources

use std::time::Duration;

use gm_manager::{CompletionSink, DownloadError, Downloader};
use tokio::runtime::Handle;

const USER_AGENT: &str = concat!("gmkit/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches requirements with reqwest on a tokio runtime.
pub struct HttpDownloader {
    client: reqwest::Client,
    handle: Handle,
}

impl HttpDownloader {
    pub fn new(handle: Handle) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(TIMEOUT)
            .build()?;
        Ok(Self { client, handle })
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, sink: CompletionSink) {
        let client = self.client.clone();
        let url = url.to_string();
        self.handle.spawn(async move {
            let result = fetch_body(&client, &url).await;
            sink.finish(result);
        });
    }
}

/// Never fetches; uncached requirements stay pending.
pub struct OfflineDownloader;

impl Downloader for OfflineDownloader {
    fn fetch(&self, url: &str, sink: CompletionSink) {
        log::debug!("offline, not fetching {}", url);
        drop(sink);
    }
}

async fn fetch_body(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, DownloadError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| DownloadError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status(status.as_u16()));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| DownloadError::Transport(e.to_string()))?;
    log::debug!("fetched {} ({} bytes)", url, body.len());
    Ok(body.to_vec())
}
