//! HTTP byte source
//!
//! Streams a URL with reqwest on a tokio task. Seek positions become `Range`
//! requests; the total length comes from `Content-Range` on partial
//! responses. `icy-*` response headers are forwarded as stream metadata.

use super::source::{ByteSource, SourceEvents};
use crate::error::SourceError;
use crate::playback::position::StreamPosition;
use reqwest::header::{HeaderMap, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// reqwest-backed [`ByteSource`]
pub struct HttpByteSource {
    client: reqwest::Client,
    task: Option<JoinHandle<()>>,
    /// 0 when unknown
    content_length: Arc<AtomicU64>,
}

impl HttpByteSource {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            task: None,
            content_length: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for HttpByteSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSource for HttpByteSource {
    fn open(
        &mut self,
        url: &str,
        position: Option<&StreamPosition>,
        events: SourceEvents,
    ) -> Result<(), SourceError> {
        self.close();

        let parsed = reqwest::Url::parse(url).map_err(|e| SourceError::Open {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SourceError::Open {
            url: url.to_string(),
            reason: "no async runtime".to_string(),
        })?;

        let mut request = self.client.get(parsed);
        let start = position.map_or(0, |p| p.start);
        if let Some(position) = position {
            request = request.header(RANGE, position.range_header());
        }
        info!("HTTP source opening {} at byte {}", url, start);

        self.content_length.store(0, Ordering::Relaxed);
        let content_length = Arc::clone(&self.content_length);
        self.task = Some(runtime.spawn(async move {
            let mut response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    events.error(format!("request failed: {}", e));
                    return;
                }
            };
            let status = response.status();
            if !status.is_success() {
                events.error(format!("HTTP status {}", status));
                return;
            }

            let headers = response.headers();
            let total = content_range_total(headers)
                .or_else(|| response.content_length().map(|len| len + start));
            content_length.store(total.unwrap_or(0), Ordering::Relaxed);
            let content_type = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let metadata = icy_metadata(headers);

            debug!("HTTP {}: content type {:?}, length {:?}", status, content_type, total);
            if !events.ready(content_type, total) {
                return;
            }
            if !metadata.is_empty() && !events.metadata(metadata) {
                return;
            }

            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => {
                        if !events.bytes(chunk.to_vec()) {
                            return;
                        }
                    }
                    Ok(None) => {
                        events.end_of_stream();
                        return;
                    }
                    Err(e) => {
                        warn!("HTTP transfer failed: {}", e);
                        events.error(format!("transfer failed: {}", e));
                        return;
                    }
                }
            }
        }));
        Ok(())
    }

    fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn content_length(&self) -> Option<u64> {
        match self.content_length.load(Ordering::Relaxed) {
            0 => None,
            length => Some(length),
        }
    }
}

impl Drop for HttpByteSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Total length from `Content-Range: bytes a-b/total`
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// `icy-*` headers, keyed without the prefix
fn icy_metadata(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix("icy-")?;
            let value = value.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
