//! Remote data source for the live snapshot.

use crate::error::{Result, SyncError};
use crate::models::OnlineResponse;
use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA};
use serde::Deserialize;

/// Anything that can produce the current online snapshot.
///
/// Implementations perform exactly one request per call; retrying is the
/// caller's business.
#[async_trait]
pub trait OnlineSource: Send + Sync {
    async fn fetch_online(&self) -> Result<OnlineResponse>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// `GET {base_url}/online` over reqwest, with HTTP caching disabled.
#[derive(Clone)]
pub struct HttpSource {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(SyncError::InvalidBaseUrl(base_url.to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("wicgate-live/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| SyncError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{base}/online"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OnlineSource for HttpSource {
    async fn fetch_online(&self) -> Result<OnlineResponse> {
        let res = self
            .http
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|err| SyncError::Transport(err.to_string()))?;
        let status = res.status();

        if !status.is_success() {
            // Prefer the API's own message, fall back to the reason phrase.
            let body = res.json::<ErrorBody>().await.ok();
            let message = body
                .and_then(|b| b.message.or(b.error))
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "request failed".to_string());
            return Err(SyncError::Http {
                status: status.as_u16(),
                message,
            });
        }

        res.json::<OnlineResponse>()
            .await
            .map_err(|err| SyncError::Decode(err.to_string()))
    }
}
