use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use casescout_common::{BackendError, BackendKind};
use rand::Rng;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use openrouter_client::truncate_to_char_boundary;
use youtube_client::{SearchOptions, YoutubeClient};

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_MS: u64 = 1_000;
/// Snippets are capped so classifier prompts stay bounded.
const SNIPPET_MAX_BYTES: usize = 500;

/// One raw hit from a backend, before canonicalization and bucketing.
#[derive(Debug, Clone)]
pub struct BackendHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Constraints a funnel step passes down to a backend.
#[derive(Debug, Clone, Default)]
pub struct SearchConstraints {
    pub max_results: usize,
    /// Restrict video search to uploads from this year onward.
    pub year: Option<i32>,
    /// Restrict video search to a single channel. Backends without
    /// channel semantics ignore it.
    pub channel_id: Option<String>,
    /// Restrict semantic search to these domains.
    pub include_domains: Vec<String>,
}

#[async_trait]
pub trait BackendClient: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn search(
        &self,
        query: &str,
        constraints: &SearchConstraints,
    ) -> Result<Vec<BackendHit>, BackendError>;
}

/// Retry wrapper shared by every funnel step. Rate limits and transient
/// faults back off exponentially with jitter; auth rejections return
/// immediately; an explicit no-results signal is a normal empty outcome.
pub async fn search_with_retry(
    backend: &dyn BackendClient,
    query: &str,
    constraints: &SearchConstraints,
) -> Result<Vec<BackendHit>, BackendError> {
    for attempt in 0..MAX_RETRIES {
        match backend.search(query, constraints).await {
            Ok(hits) => return Ok(hits),
            Err(BackendError::NoResults) => return Ok(Vec::new()),
            Err(e) if e.is_retryable() && attempt + 1 < MAX_RETRIES => {
                let backoff = RETRY_BASE_MS * 2u64.pow(attempt);
                let jitter = rand::rng().random_range(0..500u64);
                tracing::warn!(
                    backend = %backend.kind(),
                    attempt = attempt + 1,
                    backoff_ms = backoff + jitter,
                    error = %e,
                    "Backend call failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("retry loop always returns")
}

/// Enforces the mandatory minimum delay between consecutive calls to
/// the same backend.
pub struct Pacer {
    delay: Duration,
    last_call: Mutex<HashMap<BackendKind, Instant>>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_call: Mutex::new(HashMap::new()),
        }
    }

    pub async fn wait(&self, kind: BackendKind) {
        let wait_for = {
            let mut last = self.last_call.lock().await;
            let now = Instant::now();
            let wait = last
                .get(&kind)
                .and_then(|prev| self.delay.checked_sub(now.duration_since(*prev)))
                .unwrap_or(Duration::ZERO);
            last.insert(kind, now + wait);
            wait
        };
        if !wait_for.is_zero() {
            tokio::time::sleep(wait_for).await;
        }
    }
}

fn status_to_error(status: u16, body: String) -> BackendError {
    match status {
        401 | 403 => BackendError::Auth(format!("status {status}: {body}")),
        429 => BackendError::RateLimited,
        _ => BackendError::Transient(format!("status {status}: {body}")),
    }
}

// ---------------------------------------------------------------------------
// Brave (keyword web search)
// ---------------------------------------------------------------------------

const BRAVE_URL: &str = "https://api.search.brave.com/res/v1/web/search";

pub struct BraveBackend {
    client: reqwest::Client,
    api_key: String,
}

impl BraveBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl BackendClient for BraveBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Brave
    }

    async fn search(
        &self,
        query: &str,
        constraints: &SearchConstraints,
    ) -> Result<Vec<BackendHit>, BackendError> {
        let resp = self
            .client
            .get(BRAVE_URL)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[
                ("q", query),
                ("count", &constraints.max_results.max(1).to_string()),
            ])
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status.as_u16(), body));
        }

        let parsed: BraveResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;

        Ok(parsed
            .web
            .unwrap_or_default()
            .results
            .into_iter()
            .map(|r| BackendHit {
                url: r.url,
                title: r.title,
                snippet: truncate_to_char_boundary(&r.description, SNIPPET_MAX_BYTES).to_string(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// YouTube (video search)
// ---------------------------------------------------------------------------

pub struct YoutubeBackend {
    client: YoutubeClient,
}

impl YoutubeBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            client: YoutubeClient::new(api_key),
        }
    }
}

#[async_trait]
impl BackendClient for YoutubeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Youtube
    }

    async fn search(
        &self,
        query: &str,
        constraints: &SearchConstraints,
    ) -> Result<Vec<BackendHit>, BackendError> {
        let opts = SearchOptions {
            published_after: constraints
                .year
                .map(|y| format!("{y}-01-01T00:00:00Z")),
            channel_id: constraints.channel_id.clone(),
        };

        let videos = self
            .client
            .search_videos(query, constraints.max_results.max(1) as u32, &opts)
            .await
            .map_err(map_youtube_error)?;

        // Dedup by video id: the API occasionally repeats items across
        // result kinds.
        let mut seen = std::collections::HashSet::new();
        Ok(videos
            .into_iter()
            .filter(|v| seen.insert(v.video_id.clone()))
            .map(|v| BackendHit {
                url: v.watch_url(),
                title: v.title,
                snippet: format!(
                    "{} [{}]",
                    truncate_to_char_boundary(&v.description, SNIPPET_MAX_BYTES),
                    v.channel_title
                ),
            })
            .collect())
    }
}

fn map_youtube_error(err: youtube_client::YoutubeError) -> BackendError {
    match err {
        youtube_client::YoutubeError::Api { status: 403, message }
            if message.contains("quota") =>
        {
            BackendError::RateLimited
        }
        youtube_client::YoutubeError::Api { status, message } => {
            status_to_error(status, message)
        }
        youtube_client::YoutubeError::Network(msg) | youtube_client::YoutubeError::Parse(msg) => {
            BackendError::Transient(msg)
        }
    }
}

// ---------------------------------------------------------------------------
// Vimeo (video search)
// ---------------------------------------------------------------------------

const VIMEO_URL: &str = "https://api.vimeo.com/videos";

pub struct VimeoBackend {
    client: reqwest::Client,
    access_token: String,
}

impl VimeoBackend {
    pub fn new(access_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VimeoResponse {
    #[serde(default)]
    data: Vec<VimeoVideo>,
}

#[derive(Debug, Deserialize)]
struct VimeoVideo {
    link: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl BackendClient for VimeoBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vimeo
    }

    async fn search(
        &self,
        query: &str,
        constraints: &SearchConstraints,
    ) -> Result<Vec<BackendHit>, BackendError> {
        let resp = self
            .client
            .get(VIMEO_URL)
            .bearer_auth(&self.access_token)
            .query(&[
                ("query", query),
                ("per_page", &constraints.max_results.max(1).to_string()),
                ("sort", "relevant"),
            ])
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status.as_u16(), body));
        }

        let parsed: VimeoResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;

        Ok(parsed
            .data
            .into_iter()
            .map(|v| BackendHit {
                url: v.link,
                title: v.name,
                snippet: truncate_to_char_boundary(
                    v.description.as_deref().unwrap_or_default(),
                    SNIPPET_MAX_BYTES,
                )
                .to_string(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Exa (semantic fallback)
// ---------------------------------------------------------------------------

const EXA_URL: &str = "https://api.exa.ai/search";

pub struct ExaBackend {
    client: reqwest::Client,
    api_key: String,
}

impl ExaBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
struct ExaResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl BackendClient for ExaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Exa
    }

    async fn search(
        &self,
        query: &str,
        constraints: &SearchConstraints,
    ) -> Result<Vec<BackendHit>, BackendError> {
        let mut body = serde_json::json!({
            "query": query,
            "numResults": constraints.max_results.max(1),
            "type": "neural",
        });
        if !constraints.include_domains.is_empty() {
            body["includeDomains"] = serde_json::json!(constraints.include_domains);
        }

        let resp = self
            .client
            .post(EXA_URL)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status.as_u16(), body));
        }

        let parsed: ExaResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| BackendHit {
                url: r.url,
                title: r.title.unwrap_or_default(),
                snippet: truncate_to_char_boundary(
                    r.text.as_deref().unwrap_or_default(),
                    SNIPPET_MAX_BYTES,
                )
                .to_string(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyBackend {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl BackendClient for FlakyBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Brave
        }

        async fn search(
            &self,
            _query: &str,
            _constraints: &SearchConstraints,
        ) -> Result<Vec<BackendHit>, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(BackendError::Transient("flap".into()))
            } else {
                Ok(vec![BackendHit {
                    url: "https://example.com/a".into(),
                    title: "a".into(),
                    snippet: String::new(),
                }])
            }
        }
    }

    struct AuthFailBackend;

    #[async_trait]
    impl BackendClient for AuthFailBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Exa
        }

        async fn search(
            &self,
            _query: &str,
            _constraints: &SearchConstraints,
        ) -> Result<Vec<BackendHit>, BackendError> {
            Err(BackendError::Auth("bad key".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_up_to_limit() {
        let backend = FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: 2,
        };
        let hits = search_with_retry(&backend, "q", &SearchConstraints::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts() {
        let backend = FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: 10,
        };
        let err = search_with_retry(&backend, "q", &SearchConstraints::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_errors_never_retry() {
        let backend = AuthFailBackend;
        let err = search_with_retry(&backend, "q", &SearchConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Auth(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_spaces_out_same_backend_calls() {
        let pacer = Pacer::new(Duration::from_millis(500));
        let start = Instant::now();
        pacer.wait(BackendKind::Brave).await;
        pacer.wait(BackendKind::Brave).await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
