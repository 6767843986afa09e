use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

use casescout_common::{
    BackendKind, Bucket, Case, Config, FunnelTelemetry, SearchResult,
};
use regex::Regex;
use tokio::sync::Mutex;
use url::Url;

use crate::backends::{search_with_retry, BackendClient, BackendHit, Pacer, SearchConstraints};
use crate::knowledge::{self, JurisdictionProfile};

/// Query params stripped during canonicalization.
const TRACKING_PARAMS: [&str; 8] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
];

static BUCKET_PATTERNS: LazyLock<Vec<(Bucket, Regex)>> = LazyLock::new(|| {
    vec![
        (
            Bucket::Bodycam,
            Regex::new(r"(?i)body[- ]?cam|body[- ]worn|bwc|dash[- ]?cam").unwrap(),
        ),
        (
            Bucket::Interrogation,
            Regex::new(r"(?i)interrogat|custodial interview|police interview").unwrap(),
        ),
        (
            Bucket::Court,
            Regex::new(r"(?i)trial|sentencing|courtroom|hearing|arraignment|verdict").unwrap(),
        ),
        (
            Bucket::Docket,
            Regex::new(r"(?i)docket|court records|case records|indictment|affidavit").unwrap(),
        ),
        (
            Bucket::Dispatch,
            Regex::new(r"(?i)\b911\b|dispatch|scanner audio").unwrap(),
        ),
    ]
});

/// Strip tracking params and the fragment, lowercase the host. The
/// canonical form is the dedup identity across the whole funnel.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed.set_query(None);
    if !kept.is_empty() {
        // Re-encode through the serializer so decoded separators in
        // values survive the round trip.
        let mut pairs = parsed.query_pairs_mut();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
    }
    parsed.set_fragment(None);

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        let _ = parsed.set_host(Some(&host));
    }

    let mut s = parsed.to_string();
    if s.ends_with('/') && parsed.path() == "/" {
        s.pop();
    }
    Some(s)
}

/// Classify a hit into a bucket from its title and URL.
pub fn classify_bucket(title: &str, url: &str) -> Bucket {
    let haystack = format!("{title} {url}");
    if knowledge::records_domains().iter().any(|d| url.contains(d)) {
        return Bucket::Docket;
    }
    if knowledge::dispatch_domains().iter().any(|d| url.contains(d)) {
        return Bucket::Dispatch;
    }
    for (bucket, re) in BUCKET_PATTERNS.iter() {
        if re.is_match(&haystack) {
            return *bucket;
        }
    }
    Bucket::Other
}

/// Cost-ordered discovery cascade. Owns the per-run disabled-provider
/// set: an auth rejection takes that provider out for every later case
/// in the run.
pub struct SearchFunnel {
    video_backends: Vec<Box<dyn BackendClient>>,
    keyword_backend: Option<Box<dyn BackendClient>>,
    fallback_backend: Option<Box<dyn BackendClient>>,
    pacer: Pacer,
    per_bucket_cap: usize,
    total_cap: usize,
    fallback_floor: usize,
    fallback_query_cap: usize,
    fallback_enabled: bool,
    disabled: Mutex<HashSet<BackendKind>>,
}

impl SearchFunnel {
    pub fn new(
        video_backends: Vec<Box<dyn BackendClient>>,
        keyword_backend: Option<Box<dyn BackendClient>>,
        fallback_backend: Option<Box<dyn BackendClient>>,
        config: &Config,
    ) -> Self {
        Self {
            video_backends,
            keyword_backend,
            fallback_backend,
            pacer: Pacer::new(Duration::from_millis(config.backend_delay_ms)),
            per_bucket_cap: config.per_bucket_cap,
            total_cap: config.total_result_cap,
            fallback_floor: config.fallback_floor,
            fallback_query_cap: config.fallback_query_cap,
            fallback_enabled: config.fallback_enabled,
            disabled: Mutex::new(HashSet::new()),
        }
    }

    /// Run the cascade for one case. Backend failures degrade their
    /// step to an empty contribution; the funnel itself never fails.
    pub async fn discover(
        &self,
        case: &Case,
        profile: &JurisdictionProfile,
    ) -> (Vec<SearchResult>, FunnelTelemetry) {
        let mut telemetry = FunnelTelemetry::default();
        let mut collector = Collector::new(self.per_bucket_cap);

        // Step 1: URLs already attached to the case. Free.
        let mut known_hits = 0;
        for raw in &case.known_urls {
            if let Some(url) = canonical_url(raw) {
                let bucket = classify_bucket("", &url);
                if collector.push(SearchResult {
                    url,
                    title: String::new(),
                    snippet: String::new(),
                    source: BackendKind::KnownUrls,
                    bucket,
                }) {
                    known_hits += 1;
                }
            }
        }
        telemetry.record("known_urls", true, known_hits);

        let queries = knowledge::query_buckets(&case.facts, profile);
        let video_buckets: Vec<&(Bucket, String)> = queries
            .iter()
            .filter(|(b, _)| matches!(b, Bucket::Bodycam | Bucket::Interrogation | Bucket::Court | Bucket::Other))
            .collect();

        // Step 2: video platforms, cheapest metered providers first.
        // Agency-run channels get a scoped sweep of their own; official
        // releases outweigh anything a broad query surfaces.
        let channels = knowledge::agency_channels(profile);
        for backend in &self.video_backends {
            let step = format!("video:{}", backend.kind());
            if self.is_disabled(backend.kind()).await {
                telemetry.record(&step, false, 0);
                continue;
            }
            let mut hits = 0;
            for (bucket, query) in &video_buckets {
                hits += self
                    .run_query(backend.as_ref(), query, *bucket, None, case, &mut collector)
                    .await;
            }
            if backend.kind() == BackendKind::Youtube {
                let defendant = case
                    .facts
                    .defendants
                    .first()
                    .map(String::as_str)
                    .unwrap_or("");
                for channel in &channels {
                    hits += self
                        .run_query(
                            backend.as_ref(),
                            defendant,
                            Bucket::Bodycam,
                            Some(channel),
                            case,
                            &mut collector,
                        )
                        .await;
                }
            }
            telemetry.record(&step, true, hits);
            telemetry.backends_called.push(backend.kind());
        }

        // Step 3: keyword web search across every bucket.
        if let Some(backend) = &self.keyword_backend {
            let step = format!("keyword:{}", backend.kind());
            if self.is_disabled(backend.kind()).await {
                telemetry.record(&step, false, 0);
            } else {
                let mut hits = 0;
                for (bucket, query) in &queries {
                    hits += self
                        .run_query(backend.as_ref(), query, *bucket, None, case, &mut collector)
                        .await;
                }
                telemetry.record(&step, true, hits);
                telemetry.backends_called.push(backend.kind());
            }
        } else {
            telemetry.record("keyword:none", false, 0);
        }

        // Step 4: semantic fallback, only under the floor.
        let under_floor = collector.len() < self.fallback_floor;
        let mut fallback_ran = false;
        if self.fallback_enabled && under_floor {
            if let Some(backend) = &self.fallback_backend {
                if !self.is_disabled(backend.kind()).await {
                    let step = format!("fallback:{}", backend.kind());
                    telemetry.fallback_used = true;
                    fallback_ran = true;
                    let mut hits = 0;
                    for query in fallback_queries(case, profile)
                        .into_iter()
                        .take(self.fallback_query_cap)
                    {
                        hits += self
                            .run_fallback_query(
                                backend.as_ref(),
                                &query,
                                profile,
                                case,
                                &mut collector,
                            )
                            .await;
                    }
                    telemetry.record(&step, true, hits);
                    telemetry.backends_called.push(backend.kind());
                }
            }
        }
        if !fallback_ran {
            telemetry.record("fallback:skipped", false, 0);
        }

        // Step 5: hard ceiling, video buckets survive first.
        let mut results = collector.into_results();
        if results.len() > self.total_cap {
            results.sort_by_key(|r| r.bucket.priority());
            results.truncate(self.total_cap);
            telemetry.truncated = true;
            tracing::info!(
                case_key = %case.key,
                cap = self.total_cap,
                "Result ceiling hit, truncated by bucket priority"
            );
        }

        telemetry.unique_results = results.len();
        telemetry.degraded_backends = {
            let disabled = self.disabled.lock().await;
            disabled.iter().copied().collect()
        };

        (results, telemetry)
    }

    async fn run_query(
        &self,
        backend: &dyn BackendClient,
        query: &str,
        bucket: Bucket,
        channel_id: Option<&str>,
        case: &Case,
        collector: &mut Collector,
    ) -> usize {
        if collector.bucket_full(bucket) {
            return 0;
        }
        self.pacer.wait(backend.kind()).await;

        let constraints = SearchConstraints {
            max_results: self.per_bucket_cap,
            year: case.facts.incident_year,
            channel_id: channel_id.map(str::to_string),
            include_domains: Vec::new(),
        };
        match search_with_retry(backend, query, &constraints).await {
            Ok(hits) => collector.push_hits(hits, backend.kind(), Some(bucket)),
            Err(e) => {
                self.handle_backend_failure(backend.kind(), e, case).await;
                0
            }
        }
    }

    async fn run_fallback_query(
        &self,
        backend: &dyn BackendClient,
        query: &str,
        profile: &JurisdictionProfile,
        case: &Case,
        collector: &mut Collector,
    ) -> usize {
        self.pacer.wait(backend.kind()).await;

        let mut include_domains: Vec<String> = profile
            .search_domains
            .iter()
            .map(|d| d.to_string())
            .collect();
        include_domains.extend(knowledge::records_domains().iter().map(|d| d.to_string()));

        let constraints = SearchConstraints {
            max_results: self.per_bucket_cap,
            year: case.facts.incident_year,
            channel_id: None,
            include_domains,
        };
        match search_with_retry(backend, query, &constraints).await {
            Ok(hits) => collector.push_hits(hits, backend.kind(), None),
            Err(e) => {
                self.handle_backend_failure(backend.kind(), e, case).await;
                0
            }
        }
    }

    async fn handle_backend_failure(
        &self,
        kind: BackendKind,
        err: casescout_common::BackendError,
        case: &Case,
    ) {
        match err {
            casescout_common::BackendError::Auth(msg) => {
                let mut disabled = self.disabled.lock().await;
                if disabled.insert(kind) {
                    tracing::error!(
                        backend = %kind,
                        error = %msg,
                        "Credentials rejected, disabling provider for the rest of the run"
                    );
                }
            }
            other => {
                tracing::warn!(
                    case_key = %case.key,
                    backend = %kind,
                    error = %other,
                    "Backend step degraded to empty"
                );
            }
        }
    }

    async fn is_disabled(&self, kind: BackendKind) -> bool {
        self.disabled.lock().await.contains(&kind)
    }
}

fn fallback_queries(case: &Case, profile: &JurisdictionProfile) -> Vec<String> {
    let defendant = case
        .facts
        .defendants
        .first()
        .map(String::as_str)
        .unwrap_or("");
    let year = case
        .facts
        .incident_year
        .map(|y| y.to_string())
        .unwrap_or_default();
    vec![
        format!(
            "released police footage or court video in the case of {defendant}, {} {year}",
            profile.name
        ),
        format!("{defendant} criminal case evidence records {}", profile.name),
    ]
}

/// Dedup and per-bucket capping, preserving cost order: the first
/// (cheapest) occurrence of a URL wins.
struct Collector {
    results: Vec<SearchResult>,
    seen: HashSet<String>,
    bucket_counts: HashMap<Bucket, usize>,
    per_bucket_cap: usize,
}

impl Collector {
    fn new(per_bucket_cap: usize) -> Self {
        Self {
            results: Vec::new(),
            seen: HashSet::new(),
            bucket_counts: HashMap::new(),
            per_bucket_cap,
        }
    }

    fn bucket_full(&self, bucket: Bucket) -> bool {
        self.bucket_counts.get(&bucket).copied().unwrap_or(0) >= self.per_bucket_cap
    }

    fn push(&mut self, result: SearchResult) -> bool {
        if !self.seen.insert(result.url.clone()) {
            return false;
        }
        *self.bucket_counts.entry(result.bucket).or_insert(0) += 1;
        self.results.push(result);
        true
    }

    /// Canonicalize, classify, cap, and insert a batch of raw hits.
    /// Known-URL entries bypass the cap; backend batches respect it.
    fn push_hits(
        &mut self,
        hits: Vec<BackendHit>,
        source: BackendKind,
        forced_bucket: Option<Bucket>,
    ) -> usize {
        let mut added = 0;
        for hit in hits {
            let Some(url) = canonical_url(&hit.url) else {
                continue;
            };
            // Content classification wins; the query's bucket is only a
            // default for hits that classify as Other.
            let bucket = match classify_bucket(&hit.title, &url) {
                Bucket::Other => forced_bucket.unwrap_or(Bucket::Other),
                classified => classified,
            };
            if self.bucket_full(bucket) {
                continue;
            }
            if self.push(SearchResult {
                url,
                title: hit.title,
                snippet: hit.snippet,
                source,
                bucket,
            }) {
                added += 1;
            }
        }
        added
    }

    fn len(&self) -> usize {
        self.results.len()
    }

    fn into_results(self) -> Vec<SearchResult> {
        self.results
    }
}
