use std::env;
use std::str::FromStr;

use crate::error::CaseScoutError;

/// Application configuration loaded from environment variables.
///
/// Only `OPENROUTER_API_KEY` is required (the classifier has no
/// substitute). Provider keys are optional; an absent key disables that
/// backend for the run instead of aborting it.
#[derive(Debug, Clone)]
pub struct Config {
    // LLM access point
    pub openrouter_api_key: String,
    pub openrouter_model: String,

    // Search providers (optional)
    pub brave_api_key: Option<String>,
    pub youtube_api_key: Option<String>,
    pub vimeo_access_token: Option<String>,
    pub exa_api_key: Option<String>,

    // Prescore
    pub prescore: PrescoreWeights,

    // Funnel caps
    pub per_bucket_cap: usize,
    pub total_result_cap: usize,
    pub fallback_floor: usize,
    pub fallback_query_cap: usize,
    pub fallback_enabled: bool,

    // Pacing
    pub backend_delay_ms: u64,
    pub case_delay_ms: u64,
}

/// Additive prescore weights. All defaults match the production values;
/// every weight is tunable without touching the scoring code.
#[derive(Debug, Clone)]
pub struct PrescoreWeights {
    pub threshold: u32,
    pub artifact_keyword: u32,
    pub video_platform: u32,
    pub agency_match: u32,
    pub lifecycle_keyword: u32,
    pub open_records_region: u32,
    pub court_video_region: u32,
    /// When set, the open-records and court-video bonuses are mutually
    /// exclusive (the larger wins) instead of both applying.
    pub exclusive_access_bonus: bool,
}

impl Default for PrescoreWeights {
    fn default() -> Self {
        Self {
            threshold: 20,
            artifact_keyword: 15,
            video_platform: 20,
            agency_match: 10,
            lifecycle_keyword: 5,
            open_records_region: 10,
            court_video_region: 10,
            exclusive_access_bonus: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables. Errors list every
    /// missing required variable so `casescout check` can report them
    /// all at once.
    pub fn from_env() -> Result<Self, CaseScoutError> {
        let openrouter_api_key = env::var("OPENROUTER_API_KEY").map_err(|_| {
            CaseScoutError::Config("OPENROUTER_API_KEY environment variable is required".into())
        })?;

        Ok(Self {
            openrouter_api_key,
            openrouter_model: env::var("OPENROUTER_MODEL")
                .unwrap_or_else(|_| "anthropic/claude-sonnet-4".to_string()),
            brave_api_key: optional_env("BRAVE_API_KEY"),
            youtube_api_key: optional_env("YOUTUBE_API_KEY"),
            vimeo_access_token: optional_env("VIMEO_ACCESS_TOKEN"),
            exa_api_key: optional_env("EXA_API_KEY"),
            prescore: PrescoreWeights {
                threshold: env_or("PRESCORE_THRESHOLD", 20)?,
                exclusive_access_bonus: env_or("PRESCORE_EXCLUSIVE_ACCESS_BONUS", false)?,
                ..PrescoreWeights::default()
            },
            per_bucket_cap: env_or("FUNNEL_PER_BUCKET_CAP", 5)?,
            total_result_cap: env_or("FUNNEL_TOTAL_CAP", 25)?,
            fallback_floor: env_or("FUNNEL_FALLBACK_FLOOR", 3)?,
            fallback_query_cap: env_or("FUNNEL_FALLBACK_QUERY_CAP", 2)?,
            fallback_enabled: env_or("FUNNEL_FALLBACK_ENABLED", true)?,
            backend_delay_ms: env_or("BACKEND_DELAY_MS", 1000)?,
            case_delay_ms: env_or("CASE_DELAY_MS", 2000)?,
        })
    }

    /// Human-readable per-provider availability, for `casescout check`.
    pub fn provider_report(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("openrouter", true),
            ("brave", self.brave_api_key.is_some()),
            ("youtube", self.youtube_api_key.is_some()),
            ("vimeo", self.vimeo_access_token.is_some()),
            ("exa", self.exa_api_key.is_some()),
        ]
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, CaseScoutError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| CaseScoutError::Config(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}
