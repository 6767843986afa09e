use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Artifact taxonomy ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    BodyCam,
    Interrogation,
    CourtVideo,
    Surveillance,
    Docket,
    DispatchAudio,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 6] = [
        ArtifactType::BodyCam,
        ArtifactType::Interrogation,
        ArtifactType::CourtVideo,
        ArtifactType::Surveillance,
        ArtifactType::Docket,
        ArtifactType::DispatchAudio,
    ];
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactType::BodyCam => write!(f, "body_cam"),
            ArtifactType::Interrogation => write!(f, "interrogation"),
            ArtifactType::CourtVideo => write!(f, "court_video"),
            ArtifactType::Surveillance => write!(f, "surveillance"),
            ArtifactType::Docket => write!(f, "docket"),
            ArtifactType::DispatchAudio => write!(f, "dispatch_audio"),
        }
    }
}

/// Query/result bucket. Coarser than [`ArtifactType`]: a funnel step
/// issues one query per bucket and caps results per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Bodycam,
    Interrogation,
    Court,
    Docket,
    Dispatch,
    Other,
}

impl Bucket {
    /// Truncation priority when the total result ceiling is hit.
    /// Lower values survive first; video buckets outrank documents.
    pub fn priority(&self) -> u8 {
        match self {
            Bucket::Bodycam => 0,
            Bucket::Interrogation => 1,
            Bucket::Court => 2,
            Bucket::Docket => 3,
            Bucket::Dispatch => 4,
            Bucket::Other => 5,
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bucket::Bodycam => write!(f, "bodycam"),
            Bucket::Interrogation => write!(f, "interrogation"),
            Bucket::Court => write!(f, "court"),
            Bucket::Docket => write!(f, "docket"),
            Bucket::Dispatch => write!(f, "dispatch"),
            Bucket::Other => write!(f, "other"),
        }
    }
}

/// Who is hosting a result. Total order: Official > News > Repost > Unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Unknown,
    Repost,
    News,
    Official,
}

impl SourceTier {
    /// Trust weight applied to classifier confidence when synthesizing
    /// the composite score.
    pub fn trust_weight(&self) -> f64 {
        match self {
            SourceTier::Official => 1.0,
            SourceTier::News => 0.6,
            SourceTier::Repost => 0.3,
            SourceTier::Unknown => 0.15,
        }
    }
}

impl std::fmt::Display for SourceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTier::Official => write!(f, "official"),
            SourceTier::News => write!(f, "news"),
            SourceTier::Repost => write!(f, "repost"),
            SourceTier::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Strong,
    Moderate,
    Weak,
    Skip,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::Strong => write!(f, "STRONG"),
            Recommendation::Moderate => write!(f, "MODERATE"),
            Recommendation::Weak => write!(f, "WEAK"),
            Recommendation::Skip => write!(f, "SKIP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Unassessed,
    Assessed,
    Duplicate,
    Error,
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaseStatus::Unassessed => write!(f, "unassessed"),
            CaseStatus::Assessed => write!(f, "assessed"),
            CaseStatus::Duplicate => write!(f, "duplicate"),
            CaseStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    KnownUrls,
    Youtube,
    Vimeo,
    Brave,
    Exa,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::KnownUrls => write!(f, "known_urls"),
            BackendKind::Youtube => write!(f, "youtube"),
            BackendKind::Vimeo => write!(f, "vimeo"),
            BackendKind::Brave => write!(f, "brave"),
            BackendKind::Exa => write!(f, "exa"),
        }
    }
}

// --- Case identity ---

/// Normalized dedup key. Either `case:<normalized docket number>` or
/// `<surname>_<jurisdiction>_<year>`. Construction lives in the hunter's
/// identity module; this newtype just keeps keys from mixing with raw
/// strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseKey(pub String);

impl CaseKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- Case records ---

/// Raw facts about a case as captured at intake, before any search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseFacts {
    pub defendants: Vec<String>,
    pub victims: Vec<String>,
    pub jurisdiction: String,
    pub incident_year: Option<i32>,
    pub case_number: Option<String>,
    pub crime_type: Option<String>,
    pub lifecycle_stage: Option<String>,
    /// Free-form query hints carried from intake (e.g. unusual aliases).
    pub search_hints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub key: CaseKey,
    pub region: String,
    pub facts: CaseFacts,
    /// URLs already attached to the case at intake. Step one of the
    /// funnel, costs nothing.
    pub known_urls: Vec<String>,
    pub status: CaseStatus,
    /// Store row reference of this case's own key claim, set by the
    /// store when the case is loaded. Lets the queue tell the case's
    /// own claim from a competing one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

// --- Articles & prescore ---

/// An article under triage, before it becomes a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub region: String,
    pub outlet: Option<String>,
    pub headline: String,
    pub url: String,
    pub body: String,
    pub facts: CaseFacts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescoreResult {
    pub score: u32,
    pub threshold: u32,
    pub matched_signals: Vec<String>,
    pub passed: bool,
}

impl PrescoreResult {
    /// Machine-readable rejection reason for below-threshold articles.
    pub fn reject_reason(&self) -> String {
        format!(
            "AUTO-REJECT: pre-score {} below threshold {}",
            self.score, self.threshold
        )
    }
}

// --- Search results ---

/// One candidate URL out of the funnel. Ephemeral: raw results are
/// never persisted, only the assessment derived from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Canonical form: tracking params and fragment stripped, host
    /// lowercased. Dedup identity across the whole funnel.
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub source: BackendKind,
    pub bucket: Bucket,
}

// --- Assessment ---

/// Per-artifact-type finding, after tier classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactFinding {
    /// 0-100, how confident we are the artifact exists and is reachable.
    pub confidence: u8,
    pub tier: SourceTier,
    pub best_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub case_key: CaseKey,
    /// BTreeMap so serialized output and tests are deterministic.
    pub findings: BTreeMap<ArtifactType, ArtifactFinding>,
    pub composite_score: u32,
    pub artifact_type_count: usize,
    pub recommendation: Recommendation,
    pub reasoning: String,
    pub classifier_invoked: bool,
    pub telemetry: FunnelTelemetry,
    pub assessed_at: DateTime<Utc>,
}

// --- Funnel telemetry ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunnelStep {
    pub step: String,
    pub executed: bool,
    pub hits: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunnelTelemetry {
    pub steps: Vec<FunnelStep>,
    pub backends_called: Vec<BackendKind>,
    pub unique_results: usize,
    pub fallback_used: bool,
    pub truncated: bool,
    /// Providers disabled mid-run after an auth rejection.
    pub degraded_backends: Vec<BackendKind>,
}

impl FunnelTelemetry {
    pub fn record(&mut self, step: &str, executed: bool, hits: usize) {
        self.steps.push(FunnelStep {
            step: step.to_string(),
            executed,
            hits,
        });
    }
}
