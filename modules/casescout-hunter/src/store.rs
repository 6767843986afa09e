use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use casescout_common::{
    Article, Assessment, Case, CaseKey, CaseScoutError, CaseStatus, PrescoreResult, SourceTier,
};

use crate::identity::KeyOrigin;

/// Logical field names for the intake sheet.
pub mod intake_fields {
    pub const REGION: &str = "region";
    pub const OUTLET: &str = "outlet";
    pub const HEADLINE: &str = "headline";
    pub const URL: &str = "url";
    pub const YEAR: &str = "year";
    pub const SUMMARY: &str = "summary";
    pub const VERDICT: &str = "verdict";
    pub const PRESCORE: &str = "prescore";
    pub const MATCHED_SIGNALS: &str = "matched_signals";
    pub const CASE_KEY: &str = "case_key";

    pub const HEADER: [&str; 10] = [
        REGION,
        OUTLET,
        HEADLINE,
        URL,
        YEAR,
        SUMMARY,
        VERDICT,
        PRESCORE,
        MATCHED_SIGNALS,
        CASE_KEY,
    ];
}

/// Logical field names for the case-anchor sheet.
pub mod anchor_fields {
    pub const CASE_KEY: &str = "case_key";
    pub const INTAKE_REF: &str = "intake_ref";
    pub const DEFENDANTS: &str = "defendants";
    pub const VICTIMS: &str = "victims";
    pub const JURISDICTION: &str = "jurisdiction";
    pub const STATUS: &str = "status";
    pub const BODY_CAM: &str = "body_cam";
    pub const INTERROGATION: &str = "interrogation";
    pub const COURT_VIDEO: &str = "court_video";
    pub const SURVEILLANCE: &str = "surveillance";
    pub const DOCKET: &str = "docket";
    pub const DISPATCH_AUDIO: &str = "dispatch_audio";
    pub const SOURCE_URLS: &str = "source_urls";
    pub const FOOTAGE_RECOMMENDATION: &str = "footage_recommendation";
    pub const PRIMARY_SOURCE_SCORE: &str = "primary_source_score";
    pub const EVIDENCE_DEPTH_SCORE: &str = "evidence_depth_score";
    pub const REASONING: &str = "reasoning";
    pub const TELEMETRY: &str = "search_telemetry";

    pub const HEADER: [&str; 18] = [
        CASE_KEY,
        INTAKE_REF,
        DEFENDANTS,
        VICTIMS,
        JURISDICTION,
        STATUS,
        BODY_CAM,
        INTERROGATION,
        COURT_VIDEO,
        SURVEILLANCE,
        DOCKET,
        DISPATCH_AUDIO,
        SOURCE_URLS,
        FOOTAGE_RECOMMENDATION,
        PRIMARY_SOURCE_SCORE,
        EVIDENCE_DEPTH_SCORE,
        REASONING,
        TELEMETRY,
    ];
}

/// Stable field-identity lookup: logical name to column position,
/// resolved once from the header row. Every read and write addresses
/// columns through this map; nothing in the codebase holds a positional
/// constant. Reordering sheet columns only changes what this resolves.
#[derive(Debug, Clone)]
pub struct FieldMap {
    index: HashMap<String, usize>,
    width: usize,
}

impl FieldMap {
    pub fn from_header<S: AsRef<str>>(header: &[S]) -> Self {
        let index = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_ref().trim().to_lowercase(), i))
            .collect();
        Self {
            index,
            width: header.len(),
        }
    }

    pub fn col(&self, name: &str) -> Result<usize, CaseScoutError> {
        self.index
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| CaseScoutError::UnknownField(name.to_string()))
    }

    pub fn get<'a>(&self, row: &'a [String], name: &str) -> Result<&'a str, CaseScoutError> {
        let col = self.col(name)?;
        Ok(row.get(col).map(String::as_str).unwrap_or(""))
    }

    pub fn set(
        &self,
        row: &mut Vec<String>,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), CaseScoutError> {
        let col = self.col(name)?;
        if row.len() <= col {
            row.resize(col + 1, String::new());
        }
        row[col] = value.into();
        Ok(())
    }

    /// An empty row sized to the header width.
    pub fn blank_row(&self) -> Vec<String> {
        vec![String::new(); self.width]
    }
}

/// Persistence boundary. The mechanics behind it (sheet API, database)
/// are out of scope; implementations get the full record semantics and
/// nothing about search or assessment logic.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// The explicit read set of case keys claimed before this run.
    /// One entry per distinct key is enough; the origin identifies the
    /// row that first claimed it. Implementations that include
    /// unassessed cases' own claims here must also set
    /// [`Case::anchor_ref`] in `load_unassessed_cases`, so the queue
    /// can tell a case's own claim from a competing one.
    async fn load_known_keys(&self) -> Result<Vec<(CaseKey, KeyOrigin)>, CaseScoutError>;

    async fn load_unassessed_cases(&self) -> Result<Vec<Case>, CaseScoutError>;

    /// Record a triaged article. Returns a row reference usable as a
    /// [`KeyOrigin`] source.
    async fn append_intake(
        &self,
        article: &Article,
        prescore: &PrescoreResult,
        verdict: &str,
        case_key: Option<&CaseKey>,
    ) -> Result<String, CaseScoutError>;

    /// Create the case anchor for a promoted article.
    async fn append_case(&self, case: &Case, intake_ref: &str) -> Result<(), CaseScoutError>;

    /// Terminal duplicate state: flagged, never merged.
    async fn mark_duplicate(
        &self,
        key: &CaseKey,
        duplicate_of: &KeyOrigin,
    ) -> Result<(), CaseScoutError>;

    async fn write_assessment(&self, assessment: &Assessment) -> Result<(), CaseScoutError>;

    async fn mark_error(&self, key: &CaseKey, context: &str) -> Result<(), CaseScoutError>;
}

/// In-memory store backed by header-addressed string rows, the same
/// record shape a sheet backend would hold. Used by tests and dry-run
/// verification. Writes are last-write-wins.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    intake_rows: Vec<Vec<String>>,
    anchor_rows: Vec<Vec<String>>,
    cases: Vec<Case>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cases(cases: Vec<Case>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().unwrap();
            let map = Self::anchor_map();
            for case in &cases {
                let mut row = map.blank_row();
                let _ = map.set(&mut row, anchor_fields::CASE_KEY, case.key.as_str());
                let _ = map.set(&mut row, anchor_fields::DEFENDANTS, case.facts.defendants.join("; "));
                let _ = map.set(&mut row, anchor_fields::JURISDICTION, &case.facts.jurisdiction);
                let _ = map.set(&mut row, anchor_fields::STATUS, case.status.to_string());
                let _ = map.set(&mut row, anchor_fields::SOURCE_URLS, case.known_urls.join("\n"));
                inner.anchor_rows.push(row);
            }
            inner.cases = cases;
        }
        store
    }

    fn intake_map() -> FieldMap {
        FieldMap::from_header(&intake_fields::HEADER)
    }

    fn anchor_map() -> FieldMap {
        FieldMap::from_header(&anchor_fields::HEADER)
    }

    /// Snapshot of the anchor row for a key, for assertions.
    pub fn anchor_row(&self, key: &CaseKey) -> Option<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let map = Self::anchor_map();
        inner
            .anchor_rows
            .iter()
            .find(|row| map.get(row, anchor_fields::CASE_KEY).ok() == Some(key.as_str()))
            .cloned()
    }

    pub fn intake_count(&self) -> usize {
        self.inner.lock().unwrap().intake_rows.len()
    }

    fn update_anchor<F>(&self, key: &CaseKey, apply: F) -> Result<(), CaseScoutError>
    where
        F: FnOnce(&FieldMap, &mut Vec<String>) -> Result<(), CaseScoutError>,
    {
        let mut inner = self.inner.lock().unwrap();
        let map = Self::anchor_map();
        let row = inner
            .anchor_rows
            .iter_mut()
            .find(|row| map.get(row, anchor_fields::CASE_KEY).ok() == Some(key.as_str()))
            .ok_or_else(|| CaseScoutError::Store(format!("no anchor row for {key}")))?;
        apply(&map, row)
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn load_known_keys(&self) -> Result<Vec<(CaseKey, KeyOrigin)>, CaseScoutError> {
        let inner = self.inner.lock().unwrap();
        let map = Self::anchor_map();
        let mut keys = Vec::new();
        for (i, row) in inner.anchor_rows.iter().enumerate() {
            let key = map.get(row, anchor_fields::CASE_KEY)?;
            if !key.is_empty() {
                keys.push((
                    CaseKey(key.to_string()),
                    KeyOrigin {
                        source: format!("anchor:{i}"),
                    },
                ));
            }
        }
        Ok(keys)
    }

    async fn load_unassessed_cases(&self) -> Result<Vec<Case>, CaseScoutError> {
        let inner = self.inner.lock().unwrap();
        // Cases and anchor rows are index-aligned.
        Ok(inner
            .cases
            .iter()
            .enumerate()
            .filter(|(_, c)| c.status == CaseStatus::Unassessed)
            .map(|(i, c)| {
                let mut case = c.clone();
                case.anchor_ref = Some(format!("anchor:{i}"));
                case
            })
            .collect())
    }

    async fn append_intake(
        &self,
        article: &Article,
        prescore: &PrescoreResult,
        verdict: &str,
        case_key: Option<&CaseKey>,
    ) -> Result<String, CaseScoutError> {
        let mut inner = self.inner.lock().unwrap();
        let map = Self::intake_map();
        let mut row = map.blank_row();
        map.set(&mut row, intake_fields::REGION, &article.region)?;
        map.set(
            &mut row,
            intake_fields::OUTLET,
            article.outlet.clone().unwrap_or_default(),
        )?;
        map.set(&mut row, intake_fields::HEADLINE, &article.headline)?;
        map.set(&mut row, intake_fields::URL, &article.url)?;
        map.set(
            &mut row,
            intake_fields::YEAR,
            article
                .facts
                .incident_year
                .map(|y| y.to_string())
                .unwrap_or_default(),
        )?;
        map.set(
            &mut row,
            intake_fields::SUMMARY,
            openrouter_client::truncate_to_char_boundary(&article.body, 500),
        )?;
        map.set(&mut row, intake_fields::VERDICT, verdict)?;
        map.set(&mut row, intake_fields::PRESCORE, prescore.score.to_string())?;
        map.set(
            &mut row,
            intake_fields::MATCHED_SIGNALS,
            prescore.matched_signals.join(", "),
        )?;
        map.set(
            &mut row,
            intake_fields::CASE_KEY,
            case_key.map(|k| k.as_str().to_string()).unwrap_or_default(),
        )?;
        inner.intake_rows.push(row);
        Ok(format!("intake:{}", inner.intake_rows.len() - 1))
    }

    async fn append_case(&self, case: &Case, intake_ref: &str) -> Result<(), CaseScoutError> {
        let mut inner = self.inner.lock().unwrap();
        let map = Self::anchor_map();
        let mut row = map.blank_row();
        map.set(&mut row, anchor_fields::CASE_KEY, case.key.as_str())?;
        map.set(&mut row, anchor_fields::INTAKE_REF, intake_ref)?;
        map.set(&mut row, anchor_fields::DEFENDANTS, case.facts.defendants.join("; "))?;
        map.set(&mut row, anchor_fields::VICTIMS, case.facts.victims.join("; "))?;
        map.set(&mut row, anchor_fields::JURISDICTION, &case.facts.jurisdiction)?;
        map.set(&mut row, anchor_fields::STATUS, case.status.to_string())?;
        map.set(&mut row, anchor_fields::SOURCE_URLS, case.known_urls.join("\n"))?;
        inner.anchor_rows.push(row);
        inner.cases.push(case.clone());
        Ok(())
    }

    async fn mark_duplicate(
        &self,
        key: &CaseKey,
        duplicate_of: &KeyOrigin,
    ) -> Result<(), CaseScoutError> {
        self.update_anchor(key, |map, row| {
            map.set(row, anchor_fields::STATUS, CaseStatus::Duplicate.to_string())?;
            map.set(
                row,
                anchor_fields::REASONING,
                format!("DUPLICATE_OF: {}", duplicate_of.source),
            )
        })?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(case) = inner.cases.iter_mut().find(|c| &c.key == key) {
            case.status = CaseStatus::Duplicate;
        }
        Ok(())
    }

    async fn write_assessment(&self, assessment: &Assessment) -> Result<(), CaseScoutError> {
        let primary_source_score = assessment
            .findings
            .values()
            .filter(|f| f.tier == SourceTier::Official)
            .map(|f| f.confidence)
            .max()
            .unwrap_or(0);
        let telemetry = serde_json::to_string(&assessment.telemetry)
            .map_err(|e| CaseScoutError::Store(e.to_string()))?;

        self.update_anchor(&assessment.case_key, |map, row| {
            map.set(row, anchor_fields::STATUS, CaseStatus::Assessed.to_string())?;
            for (field, artifact) in [
                (anchor_fields::BODY_CAM, casescout_common::ArtifactType::BodyCam),
                (anchor_fields::INTERROGATION, casescout_common::ArtifactType::Interrogation),
                (anchor_fields::COURT_VIDEO, casescout_common::ArtifactType::CourtVideo),
                (anchor_fields::SURVEILLANCE, casescout_common::ArtifactType::Surveillance),
                (anchor_fields::DOCKET, casescout_common::ArtifactType::Docket),
                (anchor_fields::DISPATCH_AUDIO, casescout_common::ArtifactType::DispatchAudio),
            ] {
                let cell = assessment
                    .findings
                    .get(&artifact)
                    .map(|f| format!("{} ({})", f.confidence, f.tier))
                    .unwrap_or_default();
                map.set(row, field, cell)?;
            }
            map.set(
                row,
                anchor_fields::FOOTAGE_RECOMMENDATION,
                assessment.recommendation.to_string(),
            )?;
            map.set(
                row,
                anchor_fields::PRIMARY_SOURCE_SCORE,
                primary_source_score.to_string(),
            )?;
            map.set(
                row,
                anchor_fields::EVIDENCE_DEPTH_SCORE,
                assessment.composite_score.to_string(),
            )?;
            map.set(row, anchor_fields::REASONING, &assessment.reasoning)?;
            map.set(row, anchor_fields::TELEMETRY, telemetry)
        })?;

        let mut inner = self.inner.lock().unwrap();
        if let Some(case) = inner.cases.iter_mut().find(|c| c.key == assessment.case_key) {
            case.status = CaseStatus::Assessed;
        }
        Ok(())
    }

    async fn mark_error(&self, key: &CaseKey, context: &str) -> Result<(), CaseScoutError> {
        self.update_anchor(key, |map, row| {
            map.set(row, anchor_fields::STATUS, CaseStatus::Error.to_string())?;
            map.set(row, anchor_fields::REASONING, context)
        })?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(case) = inner.cases.iter_mut().find(|c| &c.key == key) {
            case.status = CaseStatus::Error;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casescout_common::CaseFacts;
    use chrono::Utc;

    #[test]
    fn field_map_resolves_by_name_not_position() {
        // Same fields, shuffled column order: lookups are unaffected.
        let original = FieldMap::from_header(&["case_key", "status", "reasoning"]);
        let shuffled = FieldMap::from_header(&["reasoning", "case_key", "status"]);

        let mut row_a = original.blank_row();
        original.set(&mut row_a, "status", "assessed").unwrap();
        let mut row_b = shuffled.blank_row();
        shuffled.set(&mut row_b, "status", "assessed").unwrap();

        assert_eq!(original.get(&row_a, "status").unwrap(), "assessed");
        assert_eq!(shuffled.get(&row_b, "status").unwrap(), "assessed");
        assert_ne!(original.col("status").unwrap(), shuffled.col("status").unwrap());
    }

    #[test]
    fn unknown_field_is_typed_error() {
        let map = FieldMap::from_header(&["case_key"]);
        let err = map.col("no_such_field").unwrap_err();
        assert!(matches!(err, CaseScoutError::UnknownField(_)));
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let map = FieldMap::from_header(&["Case_Key", " STATUS "]);
        assert!(map.col("case_key").is_ok());
        assert!(map.col("status").is_ok());
    }

    fn sample_case(key: &str) -> Case {
        Case {
            key: CaseKey(key.to_string()),
            region: "lakecounty".into(),
            facts: CaseFacts {
                defendants: vec!["Robert Smith".into()],
                jurisdiction: "Lake County".into(),
                incident_year: Some(2023),
                ..Default::default()
            },
            known_urls: vec![],
            status: CaseStatus::Unassessed,
            anchor_ref: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_store_round_trips_known_keys() {
        let store = MemoryStore::with_cases(vec![sample_case("smith_lake_2023")]);
        let keys = store.load_known_keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].0.as_str(), "smith_lake_2023");
    }

    #[tokio::test]
    async fn mark_duplicate_is_terminal_not_merged() {
        let store = MemoryStore::with_cases(vec![sample_case("smith_lake_2023")]);
        store
            .mark_duplicate(
                &CaseKey("smith_lake_2023".into()),
                &KeyOrigin {
                    source: "anchor:0".into(),
                },
            )
            .await
            .unwrap();

        let row = store.anchor_row(&CaseKey("smith_lake_2023".into())).unwrap();
        let map = MemoryStore::anchor_map();
        assert_eq!(map.get(&row, anchor_fields::STATUS).unwrap(), "duplicate");
        assert!(map
            .get(&row, anchor_fields::REASONING)
            .unwrap()
            .starts_with("DUPLICATE_OF:"));

        let unassessed = store.load_unassessed_cases().await.unwrap();
        assert!(unassessed.is_empty());
    }
}
