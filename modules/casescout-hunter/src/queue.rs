use std::time::Duration;

use casescout_common::{Case, CaseKey, CaseScoutError, Recommendation};

use crate::assess::AssessmentEngine;
use crate::funnel::SearchFunnel;
use crate::identity::{KeyOrigin, KnownKeys};
use crate::knowledge;
use crate::store::CaseStore;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Process at most this many cases.
    pub limit: Option<usize>,
    /// Full pipeline, no persistence writes.
    pub dry_run: bool,
    /// Only cases from this region.
    pub region: Option<String>,
    /// Only the case with this exact key.
    pub case_key: Option<String>,
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub cases_considered: u32,
    pub assessed: u32,
    pub duplicates: u32,
    pub errors: u32,
    pub classifier_invocations: u32,
    pub by_recommendation: [u32; 4], // Strong, Moderate, Weak, Skip
}

impl RunStats {
    fn record_recommendation(&mut self, rec: Recommendation) {
        let slot = match rec {
            Recommendation::Strong => 0,
            Recommendation::Moderate => 1,
            Recommendation::Weak => 2,
            Recommendation::Skip => 3,
        };
        self.by_recommendation[slot] += 1;
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Queue Run Complete ===")?;
        writeln!(f, "Cases considered:  {}", self.cases_considered)?;
        writeln!(f, "Assessed:          {}", self.assessed)?;
        writeln!(f, "Duplicates:        {}", self.duplicates)?;
        writeln!(f, "Errors:            {}", self.errors)?;
        writeln!(f, "Classifier calls:  {}", self.classifier_invocations)?;
        writeln!(f, "\nBy recommendation:")?;
        writeln!(f, "  STRONG:   {}", self.by_recommendation[0])?;
        writeln!(f, "  MODERATE: {}", self.by_recommendation[1])?;
        writeln!(f, "  WEAK:     {}", self.by_recommendation[2])?;
        writeln!(f, "  SKIP:     {}", self.by_recommendation[3])
    }
}

/// Sequential per-case pipeline: duplicate check, funnel, assessment,
/// persist. One case at a time with a mandatory delay between cases;
/// a failed case is marked and skipped, never retried in-run.
pub struct CaseQueue<'a> {
    funnel: SearchFunnel,
    engine: AssessmentEngine,
    store: &'a dyn CaseStore,
    case_delay: Duration,
}

impl<'a> CaseQueue<'a> {
    pub fn new(
        funnel: SearchFunnel,
        engine: AssessmentEngine,
        store: &'a dyn CaseStore,
        case_delay: Duration,
    ) -> Self {
        Self {
            funnel,
            engine,
            store,
            case_delay,
        }
    }

    pub async fn run(&self, options: &RunOptions) -> Result<RunStats, CaseScoutError> {
        let mut stats = RunStats::default();

        let all_claims = self.store.load_known_keys().await?;
        let mut cases = self.store.load_unassessed_cases().await?;

        if let Some(region) = &options.region {
            cases.retain(|c| &c.region == region);
        }
        if let Some(key) = &options.case_key {
            cases.retain(|c| c.key.as_str() == key);
        }
        if let Some(limit) = options.limit {
            cases.truncate(limit);
        }

        tracing::info!(
            cases = cases.len(),
            dry_run = options.dry_run,
            "Starting queue run"
        );

        // A key claimed by any other case, before or during this run,
        // makes later holders duplicates. A case's own claim (matched
        // via anchor_ref) does not count against it.
        let mut known = KnownKeys::load(all_claims);

        let total = cases.len();
        for (i, case) in cases.iter().enumerate() {
            stats.cases_considered += 1;

            let competing = known
                .check_duplicate(&case.key)
                .filter(|origin| case.anchor_ref.as_deref() != Some(origin.source.as_str()))
                .cloned();
            if let Some(origin) = competing {
                tracing::info!(
                    case_key = %case.key,
                    duplicate_of = %origin.source,
                    "Case key already claimed, flagging duplicate"
                );
                if !options.dry_run {
                    self.store.mark_duplicate(&case.key, &origin).await?;
                }
                stats.duplicates += 1;
                continue;
            }
            known.append(
                case.key.clone(),
                KeyOrigin {
                    source: case
                        .anchor_ref
                        .clone()
                        .unwrap_or_else(|| "earlier in run".to_string()),
                },
            );

            match self.process_case(case, options.dry_run).await {
                Ok(assessment) => {
                    if assessment.classifier_invoked {
                        stats.classifier_invocations += 1;
                    }
                    stats.record_recommendation(assessment.recommendation);
                    stats.assessed += 1;
                }
                Err(e) => {
                    tracing::warn!(case_key = %case.key, error = %e, "Case failed, marking and moving on");
                    if !options.dry_run {
                        self.store
                            .mark_error(&case.key, &format!("ERROR: {e}"))
                            .await?;
                    }
                    stats.errors += 1;
                }
            }

            if i + 1 < total && !self.case_delay.is_zero() {
                tokio::time::sleep(self.case_delay).await;
            }
        }

        Ok(stats)
    }

    async fn process_case(
        &self,
        case: &Case,
        dry_run: bool,
    ) -> Result<casescout_common::Assessment, CaseScoutError> {
        let profile = knowledge::jurisdiction_profile(&case.region)
            .ok_or_else(|| CaseScoutError::UnknownRegion(case.region.clone()))?;

        let (results, telemetry) = self.funnel.discover(case, &profile).await;
        tracing::info!(
            case_key = %case.key,
            results = results.len(),
            fallback = telemetry.fallback_used,
            "Funnel complete"
        );

        let assessment = self
            .engine
            .assess(case, &results, &profile, &telemetry)
            .await?;
        tracing::info!(
            case_key = %case.key,
            recommendation = %assessment.recommendation,
            composite = assessment.composite_score,
            classifier = assessment.classifier_invoked,
            "Assessment complete"
        );

        if !dry_run {
            self.store.write_assessment(&assessment).await?;
        }
        Ok(assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casescout_common::{
        BackendKind, CaseFacts, CaseStatus, Config, SourceTier,
    };
    use chrono::Utc;

    use crate::assess::AssessmentEngine;
    use crate::backends::{BackendClient, BackendHit, SearchConstraints};
    use crate::store::{anchor_fields, MemoryStore};
    use async_trait::async_trait;
    use casescout_common::BackendError;
    use openrouter_client::OpenRouterClient;

    fn test_config() -> Config {
        Config {
            openrouter_api_key: "test".into(),
            openrouter_model: "test".into(),
            brave_api_key: None,
            youtube_api_key: None,
            vimeo_access_token: None,
            exa_api_key: None,
            prescore: Default::default(),
            per_bucket_cap: 5,
            total_result_cap: 25,
            fallback_floor: 3,
            fallback_query_cap: 2,
            fallback_enabled: false,
            backend_delay_ms: 0,
            case_delay_ms: 0,
        }
    }

    fn case(key: &str, defendant: &str) -> Case {
        Case {
            key: CaseKey(key.into()),
            region: "lakecounty".into(),
            facts: CaseFacts {
                defendants: vec![defendant.into()],
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

    struct OfficialPairBackend;

    #[async_trait]
    impl BackendClient for OfficialPairBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Brave
        }

        async fn search(
            &self,
            _query: &str,
            _constraints: &SearchConstraints,
        ) -> Result<Vec<BackendHit>, BackendError> {
            Ok(vec![
                BackendHit {
                    url: "https://www.lcso.org/media/bodycam-release".into(),
                    title: "LCSO bodycam release".into(),
                    snippet: "Body camera footage".into(),
                },
                BackendHit {
                    url: "https://www.lakecountyclerk.org/sentencing-video".into(),
                    title: "Sentencing hearing video".into(),
                    snippet: "Full recording".into(),
                },
            ])
        }
    }

    fn queue<'a>(store: &'a dyn CaseStore) -> CaseQueue<'a> {
        let config = test_config();
        let funnel = SearchFunnel::new(
            vec![],
            Some(Box::new(OfficialPairBackend)),
            None,
            &config,
        );
        // The official-pair results trip the shortcut, so the engine's
        // client is never called in these tests.
        let engine = AssessmentEngine::new(OpenRouterClient::new("test".into(), "test".into()));
        CaseQueue::new(funnel, engine, store, Duration::ZERO)
    }

    #[tokio::test]
    async fn run_assesses_and_persists_verdicts() {
        let store = MemoryStore::with_cases(vec![case("smith_lake_2023", "Robert Smith")]);
        let stats = queue(&store).run(&RunOptions::default()).await.unwrap();

        assert_eq!(stats.assessed, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.classifier_invocations, 0);
        assert_eq!(stats.by_recommendation[0], 1);

        let row = store.anchor_row(&CaseKey("smith_lake_2023".into())).unwrap();
        let map = crate::store::FieldMap::from_header(&anchor_fields::HEADER);
        assert_eq!(map.get(&row, anchor_fields::STATUS).unwrap(), "assessed");
        assert_eq!(
            map.get(&row, anchor_fields::FOOTAGE_RECOMMENDATION).unwrap(),
            "STRONG"
        );
        assert!(!map.get(&row, anchor_fields::TELEMETRY).unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_key_in_run_is_flagged_not_assessed() {
        let store = MemoryStore::with_cases(vec![
            case("smith_lake_2023", "Robert Smith"),
            case("smith_lake_2023", "Robert Smith Jr."),
        ]);
        let stats = queue(&store).run(&RunOptions::default()).await.unwrap();

        assert_eq!(stats.assessed, 1);
        assert_eq!(stats.duplicates, 1);
    }

    /// Store that holds one claim per distinct key, with a pending
    /// case's own claim listed under its own row reference.
    struct SetClaimStore {
        duplicates: std::sync::Mutex<Vec<(CaseKey, String)>>,
    }

    #[async_trait]
    impl CaseStore for SetClaimStore {
        async fn load_known_keys(
            &self,
        ) -> Result<Vec<(CaseKey, crate::identity::KeyOrigin)>, CaseScoutError> {
            Ok(vec![
                (
                    CaseKey("smith_lake_2023".into()),
                    crate::identity::KeyOrigin {
                        source: "anchor:settled".into(),
                    },
                ),
                (
                    CaseKey("jones_lake_2022".into()),
                    crate::identity::KeyOrigin {
                        source: "anchor:1".into(),
                    },
                ),
            ])
        }

        async fn load_unassessed_cases(&self) -> Result<Vec<Case>, CaseScoutError> {
            let mut rival = case("smith_lake_2023", "Robert Smith");
            rival.anchor_ref = Some("anchor:0".into());
            let mut fresh = case("jones_lake_2022", "Alan Jones");
            fresh.anchor_ref = Some("anchor:1".into());
            Ok(vec![rival, fresh])
        }

        async fn append_intake(
            &self,
            _article: &casescout_common::Article,
            _prescore: &casescout_common::PrescoreResult,
            _verdict: &str,
            _case_key: Option<&CaseKey>,
        ) -> Result<String, CaseScoutError> {
            unreachable!("queue never writes intake rows")
        }

        async fn append_case(&self, _case: &Case, _intake_ref: &str) -> Result<(), CaseScoutError> {
            unreachable!("queue never creates cases")
        }

        async fn mark_duplicate(
            &self,
            key: &CaseKey,
            duplicate_of: &crate::identity::KeyOrigin,
        ) -> Result<(), CaseScoutError> {
            self.duplicates
                .lock()
                .unwrap()
                .push((key.clone(), duplicate_of.source.clone()));
            Ok(())
        }

        async fn write_assessment(
            &self,
            _assessment: &casescout_common::Assessment,
        ) -> Result<(), CaseScoutError> {
            Ok(())
        }

        async fn mark_error(&self, _key: &CaseKey, _context: &str) -> Result<(), CaseScoutError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cross_run_duplicate_caught_with_one_claim_per_key() {
        let store = SetClaimStore {
            duplicates: std::sync::Mutex::new(Vec::new()),
        };
        let stats = queue(&store).run(&RunOptions::default()).await.unwrap();

        // The smith key is already owned by a settled row, so its
        // pending holder gets flagged. The jones case only collides
        // with its own claim and proceeds.
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.assessed, 1);
        let flagged = store.duplicates.lock().unwrap();
        assert_eq!(
            flagged.as_slice(),
            &[(CaseKey("smith_lake_2023".into()), "anchor:settled".into())]
        );
    }

    #[tokio::test]
    async fn limit_bounds_the_run() {
        let store = MemoryStore::with_cases(vec![
            case("smith_lake_2023", "Robert Smith"),
            case("jones_lake_2022", "Alan Jones"),
            case("brown_lake_2021", "Pat Brown"),
        ]);
        let stats = queue(&store)
            .run(&RunOptions {
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(stats.cases_considered, 2);
        assert_eq!(stats.assessed, 2);
    }

    #[tokio::test]
    async fn single_case_scope() {
        let store = MemoryStore::with_cases(vec![
            case("smith_lake_2023", "Robert Smith"),
            case("jones_lake_2022", "Alan Jones"),
        ]);
        let stats = queue(&store)
            .run(&RunOptions {
                case_key: Some("jones_lake_2022".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(stats.cases_considered, 1);
        assert_eq!(stats.assessed, 1);
        let row = store.anchor_row(&CaseKey("smith_lake_2023".into())).unwrap();
        let map = crate::store::FieldMap::from_header(&anchor_fields::HEADER);
        assert_eq!(map.get(&row, anchor_fields::STATUS).unwrap(), "unassessed");
    }

    #[tokio::test]
    async fn dry_run_runs_everything_but_writes_nothing() {
        let store = MemoryStore::with_cases(vec![case("smith_lake_2023", "Robert Smith")]);
        let stats = queue(&store)
            .run(&RunOptions {
                dry_run: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(stats.assessed, 1);
        let row = store.anchor_row(&CaseKey("smith_lake_2023".into())).unwrap();
        let map = crate::store::FieldMap::from_header(&anchor_fields::HEADER);
        assert_eq!(map.get(&row, anchor_fields::STATUS).unwrap(), "unassessed");
        assert!(map
            .get(&row, anchor_fields::FOOTAGE_RECOMMENDATION)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unknown_region_marks_error_and_continues() {
        let mut bad = case("doe_nowhere_2020", "John Doe");
        bad.region = "atlantis".into();
        let store = MemoryStore::with_cases(vec![bad, case("smith_lake_2023", "Robert Smith")]);
        let stats = queue(&store).run(&RunOptions::default()).await.unwrap();

        assert_eq!(stats.errors, 1);
        assert_eq!(stats.assessed, 1);
        let row = store.anchor_row(&CaseKey("doe_nowhere_2020".into())).unwrap();
        let map = crate::store::FieldMap::from_header(&anchor_fields::HEADER);
        assert_eq!(map.get(&row, anchor_fields::STATUS).unwrap(), "error");
        assert!(map
            .get(&row, anchor_fields::REASONING)
            .unwrap()
            .starts_with("ERROR:"));
    }

    #[test]
    fn stats_display_mentions_every_verdict() {
        let mut stats = RunStats::default();
        stats.record_recommendation(Recommendation::Strong);
        stats.record_recommendation(Recommendation::Skip);
        let rendered = format!("{stats}");
        assert!(rendered.contains("STRONG:   1"));
        assert!(rendered.contains("SKIP:     1"));
    }

    // Tier classification sanity for the stub results used above.
    #[test]
    fn official_pair_results_classify_official() {
        let profile = knowledge::jurisdiction_profile("lakecounty").unwrap();
        let r = casescout_common::SearchResult {
            url: "https://www.lcso.org/media/bodycam-release".into(),
            title: "LCSO bodycam release".into(),
            snippet: "Body camera footage".into(),
            source: BackendKind::Brave,
            bucket: casescout_common::Bucket::Bodycam,
        };
        assert_eq!(crate::assess::classify_tier(&r, &profile), SourceTier::Official);
    }
}
