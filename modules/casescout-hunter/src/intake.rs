use std::sync::LazyLock;

use casescout_common::{
    Article, Case, CaseKey, CaseScoutError, CaseStatus, PrescoreResult,
};
use casescout_common::config::PrescoreWeights;
use chrono::Utc;
use regex::Regex;

use crate::identity::{self, KeyOrigin, KnownKeys};
use crate::knowledge;
use crate::prescore;
use crate::store::CaseStore;

static VIDEO_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:www\.)?(?:youtube\.com|youtu\.be|vimeo\.com)/[^\s\)\]\x22']+")
        .unwrap()
});

/// What happened to one triaged article.
#[derive(Debug)]
pub enum IntakeDecision {
    Rejected {
        prescore: PrescoreResult,
        reason: String,
    },
    Duplicate {
        key: CaseKey,
        of: String,
    },
    Promoted {
        case: Case,
    },
}

/// The gate between triaged articles and the case queue: prescore, key
/// derivation, duplicate check, promotion. Every article leaves an
/// intake record either way.
pub struct IntakeGate {
    weights: PrescoreWeights,
    dry_run: bool,
}

impl IntakeGate {
    pub fn new(weights: PrescoreWeights, dry_run: bool) -> Self {
        Self { weights, dry_run }
    }

    pub async fn process(
        &self,
        article: &Article,
        known: &mut KnownKeys,
        store: &dyn CaseStore,
    ) -> Result<IntakeDecision, CaseScoutError> {
        let profile = knowledge::jurisdiction_profile(&article.region)
            .ok_or_else(|| CaseScoutError::UnknownRegion(article.region.clone()))?;

        let prescored = prescore::score(&article.body, &article.url, &profile, &self.weights);
        if !prescored.passed {
            let reason = prescored.reject_reason();
            tracing::info!(
                url = %article.url,
                score = prescored.score,
                "Article rejected by prescore gate"
            );
            if !self.dry_run {
                store
                    .append_intake(article, &prescored, &reason, None)
                    .await?;
            }
            return Ok(IntakeDecision::Rejected {
                prescore: prescored,
                reason,
            });
        }

        let key = identity::derive_key(&article.facts);
        if let Some(origin) = known.check_duplicate(&key) {
            let of = origin.source.clone();
            tracing::info!(case_key = %key, duplicate_of = %of, "Duplicate case key at intake");
            if !self.dry_run {
                store
                    .append_intake(
                        article,
                        &prescored,
                        &format!("DUPLICATE_OF: {of}"),
                        Some(&key),
                    )
                    .await?;
            }
            return Ok(IntakeDecision::Duplicate { key, of });
        }

        let mut known_urls: Vec<String> = VIDEO_LINK
            .find_iter(&article.body)
            .map(|m| m.as_str().to_string())
            .collect();
        if VIDEO_LINK.is_match(&article.url) {
            known_urls.push(article.url.clone());
        }

        let case = Case {
            key: key.clone(),
            region: article.region.clone(),
            facts: article.facts.clone(),
            known_urls,
            status: CaseStatus::Unassessed,
            anchor_ref: None,
            created_at: Utc::now(),
        };

        tracing::info!(
            case_key = %key,
            score = prescored.score,
            "Article promoted to case"
        );
        if !self.dry_run {
            let intake_ref = store
                .append_intake(article, &prescored, "PROMOTED", Some(&key))
                .await?;
            store.append_case(&case, &intake_ref).await?;
        }
        known.append(key, KeyOrigin {
            source: format!("intake:{}", article.url),
        });

        Ok(IntakeDecision::Promoted { case })
    }
}
