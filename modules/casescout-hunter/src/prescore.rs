use std::sync::LazyLock;

use casescout_common::config::PrescoreWeights;
use casescout_common::PrescoreResult;
use regex::Regex;

use crate::knowledge::{self, JurisdictionProfile};

/// Artifact keyword groups. Each group that matches contributes the
/// keyword weight once, no matter how many times it appears.
static ARTIFACT_KEYWORDS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "bodycam",
            Regex::new(r"(?i)\b(body[- ]?cam(era)?|body[- ]worn camera|bwc)\b").unwrap(),
        ),
        (
            "interrogation",
            Regex::new(r"(?i)\b(custodial interview|interrogation (video|footage|room))\b").unwrap(),
        ),
        (
            "surveillance",
            Regex::new(r"(?i)\bsurveillance (footage|video|camera)\b").unwrap(),
        ),
        (
            "court_video",
            Regex::new(r"(?i)\b(trial livestream|courtroom (video|footage)|sentencing video)\b")
                .unwrap(),
        ),
        (
            "dashcam",
            Regex::new(r"(?i)\bdash[- ]?cam(era)?\b").unwrap(),
        ),
    ]
});

static LIFECYCLE_KEYWORDS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("sentenced", Regex::new(r"(?i)\bsentenc(ed|ing)\b").unwrap()),
        ("convicted", Regex::new(r"(?i)\bconvict(ed|ion)\b").unwrap()),
        ("plea", Regex::new(r"(?i)\b(plea(ded|d)?|pleads?) (guilty|no contest)\b").unwrap()),
        ("trial", Regex::new(r"(?i)\b(on|stands?|standing) trial\b").unwrap()),
        ("verdict", Regex::new(r"(?i)\bverdict\b").unwrap()),
    ]
});

const VIDEO_PLATFORMS: [&str; 3] = ["youtube.com", "youtu.be", "vimeo.com"];

/// Deterministic article prescore. Pure function of its inputs: same
/// text, url, and profile always produce the same score and signal list.
/// Strictly additive; no single signal is required to clear the
/// threshold on its own.
pub fn score(
    text: &str,
    url: &str,
    profile: &JurisdictionProfile,
    weights: &PrescoreWeights,
) -> PrescoreResult {
    let mut total = 0u32;
    let mut signals = Vec::new();
    let haystack = format!("{text} {url}");
    let lower = haystack.to_lowercase();

    for (label, re) in ARTIFACT_KEYWORDS.iter() {
        if re.is_match(&haystack) {
            total += weights.artifact_keyword;
            signals.push(format!("keyword:{label}"));
        }
    }

    // Flat bonus: any platform domain present counts once.
    if let Some(platform) = VIDEO_PLATFORMS.iter().find(|p| lower.contains(*p)) {
        total += weights.video_platform;
        signals.push(format!("video:{platform}"));
    }

    // Flat bonus: first matching agency token counts.
    if let Some(token) = knowledge::agency_tokens(profile)
        .into_iter()
        .find(|t| lower.contains(t.as_str()))
    {
        total += weights.agency_match;
        signals.push(format!("agency:{token}"));
    }

    for (label, re) in LIFECYCLE_KEYWORDS.iter() {
        if re.is_match(&haystack) {
            total += weights.lifecycle_keyword;
            signals.push(format!("lifecycle:{label}"));
        }
    }

    let open_records = knowledge::is_open_records_state(profile);
    let court_video = profile.court_has_video;
    if weights.exclusive_access_bonus {
        if open_records || court_video {
            let bonus = if open_records {
                weights.open_records_region.max(if court_video {
                    weights.court_video_region
                } else {
                    0
                })
            } else {
                weights.court_video_region
            };
            total += bonus;
            signals.push(if open_records {
                "open_records_state".to_string()
            } else {
                "court_has_video".to_string()
            });
        }
    } else {
        if open_records {
            total += weights.open_records_region;
            signals.push("open_records_state".to_string());
        }
        if court_video {
            total += weights.court_video_region;
            signals.push("court_has_video".to_string());
        }
    }

    PrescoreResult {
        score: total,
        threshold: weights.threshold,
        matched_signals: signals,
        passed: total >= weights.threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::jurisdiction_profile;

    fn weights() -> PrescoreWeights {
        PrescoreWeights::default()
    }

    #[test]
    fn bodycam_mention_plus_youtube_link_passes_default_threshold() {
        // Non-bonus region: no open-records or court-video points.
        let profile = jurisdiction_profile("sanfrancisco").unwrap();
        let text = "Newly released bodycam video shows the arrest. Watch at youtube.com/watch?v=x.";
        let result = score(text, "https://example.com/article", &profile, &weights());

        assert_eq!(result.score, 35);
        assert!(result.passed);
        assert!(result.matched_signals.contains(&"keyword:bodycam".to_string()));
        assert!(result.matched_signals.contains(&"video:youtube.com".to_string()));
    }

    #[test]
    fn scoring_is_deterministic() {
        let profile = jurisdiction_profile("broward").unwrap();
        let text = "BSO released body-worn camera footage after the suspect was sentenced.";
        let a = score(text, "https://news.example/x", &profile, &weights());
        let b = score(text, "https://news.example/x", &profile, &weights());
        assert_eq!(a.score, b.score);
        assert_eq!(a.matched_signals, b.matched_signals);
    }

    #[test]
    fn below_threshold_article_fails_with_reason() {
        let profile = jurisdiction_profile("sanfrancisco").unwrap();
        let result = score("City council debates budget.", "https://x.test", &profile, &weights());
        assert_eq!(result.score, 0);
        assert!(!result.passed);
        assert!(result.reject_reason().starts_with("AUTO-REJECT: pre-score 0"));
    }

    #[test]
    fn additive_no_signal_required_alone() {
        // Lifecycle (+5) x2 plus agency (+10) reaches 20 without any
        // artifact keyword.
        let profile = jurisdiction_profile("sanfrancisco").unwrap();
        let text = "SFPD said the man was convicted and sentenced Tuesday.";
        let result = score(text, "https://x.test", &profile, &weights());
        assert_eq!(result.score, 20);
        assert!(result.passed);
    }

    #[test]
    fn access_bonuses_both_apply_by_default() {
        let profile = jurisdiction_profile("broward").unwrap();
        let result = score("nothing relevant", "https://x.test", &profile, &weights());
        // Open records +10, court video +10.
        assert_eq!(result.score, 20);
    }

    #[test]
    fn exclusive_access_bonus_counts_once() {
        let profile = jurisdiction_profile("broward").unwrap();
        let w = PrescoreWeights {
            exclusive_access_bonus: true,
            ..PrescoreWeights::default()
        };
        let result = score("nothing relevant", "https://x.test", &profile, &w);
        assert_eq!(result.score, 10);
    }

    #[test]
    fn keyword_group_counts_once() {
        let profile = jurisdiction_profile("sanfrancisco").unwrap();
        let text = "bodycam bodycam bodycam";
        let result = score(text, "https://x.test", &profile, &weights());
        assert_eq!(result.score, 15);
    }
}
