use std::collections::HashMap;

use casescout_common::{CaseFacts, CaseKey};

/// Name suffixes dropped before taking the surname.
const NAME_SUFFIXES: [&str; 6] = ["jr", "sr", "ii", "iii", "iv", "esq"];

/// Fixed abbreviation expansions applied before punctuation stripping.
/// Matched against whole tokens only, never substrings.
const ABBREVIATIONS: [(&str, &str); 4] = [
    ("co.", "county"),
    ("st.", "saint"),
    ("ft.", "fort"),
    ("mt.", "mount"),
];

/// Lowercase, expand known abbreviations, strip punctuation, collapse
/// whitespace. The shared normalization under every key form.
pub fn normalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let expanded = lower
        .split_whitespace()
        .map(|token| {
            let word = token
                .trim_start_matches(|c: char| !c.is_alphanumeric())
                .trim_end_matches(|c: char| !c.is_alphanumeric() && c != '.');
            ABBREVIATIONS
                .iter()
                .find(|(abbr, _)| *abbr == word)
                .map(|(_, full)| *full)
                .unwrap_or(token)
        })
        .collect::<Vec<_>>()
        .join(" ");
    expanded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Surname of a full name, ignoring generational and title suffixes.
pub fn surname(full_name: &str) -> Option<String> {
    normalize(full_name)
        .split_whitespace()
        .map(str::to_string)
        .filter(|t| !NAME_SUFFIXES.contains(&t.as_str()))
        .next_back()
}

/// Derive the dedup key for a case. A docket/case number, when present,
/// is authoritative; otherwise surname + jurisdiction head token + year.
/// Deterministic and insensitive to case, punctuation, and spacing.
pub fn derive_key(facts: &CaseFacts) -> CaseKey {
    if let Some(number) = facts.case_number.as_deref().filter(|n| !n.trim().is_empty()) {
        let normalized: String = number
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        return CaseKey(format!("case:{normalized}"));
    }

    let last = facts
        .defendants
        .first()
        .and_then(|n| surname(n))
        .unwrap_or_else(|| "unknown".to_string());
    let jurisdiction = normalize(&facts.jurisdiction)
        .split_whitespace()
        .next()
        .unwrap_or("unknown")
        .to_string();
    let year = facts
        .incident_year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    CaseKey(format!("{last}_{jurisdiction}_{year}"))
}

/// Where a known key came from, for duplicate flagging.
#[derive(Debug, Clone)]
pub struct KeyOrigin {
    /// Store reference of the case that owns the key (e.g. a row id).
    pub source: String,
}

/// The explicit read set of keys known at run start, plus an append log
/// of keys assessed during this run. No ambient global state: a queue
/// run owns exactly one of these.
#[derive(Debug, Default)]
pub struct KnownKeys {
    seen: HashMap<CaseKey, KeyOrigin>,
    appended: Vec<CaseKey>,
}

impl KnownKeys {
    /// The first origin listed for a key wins; later claims of the
    /// same key are the duplicates.
    pub fn load(entries: Vec<(CaseKey, KeyOrigin)>) -> Self {
        let mut seen = HashMap::new();
        for (key, origin) in entries {
            seen.entry(key).or_insert(origin);
        }
        Self {
            seen,
            appended: Vec::new(),
        }
    }

    /// `Some(origin)` when the key is already claimed. Colliding cases
    /// are never merged; the newcomer gets flagged as a duplicate of
    /// the origin.
    pub fn check_duplicate(&self, key: &CaseKey) -> Option<&KeyOrigin> {
        self.seen.get(key)
    }

    pub fn append(&mut self, key: CaseKey, origin: KeyOrigin) {
        if !self.seen.contains_key(&key) {
            self.appended.push(key.clone());
            self.seen.insert(key, origin);
        }
    }

    /// Keys added during this run, in insertion order.
    pub fn appended(&self) -> &[CaseKey] {
        &self.appended
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
