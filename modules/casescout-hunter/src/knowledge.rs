use casescout_common::{Bucket, CaseFacts};

/// Per-jurisdiction knowledge used by the prescore gate and the funnel.
pub struct JurisdictionProfile {
    pub name: &'static str,
    pub state: &'static str,
    pub agencies: Vec<Agency>,
    /// Whether the local courts stream or publish proceedings.
    pub court_has_video: bool,
    pub court_name: &'static str,
    /// Domains worth constraining semantic fallback search to.
    pub search_domains: Vec<&'static str>,
    /// Local news channels that reliably repost released footage.
    pub news_channels: Vec<&'static str>,
}

/// A law-enforcement agency with its public presence.
pub struct Agency {
    pub name: &'static str,
    pub abbrev: &'static str,
    pub youtube_channel: Option<&'static str>,
    pub transparency_portal: Option<&'static str>,
}

/// States with broad public-records ("sunshine") release practice for
/// police footage.
const OPEN_RECORDS_STATES: [&str; 4] = ["FL", "OH", "WA", "TX"];

/// Domains that host dockets and court records.
const RECORDS_DOMAINS: [&str; 4] = [
    "courtlistener.com",
    "pacer.gov",
    "unicourt.com",
    "judici.com",
];

/// Domains that host dispatch/911 audio archives.
const DISPATCH_DOMAINS: [&str; 2] = ["broadcastify.com", "openmhz.com"];

/// Build the profile for a region key. Returns `None` for regions the
/// registry does not know; callers surface that as an error rather than
/// guessing.
pub fn jurisdiction_profile(region: &str) -> Option<JurisdictionProfile> {
    match region {
        "sanfrancisco" => Some(sanfrancisco_profile()),
        "lakecounty" => Some(lakecounty_profile()),
        "broward" => Some(broward_profile()),
        "miamidade" => Some(miamidade_profile()),
        "franklin" => Some(franklin_profile()),
        _ => None,
    }
}

pub fn supported_regions() -> Vec<&'static str> {
    vec!["sanfrancisco", "lakecounty", "broward", "miamidade", "franklin"]
}

pub fn is_open_records_state(profile: &JurisdictionProfile) -> bool {
    OPEN_RECORDS_STATES.contains(&profile.state)
}

pub fn records_domains() -> &'static [&'static str] {
    &RECORDS_DOMAINS
}

pub fn dispatch_domains() -> &'static [&'static str] {
    &DISPATCH_DOMAINS
}

/// YouTube channel ids of the profile's agencies, for channel-scoped
/// video search.
pub fn agency_channels(profile: &JurisdictionProfile) -> Vec<&'static str> {
    profile
        .agencies
        .iter()
        .filter_map(|a| a.youtube_channel)
        .collect()
}

/// Tokens whose presence in an article counts as an agency match:
/// agency names, abbreviations, and the jurisdiction name itself.
pub fn agency_tokens(profile: &JurisdictionProfile) -> Vec<String> {
    let mut tokens = vec![profile.name.to_lowercase()];
    for agency in &profile.agencies {
        tokens.push(agency.name.to_lowercase());
        tokens.push(agency.abbrev.to_lowercase());
    }
    tokens
}

/// Build the categorized query set for one case. One query per bucket,
/// plus up to two hint queries from intake.
pub fn query_buckets(facts: &CaseFacts, profile: &JurisdictionProfile) -> Vec<(Bucket, String)> {
    let defendant = facts.defendants.first().map(String::as_str).unwrap_or("");
    let year = facts
        .incident_year
        .map(|y| y.to_string())
        .unwrap_or_default();
    let jurisdiction = profile.name;

    let mut queries = vec![
        (
            Bucket::Bodycam,
            format!("{defendant} bodycam footage {jurisdiction} {year}"),
        ),
        (
            Bucket::Interrogation,
            format!("{defendant} interrogation video police interview"),
        ),
        (
            Bucket::Court,
            format!("{defendant} trial sentencing video {}", profile.court_name),
        ),
        (
            Bucket::Docket,
            format!("{defendant} court docket case records {jurisdiction}"),
        ),
        (
            Bucket::Dispatch,
            format!("{defendant} 911 call dispatch audio {jurisdiction} {year}"),
        ),
    ];

    for hint in facts.search_hints.iter().take(2) {
        queries.push((Bucket::Other, format!("{defendant} {hint}")));
    }

    queries
        .into_iter()
        .map(|(b, q)| (b, q.split_whitespace().collect::<Vec<_>>().join(" ")))
        .collect()
}

// ---------------------------------------------------------------------------
// Region profiles
// ---------------------------------------------------------------------------

fn sanfrancisco_profile() -> JurisdictionProfile {
    JurisdictionProfile {
        name: "San Francisco",
        state: "CA",
        agencies: vec![
            Agency {
                name: "San Francisco Police Department",
                abbrev: "SFPD",
                youtube_channel: Some("UCkE9rRCz9WB3q0PkSQDZ1MQ"),
                transparency_portal: Some("https://www.sanfranciscopolice.org/your-sfpd/policies/released-media"),
            },
            Agency {
                name: "San Francisco Sheriff's Office",
                abbrev: "SFSO",
                youtube_channel: None,
                transparency_portal: None,
            },
        ],
        court_has_video: false,
        court_name: "San Francisco Superior Court",
        search_domains: vec!["sanfranciscopolice.org", "sfgov.org"],
        news_channels: vec!["KTVU", "ABC7 News Bay Area", "KPIX"],
    }
}

fn lakecounty_profile() -> JurisdictionProfile {
    JurisdictionProfile {
        name: "Lake County",
        state: "FL",
        agencies: vec![Agency {
            name: "Lake County Sheriff's Office",
            abbrev: "LCSO",
            youtube_channel: Some("UC1xYzW3p0vD5qGk2hRj8nQw"),
            transparency_portal: None,
        }],
        court_has_video: true,
        court_name: "Lake County Courthouse",
        search_domains: vec!["lcso.org", "lakecountyclerk.org"],
        news_channels: vec!["WKMG News 6", "FOX 35 Orlando", "WESH 2 News"],
    }
}

fn broward_profile() -> JurisdictionProfile {
    JurisdictionProfile {
        name: "Broward County",
        state: "FL",
        agencies: vec![
            Agency {
                name: "Broward Sheriff's Office",
                abbrev: "BSO",
                youtube_channel: Some("UCt2lDpeXLeY4vQ6GFdWjBqA"),
                transparency_portal: Some("https://www.sheriff.org/Pages/PublicRecords.aspx"),
            },
            Agency {
                name: "Fort Lauderdale Police Department",
                abbrev: "FLPD",
                youtube_channel: None,
                transparency_portal: None,
            },
        ],
        court_has_video: true,
        court_name: "Broward County Courthouse",
        search_domains: vec!["sheriff.org", "browardclerk.org"],
        news_channels: vec!["WPLG Local 10", "WSVN 7News", "CBS Miami"],
    }
}

fn miamidade_profile() -> JurisdictionProfile {
    JurisdictionProfile {
        name: "Miami-Dade County",
        state: "FL",
        agencies: vec![Agency {
            name: "Miami-Dade Police Department",
            abbrev: "MDPD",
            youtube_channel: None,
            transparency_portal: Some("https://www.miamidade.gov/global/police/public-records.page"),
        }],
        court_has_video: true,
        court_name: "Miami-Dade County Courthouse",
        search_domains: vec!["miamidade.gov", "miamidadeclerk.gov"],
        news_channels: vec!["WPLG Local 10", "NBC 6 South Florida"],
    }
}

fn franklin_profile() -> JurisdictionProfile {
    JurisdictionProfile {
        name: "Franklin County",
        state: "OH",
        agencies: vec![Agency {
            name: "Columbus Division of Police",
            abbrev: "CPD",
            youtube_channel: Some("UCbQx2Vq9yPmLr3sT8wKdGfA"),
            transparency_portal: Some("https://www.columbus.gov/publicsafety/police/Public-Records/"),
        }],
        court_has_video: true,
        court_name: "Franklin County Court of Common Pleas",
        search_domains: vec!["columbus.gov", "fccourts.org"],
        news_channels: vec!["NBC4 Columbus", "10TV"],
    }
}
