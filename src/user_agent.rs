//! User-Agent strings for the two fetch profiles.
//!
//! The basic profile identifies the tool; the browser profile presents a
//! desktop browser so that listing pages render the same markup a visitor sees.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/court-monitor";

/// Desktop browser User-Agent pool for the browser profile.
const BROWSER_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
];

/// Default User-Agent for basic fetches (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("court-monitor/{version} (document-archiver; +{PROJECT_UA_URL})")
}

/// Picks one browser User-Agent for the lifetime of a browser session.
#[must_use]
pub(crate) fn browser_user_agent() -> &'static str {
    use rand::seq::SliceRandom;

    BROWSER_USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(BROWSER_USER_AGENTS[0])
}
