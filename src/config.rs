use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use crate::retry::RetryPolicy;
use crate::{Error, Result};

pub const DATASET_URL: &str = "https://data.cityofchicago.org/resource/wrvz-psew.csv";
pub const COUNT_URL: &str =
    "https://data.cityofchicago.org/resource/wrvz-psew.json?$select=count(trip_id)";
pub const TOKEN_ENV: &str = "MY_ACCESS_TOKEN";
pub const PAGE_LIMIT: u64 = 5000;
pub const MAX_CONCURRENT_REQUESTS: usize = 5;
/// The service rejects offsets much past this.
pub const MAX_OFFSET: u64 = 50_000;
/// Assumed row count when the count probe fails.
pub const FALLBACK_TOTAL_ROWS: u64 = 2_000_000;
pub const OUTPUT_FILENAME: &str = "Chicago_taxi_trip_authenticated_full.csv";

pub const PODCAST_API_BASE: &str = "https://api.podchaser.com";
pub const PODCAST_TOKEN_ENV: &str = "PODCHASER_TOKEN";
pub const PODCAST_ID: u64 = 72263;

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AuthScheme {
    #[default]
    #[value(name = "oauth")]
    OAuth,
    Bearer,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::OAuth => f.write_str("OAuth"),
            AuthScheme::Bearer => f.write_str("Bearer"),
        }
    }
}

/// Accepts a token only if it has non-whitespace content.
fn require_token(token: Option<String>, env_name: &'static str) -> Result<String> {
    match token.map(|t| t.trim().to_string()) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(Error::MissingCredential(env_name)),
    }
}

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub dataset_url: String,
    pub count_url: String,
    pub token: String,
    pub auth_scheme: AuthScheme,
    pub page_size: u64,
    pub max_concurrency: usize,
    pub max_offset: u64,
    pub fallback_total_rows: u64,
    pub order: String,
    pub request_timeout: Duration,
    pub output: PathBuf,
    pub report: Option<PathBuf>,
    pub retry: RetryPolicy,
    pub show_progress: bool,
}

impl DatasetConfig {
    /// Builds a config with the default endpoints and tuning.
    ///
    /// Fails with [`Error::MissingCredential`] if `token` is absent or blank.
    pub fn new(token: Option<String>) -> Result<Self> {
        Ok(Self {
            dataset_url: DATASET_URL.to_string(),
            count_url: COUNT_URL.to_string(),
            token: require_token(token, TOKEN_ENV)?,
            auth_scheme: AuthScheme::default(),
            page_size: PAGE_LIMIT,
            max_concurrency: MAX_CONCURRENT_REQUESTS,
            max_offset: MAX_OFFSET,
            fallback_total_rows: FALLBACK_TOTAL_ROWS,
            order: ":id".to_string(),
            request_timeout: Duration::from_secs(60),
            output: PathBuf::from(OUTPUT_FILENAME),
            report: None,
            retry: RetryPolicy::default(),
            show_progress: true,
        })
    }

    pub fn authorization(&self) -> String {
        format!("{} {}", self.auth_scheme, self.token)
    }
}

#[derive(Debug, Clone)]
pub struct PodcastConfig {
    pub api_base: String,
    pub token: String,
    pub podcast_id: u64,
    pub page_size: u32,
    pub max_pages: u32,
    /// Pause after every episode.
    pub delay: Duration,
    pub request_timeout: Duration,
    pub episodes_output: PathBuf,
    pub transcripts_output: PathBuf,
    pub retry: RetryPolicy,
}

impl PodcastConfig {
    pub fn new(token: Option<String>) -> Result<Self> {
        Ok(Self {
            api_base: PODCAST_API_BASE.to_string(),
            token: require_token(token, PODCAST_TOKEN_ENV)?,
            podcast_id: PODCAST_ID,
            page_size: 20,
            max_pages: 99,
            delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            episodes_output: PathBuf::from("episodes.csv"),
            transcripts_output: PathBuf::from("transcripts.csv"),
            retry: RetryPolicy::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_is_rejected() {
        assert!(matches!(
            DatasetConfig::new(None),
            Err(Error::MissingCredential(TOKEN_ENV))
        ));
        assert!(matches!(
            DatasetConfig::new(Some("   ".into())),
            Err(Error::MissingCredential(_))
        ));
        assert!(matches!(
            PodcastConfig::new(Some(String::new())),
            Err(Error::MissingCredential(PODCAST_TOKEN_ENV))
        ));
    }

    #[test]
    fn authorization_uses_scheme() {
        let mut config = DatasetConfig::new(Some(" abc ".into())).unwrap();
        assert_eq!(config.authorization(), "OAuth abc");
        config.auth_scheme = AuthScheme::Bearer;
        assert_eq!(config.authorization(), "Bearer abc");
    }
}
