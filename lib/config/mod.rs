use std::env;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use nonzero_ext::nonzero;
use thiserror::Error;

use crate::scan::types::{BackoffPolicy, ScanPolicy};

/// Violation descriptions we accept as real, locatable tickets. Tow fees and
/// other administrative charges carry no street address and are filtered out.
const DEFAULT_KEYWORDS: &[&str] = &[
    "resident permit only",
    "no stopping or standing",
    "meter fee unpaid",
    "no valid",
    "within 20 feet of intersection",
    "hydrant",
    "driveway",
    "sidewalk",
    "bike or bus lane",
    "over posted limit",
    "double parking",
    "no parking",
    "parking only",
    "street cleaning",
];

const DEFAULT_BASE_URL: &str = "https://bostonma.rmcpay.com";
const DEFAULT_OPERATOR_ID: &str = "1582";
const DEFAULT_START_VID: u64 = 831_394_104;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Runtime configuration, resolved from the environment with defaults that
/// match the production Boston deployment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the RMC violation-lookup host.
    pub base_url: String,
    /// Operator ID baked into every search query.
    pub operator_id: String,
    /// Directory holding the cursor-state file and the seen-VID set.
    pub state_dir: PathBuf,
    /// Output CSV of accepted tickets.
    pub csv_path: PathBuf,
    /// First violation number of the identifier space.
    pub start_position: u64,
    /// VIDs scanned per invocation.
    pub chunk_size: u64,
    /// Re-scans of a window before advancing past it.
    pub pass_limit: u32,
    /// Consecutive gaps that trigger a rollback.
    pub gap_threshold: u32,
    /// Consecutive 403s that end the invocation early.
    pub forbidden_run_limit: u32,
    /// Pending rows flushed to the CSV once this many accumulate.
    pub batch_size: usize,
    /// Politeness budget for the remote API.
    pub requests_per_second: NonZeroU32,
    pub request_timeout: Duration,
    /// Lowercased description keywords accepted by the filter.
    pub keywords: Vec<String>,
    /// Locality appended to extracted addresses for geocoding.
    pub locality: String,
    /// Whether a fetched-but-rejected ticket still counts toward gap pressure.
    pub rejected_counts_toward_gap: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_string("RMC_BASE_URL", DEFAULT_BASE_URL),
            operator_id: env_string("RMC_OPERATOR_ID", DEFAULT_OPERATOR_ID),
            state_dir: PathBuf::from(env_string("STATE_DIR", ".")),
            csv_path: PathBuf::from(env_string("CSV_OUT", "filtered_boston_tickets.csv")),
            start_position: env_parsed("START_VID", DEFAULT_START_VID)?,
            chunk_size: env_parsed("CHUNK_SIZE", 1000)?,
            pass_limit: env_parsed("PASS_LIMIT", 2)?,
            gap_threshold: env_parsed("GAP_THRESHOLD", 10_000)?,
            forbidden_run_limit: env_parsed("FORBIDDEN_RUN_LIMIT", 5)?,
            batch_size: env_parsed("BATCH_SIZE", 10)?,
            requests_per_second: env_nonzero("REQUESTS_PER_SECOND", nonzero!(100u32))?,
            request_timeout: Duration::from_secs(env_parsed("REQUEST_TIMEOUT_SECS", 12)?),
            keywords: env_keywords(),
            locality: env_string("LOCALITY", "Boston, MA"),
            rejected_counts_toward_gap: env_parsed("COUNT_REJECTED_AS_GAP", true)?,
        })
    }

    pub fn scan_policy(&self) -> ScanPolicy {
        ScanPolicy {
            start_position: self.start_position,
            chunk_size: self.chunk_size,
            gap_threshold: self.gap_threshold,
            pass_limit: self.pass_limit,
            forbidden_run_limit: self.forbidden_run_limit,
            batch_size: self.batch_size,
            rejected_counts_toward_gap: self.rejected_counts_toward_gap,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Default acceptance keywords, exposed for filter construction and tests.
pub fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|kw| kw.to_string()).collect()
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn env_nonzero(key: &str, default: NonZeroU32) -> Result<NonZeroU32, ConfigError> {
    let value: u32 = env_parsed(key, default.get())?;
    NonZeroU32::new(value).ok_or_else(|| ConfigError::Invalid {
        key: key.to_string(),
        value: "0".to_string(),
    })
}

fn env_keywords() -> Vec<String> {
    match env::var("KEYWORDS") {
        Ok(raw) => raw
            .split(',')
            .map(|kw| kw.trim().to_lowercase())
            .filter(|kw| !kw.is_empty())
            .collect(),
        Err(_) => default_keywords(),
    }
}
