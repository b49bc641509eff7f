use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;

const SEARCH_PATH: &str = "/rmcapi/api/violation_index.php/searchviolation";

#[derive(Error, Debug)]
pub enum RmcClientError {
    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("unexpected HTTP status while searching violation {violation_number}: {status}")]
    UnexpectedStatus { violation_number: u64, status: u16 },

    #[error("unparsable search payload for violation {violation_number}: {detail}")]
    MalformedBody { violation_number: u64, detail: String },
}

/// One violation as returned by the search endpoint. The API exposes street
/// data through user-defined fields whose labels must be checked before the
/// values mean anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    #[serde(default)]
    pub date_utc: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub userdef1_label: Option<String>,
    /// Street name when `userdef1_label` is "Location".
    #[serde(default)]
    pub userdef1: Option<String>,
    #[serde(default)]
    pub userdef8_label: Option<String>,
    /// Street number when `userdef8_label` is "Street Number". Arrives as a
    /// string or a bare number depending on the record.
    #[serde(default)]
    pub userdef8: Option<Value>,
    #[serde(default)]
    pub zonenumber: Option<Value>,
    #[serde(default)]
    pub lpn: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ViolationRecord {
    /// Parses the record timestamp, preferring `date_utc` over `date`.
    ///
    /// The feed emits RFC 3339 with a trailing `Z`, but older records use a
    /// bare local-format datetime, which we read as UTC.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self
            .date_utc
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.date.as_deref())?;
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }

        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
            }
        }
        None
    }
}

/// HTTP client for the RMC violation-lookup endpoint.
pub struct RmcClient {
    client: reqwest::Client,
    base_url: String,
    operator_id: String,
}

impl RmcClient {
    pub fn new(config: &Config) -> Result<Self, RmcClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        let referer = format!("{}/", config.base_url.trim_end_matches('/'));
        headers.insert(
            REFERER,
            HeaderValue::from_str(&referer)
                .map_err(|err| RmcClientError::Config(format!("bad referer {referer:?}: {err}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            operator_id: config.operator_id.clone(),
        })
    }

    /// Looks up one violation number.
    ///
    /// `Ok(None)` means the lookup succeeded but returned no record. Status
    /// and body problems surface as errors for the caller to classify.
    pub async fn search_violation(
        &self,
        violation_number: u64,
    ) -> Result<Option<ViolationRecord>, RmcClientError> {
        let url = self.search_url(violation_number);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RmcClientError::UnexpectedStatus {
                violation_number,
                status: status.as_u16(),
            });
        }

        let payload =
            response
                .json::<Value>()
                .await
                .map_err(|err| RmcClientError::MalformedBody {
                    violation_number,
                    detail: err.to_string(),
                })?;
        parse_search_payload(violation_number, payload)
    }

    fn search_url(&self, violation_number: u64) -> String {
        format!(
            "{base}{path}?operatorid={operator}&violationnumber={violation_number}\
             &stateid=&lpn=&vin=&plate_type_id=&devicenumber=&payment_plan_id=\
             &immobilization_id=&single_violation=0&omsessiondata=&",
            base = self.base_url,
            path = SEARCH_PATH,
            operator = self.operator_id,
        )
    }
}

/// Extracts the primary record from a successful search payload.
///
/// A missing or empty `data` array is a legitimate "no record here" answer.
/// A `data` entry that doesn't decode as a violation is a malformed body.
pub fn parse_search_payload(
    violation_number: u64,
    payload: Value,
) -> Result<Option<ViolationRecord>, RmcClientError> {
    let first = payload
        .get("data")
        .and_then(Value::as_array)
        .and_then(|data| data.first())
        .cloned();

    match first {
        None => Ok(None),
        Some(entry) => serde_json::from_value(entry)
            .map(Some)
            .map_err(|err| RmcClientError::MalformedBody {
                violation_number,
                detail: err.to_string(),
            }),
    }
}
