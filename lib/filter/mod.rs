use serde_json::Value;

use crate::rmc_client::ViolationRecord;
use crate::sink::Row;

/// Decides which fetched violations are worth keeping and turns them into
/// sink rows.
///
/// A ticket is accepted when the user-defined street fields are labelled and
/// populated (so the row can be geocoded later) and its description matches
/// one of the configured violation keywords.
#[derive(Debug, Clone)]
pub struct AcceptanceFilter {
    keywords: Vec<String>,
    locality: String,
}

impl AcceptanceFilter {
    pub fn new(keywords: Vec<String>, locality: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into_iter().map(|kw| kw.to_lowercase()).collect(),
            locality: locality.into(),
        }
    }

    pub fn accepts(&self, record: &ViolationRecord) -> bool {
        if record.userdef1_label.as_deref() != Some("Location") {
            return false;
        }
        if record.userdef8_label.as_deref() != Some("Street Number") {
            return false;
        }
        if usable_street(record.userdef1.as_deref().unwrap_or_default()).is_none() {
            return false;
        }
        if street_text(record.userdef8.as_ref()).is_none() {
            return false;
        }

        let description = record
            .description
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        self.keywords.iter().any(|kw| description.contains(kw))
    }

    /// Builds the output row, concatenating street number and name and
    /// suffixing the locality so the address geocodes unambiguously.
    pub fn extract_row(&self, violation_number: u64, record: &ViolationRecord) -> Row {
        let number = street_text(record.userdef8.as_ref()).unwrap_or_default();
        let name = record.userdef1.as_deref().unwrap_or_default().trim().to_string();
        let mut address = format!("{number} {name}").trim().to_string();
        if !address.is_empty() {
            address = format!("{address}, {}", self.locality);
        }

        Row {
            violation_number,
            date_utc: record
                .date_utc
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .or(record.date.as_deref())
                .unwrap_or_default()
                .to_string(),
            address,
            zonenumber: scalar_text(record.zonenumber.as_ref()),
            lpn: record.lpn.as_deref().unwrap_or_default().to_string(),
            description: record.description.as_deref().unwrap_or_default().to_string(),
        }
    }
}

/// Renders a street field to usable text, rejecting empty and literal
/// "null"/"NULL" values the feed produces for unset fields.
fn street_text(value: Option<&Value>) -> Option<String> {
    usable_street(&scalar_text(value))
}

fn usable_street(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Renders a scalar JSON value without surrounding quotes. Numbers show up in
/// some records where strings do in others.
fn scalar_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
