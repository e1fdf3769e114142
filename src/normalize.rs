//! Key canonicalization shared by every origin source.
//!
//! Records from the transaction-log store and the marker store disagree on
//! casing and region labels, so every lookup goes through [`CanonicalKey`].

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::catalog::REGION_ALIASES;
use crate::error::{Result, StatusError};
use crate::state_machine::SnapshotType;

const MAX_MESSAGE_ID_LEN: usize = 100;
const MAX_CLIENT_REGION_LEN: usize = 64;

/// (client, region, snapshot, business date) after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalKey {
    pub client: String,
    pub region: String,
    pub snapshot: SnapshotType,
    pub business_date: String,
}

impl CanonicalKey {
    pub fn new<'a>(
        client: &str,
        region: &str,
        snapshot: &str,
        date: impl Into<DateLike<'a>>,
    ) -> Self {
        normalize(client, region, snapshot, date)
    }

    pub fn for_pair(pair: &ClientRegion, snapshot: &SnapshotType, date: NaiveDate) -> Self {
        Self {
            client: pair.client.clone(),
            region: pair.region.clone(),
            snapshot: snapshot.clone(),
            business_date: normalize_date(date),
        }
    }

    pub fn matches_pair(&self, pair: &ClientRegion) -> bool {
        self.client == pair.client && self.region == pair.region
    }
}

/// A validated, normalized (client, region) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientRegion {
    pub client: String,
    pub region: String,
}

impl ClientRegion {
    /// Validates and normalizes a caller-supplied pair.
    pub fn parse(client: &str, region: &str) -> Result<Self> {
        validate_label("client", client)?;
        validate_label("region", region)?;
        Ok(Self {
            client: normalize_client(client),
            region: normalize_region(region),
        })
    }
}

/// Anything that can stand in for a business date.
#[derive(Debug, Clone, Copy)]
pub enum DateLike<'a> {
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Text(&'a str),
}

impl From<NaiveDate> for DateLike<'_> {
    fn from(d: NaiveDate) -> Self {
        DateLike::Date(d)
    }
}

impl From<NaiveDateTime> for DateLike<'_> {
    fn from(t: NaiveDateTime) -> Self {
        DateLike::Timestamp(t)
    }
}

impl From<DateTime<Utc>> for DateLike<'_> {
    fn from(t: DateTime<Utc>) -> Self {
        DateLike::Timestamp(t.naive_utc())
    }
}

impl<'a> From<&'a str> for DateLike<'a> {
    fn from(s: &'a str) -> Self {
        DateLike::Text(s)
    }
}

impl<'a> From<&'a String> for DateLike<'a> {
    fn from(s: &'a String) -> Self {
        DateLike::Text(s.as_str())
    }
}

/// Canonicalizes a (client, region, snapshot, date) tuple.
pub fn normalize<'a>(
    client: &str,
    region: &str,
    snapshot: &str,
    date: impl Into<DateLike<'a>>,
) -> CanonicalKey {
    CanonicalKey {
        client: normalize_client(client),
        region: normalize_region(region),
        snapshot: SnapshotType::parse(snapshot),
        business_date: normalize_date(date),
    }
}

pub fn normalize_client(client: &str) -> String {
    client.trim().to_uppercase()
}

/// Exact alias first, then the upper-cased alias, then trimmed upper-case.
pub fn normalize_region(region: &str) -> String {
    let lookup = |label: &str| {
        REGION_ALIASES
            .iter()
            .find(|(alias, _)| *alias == label)
            .map(|(_, canonical)| canonical.to_string())
    };
    let trimmed = region.trim();
    lookup(trimmed)
        .or_else(|| lookup(&trimmed.to_uppercase()))
        .unwrap_or_else(|| trimmed.to_uppercase())
}

/// Returns `YYYY-MM-DD`. Unparseable text is truncated to its first ten
/// characters instead of failing.
pub fn normalize_date<'a>(date: impl Into<DateLike<'a>>) -> String {
    match date.into() {
        DateLike::Date(d) => d.format("%Y-%m-%d").to_string(),
        DateLike::Timestamp(t) => t.date().format("%Y-%m-%d").to_string(),
        DateLike::Text(s) => match parse_date_text(s) {
            Some(d) => d.format("%Y-%m-%d").to_string(),
            None => s.chars().take(10).collect(),
        },
    }
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.date());
        }
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.date_naive())
}

/// Strict parse for explicitly supplied business dates.
pub fn parse_business_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| StatusError::malformed(format!("invalid business date `{s}`: {e}")))
}

/// Next calendar day, advanced past Saturday and Sunday. Holidays are not considered.
pub fn calculate_sod_date(business_date: NaiveDate) -> NaiveDate {
    let mut sod = business_date + Days::new(1);
    while matches!(sod.weekday(), Weekday::Sat | Weekday::Sun) {
        sod = sod + Days::new(1);
    }
    sod
}

/// Alphanumeric plus `_-:`, between 1 and 100 characters.
pub fn validate_message_id(id: &str) -> Result<()> {
    let valid_len = (1..=MAX_MESSAGE_ID_LEN).contains(&id.len());
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':'));
    if valid_len && valid_chars {
        Ok(())
    } else {
        Err(StatusError::malformed(format!("invalid message id format: `{id}`")))
    }
}

fn validate_label(field: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StatusError::malformed(format!("{field} must not be empty")));
    }
    if trimmed.len() > MAX_CLIENT_REGION_LEN {
        return Err(StatusError::malformed(format!(
            "{field} longer than {MAX_CLIENT_REGION_LEN} characters"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(StatusError::malformed(format!(
            "{field} contains control characters"
        )));
    }
    Ok(())
}
