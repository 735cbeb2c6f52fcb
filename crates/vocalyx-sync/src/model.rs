//! Wire types shared by the REST and stream surfaces.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Placeholder the backend and the dashboard use for a secret that has not been revealed.
pub const MASKED_SECRET: &str = "NON_VISIBLE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, deserialize_with = "optional_id")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Project {
    /// The revealed secret, if the backend returned a real one.
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty() && *key != MASKED_SECRET)
    }
}

/// Back-reference from a user to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    #[serde(deserialize_with = "required_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "required_id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub projects: Vec<ProjectRef>,
}

impl User {
    #[must_use]
    pub fn has_project(&self, project_id: &str) -> bool {
        self.projects.iter().any(|project| project.id == project_id)
    }
}

/// Transcription job status used by the dashboard filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
    Error,
    Other(String),
}

impl JobStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Other(value) => value.as_str(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "done" => Self::Done,
            "failed" => Self::Failed,
            "error" => Self::Error,
            _ => Self::Other(value.trim().to_string()),
        })
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let Ok(status) = raw.parse::<JobStatus>();
        Ok(status)
    }
}

/// One page of transcription jobs plus the total used for pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionPage {
    pub items: Value,
    pub total: u64,
}

/// Decode the count endpoint, which answers `{"count": n}`, `{"total": n}` or a bare number.
pub(crate) fn decode_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::Object(map) => map
            .get("count")
            .or_else(|| map.get("total"))
            .and_then(Value::as_u64),
        _ => None,
    }
}

// Ids arrive as strings from some endpoints and integers from others.
fn id_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn required_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    id_to_string(Value::deserialize(deserializer)?)
        .ok_or_else(|| serde::de::Error::custom("expected string or integer id"))
}

fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(id_to_string(Value::deserialize(deserializer)?))
}

// Timestamps come with or without an offset; naive ones are taken as UTC.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    Ok(NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc()))
}
