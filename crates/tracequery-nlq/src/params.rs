//! Structured trace search parameters extracted from natural language.
//!
//! Every field is optional so that "not mentioned in the query" (`None`) stays
//! distinguishable from an explicit value such as `error: false`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::duration::{parse_duration, DurationError};

/// Upper bound on `limit`, matching the trace query API.
pub const MAX_LIMIT: i64 = 1000;
pub const MIN_LIMIT: i64 = 1;

/// Search parameters as emitted by the model.
///
/// JSON field names follow the prompt vocabulary (`service`, `operation`,
/// `tags`, `minDuration`, `maxDuration`, `error`, `limit`). Decoding also
/// accepts the capitalized and all-lowercase spellings models tend to emit.
/// Unknown fields are ignored; a field given twice under two spellings is a
/// decode error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Filters traces by service name.
    #[serde(
        rename = "service",
        alias = "Service",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub service_name: Option<String>,

    /// Filters traces by operation (span) name.
    #[serde(
        rename = "operation",
        alias = "Operation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,

    /// Key-value attribute filters, e.g. `{"http.status_code": "500"}`.
    #[serde(
        alias = "Tags",
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub tags: BTreeMap<String, String>,

    /// Traces with duration >= this literal.
    #[serde(
        rename = "minDuration",
        alias = "MinDuration",
        alias = "minduration",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub min_duration: Option<String>,

    /// Traces with duration <= this literal.
    #[serde(
        rename = "maxDuration",
        alias = "MaxDuration",
        alias = "maxduration",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_duration: Option<String>,

    /// `true` = only error traces, `false` = only successful ones.
    #[serde(alias = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,

    /// Result count, `1..=1000` when present.
    #[serde(alias = "Limit", default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid {field} '{value}': {source}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: DurationError,
    },
    #[error("minDuration ({min}) cannot exceed maxDuration ({max})")]
    DurationOrder { min: String, max: String },
    #[error("limit must be at least 1, got {0}")]
    LimitTooLow(i64),
    #[error("limit cannot exceed 1000, got {0}")]
    LimitTooHigh(i64),
}

impl ValidationError {
    /// JSON name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidDuration { field, .. } => field,
            Self::DurationOrder { .. } => "minDuration",
            Self::LimitTooLow(_) | Self::LimitTooHigh(_) => "limit",
        }
    }
}

/// How the `error` flag is carried into downstream projections.
///
/// The trace query API has no dedicated error filter, so the default is to
/// leave it out and let the caller decide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorProjection {
    #[default]
    Omit,
    /// `error == Some(true)` becomes the tag `error=true`.
    Tag,
}

impl ErrorProjection {
    fn error_tag(self, error: Option<bool>) -> Option<(&'static str, &'static str)> {
        match (self, error) {
            (Self::Tag, Some(true)) => Some(("error", "true")),
            _ => None,
        }
    }
}

/// Field values for the trace search form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_limit: Option<String>,
    /// Tags in logfmt: `key=value key2="spaced value"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

impl SearchParams {
    /// Check semantic rules: parseable durations, `min <= max`, limit range.
    ///
    /// Reports the first violation found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let min = parse_field("minDuration", self.min_duration.as_deref())?;
        let max = parse_field("maxDuration", self.max_duration.as_deref())?;

        if let (Some(min_d), Some(max_d)) = (min, max) {
            if min_d > max_d {
                return Err(ValidationError::DurationOrder {
                    min: self.min_duration.clone().unwrap_or_default(),
                    max: self.max_duration.clone().unwrap_or_default(),
                });
            }
        }

        if let Some(limit) = self.limit {
            if limit < MIN_LIMIT {
                return Err(ValidationError::LimitTooLow(limit));
            }
            if limit > MAX_LIMIT {
                return Err(ValidationError::LimitTooHigh(limit));
            }
        }

        Ok(())
    }

    /// Project present fields for the trace query API.
    ///
    /// Empty tag maps and the `error` flag are left out.
    pub fn to_query_map(&self) -> Map<String, Value> {
        self.to_query_map_with(ErrorProjection::Omit)
    }

    pub fn to_query_map_with(&self, projection: ErrorProjection) -> Map<String, Value> {
        let mut out = Map::new();

        if let Some(service) = &self.service_name {
            out.insert("service".to_string(), json!(service));
        }
        if let Some(operation) = &self.operation_name {
            out.insert("operation".to_string(), json!(operation));
        }
        if let Some(min) = &self.min_duration {
            out.insert("minDuration".to_string(), json!(min));
        }
        if let Some(max) = &self.max_duration {
            out.insert("maxDuration".to_string(), json!(max));
        }

        let tags = self.projected_tags(projection);
        if !tags.is_empty() {
            out.insert("tags".to_string(), json!(tags));
        }

        if let Some(limit) = self.limit {
            out.insert("limit".to_string(), json!(limit));
        }

        out
    }

    /// Map onto the search form fields, rendering tags as logfmt.
    pub fn to_search_form(&self, projection: ErrorProjection) -> SearchForm {
        // User tags in key order; the error tag always goes last.
        let mut pairs: Vec<String> = self
            .tags
            .iter()
            .map(|(k, v)| format!("{k}={}", logfmt_value(v)))
            .collect();
        if let Some((k, v)) = projection.error_tag(self.error) {
            if !self.tags.contains_key(k) {
                pairs.push(format!("{k}={v}"));
            }
        }
        let tags = (!pairs.is_empty()).then(|| pairs.join(" "));

        SearchForm {
            service: self.service_name.clone(),
            operation: self.operation_name.clone(),
            min_duration: self.min_duration.clone(),
            max_duration: self.max_duration.clone(),
            results_limit: self.limit.map(|l| l.to_string()),
            tags,
        }
    }

    /// True when nothing was extracted from the query.
    pub fn is_empty(&self) -> bool {
        self.service_name.is_none()
            && self.operation_name.is_none()
            && self.tags.is_empty()
            && self.min_duration.is_none()
            && self.max_duration.is_none()
            && self.error.is_none()
            && self.limit.is_none()
    }

    /// Parsed `minDuration`, zero when absent or unparseable.
    pub fn min_duration(&self) -> Duration {
        parsed_or_zero(self.min_duration.as_deref())
    }

    /// Parsed `maxDuration`, zero when absent or unparseable.
    pub fn max_duration(&self) -> Duration {
        parsed_or_zero(self.max_duration.as_deref())
    }

    fn projected_tags(&self, projection: ErrorProjection) -> BTreeMap<&str, &str> {
        let mut tags: BTreeMap<&str, &str> = self
            .tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some((k, v)) = projection.error_tag(self.error) {
            tags.entry(k).or_insert(v);
        }
        tags
    }
}

fn parse_field(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<Duration>, ValidationError> {
    value
        .map(|v| {
            parse_duration(v).map_err(|source| ValidationError::InvalidDuration {
                field,
                value: v.to_string(),
                source,
            })
        })
        .transpose()
}

fn parsed_or_zero(value: Option<&str>) -> Duration {
    value
        .and_then(|v| parse_duration(v).ok())
        .unwrap_or(Duration::ZERO)
}

fn logfmt_value(value: &str) -> String {
    if value.contains(' ') {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}
