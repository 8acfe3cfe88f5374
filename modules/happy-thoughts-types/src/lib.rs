//! Shared types for the happy thoughts service and its HTTP clients.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

/// Inclusive bounds on a thought's message, counted in UTF-16 code units.
pub const MESSAGE_MIN_LEN: usize = 5;
pub const MESSAGE_MAX_LEN: usize = 140;

/// How many thoughts `GET /thoughts` returns.
pub const RECENT_THOUGHTS_LIMIT: usize = 20;

// =====================================================
// Domain Types
// =====================================================

/// Store-generated identifier: 4 bytes of creation seconds, 5 bytes fixed
/// per process, 3 bytes of a wrapping counter. Rendered as 24 hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThoughtId([u8; 12]);

impl ThoughtId {
    pub fn generate() -> Self {
        static PROCESS_BYTES: OnceLock<[u8; 5]> = OnceLock::new();
        static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

        let process = PROCESS_BYTES.get_or_init(rand::random);
        let count = COUNTER
            .get_or_init(|| AtomicU32::new(rand::random::<u32>() & 0x00ff_ffff))
            .fetch_add(1, Ordering::Relaxed);
        let secs = Utc::now().timestamp() as u32;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Parses a 24-char hex id. Anything else is malformed and yields `None`.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 24 {
            return None;
        }
        let bytes = hex::decode(s).ok()?;
        <[u8; 12]>::try_from(bytes.as_slice()).ok().map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ThoughtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ThoughtId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ThoughtId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ThoughtId::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid thought id: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    #[serde(rename = "_id")]
    pub id: ThoughtId,
    pub message: String,
    pub hearts: i64,
    #[serde(rename = "createdAt", with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// A thought that passed validation and is ready to be inserted.
/// Only `CreateThoughtRequest::validate` builds one.
#[derive(Debug, Clone, PartialEq)]
pub struct NewThought {
    message: String,
    hearts: i64,
    created_at: DateTime<Utc>,
}

impl NewThought {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn hearts(&self) -> i64 {
        self.hearts
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Timestamps travel as RFC 3339 with millisecond precision, e.g.
/// `2024-05-01T12:00:00.000Z`.
mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Drops sub-millisecond precision so stored and returned values agree.
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

// =====================================================
// Validation
// =====================================================

/// One failed check on one field of a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// `ValidatorError` for rule failures, `CastError` for type failures.
    pub name: String,
    pub message: String,
    pub kind: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FieldError {
    fn required(path: &str) -> Self {
        Self {
            name: "ValidatorError".to_string(),
            message: format!("Path `{}` is required.", path),
            kind: "required".to_string(),
            path: path.to_string(),
            value: None,
        }
    }

    fn too_short(path: &str, value: &str, min: usize) -> Self {
        Self {
            name: "ValidatorError".to_string(),
            message: format!(
                "Path `{}` (`{}`) is shorter than the minimum allowed length ({}).",
                path, value, min
            ),
            kind: "minlength".to_string(),
            path: path.to_string(),
            value: Some(Value::String(value.to_string())),
        }
    }

    fn too_long(path: &str, value: &str, max: usize) -> Self {
        Self {
            name: "ValidatorError".to_string(),
            message: format!(
                "Path `{}` (`{}`) is longer than the maximum allowed length ({}).",
                path, value, max
            ),
            kind: "maxlength".to_string(),
            path: path.to_string(),
            value: Some(Value::String(value.to_string())),
        }
    }

    fn cast(path: &str, kind: &str, value: &Value) -> Self {
        Self {
            name: "CastError".to_string(),
            message: format!(
                "Cast to {} failed for value {} (type {}) at path \"{}\"",
                kind,
                value,
                json_type_name(value),
                path
            ),
            kind: kind.to_string(),
            path: path.to_string(),
            value: Some(value.clone()),
        }
    }
}

/// Field-level failures keyed by field path. Serializes as a plain object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, FieldError>);

impl ValidationErrors {
    fn add(&mut self, error: FieldError) {
        self.0.insert(error.path.clone(), error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, path: &str) -> Option<&FieldError> {
        self.0.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.values()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.iter().map(|e| e.message.as_str()).collect();
        write!(f, "{}", messages.join(", "))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

/// Length as clients in the browser measure it: UTF-16 code units.
pub fn message_len(message: &str) -> usize {
    message.encode_utf16().count()
}

fn cast_hearts(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn cast_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    // date-only strings mean midnight UTC
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|dt| dt.and_utc())
                })
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

// =====================================================
// HTTP Request Types
// =====================================================

/// Body of `POST /thoughts`. `hearts` and `createdAt` stay raw until
/// validation so bad values are reported per field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateThoughtRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hearts: Option<Value>,
    #[serde(default, rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
}

impl CreateThoughtRequest {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Checks every field, collecting all failures, and fills in defaults
    /// (`hearts` = 0, `createdAt` = now).
    pub fn validate(self) -> Result<NewThought, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        match self.message.as_deref() {
            None | Some("") => errors.add(FieldError::required("message")),
            Some(m) => {
                let len = message_len(m);
                if len < MESSAGE_MIN_LEN {
                    errors.add(FieldError::too_short("message", m, MESSAGE_MIN_LEN));
                } else if len > MESSAGE_MAX_LEN {
                    errors.add(FieldError::too_long("message", m, MESSAGE_MAX_LEN));
                }
            }
        }

        let hearts = match &self.hearts {
            None => Some(0),
            Some(v) => {
                let cast = cast_hearts(v);
                if cast.is_none() {
                    errors.add(FieldError::cast("hearts", "Number", v));
                }
                cast
            }
        };

        let created_at = match &self.created_at {
            None => Some(Utc::now()),
            Some(v) => {
                let cast = cast_timestamp(v);
                if cast.is_none() {
                    errors.add(FieldError::cast("createdAt", "Date", v));
                }
                cast
            }
        };

        match (self.message, hearts, created_at) {
            (Some(message), Some(hearts), Some(created_at)) if errors.is_empty() => Ok(NewThought {
                message,
                hearts,
                created_at: truncate_to_millis(created_at),
            }),
            _ => Err(errors),
        }
    }
}

// =====================================================
// HTTP Response Types
// =====================================================

/// Body of a successful `PATCH /thoughts/:thoughtId/like`.
#[derive(Debug, Serialize, Deserialize)]
pub struct LikeResponse {
    pub message: String,
    #[serde(rename = "thoughtsId")]
    pub thought: Thought,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Serialize) -> Self {
        self.error = serde_json::to_value(error).ok();
        self
    }
}

/// One entry of the `GET /` route listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub path: String,
    pub methods: Vec<String>,
}
