//! Stratum protocol message definitions
//!
//! Inbound requests are decoded leniently: a missing `id` is echoed back as
//! `null` and a missing or non-array `params` reads as an empty list, so
//! positional lookups fall back to [`PLACEHOLDER`] instead of failing.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Stand-in for positional params the client left out
pub const PLACEHOLDER: &str = "?";

/// Error code sent with rejected shares
pub const REJECTED_CODE: i64 = 25;

/// Error message sent with rejected shares
pub const REJECTED_MESSAGE: &str = "Rejected";

/// Stratum protocol methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StratumMethod {
    /// Client subscribes to mining notifications
    Subscribe,
    /// Client authorizes with credentials
    Authorize,
    /// Client asks for extranonce change notifications
    ExtranonceSubscribe,
    /// Client submits a share
    Submit,
    /// Server notifies client of new work
    Notify,
    /// Server sets share difficulty
    SetDifficulty,
    /// Unknown or absent method
    Unknown(String),
}

impl StratumMethod {
    /// Parse method from string
    pub fn parse_method(s: &str) -> Self {
        match s {
            "mining.subscribe" => Self::Subscribe,
            "mining.authorize" => Self::Authorize,
            "mining.extranonce.subscribe" => Self::ExtranonceSubscribe,
            "mining.submit" => Self::Submit,
            "mining.notify" => Self::Notify,
            "mining.set_difficulty" => Self::SetDifficulty,
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Subscribe => "mining.subscribe",
            Self::Authorize => "mining.authorize",
            Self::ExtranonceSubscribe => "mining.extranonce.subscribe",
            Self::Submit => "mining.submit",
            Self::Notify => "mining.notify",
            Self::SetDifficulty => "mining.set_difficulty",
            Self::Unknown(s) => s,
        }
    }
}

/// Stratum request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumRequest {
    /// Request ID
    #[serde(default)]
    pub id: Value,
    /// Method name
    #[serde(default)]
    pub method: Option<String>,
    /// Method parameters
    #[serde(default, deserialize_with = "lenient_params")]
    pub params: Vec<Value>,
}

fn lenient_params<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(params) => Ok(params),
        _ => Ok(Vec::new()),
    }
}

impl StratumRequest {
    /// Create a new request
    pub fn new(id: impl Into<Value>, method: &str, params: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            method: Some(method.to_string()),
            params,
        }
    }

    /// Parse one line of JSON into a request
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Get the method as enum
    pub fn method_enum(&self) -> StratumMethod {
        StratumMethod::parse_method(self.method.as_deref().unwrap_or_default())
    }

    /// Positional parameter as text, or [`PLACEHOLDER`] when absent
    pub fn param_str(&self, index: usize) -> String {
        match self.params.get(index) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => PLACEHOLDER.to_string(),
        }
    }
}

/// Stratum response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumResponse {
    /// Request ID this responds to
    pub id: Value,
    /// Result, `null` on error
    pub result: Value,
    /// Error, omitted on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl StratumResponse {
    /// Create a successful response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    /// Create the share rejection response
    pub fn rejected(id: Value) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(Value::Array(vec![
                Value::from(REJECTED_CODE),
                Value::from(REJECTED_MESSAGE),
            ])),
        }
    }
}

/// Stratum notification (server push without an ID)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumNotification {
    /// Method name
    pub method: String,
    /// Method parameters
    pub params: Vec<Value>,
}

impl StratumNotification {
    /// Create a new notification
    pub fn new(method: StratumMethod, params: Vec<Value>) -> Self {
        Self {
            method: method.as_str().to_string(),
            params,
        }
    }

    /// `mining.set_difficulty`
    pub fn set_difficulty(difficulty: f64) -> Self {
        Self::new(StratumMethod::SetDifficulty, vec![Value::from(difficulty)])
    }
}
