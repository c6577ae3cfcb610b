//! Core types for the Stratum simulator
//!
//! The work template is loaded once and shared read-only by every session.
//! Jobs pair a session-scoped identifier with that template and are never
//! stored after they are sent.

use crate::utils::validate_hex_string;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Prefix of every job identifier handed to clients
pub const JOB_ID_PREFIX: &str = "test_";

/// Static block template sent with every `mining.notify`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkTemplate {
    /// Previous block hash (32 bytes hex)
    pub prevhash: String,
    /// Block version
    pub version: String,
    /// Encoded network target
    pub nbits: String,
    /// Block timestamp
    pub ntime: String,
    /// Coinbase part before the extranonces
    pub coinb1: String,
    /// Coinbase part after the extranonces
    pub coinb2: String,
    /// Merkle branch hashes
    #[serde(default)]
    pub merkle_branch: Vec<String>,
}

impl WorkTemplate {
    /// Bitcoin genesis block header fields with a zeroed coinbase.
    pub fn genesis() -> Self {
        Self {
            prevhash: "0".repeat(64),
            version: "01000000".to_string(),
            nbits: "ffff001d".to_string(),
            ntime: "29ab5f49".to_string(),
            coinb1: "0".repeat(64),
            coinb2: "0".repeat(64),
            merkle_branch: Vec::new(),
        }
    }

    /// Load a template from a YAML or JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        let template: Self = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        template.validate()?;
        Ok(template)
    }

    /// Check that every field is hex of the expected width
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("prevhash", &self.prevhash, Some(64)),
            ("version", &self.version, Some(8)),
            ("nbits", &self.nbits, Some(8)),
            ("ntime", &self.ntime, Some(8)),
            ("coinb1", &self.coinb1, None),
            ("coinb2", &self.coinb2, None),
        ];

        for (name, value, len) in fields {
            validate_hex_string(value, len)
                .map_err(|e| Error::template(format!("{}: {}", name, e)))?;
        }

        for (i, branch) in self.merkle_branch.iter().enumerate() {
            validate_hex_string(branch, Some(64))
                .map_err(|e| Error::template(format!("merkle_branch[{}]: {}", i, e)))?;
        }

        Ok(())
    }
}

impl Default for WorkTemplate {
    fn default() -> Self {
        Self::genesis()
    }
}

/// Session-scoped job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl JobId {
    /// Create a job id from its sequence number
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Sequence number within the session
    pub fn seq(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", JOB_ID_PREFIX, self.0)
    }
}

/// One issued unit of work
#[derive(Debug, Clone)]
pub struct Job {
    /// Job identifier
    pub id: JobId,
    /// Template snapshot
    pub template: Arc<WorkTemplate>,
    /// Whether the client should drop earlier jobs
    pub clean_jobs: bool,
}

impl Job {
    /// Create a new job over the shared template
    pub fn new(id: JobId, template: Arc<WorkTemplate>, clean_jobs: bool) -> Self {
        Self {
            id,
            template,
            clean_jobs,
        }
    }

    /// Positional params for `mining.notify`
    pub fn to_params(&self) -> Vec<Value> {
        let t = &self.template;
        vec![
            Value::String(self.id.to_string()),
            Value::String(t.prevhash.clone()),
            Value::String(t.coinb1.clone()),
            Value::String(t.coinb2.clone()),
            Value::Array(
                t.merkle_branch
                    .iter()
                    .map(|s| Value::String(s.clone()))
                    .collect(),
            ),
            Value::String(t.version.clone()),
            Value::String(t.nbits.clone()),
            Value::String(t.ntime.clone()),
            Value::Bool(self.clean_jobs),
        ]
    }
}

/// Extranonce prefix assigned to a client at subscribe time (4 bytes)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Extranonce1(String);

impl Extranonce1 {
    /// Size of the extranonce1 in bytes
    pub const SIZE: usize = 4;

    /// Size of the extranonce2 the client rolls, in bytes
    pub const EXTRANONCE2_SIZE: u64 = 4;

    /// Create from a hex string, normalised to lowercase
    pub fn new(hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into();
        validate_hex_string(&hex, Some(Self::SIZE * 2))
            .map_err(|e| Error::config(format!("Invalid extranonce1: {}", e)))?;
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Extranonce1 {
    fn default() -> Self {
        Self::from_bytes([0xde, 0xad, 0xbe, 0xef])
    }
}

impl FromStr for Extranonce1 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Extranonce1 {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<Extranonce1> for String {
    fn from(e: Extranonce1) -> Self {
        e.0
    }
}

impl fmt::Display for Extranonce1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
