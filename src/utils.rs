//! Utility functions and helpers
//!
//! Logging setup plus small helpers shared by the config and session code.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

/// Log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `level` when it is set.
pub fn init_logging(level: tracing::Level, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    match format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(tracing_fmt::layer().with_target(false))
                .with(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(tracing_fmt::layer().json().with_target(false))
                .with(filter)
                .init();
        }
    }
}

/// Format duration as a human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        let secs = seconds % 60;
        format!("{}h {}m {}s", hours, minutes, secs)
    } else {
        let days = seconds / 86400;
        let hours = (seconds % 86400) / 3600;
        format!("{}d {}h", days, hours)
    }
}

/// Validate hex string format
pub fn validate_hex_string(s: &str, expected_len: Option<usize>) -> Result<(), String> {
    if let Some(len) = expected_len {
        if s.len() != len {
            return Err(format!("expected {} hex digits, got {}", len, s.len()));
        }
    }

    if s.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }

    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("contains non-hexadecimal characters".to_string());
    }

    Ok(())
}
