//! Fake Stratum
//!
//! A Stratum v1 pool simulator for testing mining clients in isolation:
//! - Full subscribe/authorize/submit handshake over line-delimited JSON
//! - One static historical block template, re-sent on a timer or after each share
//! - Configurable difficulty announcement
//! - Synthetic share verdicts: forced, fixed-nonce, or random
//!
//! No proof-of-work is ever verified.

pub mod config;
pub mod error;
pub mod stratum;
pub mod types;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Application information
pub const APP_NAME: &str = "fake-stratum";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
