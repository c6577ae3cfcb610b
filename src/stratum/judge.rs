//! Synthetic accept/reject decisions for submitted shares
//!
//! No proof-of-work is checked. The outcome depends only on the configured
//! policy and, for [`JudgePolicy::TargetNonce`], the submitted nonce text.

use crate::config::ForcedResponse;

/// Share fields as submitted by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// Worker name
    pub worker: String,
    /// Job the share claims to solve
    pub job_id: String,
    /// Client-rolled extranonce2 (hex)
    pub extranonce2: String,
    /// Block time (hex)
    pub ntime: String,
    /// Header nonce (hex)
    pub nonce: String,
}

/// Decides whether a submitted share is accepted
pub trait SubmissionJudge: Send + Sync {
    /// Return `true` to accept the share
    fn accepts(&self, share: &Share) -> bool;
}

/// Judge policy, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgePolicy {
    /// Fixed outcome regardless of the share
    Forced(bool),
    /// Accept only this nonce
    TargetNonce(u32),
    /// Accept half of all shares at random
    CoinFlip,
}

impl JudgePolicy {
    /// Pick the policy from the configured settings
    pub fn from_settings(forced: Option<ForcedResponse>, accept_nonce: Option<u32>) -> Self {
        match (forced, accept_nonce) {
            (Some(ForcedResponse::Accepted), _) => Self::Forced(true),
            (Some(ForcedResponse::Rejected), _) => Self::Forced(false),
            (None, Some(nonce)) => Self::TargetNonce(nonce),
            (None, None) => Self::CoinFlip,
        }
    }
}

impl SubmissionJudge for JudgePolicy {
    fn accepts(&self, share: &Share) -> bool {
        match *self {
            JudgePolicy::Forced(outcome) => outcome,
            JudgePolicy::TargetNonce(target) => {
                share.nonce.eq_ignore_ascii_case(&format!("{:08x}", target))
            }
            JudgePolicy::CoinFlip => rand::random_bool(0.5),
        }
    }
}
