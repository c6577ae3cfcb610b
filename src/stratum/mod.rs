//! Stratum v1 pool simulator
//!
//! Line-delimited JSON over TCP. Each connection gets its own [`Session`];
//! sessions share nothing but the read-only [`SessionContext`].

mod codec;
mod judge;
mod notifier;
mod protocol;
mod server;
mod session;

pub use codec::LineCodec;
pub use judge::{JudgePolicy, Share, SubmissionJudge};
pub use notifier::{Notifier, NotifyMode, Outbound};
pub use protocol::{
    StratumMethod, StratumNotification, StratumRequest, StratumResponse, PLACEHOLDER,
    REJECTED_CODE, REJECTED_MESSAGE,
};
pub use server::StratumServer;
pub use session::{run_session, Session, SessionContext, SessionId, SessionStats};
