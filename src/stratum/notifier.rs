//! Job issuance and the serialized outbound writer
//!
//! Both the session's read loop and the timer task write to the same
//! connection. Every write goes through [`Outbound`], which holds the framed
//! writer behind one async mutex, so lines never interleave.

use super::codec::LineCodec;
use super::protocol::{StratumMethod, StratumNotification};
use crate::types::{Job, JobId, WorkTemplate};
use crate::Result;
use futures::SinkExt;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument, Span};

type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// How a session gets new jobs after the first one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// Re-send the template every interval for the whole session
    Interval(Duration),
    /// Send a new job only after each share submission
    OnShare,
}

/// Shared, line-atomic writer for one connection
#[derive(Clone)]
pub struct Outbound {
    sink: Arc<Mutex<FramedWrite<BoxedWriter, LineCodec>>>,
}

impl Outbound {
    /// Wrap the write side of a connection
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        let writer: BoxedWriter = Box::pin(writer);
        Self {
            sink: Arc::new(Mutex::new(FramedWrite::new(writer, LineCodec))),
        }
    }

    /// Serialize and write one message as a single flushed line
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let line = serde_json::to_string(message)?;
        let mut sink = self.sink.lock().await;
        sink.send(line).await
    }
}

/// Issues `mining.notify` jobs for one session
#[derive(Clone)]
pub struct Notifier {
    outbound: Outbound,
    template: Arc<WorkTemplate>,
    last_job: Arc<Mutex<u64>>,
}

impl Notifier {
    /// Create a notifier writing to `outbound`
    pub fn new(outbound: Outbound, template: Arc<WorkTemplate>) -> Self {
        Self {
            outbound,
            template,
            last_job: Arc::new(Mutex::new(0)),
        }
    }

    /// Build the next job and send it.
    ///
    /// The counter lock is held across the write, so job ids reach the wire
    /// in increasing order even with the timer task racing the read loop.
    pub async fn issue_job(&self, clean_jobs: bool) -> Result<JobId> {
        let mut last_job = self.last_job.lock().await;
        *last_job += 1;
        let id = JobId::new(*last_job);

        let job = Job::new(id, Arc::clone(&self.template), clean_jobs);
        let notify = StratumNotification::new(StratumMethod::Notify, job.to_params());
        self.outbound.send(&notify).await?;

        info!(job_id = %id, "sent mining.notify");
        Ok(id)
    }

    /// Number of jobs issued so far
    pub async fn jobs_issued(&self) -> u64 {
        *self.last_job.lock().await
    }

    /// Start the interval task.
    ///
    /// The task stops when `shutdown` is cancelled, including while a write
    /// is stuck on a peer that stopped reading. A failed write cancels
    /// `shutdown` itself so the read loop ends too.
    pub fn spawn_timer(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let notifier = self.clone();

        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {
                            tokio::select! {
                                biased;
                                _ = shutdown.cancelled() => break,
                                sent = notifier.issue_job(true) => {
                                    if let Err(e) = sent {
                                        debug!(error = %e, "timed mining.notify failed, stopping timer");
                                        shutdown.cancel();
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            }
            .instrument(Span::current()),
        )
    }
}
