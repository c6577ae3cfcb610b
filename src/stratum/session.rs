//! Stratum session handling
//!
//! One [`Session`] per connection. It owns the connection's protocol state,
//! dispatches each decoded request and, in interval mode, runs a timer task
//! alongside the read loop until the session ends.

use super::codec::LineCodec;
use super::judge::{Share, SubmissionJudge};
use super::notifier::{Notifier, NotifyMode, Outbound};
use super::protocol::{StratumMethod, StratumNotification, StratumRequest, StratumResponse};
use crate::types::{Extranonce1, WorkTemplate};
use crate::utils::format_duration;
use crate::{Error, Result};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Session ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only settings shared by every session
#[derive(Clone)]
pub struct SessionContext {
    /// Difficulty announced after authorize
    pub difficulty: f64,
    /// Job issuance mode
    pub notify_mode: NotifyMode,
    /// Extranonce1 handed out on subscribe
    pub extranonce1: Extranonce1,
    /// Template copied into every job
    pub template: Arc<WorkTemplate>,
    /// Share accept/reject policy
    pub judge: Arc<dyn SubmissionJudge>,
}

/// Per-session counters reported at disconnect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Shares submitted
    pub submitted: u64,
    /// Shares accepted
    pub accepted: u64,
    /// Shares rejected
    pub rejected: u64,
    /// Jobs sent
    pub jobs_issued: u64,
}

/// Protocol state of one connection
pub struct Session {
    id: SessionId,
    ctx: Arc<SessionContext>,
    outbound: Outbound,
    notifier: Notifier,
    shutdown: CancellationToken,
    stats: SessionStats,
    started: Instant,
}

impl Session {
    /// Create a session writing to `outbound`
    pub fn new(outbound: Outbound, ctx: Arc<SessionContext>) -> Self {
        let notifier = Notifier::new(outbound.clone(), Arc::clone(&ctx.template));
        Self {
            id: SessionId::new(),
            ctx,
            outbound,
            notifier,
            shutdown: CancellationToken::new(),
            stats: SessionStats::default(),
            started: Instant::now(),
        }
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Token cancelled when the session ends
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Current counters
    pub async fn stats(&self) -> SessionStats {
        SessionStats {
            jobs_issued: self.notifier.jobs_issued().await,
            ..self.stats
        }
    }

    /// Handle one inbound line.
    ///
    /// Undecodable lines are dropped. An error means a write failed and the
    /// session should end.
    pub async fn handle_line(&mut self, line: &str) -> Result<()> {
        match StratumRequest::from_json(line) {
            Ok(req) => self.handle_request(req).await,
            Err(e) => {
                debug!(error = %e, line, "discarding malformed line");
                Ok(())
            }
        }
    }

    async fn handle_request(&mut self, req: StratumRequest) -> Result<()> {
        match req.method_enum() {
            StratumMethod::Subscribe => {
                info!("received mining.subscribe");
                let result = Value::Array(vec![
                    Value::String(self.id.to_string()),
                    Value::String(self.ctx.extranonce1.to_string()),
                    Value::from(Extranonce1::EXTRANONCE2_SIZE),
                ]);
                self.outbound
                    .send(&StratumResponse::success(req.id, result))
                    .await
            }

            StratumMethod::Authorize => {
                let user = req.param_str(0);
                info!(user = %user, "received mining.authorize");

                self.outbound
                    .send(&StratumResponse::success(req.id, Value::Bool(true)))
                    .await?;
                self.outbound
                    .send(&StratumNotification::set_difficulty(self.ctx.difficulty))
                    .await?;
                info!(difficulty = self.ctx.difficulty, "sent mining.set_difficulty");
                self.notifier.issue_job(true).await?;
                Ok(())
            }

            StratumMethod::ExtranonceSubscribe => {
                info!("received mining.extranonce.subscribe");
                self.outbound
                    .send(&StratumResponse::success(req.id, Value::Bool(true)))
                    .await
            }

            StratumMethod::Submit => self.handle_submit(req).await,

            other => {
                info!(method = other.as_str(), "received unknown method");
                Ok(())
            }
        }
    }

    async fn handle_submit(&mut self, req: StratumRequest) -> Result<()> {
        // mining.submit("worker", "job_id", "extranonce2", "ntime", "nonce")
        let share = Share {
            worker: req.param_str(0),
            job_id: req.param_str(1),
            extranonce2: req.param_str(2),
            ntime: req.param_str(3),
            nonce: req.param_str(4),
        };

        let accepted = self.ctx.judge.accepts(&share);
        self.stats.submitted += 1;
        if accepted {
            self.stats.accepted += 1;
        } else {
            self.stats.rejected += 1;
        }

        info!(
            worker = %share.worker,
            job_id = %share.job_id,
            extranonce2 = %share.extranonce2,
            ntime = %share.ntime,
            nonce = %share.nonce,
            "submit -> {}",
            if accepted { "Accepted" } else { "Rejected" }
        );

        let response = if accepted {
            StratumResponse::success(req.id, Value::Bool(true))
        } else {
            StratumResponse::rejected(req.id)
        };
        self.outbound.send(&response).await?;

        if self.ctx.notify_mode == NotifyMode::OnShare {
            self.notifier.issue_job(true).await?;
        }

        Ok(())
    }
}

/// Serve one connection until the peer leaves or a transport error occurs.
///
/// Never fails: transport errors end the session and are only logged.
pub async fn run_session<S>(stream: S, peer: &str, ctx: Arc<SessionContext>) -> SessionStats
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let session = Session::new(Outbound::new(writer), ctx);
    let span = info_span!("session", peer = %peer, id = %session.id());

    drive(session, FramedRead::new(reader, LineCodec))
        .instrument(span)
        .await
}

async fn drive<R>(mut session: Session, mut lines: FramedRead<R, LineCodec>) -> SessionStats
where
    R: AsyncRead + Unpin,
{
    let shutdown = session.shutdown_token();

    let timer = match session.ctx.notify_mode {
        NotifyMode::Interval(interval) => {
            Some(session.notifier.spawn_timer(interval, shutdown.clone()))
        }
        NotifyMode::OnShare => None,
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = lines.next() => {
                match frame {
                    Some(Ok(line)) => {
                        tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => break,
                            handled = session.handle_line(&line) => {
                                if let Err(e) = handled {
                                    log_transport_error(&e);
                                    break;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        log_transport_error(&e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    shutdown.cancel();
    if let Some(timer) = timer {
        if let Err(e) = timer.await {
            warn!(error = %e, "notify timer task failed");
        }
    }
    // The connection closes once the read half and the last writer handle drop.

    let stats = session.stats().await;
    info!(
        submitted = stats.submitted,
        accepted = stats.accepted,
        rejected = stats.rejected,
        jobs = stats.jobs_issued,
        duration = %format_duration(session.started.elapsed().as_secs()),
        "client disconnected"
    );
    stats
}

fn log_transport_error(e: &Error) {
    if e.is_disconnect() {
        debug!(error = %e, "connection lost");
    } else {
        warn!(error = %e, category = e.category(), "session transport error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stratum::JudgePolicy;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;

    fn context(notify_mode: NotifyMode, judge: JudgePolicy) -> Arc<SessionContext> {
        Arc::new(SessionContext {
            difficulty: 0.5,
            notify_mode,
            extranonce1: Extranonce1::default(),
            template: Arc::new(WorkTemplate::genesis()),
            judge: Arc::new(judge),
        })
    }

    struct TestClient {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl TestClient {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await.unwrap();
            assert!(n > 0, "connection closed");
            serde_json::from_str(&line).unwrap()
        }

        async fn recv_timeout(&mut self, wait: Duration) -> Option<Value> {
            tokio::time::timeout(wait, self.recv()).await.ok()
        }
    }

    fn start(ctx: Arc<SessionContext>) -> (TestClient, JoinHandle<SessionStats>) {
        start_with_buffer(ctx, 16 * 1024)
    }

    fn start_with_buffer(
        ctx: Arc<SessionContext>,
        buffer: usize,
    ) -> (TestClient, JoinHandle<SessionStats>) {
        let (client, server) = tokio::io::duplex(buffer);
        let handle = tokio::spawn(async move { run_session(server, "test", ctx).await });
        let (reader, writer) = tokio::io::split(client);
        (
            TestClient {
                reader: BufReader::new(reader),
                writer,
            },
            handle,
        )
    }

    async fn authorize(client: &mut TestClient) {
        client
            .send(r#"{"id":2,"method":"mining.authorize","params":["worker","x"]}"#)
            .await;
        assert_eq!(client.recv().await, json!({"id": 2, "result": true}));
        assert_eq!(
            client.recv().await,
            json!({"method": "mining.set_difficulty", "params": [0.5]})
        );
        let job = client.recv().await;
        assert_eq!(job["method"], "mining.notify");
        assert_eq!(job["params"][0], "test_1");
        assert_eq!(job["params"][8], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_reply() {
        let (mut client, _handle) = start(context(NotifyMode::OnShare, JudgePolicy::Forced(true)));

        client
            .send(r#"{"id":1,"method":"mining.subscribe","params":["cgminer/4.10"]}"#)
            .await;
        let reply = client.recv().await;

        assert_eq!(reply["id"], 1);
        let result = reply["result"].as_array().unwrap();
        assert_eq!(result.len(), 3);
        assert!(Uuid::parse_str(result[0].as_str().unwrap()).is_ok());
        assert_eq!(result[1], "deadbeef");
        assert_eq!(result[2], 4);
        assert!(reply.get("error").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorize_without_params() {
        let (mut client, _handle) = start(context(NotifyMode::OnShare, JudgePolicy::Forced(true)));

        client.send(r#"{"id":9,"method":"mining.authorize"}"#).await;
        assert_eq!(client.recv().await, json!({"id": 9, "result": true}));
        assert_eq!(client.recv().await["method"], "mining.set_difficulty");
        assert_eq!(client.recv().await["params"][0], "test_1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_extranonce_subscribe_and_unknown_method() {
        let (mut client, _handle) = start(context(NotifyMode::OnShare, JudgePolicy::Forced(true)));

        client
            .send(r#"{"id":3,"method":"mining.suggest_difficulty","params":[1]}"#)
            .await;
        client
            .send(r#"{"id":4,"method":"mining.extranonce.subscribe","params":[]}"#)
            .await;

        // The unknown method gets no reply, so the next line answers id 4.
        assert_eq!(client.recv().await, json!({"id": 4, "result": true}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_accept() {
        let (mut client, _handle) = start(context(NotifyMode::OnShare, JudgePolicy::Forced(true)));
        authorize(&mut client).await;

        client
            .send(r#"{"id":5,"method":"mining.submit","params":["w","test_1","00000000","29ab5f49","ffffffff"]}"#)
            .await;
        let reply = client.recv().await;
        assert_eq!(reply, json!({"id": 5, "result": true}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_reject() {
        let (mut client, _handle) =
            start(context(NotifyMode::OnShare, JudgePolicy::Forced(false)));
        authorize(&mut client).await;

        client
            .send(r#"{"id":6,"method":"mining.submit","params":["w","test_1","00000000","29ab5f49","00000000"]}"#)
            .await;
        assert_eq!(
            client.recv().await,
            json!({"id": 6, "result": null, "error": [25, "Rejected"]})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_nonce_and_short_params() {
        let (mut client, _handle) =
            start(context(NotifyMode::OnShare, JudgePolicy::TargetNonce(0)));

        client
            .send(r#"{"id":1,"method":"mining.submit","params":["w","test_1","00","00","00000000"]}"#)
            .await;
        assert_eq!(client.recv().await["result"], true);
        client.recv().await;

        client
            .send(r#"{"id":2,"method":"mining.submit","params":["w","test_1","00","00","00000001"]}"#)
            .await;
        assert_eq!(client.recv().await["error"], json!([25, "Rejected"]));
        client.recv().await;

        // Missing nonce reads as the placeholder and is rejected, not dropped.
        client
            .send(r#"{"id":3,"method":"mining.submit","params":["w"]}"#)
            .await;
        assert_eq!(client.recv().await["error"], json!([25, "Rejected"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_share_triggered_mode() {
        let (mut client, handle) = start(context(NotifyMode::OnShare, JudgePolicy::CoinFlip));
        authorize(&mut client).await;

        assert_matches!(client.recv_timeout(Duration::from_secs(120)).await, None);

        for (id, expected_job) in [(10, "test_2"), (11, "test_3")] {
            client
                .send(&format!(
                    r#"{{"id":{},"method":"mining.submit","params":["w","test_1","00000000","29ab5f49","00000000"]}}"#,
                    id
                ))
                .await;
            assert_eq!(client.recv().await["id"], id);
            let job = client.recv().await;
            assert_eq!(job["method"], "mining.notify");
            assert_eq!(job["params"][0], expected_job);
            assert_eq!(job["params"][8], true);
        }

        drop(client);
        let stats = handle.await.unwrap();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.accepted + stats.rejected, 2);
        assert_eq!(stats.jobs_issued, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_mode() {
        let interval = Duration::from_secs(10);
        let (mut client, handle) =
            start(context(NotifyMode::Interval(interval), JudgePolicy::Forced(true)));
        authorize(&mut client).await;
        let mut last = tokio::time::Instant::now();

        // Nothing between the authorize job and the first tick.
        assert_matches!(client.recv_timeout(interval - Duration::from_secs(1)).await, None);

        for n in 2..=4 {
            let job = client.recv().await;
            let now = tokio::time::Instant::now();
            assert!(now - last >= interval, "job {} came after {:?}", n, now - last);
            last = now;
            assert_eq!(job["params"][0], format!("test_{}", n));
            assert_eq!(job["params"][8], true);
        }
        assert_matches!(client.recv_timeout(interval - Duration::from_secs(1)).await, None);

        drop(client);
        let stats = handle.await.unwrap();
        assert_eq!(stats.jobs_issued, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_ends_when_peer_stops_reading() {
        let (mut client, handle) = start_with_buffer(
            context(NotifyMode::Interval(Duration::from_secs(1)), JudgePolicy::Forced(true)),
            64,
        );

        // The first timed job overfills the pipe and the client never reads it.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!handle.is_finished());
        client.writer.shutdown().await.unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(3600), handle)
            .await
            .expect("session hung on a write nobody reads")
            .unwrap();
        assert_eq!(stats.jobs_issued, 1);
        drop(client);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_line_is_skipped() {
        let (mut client, _handle) = start(context(NotifyMode::OnShare, JudgePolicy::Forced(true)));

        client
            .send(r#"{"id":1,"method":"mining.subscribe","params":[]}"#)
            .await;
        client.send(r#"{"id":2,"method":"mining.auth"#).await;
        client
            .send(r#"{"id":3,"method":"mining.extranonce.subscribe","params":[]}"#)
            .await;

        assert_eq!(client.recv().await["id"], 1);
        assert_eq!(client.recv().await, json!({"id": 3, "result": true}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_timer() {
        let (client, handle) = start(context(
            NotifyMode::Interval(Duration::from_secs(1)),
            JudgePolicy::CoinFlip,
        ));

        drop(client);
        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("session should end after disconnect")
            .unwrap();
        assert_eq!(stats.submitted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_line_discards_garbage() {
        let (client, server) = tokio::io::duplex(1024);
        let mut session = Session::new(
            Outbound::new(server),
            context(NotifyMode::OnShare, JudgePolicy::Forced(true)),
        );

        assert!(session.handle_line("not json").await.is_ok());
        assert!(session.handle_line("42").await.is_ok());
        assert_eq!(session.stats().await, SessionStats::default());
        drop(client);
    }
}
