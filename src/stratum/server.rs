//! Stratum server: TCP listener and per-connection tasks

use super::session::{run_session, SessionContext};
use crate::{Error, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Listener that spawns one session task per accepted connection
pub struct StratumServer {
    listener: TcpListener,
    ctx: Arc<SessionContext>,
}

impl StratumServer {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr, ctx: SessionContext) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::network(format!("Bind failed on {}: {}", addr, e)))?;

        Ok(Self {
            listener,
            ctx: Arc::new(ctx),
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until Ctrl-C
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accept connections until `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            info!("Client connected: {}", addr);
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(error = %e, "failed to set TCP_NODELAY");
                            }

                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move {
                                run_session(stream, &addr.to_string(), ctx).await;
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutting down Stratum server");
                    break;
                }
            }
        }

        Ok(())
    }
}
