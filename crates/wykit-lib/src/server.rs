//! Connection acceptor.
//!
//! Binds one TCP listener and runs every accepted connection as its own
//! task. Sessions share nothing mutable except the synthesis service's
//! permits, so a slow or broken client never holds up the others.
//!
//! On shutdown the listener closes first, then in-flight sessions get
//! `shutdown_grace` to finish before they are aborted.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::signal;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};

use wykit_core::types::DEFAULT_SHUTDOWN_GRACE;

use crate::session::{run_session, SessionContext, SessionOutcome};

/// Pause after a failed `accept` (fd exhaustion and the like).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    ctx: SessionContext,
    shutdown_grace: Duration,
}

impl Server {
    /// Bind the listening socket. Fails if the address is unavailable.
    pub async fn bind<A: ToSocketAddrs>(addr: A, ctx: SessionContext) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            ctx,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn run(self) -> io::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then drain.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            ctx,
            shutdown_grace,
        } = self;
        info!("listening on {}", listener.local_addr()?);

        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        sessions.spawn(handle_connection(stream, peer, ctx.clone()));
                    }
                    Err(e) => {
                        error!("accept failed: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => reap(joined),
            }
        }

        drop(listener);
        info!(
            "shutting down, waiting up to {:?} for {} session(s)",
            shutdown_grace,
            sessions.len()
        );

        let drained = tokio::time::timeout(shutdown_grace, async {
            while let Some(joined) = sessions.join_next().await {
                reap(joined);
            }
        })
        .await
        .is_ok();

        if !drained {
            warn!("grace period over, aborting {} session(s)", sessions.len());
            sessions.abort_all();
            while sessions.join_next().await.is_some() {}
        }
        info!("server stopped");
        Ok(())
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, ctx: SessionContext) {
    let span = info_span!("session", %peer);
    async move {
        info!("connection opened");
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {e}");
        }
        let started = Instant::now();

        match run_session(&mut stream, &ctx).await {
            SessionOutcome::Audio {
                voice,
                sample_rate,
                wav_bytes,
            } => info!(
                %voice,
                sample_rate,
                wav_bytes,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "audio sent"
            ),
            SessionOutcome::Info => info!("info sent"),
            SessionOutcome::Rejected { message } => warn!("request rejected: {message}"),
            SessionOutcome::Dropped { reason } => warn!("connection dropped: {reason}"),
        }
        info!("connection closed");
    }
    .instrument(span)
    .await
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("session task panicked: {e}");
        }
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("cannot listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
