//! Accepts TCP connections and enforces the one-active-session-per-IP invariant.
//!
//! On accept, if the source IP already has a live client, disconnect it and kill its task
//! before attaching the new socket.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::context::ServerContext;
use crate::session::{self, SharedWriter, DISCONNECT_TAKEOVER_MESSAGE};

struct ActiveConnection {
    task: JoinHandle<()>,
    writer: SharedWriter,
}

pub struct TcpFrontend {
    active: DashMap<String, ActiveConnection, FxBuildHasher>,
}

impl TcpFrontend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: DashMap::with_hasher(FxBuildHasher),
        })
    }

    /// Binds `addr` and accepts connections until the process exits. On bind failure, logs and
    /// returns without spawning anything — other frontends continue unaffected.
    pub async fn serve(self: Arc<Self>, addr: impl tokio::net::ToSocketAddrs, ctx: Arc<ServerContext>, read_timeout: Duration) {
        let listener = match TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "tcp listener failed to bind; socket frontend disabled");
                return;
            }
        };

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "tcp accept failed");
                    continue;
                }
            };

            let ip = peer.ip().to_string();
            info!(ip = %ip, "tcp connection accepted");

            if let Some((_, old)) = self.active.remove(&ip) {
                session_notify_takeover(&old.writer).await;
                old.task.abort();
            }

            let (read_half, write_half) = stream.into_split();
            let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(write_half));
            let ctx = ctx.clone();
            let ip_for_task = ip.clone();
            let writer_for_task = writer.clone();

            let task = tokio::spawn(async move {
                session::run(read_half, writer_for_task, ip_for_task, ctx, read_timeout).await;
            });

            self.active.insert(ip, ActiveConnection { task, writer });
        }
    }
}

async fn session_notify_takeover(writer: &SharedWriter) {
    use tokio::io::AsyncWriteExt;
    let mut guard = writer.lock().await;
    let line = format!("{}{}\n", crate::const_settings::REPLY_PREFIX, DISCONNECT_TAKEOVER_MESSAGE);
    let _ = guard.write_all(line.as_bytes()).await;
}
