//! The heartbeat clock: a trivial component conceptually but architecturally important. A
//! task wakes roughly once a second, samples wall-clock time, and republishes a process-wide
//! 32-bit timestamp. Writers to the pixel store read this value to stamp cells; the 1 Hz
//! granularity is sufficient because `delta_since` filters with `>=`, not `>`.
//!
//! A background task updates an atomic value that every other task reads lock-free, avoiding a
//! syscall on the write hot path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::trace;

use crate::const_settings::HEARTBEAT_INTERVAL_MS;

fn now_unix_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as u32
}

pub struct Heartbeat {
    timestamp: AtomicU32,
}

impl Heartbeat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            timestamp: AtomicU32::new(now_unix_secs()),
        })
    }

    #[inline(always)]
    pub fn now(&self) -> u32 {
        self.timestamp.load(Ordering::Relaxed)
    }

    /// Spawns the background task that keeps the timestamp current. The returned handle is
    /// expected to run for the lifetime of the process; it is aborted on shutdown.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
            loop {
                interval.tick().await;
                let now = now_unix_secs();
                self.timestamp.store(now, Ordering::Relaxed);
                trace!(timestamp = now, "heartbeat tick");
            }
        })
    }
}
