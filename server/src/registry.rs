//! Per-IP client registry and rate limiter.
//!
//! A compact per-client cooldown bitset works when clients are numeric ids in a fixed
//! connection-slot pool, but source IPs here are unbounded strings, and each client needs more
//! than one bit of state (pps budget, last-write instant, godmode, connected). So the bitset
//! becomes a sharded concurrent map (`dashmap` with `rustc-hash`) keyed by IP.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

struct ClientState {
    pps: f64,
    last_write_at: Option<Instant>,
    godmode: bool,
    connected: bool,
}

impl ClientState {
    fn new(default_pps: f64) -> Self {
        Self {
            pps: default_pps,
            last_write_at: None,
            godmode: false,
            connected: false,
        }
    }
}

/// A point-in-time snapshot of a client's state, safe to hand out beyond the registry's lock.
#[derive(Debug, Clone, Copy)]
pub struct ClientInfo {
    pub pps: f64,
    pub godmode: bool,
    pub connected: bool,
}

pub struct ClientRegistry {
    sessions: DashMap<String, Mutex<ClientState>, FxBuildHasher>,
    default_pps: f64,
    godmode_pps: f64,
}

impl ClientRegistry {
    pub fn new(default_pps: f64, godmode_pps: f64) -> Self {
        Self {
            sessions: DashMap::with_hasher(FxBuildHasher),
            default_pps,
            godmode_pps,
        }
    }

    /// Lazily creates the entry for `ip` if absent. Every other method assumes the entry
    /// already exists and calls this first.
    pub fn ensure(&self, ip: &str) {
        if !self.sessions.contains_key(ip) {
            self.sessions
                .entry(ip.to_string())
                .or_insert_with(|| Mutex::new(ClientState::new(self.default_pps)));
        }
    }

    pub fn get(&self, ip: &str) -> ClientInfo {
        self.ensure(ip);
        let entry = self.sessions.get(ip).expect("just ensured");
        let state = entry.lock().expect("registry mutex poisoned");
        ClientInfo {
            pps: state.pps,
            godmode: state.godmode,
            connected: state.connected,
        }
    }

    pub fn connect(&self, ip: &str) {
        self.ensure(ip);
        let entry = self.sessions.get(ip).expect("just ensured");
        entry.lock().expect("registry mutex poisoned").connected = true;
    }

    pub fn disconnect(&self, ip: &str) {
        self.ensure(ip);
        let entry = self.sessions.get(ip).expect("just ensured");
        entry.lock().expect("registry mutex poisoned").connected = false;
    }

    /// Flips godmode and snaps `pps` to the god rate (or back to the configured default).
    pub fn set_godmode(&self, ip: &str, enabled: bool) {
        self.ensure(ip);
        let entry = self.sessions.get(ip).expect("just ensured");
        let mut state = entry.lock().expect("registry mutex poisoned");
        state.godmode = enabled;
        state.pps = if enabled {
            self.godmode_pps
        } else {
            self.default_pps
        };
    }

    /// `godmode ? 0 : max(0, last_write_at + 1/pps - now)`.
    pub fn cooldown_remaining(&self, ip: &str) -> Duration {
        self.ensure(ip);
        let entry = self.sessions.get(ip).expect("just ensured");
        let state = entry.lock().expect("registry mutex poisoned");
        if state.godmode {
            return Duration::ZERO;
        }
        let Some(last) = state.last_write_at else {
            return Duration::ZERO;
        };
        let period = Duration::from_secs_f64(1.0 / state.pps.max(f64::MIN_POSITIVE));
        let deadline = last + period;
        deadline.saturating_duration_since(Instant::now())
    }

    pub fn mark_write(&self, ip: &str) {
        self.ensure(ip);
        let entry = self.sessions.get(ip).expect("just ensured");
        entry.lock().expect("registry mutex poisoned").last_write_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_client_has_no_cooldown() {
        let registry = ClientRegistry::new(30.0, 1000.0);
        assert_eq!(registry.cooldown_remaining("1.2.3.4"), Duration::ZERO);
    }

    #[test]
    fn write_then_immediate_recheck_is_on_cooldown() {
        let registry = ClientRegistry::new(1.0, 1000.0);
        registry.mark_write("1.2.3.4");
        assert!(registry.cooldown_remaining("1.2.3.4") > Duration::ZERO);
    }

    #[test]
    fn godmode_waives_cooldown() {
        let registry = ClientRegistry::new(1.0, 1000.0);
        registry.mark_write("1.2.3.4");
        registry.set_godmode("1.2.3.4", true);
        assert_eq!(registry.cooldown_remaining("1.2.3.4"), Duration::ZERO);
        let info = registry.get("1.2.3.4");
        assert!(info.godmode);
        assert_eq!(info.pps, 1000.0);
    }

    #[test]
    fn connect_disconnect_toggle_connected_bit() {
        let registry = ClientRegistry::new(30.0, 1000.0);
        registry.connect("1.2.3.4");
        assert!(registry.get("1.2.3.4").connected);
        registry.disconnect("1.2.3.4");
        assert!(!registry.get("1.2.3.4").connected);
    }
}
