//! Named-event dispatch table decoupling protocol frontends from the canvas.
//!
//! A process-wide map from event name to a single callback, with the last registration for a
//! name winning and errors during `trigger` caught and logged rather than propagated. Handlers
//! return a typed `Result` rather than panicking, so a handler's failure can be caught and
//! logged without relying on unwind safety.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use tracing::{error, info};

use crate::canvas::Canvas;
use crate::config::Config;
use crate::registry::ClientRegistry;
use crate::stats::Stats;

/// Shared services every handler needs, bundled so `trigger` callers don't have to thread
/// four separate `Arc`s through every call site.
pub struct DispatchContext {
    pub canvas: Arc<Canvas>,
    pub registry: Arc<ClientRegistry>,
    pub stats: Arc<Stats>,
    pub config: Arc<RwLock<Config>>,
    pub ip: String,
}

pub type HandlerResult = Result<String, String>;
type Handler = Arc<dyn Fn(&DispatchContext, &[&str]) -> HandlerResult + Send + Sync>;

pub struct Dispatcher {
    handlers: DashMap<String, Handler, FxBuildHasher>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::with_hasher(FxBuildHasher),
        }
    }

    /// Installs `handler` under `name`. A second registration for the same name replaces the
    /// first.
    pub fn register<F>(&self, name: &str, handler: F)
    where
        F: Fn(&DispatchContext, &[&str]) -> HandlerResult + Send + Sync + 'static,
    {
        info!(event = name, "registered dispatcher event");
        self.handlers.insert(name.to_string(), Arc::new(handler));
    }

    /// Invokes the handler registered under `name`, if any. Returns `None` if no handler is
    /// registered. A handler's `Err` is logged and surfaced to the caller as `Some(Err(..))` so
    /// frontends can still translate it to a protocol-appropriate reply.
    pub fn trigger(&self, name: &str, ctx: &DispatchContext, args: &[&str]) -> Option<HandlerResult> {
        let handler = self.handlers.get(name)?.clone();
        let result = handler(ctx, args);
        if let Err(ref e) = result {
            error!(event = name, error = %e, "dispatcher callback failed");
        }
        Some(result)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::Heartbeat;
    use crate::store::PixelStore;

    fn fresh_context() -> DispatchContext {
        let store = Arc::new(PixelStore::new(4, 4));
        let heartbeat = Heartbeat::new();
        let stats = Stats::new();
        DispatchContext {
            canvas: Canvas::new(store, heartbeat, stats.clone()),
            registry: Arc::new(ClientRegistry::new(30.0, 1000.0)),
            stats,
            config: Arc::new(RwLock::new(crate::config::test_support::sample())),
            ip: "127.0.0.1".to_string(),
        }
    }

    #[test]
    fn unregistered_event_returns_none() {
        let dispatcher = Dispatcher::new();
        let ctx = fresh_context();
        assert!(dispatcher.trigger("NOPE", &ctx, &[]).is_none());
    }

    #[test]
    fn registered_event_runs_and_returns_its_result() {
        let dispatcher = Dispatcher::new();
        dispatcher.register("PING", |_ctx, _args| Ok("PONG".to_string()));
        let ctx = fresh_context();
        assert_eq!(
            dispatcher.trigger("PING", &ctx, &[]),
            Some(Ok("PONG".to_string()))
        );
    }

    #[test]
    fn second_registration_for_same_name_wins() {
        let dispatcher = Dispatcher::new();
        dispatcher.register("X", |_ctx, _args| Ok("first".to_string()));
        dispatcher.register("X", |_ctx, _args| Ok("second".to_string()));
        let ctx = fresh_context();
        assert_eq!(dispatcher.trigger("X", &ctx, &[]), Some(Ok("second".to_string())));
    }

    #[test]
    fn handler_error_is_returned_not_panicked() {
        let dispatcher = Dispatcher::new();
        dispatcher.register("BOOM", |_ctx, _args| Err("bad args".to_string()));
        let ctx = fresh_context();
        assert_eq!(dispatcher.trigger("BOOM", &ctx, &[]), Some(Err("bad args".to_string())));
    }
}
