//! Bundles the services every protocol frontend needs and registers the TCP command table.
//!
//! The canvas, transport, and worker layers are wired together once in `ServerContext::new`
//! plus `register_socket_handlers`, instead of being rebuilt per connection.

use std::sync::{Arc, RwLock};

use crate::canvas::Canvas;
use crate::config::Config;
use crate::dispatcher::{DispatchContext, Dispatcher};
use crate::registry::ClientRegistry;
use crate::stats::Stats;
use crate::store::Rgb;

pub struct ServerContext {
    pub canvas: Arc<Canvas>,
    pub registry: Arc<ClientRegistry>,
    pub stats: Arc<Stats>,
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<RwLock<Config>>,
    pub config_path: String,
}

impl ServerContext {
    pub fn new(
        canvas: Arc<Canvas>,
        registry: Arc<ClientRegistry>,
        stats: Arc<Stats>,
        dispatcher: Arc<Dispatcher>,
        config: Config,
        config_path: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            canvas,
            registry,
            stats,
            dispatcher,
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    pub fn dispatch_context(&self, ip: &str) -> DispatchContext {
        DispatchContext {
            canvas: self.canvas.clone(),
            registry: self.registry.clone(),
            stats: self.stats.clone(),
            config: self.config.clone(),
            ip: ip.to_string(),
        }
    }
}

const HELP_LINES: &[&str] = &[
    "Welcome! The following commands are available:",
    "PX x y -> get the color of pixel (x, y)",
    "PX x y RRGGBB -> set pixel (x, y) to an opaque color",
    "PX x y RRGGBBAA -> set pixel (x, y), blending the given alpha over the existing color",
    "SIZE -> get the canvas width and height",
    "PPS -> get your current pixels-per-second budget",
    "STATS -> get a histogram of pixels written per color",
    "GODMODE on|off -> toggle godmode, if enabled on this server",
    "HELP -> show this message",
    "QUIT / EXIT -> close the connection",
];

/// Installs the `SOCKSERV-*` handlers the TCP session loop dispatches into. Kept separate from
/// `ServerContext::new` so tests can build a dispatcher with only the handlers they need.
pub fn register_socket_handlers(dispatcher: &Dispatcher) {
    dispatcher.register("SOCKSERV-PX", |ctx, args| match args.len() {
        2 => handle_px_get(ctx, args),
        3 => handle_px_set(ctx, args),
        _ => Err("Wrong arguments".to_string()),
    });

    dispatcher.register("SOCKSERV-SIZE", |ctx, _args| {
        Ok(format!("SIZE {} {}", ctx.canvas.width(), ctx.canvas.height()))
    });

    dispatcher.register("SOCKSERV-PPS", |ctx, _args| {
        let info = ctx.registry.get(&ctx.ip);
        Ok(format!("PPS {}", info.pps))
    });

    dispatcher.register("SOCKSERV-HELP", |ctx, _args| {
        let pps = ctx.registry.get(&ctx.ip).pps;
        let mut lines: Vec<String> = HELP_LINES.iter().map(|l| l.to_string()).collect();
        lines.push(format!("Pixel per second per user: {pps}"));
        Ok(lines.join("\n"))
    });

    dispatcher.register("SOCKSERV-STATS", |ctx, _args| Ok(ctx.stats.report()));

    dispatcher.register("SOCKSERV-GODMODE", |ctx, args| {
        let enabled = ctx.config.read().expect("config lock poisoned").game.godmode.enabled;
        if !enabled {
            return Err("Wrong arguments".to_string());
        }
        match args {
            ["on"] => {
                ctx.registry.set_godmode(&ctx.ip, true);
                Ok("Godmode enabled".to_string())
            }
            ["off"] => {
                ctx.registry.set_godmode(&ctx.ip, false);
                Ok("Godmode disabled".to_string())
            }
            _ => Err("Wrong arguments".to_string()),
        }
    });

    dispatcher.register("SOCKSERV-QUIT", |_ctx, _args| Ok("Goodbye".to_string()));
    dispatcher.register("SOCKSERV-EXIT", |_ctx, _args| Ok("Goodbye".to_string()));
}

fn handle_px_get(ctx: &DispatchContext, args: &[&str]) -> Result<String, String> {
    let (x, y) = parse_coords(args)?;
    match ctx.canvas.read(x, y) {
        Some(rgb) => Ok(format!("PX {} {} {}", x, y, rgb.to_hex())),
        None => Err("Wrong arguments".to_string()),
    }
}

fn handle_px_set(ctx: &DispatchContext, args: &[&str]) -> Result<String, String> {
    let (x, y) = parse_coords(args)?;
    let (rgb, a) = parse_color(args[2])?;
    ctx.canvas.enqueue(x, y, rgb.r, rgb.g, rgb.b, a);
    ctx.registry.mark_write(&ctx.ip);
    Ok("PX Success".to_string())
}

fn parse_coords(args: &[&str]) -> Result<(i64, i64), String> {
    let x: i64 = args[0].parse().map_err(|_| "Wrong arguments".to_string())?;
    let y: i64 = args[1].parse().map_err(|_| "Wrong arguments".to_string())?;
    Ok((x, y))
}

/// Parses a 6-digit RGB or 8-digit RGBA hex string. RGB implies full opacity (`A = 255`).
fn parse_color(raw: &str) -> Result<(Rgb, u8), String> {
    match raw.len() {
        6 => {
            let rgb = Rgb::from_hex(raw).ok_or_else(|| "Wrong arguments".to_string())?;
            Ok((rgb, 255))
        }
        8 => {
            let rgb = Rgb::from_hex(&raw[0..6]).ok_or_else(|| "Wrong arguments".to_string())?;
            let a = u8::from_str_radix(&raw[6..8], 16).map_err(|_| "Wrong arguments".to_string())?;
            Ok((rgb, a))
        }
        _ => Err("Wrong arguments".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::Heartbeat;
    use crate::store::PixelStore;

    fn fresh() -> (Arc<Dispatcher>, DispatchContext) {
        let dispatcher = Arc::new(Dispatcher::new());
        register_socket_handlers(&dispatcher);
        let store = Arc::new(PixelStore::new(10, 10));
        let heartbeat = Heartbeat::new();
        let stats = Stats::new();
        let ctx = DispatchContext {
            canvas: Canvas::new(store, heartbeat, stats.clone()),
            registry: Arc::new(ClientRegistry::new(30.0, 1000.0)),
            stats,
            config: Arc::new(RwLock::new(crate::config::test_support::sample())),
            ip: "127.0.0.1".to_string(),
        };
        (dispatcher, ctx)
    }

    #[test]
    fn px_set_then_get_round_trips() {
        let (dispatcher, ctx) = fresh();
        let set = dispatcher.trigger("SOCKSERV-PX", &ctx, &["1", "2", "ff0000"]).unwrap();
        assert_eq!(set, Ok("PX Success".to_string()));
        ctx.canvas.store().update(1, 2, Rgb { r: 0xff, g: 0, b: 0 }, 1);
        let get = dispatcher.trigger("SOCKSERV-PX", &ctx, &["1", "2"]).unwrap().unwrap();
        assert_eq!(get, "PX 1 2 ff0000");
    }

    #[test]
    fn size_reports_canvas_dimensions() {
        let (dispatcher, ctx) = fresh();
        let reply = dispatcher.trigger("SOCKSERV-SIZE", &ctx, &[]).unwrap().unwrap();
        assert_eq!(reply, "SIZE 10 10");
    }

    #[test]
    fn godmode_toggle_updates_registry() {
        let (dispatcher, ctx) = fresh();
        dispatcher.trigger("SOCKSERV-GODMODE", &ctx, &["on"]).unwrap().unwrap();
        assert!(ctx.registry.get(&ctx.ip).godmode);
        dispatcher.trigger("SOCKSERV-GODMODE", &ctx, &["off"]).unwrap().unwrap();
        assert!(!ctx.registry.get(&ctx.ip).godmode);
    }

    #[test]
    fn godmode_disabled_in_config_is_wrong_arguments() {
        let (dispatcher, ctx) = fresh();
        ctx.config.write().unwrap().game.godmode.enabled = false;
        let reply = dispatcher.trigger("SOCKSERV-GODMODE", &ctx, &["on"]).unwrap();
        assert_eq!(reply, Err("Wrong arguments".to_string()));
        assert!(!ctx.registry.get(&ctx.ip).godmode);
    }

    #[test]
    fn bad_px_arity_is_an_error() {
        let (dispatcher, ctx) = fresh();
        let reply = dispatcher.trigger("SOCKSERV-PX", &ctx, &["1"]).unwrap();
        assert!(reply.is_err());
    }
}
