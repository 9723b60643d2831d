pub mod canvas;
pub mod cli;
pub mod config;
pub mod const_settings;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod http;
pub mod listener;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod stats;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::canvas::Canvas;
use crate::cli::Cli;
use crate::config::Config;
use crate::context::{register_socket_handlers, ServerContext};
use crate::dispatcher::Dispatcher;
use crate::heartbeat::Heartbeat;
use crate::listener::TcpFrontend;
use crate::registry::ClientRegistry;
use crate::stats::Stats;
use crate::store::PixelStore;

fn init_logging(level: u8, force_debug: bool) {
    let filter = if force_debug {
        "debug".to_string()
    } else {
        match level {
            0 => "error".to_string(),
            1 => "warn".to_string(),
            2 => "info".to_string(),
            3 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    init_logging(config.logging.level, cli.debug);
    info!(config_path = %cli.config, "loaded configuration");

    let store = Arc::new(PixelStore::new(
        config.visuals.size.width,
        config.visuals.size.height,
    ));

    if config.backup.enabled {
        snapshot::restore_newest(&PathBuf::from(&config.backup.directory), &store);
    }

    let heartbeat = Heartbeat::new();
    heartbeat.clone().spawn();

    let stats = Stats::new();
    let canvas = Canvas::new(store.clone(), heartbeat.clone(), stats.clone());
    canvas.spawn_render_tick(None);

    let registry = Arc::new(ClientRegistry::new(config.game.pps, config.game.godmode.pps));

    let dispatcher = Arc::new(Dispatcher::new());
    register_socket_handlers(&dispatcher);

    let server_ctx = ServerContext::new(
        canvas.clone(),
        registry,
        stats,
        dispatcher,
        config.clone(),
        cli.config.clone(),
    );

    let mut background_tasks = Vec::new();

    if config.backup.enabled {
        background_tasks.push(snapshot::spawn_backup_loop(
            store.clone(),
            PathBuf::from(&config.backup.directory),
            Duration::from_secs(config.backup.interval),
            Duration::from_secs(config.backup.delete),
        ));
    }

    if config.timelapse.enabled {
        background_tasks.push(snapshot::spawn_timelapse_loop(
            store.clone(),
            PathBuf::from(&config.timelapse.directory),
            Duration::from_secs(config.timelapse.interval),
        ));
    }

    if config.frontend.sockets.enabled {
        let frontend = TcpFrontend::new();
        let addr = format!("{}:{}", config.connection.host, config.connection.ports.socket);
        let read_timeout = Duration::from_secs(config.connection.timeout);
        let ctx = server_ctx.clone();
        background_tasks.push(tokio::spawn(async move {
            frontend.serve(addr, ctx, read_timeout).await;
        }));
        info!("tcp socket frontend enabled");
    }

    if config.frontend.api.enabled {
        let addr: std::net::SocketAddr =
            format!("{}:{}", config.connection.host, config.connection.ports.api)
                .parse()
                .expect("invalid api bind address");
        let routes = http::routes(server_ctx.clone());
        background_tasks.push(tokio::spawn(async move {
            warp::serve(routes).run(addr).await;
        }));
        info!(%addr, "http api frontend enabled");
    }

    if background_tasks.is_empty() {
        error!("no frontend is running; config validation should have prevented this");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");
    Ok(())
}
