//! The TCP line-protocol session: reads newline-terminated commands, enforces the per-client
//! cooldown on pixel writes, and dispatches everything else straight through.
//!
//! Reads a line, splits it into verb and arguments, checks the cooldown only on a pixel
//! placement, and dispatches by name, using `tokio`'s split-stream idiom the way a line-buffered
//! Pixelflut parser reads into a shared buffer.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::const_settings::{MAX_LINE_BYTES, REPLY_PREFIX};
use crate::context::ServerContext;

pub const DISCONNECT_TAKEOVER_MESSAGE: &str =
    "You were disconnected due to another connection with your IP address.";
pub const TIMEOUT_MESSAGE: &str = "Connection Timeout...";

/// A handle to an in-flight session's write half, shared with the listener so a takeover can
/// write a best-effort notification before the session task is aborted.
pub type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

async fn send_line(writer: &SharedWriter, body: &str) {
    let mut line = String::with_capacity(REPLY_PREFIX.len() + body.len() + 1);
    line.push_str(REPLY_PREFIX);
    line.push_str(body);
    line.push('\n');
    let mut guard = writer.lock().await;
    let _ = guard.write_all(line.as_bytes()).await;
}

/// Runs one client's command loop to completion. Returns when the client disconnects, times
/// out, or sends QUIT/EXIT. Takeover is handled externally (the listener aborts this task and
/// writes its own notification through `writer`).
pub async fn run(
    read_half: tokio::net::tcp::OwnedReadHalf,
    writer: SharedWriter,
    ip: String,
    ctx: Arc<ServerContext>,
    read_timeout: Duration,
) {
    ctx.registry.connect(&ip);
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::time::timeout(read_timeout, reader.read_line(&mut line)).await;

        let bytes_read = match read {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(ip = %ip, error = %e, "session i/o error");
                break;
            }
            Err(_) => {
                send_line(&writer, TIMEOUT_MESSAGE).await;
                break;
            }
        };

        if bytes_read == 0 {
            break; // EOF: client closed the connection.
        }
        if line.len() > MAX_LINE_BYTES {
            send_line(&writer, "Line too long").await;
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }

        let mut parts = trimmed.split_ascii_whitespace();
        let Some(verb) = parts.next() else { break };
        let verb = verb.to_ascii_uppercase();
        let args: Vec<&str> = parts.collect();

        let is_pixel_write = verb == "PX" && args.len() == 3;
        if is_pixel_write {
            let remaining = ctx.registry.cooldown_remaining(&ip);
            if !remaining.is_zero() {
                send_line(&writer, &cooldown_message(remaining)).await;
                continue;
            }
        }

        let event_name = format!("SOCKSERV-{verb}");
        let dispatch_ctx = ctx.dispatch_context(&ip);
        match ctx.dispatcher.trigger(&event_name, &dispatch_ctx, &args) {
            Some(Ok(reply)) => send_line(&writer, &reply).await,
            Some(Err(reply)) => send_line(&writer, &reply).await,
            None => send_line(&writer, "Wrong arguments").await,
        }

        if verb == "QUIT" || verb == "EXIT" {
            break;
        }
    }

    ctx.registry.disconnect(&ip);
    info!(ip = %ip, "session ended");
}

fn cooldown_message(remaining: Duration) -> String {
    if remaining >= Duration::from_secs(1) {
        format!("You are on cooldown for {:.2} seconds", remaining.as_secs_f64())
    } else {
        format!("You are on cooldown for {:.2} milliseconds", remaining.as_secs_f64() * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::config::test_support;
    use crate::context::{register_socket_handlers, ServerContext};
    use crate::dispatcher::Dispatcher;
    use crate::heartbeat::Heartbeat;
    use crate::registry::ClientRegistry;
    use crate::stats::Stats;
    use crate::store::PixelStore;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn cooldown_message_picks_unit_by_magnitude() {
        assert!(cooldown_message(Duration::from_millis(1500)).ends_with("seconds"));
        assert!(cooldown_message(Duration::from_millis(250)).ends_with("milliseconds"));
    }

    fn test_ctx(pps: f64) -> Arc<ServerContext> {
        let store = Arc::new(PixelStore::new(10, 10));
        let heartbeat = Heartbeat::new();
        let stats = Stats::new();
        let canvas = Canvas::new(store, heartbeat, stats.clone());
        canvas.spawn_render_tick(Some(200));
        let registry = Arc::new(ClientRegistry::new(pps, 1000.0));
        let dispatcher = Arc::new(Dispatcher::new());
        register_socket_handlers(&dispatcher);
        ServerContext::new(canvas, registry, stats, dispatcher, test_support::sample(), "unused".to_string())
    }

    async fn read_reply(client: &mut tokio::net::TcpStream) -> String {
        let mut buf = vec![0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).to_string()
    }

    /// Connect, write a pixel, read it back.
    #[tokio::test]
    async fn tcp_write_then_read_back() {
        let ctx = test_ctx(1000.0);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let ctx_for_server = ctx.clone();
        tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let ip = peer.ip().to_string();
            let (read_half, write_half) = stream.into_split();
            let writer: SharedWriter = Arc::new(Mutex::new(write_half));
            run(read_half, writer, ip, ctx_for_server, Duration::from_secs(5)).await;
        });

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client.write_all(b"PX 5 5 ff8800\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, "> PX Success\n");

        // Give the render tick a moment to drain the queue before reading back.
        tokio::time::sleep(Duration::from_millis(50)).await;

        client.write_all(b"PX 5 5\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, "> PX 5 5 ff8800\n");
    }

    /// A second write inside the cooldown window gets a cooldown reply, not a dispatch.
    #[tokio::test]
    async fn tcp_cooldown_reply_on_rapid_writes() {
        let ctx = test_ctx(2.0);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let ctx_for_server = ctx.clone();
        tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let ip = peer.ip().to_string();
            let (read_half, write_half) = stream.into_split();
            let writer: SharedWriter = Arc::new(Mutex::new(write_half));
            run(read_half, writer, ip, ctx_for_server, Duration::from_secs(5)).await;
        });

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client.write_all(b"PX 0 0 000000\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, "> PX Success\n");

        client.write_all(b"PX 1 0 000000\n").await.unwrap();
        let reply = read_reply(&mut client).await;
        assert!(reply.starts_with("> You are on cooldown for "));
        assert!(reply.trim_end().ends_with("milliseconds"));
    }

    /// GODMODE is gated on `game.godmode.enabled`; with the sample config it's on.
    #[tokio::test]
    async fn tcp_godmode_toggle_round_trip() {
        let ctx = test_ctx(1.0);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let ctx_for_server = ctx.clone();
        tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let ip = peer.ip().to_string();
            let (read_half, write_half) = stream.into_split();
            let writer: SharedWriter = Arc::new(Mutex::new(write_half));
            run(read_half, writer, ip, ctx_for_server, Duration::from_secs(5)).await;
        });

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GODMODE on\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, "> Godmode enabled\n");

        // Godmode waives cooldown: two rapid writes both succeed.
        client.write_all(b"PX 0 0 000000\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, "> PX Success\n");
        client.write_all(b"PX 1 0 000000\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, "> PX Success\n");
    }
}
