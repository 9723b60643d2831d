//! The REST surface, built from small composable `warp` filters.
//!
//! Shared state is injected into each route with a `with_<state>()` helper
//! (`warp::any().map(move || state.clone())`), generalized from one piece of shared state to
//! the full `ServerContext`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::error;
use warp::http::StatusCode;
use warp::reply::Reply;
use warp::Filter;

use crate::context::ServerContext;
use crate::store::Rgb;

fn with_ctx(
    ctx: Arc<ServerContext>,
) -> impl Filter<Extract = (Arc<ServerContext>,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn with_peer() -> impl Filter<Extract = (SocketAddr,), Error = Infallible> + Clone {
    warp::addr::remote().map(|addr: Option<SocketAddr>| {
        addr.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)))
    })
}

pub fn routes(
    ctx: Arc<ServerContext>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    canvas_image(ctx.clone())
        .or(canvas_size(ctx.clone()))
        .or(canvas_pps(ctx.clone()))
        .or(canvas_pixel_get(ctx.clone()))
        .or(canvas_pixel_put(ctx.clone()))
        .or(canvas_since(ctx.clone()))
        .or(login(ctx.clone()))
        .or(admin_pixel(ctx.clone()))
        .or(admin_reload(ctx))
}

fn canvas_image(
    ctx: Arc<ServerContext>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    warp::path!("canvas" / "")
        .and(warp::get())
        .and(with_ctx(ctx))
        .map(|ctx: Arc<ServerContext>| {
            let png = crate::snapshot::encode_png(ctx.canvas.store());
            match png {
                Ok(bytes) => {
                    let now = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
                    warp::reply::with_header(
                        warp::reply::with_header(
                            warp::reply::with_header(bytes, "Content-Type", "image/png"),
                            "Cache-Control",
                            "no-cache",
                        ),
                        "Last-Modified",
                        now,
                    )
                    .into_response()
                }
                Err(e) => {
                    error!(error = %e, "failed to encode canvas image");
                    warp::reply::with_status(
                        "failed to encode canvas".to_string(),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )
                    .into_response()
                }
            }
        })
}

#[derive(Serialize)]
struct SizeReply {
    x: usize,
    y: usize,
}

fn canvas_size(
    ctx: Arc<ServerContext>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    warp::path!("canvas" / "size")
        .and(warp::get())
        .and(with_ctx(ctx))
        .map(|ctx: Arc<ServerContext>| {
            warp::reply::json(&SizeReply {
                x: ctx.canvas.width(),
                y: ctx.canvas.height(),
            })
        })
}

fn canvas_pps(
    ctx: Arc<ServerContext>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    warp::path!("canvas" / "pps")
        .and(warp::get())
        .and(with_peer())
        .and(with_ctx(ctx))
        .map(|addr: SocketAddr, ctx: Arc<ServerContext>| {
            let info = ctx.registry.get(&addr.ip().to_string());
            warp::reply::json(&serde_json::json!({ "pps": info.pps }))
        })
}

fn canvas_pixel_get(
    ctx: Arc<ServerContext>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    warp::path!("canvas" / "pixel")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_ctx(ctx))
        .map(|q: HashMap<String, String>, ctx: Arc<ServerContext>| {
            let (x, y) = match parse_xy(&q) {
                Some(pair) => pair,
                None => return bad_request("missing or invalid x/y"),
            };
            match ctx.canvas.read(x, y) {
                Some(rgb) => warp::reply::with_status(rgb.to_hex(), StatusCode::OK).into_response(),
                None => out_of_bounds(x, y),
            }
        })
}

fn canvas_pixel_put(
    ctx: Arc<ServerContext>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    warp::path!("canvas" / "pixel")
        .and(warp::put())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_peer())
        .and(with_ctx(ctx))
        .map(
            |q: HashMap<String, String>, addr: SocketAddr, ctx: Arc<ServerContext>| {
                let (x, y) = match parse_xy(&q) {
                    Some(pair) => pair,
                    None => return bad_request("missing or invalid x/y"),
                };
                let Some(color_raw) = q.get("color") else {
                    return bad_request("missing color");
                };
                let Some((rgb, a)) = parse_color(color_raw) else {
                    return bad_request("invalid color format");
                };
                if x < 0 || y < 0 || !ctx.canvas.store().in_write_bounds(x as usize, y as usize) {
                    return out_of_bounds(x, y);
                }

                let ip = addr.ip().to_string();
                let remaining = ctx.registry.cooldown_remaining(&ip);
                if !remaining.is_zero() {
                    return warp::reply::with_status(
                        format!("on cooldown for {} ms", remaining.as_millis()),
                        StatusCode::FORBIDDEN,
                    )
                    .into_response();
                }

                ctx.canvas.enqueue(x, y, rgb.r, rgb.g, rgb.b, a);
                ctx.registry.mark_write(&ip);
                warp::reply::with_status("accepted".to_string(), StatusCode::CREATED).into_response()
            },
        )
}

#[derive(Deserialize)]
struct SinceQuery {
    timestamp: u32,
    #[serde(default)]
    raw: bool,
}

fn canvas_since(
    ctx: Arc<ServerContext>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    warp::path!("canvas" / "since")
        .and(warp::get())
        .and(warp::query::<SinceQuery>())
        .and(with_ctx(ctx))
        .then(|q: SinceQuery, ctx: Arc<ServerContext>| async move {
            let config = ctx.config.read().expect("config lock poisoned");
            let threshold = config.http.delta_redirect_threshold;
            let force_reload = config.frontend.web.force_reload;
            drop(config);

            let delta = ctx.canvas.store().delta_since(q.timestamp);
            if force_reload || (!q.raw && delta.len() > threshold) {
                return warp::redirect::found(
                    warp::http::Uri::from_static("/canvas/"),
                )
                .into_response();
            }
            let body: Vec<(usize, usize, String)> = delta
                .into_iter()
                .map(|(x, y, rgb)| (x, y, rgb.to_hex()))
                .collect();
            warp::reply::json(&body).into_response()
        })
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct TokenReply {
    access_token: String,
    token_type: &'static str,
}

/// Pool of status codes a failed `/login` draws from. Matches the original server's
/// `LOGIN_CODES` table: most codes in the 2xx-5xx range, not just the ones that "make sense"
/// for bad credentials.
const LOGIN_CODES: &[u16] = &[
    200, 201, 202, 203, 204, 205, 206, 207, 208, 226, 300, 301, 302, 303, 304, 305, 306, 307, 308,
    400, 401, 402, 403, 404, 405, 406, 407, 408, 409, 410, 411, 412, 413, 414, 415, 416, 417, 418,
    421, 422, 423, 424, 425, 426, 428, 429, 431, 451, 500, 501, 502, 503, 504, 505, 506, 507, 508,
    510, 511,
];

fn login(
    ctx: Arc<ServerContext>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    warp::path!("login")
        .and(warp::post())
        .and(warp::body::form())
        .and(with_ctx(ctx))
        .then(|form: LoginForm, ctx: Arc<ServerContext>| async move {
            let config = ctx.config.read().expect("config lock poisoned");
            if form.username == config.admin.username && form.password == config.admin.password {
                warp::reply::json(&TokenReply {
                    access_token: config.admin.token.clone(),
                    token_type: "bearer",
                })
                .into_response()
            } else {
                // Bad credentials deliberately return a randomly chosen status code from a wide
                // pool rather than a consistent 401, matching the upstream login endpoint's
                // intentional obfuscation.
                let code = LOGIN_CODES[rand::thread_rng().gen_range(0..LOGIN_CODES.len())];
                let status = StatusCode::from_u16(code).unwrap_or(StatusCode::UNAUTHORIZED);
                warp::reply::with_status("invalid credentials".to_string(), status).into_response()
            }
        })
}

#[derive(Deserialize)]
struct AdminPixelBody {
    pixels: Vec<(i64, i64, String)>,
}

fn admin_pixel(
    ctx: Arc<ServerContext>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    warp::path!("admin" / "pixel")
        .and(warp::put())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .and(with_ctx(ctx))
        .then(
            |auth: Option<String>, body: AdminPixelBody, ctx: Arc<ServerContext>| async move {
                if !admin_enabled(&ctx) {
                    return warp::reply::with_status(
                        "admin endpoints disabled".to_string(),
                        StatusCode::NOT_FOUND,
                    )
                    .into_response();
                }
                if !authorized(&auth, &ctx) {
                    return warp::reply::with_status(
                        "unauthorized".to_string(),
                        StatusCode::UNAUTHORIZED,
                    )
                    .into_response();
                }
                for (x, y, raw) in body.pixels {
                    let Some((rgb, a)) = parse_color(&raw) else {
                        return warp::reply::with_status(
                            format!("malformed color: {raw}"),
                            StatusCode::UNPROCESSABLE_ENTITY,
                        )
                        .into_response();
                    };
                    ctx.canvas.put_now(x, y, rgb.r, rgb.g, rgb.b, a);
                }
                warp::reply::with_status("applied".to_string(), StatusCode::OK).into_response()
            },
        )
}

fn admin_reload(
    ctx: Arc<ServerContext>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    warp::path!("admin" / "reload")
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_ctx(ctx))
        .then(|auth: Option<String>, ctx: Arc<ServerContext>| async move {
            if !admin_enabled(&ctx) {
                return warp::reply::with_status(
                    "admin endpoints disabled".to_string(),
                    StatusCode::NOT_FOUND,
                )
                .into_response();
            }
            if !authorized(&auth, &ctx) {
                return warp::reply::with_status(
                    "unauthorized".to_string(),
                    StatusCode::UNAUTHORIZED,
                )
                .into_response();
            }
            match crate::config::Config::load(&ctx.config_path) {
                Ok(new_config) => {
                    *ctx.config.write().expect("config lock poisoned") = new_config;
                    warp::reply::with_status("reloaded".to_string(), StatusCode::OK).into_response()
                }
                Err(e) => {
                    error!(error = %e, "config reload failed");
                    warp::reply::with_status(
                        format!("reload failed: {e}"),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )
                    .into_response()
                }
            }
        })
}

/// `frontend.api.enable_admin` gates both admin routes: disabled, they 404 rather than 401, so
/// their existence isn't even disclosed.
fn admin_enabled(ctx: &Arc<ServerContext>) -> bool {
    ctx.config.read().expect("config lock poisoned").frontend.api.enable_admin
}

fn authorized(auth: &Option<String>, ctx: &Arc<ServerContext>) -> bool {
    let Some(header) = auth else { return false };
    let Some(token) = header.strip_prefix("Bearer ") else {
        return false;
    };
    token == ctx.config.read().expect("config lock poisoned").admin.token
}

fn parse_xy(q: &HashMap<String, String>) -> Option<(i64, i64)> {
    let x: i64 = q.get("x")?.parse().ok()?;
    let y: i64 = q.get("y")?.parse().ok()?;
    Some((x, y))
}

fn parse_color(raw: &str) -> Option<(Rgb, u8)> {
    match raw.len() {
        6 => Some((Rgb::from_hex(raw)?, 255)),
        8 => {
            let rgb = Rgb::from_hex(&raw[0..6])?;
            let a = u8::from_str_radix(&raw[6..8], 16).ok()?;
            Some((rgb, a))
        }
        _ => None,
    }
}

fn bad_request(detail: &str) -> warp::reply::Response {
    warp::reply::with_status(detail.to_string(), StatusCode::UNPROCESSABLE_ENTITY).into_response()
}

fn out_of_bounds(x: i64, y: i64) -> warp::reply::Response {
    warp::reply::with_status(
        format!("coordinate ({x}, {y}) out of bounds"),
        StatusCode::UNPROCESSABLE_ENTITY,
    )
    .into_response()
}
