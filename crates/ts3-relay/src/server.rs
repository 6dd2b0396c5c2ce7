//! HTTP server: the WebSocket upgrade endpoint and the health check.

use std::collections::HashMap;
use std::time::Instant;

use actix_cors::Cors;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde::Serialize;
use tokio::net::UdpSocket;
use voicebeacon_log::log;

use crate::bridge::WsBridge;
use crate::clients::ClientTable;

/// Default target UDP port when the upgrade request's `port` parameter is
/// absent.
const DEFAULT_TARGET_PORT: u16 = 9987;

/// Shared state every worker thread's `App` is built with.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Shared secret the `token` query parameter must match.
    pub secret: String,
    /// When the process started, for the health endpoint's `uptime`.
    pub started_at: Instant,
    /// Registry of active sessions.
    pub table: ClientTable,
}

/// Runs the relay's HTTP server on `port`, serving the WebSocket upgrade on
/// `/` and the health check on `/health`.
///
/// # Errors
///
/// If the listener cannot bind. The actual error is logged.
pub async fn run(port: u16, state: AppState) -> Result<(), ()> {
    let data = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Cors::permissive())
            .route("/health", web::get().to(health))
            .route("/", web::get().to(ws_upgrade))
    })
    .bind(("0.0.0.0", port))
    .map_err(|e| log::error!("Relay: failed to bind on port {}: {}", port, e))?
    .run()
    .await
    .map_err(|e| log::error!("Relay: HTTP server error: {}", e))?;

    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime: f64,
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

/// `GET /?token=...&host=...&port=...` — upgrades to a WebSocket and bridges
/// it to a freshly bound UDP socket connected to `host:port`.
///
/// Rejects with 401 if `token` doesn't match the configured secret, before
/// any UDP socket is allocated; rejects with 400 if `host` is missing.
async fn ws_upgrade(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<HashMap<String, String>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let token = query.get("token").map(String::as_str).unwrap_or("");
    if token != state.secret {
        log::warn!("Relay: rejected upgrade with invalid token");
        return Ok(HttpResponse::Unauthorized().finish());
    }

    let host = match query.get("host") {
        Some(host) if !host.is_empty() => host.clone(),
        _ => {
            log::warn!("Relay: rejected upgrade with no target host");
            return Ok(HttpResponse::BadRequest().finish());
        }
    };
    let port = query
        .get("port")
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_TARGET_PORT);

    let socket = UdpSocket::bind(("0.0.0.0", 0))
        .await
        .map_err(crate::Error::from)
        .map_err(|e| {
            log::error!("Relay: {}", e);
            actix_web::error::ErrorInternalServerError(e)
        })?;
    socket
        .connect((host.as_str(), port))
        .await
        .map_err(crate::Error::from)
        .map_err(|e| {
            log::error!("Relay: {} (target {}:{})", e, host, port);
            actix_web::error::ErrorInternalServerError(e)
        })?;

    let conn_id = state.table.insert(host.clone(), port);
    log::info!("Relay session {} opened, forwarding to {}:{}", conn_id, host, port);

    let bridge = WsBridge::new(conn_id, socket, state.table.clone());
    actix_web_actors::ws::start(bridge, &req, stream)
}
