//! UDP Relay: a WebSocket-to-UDP bridge for deployments that block outbound
//! UDP, letting the TS3 engine reach a voice server anyway.
//!
//! It is deliberately a dumb wire — see [`bridge::WsBridge`] — and carries
//! no knowledge of the TS3 wire protocol; it forwards opaque binary frames
//! to opaque UDP datagrams and back.

#![deny(
    broken_intra_doc_links,
    missing_debug_implementations,
    nonstandard_style,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![warn(
    deprecated_in_future,
    missing_docs,
    unreachable_pub,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

mod bridge;
pub mod cli;
mod clients;
mod error;
mod server;

use std::time::Instant;

use futures::{future, FutureExt as _};
use tokio::io;
use voicebeacon_log::log;

pub use clients::ClientTable;
pub use error::Error;

/// Maximum UDP datagram this relay will ever forward in either direction.
pub const MAX_DATAGRAM_LEN: usize = 2048;

/// Runs the relay.
///
/// # Errors
///
/// If the HTTP listener cannot bind, or listening for shutdown signals
/// fails. The actual error is logged.
#[actix_web::main]
pub async fn run() -> Result<(), cli::Failure> {
    let opts = cli::Opts::from_args();

    let _log_guard = voicebeacon_log::init(opts.verbose);

    let secret = opts.resolve_secret();
    let table = ClientTable::new();
    let state = server::AppState {
        secret,
        started_at: Instant::now(),
        table: table.clone(),
    };
    let port = opts.port;

    log::info!("Relay listening for WebSocket upgrades on port {}", port);

    let res = future::select(
        Box::pin(async move { server::run(port, state).await }),
        Box::pin(async {
            let res = shutdown_signal()
                .await
                .map(|s| log::info!("Received OS signal {}", s))
                .map_err(|e| log::error!("Failed to listen OS signals: {}", e));
            log::info!("Shutting down...");
            res
        }),
    )
    .await
    .factor_first()
    .0;

    table.close_all();

    res.map_err(Into::into)
}

/// Awaits the first OS signal for shutdown and returns its name.
///
/// # Errors
///
/// If listening to OS signals fails.
async fn shutdown_signal() -> io::Result<&'static str> {
    #[cfg(unix)]
    #[allow(clippy::mut_mut)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut pipe = signal(SignalKind::pipe())?;
        let mut quit = signal(SignalKind::quit())?;
        let mut terminate = signal(SignalKind::terminate())?;

        Ok(futures::select! {
            _ = hangup.recv().fuse() => "SIGHUP",
            _ = interrupt.recv().fuse() => "SIGINT",
            _ = pipe.recv().fuse() => "SIGPIPE",
            _ = quit.recv().fuse() => "SIGQUIT",
            _ = terminate.recv().fuse() => "SIGTERM",
        })
    }

    #[cfg(not(unix))]
    {
        use tokio::signal;

        signal::ctrl_c().await;
        Ok("ctrl-c")
    }
}
