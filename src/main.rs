//! `voicebeacon` — a demonstration client for the TS3 voice-protocol
//! engine: connects to one server, joins a channel, and logs every
//! [`ts3_proto::Event`] it receives until told to shut down.

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

mod cli;

use futures::{future, FutureExt as _};
use tokio::io;
use voicebeacon_log::log;

use ts3_proto::{Config, Connection, Event};

#[tokio::main]
async fn main() -> Result<(), cli::Failure> {
    let opts = cli::Opts::from_args();

    // This guard should be held till the end of the program for the logger
    // to present in global context.
    let _log_guard = voicebeacon_log::init(opts.verbose);

    let res = future::select(
        Box::pin(async {
            run(opts).await.map_err(|e| log::crit!("Cannot run: {}", e))
        }),
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

    res.map_err(Into::into)
}

async fn run(opts: cli::Opts) -> Result<(), anyhow::Error> {
    let config = Config {
        host: opts.host,
        port: opts.port,
        nickname: opts.nickname,
        default_channel: opts.channel,
        server_password: opts.server_password,
        hwid: None,
        relay_url: opts.relay_url,
        relay_token: opts.relay_token,
        strict_license: false,
    };

    log::info!("Connecting to {}:{}...", config.host, config.port);
    let conn = Connection::connect(config)
        .await
        .map_err(|e| anyhow::anyhow!("Handshake failed: {}", e))?;

    while let Some(event) = conn.next_event().await {
        match event {
            Event::Connected { virtual_server_name } => {
                log::info!("Connected to \"{}\"", virtual_server_name);
            }
            Event::Disconnected { reason } => {
                log::info!("Disconnected: {}", reason);
                break;
            }
            Event::Error { kind, detail } => {
                log::warn!("Engine error ({:?}): {}", kind, detail);
            }
            Event::TextMessage {
                mode,
                text,
                invoker_name,
                invoker_id,
            } => {
                log::info!(
                    "[{:?}] {} (#{:?}): {}",
                    mode,
                    invoker_name,
                    invoker_id,
                    text
                );
            }
            Event::Warning(detail) => {
                log::warn!("{}", detail);
            }
        }
    }

    Ok(())
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
