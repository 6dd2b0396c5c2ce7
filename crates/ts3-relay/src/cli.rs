//! CLI (command line interface).
//!
//! The relay has no persisted configuration of its own (§6 EXTERNAL
//! INTERFACES): everything it needs comes from environment variables, with
//! the same `structopt`-with-`env` pattern the bot's other binaries use.

use std::fmt;

use rand::RngCore as _;
use structopt::StructOpt;
use voicebeacon_log::slog;

/// CLI (command line interface) of the UDP Relay.
#[derive(Clone, Debug, StructOpt)]
#[structopt(about = "WebSocket-to-UDP relay for the TS3 voice-protocol engine")]
pub struct Opts {
    /// Port for the relay to listen WebSocket upgrade requests on.
    #[structopt(
        long,
        env = "PROXY_PORT",
        default_value = "9988",
        help = "Port to listen WebSocket upgrades on"
    )]
    pub port: u16,

    /// Shared secret the `token` query parameter must match.
    ///
    /// If unset, a random 16-byte hex token is generated at startup and
    /// logged, since the relay has no other way to hand it to its clients.
    #[structopt(long, env = "PROXY_SECRET", help = "Shared auth token")]
    pub secret: Option<String>,

    /// Verbosity level of the relay's logs.
    #[structopt(
        short,
        long,
        parse(try_from_str = Self::parse_log_level),
        help = "Logs verbosity level: \
                OFF | CRIT | ERRO | WARN | INFO | DEBG | TRCE"
    )]
    pub verbose: Option<slog::Level>,
}

impl Opts {
    /// Parses CLI [`Opts`] from command line arguments.
    ///
    /// Prints the error message and quits the program in case of failure.
    #[inline]
    #[must_use]
    pub fn from_args() -> Self {
        <Self as StructOpt>::from_args()
    }

    /// Resolves the configured secret, generating and logging a random one
    /// if none was given.
    #[must_use]
    pub fn resolve_secret(&self) -> String {
        self.secret.clone().unwrap_or_else(|| {
            let mut raw = [0_u8; 16];
            rand::thread_rng().fill_bytes(&mut raw);
            let token = hex::encode(raw);
            voicebeacon_log::log::warn!(
                "No PROXY_SECRET set, generated one for this run: {}",
                token
            );
            token
        })
    }

    /// Parses [`slog::Level`] from the given string.
    ///
    /// This function is required, because [`slog::Level`]'s [`FromStr`]
    /// implementation returns `()`, which is not [`Display`] as
    /// [`StructOpt`] requires.
    ///
    /// # Errors
    ///
    /// If [`slog::Level`] failed to parse from the string.
    ///
    /// [`Display`]: std::fmt::Display
    /// [`FromStr`]: std::str::FromStr
    pub fn parse_log_level(lvl: &str) -> Result<slog::Level, anyhow::Error> {
        use std::str::FromStr as _;
        #[allow(clippy::map_err_ignore)]
        slog::Level::from_str(lvl).map_err(|_| {
            anyhow::anyhow!(
                "'{}' is invalid verbosity level, allowed levels are: \
                 OFF | CRIT | ERRO | WARN | INFO | DEBG | TRCE",
                lvl,
            )
        })
    }
}

/// Error type indicating non-zero process exit code.
pub struct Failure;

impl fmt::Debug for Failure {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "")
    }
}

impl From<()> for Failure {
    #[inline]
    fn from(_: ()) -> Self {
        Self
    }
}
