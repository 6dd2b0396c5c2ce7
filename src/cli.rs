//! CLI (command line interface) of the demonstration binary.

use std::fmt;

use structopt::StructOpt;
use voicebeacon_log::slog;

/// CLI (command line interface) of the `voicebeacon` demo binary: connects
/// to a single TS3 server and logs everything the engine reports.
#[derive(Clone, Debug, StructOpt)]
#[structopt(about = "TS3 voice-protocol engine demonstration client")]
pub struct Opts {
    /// TS3 server host to connect to.
    #[structopt(
        long,
        env = "TS3_HOST",
        help = "TS3 server host",
        long_help = "TS3 server host to connect to"
    )]
    pub host: String,

    /// TS3 server UDP port.
    #[structopt(
        long,
        env = "TS3_PORT",
        default_value = "9987",
        help = "TS3 server UDP port"
    )]
    pub port: u16,

    /// Display nickname to join with.
    #[structopt(
        long,
        env = "TS3_NICKNAME",
        default_value = "voicebeacon",
        help = "Display nickname to join with"
    )]
    pub nickname: String,

    /// Channel to join on connect, by name/path.
    #[structopt(long, env = "TS3_CHANNEL", help = "Channel to join on connect")]
    pub channel: Option<String>,

    /// Virtual server password.
    #[structopt(
        long,
        env = "TS3_SERVER_PASSWORD",
        help = "Virtual server password"
    )]
    pub server_password: Option<String>,

    /// UDP Relay URL, for deployments that block outbound UDP.
    ///
    /// Must be supplied together with [`Opts::relay_token`]; otherwise the
    /// engine connects over direct UDP.
    #[structopt(
        long,
        env = "TS3_RELAY_URL",
        help = "UDP Relay URL (ws://host:port)",
        long_help = "UDP Relay URL, for deployments that block outbound UDP. \
                     Must be supplied together with --relay-token; \
                     otherwise the engine connects over direct UDP."
    )]
    pub relay_url: Option<String>,

    /// UDP Relay shared-secret token.
    #[structopt(
        long,
        env = "TS3_RELAY_TOKEN",
        help = "UDP Relay shared-secret token"
    )]
    pub relay_token: Option<String>,

    /// Verbosity level of the engine's logs.
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
