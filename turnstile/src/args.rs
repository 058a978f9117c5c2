use std::{borrow::Cow, fmt, io::IsTerminal, net::SocketAddr, path::PathBuf, str::FromStr};

use clap::{Parser, ValueEnum};
use config::Config;
use logforth::filter::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "Turnstile", version, long_about = concat!("Turnstile admission controller v", env!("CARGO_PKG_VERSION")))]
pub struct Args {
    /// IP address on which the server will listen for incoming connections.
    /// Default: 127.0.0.1:6000
    #[arg(short, long, env = "TURNSTILE_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,
    /// Path to the TOML configuration file
    #[arg(long, short, env = "TURNSTILE_CONFIG_PATH", default_value = "./turnstile.toml")]
    pub config: PathBuf,
    /// Set the logging level for the workspace crates. Dependencies log warnings only.
    #[arg(long = "log", env = "TURNSTILE_LOG", default_value_t = LogLevel::default())]
    pub log_level: LogLevel,
    /// Set the style of log output
    #[arg(long, env = "TURNSTILE_LOG_STYLE", default_value_t = LogStyle::default())]
    pub log_style: LogStyle,
    /// Validate the configuration, print the effective tier quotas and exit.
    #[arg(long)]
    pub check: bool,
}

impl Args {
    /// The configuration file, or the built-in defaults when it does not exist.
    pub fn config(&self) -> anyhow::Result<Config> {
        if self.config.exists() {
            Config::load(&self.config)
        } else {
            Ok(Config::default())
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum LogStyle {
    /// Colorized text, used as the default with TTY output
    Color,
    /// Standard text, used as the default with non-TTY output
    Text,
    /// JSON objects
    Json,
}

impl Default for LogStyle {
    fn default() -> Self {
        if std::io::stdout().is_terminal() {
            LogStyle::Color
        } else {
            LogStyle::Text
        }
    }
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum LogLevel {
    /// Disable logging
    Off,
    /// Only log errors, including requests denied because no store could decide
    Error,
    /// Also log primary store failures
    Warn,
    /// Also log startup and configuration messages
    #[default]
    Info,
    /// Also log every rejection
    Debug,
    /// Log everything
    Trace,
}

impl LogLevel {
    pub fn env_filter(self) -> EnvFilter {
        let filter = match self {
            LogLevel::Off => Cow::Borrowed("off"),
            level => Cow::Owned(
                WORKSPACE_CRATES
                    .iter()
                    .fold(String::from("warn"), |filter, krate| format!("{filter},{krate}={level}")),
            ),
        };

        EnvFilter::from_str(&filter).expect("These all are valid env filters.")
    }
}

/// Crates logging at the selected level. Everything else logs warnings only.
const WORKSPACE_CRATES: [&str; 5] = ["turnstile", "server", "rate_limit", "config", "telemetry"];

fn value_name<T: ValueEnum>(value: &T, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value.to_possible_value() {
        Some(possible) => f.write_str(possible.get_name()),
        None => Ok(()),
    }
}

impl fmt::Display for LogStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        value_name(self, f)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        value_name(self, f)
    }
}
