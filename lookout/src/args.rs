use std::{borrow::Cow, fmt, io::IsTerminal, net::SocketAddr, path::PathBuf, str::FromStr};

use clap::{Parser, ValueEnum};
use config::Config;
use logforth::filter::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "Lookout", version, long_about = concat!("Lookout object detection service v", env!("CARGO_PKG_VERSION")))]
pub struct Args {
    /// IP address on which the server will listen for incomming connections.
    /// Default: 127.0.0.1:8080
    #[arg(short, long, env = "LOOKOUT_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,
    /// Path to the TOML configuration file
    #[arg(long, short, env = "LOOKOUT_CONFIG_PATH", default_value = "./lookout.toml")]
    pub config: PathBuf,
    /// Set the logging level
    #[arg(long = "log", env = "LOOKOUT_LOG", default_value_t = LogLevel::default())]
    pub log_level: LogLevel,
    /// Set the style of log output
    #[arg(long, env = "LOOKOUT_LOG_STYLE", default_value_t = LogStyle::default())]
    pub log_style: LogStyle,
    /// Requests admitted per client within one second, overriding the configuration
    #[arg(long, env = "RPS_LIMIT")]
    pub rps_limit: Option<u32>,
    /// Uploads admitted per client within one minute, overriding the configuration
    #[arg(long, env = "UPLOADS_PER_MIN")]
    pub uploads_per_min: Option<u32>,
    /// Database connection URL, overriding the configuration
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

impl Args {
    pub fn config(&self) -> anyhow::Result<Config> {
        let mut config = if self.config.exists() {
            Config::load(&self.config)?
        } else {
            Config::default()
        };

        if let Some(limit) = self.rps_limit {
            config.server.rate_limits.requests_per_second = limit;
        }

        if let Some(limit) = self.uploads_per_min {
            config.server.rate_limits.uploads_per_minute = limit;
        }

        if let Some(url) = &self.database_url {
            config.database.url = url.clone();
        }

        config.validate()?;

        Ok(config)
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

impl AsRef<str> for LogStyle {
    fn as_ref(&self) -> &str {
        match self {
            LogStyle::Color => "color",
            LogStyle::Text => "text",
            LogStyle::Json => "json",
        }
    }
}

impl fmt::Display for LogStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum LogLevel {
    /// Disable logging
    Off,
    /// Only log errors
    Error,
    /// Log errors, and warnings
    Warn,
    /// Log errors, warnings, and info messages
    #[default]
    Info,
    /// Log errors, warnings, info, and debug messages
    Debug,
    /// Log errors, warnings, info, debug, and trace messages
    Trace,
}

impl LogLevel {
    pub fn env_filter(self) -> EnvFilter {
        let filter_str = match self {
            LogLevel::Off => Cow::Borrowed("off"),
            // Third-party crates stay at warn, workspace crates follow the selected level.
            level => Cow::Owned(format!(
                "warn,lookout={level},server={level},config={level},storage={level},\
                 rate_limit={level},retention={level},detector={level}"
            )),
        };

        EnvFilter::from_str(&filter_str).expect("These all are valid env filters.")
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
