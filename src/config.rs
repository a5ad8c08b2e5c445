//! Server configuration, parsed from command-line arguments.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on (also used in share links)
    pub port: u16,
    /// Where uploaded files are kept while their share is live
    pub upload_dir: PathBuf,
    /// How long a share lives
    pub ttl: Duration,
    /// Address to put in share links instead of the discovered one
    pub public_host: Option<IpAddr>,
    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            upload_dir: PathBuf::from("uploads"),
            ttl: crate::DEFAULT_TTL,
            public_host: None,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(Config),
    Help,
    Version,
}

/// Errors from parsing the command line.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

impl Config {
    /// Parses configuration from command-line arguments (program name
    /// excluded).
    pub fn parse<I>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--host" | "-h" => config.host = value(&flag, args.next())?,
                "--port" | "-p" => config.port = parsed(&flag, args.next())?,
                "--upload-dir" | "-d" => config.upload_dir = PathBuf::from(value(&flag, args.next())?),
                "--ttl" => {
                    let secs: u64 = parsed(&flag, args.next())?;
                    if secs == 0 {
                        return Err(ConfigError::InvalidValue {
                            flag,
                            value: secs.to_string(),
                        });
                    }
                    config.ttl = Duration::from_secs(secs);
                }
                "--public-host" => config.public_host = Some(parsed(&flag, args.next())?),
                "--max-upload-mb" => {
                    let mb: usize = parsed(&flag, args.next())?;
                    config.max_upload_bytes = mb.saturating_mul(1024 * 1024);
                }
                "--help" => return Ok(CliAction::Help),
                "--version" | "-v" => return Ok(CliAction::Version),
                _ => return Err(ConfigError::UnknownArgument(flag)),
            }
        }

        Ok(CliAction::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn value(flag: &str, next: Option<String>) -> Result<String, ConfigError> {
    next.ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn parsed<T: std::str::FromStr>(flag: &str, next: Option<String>) -> Result<T, ConfigError> {
    let raw = value(flag, next)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: raw,
    })
}
