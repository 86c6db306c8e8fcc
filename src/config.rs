//! Mount and pool configuration
//!
//! Mirrors the recognized options: database connection parameters, pool
//! floor/ceiling, the optional startup `fsck` pass, whether to background
//! the process once mounted, and where to send log output. Loaded from an
//! optional TOML file and overridable by CLI flags; CLI flags win.

use serde::Deserialize;
use std::path::Path;

/// Destination for log output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    Stdout,
    Stderr,
    File(String),
}

impl Default for LogTarget {
    fn default() -> Self {
        LogTarget::Stderr
    }
}

/// Connection and pool configuration, as read from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub port: Option<u16>,
    pub socket: Option<String>,
    pub mycnf_group: Option<String>,
    pub init_conns: Option<usize>,
    pub max_idling_conns: Option<usize>,
    pub fsck: Option<bool>,
    pub logfile: Option<String>,
    pub background: Option<bool>,
}

impl FileConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Fully resolved configuration: a file config merged with CLI overrides and
/// built-in defaults. CLI > file > default, per field.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub port: u16,
    pub socket: Option<String>,
    pub mycnf_group: Option<String>,
    pub init_conns: usize,
    pub max_idling_conns: usize,
    pub fsck: bool,
    pub log_target: LogTarget,
    pub background: bool,
}

impl Config {
    pub const DEFAULT_PORT: u16 = 3306;
    pub const DEFAULT_INIT_CONNS: usize = 1;
    pub const DEFAULT_MAX_IDLING_CONNS: usize = 5;

    /// Merge a parsed file config with CLI overrides and built-in defaults.
    /// `cli` fields of `None` defer to the file, then to the default.
    pub fn resolve(file: FileConfig, cli: CliOverrides) -> Self {
        let log_target = match cli.logfile.or(file.logfile) {
            Some(path) if path == "stdout" => LogTarget::Stdout,
            Some(path) if path == "stderr" => LogTarget::Stderr,
            Some(path) => LogTarget::File(path),
            None => LogTarget::default(),
        };

        Config {
            host: cli.host.or(file.host).unwrap_or_else(|| "localhost".to_string()),
            user: cli.user.or(file.user).unwrap_or_else(|| "root".to_string()),
            password: cli.password.or(file.password),
            database: cli.database.or(file.database).unwrap_or_else(|| "mysqlfs".to_string()),
            port: cli.port.or(file.port).unwrap_or(Self::DEFAULT_PORT),
            socket: cli.socket.or(file.socket),
            mycnf_group: cli.mycnf_group.or(file.mycnf_group),
            init_conns: cli.init_conns.or(file.init_conns).unwrap_or(Self::DEFAULT_INIT_CONNS),
            max_idling_conns: cli
                .max_idling_conns
                .or(file.max_idling_conns)
                .unwrap_or(Self::DEFAULT_MAX_IDLING_CONNS),
            fsck: cli.fsck || file.fsck.unwrap_or(false),
            log_target,
            background: cli.background || file.background.unwrap_or(false),
        }
    }
}

/// CLI-supplied overrides; every field is optional so the CLI layer can omit
/// flags the user didn't pass and let [`Config::resolve`] fall through to
/// the file config and then the defaults.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub port: Option<u16>,
    pub socket: Option<String>,
    pub mycnf_group: Option<String>,
    pub init_conns: Option<usize>,
    pub max_idling_conns: Option<usize>,
    pub fsck: bool,
    pub logfile: Option<String>,
    pub background: bool,
}
