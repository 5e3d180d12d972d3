//! Configuration management for the backup service.
//!
//! Loads configuration from a TOML file, then applies environment variable
//! overrides (a `.env` file in the working directory is honoured too).

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub backup: BackupConfig,
    pub tools: ToolsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted restore upload, in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// JDBC-style connection URL, e.g. `jdbc:postgresql://db:5432/cantinho_db`
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_database_username")]
    pub username: String,

    #[serde(default)]
    pub password: Secret,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Directory for in-flight artifacts (system temp dir when unset)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    #[serde(default = "default_dump_timeout_secs")]
    pub dump_timeout_secs: u64,

    #[serde(default = "default_restore_timeout_secs")]
    pub restore_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_dump_command")]
    pub dump: ToolCommand,

    #[serde(default = "default_script_apply_command")]
    pub script_apply: ToolCommand,

    #[serde(default = "default_archive_restore_command")]
    pub archive_restore: ToolCommand,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// A string that never shows up in `Debug` output.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Command prefix used to launch an external tool.
///
/// In TOML either a string (`"pg_dump"`, split on whitespace) or an array
/// (`["nice", "-n", "10", "pg_dump"]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
}

impl<'de> Deserialize<'de> for ToolCommand {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Line(String),
            Argv(Vec<String>),
        }

        let argv: Vec<String> = match Raw::deserialize(deserializer)? {
            Raw::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            Raw::Argv(argv) => argv,
        };
        let mut parts = argv.into_iter();
        let program = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| D::Error::custom("tool command must not be empty"))?;
        Ok(ToolCommand {
            program,
            args: parts.collect(),
        })
    }
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a fixed leading argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

// Default values
fn default_port() -> u16 {
    8081
}

fn default_max_upload_mb() -> usize {
    512
}

fn default_database_url() -> String {
    "jdbc:postgresql://db:5432/cantinho_db".to_string()
}

fn default_database_username() -> String {
    "postgres".to_string()
}

fn default_dump_timeout_secs() -> u64 {
    10 * 60
}

fn default_restore_timeout_secs() -> u64 {
    30 * 60
}

fn default_dump_command() -> ToolCommand {
    ToolCommand::new("pg_dump")
}

fn default_script_apply_command() -> ToolCommand {
    ToolCommand::new("psql")
}

fn default_archive_restore_command() -> ToolCommand {
    ToolCommand::new("pg_restore")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            username: default_database_username(),
            password: Secret::default(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            dump_timeout_secs: default_dump_timeout_secs(),
            restore_timeout_secs: default_restore_timeout_secs(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            dump: default_dump_command(),
            script_apply: default_script_apply_command(),
            archive_restore: default_archive_restore_command(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl BackupConfig {
    pub fn dump_timeout(&self) -> Duration {
        Duration::from_secs(self.dump_timeout_secs)
    }

    pub fn restore_timeout(&self) -> Duration {
        Duration::from_secs(self.restore_timeout_secs)
    }

    /// Directory in which temporary artifacts are created
    pub fn scratch_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus the environment
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    ///
    /// Both the plain names and the Spring-style names used by the main
    /// application's deployment are recognised.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(*k));

        if let Some(url) = first(&["DATABASE_URL", "SPRING_DATASOURCE_URL"]) {
            self.database.url = url;
        }
        if let Some(user) = first(&["DATABASE_USERNAME", "SPRING_DATASOURCE_USERNAME"]) {
            self.database.username = user;
        }
        if let Some(password) = first(&["DATABASE_PASSWORD", "SPRING_DATASOURCE_PASSWORD"]) {
            self.database.password = Secret::new(password);
        }
        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(dir) = lookup("BACKUP_TEMP_DIR") {
            self.backup.temp_dir = Some(PathBuf::from(dir));
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.backup.dump_timeout_secs == 0 || self.backup.restore_timeout_secs == 0 {
            anyhow::bail!("backup timeouts must be greater than zero");
        }
        if self.database.username.trim().is_empty() {
            anyhow::bail!("database username must not be empty");
        }
        Ok(())
    }
}
