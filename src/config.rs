//! Configuration management for the restic exporter.
//!
//! Supports loading configuration from:
//! - TOML configuration files
//! - Environment variables (with `RESTIC_EXPORTER__` prefix)
//! - restic's own variables (`RESTIC_REPOSITORY`, `RESTIC_PASSWORD`,
//!   `RESTIC_PASSWORD_FILE`, `RESTIC_PASSWORD_COMMAND`) as a fallback

use crate::error::{ExporterError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where restic obtains the repository password.
#[derive(Clone, PartialEq, Eq)]
pub enum PasswordSource {
    /// Literal password, passed as `RESTIC_PASSWORD`
    Literal(String),
    /// Password file, passed as `RESTIC_PASSWORD_FILE`
    File(PathBuf),
    /// Command printing the password, passed as `RESTIC_PASSWORD_COMMAND`
    Command(String),
}

impl PasswordSource {
    /// Environment variable restic reads this source from.
    pub fn env_var(&self) -> &'static str {
        match self {
            PasswordSource::Literal(_) => "RESTIC_PASSWORD",
            PasswordSource::File(_) => "RESTIC_PASSWORD_FILE",
            PasswordSource::Command(_) => "RESTIC_PASSWORD_COMMAND",
        }
    }

    /// Value handed to restic through [`Self::env_var`].
    pub fn env_value(&self) -> &std::ffi::OsStr {
        match self {
            PasswordSource::Literal(password) => password.as_ref(),
            PasswordSource::File(path) => path.as_os_str(),
            PasswordSource::Command(command) => command.as_ref(),
        }
    }

    /// The secret text itself, if this source carries one.
    pub fn secret(&self) -> Option<&str> {
        match self {
            PasswordSource::Literal(password) => Some(password),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PasswordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordSource::Literal(_) => f.write_str("Literal(***REDACTED***)"),
            PasswordSource::File(path) => f.debug_tuple("File").field(path).finish(),
            PasswordSource::Command(_) => f.write_str("Command(***REDACTED***)"),
        }
    }
}

/// restic invocation settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ResticConfig {
    /// Repository location (e.g., "s3:s3.amazonaws.com/bucket/restic")
    #[serde(default)]
    pub repository: String,

    /// Repository password
    #[serde(default)]
    pub password: Option<String>,

    /// Path to a file containing the repository password
    #[serde(default)]
    pub password_file: Option<PathBuf>,

    /// Command printing the repository password
    #[serde(default)]
    pub password_command: Option<String>,

    /// restic executable name or path
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Skip TLS certificate verification of the storage backend
    #[serde(default)]
    pub insecure_tls: bool,

    /// Per-invocation timeout in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
}

impl std::fmt::Debug for ResticConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResticConfig")
            .field("repository", &self.repository)
            .field("password", &self.password.as_ref().map(|_| "***REDACTED***"))
            .field("password_file", &self.password_file)
            .field(
                "password_command",
                &self.password_command.as_ref().map(|_| "***REDACTED***"),
            )
            .field("binary", &self.binary)
            .field("insecure_tls", &self.insecure_tls)
            .field("command_timeout_seconds", &self.command_timeout_seconds)
            .finish()
    }
}

impl ResticConfig {
    /// The single configured password source.
    pub fn password_source(&self) -> Result<PasswordSource> {
        let mut sources = Vec::with_capacity(1);
        if let Some(password) = self.password.as_ref().filter(|p| !p.is_empty()) {
            sources.push(PasswordSource::Literal(password.clone()));
        }
        if let Some(path) = self
            .password_file
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
        {
            sources.push(PasswordSource::File(path.clone()));
        }
        if let Some(command) = self.password_command.as_ref().filter(|c| !c.is_empty()) {
            sources.push(PasswordSource::Command(command.clone()));
        }

        match sources.len() {
            0 => Err(ExporterError::config(
                "One of password, password_file or password_command is mandatory",
            )),
            1 => Ok(sources.remove(0)),
            _ => Err(ExporterError::config(
                "password, password_file and password_command are mutually exclusive",
            )),
        }
    }

    /// Per-invocation timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }

    fn has_password_source(&self) -> bool {
        self.password.as_ref().is_some_and(|p| !p.is_empty())
            || self
                .password_file
                .as_ref()
                .is_some_and(|p| !p.as_os_str().is_empty())
            || self.password_command.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// Collection cycle settings and feature toggles.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    /// Seconds between collection cycles
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    /// Terminate the process when a cycle fails
    #[serde(default)]
    pub exit_on_error: bool,
    /// Skip `restic check`
    #[serde(default)]
    pub disable_check: bool,
    /// Skip repository-wide `restic stats --mode raw-data`
    #[serde(default)]
    pub disable_global_stats: bool,
    /// Skip per-snapshot `restic stats` for snapshots without a summary
    #[serde(default)]
    pub disable_legacy_stats: bool,
    /// Skip `restic list locks`
    #[serde(default)]
    pub disable_locks: bool,
    /// Expose snapshot paths as a label
    #[serde(default)]
    pub include_paths: bool,
    /// Expose the client hostname as a label
    #[serde(default = "default_true")]
    pub include_hostname: bool,
    /// Expose the client username as a label
    #[serde(default = "default_true")]
    pub include_username: bool,
}

impl CollectorConfig {
    /// Interval between collection cycles.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: default_refresh_interval(),
            exit_on_error: false,
            disable_check: false,
            disable_global_stats: false,
            disable_legacy_stats: false,
            disable_locks: false,
            include_paths: false,
            include_hostname: true,
            include_username: true,
        }
    }
}

/// Exporter specific settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterConfig {
    /// Address to listen on for metrics endpoint
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Main configuration structure for the restic exporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// restic invocation configuration
    pub restic: ResticConfig,

    /// Collection cycle configuration
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Exporter server configuration
    #[serde(default)]
    pub exporter: ExporterConfig,
}

fn default_binary() -> String {
    "restic".to_string()
}

fn default_command_timeout() -> u64 {
    1800
}

fn default_refresh_interval() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

fn default_listen_address() -> String {
    "0.0.0.0:8001".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load configuration from a file and environment variables.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Optional path to configuration file
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use restic_exporter::config::Settings;
    ///
    /// let settings = Settings::load(Some("config/default.toml")).unwrap();
    /// ```
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        Self::load_from(config_path, Self::environment(), |name| {
            std::env::var(name).ok()
        })
    }

    /// `RESTIC_EXPORTER__*` variables. Values stay strings so passwords
    /// such as `007` survive; typed fields are converted on deserialization.
    fn environment() -> config::Environment {
        config::Environment::with_prefix("RESTIC_EXPORTER").separator("__")
    }

    fn load_from<F>(
        config_path: Option<&str>,
        environment: config::Environment,
        restic_env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = config::Config::builder()
            .set_default("restic.repository", "")?
            .set_default("restic.binary", default_binary())?;

        // Add config file if provided
        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            } else {
                return Err(ExporterError::config(format!(
                    "Configuration file {} does not exist",
                    path
                )));
            }
        }

        builder = builder.add_source(environment);

        let config = builder.build()?;
        let mut settings: Settings = config.try_deserialize()?;

        settings.fill_from_restic_env(restic_env);
        settings.validate()?;
        Ok(settings)
    }

    /// Fill the repository and password source from restic's own variables
    /// when the exporter configuration leaves them unset.
    pub fn fill_from_restic_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if self.restic.repository.is_empty() {
            if let Some(repository) = non_empty("RESTIC_REPOSITORY") {
                self.restic.repository = repository;
            }
        }

        if !self.restic.has_password_source() {
            self.restic.password = non_empty("RESTIC_PASSWORD");
            self.restic.password_file = non_empty("RESTIC_PASSWORD_FILE").map(PathBuf::from);
            self.restic.password_command = non_empty("RESTIC_PASSWORD_COMMAND");
        }
    }

    /// Validate configuration settings.
    pub fn validate(&self) -> Result<()> {
        if self.restic.repository.is_empty() {
            return Err(ExporterError::config(
                "The restic repository is mandatory (restic.repository or RESTIC_REPOSITORY)",
            ));
        }

        self.restic.password_source()?;

        if self.restic.command_timeout_seconds == 0 {
            return Err(ExporterError::config(
                "restic.command_timeout_seconds must be greater than zero",
            ));
        }

        if self.collector.refresh_interval_seconds == 0 {
            return Err(ExporterError::config(
                "collector.refresh_interval_seconds must be greater than zero",
            ));
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            restic: ResticConfig {
                repository: String::new(),
                password: None,
                password_file: None,
                password_command: None,
                binary: default_binary(),
                insecure_tls: false,
                command_timeout_seconds: default_command_timeout(),
            },
            collector: CollectorConfig::default(),
            exporter: ExporterConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn valid_settings() -> Settings {
        let mut settings = Settings::default();
        settings.restic.repository = "/srv/restic-repo".to_string();
        settings.restic.password_file = Some(PathBuf::from("/etc/restic/password"));
        settings
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.exporter.listen_address, "0.0.0.0:8001");
        assert_eq!(settings.collector.refresh_interval_seconds, 3600);
        assert_eq!(settings.restic.binary, "restic");
        assert!(!settings.restic.insecure_tls);
        assert!(settings.collector.include_hostname);
        assert!(!settings.collector.include_paths);
    }

    #[test]
    fn test_validation_fails_without_credentials() {
        let mut settings = Settings::default();
        settings.restic.repository = "/srv/restic-repo".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_fails_without_repository() {
        let mut settings = valid_settings();
        settings.restic.repository.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_multiple_password_sources() {
        let mut settings = valid_settings();
        settings.restic.password = Some("hunter2".to_string());
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_validation_rejects_zero_interval() {
        let mut settings = valid_settings();
        settings.collector.refresh_interval_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_fill_from_restic_env() {
        let env: HashMap<&str, &str> = [
            ("RESTIC_REPOSITORY", "s3:s3.amazonaws.com/bucket"),
            ("RESTIC_PASSWORD_COMMAND", "pass show restic"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.fill_from_restic_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(settings.restic.repository, "s3:s3.amazonaws.com/bucket");
        assert_eq!(
            settings.restic.password_source().unwrap(),
            PasswordSource::Command("pass show restic".to_string())
        );
    }

    #[test]
    fn test_fill_from_restic_env_keeps_explicit_values() {
        let mut settings = valid_settings();
        settings.fill_from_restic_env(|name| match name {
            "RESTIC_REPOSITORY" => Some("/other".to_string()),
            "RESTIC_PASSWORD" => Some("from-env".to_string()),
            _ => None,
        });

        assert_eq!(settings.restic.repository, "/srv/restic-repo");
        assert!(settings.restic.password.is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut settings = Settings::default();
        settings.restic.password = Some("hunter2".to_string());
        settings.restic.password_command = Some("echo hunter3".to_string());

        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("hunter3"));
        assert!(rendered.contains("REDACTED"));
        assert!(!format!("{:?}", PasswordSource::Literal("hunter2".into())).contains("hunter2"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[restic]
repository = "/srv/restic-repo"
password_file = "/etc/restic/password"
command_timeout_seconds = 60

[collector]
refresh_interval_seconds = 300
disable_locks = true
include_paths = true

[exporter]
listen_address = "127.0.0.1:9000"
log_format = "json"
"#
        )
        .unwrap();

        let settings = Settings::load(file.path().to_str()).unwrap();
        assert_eq!(settings.restic.repository, "/srv/restic-repo");
        assert_eq!(settings.restic.command_timeout(), Duration::from_secs(60));
        assert_eq!(settings.collector.refresh_interval(), Duration::from_secs(300));
        assert!(settings.collector.disable_locks);
        assert!(settings.collector.include_paths);
        assert!(settings.collector.include_username);
        assert_eq!(settings.exporter.listen_address, "127.0.0.1:9000");
        assert_eq!(settings.exporter.log_format, LogFormat::Json);
    }

    #[test]
    fn test_fill_from_restic_env_ignores_empty_overrides() {
        let mut settings = Settings::default();
        settings.restic.repository = "/srv/restic-repo".to_string();
        settings.restic.password_file = Some(PathBuf::new());
        settings.fill_from_restic_env(|name| match name {
            "RESTIC_PASSWORD" => Some("hunter2".to_string()),
            _ => None,
        });

        assert_eq!(
            settings.restic.password_source().unwrap(),
            PasswordSource::Literal("hunter2".to_string())
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_keeps_numeric_looking_strings_from_env() {
        let env: HashMap<String, String> = [
            ("RESTIC_EXPORTER__RESTIC__REPOSITORY", "1.50"),
            ("RESTIC_EXPORTER__RESTIC__PASSWORD", "007"),
            ("RESTIC_EXPORTER__RESTIC__COMMAND_TIMEOUT_SECONDS", "60"),
            ("RESTIC_EXPORTER__COLLECTOR__REFRESH_INTERVAL_SECONDS", "300"),
            ("RESTIC_EXPORTER__COLLECTOR__DISABLE_CHECK", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let settings = Settings::load_from(
            None,
            Settings::environment().source(Some(env.into_iter().collect())),
            |_| None,
        )
        .unwrap();

        assert_eq!(settings.restic.repository, "1.50");
        assert_eq!(
            settings.restic.password_source().unwrap(),
            PasswordSource::Literal("007".to_string())
        );
        assert_eq!(settings.restic.command_timeout(), Duration::from_secs(60));
        assert_eq!(settings.collector.refresh_interval(), Duration::from_secs(300));
        assert!(settings.collector.disable_check);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Settings::load(Some("/nonexistent/restic-exporter.toml")).is_err());
    }
}
