//! Configuration loading for podgen-ps
//!
//! Each setting resolves in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Clap handles 1 and 2; [`Config::resolve`] merges the result with the TOML
//! file and the defaults.

use clap::Parser;
use podgen_common::sse::StreamOptions;
use podgen_common::{Error, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5780";
pub const DEFAULT_KEEPALIVE_SECS: u64 = 15;
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;
const GENERATED_KEY_LEN: usize = 32;

/// Command-line arguments for podgen-ps
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "podgen-ps")]
#[command(about = "Episode generation progress streaming service")]
#[command(version)]
pub struct Args {
    /// TOML config file (default: <config dir>/podgen/podgen-ps.toml)
    #[arg(short, long, env = "PODGEN_PS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on (host:port)
    #[arg(short, long, env = "PODGEN_PS_BIND")]
    pub bind: Option<String>,

    /// Shared secret clients pass as the `key` query parameter
    #[arg(long, env = "PODGEN_PS_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Seconds between keep-alive frames on idle streams
    #[arg(long, env = "PODGEN_PS_KEEPALIVE_SECS")]
    pub keepalive_secs: Option<u64>,

    /// Events buffered per stream before a slow client starts losing events
    #[arg(long, env = "PODGEN_PS_SUBSCRIBER_CAP")]
    pub subscriber_capacity: Option<usize>,

    /// Close a stream after forwarding a `ready` or `error` step
    #[arg(
        long,
        env = "PODGEN_PS_CLOSE_ON_TERMINAL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub close_on_terminal: Option<bool>,
}

/// Logging section of the TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Contents of podgen-ps.toml; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub bind_addr: Option<String>,
    pub access_key: Option<String>,
    pub keepalive_secs: Option<u64>,
    pub subscriber_capacity: Option<usize>,
    pub close_on_terminal: Option<bool>,
    pub logging: LoggingConfig,
}

/// Where the TOML settings came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No config file found; compiled defaults apply
    Defaults,
}

/// Platform config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("podgen").join("podgen-ps.toml"))
}

/// Load the TOML config file
///
/// An explicitly requested file must exist. The default location is
/// optional: when absent, defaults are returned.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
    let path = match explicit {
        Some(path) if !path.exists() => {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok((TomlConfig::default(), ConfigSource::Defaults)),
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    Ok((config, ConfigSource::File(path)))
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub access_key: String,
    /// True when no key was configured and one was generated for this run
    pub access_key_generated: bool,
    pub stream: StreamOptions,
}

impl Config {
    pub fn resolve(args: &Args, toml: &TomlConfig) -> Result<Self> {
        let bind = args
            .bind
            .as_deref()
            .or(toml.bind_addr.as_deref())
            .unwrap_or(DEFAULT_BIND_ADDR);
        let bind_addr = bind
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", bind, e)))?;

        let (access_key, access_key_generated) =
            match args.access_key.as_ref().or(toml.access_key.as_ref()) {
                Some(key) if key.trim().is_empty() => {
                    return Err(Error::Config("Access key must not be empty".to_string()));
                }
                Some(key) => (key.clone(), false),
                None => (generate_access_key(), true),
            };

        let keepalive_secs = args
            .keepalive_secs
            .or(toml.keepalive_secs)
            .unwrap_or(DEFAULT_KEEPALIVE_SECS);
        if keepalive_secs == 0 {
            return Err(Error::Config("keepalive_secs must be at least 1".to_string()));
        }

        let subscriber_capacity = args
            .subscriber_capacity
            .or(toml.subscriber_capacity)
            .unwrap_or(DEFAULT_SUBSCRIBER_CAPACITY);
        if subscriber_capacity == 0 {
            return Err(Error::Config(
                "subscriber_capacity must be at least 1".to_string(),
            ));
        }

        let close_on_terminal = args
            .close_on_terminal
            .or(toml.close_on_terminal)
            .unwrap_or(false);

        Ok(Self {
            bind_addr,
            access_key,
            access_key_generated,
            stream: StreamOptions {
                keepalive: Duration::from_secs(keepalive_secs),
                subscriber_capacity,
                close_on_terminal,
            },
        })
    }
}

/// Random alphanumeric access key for runs without a configured one
pub fn generate_access_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_KEY_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_when_nothing_configured() {
        let config = Config::resolve(&Args::default(), &TomlConfig::default()).unwrap();

        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(config.stream.keepalive, Duration::from_secs(DEFAULT_KEEPALIVE_SECS));
        assert_eq!(config.stream.subscriber_capacity, DEFAULT_SUBSCRIBER_CAPACITY);
        assert!(!config.stream.close_on_terminal);
        assert!(config.access_key_generated);
        assert_eq!(config.access_key.len(), GENERATED_KEY_LEN);
    }

    #[test]
    fn test_toml_values_apply() {
        let toml = TomlConfig {
            bind_addr: Some("0.0.0.0:6000".to_string()),
            access_key: Some("from-toml".to_string()),
            keepalive_secs: Some(5),
            subscriber_capacity: Some(16),
            close_on_terminal: Some(true),
            logging: LoggingConfig {
                level: "debug".to_string(),
            },
        };

        let config = Config::resolve(&Args::default(), &toml).unwrap();
        assert_eq!(config.bind_addr.port(), 6000);
        assert_eq!(config.access_key, "from-toml");
        assert!(!config.access_key_generated);
        assert_eq!(config.stream.keepalive, Duration::from_secs(5));
        assert_eq!(config.stream.subscriber_capacity, 16);
        assert!(config.stream.close_on_terminal);
    }

    #[test]
    fn test_args_override_toml() {
        let toml = TomlConfig {
            bind_addr: Some("0.0.0.0:6000".to_string()),
            access_key: Some("from-toml".to_string()),
            close_on_terminal: Some(true),
            ..Default::default()
        };
        let args = Args {
            bind: Some("127.0.0.1:7000".to_string()),
            access_key: Some("from-cli".to_string()),
            close_on_terminal: Some(false),
            ..Default::default()
        };

        let config = Config::resolve(&args, &toml).unwrap();
        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.access_key, "from-cli");
        assert!(!config.stream.close_on_terminal);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_bind = Args {
            bind: Some("not-an-address".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Config::resolve(&bad_bind, &TomlConfig::default()),
            Err(Error::Config(_))
        ));

        let blank_key = Args {
            access_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Config::resolve(&blank_key, &TomlConfig::default()),
            Err(Error::Config(_))
        ));

        let zero_keepalive = Args {
            keepalive_secs: Some(0),
            ..Default::default()
        };
        assert!(Config::resolve(&zero_keepalive, &TomlConfig::default()).is_err());

        let zero_capacity = Args {
            subscriber_capacity: Some(0),
            ..Default::default()
        };
        assert!(Config::resolve(&zero_capacity, &TomlConfig::default()).is_err());
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = generate_access_key();
        let b = generate_access_key();
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_load_explicit_toml_file() {
        let file = write_toml(
            r#"
bind_addr = "127.0.0.1:5999"
access_key = "secret"

[logging]
level = "warn"
"#,
        );

        let (config, source) = load_toml_config(Some(file.path())).unwrap();
        assert_eq!(source, ConfigSource::File(file.path().to_path_buf()));
        assert_eq!(config.bind_addr.as_deref(), Some("127.0.0.1:5999"));
        assert_eq!(config.access_key.as_deref(), Some("secret"));
        assert_eq!(config.keepalive_secs, None);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_missing_logging_section_uses_default_level() {
        let file = write_toml("keepalive_secs = 3\n");
        let (config, _) = load_toml_config(Some(file.path())).unwrap();
        assert_eq!(config.keepalive_secs, Some(3));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let file = write_toml("bind_addr = [unterminated");
        assert!(matches!(
            load_toml_config(Some(file.path())),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            load_toml_config(Some(&missing)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_environment_variables_populate_args() {
        env::set_var("PODGEN_PS_BIND", "127.0.0.1:5888");
        env::set_var("PODGEN_PS_ACCESS_KEY", "from-env");
        env::set_var("PODGEN_PS_CLOSE_ON_TERMINAL", "true");

        let args = Args::try_parse_from(["podgen-ps"]).unwrap();

        env::remove_var("PODGEN_PS_BIND");
        env::remove_var("PODGEN_PS_ACCESS_KEY");
        env::remove_var("PODGEN_PS_CLOSE_ON_TERMINAL");

        assert_eq!(args.bind.as_deref(), Some("127.0.0.1:5888"));
        assert_eq!(args.access_key.as_deref(), Some("from-env"));
        assert_eq!(args.close_on_terminal, Some(true));
    }

    #[test]
    #[serial]
    fn test_cli_argument_beats_environment() {
        env::set_var("PODGEN_PS_KEEPALIVE_SECS", "30");

        let args = Args::try_parse_from(["podgen-ps", "--keepalive-secs", "7"]).unwrap();

        env::remove_var("PODGEN_PS_KEEPALIVE_SECS");

        assert_eq!(args.keepalive_secs, Some(7));
    }

    #[test]
    #[serial]
    fn test_bare_close_on_terminal_flag_enables_policy() {
        env::remove_var("PODGEN_PS_CLOSE_ON_TERMINAL");
        let args = Args::try_parse_from(["podgen-ps", "--close-on-terminal"]).unwrap();
        assert_eq!(args.close_on_terminal, Some(true));
    }
}
