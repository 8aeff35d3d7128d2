use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Parser;
use serde::Deserialize;

/// Command line options for the chat server.
#[derive(Parser, Debug, Default)]
pub struct Cli {
    /// Override bind address (host:port).
    #[arg(long)]
    pub bind: Option<String>,
    /// Override server port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Enable or disable logging (true/false).
    #[arg(long)]
    pub logging: Option<bool>,
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Runtime configuration for the server resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address to bind the HTTP server to.
    pub bind: String,
    /// Base directory holding the SQLite database.
    pub data_dir: PathBuf,
    /// Base64-encoded HMAC secret shared with the identity system that
    /// issues session tokens.
    pub jwt_secret: String,
    /// Whether verbose logging is enabled.
    pub logging_enabled: bool,
    /// Upper bound on a single persistence call, in milliseconds.
    pub persist_timeout_ms: u64,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: FileServer,
    #[serde(default)]
    logging: FileLogging,
    #[serde(default)]
    auth: FileAuth,
    #[serde(default)]
    storage: FileStorage,
}

#[derive(Deserialize)]
struct FileServer {
    #[serde(default = "default_port")]
    port: u16,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

#[derive(Deserialize, Default)]
struct FileAuth {
    #[serde(default)]
    jwt_secret: Option<String>,
}

#[derive(Deserialize)]
struct FileStorage {
    #[serde(default = "default_persist_timeout")]
    timeout_ms: u64,
}

fn default_port() -> u16 {
    8808
}

fn default_logging() -> bool {
    true
}

fn default_persist_timeout() -> u64 {
    5000
}

impl Default for FileServer {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

impl Default for FileStorage {
    fn default() -> Self {
        Self {
            timeout_ms: default_persist_timeout(),
        }
    }
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file
    /// and defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        // built-in defaults
        let mut port = default_port();
        let mut logging = default_logging();
        let mut persist_timeout_ms = default_persist_timeout();
        let mut jwt_secret: Option<String> = None;

        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("SEMCHAT_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/semchat.toml"));

        if let Ok(bytes) = fs::read(&config_path) {
            let contents = String::from_utf8_lossy(&bytes);
            let file_cfg: FileConfig = toml::from_str(&contents).context("invalid config file")?;
            port = file_cfg.server.port;
            logging = file_cfg.logging.enabled;
            persist_timeout_ms = file_cfg.storage.timeout_ms;
            jwt_secret = file_cfg.auth.jwt_secret;
        }

        // environment overrides
        if let Ok(p) = std::env::var("SEMCHAT_PORT") {
            if let Ok(p) = p.parse::<u16>() {
                port = p;
            }
        }
        if let Ok(l) = std::env::var("SEMCHAT_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }
        if let Ok(t) = std::env::var("SEMCHAT_PERSIST_TIMEOUT_MS") {
            if let Ok(t) = t.parse::<u64>() {
                persist_timeout_ms = t;
            }
        }
        if let Ok(s) = std::env::var("SEMCHAT_JWT_SECRET") {
            jwt_secret = Some(s);
        }

        // CLI overrides
        if let Some(p) = cli.port {
            port = p;
        }
        if let Some(l) = cli.logging {
            logging = l;
        }

        // validate port range
        if !(1024..=65535).contains(&port) {
            anyhow::bail!("invalid_port");
        }

        // bind address precedence for host override
        let bind = if let Some(b) = &cli.bind {
            b.clone()
        } else if let Ok(b) = std::env::var("BIND") {
            b
        } else {
            format!("127.0.0.1:{}", port)
        };

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        // tokens are unverifiable without the shared secret
        let jwt_secret = jwt_secret.ok_or_else(|| anyhow::anyhow!("missing_jwt_secret"))?;

        Ok(Self {
            bind,
            data_dir,
            jwt_secret,
            logging_enabled: logging,
            persist_timeout_ms,
        })
    }

    /// Path of the SQLite database inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("chat.db")
    }

    /// Bound applied to every persistence call.
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    /// Decoded HMAC secret used to verify session tokens.
    pub fn jwt_secret_bytes(&self) -> Vec<u8> {
        STANDARD.decode(&self.jwt_secret).unwrap_or_default()
    }
}

/// Determine the default data directory for the server.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SEMCHAT_DATA_DIR") {
        PathBuf::from(dir)
    } else if let Ok(home) = std::env::var("HOME") {
        let mut p = PathBuf::from(home);
        p.push(".local/share/semchat");
        p
    } else {
        PathBuf::from("./semchat_data")
    }
}
