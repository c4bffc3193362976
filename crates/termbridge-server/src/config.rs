//! Server configuration: TOML file + CLI overrides.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use termbridge_core::{BridgeError, BridgeResult};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub terminal: TerminalSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// `[terminal]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminalSection {
    /// Shell executable; absent means resolve the platform default.
    #[serde(default)]
    pub shell: Option<String>,
    /// Launch directory for spawned shells; absent means the server's cwd.
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default = "default_term")]
    pub term: String,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
}

impl Default for TerminalSection {
    fn default() -> Self {
        Self {
            shell: None,
            working_dir: None,
            term: default_term(),
            cols: default_cols(),
            rows: default_rows(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    4480
}
fn default_max_sessions() -> usize {
    100
}
fn default_term() -> String {
    "xterm-256color".to_string()
}
fn default_cols() -> u16 {
    80
}
fn default_rows() -> u16 {
    24
}

/// Resolved server configuration (shell resolved, paths expanded, CLI
/// overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub max_sessions: usize,
    pub shell: String,
    pub working_dir: Option<PathBuf>,
    pub term: String,
    pub cols: u16,
    pub rows: u16,
}

impl ServerConfig {
    /// Load config from a TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_port: Option<u16>,
        cli_bind: Option<&str>,
        cli_shell: Option<&str>,
        cli_working_dir: Option<&str>,
        cli_max_sessions: Option<usize>,
    ) -> BridgeResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| BridgeError::Config(format!("config parse error: {e}")))?
            } else {
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        let shell = cli_shell
            .map(|s| s.to_string())
            .or(file_config.terminal.shell)
            .unwrap_or_else(default_shell);
        let working_dir = cli_working_dir
            .map(|s| s.to_string())
            .or(file_config.terminal.working_dir)
            .map(|s| expand_tilde_str(&s));

        Ok(Self {
            bind: cli_bind
                .map(|s| s.to_string())
                .unwrap_or(file_config.server.bind),
            port: cli_port.unwrap_or(file_config.server.port),
            max_sessions: cli_max_sessions.unwrap_or(file_config.server.max_sessions),
            shell,
            working_dir,
            term: file_config.terminal.term,
            cols: file_config.terminal.cols,
            rows: file_config.terminal.rows,
        })
    }

    /// The socket address the listener binds.
    pub fn bind_addr(&self) -> BridgeResult<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .map_err(|e| BridgeError::Config(format!("invalid bind address: {e}")))
    }
}

/// Resolve the platform default shell.
pub fn default_shell() -> String {
    #[cfg(unix)]
    {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
    #[cfg(not(unix))]
    {
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if s.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(&s[2..]);
        }
    }
    PathBuf::from(s)
}
