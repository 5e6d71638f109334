use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::refresh_escalation::RefreshStrategy;
use crate::{debug_log, info_log};

/// Environment variable naming the Unity project
pub const PROJECT_PATH_ENV: &str = "UNITY_PROJECT_PATH";
/// Environment variable overriding the mailbox directory
pub const MAILBOX_DIR_ENV: &str = "UNITY_MCP_BRIDGE_DIR";
/// Environment variable pointing at a YAML config file
pub const CONFIG_FILE_ENV: &str = "UNITY_MCP_BRIDGE_CONFIG";
/// Config file looked up in the project root when no explicit file is given
pub const PROJECT_CONFIG_FILE_NAME: &str = "unity_mcp_bridge.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

/// Settings shared by the MCP server side and the in-editor agent
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Root of the Unity project
    pub project_path: Option<PathBuf>,
    /// Directory holding the mailbox files, defaults to `<project>/Temp/UnityMcpBridge`
    pub mailbox_dir: Option<PathBuf>,
    pub refresh_cooldown_secs: f64,
    /// Interval between agent ticks in the standalone host
    pub tick_interval_ms: u64,
    /// Interval at which the client checks for a result
    pub client_poll_interval_ms: u64,
    pub client_timeout_secs: f64,
    pub watched_extensions: Vec<String>,
    pub refresh_strategies: Vec<RefreshStrategy>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            project_path: None,
            mailbox_dir: None,
            refresh_cooldown_secs: 1.0,
            tick_interval_ms: 16,
            client_poll_interval_ms: 50,
            client_timeout_secs: 10.0,
            watched_extensions: vec!["cs".to_string(), "asmdef".to_string()],
            refresh_strategies: RefreshStrategy::ALL.to_vec(),
        }
    }
}

impl BridgeConfig {
    /// Load defaults, then the YAML file, then environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let env_project = std::env::var(PROJECT_PATH_ENV).ok().filter(|p| !p.trim().is_empty());
        let env_mailbox = std::env::var(MAILBOX_DIR_ENV).ok().filter(|p| !p.trim().is_empty());

        let config_file = std::env::var(CONFIG_FILE_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                env_project
                    .as_ref()
                    .map(|project| Path::new(project).join(PROJECT_CONFIG_FILE_NAME))
                    .filter(|path| path.exists())
            });

        let mut config = match config_file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(project) = env_project {
            config.project_path = Some(PathBuf::from(project));
        }
        if let Some(mailbox) = env_mailbox {
            config.mailbox_dir = Some(PathBuf::from(mailbox));
        }

        config.validate()?;
        debug_log!("Loaded bridge config: {:?}", config);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        info_log!("Loaded config file {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.refresh_cooldown_secs.is_finite() || self.refresh_cooldown_secs < 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "refresh_cooldown_secs must be a non-negative number, got {}",
                self.refresh_cooldown_secs
            )));
        }
        if !self.client_timeout_secs.is_finite() || self.client_timeout_secs <= 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "client_timeout_secs must be positive, got {}",
                self.client_timeout_secs
            )));
        }
        if self.tick_interval_ms == 0 || self.client_poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "tick and poll intervals must be at least 1ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Mailbox directory for `project_root`, honouring an explicit override
    pub fn mailbox_dir_for(&self, project_root: &Path) -> PathBuf {
        self.mailbox_dir
            .clone()
            .unwrap_or_else(|| project_root.join("Temp").join("UnityMcpBridge"))
    }

    pub fn refresh_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.refresh_cooldown_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn client_poll_interval(&self) -> Duration {
        Duration::from_millis(self.client_poll_interval_ms)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.client_timeout_secs)
    }
}
