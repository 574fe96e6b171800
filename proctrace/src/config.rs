use crate::daemon_handler::DaemonConfig;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

// 顶层配置结构体

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub log_level: Option<String>,
    pub log_directory: Option<PathBuf>,
    pub pid_file_directory: Option<PathBuf>,
    pub working_directory: Option<PathBuf>,
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
    /// SO_RCVBUF for the connector socket; kernel default when unset.
    pub receive_buffer_bytes: Option<usize>,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub show_exe: bool,
    #[serde(default)]
    pub report_exits: bool,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            log_directory: None,
            pid_file_directory: None,
            working_directory: None,
            proc_root: default_proc_root(),
            receive_buffer_bytes: None,
            output: OutputConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(config_file_path: &Path) -> Result<Self, ConfigError> {
        let config_content =
            fs::read_to_string(config_file_path).map_err(|source| ConfigError::Read {
                path: config_file_path.to_path_buf(),
                source,
            })?;
        Self::from_yaml(&config_content).map_err(|source| ConfigError::Parse {
            path: config_file_path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        // an empty document means "all defaults"
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Like [`load_from_file`](Self::load_from_file), but a file that does
    /// not exist yields the defaults. The monitor needs no configuration.
    pub fn load_or_default(config_file_path: &Path) -> Result<Self, ConfigError> {
        match Self::load_from_file(config_file_path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn to_daemonize_config(&self) -> DaemonConfig {
        DaemonConfig {
            pid_file: self
                .pid_file_directory
                .as_ref()
                .map(|pid_dir| pid_dir.join("proctrace.pid"))
                .unwrap_or_else(|| PathBuf::from("/tmp/proctrace.pid")),
            log_directory: self
                .log_directory
                .clone()
                .unwrap_or_else(|| PathBuf::from("/tmp/proctrace")),
            working_dir: self
                .working_directory
                .clone()
                .unwrap_or_else(|| PathBuf::from("/")),
        }
    }
}
