//! Layered configuration (SPEC_FULL.md §10.3): built-in defaults, an
//! optional project-local `crystal.toml`, then environment variables
//! prefixed `CRYSTAL_`, each layer overriding the last.

pub mod error;

use std::path::Path;

use exn::ResultExt;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};

/// The project-local config file name, read from the project root if
/// present.
pub const CONFIG_FILE_NAME: &str = "crystal.toml";

pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";
pub const DEFAULT_BIND_PORT: u16 = 2797;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_host: String,
    pub bind_port: u16,
    /// `None` means "decide automatically": writable only when
    /// `bind_host` is the loopback address (SPEC_FULL.md §4.7).
    pub readonly: Option<bool>,
    pub politeness_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            bind_port: DEFAULT_BIND_PORT,
            readonly: None,
            politeness_delay_ms: 1_000,
            http_timeout_secs: 10,
            user_agent: "Crystal/0.1 (+https://example.invalid/crystal)".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration layered defaults -> `<project_root>/crystal.toml`
    /// (if present) -> `CRYSTAL_*` environment variables.
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILE_NAME);
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("CRYSTAL_"))
            .extract()
            .or_raise(|| ErrorKind::Load)
    }

    /// Whether the project should be opened read-only given this
    /// configuration and the host it's bound to, per SPEC_FULL.md
    /// §4.7: non-loopback hosts default to read-only unless overridden.
    pub fn effective_readonly(&self) -> bool {
        self.readonly.unwrap_or_else(|| self.bind_host != "127.0.0.1" && self.bind_host != "::1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_to_loopback_and_are_writable() {
        let config = Config::default();
        assert_eq!(config.bind_host, "127.0.0.1");
        assert!(!config.effective_readonly());
    }

    #[test]
    fn a_non_loopback_host_is_readonly_unless_overridden() {
        let mut config = Config::default();
        config.bind_host = "0.0.0.0".to_string();
        assert!(config.effective_readonly());
        config.readonly = Some(false);
        assert!(!config.effective_readonly());
    }

    #[test]
    fn load_falls_back_to_defaults_when_no_file_or_env_is_present() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.bind_port, DEFAULT_BIND_PORT);
    }

    #[test]
    fn load_reads_a_project_local_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "bind_port = 9000\n").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.bind_port, 9000);
    }
}
