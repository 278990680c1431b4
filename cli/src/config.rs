//! Loads engine configuration from a TOML file, overridable by environment
//! variables and CLI flags, in the same source-layering order the rest of
//! the corpus reaches for `serde` + `toml_edit` for: file values first, then
//! environment, then explicit flags win.

use std::path::Path;
use std::time::Duration;

use prbridge::{EngineConfig, RunPolicy};
use serde::Deserialize;
use thiserror::Error;

const TOKEN_ENV_VAR: &str = "PRBRIDGE_HUB_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml_edit::de::Error },
    #[error("no hub token: set {TOKEN_ENV_VAR} or the `token` config key")]
    MissingToken,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    pub policy: Option<PolicyArg>,
    pub dry_updates: Option<bool>,
    pub token: Option<String>,
    #[serde(rename = "pub")]
    pub pub_branch: Option<String>,
    #[serde(rename = "priv")]
    pub priv_branch: Option<String>,
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub repos: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyArg {
    Once,
    Repeat,
}

impl From<PolicyArg> for RunPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Once => RunPolicy::Once,
            PolicyArg::Repeat => RunPolicy::Repeat,
        }
    }
}

/// The fully resolved configuration the CLI hands to the engine.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub engine: EngineConfig,
    pub token: String,
    pub pub_branch: String,
    pub priv_branch: String,
    pub repos: Vec<String>,
}

pub fn load(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml_edit::de::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Merges file config with CLI overrides; flags beat file values, file
/// values beat defaults. The token alone also falls back to an environment
/// variable, since it should never have to round-trip through a config file
/// on disk.
pub fn resolve(
    file: FileConfig,
    policy_override: Option<PolicyArg>,
    dry_run_override: bool,
) -> Result<ResolvedConfig, ConfigError> {
    let policy = policy_override.or(file.policy).unwrap_or(PolicyArg::Repeat).into();
    let dry_updates = dry_run_override || file.dry_updates.unwrap_or(false);
    let poll_interval = Duration::from_secs(file.poll_interval_secs.unwrap_or(30));

    let token = std::env::var(TOKEN_ENV_VAR).ok().or(file.token).ok_or(ConfigError::MissingToken)?;

    Ok(ResolvedConfig {
        engine: EngineConfig {
            policy,
            dry_updates,
            poll_interval,
        },
        token,
        pub_branch: file.pub_branch.unwrap_or_else(|| "main".to_string()),
        priv_branch: file.priv_branch.unwrap_or_else(|| "prbridge/hub".to_string()),
        repos: file.repos,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_env_token_when_file_has_none() {
        std::env::set_var(TOKEN_ENV_VAR, "from-env");
        let resolved = resolve(FileConfig::default(), None, false).unwrap();
        assert_eq!(resolved.token, "from-env");
        std::env::remove_var(TOKEN_ENV_VAR);
    }

    #[test]
    fn resolve_requires_a_token_from_somewhere() {
        std::env::remove_var(TOKEN_ENV_VAR);
        let err = resolve(FileConfig::default(), None, false).unwrap_err();
        assert!(matches!(err, ConfigError::MissingToken));
    }

    #[test]
    fn cli_flag_overrides_file_policy() {
        std::env::set_var(TOKEN_ENV_VAR, "t");
        let file = FileConfig {
            policy: Some(PolicyArg::Repeat),
            ..Default::default()
        };
        let resolved = resolve(file, Some(PolicyArg::Once), false).unwrap();
        assert_eq!(resolved.engine.policy, RunPolicy::Once);
        std::env::remove_var(TOKEN_ENV_VAR);
    }

    #[test]
    fn dry_run_flag_is_sticky_even_if_file_says_false() {
        std::env::set_var(TOKEN_ENV_VAR, "t");
        let file = FileConfig {
            dry_updates: Some(false),
            ..Default::default()
        };
        let resolved = resolve(file, None, true).unwrap();
        assert!(resolved.engine.dry_updates);
        std::env::remove_var(TOKEN_ENV_VAR);
    }
}
