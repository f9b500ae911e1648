//! Runtime configuration.
//!
//! The API key is looked up in a TOML secrets file first and then in the
//! `OPENAI_API_KEY` environment variable. Without `INVOICE_SECRETS_FILE`, the
//! first of `secrets.toml` and `.streamlit/secrets.toml` that exists is used. Everything else has a default that
//! can be overridden from the environment.

use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_SECRETS_FILES: &[&str] = &["secrets.toml", ".streamlit/secrets.toml"];
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const SECRETS_FILE_VAR: &str = "INVOICE_SECRETS_FILE";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            base_url: DEFAULT_BASE_URL.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Secrets {
    #[serde(rename = "OPENAI_API_KEY")]
    openai_api_key: Option<String>,
}

impl Config {
    /// Loads the secrets file relative to the working directory plus
    /// environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(Path::new("."), |name| env::var(name).ok())
    }

    pub fn load(secrets_path: &Path) -> Result<Self> {
        let secrets = read_secrets(secrets_path)?;
        Ok(Self::resolve(secrets, |name| env::var(name).ok()))
    }

    fn from_lookup(base_dir: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secrets = match secrets_path(base_dir, &lookup) {
            Some(path) => read_secrets(&path)?,
            None => {
                tracing::debug!("no secrets file found under {}", base_dir.display());
                Secrets::default()
            }
        };
        Ok(Self::resolve(secrets, lookup))
    }

    fn resolve(secrets: Secrets, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let defaults = Self::default();

        Self {
            api_key: secrets
                .openai_api_key
                .filter(|key| !key.is_empty())
                .or_else(|| var(API_KEY_VAR)),
            model: var("INVOICE_MODEL").unwrap_or(defaults.model),
            temperature: defaults.temperature,
            base_url: var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            bind_addr: var("INVOICE_BIND_ADDR").unwrap_or(defaults.bind_addr),
        }
    }
}

/// An explicit `INVOICE_SECRETS_FILE` is returned even if it does not exist.
fn secrets_path(base_dir: &Path, lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(path) = lookup(SECRETS_FILE_VAR).filter(|path| !path.is_empty()) {
        return Some(base_dir.join(path));
    }

    DEFAULT_SECRETS_FILES
        .iter()
        .map(|name| base_dir.join(name))
        .find(|path| path.exists())
}

fn read_secrets(path: &Path) -> Result<Secrets> {
    if !path.exists() {
        tracing::debug!("no secrets file at {}", path.display());
        return Ok(Secrets::default());
    }

    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read secrets file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse secrets file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_secrets_or_env() {
        let config = Config::resolve(Secrets::default(), env_of(&[]));
        assert_eq!(config.api_key, None);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
    }

    #[test]
    fn secrets_file_wins_over_environment() {
        let secrets = Secrets {
            openai_api_key: Some("from-secrets".into()),
        };
        let config = Config::resolve(secrets, env_of(&[(API_KEY_VAR, "from-env")]));
        assert_eq!(config.api_key.as_deref(), Some("from-secrets"));
    }

    #[test]
    fn environment_used_when_secret_missing_or_empty() {
        let config = Config::resolve(Secrets::default(), env_of(&[(API_KEY_VAR, "from-env")]));
        assert_eq!(config.api_key.as_deref(), Some("from-env"));

        let secrets = Secrets {
            openai_api_key: Some(String::new()),
        };
        let config = Config::resolve(secrets, env_of(&[(API_KEY_VAR, "from-env")]));
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn empty_env_key_is_absent() {
        let config = Config::resolve(Secrets::default(), env_of(&[(API_KEY_VAR, "")]));
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn environment_overrides() {
        let config = Config::resolve(
            Secrets::default(),
            env_of(&[
                ("OPENAI_BASE_URL", "http://localhost:9999/v1"),
                ("INVOICE_MODEL", "gpt-4o-mini"),
                ("INVOICE_BIND_ADDR", "0.0.0.0:8080"),
            ]),
        );
        assert_eq!(config.base_url, "http://localhost:9999/v1");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn reads_key_from_secrets_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "OPENAI_API_KEY = \"sk-test\"\nOTHER = 1\n").unwrap();

        let secrets = read_secrets(&path).unwrap();
        assert_eq!(secrets.openai_api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn load_reads_key_from_given_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "OPENAI_API_KEY = \"sk-loaded\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-loaded"));
    }

    #[test]
    fn missing_secrets_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = read_secrets(&dir.path().join("absent.toml")).unwrap();
        assert!(secrets.openai_api_key.is_none());
    }

    #[test]
    fn secrets_file_var_points_at_custom_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("secrets.toml"), "OPENAI_API_KEY = \"default\"\n").unwrap();
        fs::write(dir.path().join("prod.toml"), "OPENAI_API_KEY = \"sk-prod\"\n").unwrap();

        let config = Config::from_lookup(
            dir.path(),
            env_of(&[(SECRETS_FILE_VAR, "prod.toml"), (API_KEY_VAR, "from-env")]),
        )
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-prod"));
    }

    #[test]
    fn absolute_secrets_file_var_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elsewhere.toml");
        fs::write(&path, "OPENAI_API_KEY = \"sk-abs\"\n").unwrap();
        let unrelated = tempfile::tempdir().unwrap();

        let config = Config::from_lookup(
            unrelated.path(),
            env_of(&[(SECRETS_FILE_VAR, path.to_str().unwrap())]),
        )
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-abs"));
    }

    #[test]
    fn falls_back_to_streamlit_secrets() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".streamlit")).unwrap();
        fs::write(
            dir.path().join(".streamlit/secrets.toml"),
            "OPENAI_API_KEY = \"sk-streamlit\"\n",
        )
        .unwrap();

        let config = Config::from_lookup(dir.path(), env_of(&[(API_KEY_VAR, "from-env")])).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-streamlit"));
    }

    #[test]
    fn plain_secrets_file_preferred_over_streamlit() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".streamlit")).unwrap();
        fs::write(
            dir.path().join(".streamlit/secrets.toml"),
            "OPENAI_API_KEY = \"sk-streamlit\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("secrets.toml"), "OPENAI_API_KEY = \"sk-local\"\n").unwrap();

        let config = Config::from_lookup(dir.path(), env_of(&[])).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-local"));
    }

    #[test]
    fn no_secrets_file_falls_back_to_environment() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_lookup(dir.path(), env_of(&[(API_KEY_VAR, "from-env")])).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn malformed_secrets_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "OPENAI_API_KEY = ").unwrap();

        let err = read_secrets(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse secrets file"));
    }
}
