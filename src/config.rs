use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the config directory path (~/.config/rosaform)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("rosaform"))
}

// ============================================================================
// Client Config
// ============================================================================

/// Connection settings for the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Control plane base URL
    pub api_url: String,
    /// Access token, inline
    pub token: Option<String>,
    /// File holding the access token; `~` is expanded
    pub token_file: Option<String>,
    /// Seconds between polls while waiting for deletion
    pub poll_interval_secs: u64,
    /// Seconds before a single request gives up
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: ocmkit::DEFAULT_API_URL.to_string(),
            token: None,
            token_file: None,
            poll_interval_secs: reconcile::wait::DEFAULT_POLL_INTERVAL.as_secs(),
            request_timeout_secs: ocmkit::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Default config file path
    pub fn path() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load the default config file, or defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load a config file, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply command-line/environment overrides
    #[must_use]
    pub fn with_overrides(mut self, url: Option<String>, token: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.is_empty()) {
            self.api_url = url;
        }
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
        self
    }

    /// Resolve the access token from the inline value or the token file
    pub fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }

        if let Some(file) = &self.token_file {
            let path = PathBuf::from(shellexpand::tilde(file).as_ref());
            let token = fs::read_to_string(&path)
                .with_context(|| format!("Could not read token file {}", path.display()))?;
            let token = token.trim();
            if token.is_empty() {
                bail!("Token file {} is empty", path.display());
            }
            return Ok(token.to_string());
        }

        bail!("No access token configured. Set OCM_TOKEN, pass --token, or set token/token_file in the config file")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.api_url, "https://api.openshift.com");
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_url = \"https://api.stage.example.com\"\npoll_interval_secs = 5\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_url, "https://api.stage.example.com");
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_key_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_uri = \"typo\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid config file"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::default().with_overrides(Some("http://localhost:8000".into()), Some(String::new()));
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.token, None);

        let config = config.with_overrides(None, Some("abc".into()));
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.access_token().unwrap(), "abc");
    }

    #[test]
    fn test_token_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token");
        fs::write(&path, "  secret-token\n").unwrap();

        let config = Config {
            token_file: Some(path.display().to_string()),
            ..Default::default()
        };
        assert_eq!(config.access_token().unwrap(), "secret-token");

        fs::write(&path, "\n").unwrap();
        assert!(config.access_token().is_err());
    }

    #[test]
    fn test_inline_token_wins() {
        let config = Config {
            token: Some("inline".into()),
            token_file: Some("/nonexistent/token".into()),
            ..Default::default()
        };
        assert_eq!(config.access_token().unwrap(), "inline");
    }

    #[test]
    fn test_missing_token() {
        assert!(Config::default().access_token().is_err());
    }
}
