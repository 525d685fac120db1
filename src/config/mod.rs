//! Configuration loading.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `config.toml` (explicit `--config` path, or the platform config dir)
//! 3. `PARTNER_GATE_*` environment variables

pub mod schema;

pub use schema::{ApiConfig, Config, HandoffConfig, IdentityConfig, SessionConfig, StorageConfig};

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const ENV_API_URL: &str = "PARTNER_GATE_API_URL";
const ENV_IDENTITY_ORIGIN: &str = "PARTNER_GATE_IDENTITY_ORIGIN";
const ENV_PASSPHRASE: &str = "PARTNER_GATE_PASSPHRASE";
const ENV_STORAGE_KIND: &str = "PARTNER_GATE_STORAGE_KIND";
const ENV_STORAGE_PATH: &str = "PARTNER_GATE_STORAGE_PATH";

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "servicepro", "partner-gate")
}

impl Config {
    /// Default location of `config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from `path` (or the default location when it
    /// exists), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production). Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(origin) = get(ENV_IDENTITY_ORIGIN) {
            self.identity.origin = origin;
        }
        if let Some(passphrase) = get(ENV_PASSPHRASE) {
            self.handoff.passphrase = passphrase;
        }
        if let Some(kind) = get(ENV_STORAGE_KIND) {
            self.storage.kind = kind;
        }
        if let Some(path) = get(ENV_STORAGE_PATH) {
            self.storage.path = Some(path);
        }
    }

    /// Reject configurations the session flows cannot run with.
    pub fn validate(&self) -> Result<()> {
        let base = self.api.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!("api.base_url must be an http(s) URL, got '{base}'");
        }
        if self.api.timeout_secs == 0 {
            bail!("api.timeout_secs must be greater than zero");
        }
        if self.api.auth_header.trim().is_empty() {
            bail!("api.auth_header cannot be empty");
        }
        if self.identity.origin.trim().is_empty() {
            bail!("identity.origin cannot be empty (set {ENV_IDENTITY_ORIGIN})");
        }
        if self.handoff.passphrase.is_empty() {
            bail!("handoff.passphrase is not set (set {ENV_PASSPHRASE})");
        }
        if self.storage.token_key.trim().is_empty() {
            bail!("storage.token_key cannot be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> Config {
        let mut config = Config::default();
        config.handoff.passphrase = "shared-secret".into();
        config
    }

    #[test]
    fn defaults_match_local_development_setup() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:8000/api");
        assert_eq!(config.api.auth_header, "Authorization");
        assert_eq!(config.identity.origin, "http://localhost:3001");
        assert_eq!(config.storage.kind, "file");
        assert_eq!(config.storage.token_key, "auth_token");
        assert_eq!(config.storage.clear_keys, vec!["auth_user".to_string()]);
        assert!(config.session.revoke_on_logout);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_fields() {
        let config = Config::from_toml_str(
            r#"
            [identity]
            origin = "https://admin.servicepro.example"

            [storage]
            kind = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.identity.origin, "https://admin.servicepro.example");
        assert_eq!(config.storage.kind, "memory");
        assert_eq!(config.storage.token_key, "auth_token");
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(Config::from_toml_str("[api\nbase_url = 1").is_err());
    }

    #[test]
    fn from_file_reports_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("missing.toml");
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn overrides_replace_non_empty_values_only() {
        let env: HashMap<&str, &str> = [
            (ENV_API_URL, "https://api.example/api"),
            (ENV_PASSPHRASE, "from-env"),
            (ENV_IDENTITY_ORIGIN, "  "),
            (ENV_STORAGE_PATH, "/tmp/session.json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api.base_url, "https://api.example/api");
        assert_eq!(config.handoff.passphrase, "from-env");
        assert_eq!(config.identity.origin, "http://localhost:3001");
        assert_eq!(config.storage.path.as_deref(), Some("/tmp/session.json"));
    }

    #[test]
    fn validate_accepts_complete_config() {
        valid().validate().unwrap();
    }

    #[test]
    fn validate_requires_passphrase() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("passphrase"));
    }

    #[test]
    fn validate_rejects_non_http_api() {
        let mut config = valid();
        config.api.base_url = "localhost:8000/api".into();
        assert!(config.validate().unwrap_err().to_string().contains("api.base_url"));
    }

    #[test]
    fn validate_rejects_zero_timeout_and_empty_origin() {
        let mut config = valid();
        config.api.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.identity.origin = String::new();
        assert!(config.validate().unwrap_err().to_string().contains("identity.origin"));
    }

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let mut api = ApiConfig::default();
        api.base_url = "https://api.example/api/".into();
        assert_eq!(api.endpoint("/login"), "https://api.example/api/login");
        assert_eq!(api.endpoint("orders"), "https://api.example/api/orders");
    }

    #[test]
    fn storage_path_expands_tilde() {
        let storage = StorageConfig {
            path: Some("~/partner/session.json".into()),
            ..StorageConfig::default()
        };
        let resolved = storage.resolved_path().unwrap();
        assert!(!resolved.to_string_lossy().starts_with('~'));
        assert!(resolved.ends_with("partner/session.json"));
    }

    #[test]
    fn handoff_debug_hides_passphrase() {
        let rendered = format!("{:?}", valid().handoff);
        assert!(!rendered.contains("shared-secret"));
    }
}
