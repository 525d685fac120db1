use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Top-level configuration, loaded from `config.toml`.
///
/// Every origin, header name and storage key the session flows use comes
/// from here; nothing is hard-coded in the auth modules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub identity: IdentityConfig,
    pub handoff: HandoffConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
}

// ── API ─────────────────────────────────────────────────────────

/// Partner REST API (also hosts the `login`/`logout` endpoints).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://servicepro-api.example.com/api`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Header carrying the bearer credential.
    pub auth_header: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".into(),
            timeout_secs: 30,
            auth_header: "Authorization".into(),
        }
    }
}

impl ApiConfig {
    /// Join an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

// ── Identity authority ──────────────────────────────────────────

/// The admin application that issues tokens and owns the login screen.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Origin users are sent to for login, and to with `?logout=true`.
    pub origin: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3001".into(),
        }
    }
}

// ── Handoff ─────────────────────────────────────────────────────

/// Shared secret for the encrypted token handoff.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    pub passphrase: String,
}

impl fmt::Debug for HandoffConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.passphrase.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("HandoffConfig")
            .field("passphrase", &shown)
            .finish()
    }
}

// ── Storage ─────────────────────────────────────────────────────

/// Where the session token is persisted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `file`, `memory` or `none`.
    pub kind: String,
    /// Session file for `kind = "file"`; `~` is expanded. Defaults to the
    /// platform data directory.
    pub path: Option<String>,
    /// Key holding the bearer token.
    pub token_key: String,
    /// Additional keys removed together with the token on logout.
    pub clear_keys: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: "file".into(),
            path: None,
            token_key: "auth_token".into(),
            clear_keys: vec!["auth_user".into()],
        }
    }
}

impl StorageConfig {
    /// Resolve the session file path, expanding `~`.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        match self.path.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                Some(PathBuf::from(shellexpand::tilde(raw).into_owned()))
            }
            _ => super::project_dirs().map(|dirs| dirs.data_dir().join("session.json")),
        }
    }
}

// ── Session ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Call `POST {api}/logout` with the current token before clearing it.
    pub revoke_on_logout: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            revoke_on_logout: true,
        }
    }
}
