//! Session orchestration for the partner application.
//!
//! ## Startup
//! 1. `?logout=true` → clear the store, bounce to the identity authority with
//!    the logout flag, stop.
//! 2. `?token=<blob>` → decrypt; on success persist, strip the parameter,
//!    publish. Cipher failures are logged and treated as "no token".
//! 3. Otherwise use the stored token, or send the user to log in.
//!
//! ## States
//! `Uninitialized → Initializing → {Authenticated, Unauthenticated}`, and
//! `logout()` passes through `LoggingOut` back to `Unauthenticated`.
//!
//! Authentication is never cached: `is_authenticated()` asks the store every
//! time.

use super::bus::AuthStateBus;
use super::carrier;
use super::login::{LoginClient, LoginError, LoginSuccess};
use super::navigator::Navigator;
use super::store::SessionStore;
use super::token::Token;
use crate::config::Config;
use crate::security::{CipherError, EncodedBlob, HandoffCipher};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Authenticated,
    Unauthenticated,
    LoggingOut,
}

/// Where the session token came from at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Decrypted from the `token` query parameter.
    Handoff,
    /// Already in the session store.
    Stored,
}

/// Result of [`AuthSessionController::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    Authenticated { source: TokenSource },
    /// No usable token; the user was sent to the identity authority.
    LoginRequired { redirect: String },
    /// The identity authority asked for a logout; the user was sent back.
    LoggedOut { redirect: String },
}

impl StartupOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, StartupOutcome::Authenticated { .. })
    }
}

pub struct AuthSessionController {
    cipher: HandoffCipher,
    store: Arc<dyn SessionStore>,
    bus: AuthStateBus,
    navigator: Arc<dyn Navigator>,
    login_client: LoginClient,
    identity_origin: String,
    auth_header: String,
    revoke_on_logout: bool,
    phase: Mutex<SessionPhase>,
}

impl AuthSessionController {
    /// Wire a controller from validated config and its collaborators.
    pub fn new(
        config: &Config,
        store: Arc<dyn SessionStore>,
        bus: AuthStateBus,
        navigator: Arc<dyn Navigator>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            cipher: HandoffCipher::new(config.handoff.passphrase.clone()),
            store,
            bus,
            navigator,
            login_client: LoginClient::new(&config.api)?,
            identity_origin: config.identity.origin.clone(),
            auth_header: config.api.auth_header.clone(),
            revoke_on_logout: config.session.revoke_on_logout,
            phase: Mutex::new(SessionPhase::Uninitialized),
        })
    }

    // ── Query surface ───────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock()
    }

    pub fn bus(&self) -> &AuthStateBus {
        &self.bus
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn token(&self) -> Option<Token> {
        self.store.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// `(header name, "Bearer <token>")` for the current token.
    pub fn authorization_header(&self) -> Option<(String, String)> {
        self.token()
            .map(|token| (self.auth_header.clone(), token.bearer()))
    }

    fn set_phase(&self, next: SessionPhase) {
        let mut phase = self.phase.lock();
        let previous = *phase;
        if previous != next {
            tracing::info!(from = ?previous, to = ?next, "Session phase changed");
            *phase = next;
        }
    }

    // ── Startup ─────────────────────────────────────────────────

    /// Run the startup sequence against the navigator's current location.
    pub async fn start(&self) -> StartupOutcome {
        self.set_phase(SessionPhase::Initializing);
        let location = self.navigator.location();

        if carrier::is_logout_request(&location.search()) {
            tracing::info!("Logout requested by the identity authority");
            self.store.clear();
            self.set_phase(SessionPhase::Unauthenticated);
            let redirect = carrier::build_logout_url(&self.identity_origin);
            self.navigator.redirect(&redirect);
            return StartupOutcome::LoggedOut { redirect };
        }

        if let Some(blob) = carrier::extract_from_location(&location.search()) {
            match self.decrypt_handoff(blob).await {
                Some(token) => {
                    self.store.set(&token);
                    carrier::strip_token_from_current_url(self.navigator.as_ref());
                    self.set_phase(SessionPhase::Authenticated);
                    self.bus.publish();
                    return StartupOutcome::Authenticated {
                        source: TokenSource::Handoff,
                    };
                }
                None => {
                    carrier::strip_token_from_current_url(self.navigator.as_ref());
                }
            }
        }

        if self.store.get().is_some() {
            self.set_phase(SessionPhase::Authenticated);
            return StartupOutcome::Authenticated {
                source: TokenSource::Stored,
            };
        }

        self.set_phase(SessionPhase::Unauthenticated);
        let redirect = carrier::login_redirect_url(&self.identity_origin);
        tracing::info!("No valid authentication token found, login required");
        self.navigator.redirect(&redirect);
        StartupOutcome::LoginRequired { redirect }
    }

    /// Decrypt off the async thread when a Tokio runtime is available, inline
    /// otherwise. Any failure means "no token".
    async fn decrypt_handoff(&self, blob: EncodedBlob) -> Option<Token> {
        let decrypted = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let cipher = self.cipher.clone();
                match handle.spawn_blocking(move || cipher.decrypt(&blob)).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!("Handoff decryption task failed: {e}");
                        return None;
                    }
                }
            }
            Err(_) => self.cipher.decrypt(&blob),
        };

        match decrypted {
            Ok(plaintext) => {
                let token = Token::new(plaintext);
                if token.is_none() {
                    tracing::warn!("Handoff token decrypted to an empty value, ignoring it");
                }
                token
            }
            Err(e) if e.is_input_error() => {
                tracing::warn!("Ignoring handoff token: {e}");
                None
            }
            Err(e) => {
                tracing::error!("Handoff cipher unavailable, ignoring token: {e}");
                None
            }
        }
    }

    // ── Explicit actions ────────────────────────────────────────

    /// Email/password login. On success the token is stored and listeners
    /// are notified; on failure the structured error goes to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginSuccess, LoginError> {
        let success = match self.login_client.login(email, password).await {
            Ok(success) => success,
            Err(e) => {
                tracing::warn!(status = ?e.status(), transport = e.is_transport(), "Login failed: {e}");
                return Err(e);
            }
        };

        self.store.set(&success.token);
        self.set_phase(SessionPhase::Authenticated);
        self.bus.publish();
        Ok(success)
    }

    /// Clear the session, notify listeners and bounce to the identity
    /// authority with `logout=true`. Safe to call repeatedly. Returns the
    /// redirect target.
    pub async fn logout(&self) -> String {
        self.set_phase(SessionPhase::LoggingOut);

        if self.revoke_on_logout {
            if let Some(token) = self.store.get() {
                if let Err(e) = self.login_client.logout(&token).await {
                    tracing::warn!("Remote logout failed, clearing local session anyway: {e}");
                }
            }
        }

        self.store.clear();
        self.set_phase(SessionPhase::Unauthenticated);
        self.bus.publish();

        let redirect = carrier::build_logout_url(&self.identity_origin);
        self.navigator.redirect(&redirect);
        redirect
    }

    /// A protected call answered 401. No retry: the session is over.
    pub async fn handle_session_expired(&self) -> String {
        tracing::warn!("Session expired (HTTP 401), forcing logout");
        self.logout().await
    }

    /// Issuing side: encrypt `token` into a handoff URL for `target_origin`.
    pub fn issue_handoff_url(&self, target_origin: &str, token: &Token) -> Result<String, CipherError> {
        carrier::secure_redirect_url(&self.cipher, target_origin, token)
    }
}
