//! Secure session handoff between an identity authority and a partner
//! application.
//!
//! The identity authority encrypts a bearer token into `?token=<blob>` and
//! redirects; the partner side decrypts it, persists it and uses it for API
//! calls until logout or a 401.

pub mod auth;
pub mod config;
pub mod security;

pub use auth::{AuthSessionController, AuthStateBus, SessionStore, Token};
pub use config::Config;
pub use security::{CipherError, EncodedBlob, HandoffCipher};
