//! Partner-side session management.
//!
//! Provides:
//! - Token handoff receipt (`?token=<blob>` → decrypt → store → strip URL)
//! - Logout propagation in both directions via `?logout=true`
//! - Direct email/password login against the API
//! - A bearer-attaching REST client that ends the session on HTTP 401
//! - An explicit notification bus for "auth state changed"
//!
//! ## Design Decisions
//! - The session store is a capability trait; file, memory and null backends
//!   are selected from config by [`create_session_store`].
//! - Authentication status is derived from the store on every call, never
//!   cached in the controller.
//! - Browser location/history access goes through the [`Navigator`] trait so
//!   the flows run headless.

pub mod bus;
pub mod carrier;
pub mod client;
pub mod controller;
pub mod login;
pub mod navigator;
pub mod store;
pub mod token;

pub use bus::{AuthListener, AuthStateBus, PublishReport, Subscription};
pub use carrier::{
    build_logout_url, build_redirect_url, extract_from_location, secure_redirect_url,
    strip_token_from_current_url,
};
pub use client::{ApiClient, ApiError};
pub use controller::{AuthSessionController, SessionPhase, StartupOutcome, TokenSource};
pub use login::{LoginClient, LoginError, LoginSuccess};
pub use navigator::{AddressBar, Location, Navigator};
pub use store::{
    create_session_store, FileSessionStore, MemorySessionStore, NullSessionStore, SessionStore,
};
pub use token::Token;
