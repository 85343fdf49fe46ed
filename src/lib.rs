pub mod api;
pub mod auth;
pub mod config;
pub mod types;

// Re-export key types and functions
pub use auth::{
    AuthError, AuthResult, Authenticator, RequestContext, RevocationList, RevokeError, SessionTokens,
    TokenClaims, TokenError,
};
pub use config::{SessionConfig, load_session_config, resolve_config_path};
pub use types::{AppVersion, Role, SubjectId};
