//! Session authentication for protected requests.
//!
//! Every protected request carries a short-lived access token in
//! `Authorization: Bearer <token>`. When that token has expired the client may
//! also send `x-refresh-token`, and a new access token is issued transparently.
//!
//! ## Gates
//!
//! - **Version**: `x-app-version` must match the configured server version
//! - **Shape**: the `Authorization` header must be a bearer token
//! - **Access**: the token must verify against the access secret
//! - **Refresh**: otherwise the refresh token must verify against the refresh secret
//!
//! Access and refresh tokens are signed with separate secrets.
//!
//! ## Usage
//!
//! ```ignore
//! let authenticator = Authenticator::new(&config);
//! let ctx = RequestContext::from_headers(&headers);
//! let result = authenticator.authenticate(&ctx).await?;
//!
//! if let Some(token) = &result.new_access_token {
//!     // send back as x-new-access-token
//! }
//! ```

mod authenticator;
mod context;
mod revocation;
mod token;

pub use authenticator::{AuthError, Authenticator, RevokeError, SessionTokens};
pub use context::{
    APP_VERSION_HEADER, AuthResult, NEW_ACCESS_TOKEN_HEADER, REFRESH_TOKEN_HEADER, RequestContext,
};
pub use revocation::RevocationList;
pub use token::{TokenClaims, TokenError, TokenSigner};
