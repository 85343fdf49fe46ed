//! Request-scoped inputs and outputs of session authentication.

use http::HeaderMap;
use serde::Serialize;

use crate::auth::token::TokenClaims;
use crate::types::AppVersion;

/// Header carrying a refresh token on the renewal path.
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Header carrying the client build identifier.
pub const APP_VERSION_HEADER: &str = "x-app-version";

/// Response header carrying a renewed access token.
pub const NEW_ACCESS_TOKEN_HEADER: &str = "x-new-access-token";

/// Headers the authenticator reads from an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Raw `Authorization` header value
    pub authorization: Option<String>,
    /// Raw `x-refresh-token` header value
    pub refresh_token: Option<String>,
    /// `x-app-version`, blank treated as absent
    pub client_version: Option<AppVersion>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the session headers from an HTTP request.
    ///
    /// A header that is present always yields a value; bytes that are not
    /// UTF-8 are replaced, so they can never match a real token or version.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        };

        Self {
            authorization: read(http::header::AUTHORIZATION.as_str()),
            refresh_token: read(REFRESH_TOKEN_HEADER),
            client_version: AppVersion::from_header(read(APP_VERSION_HEADER).as_deref()),
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Set `Authorization` to `Bearer <token>`.
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_authorization(format!("Bearer {}", token))
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_client_version(mut self, version: &str) -> Self {
        self.client_version = AppVersion::from_header(Some(version));
        self
    }
}

/// Outcome of a successful authentication.
///
/// `new_access_token` is set only when the access token was renewed from a
/// refresh token; `claims` are then the refresh token's claims.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResult {
    pub claims: TokenClaims,
    pub new_access_token: Option<String>,
}

impl AuthResult {
    pub fn is_renewed(&self) -> bool {
        self.new_access_token.is_some()
    }
}
