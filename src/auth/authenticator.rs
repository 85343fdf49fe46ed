//! Session authenticator for protected requests.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::auth::context::{AuthResult, RequestContext};
use crate::auth::revocation::RevocationList;
use crate::auth::token::{TokenClaims, TokenError, TokenSigner};
use crate::config::SessionConfig;
use crate::types::{AppVersion, Role, SubjectId};

const BEARER_PREFIX: &str = "Bearer ";

/// Authentication errors.
///
/// Every variant is terminal for the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Client build differs from the server's expected build
    VersionMismatch { expected: AppVersion },
    /// No `Authorization` header, or not of the form `Bearer <token>`
    MissingOrMalformedToken,
    /// Access token failed verification and no refresh token was sent
    TokenExpiredNoRefresh,
    /// Access token and refresh token both failed verification
    SessionExpired,
    /// Renewed token could not be signed
    Internal(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::VersionMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::MissingOrMalformedToken | Self::TokenExpiredNoRefresh | Self::SessionExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::VersionMismatch { .. } => "version_mismatch",
            Self::MissingOrMalformedToken => "missing_or_malformed_token",
            Self::TokenExpiredNoRefresh => "token_expired",
            Self::SessionExpired => "session_expired",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::VersionMismatch { expected } => Some(expected.as_str()),
            Self::TokenExpiredNoRefresh | Self::SessionExpired => Some("login again"),
            Self::MissingOrMalformedToken | Self::Internal(_) => None,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionMismatch { .. } => write!(f, "Version mismatch. Please refresh your app."),
            Self::MissingOrMalformedToken => write!(f, "Authorization token missing or malformed."),
            Self::TokenExpiredNoRefresh => write!(f, "Token expired. Please login again."),
            Self::SessionExpired => write!(f, "Session expired. Please login again."),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Reasons a refresh token could not be revoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeError {
    /// Token is invalid, expired or already revoked
    Token(TokenError),
    /// Token belongs to a different subject than the caller
    NotOwner,
}

impl fmt::Display for RevokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(e) => write!(f, "{}", e),
            Self::NotOwner => write!(f, "Refresh token belongs to another subject"),
        }
    }
}

impl std::error::Error for RevokeError {}

/// Access and refresh tokens handed out at login.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Validates bearer tokens and renews expired access tokens.
///
/// Cloning is cheap; all clones share the same signers and revocation list.
#[derive(Debug, Clone)]
pub struct Authenticator {
    access: Arc<TokenSigner>,
    refresh: Arc<TokenSigner>,
    expected_version: Option<AppVersion>,
    revocation: Option<RevocationList>,
}

impl Authenticator {
    /// Create a new authenticator from the session config.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            access: Arc::new(TokenSigner::new(
                &config.access_secret,
                config.access_ttl_seconds,
                config.leeway_seconds,
            )),
            refresh: Arc::new(TokenSigner::new(
                &config.refresh_secret,
                config.refresh_ttl_seconds,
                config.leeway_seconds,
            )),
            expected_version: config
                .expected_version
                .as_deref()
                .and_then(|v| AppVersion::from_header(Some(v))),
            revocation: None,
        }
    }

    /// Reject refresh tokens present in `list`.
    pub fn with_revocation(mut self, list: RevocationList) -> Self {
        self.revocation = Some(list);
        self
    }

    pub fn expected_version(&self) -> Option<&AppVersion> {
        self.expected_version.as_ref()
    }

    pub fn revocation(&self) -> Option<&RevocationList> {
        self.revocation.as_ref()
    }

    /// Issue an access/refresh token pair for a freshly logged-in subject.
    pub fn issue_session(
        &self,
        subject: &SubjectId,
        role: &Role,
    ) -> Result<SessionTokens, TokenError> {
        let access_token = self.access.issue(subject, role)?;
        let refresh_token = self.refresh.issue(subject, role)?;
        info!("Issued session for subject: {}", subject);

        Ok(SessionTokens {
            access_token,
            refresh_token,
            expires_in: self.access.ttl_seconds(),
        })
    }

    /// Verify an access token without any renewal.
    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.access.verify(token)
    }

    /// Verify a refresh token, including the revocation check.
    pub async fn verify_refresh(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.refresh.verify(token)?;

        if let Some(list) = &self.revocation
            && list.is_revoked(&claims.jti).await
        {
            return Err(TokenError::Invalid("refresh token has been revoked".to_string()));
        }

        Ok(claims)
    }

    /// Authenticate a request.
    ///
    /// Gates run in order and the first failure wins:
    /// 1. client version against the expected version
    /// 2. `Authorization: Bearer <token>` shape
    /// 3. access token verification
    /// 4. presence of a refresh token
    /// 5. refresh token verification, then a new access token is issued
    pub async fn authenticate(&self, ctx: &RequestContext) -> Result<AuthResult, AuthError> {
        if let (Some(client), Some(expected)) = (&ctx.client_version, &self.expected_version)
            && client != expected
        {
            warn!(
                "Rejected client version {} (expected {})",
                client, expected
            );
            return Err(AuthError::VersionMismatch {
                expected: expected.clone(),
            });
        }

        let token = ctx
            .authorization
            .as_deref()
            .and_then(|h| h.strip_prefix(BEARER_PREFIX))
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingOrMalformedToken)?;

        let access_err = match self.access.verify(token) {
            Ok(claims) => {
                debug!("Access token verified for subject: {}", claims.sub);
                return Ok(AuthResult {
                    claims,
                    new_access_token: None,
                });
            }
            Err(e) => e,
        };

        let Some(refresh_token) = ctx.refresh_token.as_deref() else {
            debug!("Access token rejected without refresh token: {}", access_err);
            return Err(AuthError::TokenExpiredNoRefresh);
        };

        let claims = self.verify_refresh(refresh_token).await.map_err(|e| {
            debug!("Refresh token rejected: {}", e);
            AuthError::SessionExpired
        })?;

        let new_access_token = self.access.issue(&claims.sub, &claims.role).map_err(|e| {
            error!("Failed to sign renewed access token: {}", e);
            AuthError::Internal(e.to_string())
        })?;

        info!("Renewed access token for subject: {}", claims.sub);

        Ok(AuthResult {
            claims,
            new_access_token: Some(new_access_token),
        })
    }

    /// Revoke a refresh token so it can no longer renew access.
    ///
    /// Only the token's own subject may revoke it. Returns `Ok(false)` when no
    /// revocation list is configured.
    pub async fn revoke_refresh_token(
        &self,
        token: &str,
        owner: &SubjectId,
    ) -> Result<bool, RevokeError> {
        let Some(list) = &self.revocation else {
            return Ok(false);
        };

        let claims = self.verify_refresh(token).await.map_err(RevokeError::Token)?;
        if &claims.sub != owner {
            warn!(
                "Subject {} attempted to revoke a refresh token of {}",
                owner, claims.sub
            );
            return Err(RevokeError::NotOwner);
        }

        list.revoke(&claims).await;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_SECRET: &str = "access-secret-for-tests-0123456789";
    const REFRESH_SECRET: &str = "refresh-secret-for-tests-0123456789";

    fn config() -> SessionConfig {
        SessionConfig::new(ACCESS_SECRET, REFRESH_SECRET)
    }

    fn owner() -> (SubjectId, Role) {
        (SubjectId::new("u1"), Role::new("owner"))
    }

    fn expired_access_token() -> String {
        let (sub, role) = owner();
        TokenSigner::new(ACCESS_SECRET, 0, 0)
            .issue(&sub, &role)
            .unwrap()
    }

    fn expired_refresh_token() -> String {
        let (sub, role) = owner();
        TokenSigner::new(REFRESH_SECRET, 0, 0)
            .issue(&sub, &role)
            .unwrap()
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::VersionMismatch {
                expected: AppVersion::new("2.0.0")
            }
            .to_string(),
            "Version mismatch. Please refresh your app."
        );
        assert_eq!(
            AuthError::MissingOrMalformedToken.to_string(),
            "Authorization token missing or malformed."
        );
        assert_eq!(
            AuthError::TokenExpiredNoRefresh.to_string(),
            "Token expired. Please login again."
        );
        assert_eq!(
            AuthError::SessionExpired.to_string(),
            "Session expired. Please login again."
        );
    }

    #[test]
    fn test_auth_error_status_and_detail() {
        let mismatch = AuthError::VersionMismatch {
            expected: AppVersion::new("2.0.0"),
        };
        assert_eq!(mismatch.status(), StatusCode::BAD_REQUEST);
        assert_eq!(mismatch.detail(), Some("2.0.0"));

        assert_eq!(
            AuthError::MissingOrMalformedToken.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::MissingOrMalformedToken.detail(), None);
        assert_eq!(
            AuthError::TokenExpiredNoRefresh.detail(),
            Some("login again")
        );
        assert_eq!(AuthError::SessionExpired.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_version_mismatch_precedes_token_checks() {
        let auth = Authenticator::new(&config().with_expected_version("2.0.0"));
        let (sub, role) = owner();
        let valid = auth.issue_session(&sub, &role).unwrap().access_token;

        let contexts = [
            RequestContext::new().with_client_version("1.9.0"),
            RequestContext::new()
                .with_client_version("1.9.0")
                .with_authorization("Token abc"),
            RequestContext::new()
                .with_client_version("1.9.0")
                .with_bearer(&valid),
        ];

        for ctx in &contexts {
            let err = auth.authenticate(ctx).await.unwrap_err();
            assert_eq!(
                err,
                AuthError::VersionMismatch {
                    expected: AppVersion::new("2.0.0")
                }
            );
        }
    }

    #[tokio::test]
    async fn test_version_gate_skipped_when_either_side_absent() {
        let (sub, role) = owner();

        let unpinned = Authenticator::new(&config());
        let token = unpinned.issue_session(&sub, &role).unwrap().access_token;
        let ctx = RequestContext::new()
            .with_client_version("0.0.1")
            .with_bearer(&token);
        assert!(unpinned.authenticate(&ctx).await.is_ok());

        let pinned = Authenticator::new(&config().with_expected_version("2.0.0"));
        let token = pinned.issue_session(&sub, &role).unwrap().access_token;
        let ctx = RequestContext::new().with_bearer(&token);
        assert!(pinned.authenticate(&ctx).await.is_ok());

        let ctx = RequestContext::new()
            .with_client_version("2.0.0")
            .with_bearer(&token);
        assert!(pinned.authenticate(&ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_or_malformed_authorization() {
        let auth = Authenticator::new(&config());
        let malformed = ["", "Bearer", "Bearer ", "bearer abc", "Token abc", "Basic dTE6cHc="];

        let err = auth.authenticate(&RequestContext::new()).await.unwrap_err();
        assert_eq!(err, AuthError::MissingOrMalformedToken);

        for value in malformed {
            let ctx = RequestContext::new()
                .with_authorization(value)
                .with_refresh_token("ignored");
            let err = auth.authenticate(&ctx).await.unwrap_err();
            assert_eq!(err, AuthError::MissingOrMalformedToken, "value: {:?}", value);
        }
    }

    #[tokio::test]
    async fn test_valid_access_token() {
        let auth = Authenticator::new(&config());
        let (sub, role) = owner();
        let tokens = auth.issue_session(&sub, &role).unwrap();

        let ctx = RequestContext::new().with_bearer(&tokens.access_token);
        let result = auth.authenticate(&ctx).await.unwrap();

        assert_eq!(result.claims.sub, sub);
        assert_eq!(result.claims.role, role);
        assert!(result.new_access_token.is_none());
        assert!(!result.is_renewed());
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let auth = Authenticator::new(&config());
        let ctx = RequestContext::new().with_bearer(&expired_access_token());

        let err = auth.authenticate(&ctx).await.unwrap_err();

        assert_eq!(err, AuthError::TokenExpiredNoRefresh);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Token expired. Please login again.");
    }

    #[tokio::test]
    async fn test_configured_leeway_accepts_recently_expired_token() {
        let (sub, role) = owner();
        let token = TokenSigner::new(ACCESS_SECRET, -2, 0)
            .issue(&sub, &role)
            .unwrap();
        let ctx = RequestContext::new().with_bearer(&token);

        let lenient = Authenticator::new(&config().with_leeway(30));
        let result = lenient.authenticate(&ctx).await.unwrap();
        assert!(!result.is_renewed());

        let strict = Authenticator::new(&config());
        let err = strict.authenticate(&ctx).await.unwrap_err();
        assert_eq!(err, AuthError::TokenExpiredNoRefresh);
    }

    #[tokio::test]
    async fn test_invalid_signature_without_refresh_token() {
        let auth = Authenticator::new(&config());
        let ctx = RequestContext::new().with_bearer("definitely-not-a-jwt");

        let err = auth.authenticate(&ctx).await.unwrap_err();
        assert_eq!(err, AuthError::TokenExpiredNoRefresh);
    }

    #[tokio::test]
    async fn test_renewal_with_valid_refresh_token() {
        let auth = Authenticator::new(&config());
        let (sub, role) = owner();
        let refresh = auth.issue_session(&sub, &role).unwrap().refresh_token;
        let expired = expired_access_token();

        let ctx = RequestContext::new()
            .with_bearer(&expired)
            .with_refresh_token(refresh);
        let result = auth.authenticate(&ctx).await.unwrap();

        assert_eq!(result.claims.sub, sub);
        assert_eq!(result.claims.role, role);
        let renewed = result.new_access_token.expect("renewed token");
        assert_ne!(renewed, expired);

        let claims = auth.verify_access(&renewed).unwrap();
        assert_eq!(claims.sub, sub);
        assert_eq!(claims.role, role);

        let follow_up = auth
            .authenticate(&RequestContext::new().with_bearer(&renewed))
            .await
            .unwrap();
        assert!(follow_up.new_access_token.is_none());
    }

    #[tokio::test]
    async fn test_expired_refresh_token() {
        let auth = Authenticator::new(&config());
        let ctx = RequestContext::new()
            .with_bearer(&expired_access_token())
            .with_refresh_token(expired_refresh_token());

        let err = auth.authenticate(&ctx).await.unwrap_err();
        assert_eq!(err, AuthError::SessionExpired);
        assert_eq!(err.to_string(), "Session expired. Please login again.");
    }

    #[tokio::test]
    async fn test_refresh_token_signed_with_access_secret_is_rejected() {
        let auth = Authenticator::new(&config());
        let (sub, role) = owner();
        let access_as_refresh = auth.issue_session(&sub, &role).unwrap().access_token;

        let ctx = RequestContext::new()
            .with_bearer(&expired_access_token())
            .with_refresh_token(access_as_refresh);

        let err = auth.authenticate(&ctx).await.unwrap_err();
        assert_eq!(err, AuthError::SessionExpired);
    }

    #[tokio::test]
    async fn test_garbage_refresh_token() {
        let auth = Authenticator::new(&config());
        let ctx = RequestContext::new()
            .with_bearer(&expired_access_token())
            .with_refresh_token("garbage");

        let err = auth.authenticate(&ctx).await.unwrap_err();
        assert_eq!(err, AuthError::SessionExpired);
    }

    #[tokio::test]
    async fn test_rejection_is_repeatable() {
        let auth = Authenticator::new(&config());
        let ctx = RequestContext::new()
            .with_bearer(&expired_access_token())
            .with_refresh_token(expired_refresh_token());

        let first = auth.authenticate(&ctx).await.unwrap_err();
        let second = auth.authenticate(&ctx).await.unwrap_err();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_is_rejected() {
        let list = RevocationList::new();
        let auth = Authenticator::new(&config()).with_revocation(list.clone());
        let (sub, role) = owner();
        let refresh = auth.issue_session(&sub, &role).unwrap().refresh_token;

        assert!(auth.revoke_refresh_token(&refresh, &sub).await.unwrap());
        assert_eq!(list.len().await, 1);

        let ctx = RequestContext::new()
            .with_bearer(&expired_access_token())
            .with_refresh_token(refresh);
        let err = auth.authenticate(&ctx).await.unwrap_err();
        assert_eq!(err, AuthError::SessionExpired);
    }

    #[tokio::test]
    async fn test_revoke_requires_matching_subject() {
        let list = RevocationList::new();
        let auth = Authenticator::new(&config()).with_revocation(list.clone());
        let (sub, role) = owner();
        let refresh = auth.issue_session(&sub, &role).unwrap().refresh_token;

        let err = auth
            .revoke_refresh_token(&refresh, &SubjectId::new("u2"))
            .await
            .unwrap_err();

        assert_eq!(err, RevokeError::NotOwner);
        assert!(list.is_empty().await);
    }

    #[tokio::test]
    async fn test_revoke_invalid_token() {
        let auth = Authenticator::new(&config()).with_revocation(RevocationList::new());
        let (sub, _) = owner();

        let err = auth.revoke_refresh_token("garbage", &sub).await.unwrap_err();
        assert!(matches!(err, RevokeError::Token(TokenError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_revoke_without_list_is_noop() {
        let auth = Authenticator::new(&config());
        let (sub, role) = owner();
        let refresh = auth.issue_session(&sub, &role).unwrap().refresh_token;

        assert!(!auth.revoke_refresh_token(&refresh, &sub).await.unwrap());

        let ctx = RequestContext::new()
            .with_bearer(&expired_access_token())
            .with_refresh_token(refresh);
        assert!(auth.authenticate(&ctx).await.is_ok());
    }

    #[test]
    fn test_issue_session_reports_lifetime() {
        let auth = Authenticator::new(&config().with_access_ttl(900));
        let (sub, role) = owner();

        let tokens = auth.issue_session(&sub, &role).unwrap();
        assert_eq!(tokens.expires_in, 900);
        assert_ne!(tokens.access_token, tokens.refresh_token);
    }
}
