// HTTP surface for session authentication

use axum::{
    Extension, Router,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{
    AuthError, AuthResult, Authenticator, NEW_ACCESS_TOKEN_HEADER, REFRESH_TOKEN_HEADER,
    RequestContext, RevokeError,
};

pub type AppState = Authenticator;

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/session", get(current_session))
        .route("/auth/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Middleware guarding protected routes.
///
/// The `AuthResult` is placed in request extensions for handlers. A renewed
/// access token is returned to the client in `x-new-access-token`.
pub async fn require_session(
    State(authenticator): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let ctx = RequestContext::from_headers(req.headers());
    let result = authenticator.authenticate(&ctx).await?;

    let renewed = result.new_access_token.clone();
    req.extensions_mut().insert(result);

    let mut response = next.run(req).await;
    if let Some(token) = renewed {
        match HeaderValue::from_str(&token) {
            Ok(value) => {
                response.headers_mut().insert(NEW_ACCESS_TOKEN_HEADER, value);
            }
            Err(e) => warn!("Renewed token is not a valid header value: {}", e),
        }
    }

    Ok(response)
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        if let AuthError::VersionMismatch { expected } = &self {
            body["expected_version"] = Value::from(expected.as_str());
        }

        (self.status(), Json(body)).into_response()
    }
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn current_session(Extension(result): Extension<AuthResult>) -> Json<Value> {
    Json(serde_json::json!({
        "subject": result.claims.sub,
        "role": result.claims.role,
        "expires_at": result.claims.exp,
        "renewed": result.is_renewed(),
    }))
}

/// Revoke the caller's refresh token, if one was sent.
///
/// The refresh token must belong to the authenticated subject. A logout that
/// arrives with an expired access token is renewed by `require_session` first,
/// so the response still carries `x-new-access-token`; that access token stays
/// valid until its own expiry but can no longer be renewed.
async fn logout(
    State(authenticator): State<AppState>,
    Extension(session): Extension<AuthResult>,
    headers: HeaderMap,
) -> StatusCode {
    let Some(token) = headers
        .get(REFRESH_TOKEN_HEADER)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
    else {
        return StatusCode::NO_CONTENT;
    };

    match authenticator
        .revoke_refresh_token(&token, &session.claims.sub)
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT,
        Err(RevokeError::NotOwner) => StatusCode::FORBIDDEN,
        // An already-invalid refresh token needs no revocation.
        Err(RevokeError::Token(e)) => {
            warn!("Logout with unusable refresh token: {}", e);
            StatusCode::NO_CONTENT
        }
    }
}
