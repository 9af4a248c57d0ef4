//! Session resolution.
//!
//! The access token is read from `Authorization: Bearer <token>` or, for
//! browser requests, from the session cookie. [`load_session`] resolves it
//! once per request and stores the result as a [`CurrentUser`] extension.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use cookie::time::Duration;
use cookie::{Cookie, SameSite};
use tracing::warn;

use propchat_core::config::AuthConfig;
use propchat_core::types::User;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated user of the current request, if any.
#[derive(Clone, Debug, Default)]
pub struct CurrentUser(pub Option<User>);

/// Extract the session token from the request headers.
///
/// A bearer token wins over the cookie.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| Cookie::split_parse(v))
        .filter_map(Result::ok)
        .find(|c| c.name() == cookie_name && !c.value().is_empty())
        .map(|c| c.value().to_string())
}

/// Middleware that resolves the session for every request.
///
/// Provider failures are logged and treated as "not logged in".
pub async fn load_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let user = match session_token(req.headers(), &state.config.auth.cookie_name) {
        Some(token) => match state.auth.get_user(&token).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Session lookup failed");
                None
            }
        },
        None => None,
    };
    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}

/// Middleware that rejects requests without a session with a JSON 401.
pub async fn require_user(req: Request, next: Next) -> Response {
    let authenticated = req
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(|u| u.0.is_some());
    if !authenticated {
        return ApiError::Unauthorized.into_response();
    }
    next.run(req).await
}

/// `Set-Cookie` value carrying a fresh session token.
pub fn session_cookie(config: &AuthConfig, token: &str) -> Option<HeaderValue> {
    let cookie = Cookie::build((config.cookie_name.clone(), token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookie)
        .max_age(Duration::hours(i64::from(config.session_ttl_hours)))
        .build();
    HeaderValue::from_str(&cookie.to_string()).ok()
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie(config: &AuthConfig) -> Option<HeaderValue> {
    let cookie = Cookie::build((config.cookie_name.clone(), String::new()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookie)
        .max_age(Duration::ZERO)
        .build();
    HeaderValue::from_str(&cookie.to_string()).ok()
}
