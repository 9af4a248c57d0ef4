//! Browser-facing auth and chat page handlers.
//!
//! These never return JSON errors: failures re-render the form with the
//! provider's message or redirect back to the login page.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Extension, Form};
use serde::Deserialize;
use tracing::{error, info, warn};

use propchat_core::error::PropChatError;
use propchat_ui::{render_chat, render_login, LoginMode, LoginPage, CALLBACK_HTML, SIGNUP_SUCCESS};

use crate::auth::{clear_session_cookie, session_cookie, session_token, CurrentUser};
use crate::state::AppState;

const CHAT_PATH: &str = "/chat";
const LOGIN_PATH: &str = "/auth/login";
const LOGIN_FAILED_PATH: &str = "/auth/login?error=Authentication%20failed";
const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub mode: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub token: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// GET / - straight to the chat.
pub async fn index() -> Redirect {
    Redirect::to(CHAT_PATH)
}

/// GET /auth/login - login or sign-up form, or straight to the chat when
/// a session already exists.
pub async fn login_page(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<LoginQuery>,
) -> Response {
    if user.is_some() {
        return Redirect::to(CHAT_PATH).into_response();
    }
    Html(render_login(&LoginPage {
        mode: LoginMode::from_query(query.mode.as_deref()),
        error: query.error.as_deref(),
        ..LoginPage::default()
    }))
    .into_response()
}

/// POST /auth/login - password login.
pub async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<Credentials>,
) -> Response {
    match state.auth.sign_in(&form.email, &form.password).await {
        Ok(session) => {
            info!(user_id = %session.user.id, "User logged in");
            with_cookie(
                session_cookie(&state.config.auth, &session.access_token),
                Redirect::to(CHAT_PATH),
            )
        }
        Err(e) => {
            let message = provider_message(&e);
            Html(render_login(&LoginPage {
                mode: LoginMode::Login,
                error: Some(&message),
                email: Some(&form.email),
                ..LoginPage::default()
            }))
            .into_response()
        }
    }
}

/// POST /auth/signup - register, then show the verification prompt in
/// login mode.
pub async fn signup_submit(
    State(state): State<AppState>,
    Form(form): Form<Credentials>,
) -> Response {
    let redirect_to = format!(
        "{}/auth/callback",
        state.config.server.public_url.trim_end_matches('/')
    );
    match state
        .auth
        .sign_up(&form.email, &form.password, &redirect_to)
        .await
    {
        Ok(user) => {
            info!(user_id = %user.id, "Sign up accepted");
            Html(render_login(&LoginPage {
                mode: LoginMode::Login,
                success: Some(SIGNUP_SUCCESS),
                email: Some(&form.email),
                ..LoginPage::default()
            }))
            .into_response()
        }
        Err(e) => {
            let message = provider_message(&e);
            Html(render_login(&LoginPage {
                mode: LoginMode::SignUp,
                error: Some(&message),
                email: Some(&form.email),
                ..LoginPage::default()
            }))
            .into_response()
        }
    }
}

/// GET /auth/callback - email confirmation links and post-login landing.
pub async fn callback(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(provider_error) = query.error.as_deref() {
        warn!(error = %provider_error, "Auth callback reported an error");
        return Redirect::to(LOGIN_FAILED_PATH).into_response();
    }

    if let Some(token) = query.token.as_deref().filter(|t| !t.is_empty()) {
        return match state.auth.confirm(token).await {
            Ok(session) => {
                info!(user_id = %session.user.id, "Email confirmed via callback");
                with_cookie(
                    session_cookie(&state.config.auth, &session.access_token),
                    Redirect::to(CHAT_PATH),
                )
            }
            Err(e) => {
                warn!(error = %e, "Email confirmation failed");
                Redirect::to(LOGIN_FAILED_PATH).into_response()
            }
        };
    }

    if user.is_some() {
        return Redirect::to(CHAT_PATH).into_response();
    }
    Html(CALLBACK_HTML).into_response()
}

/// POST /auth/logout - end the session and clear the cookie.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers, &state.config.auth.cookie_name) {
        if let Err(e) = state.auth.sign_out(&token).await {
            warn!(error = %e, "Failed to revoke session");
        }
    }
    with_cookie(
        clear_session_cookie(&state.config.auth),
        Redirect::to(LOGIN_PATH),
    )
}

/// GET /chat - the chat page, for signed-in users only.
pub async fn chat_page(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Response {
    match user {
        Some(user) => Html(render_chat(&user.email)).into_response(),
        None => Redirect::to(LOGIN_PATH).into_response(),
    }
}

/// The message shown inline for a provider failure.
fn provider_message(err: &PropChatError) -> String {
    match err {
        PropChatError::Auth(message) => message.clone(),
        other => {
            error!(error = %other, "Auth provider failure");
            GENERIC_FAILURE.to_string()
        }
    }
}

fn with_cookie(cookie: Option<header::HeaderValue>, redirect: Redirect) -> Response {
    let mut response = redirect.into_response();
    match cookie {
        Some(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        None => error!("Session cookie could not be encoded"),
    }
    response
}
