//! Server-rendered auth and chat pages.
//!
//! Templates are embedded at compile time via `include_str!`. Every value
//! substituted into a template is HTML-escaped.

use html_escape::{encode_double_quoted_attribute, encode_text};

const LOGIN_TEMPLATE: &str = include_str!("../assets/login.html");
const CHAT_TEMPLATE: &str = include_str!("../assets/chat.html");

/// Callback page. Its script waits 500 ms, then goes to `/chat` when the
/// URL carries an auth fragment and to `/auth/login` otherwise.
pub const CALLBACK_HTML: &str = include_str!("../assets/callback.html");

pub const SIGNUP_SUCCESS: &str = "Sign up successful! Check your email to verify your account. Then log in with your credentials.";

/// Which form the login page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginMode {
    #[default]
    Login,
    SignUp,
}

impl LoginMode {
    /// Parse the `mode` query parameter.
    pub fn from_query(mode: Option<&str>) -> Self {
        match mode {
            Some("signup") => LoginMode::SignUp,
            _ => LoginMode::Login,
        }
    }
}

/// State of one rendering of the login page.
#[derive(Debug, Clone, Default)]
pub struct LoginPage<'a> {
    pub mode: LoginMode,
    pub error: Option<&'a str>,
    pub success: Option<&'a str>,
    /// Pre-filled email after a failed attempt.
    pub email: Option<&'a str>,
}

/// Render the login or sign-up form.
///
/// The mode switch is a plain link, so following it drops any error or
/// success notice.
pub fn render_login(page: &LoginPage<'_>) -> String {
    let (title, action, submit, switch_href, switch_label) = match page.mode {
        LoginMode::Login => (
            "Log in",
            "/auth/login",
            "Log in",
            "/auth/login?mode=signup",
            "Don't have an account? Sign up",
        ),
        LoginMode::SignUp => (
            "Sign up",
            "/auth/signup",
            "Sign up",
            "/auth/login",
            "Already have an account? Log in",
        ),
    };

    let mut notice = String::new();
    if let Some(error) = page.error.filter(|e| !e.is_empty()) {
        notice.push_str(&format!(r#"<p class="error">{}</p>"#, encode_text(error)));
    }
    if let Some(success) = page.success.filter(|s| !s.is_empty()) {
        notice.push_str(&format!(r#"<p class="success">{}</p>"#, encode_text(success)));
    }

    LOGIN_TEMPLATE
        .replace("{{TITLE}}", title)
        .replace("{{ACTION}}", action)
        .replace("{{SUBMIT}}", submit)
        .replace("{{SWITCH_HREF}}", switch_href)
        .replace("{{SWITCH_LABEL}}", switch_label)
        .replace("{{NOTICE}}", &notice)
        // User input goes in last so its text is never read as a placeholder.
        .replace(
            "{{EMAIL}}",
            &encode_double_quoted_attribute(page.email.unwrap_or_default()),
        )
}

/// Render the chat page for a signed-in user.
pub fn render_chat(email: &str) -> String {
    CHAT_TEMPLATE.replace("{{EMAIL}}", &encode_text(email))
}
