//! PropChat browser pages.
//!
//! Self-contained HTML with inline CSS and JavaScript, embedded in the
//! binary and served by `propchat-api`.

pub mod pages;

pub use pages::{render_chat, render_login, LoginMode, LoginPage, CALLBACK_HTML, SIGNUP_SUCCESS};
