//! PropChat API crate - axum HTTP server, chat endpoint, auth pages.
//!
//! Serves `POST /chat`, conversation history, health, and the
//! server-rendered login, callback and chat pages.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod pages;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
