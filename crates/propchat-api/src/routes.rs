//! Router setup with all routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression, session
//! resolution and all endpoint handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use propchat_core::config::ServerConfig;
use propchat_core::error::PropChatError;

use crate::state::AppState;
use crate::{auth, handlers, pages};

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins(&state.config.server)))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true);

    // Routes that do NOT require a session.
    let public_routes = Router::new()
        .route("/", get(pages::index))
        .route("/health", get(handlers::health))
        .route("/auth/login", get(pages::login_page).post(pages::login_submit))
        .route("/auth/signup", post(pages::signup_submit))
        .route("/auth/callback", get(pages::callback))
        .route("/auth/logout", post(pages::logout))
        // The chat handlers answer anonymous callers themselves: a redirect
        // for the page, a JSON 401 for the API.
        .route(
            "/chat",
            get(pages::chat_page)
                .post(handlers::chat)
                .layer(DefaultBodyLimit::max(64 * 1024)),
        );

    let protected_routes = Router::new()
        .route(
            "/conversations/{id}/messages",
            get(handlers::list_messages),
        )
        .route_layer(axum::middleware::from_fn(auth::require_user));

    public_routes
        .merge(protected_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::load_session,
        ))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// The public URL plus any configured extra origins. Unparseable entries
/// are skipped.
fn allowed_origins(config: &ServerConfig) -> Vec<HeaderValue> {
    std::iter::once(config.public_url.trim_end_matches('/'))
        .chain(config.allowed_origins.iter().map(|o| o.trim_end_matches('/')))
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

/// Start the HTTP server on the configured address.
pub async fn start_server(state: AppState) -> Result<(), PropChatError> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);

    let router = create_router(state);

    tracing::info!("Starting PropChat server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PropChatError::Api(format!("Failed to bind: {}", e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| PropChatError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
