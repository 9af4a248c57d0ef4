//! Application state shared across all route handlers.
//!
//! AppState holds references to all services. It is passed to handlers via
//! axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use propchat_chat::ChatOrchestrator;
use propchat_core::config::PropChatConfig;
use propchat_core::services::{AuthProvider, MessageStore};

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks. Nothing in
/// here is mutated after startup.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<PropChatConfig>,
    /// Identity provider for sessions and the auth pages.
    pub auth: Arc<dyn AuthProvider>,
    /// Chat turn handler.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Message store, for history listing.
    pub messages: Arc<dyn MessageStore>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: PropChatConfig,
        auth: Arc<dyn AuthProvider>,
        orchestrator: ChatOrchestrator,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            auth,
            orchestrator: Arc::new(orchestrator),
            messages,
            start_time: Instant::now(),
        }
    }
}
