pub mod config;
pub mod error;
pub mod services;
pub mod types;

pub use config::PropChatConfig;
pub use error::{PropChatError, Result};
pub use services::{AuthProvider, IntentParser, MessageStore, QueryExecutor, SchemaProvider};
pub use types::*;
