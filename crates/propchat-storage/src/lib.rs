//! PropChat storage crate - SQLite persistence for accounts, chat messages
//! and the property dataset.
//!
//! Every repository shares one WAL-mode [`Database`]. Each implements the
//! matching collaborator trait from `propchat-core` so the chat
//! orchestrator and the API never touch SQL directly.

pub mod accounts;
pub mod db;
pub mod messages;
pub mod migrations;
pub mod properties;

pub use accounts::LocalAuthProvider;
pub use db::Database;
pub use messages::MessageRepository;
pub use properties::PropertyRepository;
