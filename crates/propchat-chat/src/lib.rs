//! Conversational interface for PropChat.
//!
//! Turns a chat message into a property query: intent parsing (LLM or
//! keyword rules), dispatch to the query executor, markdown formatting and
//! persistence of both sides of the turn.

pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod parser;
pub mod response;
pub mod schema_doc;

pub use error::ChatError;
pub use llm::LlmIntentParser;
pub use orchestrator::{ChatOrchestrator, ChatTurnRequest, ChatTurnResponse, PAGE_SIZE};
pub use parser::KeywordIntentParser;
pub use response::format_properties_table;
pub use schema_doc::render_schema_doc;
