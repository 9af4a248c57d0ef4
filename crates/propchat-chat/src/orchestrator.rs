//! Chat orchestrator: handles one chat turn end to end.
//!
//! Stores the user message, asks the intent parser what the message means,
//! runs the matching query, formats the reply and stores it with the
//! pagination metadata the client needs to ask for the next page.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use propchat_core::services::{IntentParser, MessageStore, QueryExecutor, SchemaProvider};
use propchat_core::types::{
    Intent, Message, MessageMetadata, MessageRole, NewMessage, ParsedQuery, PropertyRecord,
    SchemaAttribute, User,
};

use crate::error::ChatError;
use crate::response;
use crate::schema_doc::render_schema_doc;

/// Records shown per turn.
pub const PAGE_SIZE: u64 = 5;

/// Aggregation used when the parser names none.
const DEFAULT_AGGREGATION: &str = "total_properties";

/// Incoming chat turn, as posted by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub offset: u64,
}

/// Result of a successful turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnResponse {
    /// The stored assistant message.
    pub message: Message,
    /// Reply text plus the results table.
    pub response: String,
    pub has_more: bool,
    pub current_offset: u64,
}

/// Outcome of dispatching on the parsed intent.
struct Dispatch {
    response_text: String,
    results: Vec<PropertyRecord>,
    has_more: bool,
}

/// Coordinates the schema provider, intent parser, query executor and
/// message store for one turn at a time. Holds no per-conversation state.
pub struct ChatOrchestrator {
    schema: Arc<dyn SchemaProvider>,
    parser: Arc<dyn IntentParser>,
    executor: Arc<dyn QueryExecutor>,
    store: Arc<dyn MessageStore>,
}

impl ChatOrchestrator {
    pub fn new(
        schema: Arc<dyn SchemaProvider>,
        parser: Arc<dyn IntentParser>,
        executor: Arc<dyn QueryExecutor>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            schema,
            parser,
            executor,
            store,
        }
    }

    /// Handle one chat turn for `user`.
    ///
    /// Nothing is written unless the caller is authenticated and both the
    /// message and the conversation id are present.
    pub async fn handle_turn(
        &self,
        user: Option<&User>,
        request: ChatTurnRequest,
    ) -> Result<ChatTurnResponse, ChatError> {
        let user = user.ok_or(ChatError::Unauthorized)?;

        let message = request.message.filter(|m| !m.is_empty());
        let conversation_id = request.conversation_id.filter(|c| !c.is_empty());
        let (Some(message), Some(conversation_id)) = (message, conversation_id) else {
            return Err(ChatError::BadRequest);
        };
        let offset = request.offset;

        // Best effort: a lost user message must not block the reply.
        if let Err(e) = self
            .store
            .insert_message(NewMessage {
                conversation_id: conversation_id.clone(),
                user_id: user.id,
                role: MessageRole::User,
                content: message.clone(),
                metadata: None,
            })
            .await
        {
            warn!(conversation_id = %conversation_id, error = %e, "Error saving user message");
        }

        let schema = self.schema.schema().await.map_err(|e| {
            error!(error = %e, "Failed to load property schema");
            ChatError::from(e)
        })?;
        let schema_doc = render_schema_doc(&schema);

        let parsed = self.parser.parse(&message, &schema_doc).await.map_err(|e| {
            error!(error = %e, "Intent parsing failed");
            ChatError::from(e)
        })?;
        debug!(intent = %parsed.intent, filters = ?parsed.filters, "Message parsed");

        let intent = parsed.intent;
        let dispatch = self.dispatch(parsed, &schema, offset).await?;

        let table = response::format_properties_table(&dispatch.results);
        let content = response::combine(&dispatch.response_text, &table);

        let metadata = MessageMetadata {
            intent,
            total_results: dispatch.results.len(),
            full_results_data: dispatch.results,
            has_more: dispatch.has_more,
            current_offset: offset,
        };

        let stored = self
            .store
            .insert_message(NewMessage {
                conversation_id: conversation_id.clone(),
                user_id: user.id,
                role: MessageRole::Assistant,
                content: content.clone(),
                metadata: Some(metadata),
            })
            .await
            .map_err(|e| {
                error!(conversation_id = %conversation_id, error = %e, "Error saving assistant message");
                ChatError::Persistence(e.to_string())
            })?;

        info!(
            conversation_id = %conversation_id,
            intent = %intent,
            has_more = dispatch.has_more,
            offset,
            "Chat turn handled"
        );

        Ok(ChatTurnResponse {
            message: stored,
            response: content,
            has_more: dispatch.has_more,
            current_offset: offset,
        })
    }

    async fn dispatch(
        &self,
        parsed: ParsedQuery,
        schema: &[SchemaAttribute],
        offset: u64,
    ) -> Result<Dispatch, ChatError> {
        match parsed.intent {
            Intent::PropertyLookup | Intent::LocationFilter => {
                let page = self
                    .executor
                    .query_properties(&parsed.filters, offset, PAGE_SIZE)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "Property query failed");
                        ChatError::from(e)
                    })?;

                let has_more = offset.saturating_add(PAGE_SIZE) < page.total;
                let returned = page.properties.len();
                let response_text = match (parsed.intent, returned) {
                    (Intent::LocationFilter, 0) => response::NO_LOCATION_MATCHES.to_string(),
                    (_, 0) => response::NO_PROPERTY_MATCHES.to_string(),
                    (Intent::LocationFilter, n) => {
                        response::location_summary(page.total, n, PAGE_SIZE)
                    }
                    (_, n) => response::lookup_summary(page.total, n, PAGE_SIZE),
                };

                Ok(Dispatch {
                    response_text,
                    results: page.properties,
                    has_more,
                })
            }
            Intent::Aggregation => {
                let kind = parsed
                    .first_filter("info_type")
                    .filter(|k| !k.is_empty())
                    .unwrap_or(DEFAULT_AGGREGATION)
                    .to_string();
                let result = self.executor.aggregate(&kind).await.map_err(|e| {
                    error!(kind = %kind, error = %e, "Aggregation failed");
                    ChatError::from(e)
                })?;

                let response_text = match result {
                    Some(result) => response::aggregation_text(&result, &kind),
                    None => parsed.response_text,
                };
                Ok(Dispatch {
                    response_text,
                    results: Vec::new(),
                    has_more: false,
                })
            }
            Intent::Metadata => Ok(Dispatch {
                response_text: response::metadata_text(schema),
                results: Vec::new(),
                has_more: false,
            }),
            Intent::Other => Ok(Dispatch {
                response_text: parsed.response_text,
                results: Vec::new(),
                has_more: false,
            }),
        }
    }
}
