use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Classification of a chat message into a handling strategy.
///
/// Any label the parser produces that is not one of the known strategies
/// deserializes to [`Intent::Other`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Intent {
    /// Look up properties by name, owner or attribute.
    PropertyLookup,
    /// Filter properties by location.
    LocationFilter,
    /// Counts and rankings over the whole dataset.
    Aggregation,
    /// Questions about which attributes exist.
    Metadata,
    /// Anything else: small talk, unsupported requests.
    Other,
}

impl Intent {
    /// The wire label of this intent.
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::PropertyLookup => "property_lookup",
            Intent::LocationFilter => "location_filter",
            Intent::Aggregation => "aggregation",
            Intent::Metadata => "metadata",
            Intent::Other => "other",
        }
    }

    /// Map a free-form label onto the closed set, case-insensitively.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "property_lookup" => Intent::PropertyLookup,
            "location_filter" => Intent::LocationFilter,
            "aggregation" => Intent::Aggregation,
            "metadata" => Intent::Metadata,
            _ => Intent::Other,
        }
    }
}

impl From<String> for Intent {
    fn from(label: String) -> Self {
        Intent::from_label(&label)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of a stored chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

// =============================================================================
// Intent parsing
// =============================================================================

/// Attribute name to accepted values.
pub type Filters = BTreeMap<String, Vec<String>>;

/// Structured result of parsing one chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub intent: Intent,
    #[serde(default)]
    pub filters: Filters,
    /// Reply used when the intent handler has nothing better to say.
    #[serde(default)]
    pub response_text: String,
}

impl ParsedQuery {
    /// First accepted value of a filter, if any.
    pub fn first_filter(&self, key: &str) -> Option<&str> {
        self.filters
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

// =============================================================================
// Properties
// =============================================================================

/// A queryable property attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaAttribute {
    /// Column or attribute key.
    pub internal_name: String,
    /// Human-readable label.
    pub display_name: String,
}

/// One property row. Read-only from the chat's point of view.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    /// Every other attribute, flattened into the same JSON object.
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// One page of a property query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyPage {
    pub properties: Vec<PropertyRecord>,
    /// Matches across all pages.
    pub total: u64,
}

/// Scalar or ranked summary over the property dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

// =============================================================================
// Messages
// =============================================================================

/// Pagination bookkeeping attached to assistant messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub intent: Intent,
    /// Every column of the records shown in this turn.
    pub full_results_data: Vec<PropertyRecord>,
    pub has_more: bool,
    pub current_offset: u64,
    pub total_results: usize,
}

/// A message about to be stored.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    pub conversation_id: String,
    pub user_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Option<MessageMetadata>,
}

/// A stored chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: String,
    pub user_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Option<MessageMetadata>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Identity
// =============================================================================

/// An account known to the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub email_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

/// An authenticated session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Opaque bearer token. Only its hash is stored.
    pub access_token: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}
