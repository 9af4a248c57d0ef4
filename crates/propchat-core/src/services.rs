//! Collaborator traits consumed by the chat orchestrator and the API.
//!
//! Each trait is object-safe (via `async_trait`) so implementations can be
//! injected as `Arc<dyn Trait>` and swapped for fakes in tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    AggregationResult, Filters, Message, NewMessage, ParsedQuery, PropertyPage, SchemaAttribute,
    Session, User,
};

/// Identity provider: sessions, password login, sign-up.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve the user behind an access token. `None` for unknown or
    /// expired tokens.
    async fn get_user(&self, access_token: &str) -> Result<Option<User>>;

    /// Password login.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Register a new account. `redirect_to` is where the confirmation link
    /// sends the user.
    async fn sign_up(&self, email: &str, password: &str, redirect_to: &str) -> Result<User>;

    /// Redeem an email confirmation token and open a session.
    async fn confirm(&self, token: &str) -> Result<Session>;

    /// Revoke a session. Unknown tokens are not an error.
    async fn sign_out(&self, access_token: &str) -> Result<()>;
}

/// Source of the queryable property attributes.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn schema(&self) -> Result<Vec<SchemaAttribute>>;
}

/// Turns free text into intent + filters + a default reply.
#[async_trait]
pub trait IntentParser: Send + Sync {
    async fn parse(&self, message: &str, schema_doc: &str) -> Result<ParsedQuery>;
}

/// Runs property queries and aggregations.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// One page of properties matching `filters`, plus the total match count.
    async fn query_properties(
        &self,
        filters: &Filters,
        offset: u64,
        limit: u64,
    ) -> Result<PropertyPage>;

    /// Scalar aggregation keyed by an open-ended kind string. `None` when the
    /// kind is not supported or has no answer.
    async fn aggregate(&self, kind: &str) -> Result<Option<AggregationResult>>;
}

/// Append-only message persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: NewMessage) -> Result<Message>;

    /// Messages of one conversation owned by `user_id`, oldest first.
    async fn list_messages(&self, conversation_id: &str, user_id: Uuid) -> Result<Vec<Message>>;
}
