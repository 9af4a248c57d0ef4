//! Database schema migrations.
//!
//! Applies the initial schema: accounts (users, sessions, email
//! confirmations), chat messages, properties and the property attribute
//! catalogue, plus the schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use propchat_core::error::PropChatError;

/// Run all pending database migrations.
///
/// Each version is applied at most once; the highest applied version is
/// tracked in `schema_migrations`.
pub fn run_migrations(conn: &Connection) -> Result<(), PropChatError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| PropChatError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| PropChatError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), PropChatError> {
    conn.execute_batch(
        "
        -- Accounts.
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY NOT NULL,
            email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash   TEXT NOT NULL,
            email_confirmed INTEGER NOT NULL DEFAULT 0,
            created_at      INTEGER NOT NULL
        );

        -- Sessions are keyed by the SHA-256 of the bearer token.
        CREATE TABLE IF NOT EXISTS sessions (
            token_hash  TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT NOT NULL,
            expires_at  INTEGER NOT NULL,
            created_at  INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user
            ON sessions (user_id);

        CREATE TABLE IF NOT EXISTS email_confirmations (
            token_hash  TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT NOT NULL,
            expires_at  INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        -- Chat messages. Append-only; rowid gives insertion order.
        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY NOT NULL,
            conversation_id TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            role            TEXT NOT NULL
                            CHECK (role IN ('user', 'assistant')),
            content         TEXT NOT NULL,
            metadata        TEXT,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages (conversation_id, user_id);

        -- Properties. Attributes beyond name/address/owner live in a JSON object.
        CREATE TABLE IF NOT EXISTS properties (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT,
            address     TEXT,
            owner       TEXT,
            attributes  TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_properties_owner
            ON properties (owner);

        -- Attribute catalogue used to prompt the intent parser.
        CREATE TABLE IF NOT EXISTS property_attributes (
            internal_name   TEXT PRIMARY KEY NOT NULL,
            display_name    TEXT NOT NULL,
            position        INTEGER NOT NULL
        );

        INSERT OR IGNORE INTO property_attributes (internal_name, display_name, position) VALUES
            ('name', 'Name', 1),
            ('address', 'Address', 2),
            ('owner', 'Owner', 3),
            ('city', 'City', 4),
            ('state', 'State', 5),
            ('zip_code', 'ZIP Code', 6),
            ('property_type', 'Property Type', 7),
            ('bedrooms', 'Bedrooms', 8),
            ('bathrooms', 'Bathrooms', 9),
            ('square_feet', 'Square Feet', 10),
            ('year_built', 'Year Built', 11),
            ('price', 'Price', 12),
            ('amenities', 'Amenities', 13);

        -- Record migration.
        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| PropChatError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
