//! Property queries, aggregations and the attribute catalogue.
//!
//! Filters are matched in two passes: an exact, case-insensitive pass and,
//! when that finds nothing, a substring pass. Attributes other than
//! `name`, `address` and `owner` are read from the JSON `attributes` column.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::Row;
use tracing::{debug, info};

use propchat_core::error::PropChatError;
use propchat_core::services::{QueryExecutor, SchemaProvider};
use propchat_core::types::{AggregationResult, Filters, PropertyPage, PropertyRecord, SchemaAttribute};

use crate::db::Database;

/// Columns stored directly on the `properties` table.
const CORE_COLUMNS: &[&str] = &["name", "address", "owner"];

/// Pseudo-filter carrying the aggregation kind; never a property column.
const INFO_TYPE_FILTER: &str = "info_type";

/// Pseudo-filter matching any of address, city or state.
const LOCATION_FILTER: &str = "location";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MatchMode {
    Exact,
    Substring,
}

/// Repository for property records and their attribute catalogue.
pub struct PropertyRepository {
    db: Arc<Database>,
}

impl PropertyRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a property. `record.id` is ignored; the assigned id is returned.
    pub fn insert(&self, record: &PropertyRecord) -> Result<i64, PropChatError> {
        let attributes = serde_json::to_string(&record.attributes)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO properties (name, address, owner, attributes) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![record.name, record.address, record.owner, attributes],
            )
            .map_err(|e| PropChatError::Storage(format!("Failed to save property: {}", e)))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Import a JSON array of property objects in one transaction.
    ///
    /// Returns the number of records imported.
    pub fn import_json(&self, path: &Path) -> Result<usize, PropChatError> {
        let content = std::fs::read_to_string(path)?;
        let records: Vec<PropertyRecord> = serde_json::from_str(&content)?;

        let mut serialized = Vec::with_capacity(records.len());
        for record in &records {
            serialized.push(serde_json::to_string(&record.attributes)?);
        }

        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| PropChatError::Storage(e.to_string()))?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO properties (name, address, owner, attributes)
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .map_err(|e| PropChatError::Storage(e.to_string()))?;
                for (record, attributes) in records.iter().zip(&serialized) {
                    stmt.execute(rusqlite::params![
                        record.name,
                        record.address,
                        record.owner,
                        attributes
                    ])
                    .map_err(|e| PropChatError::Storage(format!("Failed to import property: {}", e)))?;
                }
            }
            tx.commit()
                .map_err(|e| PropChatError::Storage(e.to_string()))?;
            Ok(())
        })?;

        info!(count = records.len(), path = %path.display(), "Properties imported");
        Ok(records.len())
    }

    /// Register (or rename) a queryable attribute, appended after existing ones.
    pub fn upsert_attribute(&self, attribute: &SchemaAttribute) -> Result<(), PropChatError> {
        if !is_attribute_key(&attribute.internal_name) {
            return Err(PropChatError::Schema(format!(
                "Invalid attribute name: {}",
                attribute.internal_name
            )));
        }
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO property_attributes (internal_name, display_name, position)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(position), 0) + 1 FROM property_attributes))
                 ON CONFLICT(internal_name) DO UPDATE SET display_name = excluded.display_name",
                rusqlite::params![attribute.internal_name, attribute.display_name],
            )
            .map_err(|e| PropChatError::Schema(e.to_string()))?;
            Ok(())
        })
    }

    /// The attribute catalogue in display order.
    pub fn attributes(&self) -> Result<Vec<SchemaAttribute>, PropChatError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT internal_name, display_name FROM property_attributes ORDER BY position, internal_name",
                )
                .map_err(|e| PropChatError::Schema(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(SchemaAttribute {
                        internal_name: row.get(0)?,
                        display_name: row.get(1)?,
                    })
                })
                .map_err(|e| PropChatError::Schema(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| PropChatError::Schema(e.to_string()))
        })
    }

    /// Page through properties matching `filters`, falling back to substring
    /// matching when no property matches exactly.
    pub fn query(
        &self,
        filters: &Filters,
        offset: u64,
        limit: u64,
    ) -> Result<PropertyPage, PropChatError> {
        let known = self.attributes()?;
        let exact = self.query_with_mode(filters, &known, offset, limit, MatchMode::Exact)?;
        if exact.total > 0 || !has_usable_filters(filters, &known) {
            return Ok(exact);
        }

        debug!(?filters, "No exact matches, retrying with substring matching");
        self.query_with_mode(filters, &known, offset, limit, MatchMode::Substring)
    }

    /// Run an aggregation by kind.
    ///
    /// Supported kinds: `total_properties`, `total_owners`,
    /// `owner_with_most_properties` and `{attribute}_with_most_properties`.
    pub fn aggregate(&self, kind: &str) -> Result<Option<AggregationResult>, PropChatError> {
        match kind {
            "total_properties" => {
                let count = self.scalar("SELECT COUNT(*) FROM properties")?;
                Ok(Some(AggregationResult {
                    count,
                    name: None,
                    kind: Some(kind.to_string()),
                }))
            }
            "total_owners" | "unique_owners" => {
                let count = self.scalar(
                    "SELECT COUNT(DISTINCT owner) FROM properties
                     WHERE owner IS NOT NULL AND owner != ''",
                )?;
                Ok(Some(AggregationResult {
                    count,
                    name: None,
                    kind: Some(kind.to_string()),
                }))
            }
            _ => match kind.strip_suffix("_with_most_properties") {
                Some(attribute) => {
                    let known = self.attributes()?;
                    match column_expr(attribute, &known) {
                        Some(column) => self.top_group(&column, kind),
                        None => Ok(None),
                    }
                }
                None => {
                    debug!(kind, "Unsupported aggregation kind");
                    Ok(None)
                }
            },
        }
    }

    /// Total stored properties.
    pub fn count(&self) -> Result<u64, PropChatError> {
        self.scalar("SELECT COUNT(*) FROM properties")
    }

    // -- Private helpers --

    fn query_with_mode(
        &self,
        filters: &Filters,
        known: &[SchemaAttribute],
        offset: u64,
        limit: u64,
        mode: MatchMode,
    ) -> Result<PropertyPage, PropChatError> {
        let (where_clause, params) = build_where(filters, known, mode);

        self.db.with_conn(|conn| {
            let total: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM properties{}", where_clause),
                    rusqlite::params_from_iter(params.iter()),
                    |row| row.get(0),
                )
                .map_err(|e| PropChatError::Query(e.to_string()))?;

            let mut page_params = params.clone();
            page_params.push(Value::Integer(limit.min(i64::MAX as u64) as i64));
            page_params.push(Value::Integer(offset.min(i64::MAX as u64) as i64));

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT id, name, address, owner, attributes FROM properties{}
                     ORDER BY id ASC LIMIT ? OFFSET ?",
                    where_clause
                ))
                .map_err(|e| PropChatError::Query(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params_from_iter(page_params.iter()), |row| {
                    Ok(row_to_property(row))
                })
                .map_err(|e| PropChatError::Query(e.to_string()))?;

            let mut properties = Vec::new();
            for row in rows {
                let property = row.map_err(|e| PropChatError::Query(e.to_string()))??;
                properties.push(property);
            }

            Ok(PropertyPage {
                properties,
                total: total.max(0) as u64,
            })
        })
    }

    fn scalar(&self, sql: &str) -> Result<u64, PropChatError> {
        self.db.with_conn(|conn| {
            let value: i64 = conn
                .query_row(sql, [], |row| row.get(0))
                .map_err(|e| PropChatError::Query(e.to_string()))?;
            Ok(value.max(0) as u64)
        })
    }

    fn top_group(&self, column: &str, kind: &str) -> Result<Option<AggregationResult>, PropChatError> {
        let sql = format!(
            "SELECT CAST({col} AS TEXT) AS grp, COUNT(*) AS cnt FROM properties
             WHERE {col} IS NOT NULL AND CAST({col} AS TEXT) != ''
             GROUP BY grp ORDER BY cnt DESC, grp ASC LIMIT 1",
            col = column
        );
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| PropChatError::Query(e.to_string()))?;
            let mut rows = stmt
                .query([])
                .map_err(|e| PropChatError::Query(e.to_string()))?;
            match rows.next().map_err(|e| PropChatError::Query(e.to_string()))? {
                Some(row) => {
                    let name: String = row.get(0).map_err(|e| PropChatError::Query(e.to_string()))?;
                    let count: i64 = row.get(1).map_err(|e| PropChatError::Query(e.to_string()))?;
                    Ok(Some(AggregationResult {
                        count: count.max(0) as u64,
                        name: Some(name),
                        kind: Some(kind.to_string()),
                    }))
                }
                None => Ok(None),
            }
        })
    }
}

#[async_trait]
impl SchemaProvider for PropertyRepository {
    async fn schema(&self) -> Result<Vec<SchemaAttribute>, PropChatError> {
        self.attributes()
    }
}

#[async_trait]
impl QueryExecutor for PropertyRepository {
    async fn query_properties(
        &self,
        filters: &Filters,
        offset: u64,
        limit: u64,
    ) -> Result<PropertyPage, PropChatError> {
        self.query(filters, offset, limit)
    }

    async fn aggregate(&self, kind: &str) -> Result<Option<AggregationResult>, PropChatError> {
        PropertyRepository::aggregate(self, kind)
    }
}

// =============================================================================
// SQL building
// =============================================================================

/// Attribute keys are interpolated into JSON paths, so only plain
/// identifiers are accepted.
fn is_attribute_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// SQL expression for a schema attribute, `None` if unknown.
fn column_expr(key: &str, known: &[SchemaAttribute]) -> Option<String> {
    if CORE_COLUMNS.contains(&key) {
        return Some(key.to_string());
    }
    if is_attribute_key(key) && known.iter().any(|a| a.internal_name == key) {
        return Some(format!("json_extract(attributes, '$.{}')", key));
    }
    None
}

/// Columns a filter key matches against.
fn filter_columns(key: &str, known: &[SchemaAttribute]) -> Vec<String> {
    if let Some(column) = column_expr(key, known) {
        return vec![column];
    }
    if key == LOCATION_FILTER {
        return ["address", "city", "state"]
            .iter()
            .filter_map(|k| column_expr(k, known))
            .collect();
    }
    Vec::new()
}

fn has_usable_filters(filters: &Filters, known: &[SchemaAttribute]) -> bool {
    filters.iter().any(|(key, values)| {
        key != INFO_TYPE_FILTER
            && values.iter().any(|v| !v.trim().is_empty())
            && !filter_columns(key, known).is_empty()
    })
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Build ` WHERE ...` (or an empty string) plus its positional parameters.
///
/// Values within one filter are OR'ed; filters are AND'ed.
fn build_where(filters: &Filters, known: &[SchemaAttribute], mode: MatchMode) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for (key, values) in filters {
        if key == INFO_TYPE_FILTER {
            continue;
        }
        let columns = filter_columns(key, known);
        if columns.is_empty() {
            debug!(filter = %key, "Ignoring filter on unknown attribute");
            continue;
        }
        let values: Vec<&str> = values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            continue;
        }

        let mut alternatives = Vec::new();
        for column in &columns {
            for value in &values {
                match mode {
                    MatchMode::Exact => {
                        alternatives.push(format!("LOWER(CAST({} AS TEXT)) = LOWER(?)", column));
                        params.push(Value::Text(value.to_string()));
                    }
                    MatchMode::Substring => {
                        alternatives.push(format!("CAST({} AS TEXT) LIKE ? ESCAPE '\\'", column));
                        params.push(Value::Text(format!("%{}%", escape_like(value))));
                    }
                }
            }
        }
        clauses.push(format!("({})", alternatives.join(" OR ")));
    }

    if clauses.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), params)
    }
}

fn row_to_property(row: &Row<'_>) -> Result<PropertyRecord, PropChatError> {
    let query = |e: rusqlite::Error| PropChatError::Query(e.to_string());
    let attributes: String = row.get(4).map_err(query)?;
    let attributes = match serde_json::from_str::<serde_json::Value>(&attributes)? {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    Ok(PropertyRecord {
        id: row.get(0).map_err(query)?,
        name: row.get(1).map_err(query)?,
        address: row.get(2).map_err(query)?,
        owner: row.get(3).map_err(query)?,
        attributes,
    })
}
