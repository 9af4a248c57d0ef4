//! Reply text and markdown table formatting.
//!
//! Every function here is pure so identical inputs always produce
//! identical replies.

use propchat_core::types::{AggregationResult, PropertyRecord, SchemaAttribute};

/// Columns shown in the results table, in order.
const TABLE_HEADERS: [&str; 3] = ["Name", "Address", "Owner"];

/// Placeholder for a missing or empty field.
const EMPTY_CELL: &str = "-";

pub const NO_PROPERTY_MATCHES: &str = "I couldn't find any properties matching your query. Could you please rephrase? Or I can help you explore what properties are available.";

pub const NO_LOCATION_MATCHES: &str = "No properties found in that location. Would you like to see all available properties or search by a different location?";

/// Count summary for a property lookup.
pub fn lookup_summary(total: u64, returned: usize, page_size: u64) -> String {
    format!(
        "Found {} property/properties. Showing {} of {}.",
        total,
        shown(returned, page_size),
        total
    )
}

/// Count summary for a location filter.
pub fn location_summary(total: u64, returned: usize, page_size: u64) -> String {
    format!(
        "Found {} properties in that location. Showing {} of {}.",
        total,
        shown(returned, page_size),
        total
    )
}

/// Reply for an aggregation result.
pub fn aggregation_text(result: &AggregationResult, kind: &str) -> String {
    let name = result.name.as_deref().filter(|n| !n.is_empty());
    let ranked = name.is_some() || result.kind.as_deref() == Some("owner_with_most_properties");
    if ranked {
        format!(
            "{} has the most properties with {} properties.",
            name.unwrap_or(EMPTY_CELL),
            result.count
        )
    } else {
        format!("There are {} {}.", result.count, kind.replace('_', " "))
    }
}

/// Reply describing the attribute catalogue.
pub fn metadata_text(schema: &[SchemaAttribute]) -> String {
    let names: Vec<&str> = schema.iter().map(|a| a.display_name.as_str()).collect();
    format!(
        "I have information about {} property attributes including: {}. You can ask me about any property or get information like locations, owners, and amenities.",
        schema.len(),
        names.join(", ")
    )
}

/// Render records as a `| Name | Address | Owner |` markdown table.
///
/// Returns an empty string for no records.
pub fn format_properties_table(properties: &[PropertyRecord]) -> String {
    if properties.is_empty() {
        return String::new();
    }

    let mut table = format!("| {} |\n", TABLE_HEADERS.join(" | "));
    table.push_str(&format!(
        "| {} |\n",
        TABLE_HEADERS.map(|_| EMPTY_CELL).join(" | ")
    ));
    for property in properties {
        table.push_str(&format!(
            "| {} | {} | {} |\n",
            cell(property.name.as_deref()),
            cell(property.address.as_deref()),
            cell(property.owner.as_deref()),
        ));
    }
    table
}

/// Reply text followed by a blank line and the table, trimmed.
pub fn combine(response_text: &str, table: &str) -> String {
    format!("{}\n\n{}", response_text, table).trim().to_string()
}

fn shown(returned: usize, page_size: u64) -> u64 {
    (returned as u64).min(page_size)
}

fn cell(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => EMPTY_CELL,
    }
}
