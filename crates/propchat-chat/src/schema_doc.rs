//! Schema description handed to the intent parser.

use propchat_core::types::SchemaAttribute;

/// Render the attribute catalogue as the plain-text document embedded in
/// the intent parser's prompt.
pub fn render_schema_doc(schema: &[SchemaAttribute]) -> String {
    let mut doc = String::from("Property attributes (internal_name: Display Name):\n");
    for attribute in schema {
        doc.push_str(&format!(
            "- {}: {}\n",
            attribute.internal_name, attribute.display_name
        ));
    }
    doc.push_str(
        "\nFilter keys must be internal names. Use \"location\" to match address, city or state. \
         For aggregation, put the kind in \"info_type\": total_properties, total_owners, \
         owner_with_most_properties or <attribute>_with_most_properties.",
    );
    doc
}
