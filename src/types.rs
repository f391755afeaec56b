//! Swagger 2.0 schema fragment accessors.
//!
//! Fragments stay as raw `serde_json::Value`s; these helpers read the few
//! keywords the expansion engine cares about.

use serde_json::{Map, Value};

/// Vendor extension naming the discriminator value of a variant schema.
pub const DISCRIMINATOR_VALUE_EXTENSION: &str = "x-ms-discriminator-value";

/// The `$ref` of a fragment, if any.
pub fn ref_of(schema: &Value) -> Option<&str> {
    schema.get("$ref").and_then(Value::as_str)
}

/// The single-schema `items` of an array fragment.
///
/// Tuple-style `items` (an array of schemas) is not followed.
pub fn items_of(schema: &Value) -> Option<&Value> {
    schema.get("items").filter(|items| items.is_object())
}

/// The `$ref` to follow when dereferencing a fragment in place: its own
/// `$ref`, or the `$ref` of its array item.
pub fn deref_target(schema: &Value) -> Option<&str> {
    ref_of(schema).or_else(|| items_of(schema).and_then(ref_of))
}

/// The schema whose members describe the fragment's children: the array
/// item for arrays, the fragment itself otherwise.
pub fn concrete(schema: &Value) -> &Value {
    items_of(schema).unwrap_or(schema)
}

/// Direct `properties` of the concrete schema.
pub fn properties_of(schema: &Value) -> Option<&Map<String, Value>> {
    concrete(schema).get("properties").and_then(Value::as_object)
}

/// `allOf` members of the concrete schema.
pub fn all_of(schema: &Value) -> &[Value] {
    concrete(schema)
        .get("allOf")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// The discriminator property name declared by the concrete schema.
pub fn discriminator_of(schema: &Value) -> Option<&str> {
    concrete(schema)
        .get("discriminator")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
}

/// Whether the fragment is a discriminator base (declares a discriminator).
pub fn is_discriminator_base(schema: &Value) -> bool {
    discriminator_of(schema).is_some()
}

/// `enum` values of a fragment.
pub fn enum_of(schema: &Value) -> Option<&[Value]> {
    schema
        .get("enum")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
}

/// The `definitions` table of a Swagger document.
pub fn definitions_of(doc: &Value) -> Option<&Map<String, Value>> {
    doc.get("definitions").and_then(Value::as_object)
}

/// Find the definition implementing discriminator value `variant`.
///
/// Matches on the vendor discriminator-value extension first, then falls
/// back to a definition named exactly `variant`.
pub fn find_variant_definition<'a>(doc: &'a Value, variant: &str) -> Option<(&'a str, &'a Value)> {
    let definitions = definitions_of(doc)?;
    definitions
        .iter()
        .find(|(_, def)| {
            def.get(DISCRIMINATOR_VALUE_EXTENSION).and_then(Value::as_str) == Some(variant)
        })
        .or_else(|| definitions.get_key_value(variant))
        .map(|(name, def)| (name.as_str(), def))
}

/// Returns the JSON type name for messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
