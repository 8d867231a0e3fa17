//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` against a [`Schema`] before any remote
//! call is made, producing diagnostics the orchestrator can show.
//!
//! # Example
//!
//! ```
//! use cloudflare_ip_prefix_provider::schema::{Attribute, Schema};
//! use cloudflare_ip_prefix_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("prefix_id", Attribute::required_string())
//!     .with_attribute(
//!         "advertisement",
//!         Attribute::optional_computed_string().with_allowed_values(["on", "off"]),
//!     );
//!
//! assert!(validate(&schema, &json!({"prefix_id": "abc", "advertisement": "on"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"prefix_id": "abc", "advertisement": "maybe"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("advertisement".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Diagnostic, DiagnosticSeverity, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - The value must be an object (null is accepted as "nothing declared")
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (provider sets these)
/// - Attribute types must match the schema
/// - Attributes with allowed values must hold one of them
/// - Attributes not in the schema are rejected
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return diagnostics,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        },
    };

    // Sort for stable diagnostic order
    let mut names: Vec<&String> = schema.attributes.keys().collect();
    names.sort();
    for name in names {
        let attr = &schema.attributes[name];
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }

    for key in obj.keys() {
        if key != "id" && !schema.attributes.contains_key(key) {
            diagnostics.push(
                Diagnostic::error(format!("Unsupported attribute '{}'", key))
                    .with_detail("This attribute is not defined in the schema")
                    .with_attribute(key.as_str()),
            );
        }
    }

    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
///
/// This is a convenience wrapper around [`validate`] that returns a Result.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
///
/// Use [`validate`] to get detailed error information.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => {
            if validate_attribute_type(attr.attr_type, v, path, diagnostics) {
                validate_allowed_values(attr, v, path, diagnostics);
            }
        },
    }
}

/// Returns whether the value had the right type.
fn validate_attribute_type(
    attr_type: AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let (ok, expected) = match attr_type {
        AttributeType::String => (value.is_string(), "string"),
        AttributeType::Bool => (value.is_boolean(), "bool"),
    };
    if !ok {
        diagnostics.push(type_error(path, expected, value));
    }
    ok
}

fn validate_allowed_values(
    attr: &Attribute,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (Some(allowed), Some(s)) = (&attr.allowed_values, value.as_str()) else {
        return;
    };

    if !allowed.iter().any(|candidate| candidate == s) {
        diagnostics.push(
            Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                .with_detail(format!(
                    "Expected one of [{}], got \"{}\"",
                    allowed.join(", "),
                    s
                ))
                .with_attribute(path),
        );
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!(
            "Expected {}, got {}",
            expected,
            value_type_name(got)
        )),
        attribute: Some(path.to_string()),
    }
}
