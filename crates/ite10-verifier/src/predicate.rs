//! Normalization of attestation predicates.
//!
//! Every statement is reduced to materials, products, and a flat
//! string-to-string attribute map that rules are evaluated against. Only
//! string and integer values become attributes; other value types are
//! dropped.

use std::collections::BTreeMap;

use ite10_attestation::link::Link;
use ite10_attestation::{ResourceDescriptor, Statement};

use crate::error::VerificationError;

/// Materials, products, and attributes extracted from one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedPredicate {
    /// Artifacts consumed.
    pub materials: Vec<ResourceDescriptor>,
    /// Artifacts produced.
    pub products: Vec<ResourceDescriptor>,
    /// Scalar claims keyed by (possibly dotted) name.
    pub attributes: BTreeMap<String, String>,
}

/// Extract the normalized view of a statement.
///
/// For links, materials come from the predicate and products are the
/// statement's subjects. For every other predicate type the subjects are
/// the materials, there are no products, and top-level scalar predicate
/// fields become attributes.
pub fn extract(statement: &Statement) -> Result<NormalizedPredicate, VerificationError> {
    if statement.predicate_type == Link::PREDICATE_TYPE {
        return extract_link(statement);
    }

    let fields = match &statement.predicate {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => {
            return Ok(NormalizedPredicate {
                materials: statement.subject.clone(),
                ..Default::default()
            });
        }
        other => {
            return Err(VerificationError::DecodeError(format!(
                "predicate of type {} must be an object, found {}",
                statement.predicate_type,
                json_kind(other)
            )));
        }
    };

    let mut attributes = BTreeMap::new();
    flatten_scalars(fields, None, &mut attributes);

    Ok(NormalizedPredicate {
        materials: statement.subject.clone(),
        products: Vec::new(),
        attributes,
    })
}

fn extract_link(statement: &Statement) -> Result<NormalizedPredicate, VerificationError> {
    let link = Link::from_predicate(&statement.predicate)?;

    let mut attributes = BTreeMap::new();
    attributes.insert("name".to_owned(), link.name.clone());
    attributes.insert("command".to_owned(), link.command_line());
    flatten_scalars(&link.byproducts, Some("byproducts"), &mut attributes);
    flatten_scalars(&link.environment, Some("environment"), &mut attributes);

    Ok(NormalizedPredicate {
        materials: link.materials,
        products: statement.subject.clone(),
        attributes,
    })
}

fn flatten_scalars(
    fields: &serde_json::Map<String, serde_json::Value>,
    prefix: Option<&str>,
    out: &mut BTreeMap<String, String>,
) {
    for (name, value) in fields {
        let key = prefix.map_or_else(|| name.clone(), |p| format!("{p}.{name}"));
        match scalar_to_string(value) {
            Some(s) => {
                out.insert(key, s);
            }
            None => tracing::trace!(key, kind = json_kind(value), "dropping non-scalar attribute"),
        }
    }
}

/// Render strings and integers; everything else has no attribute form.
fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_statement(predicate: serde_json::Value) -> Statement {
        Statement::new(
            vec![ResourceDescriptor::new("app", "sha256", "ff")],
            Link::PREDICATE_TYPE,
            predicate,
        )
    }

    #[test]
    fn link_byproduct_exit_code_is_stringified() {
        let statement = link_statement(serde_json::json!({
            "name": "build",
            "command": ["gcc", "-o", "app", "main.c"],
            "byproducts": { "exit-code": 0 }
        }));
        let normalized = extract(&statement).unwrap();
        assert_eq!(normalized.attributes["byproducts.exit-code"], "0");
        assert_eq!(normalized.attributes["command"], "gcc -o app main.c");
        assert_eq!(normalized.attributes["name"], "build");
    }

    #[test]
    fn link_products_are_subjects_and_materials_from_predicate() {
        let statement = link_statement(serde_json::json!({
            "name": "build",
            "materials": [{ "name": "main.c", "digest": { "sha256": "aa" } }]
        }));
        let normalized = extract(&statement).unwrap();
        assert_eq!(normalized.materials.len(), 1);
        assert_eq!(normalized.materials[0].name, "main.c");
        assert_eq!(normalized.products, statement.subject);
    }

    #[test]
    fn link_drops_non_scalar_values() {
        let statement = link_statement(serde_json::json!({
            "name": "build",
            "byproducts": { "ok": true, "ratio": 0.5, "list": [1], "stderr": "" },
            "environment": { "PATH": "/usr/bin", "nested": { "a": 1 }, "UID": 1000 }
        }));
        let normalized = extract(&statement).unwrap();
        let a = &normalized.attributes;
        assert!(!a.contains_key("byproducts.ok"));
        assert!(!a.contains_key("byproducts.ratio"));
        assert!(!a.contains_key("byproducts.list"));
        assert!(!a.contains_key("environment.nested"));
        assert_eq!(a["byproducts.stderr"], "");
        assert_eq!(a["environment.PATH"], "/usr/bin");
        assert_eq!(a["environment.UID"], "1000");
    }

    #[test]
    fn link_with_wrong_shape_is_decode_error() {
        let statement = link_statement(serde_json::json!({ "command": 42 }));
        assert!(matches!(
            extract(&statement),
            Err(VerificationError::DecodeError(_))
        ));
    }

    #[test]
    fn generic_predicate_flattens_top_level_scalars() {
        let statement = Statement::new(
            vec![ResourceDescriptor::new("pkg", "sha256", "aa")],
            "https://slsa.dev/provenance/v1",
            serde_json::json!({
                "buildType": "https://example.com/make",
                "attempts": -2,
                "builder": { "id": "ci" },
                "reproducible": false
            }),
        );
        let normalized = extract(&statement).unwrap();
        assert_eq!(normalized.materials, statement.subject);
        assert!(normalized.products.is_empty());
        assert_eq!(normalized.attributes.len(), 2);
        assert_eq!(normalized.attributes["buildType"], "https://example.com/make");
        assert_eq!(normalized.attributes["attempts"], "-2");
    }

    #[test]
    fn generic_predicate_must_be_object() {
        let statement = Statement::new(vec![], "x", serde_json::json!([1, 2]));
        let err = extract(&statement).unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn absent_predicate_yields_no_attributes() {
        let statement = Statement::new(
            vec![ResourceDescriptor::new("pkg", "sha256", "aa")],
            "x",
            serde_json::Value::Null,
        );
        let normalized = extract(&statement).unwrap();
        assert!(normalized.attributes.is_empty());
        assert_eq!(normalized.materials.len(), 1);
    }
}
