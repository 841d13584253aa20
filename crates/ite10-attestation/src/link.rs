//! in-toto link predicate v0.3.
//!
//! A link records what a single supply-chain step consumed (materials),
//! the command it ran, and side information (byproducts, environment).
//! The step's products are the enclosing statement's subjects.
//!
//! See: <https://github.com/in-toto/attestation/blob/main/spec/predicates/link.md>

use serde::{Deserialize, Serialize};

use crate::error::AttestationError;
use crate::statement::ResourceDescriptor;

/// The link predicate body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Step name.
    #[serde(default)]
    pub name: String,
    /// Command and arguments the step ran.
    #[serde(default)]
    pub command: Vec<String>,
    /// Artifacts the step consumed.
    #[serde(default)]
    pub materials: Vec<ResourceDescriptor>,
    /// Free-form results such as exit code or captured output.
    #[serde(default)]
    pub byproducts: serde_json::Map<String, serde_json::Value>,
    /// Environment the step ran in.
    #[serde(default)]
    pub environment: serde_json::Map<String, serde_json::Value>,
}

impl Link {
    /// The link v0.3 predicate type URI.
    pub const PREDICATE_TYPE: &str = "https://in-toto.io/attestation/link/v0.3";

    /// Decode a link from an untyped predicate.
    pub fn from_predicate(predicate: &serde_json::Value) -> Result<Self, AttestationError> {
        serde_json::from_value(predicate.clone()).map_err(|e| AttestationError::InvalidPredicate {
            predicate_type: Self::PREDICATE_TYPE.to_owned(),
            reason: e.to_string(),
        })
    }

    /// The command joined with single spaces.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_full_link() {
        let predicate = serde_json::json!({
            "name": "build",
            "command": ["make", "all"],
            "materials": [{ "name": "src/main.c", "digest": { "sha256": "aa" } }],
            "byproducts": { "exit-code": 0, "stdout": "ok" },
            "environment": { "CC": "gcc" }
        });
        let link = Link::from_predicate(&predicate).unwrap();
        assert_eq!(link.name, "build");
        assert_eq!(link.command_line(), "make all");
        assert_eq!(link.materials[0].name, "src/main.c");
        assert_eq!(link.byproducts["exit-code"], 0);
        assert_eq!(link.environment["CC"], "gcc");
    }

    #[test]
    fn missing_fields_default() {
        let link = Link::from_predicate(&serde_json::json!({ "name": "x" })).unwrap();
        assert!(link.command.is_empty());
        assert!(link.materials.is_empty());
        assert!(link.byproducts.is_empty());
    }

    #[test]
    fn wrong_shape_rejected() {
        let result = Link::from_predicate(&serde_json::json!({ "command": "make" }));
        assert!(matches!(
            result,
            Err(AttestationError::InvalidPredicate { .. })
        ));

        let result = Link::from_predicate(&serde_json::json!(["not", "an", "object"]));
        assert!(result.is_err());
    }
}
