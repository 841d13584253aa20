//! in-toto v1 attestation statement.
//!
//! See: <https://github.com/in-toto/attestation/blob/main/spec/v1/statement.md>

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An in-toto v1 attestation statement, already unwrapped from its envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Normally [`Statement::TYPE`].
    #[serde(rename = "_type", default = "Statement::default_type")]
    pub statement_type: String,
    /// Artifacts the statement is about.
    #[serde(default)]
    pub subject: Vec<ResourceDescriptor>,
    /// URI identifying the predicate schema.
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
    /// The untyped predicate payload.
    #[serde(default)]
    pub predicate: serde_json::Value,
}

impl Statement {
    /// The canonical statement type URI.
    pub const TYPE: &str = "https://in-toto.io/Statement/v1";

    fn default_type() -> String {
        Self::TYPE.to_owned()
    }

    /// Build a statement with the canonical `_type`.
    pub fn new(
        subject: Vec<ResourceDescriptor>,
        predicate_type: impl Into<String>,
        predicate: serde_json::Value,
    ) -> Self {
        Self {
            statement_type: Self::TYPE.to_owned(),
            subject,
            predicate_type: predicate_type.into(),
            predicate,
        }
    }

    /// Whether any subject name matches one of the given glob patterns.
    pub fn has_subject_matching<S: AsRef<str>>(&self, patterns: &[S]) -> bool {
        self.subject
            .iter()
            .any(|s| patterns.iter().any(|p| s.name_matches(p.as_ref())))
    }
}

/// A name plus digest set identifying an artifact.
///
/// Used both as statement subjects and as link materials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Artifact path or name.
    #[serde(default)]
    pub name: String,
    /// Optional URI locating the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Algorithm name to hex digest.
    #[serde(default)]
    pub digest: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    /// Descriptor with a single digest entry.
    pub fn new(name: impl Into<String>, algorithm: &str, value: &str) -> Self {
        let mut digest = BTreeMap::new();
        digest.insert(algorithm.to_owned(), value.to_owned());
        Self {
            name: name.into(),
            uri: None,
            digest,
        }
    }

    /// Whether `name` matches a glob pattern.
    ///
    /// A pattern that does not compile as a glob is compared literally.
    pub fn name_matches(&self, pattern: &str) -> bool {
        glob::Pattern::new(pattern).map_or_else(|_| self.name == pattern, |p| p.matches(&self.name))
    }

    /// Digests rendered as `<algorithm>:<value>`, in algorithm order.
    pub fn qualified_digests(&self) -> impl Iterator<Item = String> + '_ {
        self.digest.iter().map(|(alg, value)| format!("{alg}:{value}"))
    }

    /// Whether any digest renders as `expected`.
    pub fn has_digest(&self, expected: &str) -> bool {
        self.qualified_digests().any(|d| d == expected)
    }
}
