//! The layout: a declarative supply-chain policy.
//!
//! A layout names the functionaries allowed to attest, the steps that
//! must have been performed, the subjects whose attestations must satisfy
//! extra constraints, and the inspections the verifier runs itself.
//! Layouts are loaded once, validated, and never mutated during a run.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VerificationError;
use crate::rule::Rule;

/// Root policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    /// Instant after which the layout is no longer valid.
    pub expires: DateTime<Utc>,
    /// Identities allowed to attest, keyed by symbolic name.
    #[serde(default)]
    pub functionaries: BTreeMap<String, Functionary>,
    /// Pipeline stages, verified in order.
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Subject-level constraints.
    #[serde(default)]
    pub subjects: Vec<Subject>,
    /// Checks executed by the verifier.
    #[serde(default)]
    pub inspections: Vec<Inspection>,
}

/// An identity permitted to produce attestations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Functionary {
    /// Key family, e.g. `ecdsa` or `ed25519`.
    #[serde(rename = "type")]
    pub key_type: String,
    /// Signature scheme, e.g. `ecdsa-sha2-nistp256`.
    #[serde(default)]
    pub scheme: String,
    /// Public key material (PEM SPKI, or hex for raw Ed25519 keys).
    pub public_key: String,
}

/// A named pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Step name; also the key of its attestation.
    pub name: String,
    /// The command the step is expected to run.
    #[serde(default)]
    pub command: String,
    /// Expectations on the step's attestation.
    #[serde(default)]
    pub expected_predicates: Vec<ExpectedStepPredicates>,
}

/// Expectations on a step attestation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedStepPredicates {
    /// Accepted predicate types. Only the first one is compared.
    #[serde(default)]
    pub predicate_types: Vec<String>,
    /// Rules over the step's materials.
    #[serde(default)]
    pub expected_materials: Vec<String>,
    /// Rules over the step's products.
    #[serde(default)]
    pub expected_products: Vec<String>,
    /// Rules over the step's attributes.
    #[serde(default)]
    pub expected_attributes: Vec<String>,
    /// Functionaries allowed to sign the attestation.
    #[serde(default)]
    pub functionaries: Vec<String>,
    /// Minimum number of distinct signing functionaries.
    #[serde(default)]
    pub threshold: usize,
}

/// Constraints on every attestation about a set of subjects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Subject name patterns (globs).
    pub subject: Vec<String>,
    /// Expectations on matching attestations.
    #[serde(default)]
    pub expected_predicates: Vec<ExpectedSubjectPredicates>,
}

/// Expectations on attestations about a subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedSubjectPredicates {
    /// Accepted predicate types.
    #[serde(default)]
    pub predicate_types: Vec<String>,
    /// Rules over each matching attestation's attributes.
    #[serde(default)]
    pub expected_attributes: Vec<String>,
    /// Functionaries allowed to sign a matching attestation.
    #[serde(default)]
    pub functionaries: Vec<String>,
    /// Minimum number of distinct signing functionaries.
    #[serde(default)]
    pub threshold: usize,
}

/// A check the verifier runs locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    /// Inspection name.
    pub name: String,
    /// Command line to execute.
    pub command: String,
    /// Accepted predicate types of the result.
    #[serde(default)]
    pub predicates: Vec<String>,
    /// Rules over the inspection's materials.
    #[serde(default)]
    pub expected_materials: Vec<String>,
    /// Rules over the inspection's products.
    #[serde(default)]
    pub expected_products: Vec<String>,
    /// Rules over the inspection's attributes.
    #[serde(default)]
    pub expected_attributes: Vec<String>,
}

impl Layout {
    /// Parse a layout from JSON or YAML bytes.
    ///
    /// JSON is tried first; anything it rejects is retried as YAML.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, VerificationError> {
        match serde_json::from_slice(bytes) {
            Ok(layout) => Ok(layout),
            Err(json_err) => serde_yaml::from_slice(bytes).map_err(|yaml_err| {
                tracing::debug!(%json_err, "layout is not JSON");
                VerificationError::DecodeError(format!("invalid layout document: {yaml_err}"))
            }),
        }
    }

    /// Load a layout from a file.
    pub fn from_file(path: &Path) -> Result<Self, VerificationError> {
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
    }

    /// Whether the layout declares no steps, subjects, or inspections.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.subjects.is_empty() && self.inspections.is_empty()
    }

    /// True iff `now` is strictly after the expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires
    }

    /// Check the structural invariants that do not depend on attestations.
    pub fn validate(&self) -> Result<(), VerificationError> {
        if self.is_empty() {
            return Err(VerificationError::EmptyLayout);
        }

        for step in &self.steps {
            let scope = format!("step {}", step.name);
            for block in &step.expected_predicates {
                if block.predicate_types.is_empty() {
                    return Err(VerificationError::InvalidLayout(format!(
                        "{scope} has an expectation without predicate types"
                    )));
                }
                self.check_functionaries(&scope, &block.functionaries, block.threshold)?;
                check_rules(&block.expected_materials)?;
                check_rules(&block.expected_products)?;
                check_rules(&block.expected_attributes)?;
            }
        }

        for subject in &self.subjects {
            let scope = format!("subject {}", subject.subject.join(", "));
            if subject.subject.is_empty() {
                return Err(VerificationError::InvalidLayout(
                    "subject block without patterns".to_owned(),
                ));
            }
            for block in &subject.expected_predicates {
                self.check_functionaries(&scope, &block.functionaries, block.threshold)?;
                check_rules(&block.expected_attributes)?;
            }
        }

        for inspection in &self.inspections {
            if inspection.command.trim().is_empty() {
                return Err(VerificationError::InvalidLayout(format!(
                    "inspection {} has no command",
                    inspection.name
                )));
            }
            check_rules(&inspection.expected_materials)?;
            check_rules(&inspection.expected_products)?;
            check_rules(&inspection.expected_attributes)?;
        }

        Ok(())
    }

    fn check_functionaries(
        &self,
        scope: &str,
        names: &[String],
        threshold: usize,
    ) -> Result<(), VerificationError> {
        if let Some(unknown) = names.iter().find(|n| !self.functionaries.contains_key(*n)) {
            return Err(VerificationError::InvalidLayout(format!(
                "{scope} references unknown functionary {unknown}"
            )));
        }
        if threshold > names.len() {
            return Err(VerificationError::InvalidLayout(format!(
                "{scope} requires {threshold} signature(s) but lists {} functionary(ies)",
                names.len()
            )));
        }
        Ok(())
    }
}

fn check_rules(rules: &[String]) -> Result<(), VerificationError> {
    rules.iter().try_for_each(|r| r.parse::<Rule>().map(drop))
}
