//! Top-level verification orchestrator.
//!
//! The `Verifier` walks a layout in a fixed order (expiry, structure,
//! steps, subjects, inspections) and aborts on the first failing check.
//! Every check that passes is recorded in the `VerificationReport`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use ite10_attestation::{Envelope, Statement};
use serde::Serialize;

use crate::error::VerificationError;
use crate::inspection::{CommandRunner, InspectionRunner};
use crate::layout::{ExpectedStepPredicates, Layout, Step, Subject};
use crate::predicate::{self, NormalizedPredicate};
use crate::rule::{apply_artifact_rules, apply_attribute_rules};
use crate::signature;

/// A statement together with the envelope it arrived in, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    /// The decoded in-toto statement.
    pub statement: Statement,
    /// The signed envelope. `None` for bare statements, which have no signers.
    pub envelope: Option<Envelope>,
}

impl Attestation {
    /// Decode a DSSE envelope, keeping it for signature checks.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, VerificationError> {
        let statement = envelope.decode_statement()?;
        Ok(Self {
            statement,
            envelope: Some(envelope),
        })
    }

    /// Wrap a statement that carries no signatures.
    pub const fn from_statement(statement: Statement) -> Self {
        Self {
            statement,
            envelope: None,
        }
    }

    /// Parse JSON holding either a DSSE envelope or a bare statement.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, VerificationError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        if value.get("payloadType").is_some() {
            Self::from_envelope(serde_json::from_value(value)?)
        } else {
            Ok(Self::from_statement(serde_json::from_value(value)?))
        }
    }
}

/// Configuration for a verification run.
pub struct VerifyConfig {
    /// Clock override; the current time when `None`.
    pub now: Option<DateTime<Utc>>,
    /// Executes inspections.
    pub inspection_runner: Box<dyn InspectionRunner>,
    /// Enforce functionary signatures and thresholds.
    pub require_signatures: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            now: None,
            inspection_runner: Box::new(CommandRunner::default()),
            require_signatures: true,
        }
    }
}

/// Verification stage a check belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Layout expiry.
    Expiry,
    /// Layout structure.
    Layout,
    /// Step attestations.
    Step,
    /// Subject attestations.
    Subject,
    /// Inspections.
    Inspection,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Expiry => "expiry",
            Self::Layout => "layout",
            Self::Step => "step",
            Self::Subject => "subject",
            Self::Inspection => "inspection",
        })
    }
}

/// One passed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckRecord {
    /// Stage that ran the check.
    pub stage: Stage,
    /// What was checked.
    pub target: String,
    /// Human-readable outcome.
    pub detail: String,
}

/// Checks passed by a successful run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Passed checks.
    pub checks: Vec<CheckRecord>,
}

impl VerificationReport {
    fn pass(&mut self, stage: Stage, target: impl Into<String>, detail: impl Into<String>) {
        let record = CheckRecord {
            stage,
            target: target.into(),
            detail: detail.into(),
        };
        tracing::debug!(
            stage = %record.stage,
            scope = %record.target,
            detail = %record.detail,
            "check passed"
        );
        self.checks.push(record);
    }
}

/// Orchestrates all verification stages.
pub struct Verifier {
    config: VerifyConfig,
}

impl Verifier {
    /// Create a new verifier with the given configuration.
    pub const fn new(config: VerifyConfig) -> Self {
        Self { config }
    }

    /// Verify `attestations` (keyed by step name or origin) against `layout`.
    ///
    /// Returns the first failure encountered.
    pub fn verify(
        &self,
        layout: &Layout,
        attestations: &BTreeMap<String, Attestation>,
    ) -> Result<VerificationReport, VerificationError> {
        let mut report = VerificationReport::default();
        let now = self.config.now.unwrap_or_else(Utc::now);

        if !self.config.require_signatures {
            tracing::warn!("functionary signature checks are disabled");
        }

        if layout.is_expired(now) {
            return Err(VerificationError::LayoutExpired {
                expires: layout.expires.to_rfc3339(),
            });
        }
        report.pass(
            Stage::Expiry,
            "layout",
            format!("valid until {}", layout.expires.to_rfc3339()),
        );

        layout.validate()?;
        report.pass(
            Stage::Layout,
            "layout",
            format!(
                "{} step(s), {} subject(s), {} inspection(s)",
                layout.steps.len(),
                layout.subjects.len(),
                layout.inspections.len()
            ),
        );

        tracing::info!(steps = layout.steps.len(), "verifying steps");
        for step in &layout.steps {
            self.verify_step(layout, step, attestations, &mut report)?;
        }

        tracing::info!(subjects = layout.subjects.len(), "verifying subjects");
        for subject in &layout.subjects {
            self.verify_subject(layout, subject, attestations, &mut report)?;
        }

        tracing::info!(inspections = layout.inspections.len(), "running inspections");
        for inspection in &layout.inspections {
            let target = format!("inspection {}", inspection.name);
            let wrap = |e: VerificationError| match e {
                e @ VerificationError::InspectionFailed { .. } => e,
                other => VerificationError::InspectionFailed {
                    inspection: inspection.name.clone(),
                    reason: other.to_string(),
                },
            };
            let result = self.config.inspection_runner.run(inspection).map_err(wrap)?;
            apply_all_rules(
                &result,
                &inspection.expected_materials,
                &inspection.expected_products,
                &inspection.expected_attributes,
                &target,
            )
            .map_err(wrap)?;
            report.pass(Stage::Inspection, target, "command succeeded and rules hold");
        }

        Ok(report)
    }

    fn verify_step(
        &self,
        layout: &Layout,
        step: &Step,
        attestations: &BTreeMap<String, Attestation>,
        report: &mut VerificationReport,
    ) -> Result<(), VerificationError> {
        let target = format!("step {}", step.name);
        let attestation =
            attestations
                .get(&step.name)
                .ok_or_else(|| VerificationError::MissingStepAttestation {
                    step: step.name.clone(),
                })?;
        let normalized = predicate::extract(&attestation.statement)?;

        for block in &step.expected_predicates {
            let expected = expected_step_type(step, block)?;
            let actual = &attestation.statement.predicate_type;
            if actual != expected {
                return Err(VerificationError::PredicateTypeMismatch {
                    step: step.name.clone(),
                    expected: expected.to_owned(),
                    actual: actual.clone(),
                });
            }

            if let Some(found) =
                self.signers(layout, attestation, &block.functionaries, block.threshold)?
            {
                let required = block.threshold.max(1);
                if found < required {
                    return Err(VerificationError::ThresholdNotMet {
                        target,
                        required,
                        found,
                    });
                }
            }

            apply_all_rules(
                &normalized,
                &block.expected_materials,
                &block.expected_products,
                &block.expected_attributes,
                &target,
            )?;
        }

        let detail = match &attestation.envelope {
            Some(envelope) => {
                let digest = envelope.payload_digest()?;
                tracing::debug!(step = %step.name, payload = %digest, "step attestation accepted");
                format!(
                    "attestation {} (payload sha256:{digest})",
                    attestation.statement.predicate_type
                )
            }
            None => format!("attestation {}", attestation.statement.predicate_type),
        };
        report.pass(Stage::Step, target, detail);
        Ok(())
    }

    fn verify_subject(
        &self,
        layout: &Layout,
        subject: &Subject,
        attestations: &BTreeMap<String, Attestation>,
        report: &mut VerificationReport,
    ) -> Result<(), VerificationError> {
        let target = format!("subject {}", subject.subject.join(", "));
        let about: Vec<&Attestation> = attestations
            .values()
            .filter(|a| a.statement.has_subject_matching(&subject.subject))
            .collect();

        for block in &subject.expected_predicates {
            let typed: Vec<&Attestation> = about
                .iter()
                .copied()
                .filter(|a| block.predicate_types.contains(&a.statement.predicate_type))
                .collect();
            if typed.is_empty() {
                return Err(VerificationError::NoMatchingAttestation {
                    predicate_types: block.predicate_types.join(", "),
                    subject: subject.subject.join(", "),
                });
            }

            let mut qualified = Vec::with_capacity(typed.len());
            let mut best = 0;
            let required = block.threshold.max(1);
            for attestation in typed {
                match self.signers(layout, attestation, &block.functionaries, block.threshold)? {
                    Some(found) if found < required => best = best.max(found),
                    _ => qualified.push(attestation),
                }
            }
            if qualified.is_empty() {
                return Err(VerificationError::ThresholdNotMet {
                    target,
                    required,
                    found: best,
                });
            }

            for attestation in &qualified {
                let normalized = predicate::extract(&attestation.statement)?;
                apply_attribute_rules(&normalized.attributes, &block.expected_attributes, &target)?;
            }
            report.pass(
                Stage::Subject,
                target.as_str(),
                format!(
                    "{} attestation(s) satisfy {}",
                    qualified.len(),
                    block.predicate_types.join(", ")
                ),
            );
        }
        Ok(())
    }

    /// Distinct listed functionaries that signed `attestation`, or `None`
    /// when the block is not signature-checked.
    fn signers(
        &self,
        layout: &Layout,
        attestation: &Attestation,
        functionaries: &[String],
        threshold: usize,
    ) -> Result<Option<usize>, VerificationError> {
        if !self.config.require_signatures || functionaries.is_empty() {
            return Ok(None);
        }
        if attestation.envelope.is_none() {
            tracing::warn!(
                predicate_type = %attestation.statement.predicate_type,
                threshold,
                "attestation carries no envelope, counting zero signers"
            );
        }
        let signers = signature::verified_signers(
            attestation.envelope.as_ref(),
            &layout.functionaries,
            functionaries,
        )?;
        Ok(Some(signers.len()))
    }
}

/// Only the first declared predicate type of a step block is compared.
fn expected_step_type<'a>(
    step: &Step,
    block: &'a ExpectedStepPredicates,
) -> Result<&'a str, VerificationError> {
    block
        .predicate_types
        .first()
        .map(String::as_str)
        .ok_or_else(|| {
            VerificationError::InvalidLayout(format!(
                "step {} has an expectation without predicate types",
                step.name
            ))
        })
}

fn apply_all_rules(
    normalized: &NormalizedPredicate,
    materials: &[String],
    products: &[String],
    attributes: &[String],
    target: &str,
) -> Result<(), VerificationError> {
    apply_artifact_rules(&normalized.materials, materials, target)?;
    apply_artifact_rules(&normalized.products, products, target)?;
    apply_attribute_rules(&normalized.attributes, attributes, target)
}
