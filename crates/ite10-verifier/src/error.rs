//! Error types for the verification subsystem.

use ite10_attestation::AttestationError;

/// Errors from layout verification.
///
/// Every variant is terminal for a verification run: the first one
/// encountered aborts the run and is surfaced verbatim.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// The layout's `expires` timestamp is in the past.
    #[error("layout expired at {expires}")]
    LayoutExpired {
        /// The layout's expiry, RFC 3339.
        expires: String,
    },

    /// Steps, subjects, and inspections are all empty.
    #[error("empty layout, one of steps, subjects, and inspections must be specified")]
    EmptyLayout,

    /// No attestation was supplied for a step.
    #[error("no attestation found for step {step}")]
    MissingStepAttestation {
        /// The step name.
        step: String,
    },

    /// The attestation's predicate type differs from the expected one.
    #[error("expected predicate of type {expected} for step {step}, received {actual} instead")]
    PredicateTypeMismatch {
        /// The step name.
        step: String,
        /// The first predicate type of the expectation block.
        expected: String,
        /// The attestation's declared predicate type.
        actual: String,
    },

    /// A rule evaluated to false.
    #[error("verification failed for rule `{rule}` on {target}")]
    RuleViolation {
        /// The offending rule, as written in the layout.
        rule: String,
        /// What the rule was applied to (step, subject, or inspection).
        target: String,
    },

    /// No attestation for a subject block matched its predicate types.
    #[error("no attestation found for predicate {predicate_types} for subject {subject}")]
    NoMatchingAttestation {
        /// Comma-joined predicate types of the block.
        predicate_types: String,
        /// Comma-joined subject patterns of the block.
        subject: String,
    },

    /// Too few distinct functionaries signed a qualifying attestation.
    #[error("{target} requires {required} functionary signature(s), found {found}")]
    ThresholdNotMet {
        /// What was being verified.
        target: String,
        /// Effective threshold.
        required: usize,
        /// Distinct qualifying functionaries found.
        found: usize,
    },

    /// An inspection could not run or its result violated a rule.
    #[error("inspection {inspection} failed: {reason}")]
    InspectionFailed {
        /// Inspection name.
        inspection: String,
        /// Why it failed.
        reason: String,
    },

    /// A rule string does not follow the grammar.
    #[error("invalid rule `{rule}`: {reason}")]
    MalformedRule {
        /// The rule as written.
        rule: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The rule refers to a claim the attestation does not make.
    #[error("no claim available for rule `{rule}`")]
    MissingAttribute {
        /// The rule as written.
        rule: String,
    },

    /// An attestation or layout document could not be decoded.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// The layout violates a structural invariant.
    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    /// A functionary key could not be used.
    #[error("invalid key for functionary {functionary}: {reason}")]
    InvalidKey {
        /// Functionary name.
        functionary: String,
        /// What is wrong with the key.
        reason: String,
    },

    /// I/O error while loading verification inputs.
    #[error("verification I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<AttestationError> for VerificationError {
    fn from(value: AttestationError) -> Self {
        Self::DecodeError(value.to_string())
    }
}

impl From<serde_json::Error> for VerificationError {
    fn from(value: serde_json::Error) -> Self {
        Self::DecodeError(value.to_string())
    }
}
