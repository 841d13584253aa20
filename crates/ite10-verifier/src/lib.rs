//! Layout verification for in-toto attestations.
//!
//! `ite10-verifier` evaluates a layout (a declarative supply-chain policy)
//! against a set of attestations and decides pass or fail.
//!
//! The verification pipeline runs these stages in order, stopping at the
//! first failure:
//! 1. **Expiry**: the layout must not have expired
//! 2. **Layout**: the layout must be non-empty and structurally valid
//! 3. **Steps**: each step's attestation must have the expected predicate
//!    type, enough functionary signatures, and satisfy its rules
//! 4. **Subjects**: attestations about matching subjects must satisfy
//!    their predicate expectations
//! 5. **Inspections**: locally executed checks must succeed and satisfy
//!    their rules

pub mod error;
pub mod inspection;
pub mod layout;
pub mod params;
pub mod predicate;
pub mod rule;
pub mod signature;
pub mod verify;

// Re-export primary types for convenience.
pub use error::VerificationError;
pub use layout::Layout;
pub use verify::{Attestation, CheckRecord, Stage, VerificationReport, Verifier, VerifyConfig};
