//! in-toto attestation types for ITE-10 layout verification.
//!
//! `ite10-attestation` models in-toto v1 statements and resource
//! descriptors, unwraps DSSE envelopes, decodes the in-toto link predicate,
//! and provides a local signer for producing envelopes.

pub mod envelope;
pub mod error;
pub mod link;
pub mod signer;
pub mod statement;

pub use envelope::Envelope;
pub use error::AttestationError;
pub use statement::{ResourceDescriptor, Statement};
