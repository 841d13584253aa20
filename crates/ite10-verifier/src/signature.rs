//! Functionary signature verification for DSSE envelopes.
//!
//! Each functionary's public key is checked against the envelope's
//! signatures over the DSSE pre-authentication encoding. The result is the
//! set of distinct functionaries that produced at least one valid
//! signature, which the orchestrator compares with a threshold.
//!
//! Supported keys:
//! - **ECDSA P-256** (`ecdsa`, `ecdsa-sha2-nistp256`): PEM SPKI.
//! - **Ed25519** (`ed25519`): 32-byte hex raw key, or PEM SPKI.

use std::collections::{BTreeMap, BTreeSet};

use aws_lc_rs::signature::{ECDSA_P256_SHA256_ASN1, ED25519, UnparsedPublicKey};
use base64::Engine;
use ite10_attestation::Envelope;
use ite10_attestation::envelope::EnvelopeSignature;
use ite10_attestation::signer::{key_id, pem_to_der};

use crate::error::VerificationError;
use crate::layout::Functionary;

/// `SubjectPublicKeyInfo` prefix for an uncompressed P-256 point.
const P256_SPKI_HEADER: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08,
    0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];

/// `SubjectPublicKeyInfo` prefix for an Ed25519 key.
const ED25519_SPKI_HEADER: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

const ED25519_KEY_LEN: usize = 32;

/// A functionary key decoded into raw verification material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionaryKey {
    /// Uncompressed P-256 point.
    EcdsaP256(Vec<u8>),
    /// Raw Ed25519 public key.
    Ed25519(Vec<u8>),
}

impl FunctionaryKey {
    /// Decode the key declared by functionary `name`.
    pub fn from_functionary(name: &str, functionary: &Functionary) -> Result<Self, VerificationError> {
        let invalid = |reason: String| VerificationError::InvalidKey {
            functionary: name.to_owned(),
            reason,
        };

        match (
            functionary.key_type.to_lowercase().as_str(),
            functionary.scheme.to_lowercase().as_str(),
        ) {
            ("ecdsa" | "ecdsa-sha2-nistp256", "" | "ecdsa-sha2-nistp256") => {
                let der = pem_to_der(&functionary.public_key)
                    .ok_or_else(|| invalid("ECDSA key is not PEM".to_owned()))?;
                let point = der
                    .strip_prefix(&P256_SPKI_HEADER[..])
                    .ok_or_else(|| invalid("not a P-256 SubjectPublicKeyInfo".to_owned()))?;
                Ok(Self::EcdsaP256(point.to_vec()))
            }
            ("ed25519", "" | "ed25519") => {
                let raw = if functionary.public_key.contains("-----BEGIN ") {
                    let der = pem_to_der(&functionary.public_key)
                        .ok_or_else(|| invalid("malformed PEM".to_owned()))?;
                    der.strip_prefix(&ED25519_SPKI_HEADER[..])
                        .ok_or_else(|| invalid("not an Ed25519 SubjectPublicKeyInfo".to_owned()))?
                        .to_vec()
                } else {
                    hex::decode(functionary.public_key.trim())
                        .map_err(|e| invalid(format!("invalid hex key: {e}")))?
                };
                if raw.len() != ED25519_KEY_LEN {
                    return Err(invalid(format!(
                        "Ed25519 key must be {ED25519_KEY_LEN} bytes, got {}",
                        raw.len()
                    )));
                }
                Ok(Self::Ed25519(raw))
            }
            (key_type, scheme) => Err(invalid(format!(
                "unsupported key type {key_type:?} with scheme {scheme:?}"
            ))),
        }
    }

    /// Check one base64 signature over `message`.
    pub fn verifies(&self, message: &[u8], signature_b64: &str) -> bool {
        let Ok(sig) = base64::engine::general_purpose::STANDARD.decode(signature_b64.trim()) else {
            return false;
        };
        match self {
            Self::EcdsaP256(point) => UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, point)
                .verify(message, &sig)
                .is_ok(),
            Self::Ed25519(raw) => UnparsedPublicKey::new(&ED25519, raw)
                .verify(message, &sig)
                .is_ok(),
        }
    }
}

/// Names of the `allowed` functionaries that validly signed `envelope`.
///
/// A missing envelope has no signers. A signature with a non-empty key id
/// is only tried against the functionary whose key id matches it. Each key
/// counts once: names sharing a key with an already counted signer are
/// left out.
pub fn verified_signers(
    envelope: Option<&Envelope>,
    functionaries: &BTreeMap<String, Functionary>,
    allowed: &[String],
) -> Result<BTreeSet<String>, VerificationError> {
    let mut signers = BTreeSet::new();
    let Some(envelope) = envelope else {
        return Ok(signers);
    };
    if envelope.signatures.is_empty() {
        return Ok(signers);
    }

    let message = envelope.pae()?;
    let mut counted_keys: Vec<FunctionaryKey> = Vec::new();

    for name in allowed {
        let functionary =
            functionaries
                .get(name)
                .ok_or_else(|| VerificationError::InvalidKey {
                    functionary: name.clone(),
                    reason: "not declared in layout".to_owned(),
                })?;
        let key = FunctionaryKey::from_functionary(name, functionary)?;
        let id = key_id(&functionary.public_key);
        if counted_keys.contains(&key) {
            tracing::warn!(functionary = %name, keyid = %id, "key already counted under another name");
            continue;
        }

        if envelope
            .signatures
            .iter()
            .filter(|s| addressed_to(s, &id))
            .any(|s| key.verifies(&message, &s.sig))
        {
            tracing::debug!(functionary = %name, keyid = %id, "signature verified");
            signers.insert(name.clone());
            counted_keys.push(key);
        }
    }

    Ok(signers)
}

fn addressed_to(signature: &EnvelopeSignature, key_id: &str) -> bool {
    signature.keyid.is_empty() || signature.keyid == key_id
}
