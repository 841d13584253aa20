//! Local DSSE signing for in-toto statements.
//!
//! Supports ECDSA P-256 and Ed25519 keys via `aws-lc-rs`. The verifier
//! only consumes signatures; this signer exists so functionaries (and
//! fixtures) can produce envelopes the verifier accepts.

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{
    ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, Ed25519KeyPair, KeyPair,
};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::envelope::{Envelope, EnvelopeSignature, pae};
use crate::error::AttestationError;
use crate::statement::Statement;

enum SigningKey {
    EcdsaP256(EcdsaKeyPair),
    Ed25519(Ed25519KeyPair),
}

/// Signs statements into DSSE envelopes with a single key.
pub struct EnvelopeSigner {
    key: SigningKey,
    rng: SystemRandom,
}

impl EnvelopeSigner {
    /// Generate a fresh ECDSA P-256 key.
    pub fn generate_ecdsa() -> Result<Self, AttestationError> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|e| AttestationError::KeyError(format!("failed to generate key: {e}")))?;
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref())
            .map_err(|e| AttestationError::KeyError(format!("failed to load generated key: {e}")))?;
        Ok(Self {
            key: SigningKey::EcdsaP256(key_pair),
            rng,
        })
    }

    /// Generate a fresh Ed25519 key.
    pub fn generate_ed25519() -> Result<Self, AttestationError> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|e| AttestationError::KeyError(format!("failed to generate key: {e}")))?;
        let key_pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
            .map_err(|e| AttestationError::KeyError(format!("failed to load generated key: {e}")))?;
        Ok(Self {
            key: SigningKey::Ed25519(key_pair),
            rng,
        })
    }

    /// Functionary `type` for this key.
    pub const fn key_type(&self) -> &'static str {
        match self.key {
            SigningKey::EcdsaP256(_) => "ecdsa",
            SigningKey::Ed25519(_) => "ed25519",
        }
    }

    /// Functionary `scheme` for this key.
    pub const fn scheme(&self) -> &'static str {
        match self.key {
            SigningKey::EcdsaP256(_) => "ecdsa-sha2-nistp256",
            SigningKey::Ed25519(_) => "ed25519",
        }
    }

    /// Public key as it appears in a layout: PEM SPKI for ECDSA, hex for Ed25519.
    pub fn public_key(&self) -> String {
        match &self.key {
            SigningKey::EcdsaP256(kp) => {
                der_to_pem(&encode_p256_spki(kp.public_key().as_ref()), "PUBLIC KEY")
            }
            SigningKey::Ed25519(kp) => hex::encode(kp.public_key().as_ref()),
        }
    }

    /// Key id placed in envelope signatures.
    pub fn key_id(&self) -> String {
        key_id(&self.public_key())
    }

    /// Sign `payload` under DSSE v1.
    pub fn sign_payload(
        &self,
        payload_type: &str,
        payload: &[u8],
    ) -> Result<EnvelopeSignature, AttestationError> {
        let message = pae(payload_type, payload);
        let sig_bytes = match &self.key {
            SigningKey::EcdsaP256(kp) => kp
                .sign(&self.rng, &message)
                .map_err(|e| AttestationError::SigningFailed(format!("ECDSA sign failed: {e}")))?
                .as_ref()
                .to_vec(),
            SigningKey::Ed25519(kp) => kp.sign(&message).as_ref().to_vec(),
        };
        Ok(EnvelopeSignature {
            keyid: self.key_id(),
            sig: base64::engine::general_purpose::STANDARD.encode(sig_bytes),
        })
    }

    /// Serialize and sign a statement into a new envelope.
    pub fn sign_statement(&self, statement: &Statement) -> Result<Envelope, AttestationError> {
        let payload = serde_json::to_vec(statement)?;
        let mut envelope = Envelope::unsigned(&payload);
        envelope
            .signatures
            .push(self.sign_payload(&envelope.payload_type, &payload)?);
        Ok(envelope)
    }

    /// Add this key's signature to an existing envelope.
    pub fn cosign(&self, envelope: &mut Envelope) -> Result<(), AttestationError> {
        let payload = envelope.payload_bytes()?;
        let signature = self.sign_payload(&envelope.payload_type, &payload)?;
        envelope.signatures.push(signature);
        Ok(())
    }
}

/// Key id for a public key string: SHA-256 hex of its trimmed text.
pub fn key_id(public_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(public_key.trim().as_bytes());
    hex::encode(hasher.finalize())
}

// ── PEM helpers ──────────────────────────────────────────────────────

/// Wrap DER bytes in PEM with the given label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {label}-----\n");
    for chunk in b64.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}

/// Extract DER bytes from a PEM string.
pub fn pem_to_der(pem: &str) -> Option<Vec<u8>> {
    let mut b64 = String::new();
    let mut in_body = false;

    for line in pem.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("-----BEGIN ") {
            in_body = true;
            continue;
        }
        if trimmed.starts_with("-----END ") {
            break;
        }
        if in_body {
            b64.push_str(trimmed);
        }
    }

    if !in_body {
        return None;
    }
    base64::engine::general_purpose::STANDARD.decode(&b64).ok()
}

/// Encode a raw P-256 public key (uncompressed point, 65 bytes) as
/// `SubjectPublicKeyInfo` DER.
pub fn encode_p256_spki(pub_key: &[u8]) -> Vec<u8> {
    #[rustfmt::skip]
    const SPKI_HEADER: [u8; 26] = [
        0x30, 0x59,                                     // SEQUENCE (89 bytes total)
        0x30, 0x13,                                     // SEQUENCE (19 bytes)
        0x06, 0x07,                                     // OID (7 bytes)
        0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01,       // 1.2.840.10045.2.1
        0x06, 0x08,                                     // OID (8 bytes)
        0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, // 1.2.840.10045.3.1.7
        0x03, 0x42, 0x00,                               // BIT STRING (66 bytes, 0 unused bits)
    ];

    let mut spki = Vec::with_capacity(SPKI_HEADER.len() + pub_key.len());
    spki.extend_from_slice(&SPKI_HEADER);
    spki.extend_from_slice(pub_key);
    spki
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::ResourceDescriptor;
    use aws_lc_rs::signature::{ECDSA_P256_SHA256_ASN1, ED25519, UnparsedPublicKey};

    fn statement() -> Statement {
        Statement::new(
            vec![ResourceDescriptor::new("out.bin", "sha256", "aa")],
            "https://in-toto.io/attestation/link/v0.3",
            serde_json::json!({ "name": "build" }),
        )
    }

    #[test]
    fn ecdsa_signature_verifies_over_pae() {
        let signer = EnvelopeSigner::generate_ecdsa().expect("keygen");
        let envelope = signer.sign_statement(&statement()).expect("sign");
        assert_eq!(envelope.signatures.len(), 1);
        assert_eq!(envelope.signatures[0].keyid, signer.key_id());

        let der = pem_to_der(&signer.public_key()).expect("pem");
        let point = &der[26..];
        let sig = base64::engine::general_purpose::STANDARD
            .decode(&envelope.signatures[0].sig)
            .unwrap();
        UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, point)
            .verify(&envelope.pae().unwrap(), &sig)
            .expect("signature should verify");
    }

    #[test]
    fn ed25519_signature_verifies_over_pae() {
        let signer = EnvelopeSigner::generate_ed25519().expect("keygen");
        assert_eq!(signer.key_type(), "ed25519");
        let envelope = signer.sign_statement(&statement()).expect("sign");

        let raw = hex::decode(signer.public_key()).unwrap();
        let sig = base64::engine::general_purpose::STANDARD
            .decode(&envelope.signatures[0].sig)
            .unwrap();
        UnparsedPublicKey::new(&ED25519, &raw)
            .verify(&envelope.pae().unwrap(), &sig)
            .expect("signature should verify");
    }

    #[test]
    fn cosign_appends_signature() {
        let first = EnvelopeSigner::generate_ecdsa().unwrap();
        let second = EnvelopeSigner::generate_ed25519().unwrap();
        let mut envelope = first.sign_statement(&statement()).unwrap();
        second.cosign(&mut envelope).unwrap();
        assert_eq!(envelope.signatures.len(), 2);
        assert_ne!(envelope.signatures[0].keyid, envelope.signatures[1].keyid);
    }

    #[test]
    fn pem_round_trip() {
        let data = b"hello world";
        let pem = der_to_pem(data, "TEST");
        let recovered = pem_to_der(&pem).expect("should parse PEM");
        assert_eq!(recovered, data);
    }

    #[test]
    fn pem_without_header_rejected() {
        assert!(pem_to_der("aGVsbG8=").is_none());
    }

    #[test]
    fn key_id_ignores_surrounding_whitespace() {
        assert_eq!(key_id("abc"), key_id("  abc\n"));
        assert_eq!(key_id("abc").len(), 64);
    }
}
