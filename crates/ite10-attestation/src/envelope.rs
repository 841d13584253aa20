//! DSSE envelope unwrapping.
//!
//! An envelope carries a base64 payload (the in-toto statement), its
//! payload type, and zero or more signatures over the DSSE
//! pre-authentication encoding of the two.
//!
//! See: <https://github.com/secure-systems-lab/dsse/blob/master/protocol.md>

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AttestationError;
use crate::statement::Statement;

/// A DSSE envelope as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Media type of the payload.
    pub payload_type: String,
    /// Base64-encoded payload bytes.
    pub payload: String,
    /// Signatures over the pre-authentication encoding.
    #[serde(default)]
    pub signatures: Vec<EnvelopeSignature>,
}

/// One signature within an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSignature {
    /// Identifier of the signing key. May be empty.
    #[serde(default)]
    pub keyid: String,
    /// Base64-encoded signature bytes.
    pub sig: String,
}

impl Envelope {
    /// The in-toto payload type.
    pub const PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

    /// Wrap raw payload bytes in an unsigned envelope.
    pub fn unsigned(payload: &[u8]) -> Self {
        Self {
            payload_type: Self::PAYLOAD_TYPE.to_owned(),
            payload: base64::engine::general_purpose::STANDARD.encode(payload),
            signatures: Vec::new(),
        }
    }

    /// Decode the base64 payload.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, AttestationError> {
        base64::engine::general_purpose::STANDARD
            .decode(self.payload.trim())
            .map_err(|e| AttestationError::PayloadEncoding(e.to_string()))
    }

    /// Decode the payload into an in-toto statement.
    ///
    /// The signatures are NOT checked here.
    pub fn decode_statement(&self) -> Result<Statement, AttestationError> {
        if self.payload_type != Self::PAYLOAD_TYPE {
            return Err(AttestationError::UnsupportedPayloadType(
                self.payload_type.clone(),
            ));
        }
        let bytes = self.payload_bytes()?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// DSSE v1 pre-authentication encoding of this envelope's payload.
    pub fn pae(&self) -> Result<Vec<u8>, AttestationError> {
        Ok(pae(&self.payload_type, &self.payload_bytes()?))
    }

    /// SHA-256 hex digest of the decoded payload.
    pub fn payload_digest(&self) -> Result<String, AttestationError> {
        let mut hasher = Sha256::new();
        hasher.update(self.payload_bytes()?);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// `"DSSEv1" SP LEN(type) SP type SP LEN(body) SP body`
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "DSSEv1 {} {} {} ",
        payload_type.len(),
        payload_type,
        payload.len()
    );
    let mut out = Vec::with_capacity(header.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::ResourceDescriptor;

    fn envelope_for(statement: &Statement) -> Envelope {
        Envelope::unsigned(&serde_json::to_vec(statement).unwrap())
    }

    #[test]
    fn pae_matches_protocol_example() {
        // Test vector from the DSSE protocol document.
        let encoded = pae("http://example.com/HelloWorld", b"hello world");
        assert_eq!(
            encoded,
            b"DSSEv1 29 http://example.com/HelloWorld 11 hello world".to_vec()
        );
    }

    #[test]
    fn decode_unsigned_envelope() {
        let statement = Statement::new(
            vec![ResourceDescriptor::new("out.bin", "sha256", "aa")],
            "https://in-toto.io/attestation/link/v0.3",
            serde_json::json!({ "name": "build" }),
        );
        let decoded = envelope_for(&statement).decode_statement().unwrap();
        assert_eq!(decoded, statement);
    }

    #[test]
    fn wrong_payload_type_rejected() {
        let mut envelope = Envelope::unsigned(b"{}");
        envelope.payload_type = "text/plain".to_owned();
        assert!(matches!(
            envelope.decode_statement(),
            Err(AttestationError::UnsupportedPayloadType(_))
        ));
    }

    #[test]
    fn bad_base64_rejected() {
        let envelope = Envelope {
            payload_type: Envelope::PAYLOAD_TYPE.to_owned(),
            payload: "not base64!!".to_owned(),
            signatures: vec![],
        };
        assert!(matches!(
            envelope.decode_statement(),
            Err(AttestationError::PayloadEncoding(_))
        ));
    }

    #[test]
    fn envelope_json_uses_camel_case() {
        let json = r#"{
            "payloadType": "application/vnd.in-toto+json",
            "payload": "e30=",
            "signatures": [{ "keyid": "k1", "sig": "c2ln" }]
        }"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.signatures.len(), 1);
        assert_eq!(envelope.signatures[0].keyid, "k1");
        assert_eq!(envelope.payload_bytes().unwrap(), b"{}");
    }

    #[test]
    fn payload_digest_is_stable() {
        let envelope = Envelope::unsigned(b"{}");
        let d1 = envelope.payload_digest().unwrap();
        let d2 = envelope.payload_digest().unwrap();
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
    }
}
