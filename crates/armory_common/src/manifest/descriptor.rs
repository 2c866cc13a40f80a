//! Remote manifest descriptor and signature verification
//!
//! The descriptor is small and fetched first: it names the checksum of the
//! current manifest body, an Ed25519 signature over that checksum, and when
//! it was published.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ArmoryError, Result};

/// Lowercase hex SHA-256 of `bytes`
pub fn checksum_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Remote descriptor for the latest manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestMetadata {
    /// SHA-256 of the manifest body, lowercase hex
    pub checksum: String,
    /// Ed25519 signature over the ASCII checksum, hex
    pub signature: String,
    pub published_at: DateTime<Utc>,
}

impl ManifestMetadata {
    /// Decode a descriptor document. A document that does not decode is
    /// treated by the pipeline like a failed fetch, not like tampering.
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, String> {
        let meta: Self =
            serde_json::from_slice(bytes).map_err(|e| format!("descriptor is not valid: {}", e))?;
        if meta.checksum.len() != 64
            || !meta
                .checksum
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(format!(
                "descriptor checksum '{}' is not a lowercase SHA-256 hex digest",
                meta.checksum
            ));
        }
        Ok(meta)
    }

    /// Check the signature over `checksum` against the trust anchor
    pub fn verify_signature(&self, trust: &TrustAnchor) -> Result<()> {
        let raw = hex::decode(&self.signature).map_err(|_| {
            ArmoryError::SignatureVerification("signature is not valid hex".to_string())
        })?;
        let bytes: [u8; 64] = raw.try_into().map_err(|_| {
            ArmoryError::SignatureVerification("signature must be 64 bytes".to_string())
        })?;
        let signature = Signature::from_bytes(&bytes);

        trust
            .key
            .verify(self.checksum.as_bytes(), &signature)
            .map_err(|_| {
                ArmoryError::SignatureVerification(format!(
                    "descriptor for {} is not signed by the trusted key",
                    &self.checksum[..16]
                ))
            })
    }
}

/// The fixed public key manifests must be signed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    key: VerifyingKey,
}

impl TrustAnchor {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    pub fn from_hex(public_key: &str) -> Result<Self> {
        let raw = hex::decode(public_key.trim()).map_err(|_| {
            ArmoryError::SignatureVerification("trusted key is not valid hex".to_string())
        })?;
        let bytes: [u8; 32] = raw.try_into().map_err(|_| {
            ArmoryError::SignatureVerification("trusted key must be 32 bytes".to_string())
        })?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|_| {
            ArmoryError::SignatureVerification(
                "trusted key is not a valid Ed25519 public key".to_string(),
            )
        })?;
        Ok(Self { key })
    }
}
