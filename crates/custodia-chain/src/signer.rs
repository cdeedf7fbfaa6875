//! Optional ed25519 signing of event hashes.
//!
//! A signed event is non-repudiable: the signature covers `this_hash`, which
//! in turn commits to the full event content and its chain position.
//! Unsigned events remain chain-verifiable; they just carry no signature.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};

use custodia_contracts::error::{AuditError, AuditResult};

/// Signs event hashes with a process-local ed25519 key.
pub struct EventSigner {
    key: SigningKey,
}

impl EventSigner {
    /// Build a signer from a raw 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Build a signer from a 64-character hex seed, as carried in config.
    pub fn from_hex(seed_hex: &str) -> AuditResult<Self> {
        let bytes = hex::decode(seed_hex).map_err(|e| AuditError::ConfigError {
            reason: format!("signing key is not valid hex: {e}"),
        })?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| AuditError::ConfigError {
            reason: "signing key must be exactly 32 bytes".to_string(),
        })?;
        Ok(Self::from_seed(seed))
    }

    /// Sign an event hash, returning the hex-encoded signature.
    pub fn sign_hash(&self, hash_hex: &str) -> String {
        hex::encode(self.key.sign(hash_hex.as_bytes()).to_bytes())
    }

    /// Verify a hex signature over an event hash.
    pub fn verify_hash(&self, hash_hex: &str, signature_hex: &str) -> bool {
        let Ok(bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(bytes) = <[u8; 64]>::try_from(bytes) else {
            return false;
        };
        let signature = Signature::from_bytes(&bytes);
        self.key
            .verifying_key()
            .verify(hash_hex.as_bytes(), &signature)
            .is_ok()
    }

    /// The hex-encoded public verifying key, for distribution to verifiers.
    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }
}
