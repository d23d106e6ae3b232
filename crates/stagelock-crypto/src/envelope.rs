//! Two-layer AES-256-GCM opening
//!
//! ```text
//! derived key      ──open(candidate.iv, candidate.wrapped_key)──► intermediate key (32 bytes)
//! intermediate key ──open(envelope.iv,  envelope.payload)     ──► next stage document
//! ```
//!
//! Sealed buffers are `[ciphertext][16-byte tag]` with a 12-byte nonce kept
//! beside them. Tag verification and decryption are a single step: nothing
//! is returned unless the tag checks out.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use stagelock_core::stage::check_sealed;
use stagelock_core::{Envelope, KeyCandidate, StagelockError, StagelockResult};
use zeroize::{Zeroize, Zeroizing};

use crate::kdf::DerivedKey;
use crate::KEY_SIZE;

/// The key a candidate unwraps; opens the stage envelope. Zeroized on drop.
#[derive(Clone)]
pub struct IntermediateKey {
    bytes: [u8; KEY_SIZE],
}

impl IntermediateKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for IntermediateKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for IntermediateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntermediateKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Unwrap a candidate's intermediate key with the key derived from the response.
///
/// `Auth` on a wrong key or tampered data, `Format` on a malformed nonce,
/// an empty ciphertext, or an unwrapped key that is not 256 bits.
pub fn unwrap_key(candidate: &KeyCandidate, derived: &DerivedKey) -> StagelockResult<IntermediateKey> {
    let plaintext = open(derived.as_bytes(), &candidate.iv, &candidate.wrapped_key)?;

    if plaintext.len() != KEY_SIZE {
        return Err(StagelockError::Format(format!(
            "unwrapped key has wrong size: {} bytes (expected {})",
            plaintext.len(),
            KEY_SIZE
        )));
    }

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    let key = IntermediateKey::from_bytes(key_bytes);
    key_bytes.zeroize();
    Ok(key)
}

/// Open the stage envelope, returning the next stage document bytes.
pub fn open_envelope(
    envelope: &Envelope,
    key: &IntermediateKey,
) -> StagelockResult<Zeroizing<Vec<u8>>> {
    open(key.as_bytes(), &envelope.iv, &envelope.payload)
}

fn open(key: &[u8; KEY_SIZE], iv: &[u8], sealed: &[u8]) -> StagelockResult<Zeroizing<Vec<u8>>> {
    check_sealed(iv, sealed).map_err(StagelockError::Format)?;

    let cipher = Aes256Gcm::new(key.into());
    let nonce = Nonce::from_slice(iv);

    cipher
        .decrypt(nonce, sealed)
        .map(Zeroizing::new)
        .map_err(|_| StagelockError::Auth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{seal, seal_envelope};
    use crate::{NONCE_SIZE, TAG_SIZE};
    use stagelock_core::StageNode;

    const IV: [u8; NONCE_SIZE] = [9u8; NONCE_SIZE];

    fn candidate_wrapping(derived: &DerivedKey, key: &[u8]) -> KeyCandidate {
        KeyCandidate {
            salt: b"salt".to_vec(),
            iv: IV.to_vec(),
            wrapped_key: seal(derived.as_bytes(), &IV, key).unwrap(),
        }
    }

    #[test]
    fn test_unwrap_roundtrip() {
        let derived = DerivedKey::from_bytes([1u8; KEY_SIZE]);
        let candidate = candidate_wrapping(&derived, &[42u8; KEY_SIZE]);

        let key = unwrap_key(&candidate, &derived).unwrap();
        assert_eq!(key.as_bytes(), &[42u8; KEY_SIZE]);
    }

    #[test]
    fn test_wrapped_key_size() {
        let derived = DerivedKey::from_bytes([1u8; KEY_SIZE]);
        let candidate = candidate_wrapping(&derived, &[42u8; KEY_SIZE]);

        // key (32) + tag (16) = 48
        assert_eq!(candidate.wrapped_key.len(), KEY_SIZE + TAG_SIZE);
    }

    #[test]
    fn test_unwrap_wrong_derived_key() {
        let derived = DerivedKey::from_bytes([1u8; KEY_SIZE]);
        let candidate = candidate_wrapping(&derived, &[42u8; KEY_SIZE]);

        let wrong = DerivedKey::from_bytes([2u8; KEY_SIZE]);
        let err = unwrap_key(&candidate, &wrong).unwrap_err();
        assert!(matches!(err, StagelockError::Auth));
    }

    #[test]
    fn test_unwrap_tampered() {
        let derived = DerivedKey::from_bytes([1u8; KEY_SIZE]);
        let mut candidate = candidate_wrapping(&derived, &[42u8; KEY_SIZE]);
        candidate.wrapped_key[3] ^= 0xFF;

        let err = unwrap_key(&candidate, &derived).unwrap_err();
        assert!(matches!(err, StagelockError::Auth), "tampered key must fail");
    }

    #[test]
    fn test_unwrap_short_nonce_is_format_error() {
        let derived = DerivedKey::from_bytes([1u8; KEY_SIZE]);
        let mut candidate = candidate_wrapping(&derived, &[42u8; KEY_SIZE]);
        candidate.iv.truncate(8);

        let err = unwrap_key(&candidate, &derived).unwrap_err();
        assert!(matches!(err, StagelockError::Format(_)));
    }

    #[test]
    fn test_unwrap_empty_ciphertext_is_format_error() {
        let derived = DerivedKey::from_bytes([1u8; KEY_SIZE]);
        let mut candidate = candidate_wrapping(&derived, &[42u8; KEY_SIZE]);
        candidate.wrapped_key.truncate(TAG_SIZE);

        let err = unwrap_key(&candidate, &derived).unwrap_err();
        assert!(matches!(err, StagelockError::Format(_)));
    }

    #[test]
    fn test_unwrap_wrong_key_size_is_format_error() {
        let derived = DerivedKey::from_bytes([1u8; KEY_SIZE]);
        // Authentic, but a 128-bit key
        let candidate = candidate_wrapping(&derived, &[42u8; 16]);

        let err = unwrap_key(&candidate, &derived).unwrap_err();
        assert!(err.to_string().contains("wrong size"));
    }

    #[test]
    fn test_open_envelope_roundtrip() {
        let key = IntermediateKey::from_bytes([5u8; KEY_SIZE]);
        let next = StageNode::Terminal {
            display: b"DONE".to_vec(),
        };
        let envelope = seal_envelope(&next, IV, key.as_bytes()).unwrap();

        let plaintext = open_envelope(&envelope, &key).unwrap();
        assert_eq!(StageNode::from_json(&plaintext).unwrap(), next);
    }

    #[test]
    fn test_open_envelope_wrong_key() {
        let key = IntermediateKey::from_bytes([5u8; KEY_SIZE]);
        let next = StageNode::Terminal {
            display: b"DONE".to_vec(),
        };
        let envelope = seal_envelope(&next, IV, key.as_bytes()).unwrap();

        let wrong = IntermediateKey::from_bytes([6u8; KEY_SIZE]);
        let err = open_envelope(&envelope, &wrong).unwrap_err();
        assert!(matches!(err, StagelockError::Auth));
    }

    #[test]
    fn test_open_envelope_tampered_nonce() {
        let key = IntermediateKey::from_bytes([5u8; KEY_SIZE]);
        let next = StageNode::Terminal {
            display: b"DONE".to_vec(),
        };
        let mut envelope = seal_envelope(&next, IV, key.as_bytes()).unwrap();
        envelope.iv[0] ^= 0x01;

        let err = open_envelope(&envelope, &key).unwrap_err();
        assert!(matches!(err, StagelockError::Auth));
    }
}
