//! Sealing helpers: the inverse of the unlock path.
//!
//! Only compiled for tests and the `testkit` feature. Stages built here use
//! one intermediate key per stage, wrapped once per accepted answer, which
//! is what lets every candidate open the same envelope.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use stagelock_core::{Envelope, KeyCandidate, StageNode, StagelockError, StagelockResult};

use crate::kdf::{derive_key, KdfParams};
use crate::normalize::normalize;
use crate::{KEY_SIZE, NONCE_SIZE};

/// Random bytes from the thread RNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// AES-256-GCM seal: `[ciphertext][16-byte tag]`
pub fn seal(key: &[u8; KEY_SIZE], iv: &[u8; NONCE_SIZE], plaintext: &[u8]) -> StagelockResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|e| StagelockError::Format(format!("seal failed: {e}")))
}

/// Wrap `intermediate` under the key derived from `answer` (normalized) and `salt`.
pub fn seal_candidate(
    answer: &str,
    salt: &[u8],
    iv: [u8; NONCE_SIZE],
    intermediate: &[u8; KEY_SIZE],
    params: &KdfParams,
) -> StagelockResult<KeyCandidate> {
    let derived = derive_key(&normalize(answer), salt, params)?;
    Ok(KeyCandidate {
        salt: salt.to_vec(),
        iv: iv.to_vec(),
        wrapped_key: seal(derived.as_bytes(), &iv, intermediate)?,
    })
}

/// Seal `next` as a stage document under `intermediate`.
pub fn seal_envelope(
    next: &StageNode,
    iv: [u8; NONCE_SIZE],
    intermediate: &[u8; KEY_SIZE],
) -> StagelockResult<Envelope> {
    let document = next.to_json()?;
    Ok(Envelope {
        iv: iv.to_vec(),
        payload: seal(intermediate, &iv, &document)?,
    })
}

/// Lock `next` behind `answers`, with fresh random salts, nonces and key.
pub fn lock_stage(
    display: &[u8],
    answers: &[&str],
    next: &StageNode,
    params: &KdfParams,
) -> StagelockResult<StageNode> {
    let intermediate: [u8; KEY_SIZE] = random_bytes();
    let candidates = answers
        .iter()
        .map(|answer| {
            seal_candidate(
                answer,
                &random_bytes::<16>(),
                random_bytes(),
                &intermediate,
                params,
            )
        })
        .collect::<StagelockResult<Vec<_>>>()?;

    Ok(StageNode::Locked {
        display: display.to_vec(),
        candidates,
        envelope: seal_envelope(next, random_bytes(), &intermediate)?,
    })
}
