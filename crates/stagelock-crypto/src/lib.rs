//! stagelock-crypto: the stage unlock protocol
//!
//! A locked stage carries one sealed envelope and any number of candidate
//! keys. Unlocking tries the candidates in order:
//!
//! ```text
//! response ──normalize──► passphrase bytes
//!   └─ per candidate:
//!        scrypt(passphrase, salt, N=8192, r=8, p=1) ─► derived key (256-bit)
//!        AES-256-GCM open(derived, iv, wrapped key) ─► intermediate key
//!        AES-256-GCM open(intermediate, envelope)  ─► next stage document
//! ```
//!
//! The first candidate whose whole path succeeds wins. Failures never tell
//! the caller why a response was wrong.

pub mod envelope;
pub mod kdf;
pub mod normalize;
pub mod scanner;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use envelope::{open_envelope, unwrap_key, IntermediateKey};
pub use kdf::{derive_key, DerivedKey, KdfParams, KeyDeriver};
pub use normalize::normalize;
pub use scanner::{CandidateScanner, UnlockOutcome};
pub use stagelock_core::stage::{NONCE_SIZE, TAG_SIZE};

/// Size of derived and intermediate keys in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Progress callback (percent, 0..=100). Called from the awaiting task, never
/// from the derivation thread.
pub type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;
