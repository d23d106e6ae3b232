//! Key derivation: scrypt over the normalized passphrase → 256-bit key

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use stagelock_core::config::UnlockConfig;
use stagelock_core::{StagelockError, StagelockResult};
use tokio::time::MissedTickBehavior;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::{ProgressFn, KEY_SIZE};

/// A 256-bit key derived from a passphrase and a candidate salt.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// scrypt parameters for KDF
///
/// The defaults are the ones every published stage was sealed with; anything
/// else only makes sense in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// CPU/memory cost N (default: 8192), a power of two
    pub cost: u32,
    /// Block size r (default: 8)
    pub block_size: u32,
    /// Parallelization p (default: 1)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            cost: 8192,
            block_size: 8,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    fn to_scrypt(self) -> StagelockResult<scrypt::Params> {
        if self.cost < 2 || !self.cost.is_power_of_two() {
            return Err(StagelockError::Derivation(format!(
                "scrypt cost must be a power of two >= 2, got {}",
                self.cost
            )));
        }
        if self.block_size == 0 || self.parallelism == 0 {
            return Err(StagelockError::Derivation(format!(
                "scrypt r and p must be non-zero, got r={} p={}",
                self.block_size, self.parallelism
            )));
        }
        let log_n = self.cost.trailing_zeros() as u8;
        scrypt::Params::new(log_n, self.block_size, self.parallelism, KEY_SIZE)
            .map_err(|e| StagelockError::Derivation(format!("invalid scrypt params: {e}")))
    }
}

/// Derive a 256-bit key from normalized passphrase bytes and a salt.
///
/// Blocking; takes hundreds of milliseconds at the default parameters. Any
/// passphrase yields some key, so the only failure is invalid parameters.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> StagelockResult<DerivedKey> {
    let scrypt_params = params.to_scrypt()?;
    scrypt_into(passphrase, salt, &scrypt_params)
}

fn scrypt_into(
    passphrase: &[u8],
    salt: &[u8],
    params: &scrypt::Params,
) -> StagelockResult<DerivedKey> {
    let mut key = [0u8; KEY_SIZE];
    scrypt::scrypt(passphrase, salt, params, &mut key)
        .map_err(|e| StagelockError::Derivation(format!("scrypt failed: {e}")))?;
    let derived = DerivedKey::from_bytes(key);
    key.zeroize();
    Ok(derived)
}

/// Async key derivation with progress reporting.
///
/// scrypt runs on the blocking pool. While it runs, an estimate of completion
/// (0..=99) is reported every tick, followed by a single `100` once the key
/// is ready. The estimate is elapsed time over the expected duration, which
/// tracks a moving average of finished derivations.
#[derive(Debug)]
pub struct KeyDeriver {
    params: KdfParams,
    tick: Duration,
    expected_ms: AtomicU64,
}

impl KeyDeriver {
    pub fn new(params: KdfParams, tick: Duration, initial_estimate: Duration) -> Self {
        Self {
            params,
            tick: tick.max(Duration::from_millis(1)),
            expected_ms: AtomicU64::new(initial_estimate.as_millis().max(1) as u64),
        }
    }

    /// Default (interoperable) parameters, tuned by the `[unlock]` config section.
    pub fn from_config(config: &UnlockConfig) -> Self {
        Self::new(
            KdfParams::default(),
            Duration::from_millis(config.progress_tick_ms),
            Duration::from_millis(config.derive_estimate_ms),
        )
    }

    /// Current expected duration of one derivation.
    pub fn expected(&self) -> Duration {
        Duration::from_millis(self.expected_ms.load(Ordering::Relaxed))
    }

    pub async fn derive(
        &self,
        passphrase: &[u8],
        salt: &[u8],
        progress: Option<&ProgressFn>,
    ) -> StagelockResult<DerivedKey> {
        let scrypt_params = self.params.to_scrypt()?;
        let passphrase = Zeroizing::new(passphrase.to_vec());
        let salt = salt.to_vec();

        let started = Instant::now();
        let expected = self.expected();
        let mut job = tokio::task::spawn_blocking(move || {
            scrypt_into(&passphrase, &salt, &scrypt_params)
        });

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let joined = loop {
            tokio::select! {
                res = &mut job => break res,
                _ = ticker.tick() => {
                    if let Some(report) = progress {
                        report(estimate_percent(started.elapsed(), expected));
                    }
                }
            }
        };

        let key = joined
            .map_err(|e| StagelockError::Derivation(format!("derivation task failed: {e}")))??;

        let elapsed = started.elapsed();
        self.record(elapsed);
        debug!(elapsed_ms = elapsed.as_millis() as u64, "key derived");

        if let Some(report) = progress {
            report(100);
        }
        Ok(key)
    }

    fn record(&self, elapsed: Duration) {
        let measured = elapsed.as_millis().max(1) as u64;
        let previous = self.expected_ms.load(Ordering::Relaxed);
        let smoothed = (previous.saturating_mul(3).saturating_add(measured) / 4).max(1);
        self.expected_ms.store(smoothed, Ordering::Relaxed);
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::from_config(&UnlockConfig::default())
    }
}

fn estimate_percent(elapsed: Duration, expected: Duration) -> u8 {
    if expected.is_zero() {
        return 99;
    }
    let ratio = elapsed.as_secs_f64() / expected.as_secs_f64();
    (ratio * 100.0).clamp(0.0, 99.0) as u8
}
