//! Candidate scan: the unlock attempt for one response against one stage

use secrecy::{ExposeSecret, SecretString};
use stagelock_core::{Envelope, KeyCandidate, StageNode, StagelockError, StagelockResult};
use tracing::{debug, info, warn};

use crate::envelope::{open_envelope, unwrap_key};
use crate::kdf::KeyDeriver;
use crate::normalize::normalize;
use crate::ProgressFn;

/// Result of one unlock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// `candidate` (index in declared order) opened the envelope.
    Opened { next: StageNode, candidate: usize },
    /// No candidate matched. Carries no reason.
    Rejected,
}

pub struct CandidateScanner {
    deriver: KeyDeriver,
}

impl CandidateScanner {
    pub fn new(deriver: KeyDeriver) -> Self {
        Self { deriver }
    }

    /// Try every candidate of `stage`, in declared order, against `response`.
    ///
    /// The first candidate whose derivation, unwrap, envelope open and stage
    /// decode all succeed wins. Auth, format and parse failures only
    /// disqualify that candidate; a derivation failure aborts the attempt.
    /// A terminal stage is always `Rejected` without deriving anything.
    pub async fn attempt_unlock(
        &self,
        stage: &StageNode,
        response: &SecretString,
        progress: Option<&ProgressFn>,
    ) -> StagelockResult<UnlockOutcome> {
        let StageNode::Locked {
            candidates,
            envelope,
            ..
        } = stage
        else {
            debug!("terminal stage has nothing to unlock");
            return Ok(UnlockOutcome::Rejected);
        };

        let passphrase = normalize(response.expose_secret());

        for (index, candidate) in candidates.iter().enumerate() {
            match self
                .try_candidate(&passphrase, candidate, envelope, progress)
                .await
            {
                Ok(next) => {
                    info!(
                        candidate = index,
                        terminal = next.is_terminal(),
                        "stage unlocked"
                    );
                    return Ok(UnlockOutcome::Opened {
                        next,
                        candidate: index,
                    });
                }
                Err(e @ StagelockError::Parse(_)) => {
                    // Authenticated but undecodable: an authoring fault, not a wrong guess.
                    warn!(candidate = index, error = %e, "envelope opened but is not a valid stage");
                }
                Err(e) if e.is_candidate_local() => {
                    debug!(candidate = index, kind = e.kind(), error = %e, "candidate rejected");
                }
                Err(e) => return Err(e),
            }
        }

        debug!(candidates = candidates.len(), "no candidate matched");
        Ok(UnlockOutcome::Rejected)
    }

    async fn try_candidate(
        &self,
        passphrase: &[u8],
        candidate: &KeyCandidate,
        envelope: &Envelope,
        progress: Option<&ProgressFn>,
    ) -> StagelockResult<StageNode> {
        let derived = self
            .deriver
            .derive(passphrase, &candidate.salt, progress)
            .await?;
        let intermediate = unwrap_key(candidate, &derived)?;
        let document = open_envelope(envelope, &intermediate)?;
        StageNode::from_json(&document).map_err(|e| StagelockError::Parse(e.to_string()))
    }
}

impl Default for CandidateScanner {
    fn default() -> Self {
        Self::new(KeyDeriver::default())
    }
}
