//! Session loop: show the stage, read a response, attempt an unlock, repeat
//!
//! One attempt is in flight at a time; the session holds the chain by
//! exclusive reference for its whole run. A rejected response produces no
//! message, only a redisplay of the same stage.

use std::future::Future;

use secrecy::SecretString;
use stagelock_core::config::{SessionConfig, StagelockConfig};
use stagelock_core::{StageNode, StagelockResult};
use stagelock_crypto::{CandidateScanner, KeyDeriver, ProgressFn, UnlockOutcome};
use tracing::{debug, info};

use crate::chain::PuzzleChain;

/// Source of user responses.
pub trait LineSource {
    /// Read one response after writing `prompt`. `None` means the input is
    /// exhausted and the session should end.
    fn read_line(&mut self, prompt: &str) -> impl Future<Output = std::io::Result<Option<String>>>;
}

/// Sink for stage display text.
pub trait StageView {
    fn show(&mut self, stage: &StageNode) -> std::io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The chain reached a terminal stage.
    Completed { unlocked: usize },
    /// Input ran out before the chain was finished.
    InputClosed { unlocked: usize },
}

pub struct Session {
    scanner: CandidateScanner,
    prompt: String,
    skip_empty: bool,
}

impl Session {
    pub fn new(scanner: CandidateScanner, config: &SessionConfig) -> Self {
        Self {
            scanner,
            prompt: config.prompt.clone(),
            skip_empty: config.skip_empty,
        }
    }

    pub fn from_config(config: &StagelockConfig) -> Self {
        Self::new(
            CandidateScanner::new(KeyDeriver::from_config(&config.unlock)),
            &config.session,
        )
    }

    /// Drive `chain` until it is terminal or `input` is exhausted.
    ///
    /// Only fatal errors (derivation, I/O) end the session early; wrong
    /// responses leave the chain untouched and re-prompt.
    pub async fn run<I, V>(
        &self,
        chain: &mut PuzzleChain,
        input: &mut I,
        view: &mut V,
        progress: Option<&ProgressFn>,
    ) -> StagelockResult<SessionOutcome>
    where
        I: LineSource,
        V: StageView,
    {
        loop {
            view.show(chain.current())?;

            if chain.is_terminal() {
                info!(unlocked = chain.unlocked(), "puzzle chain completed");
                return Ok(SessionOutcome::Completed {
                    unlocked: chain.unlocked(),
                });
            }

            let Some(line) = input.read_line(&self.prompt).await? else {
                debug!("input closed");
                return Ok(SessionOutcome::InputClosed {
                    unlocked: chain.unlocked(),
                });
            };

            if line.is_empty() && self.skip_empty {
                continue;
            }

            let response = SecretString::from(line);
            match self
                .scanner
                .attempt_unlock(chain.current(), &response, progress)
                .await?
            {
                UnlockOutcome::Opened { next, candidate } => {
                    chain.advance(next);
                    info!(stage = chain.unlocked(), candidate, "advanced to next stage");
                }
                UnlockOutcome::Rejected => {
                    debug!(stage = chain.unlocked(), "response rejected");
                }
            }
        }
    }
}
