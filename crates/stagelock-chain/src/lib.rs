//! stagelock-chain: puzzle chain state and the session loop that drives it
//!
//! ```text
//! Locked(s) ──match──► Locked(next) ──…──► Unlocked(terminal)
//!     └──no match──► Locked(s)
//! ```

pub mod chain;
pub mod session;

pub use chain::PuzzleChain;
pub use session::{LineSource, Session, SessionOutcome, StageView};
