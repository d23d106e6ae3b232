pub mod config;
pub mod error;
pub mod stage;

pub use error::{StagelockError, StagelockResult};
pub use stage::{Envelope, KeyCandidate, StageNode};
