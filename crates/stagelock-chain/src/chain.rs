use std::path::Path;

use stagelock_core::{StageNode, StagelockResult};
use tracing::info;

/// The puzzle chain: owns the current stage.
///
/// Stages are only ever replaced whole; earlier stages are dropped.
#[derive(Debug, Clone)]
pub struct PuzzleChain {
    current: StageNode,
    unlocked: usize,
}

impl PuzzleChain {
    pub fn new(root: StageNode) -> Self {
        Self {
            current: root,
            unlocked: 0,
        }
    }

    /// Decode and strictly validate a root stage document.
    pub fn from_json(data: &[u8]) -> StagelockResult<Self> {
        let root = StageNode::from_json(data)?;
        root.validate()?;
        Ok(Self::new(root))
    }

    /// Load the root stage document at `path`.
    pub async fn load(path: &Path) -> StagelockResult<Self> {
        let data = tokio::fs::read(path).await?;
        let chain = Self::from_json(&data)?;
        info!(
            path = %path.display(),
            candidates = chain.current.candidates().len(),
            "puzzle chain loaded"
        );
        Ok(chain)
    }

    pub fn current(&self) -> &StageNode {
        &self.current
    }

    pub fn advance(&mut self, next: StageNode) {
        self.current = next;
        self.unlocked += 1;
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Number of stages unlocked so far.
    pub fn unlocked(&self) -> usize {
        self.unlocked
    }
}
