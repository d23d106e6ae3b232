use thiserror::Error;

pub type StagelockResult<T> = Result<T, StagelockError>;

#[derive(Debug, Error)]
pub enum StagelockError {
    /// Malformed stage document, bad base64, bad field length, or a stage
    /// that breaks the candidates/envelope invariant.
    #[error("format error: {0}")]
    Format(String),

    /// Authenticated plaintext that does not decode as a stage.
    #[error("stage parse error: {0}")]
    Parse(String),

    /// AEAD tag verification failed. Wrong key and corrupted data are
    /// indistinguishable.
    #[error("authentication failed")]
    Auth,

    #[error("key derivation error: {0}")]
    Derivation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StagelockError {
    /// True for failures that only disqualify the candidate being tried.
    ///
    /// Everything else aborts the unlock session.
    pub fn is_candidate_local(&self) -> bool {
        matches!(self, Self::Auth | Self::Format(_) | Self::Parse(_))
    }

    /// Short class name for structured logs; never includes key material.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Format(_) => "format",
            Self::Parse(_) => "parse",
            Self::Auth => "auth",
            Self::Derivation(_) => "derivation",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_local_classification() {
        assert!(StagelockError::Auth.is_candidate_local());
        assert!(StagelockError::Format("short iv".into()).is_candidate_local());
        assert!(StagelockError::Parse("not json".into()).is_candidate_local());

        assert!(!StagelockError::Derivation("bad N".into()).is_candidate_local());
        assert!(!StagelockError::Config("bad toml".into()).is_candidate_local());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(!StagelockError::from(io).is_candidate_local());
    }

    #[test]
    fn test_auth_message_is_opaque() {
        assert_eq!(StagelockError::Auth.to_string(), "authentication failed");
        assert_eq!(StagelockError::Auth.kind(), "auth");
    }
}
