//! Puzzle stage model and its JSON wire format
//!
//! Stage document (binary fields are standard padded base64):
//! ```text
//! { "text": b64(display),
//!   "keys": [ { "salt": b64, "iv": b64, "data": b64 }, ... ],   // omitted on a terminal stage
//!   "envelope": { "iv": b64, "data": b64 } }                    // omitted on a terminal stage
//! ```
//!
//! Every key in `keys` wraps an intermediate key that opens the same
//! `envelope`, whose plaintext is the next stage document.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::{StagelockError, StagelockResult};

/// AES-GCM nonce size (96-bit)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size (128-bit)
pub const TAG_SIZE: usize = 16;

/// One guessable passphrase path into a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCandidate {
    /// scrypt salt for this candidate
    pub salt: Vec<u8>,
    /// Nonce used to wrap the intermediate key
    pub iv: Vec<u8>,
    /// Intermediate key, AES-256-GCM sealed under the derived key (ciphertext || tag)
    pub wrapped_key: Vec<u8>,
}

/// The sealed next stage, shared by all candidates of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub iv: Vec<u8>,
    /// Next stage document, AES-256-GCM sealed under the intermediate key (ciphertext || tag)
    pub payload: Vec<u8>,
}

/// A node of the puzzle chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageNode {
    /// Fully revealed; the chain ends here.
    Terminal { display: Vec<u8> },
    /// Locked behind one or more candidates.
    Locked {
        display: Vec<u8>,
        candidates: Vec<KeyCandidate>,
        envelope: Envelope,
    },
}

impl StageNode {
    pub fn display(&self) -> &[u8] {
        match self {
            Self::Terminal { display } | Self::Locked { display, .. } => display,
        }
    }

    /// Display bytes as text. Invalid UTF-8 is replaced, so 7-bit documents
    /// render exactly as written.
    pub fn display_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.display())
    }

    /// Candidates in declared order; empty for a terminal stage.
    pub fn candidates(&self) -> &[KeyCandidate] {
        match self {
            Self::Terminal { .. } => &[],
            Self::Locked { candidates, .. } => candidates,
        }
    }

    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Self::Terminal { .. } => None,
            Self::Locked { envelope, .. } => Some(envelope),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }

    /// Decode a stage document. Checks the JSON shape, the base64 fields,
    /// and the candidates/envelope invariant; field lengths are left to
    /// [`StageNode::validate`] and to decryption.
    pub fn from_json(data: &[u8]) -> StagelockResult<Self> {
        let doc: StageDoc = serde_json::from_slice(data)
            .map_err(|e| StagelockError::Format(format!("stage document: {e}")))?;
        Self::try_from(doc)
    }

    /// Encode as a stage document.
    pub fn to_json(&self) -> StagelockResult<Vec<u8>> {
        serde_json::to_vec(&StageDoc::from(self))
            .map_err(|e| StagelockError::Format(format!("stage serialization: {e}")))
    }

    /// Strict length checks on every nonce and sealed buffer.
    ///
    /// Run on the root stage at load time, where a malformed field must stop
    /// startup instead of silently disqualifying a candidate later.
    pub fn validate(&self) -> StagelockResult<()> {
        let Self::Locked {
            candidates,
            envelope,
            ..
        } = self
        else {
            return Ok(());
        };

        for (index, candidate) in candidates.iter().enumerate() {
            check_sealed(&candidate.iv, &candidate.wrapped_key)
                .map_err(|e| StagelockError::Format(format!("keys[{index}]: {e}")))?;
        }
        check_sealed(&envelope.iv, &envelope.payload)
            .map_err(|e| StagelockError::Format(format!("envelope: {e}")))
    }
}

/// Length rules shared by wrapped keys and envelopes.
pub fn check_sealed(iv: &[u8], sealed: &[u8]) -> Result<(), String> {
    if iv.len() != NONCE_SIZE {
        return Err(format!(
            "iv must be {NONCE_SIZE} bytes, got {}",
            iv.len()
        ));
    }
    if sealed.len() <= TAG_SIZE {
        return Err(format!(
            "sealed data too short: {} bytes (need more than the {TAG_SIZE}-byte tag)",
            sealed.len()
        ));
    }
    Ok(())
}

// ── Wire format ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct StageDoc {
    #[serde(with = "b64")]
    text: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    keys: Option<Vec<KeyDoc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    envelope: Option<EnvelopeDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyDoc {
    #[serde(with = "b64")]
    salt: Vec<u8>,
    #[serde(with = "b64")]
    iv: Vec<u8>,
    #[serde(with = "b64")]
    data: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeDoc {
    #[serde(with = "b64")]
    iv: Vec<u8>,
    #[serde(with = "b64")]
    data: Vec<u8>,
}

impl TryFrom<StageDoc> for StageNode {
    type Error = StagelockError;

    fn try_from(doc: StageDoc) -> StagelockResult<Self> {
        let keys = doc.keys.unwrap_or_default();
        match (keys.is_empty(), doc.envelope) {
            (true, None) => Ok(Self::Terminal { display: doc.text }),
            (false, Some(envelope)) => Ok(Self::Locked {
                display: doc.text,
                candidates: keys
                    .into_iter()
                    .map(|k| KeyCandidate {
                        salt: k.salt,
                        iv: k.iv,
                        wrapped_key: k.data,
                    })
                    .collect(),
                envelope: Envelope {
                    iv: envelope.iv,
                    payload: envelope.data,
                },
            }),
            (false, None) => Err(StagelockError::Format(
                "stage has keys but no envelope".into(),
            )),
            (true, Some(_)) => Err(StagelockError::Format(
                "stage has an envelope but no keys".into(),
            )),
        }
    }
}

impl From<&StageNode> for StageDoc {
    fn from(node: &StageNode) -> Self {
        match node {
            StageNode::Terminal { display } => Self {
                text: display.clone(),
                keys: None,
                envelope: None,
            },
            StageNode::Locked {
                display,
                candidates,
                envelope,
            } => Self {
                text: display.clone(),
                keys: Some(
                    candidates
                        .iter()
                        .map(|c| KeyDoc {
                            salt: c.salt.clone(),
                            iv: c.iv.clone(),
                            data: c.wrapped_key.clone(),
                        })
                        .collect(),
                ),
                envelope: Some(EnvelopeDoc {
                    iv: envelope.iv.clone(),
                    data: envelope.payload.clone(),
                }),
            },
        }
    }
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(s.as_bytes())
            .map_err(|e| D::Error::custom(format!("base64 decode: {e}")))
    }
}
