use crate::*;

use thiserror::Error;
use uuid::Uuid;

/// Coarse error classes, used by callers to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input shape
    Configuration,
    /// Operation outside its legal phase, or a duplicate per-phase submission
    State,
    /// Cryptographic verification failure
    Proof,
    /// Missing election, trustee, ballot or option
    NotFound,
    /// Not enough shares to finish decryption
    Completeness,
    /// Unauthorized or wrong caller
    Identity,
}

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("tallyguard: invalid threshold {threshold} for {trustees} trustees")]
    InvalidThreshold { threshold: u32, trustees: u32 },

    #[error("tallyguard: invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("tallyguard: invalid group parameters: {0}")]
    InvalidGroup(String),

    #[error("tallyguard: ballot shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("tallyguard: malformed wire value: {0}")]
    Malformed(String),

    #[error("tallyguard: invalid hex: {0}")]
    BadHex(#[from] hex::FromHexError),

    #[error("tallyguard: invalid integer: {0}")]
    BadInteger(#[from] std::num::ParseIntError),

    #[error("tallyguard: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tallyguard: timestamp {timestamp} outside voting window [{start}, {now}]")]
    TimestampOutOfRange { timestamp: u64, start: u64, now: u64 },

    #[error("tallyguard: election is in phase {actual:?}, expected {expected:?}")]
    WrongPhase { expected: Phase, actual: Phase },

    #[error("tallyguard: illegal phase transition from {from:?} to {to:?}")]
    IllegalTransition { from: Phase, to: Phase },

    #[error("tallyguard: transition to {to:?} refused: {reason}")]
    TransitionRefused { to: Phase, reason: String },

    #[error("tallyguard: trustee {0} already submitted for this phase")]
    DuplicateSubmission(u32),

    #[error("tallyguard: voter {0} has already submitted a ballot")]
    AlreadyVoted(String),

    #[error("tallyguard: ballot {0} has already been submitted")]
    BallotAlreadySubmitted(String),

    #[error("tallyguard: {0} proof failed to verify")]
    ProofFailed(String),

    #[error("tallyguard: backup from trustee {sender} failed verification")]
    BackupVerificationFailed { sender: u32 },

    #[error("tallyguard: transport decryption failed")]
    TransportDecryption,

    #[error("tallyguard: discrete log not found within {0} steps")]
    DiscreteLogExhausted(u64),

    #[error("tallyguard: election {0} not found")]
    ElectionNotFound(Uuid),

    #[error("tallyguard: trustee {0} not found")]
    TrusteeNotFound(u32),

    #[error("tallyguard: ballot {0} not found")]
    BallotNotFound(String),

    #[error("tallyguard: voter {0} not found")]
    VoterNotFound(String),

    #[error("tallyguard: contest or option {0} not found")]
    SelectionNotFound(String),

    #[error("tallyguard: not enough trustees available: need {needed}, found {available}")]
    NotEnoughTrustees { needed: u32, available: u32 },

    #[error("tallyguard: missing decryption share: {0}")]
    MissingShare(String),

    #[error("tallyguard: caller {0} is not authorized for this operation")]
    Unauthorized(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            InvalidThreshold { .. }
            | InvalidManifest(_)
            | InvalidGroup(_)
            | ShapeMismatch(_)
            | Malformed(_)
            | BadHex(_)
            | BadInteger(_)
            | Json(_)
            | TimestampOutOfRange { .. } => ErrorKind::Configuration,
            WrongPhase { .. }
            | IllegalTransition { .. }
            | TransitionRefused { .. }
            | DuplicateSubmission(_)
            | AlreadyVoted(_)
            | BallotAlreadySubmitted(_) => ErrorKind::State,
            ProofFailed(_)
            | BackupVerificationFailed { .. }
            | TransportDecryption
            | DiscreteLogExhausted(_) => ErrorKind::Proof,
            ElectionNotFound(_)
            | TrusteeNotFound(_)
            | BallotNotFound(_)
            | VoterNotFound(_)
            | SelectionNotFound(_) => ErrorKind::NotFound,
            NotEnoughTrustees { .. } | MissingShare(_) => ErrorKind::Completeness,
            Unauthorized(_) => ErrorKind::Identity,
        }
    }
}

impl From<aes_gcm::aead::Error> for Error {
    fn from(_: aes_gcm::aead::Error) -> Self {
        Error::TransportDecryption
    }
}
