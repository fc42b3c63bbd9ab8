use thiserror::Error;

/// Coarse error categories shared by the HTTP layer and idempotent callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    Expired,
    Crypto,
    ExternalService,
    NotFound,
    Config,
    Storage,
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// Caller input outside the contract
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested more distinct winners than the guess range holds
    #[error("Range error: {0}")]
    Range(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Second share of the same item or second guess in the same game
    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Game is not open: {0}")]
    GameNotOpen(String),

    /// Winning values are still sealed
    #[error("Game has not been revealed: {0}")]
    NotRevealed(String),

    #[error("Reward already claimed")]
    AlreadyClaimed,

    #[error("Cannot mark as delivered before the winner claims")]
    NotClaimed,

    #[error("Reward already marked as delivered")]
    AlreadyDelivered,

    #[error("Messaging period has expired")]
    MessagingExpired,

    #[error("{0} period has expired")]
    Expired(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) | EngineError::Range(_) => ErrorKind::Validation,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Duplicate(_)
            | EngineError::RateLimited(_)
            | EngineError::GameNotOpen(_)
            | EngineError::NotRevealed(_)
            | EngineError::AlreadyClaimed
            | EngineError::NotClaimed
            | EngineError::AlreadyDelivered
            | EngineError::MessagingExpired => ErrorKind::StateConflict,
            EngineError::Expired(_) => ErrorKind::Expired,
            EngineError::Encrypt(_) | EngineError::Decrypt(_) => ErrorKind::Crypto,
            EngineError::Notification(_) => ErrorKind::ExternalService,
            EngineError::Config(_) => ErrorKind::Config,
            EngineError::Storage(_) | EngineError::Serialization(_) => ErrorKind::Storage,
        }
    }

    /// Rejected operations that an idempotent caller may treat as a no-op.
    pub fn is_state_conflict(&self) -> bool {
        self.kind() == ErrorKind::StateConflict
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::StateConflict => match self {
                EngineError::RateLimited(_) => 429,
                _ => 409,
            },
            ErrorKind::Expired => 410,
            ErrorKind::ExternalService => 502,
            ErrorKind::Crypto | ErrorKind::Config | ErrorKind::Storage => 500,
        }
    }
}
