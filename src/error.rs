use std::fmt;

/// Custom error types for the sharded ledger
#[derive(Debug, Clone)]
pub enum LedgerError {
    /// Invalid block hash
    InvalidHash(String),
    /// Invalid proof of work
    InvalidProofOfWork(String),
    /// Invalid block index
    InvalidIndex { expected: u64, found: u64 },
    /// Invalid previous hash
    InvalidPreviousHash { expected: String, found: String },
    /// Block validation failed
    BlockValidationFailed(String),
    /// Chain validation failed
    ChainValidationFailed(String),
    /// Transaction validation failed
    TransactionValidationFailed(String),
    /// Address does not start with a hex nibble and cannot be routed
    MalformedAddress(String),
    /// Asset is not known to the balance book
    UnknownAsset(String),
    /// Insufficient balance for transaction
    InsufficientBalance { address: String, balance: f64, required: f64 },
    /// Credit would allocate more native asset than the fixed total supply
    SupplyExceeded { requested: f64, remaining: f64 },
    /// Invalid signature
    InvalidSignature(String),
    /// Invalid difficulty level
    InvalidDifficulty(u32),
    /// Shard id out of range
    ShardNotFound(u32),
    /// Cross-shard settlement aborted during prepare
    CrossShardAborted(String),
    /// Nonce search was cancelled before a seal was found
    MiningCancelled,
    /// Serialization error
    SerializationError(String),
    /// Cryptographic operation failed
    CryptoError(String),
    /// Invalid input
    InvalidInput(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::InvalidHash(msg) => write!(f, "Invalid hash: {}", msg),
            LedgerError::InvalidProofOfWork(msg) => write!(f, "Invalid proof of work: {}", msg),
            LedgerError::InvalidIndex { expected, found } => {
                write!(f, "Invalid block index: expected {}, found {}", expected, found)
            }
            LedgerError::InvalidPreviousHash { expected, found } => {
                write!(f, "Invalid previous hash: expected {}, found {}", expected, found)
            }
            LedgerError::BlockValidationFailed(msg) => write!(f, "Block validation failed: {}", msg),
            LedgerError::ChainValidationFailed(msg) => write!(f, "Chain validation failed: {}", msg),
            LedgerError::TransactionValidationFailed(msg) => {
                write!(f, "Transaction validation failed: {}", msg)
            }
            LedgerError::MalformedAddress(address) => {
                write!(f, "Malformed address: {}", address)
            }
            LedgerError::UnknownAsset(asset) => write!(f, "Unknown asset: {}", asset),
            LedgerError::InsufficientBalance { address, balance, required } => {
                write!(f, "Insufficient balance for {}: have {}, need {}", address, balance, required)
            }
            LedgerError::SupplyExceeded { requested, remaining } => {
                write!(f, "Credit of {} exceeds remaining supply {}", requested, remaining)
            }
            LedgerError::InvalidSignature(msg) => write!(f, "Invalid signature: {}", msg),
            LedgerError::InvalidDifficulty(difficulty) => {
                write!(f, "Invalid difficulty level: {}", difficulty)
            }
            LedgerError::ShardNotFound(id) => write!(f, "Shard {} not found", id),
            LedgerError::CrossShardAborted(msg) => {
                write!(f, "Cross-shard settlement aborted: {}", msg)
            }
            LedgerError::MiningCancelled => write!(f, "Mining cancelled"),
            LedgerError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            LedgerError::CryptoError(msg) => write!(f, "Crypto error: {}", msg),
            LedgerError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::SerializationError(err.to_string())
    }
}

impl From<rsa::Error> for LedgerError {
    fn from(err: rsa::Error) -> Self {
        LedgerError::CryptoError(err.to_string())
    }
}

impl From<hex::FromHexError> for LedgerError {
    fn from(err: hex::FromHexError) -> Self {
        LedgerError::SerializationError(err.to_string())
    }
}
