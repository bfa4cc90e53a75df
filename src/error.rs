use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Validation failures (`InvalidBlock`, `InvalidTx`, `InsufficientFunds`) are local:
/// a handler logs them and moves on, replying `ACK` regardless. Infrastructure
/// failures (`StoreIoError`, `TransportError`, `MalformedMessage`) are fatal to the
/// node process.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid transaction: {0}")]
    InvalidTx(String),

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },

    #[error("store io error: {0}")]
    StoreIoError(#[from] sled::Error),

    #[error("store is inconsistent: {0}")]
    StoreInconsistent(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] Box<bincode::ErrorKind>),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("cryptographic error: {0}")]
    CryptoError(String),
}

impl From<crate::blockchain::transaction::TxError> for NodeError {
    fn from(error: crate::blockchain::transaction::TxError) -> Self {
        NodeError::InvalidTx(format!("{}", error))
    }
}

impl From<crate::blockchain::block::BlockError> for NodeError {
    fn from(error: crate::blockchain::block::BlockError) -> Self {
        NodeError::InvalidBlock(format!("{}", error))
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
