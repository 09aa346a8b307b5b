use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonStashError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("No records found for dataset: {dataset}")]
    DatasetNotFound { dataset: String },
    #[error("field '{field}' not found in record {position}")]
    MissingField { field: String, position: usize },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("log encoding error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Coarse classification used by transports to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ClientError,
    NotFound,
    ServerError,
}

impl JsonStashError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JsonStashError::InvalidArgument(_) | JsonStashError::MissingField { .. } => {
                ErrorKind::ClientError
            }
            JsonStashError::DatasetNotFound { .. } => ErrorKind::NotFound,
            JsonStashError::Serialization(_)
            | JsonStashError::Deserialization(_)
            | JsonStashError::Store(_)
            | JsonStashError::Io(_)
            | JsonStashError::Bincode(_) => ErrorKind::ServerError,
        }
    }
}

pub type Result<T> = std::result::Result<T, JsonStashError>;
