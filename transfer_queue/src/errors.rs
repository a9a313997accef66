use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced while transferring objects.
///
/// The type is `Clone` so the queue can hand out its aggregated error list any number of
/// times; `io::Error` is kept behind an `Arc` for that reason.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    #[error("Network Error: {0}")]
    Network(String),

    #[error("Storage Error: {0}")]
    Storage(String),

    /// The server asked for the request to be repeated no earlier than `retry_at`
    /// (e.g. a rate limit with `Retry-After`).
    #[error("Rate limited until {retry_at}: {message}")]
    RetriableLater { message: String, retry_at: DateTime<Utc> },

    #[error("Batch API returned HTTP {status}: {message}")]
    BatchApiStatus { status: u16, message: String },

    #[error("Batch API Error: {0}")]
    BatchApi(String),

    #[error("[{oid}] Object error {code}: {message}")]
    ObjectError { oid: String, code: i32, message: String },

    #[error("[{0}] The server returned an unknown OID")]
    UnknownObject(String),

    #[error("[{0}] The server response did not include this object")]
    MissingFromResponse(String),

    #[error("Action {rel:?} expired at {expires_at}")]
    ActionExpired { rel: String, expires_at: DateTime<Utc> },

    #[error("Unable to find source for object {oid} ({name})")]
    MissingObject { name: String, oid: String },

    #[error("Corrupt object {name} ({oid}): expected {expected} bytes, found {actual}")]
    CorruptObject {
        name: String,
        oid: String,
        expected: u64,
        actual: u64,
    },

    #[error("Transfer adapter {0:?} is not registered")]
    AdapterNotFound(String),

    #[error("Transfer Adapter Error: {0}")]
    AdapterError(String),

    #[error("IO Error: {0}")]
    IOError(Arc<io::Error>),

    #[error("[{oid}] {source}")]
    Object {
        oid: String,
        #[source]
        source: Box<TransferError>,
    },

    #[error("Transfer queue has already finished")]
    QueueFinished,

    #[error("Batcher has been closed")]
    BatcherClosed,

    #[error("Internal Error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, TransferError>;

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        TransferError::IOError(Arc::new(e))
    }
}

impl From<tokio::task::JoinError> for TransferError {
    fn from(e: tokio::task::JoinError) -> Self {
        TransferError::InternalError(format!("background task failed: {e}"))
    }
}

impl TransferError {
    pub fn network(e: impl std::fmt::Display) -> Self {
        TransferError::Network(e.to_string())
    }

    pub fn adapter(e: impl std::fmt::Display) -> Self {
        TransferError::AdapterError(e.to_string())
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        TransferError::InternalError(e.to_string())
    }

    /// Whether another attempt at the same operation may succeed.
    ///
    /// Collaborators signal a transient failure by picking a retriable variant; everything
    /// else is treated as permanent.
    pub fn is_retriable(&self) -> bool {
        match self {
            TransferError::Network(_)
            | TransferError::Storage(_)
            | TransferError::RetriableLater { .. }
            | TransferError::ActionExpired { .. } => true,
            TransferError::BatchApiStatus { status, .. } => *status >= 500 || *status == 429,
            TransferError::IOError(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            TransferError::Object { source, .. } => source.is_retriable(),
            _ => false,
        }
    }

    /// The earliest time a retry may be attempted, when the server dictated one.
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        match self {
            TransferError::RetriableLater { retry_at, .. } => Some(*retry_at),
            TransferError::Object { source, .. } => source.retry_at(),
            _ => None,
        }
    }

    /// The object this error is about, if it is scoped to one.
    pub fn oid(&self) -> Option<&str> {
        match self {
            TransferError::ObjectError { oid, .. }
            | TransferError::MissingObject { oid, .. }
            | TransferError::CorruptObject { oid, .. }
            | TransferError::Object { oid, .. } => Some(oid),
            TransferError::UnknownObject(oid) | TransferError::MissingFromResponse(oid) => Some(oid),
            _ => None,
        }
    }

    /// Scopes this error to `oid` unless it already names an object.
    pub fn for_object(self, oid: &str) -> Self {
        if self.oid().is_some() {
            return self;
        }
        TransferError::Object {
            oid: oid.to_owned(),
            source: Box::new(self),
        }
    }
}
