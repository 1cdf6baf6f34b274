//! The ring and cluster error kinds, realized as a plain enum rather than
//! `thiserror`/`anyhow` — propagated as `Box<dyn Error>` and `tonic::Status`
//! directly.

use std::fmt;

use tonic::Status;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistorageError {
    /// Any RPC transport failure: unreachable peer, closed mid-call.
    Connection(String),
    /// Cluster secret mismatch, or user password mismatch.
    Auth(String),
    /// Key absent at the owner.
    NotFound(String),
    /// `store` with `overwrite=false` hit an existing key.
    Conflict(String),
    /// Write suppressed because `check_removed` matched a tombstone.
    Tombstoned(String),
    /// DHT or peer call received before the caller completed `register`.
    NotRegistered(String),
    /// Malformed input: null value, bad IP, etc.
    InvalidInput(String),
}

impl fmt::Display for DistorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistorageError::Connection(m) => write!(f, "connection error: {m}"),
            DistorageError::Auth(m) => write!(f, "auth error: {m}"),
            DistorageError::NotFound(m) => write!(f, "not found: {m}"),
            DistorageError::Conflict(m) => write!(f, "conflict: {m}"),
            DistorageError::Tombstoned(m) => write!(f, "tombstoned: {m}"),
            DistorageError::NotRegistered(m) => write!(f, "not registered: {m}"),
            DistorageError::InvalidInput(m) => write!(f, "invalid input: {m}"),
        }
    }
}

impl std::error::Error for DistorageError {}

impl DistorageError {
    /// Short human string for the `msg` field of the uniform `(data, ok,
    /// msg)` response triple.
    pub fn as_msg(&self) -> String {
        match self {
            DistorageError::Tombstoned(_) => crate::utils::constants::TOMBSTONED_MSG.to_string(),
            other => other.to_string(),
        }
    }

    /// Whether this error should still be reported as `ok=true` to the
    /// caller (tombstone suppression is a benign, expected outcome, not a failure).
    pub fn is_benign_ok(&self) -> bool {
        matches!(self, DistorageError::Tombstoned(_))
    }
}

impl From<tonic::transport::Error> for DistorageError {
    fn from(e: tonic::transport::Error) -> Self {
        DistorageError::Connection(e.to_string())
    }
}

impl From<Status> for DistorageError {
    fn from(s: Status) -> Self {
        match s.code() {
            tonic::Code::Unavailable | tonic::Code::DeadlineExceeded | tonic::Code::Cancelled => {
                DistorageError::Connection(s.message().to_string())
            }
            tonic::Code::Unauthenticated | tonic::Code::PermissionDenied => {
                DistorageError::Auth(s.message().to_string())
            }
            tonic::Code::NotFound => DistorageError::NotFound(s.message().to_string()),
            tonic::Code::AlreadyExists => DistorageError::Conflict(s.message().to_string()),
            tonic::Code::FailedPrecondition => DistorageError::NotRegistered(s.message().to_string()),
            tonic::Code::InvalidArgument => DistorageError::InvalidInput(s.message().to_string()),
            _ => DistorageError::Connection(s.message().to_string()),
        }
    }
}

impl From<DistorageError> for Status {
    fn from(e: DistorageError) -> Self {
        match e {
            DistorageError::Connection(m) => Status::unavailable(m),
            DistorageError::Auth(m) => Status::unauthenticated(m),
            DistorageError::NotFound(m) => Status::not_found(m),
            DistorageError::Conflict(m) => Status::already_exists(m),
            DistorageError::Tombstoned(m) => Status::ok(m),
            DistorageError::NotRegistered(m) => Status::failed_precondition(m),
            DistorageError::InvalidInput(m) => Status::invalid_argument(m),
        }
    }
}

pub type Result<T> = std::result::Result<T, DistorageError>;
