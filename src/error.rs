use std::convert::Infallible;
use std::fmt;

use crate::types::Status;

/// Invalid input to a constructor or parser.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Approver must be allowed at least one request type")]
    EmptyAllowedTypes,
    #[error("Unknown type tag '{0}', expected one of A, B, C")]
    UnknownTypeTag(String),
    #[error("Unknown status '{0}', expected one of PENDING, APPROVED, REJECTED")]
    UnknownStatus(String),
}

/// Why the engine refused to create or decide a request.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("Request is expired")]
    Expired,
    #[error("Request is already processed")]
    AlreadyProcessed,
    #[error("Request type must match requester role")]
    TypeRoleMismatch,
    #[error("Approver is not allowed to approve this request type")]
    TypeNotPermitted,
    #[error("Approver cannot approve request created by Requester of type A")]
    RequesterRoleForbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Requester,
    Request,
    Approver,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Requester => "Requester",
            Entity::Request => "Request",
            Entity::Approver => "Approver",
        })
    }
}

/// Failures reported by a storage backend.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },
    #[error("{entity} with id {id} already exists")]
    DuplicateId { entity: Entity, id: String },
    #[error("Request references unknown requester {requester_id}")]
    ForeignKeyMissing { requester_id: String },
    #[error("Request {id} is {status}, expected PENDING")]
    NotPending { id: String, status: Status },
    #[error("Cannot transition a request to {0}")]
    InvalidTransition(Status),
    #[error(transparent)]
    Backend(#[from] sled::Error),
    #[error("failed to encode row: {0}")]
    Encode(#[from] minicbor::encode::Error<Infallible>),
    #[error("failed to decode row: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("stored {entity} {id} is invalid: {source}")]
    InvalidRow {
        entity: Entity,
        id: String,
        source: ValidationError,
    },
}

impl From<sled::transaction::TransactionError<StoreError>> for StoreError {
    fn from(err: sled::transaction::TransactionError<StoreError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(inner) => StoreError::Backend(inner),
        }
    }
}

/// Error returned by the service façades.
#[derive(thiserror::Error, Debug)]
pub enum ApprovalError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Flat classification of [`ApprovalError`] for callers that branch on the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    DuplicateId,
    ForeignKeyMissing,
    Expired,
    AlreadyProcessed,
    TypeRoleMismatch,
    TypeNotPermitted,
    RequesterRoleForbidden,
    Invalid,
    Storage,
}

impl ApprovalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApprovalError::Store(err) => match err {
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::DuplicateId { .. } => ErrorKind::DuplicateId,
                StoreError::ForeignKeyMissing { .. } => ErrorKind::ForeignKeyMissing,
                StoreError::NotPending { .. } => ErrorKind::AlreadyProcessed,
                StoreError::InvalidTransition(_) => ErrorKind::Invalid,
                StoreError::Backend(_)
                | StoreError::Encode(_)
                | StoreError::Decode(_)
                | StoreError::InvalidRow { .. } => ErrorKind::Storage,
            },
            ApprovalError::Rejected(rejection) => match rejection {
                Rejection::Expired => ErrorKind::Expired,
                Rejection::AlreadyProcessed => ErrorKind::AlreadyProcessed,
                Rejection::TypeRoleMismatch => ErrorKind::TypeRoleMismatch,
                Rejection::TypeNotPermitted => ErrorKind::TypeNotPermitted,
                Rejection::RequesterRoleForbidden => ErrorKind::RequesterRoleForbidden,
            },
            ApprovalError::Invalid(_) => ErrorKind::Invalid,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            ApprovalError::Rejected(rejection) => Some(*rejection),
            _ => None,
        }
    }
}
