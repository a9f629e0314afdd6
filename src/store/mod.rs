//! Storage port for requesters, approvers and requests.
//!
//! Each call is atomic on its own. `set_request_status` only moves a request out of
//! `Pending`, so when two deciders race at most one of them succeeds.
use crate::domain::{Approver, Request, Requester};
use std::collections::BTreeSet;

use crate::error::{Entity, StoreError};
use crate::types::{Status, TimeStamp, TypeTag};

mod memory;
mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

pub trait Storage: Send + Sync {
    fn put_requester(&self, requester: &Requester) -> Result<(), StoreError>;

    fn get_requester(&self, id: &str) -> Result<Requester, StoreError>;

    /// Deletes the requester and every request that references it.
    fn delete_requester(&self, id: &str) -> Result<(), StoreError>;

    /// Inserts a request. Its requester must already be stored.
    fn put_request(&self, request: &Request) -> Result<(), StoreError>;

    /// Loads a request together with its requester.
    fn get_request(&self, id: &str) -> Result<Request, StoreError>;

    /// Moves a pending request to `status`, failing with [`StoreError::NotPending`]
    /// if another decision got there first.
    fn set_request_status(&self, id: &str, status: Status) -> Result<(), StoreError>;

    fn put_approver(&self, approver: &Approver) -> Result<(), StoreError>;

    fn get_approver(&self, id: &str) -> Result<Approver, StoreError>;

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A request as persisted: the requester is referenced by id, not embedded.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub(crate) struct RequestRow {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub requester_id: String,
    #[n(2)]
    pub request_type: TypeTag,
    #[n(3)]
    pub status: Status,
    #[n(4)]
    pub expiration_date: TimeStamp,
}

impl RequestRow {
    pub fn from_request(request: &Request) -> Self {
        Self {
            id: request.id().to_string(),
            requester_id: request.requester().id().to_string(),
            request_type: request.request_type(),
            status: request.status(),
            expiration_date: request.expiration_date(),
        }
    }
    pub fn into_request(self, requester: Requester) -> Request {
        Request::with_status(
            self.id,
            requester,
            self.request_type,
            self.expiration_date,
            self.status,
        )
    }
}

/// An approver as persisted. Decoding goes back through [`Approver::new`].
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub(crate) struct ApproverRow {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub allowed_types: BTreeSet<TypeTag>,
}

impl ApproverRow {
    pub fn from_approver(approver: &Approver) -> Self {
        Self {
            id: approver.id().to_string(),
            name: approver.name().to_string(),
            allowed_types: approver.allowed_types().clone(),
        }
    }
    pub fn into_approver(self) -> Result<Approver, StoreError> {
        let id = self.id.clone();
        Approver::new(self.id, self.name, self.allowed_types).map_err(|source| {
            StoreError::InvalidRow {
                entity: Entity::Approver,
                id,
                source,
            }
        })
    }
}

/// Shared precondition for `set_request_status` implementations.
pub(crate) fn check_transition(
    id: &str,
    current: Status,
    next: Status,
) -> Result<(), StoreError> {
    if !next.is_terminal() {
        return Err(StoreError::InvalidTransition(next));
    }
    if current != Status::Pending {
        return Err(StoreError::NotPending {
            id: id.to_string(),
            status: current,
        });
    }
    Ok(())
}
