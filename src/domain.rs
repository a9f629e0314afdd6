//! Requester, approver and request records
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::types::{Status, TimeStamp, TypeTag};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    #[n(0)]
    id: String,
    #[n(1)]
    name: String,
    #[n(2)]
    role: TypeTag,
}

/// Only built through [`Approver::new`], so the allowed set is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approver {
    id: String,
    name: String,
    allowed_types: BTreeSet<TypeTag>,
}

/// A typed, time-bounded request. Holds a copy of its requester as loaded from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    id: String,
    requester: Requester,
    request_type: TypeTag,
    expiration_date: TimeStamp,
    status: Status,
}

impl Requester {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: TypeTag) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn role(&self) -> TypeTag {
        self.role
    }
}

impl Approver {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        allowed_types: impl IntoIterator<Item = TypeTag>,
    ) -> Result<Self, ValidationError> {
        let allowed_types: BTreeSet<TypeTag> = allowed_types.into_iter().collect();
        if allowed_types.is_empty() {
            return Err(ValidationError::EmptyAllowedTypes);
        }

        Ok(Self {
            id: id.into(),
            name: name.into(),
            allowed_types,
        })
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn allowed_types(&self) -> &BTreeSet<TypeTag> {
        &self.allowed_types
    }
    pub fn permits(&self, request_type: TypeTag) -> bool {
        self.allowed_types.contains(&request_type)
    }
}

impl Request {
    /// A fresh request in the `Pending` state.
    pub fn new(
        id: impl Into<String>,
        requester: Requester,
        request_type: TypeTag,
        expiration_date: TimeStamp,
    ) -> Self {
        Self::with_status(id, requester, request_type, expiration_date, Status::Pending)
    }
    /// Rebuilds a persisted request. Storage backends use this when loading rows.
    pub fn with_status(
        id: impl Into<String>,
        requester: Requester,
        request_type: TypeTag,
        expiration_date: TimeStamp,
        status: Status,
    ) -> Self {
        Self {
            id: id.into(),
            requester,
            request_type,
            expiration_date,
            status,
        }
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn requester(&self) -> &Requester {
        &self.requester
    }
    pub fn request_type(&self) -> TypeTag {
        self.request_type
    }
    pub fn expiration_date(&self) -> TimeStamp {
        self.expiration_date
    }
    pub fn status(&self) -> Status {
        self.status
    }
    /// Re-evaluated against the wall clock on every call.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.to_datetime_utc() < now
    }
}
