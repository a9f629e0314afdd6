//! Service layer API for requesters, approvers and the request lifecycle
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::domain::{Approver, Request, Requester};
use crate::engine;
use crate::error::{ApprovalError, Rejection, StoreError};
use crate::store::Storage;
use crate::types::{Decision, Status, TimeStamp, TypeTag};

pub struct RequesterService<S: Storage + ?Sized> {
    store: Arc<S>,
}

pub struct ApproverService<S: Storage + ?Sized> {
    store: Arc<S>,
}

pub struct RequestService<S: Storage + ?Sized> {
    store: Arc<S>,
}

/// The three services sharing one store handle. The caller owns the store's lifecycle.
pub struct Services<S: Storage + ?Sized> {
    pub requests: RequestService<S>,
    pub requesters: RequesterService<S>,
    pub approvers: ApproverService<S>,
}

impl<S: Storage + ?Sized> Services<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            requests: RequestService::new(store.clone()),
            requesters: RequesterService::new(store.clone()),
            approvers: ApproverService::new(store),
        }
    }
}

impl<S: Storage + ?Sized> RequesterService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, requester), fields(requester_id = requester.id()))]
    pub fn create(&self, requester: &Requester) -> Result<(), ApprovalError> {
        self.store.put_requester(requester)?;
        info!(role = %requester.role(), "requester created");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Requester, ApprovalError> {
        Ok(self.store.get_requester(id)?)
    }

    /// Removes the requester along with all of its requests.
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<(), ApprovalError> {
        self.store.delete_requester(id)?;
        info!("requester deleted");
        Ok(())
    }
}

impl<S: Storage + ?Sized> ApproverService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, approver), fields(approver_id = approver.id()))]
    pub fn create(&self, approver: &Approver) -> Result<(), ApprovalError> {
        self.store.put_approver(approver)?;
        info!(allowed_types = ?approver.allowed_types(), "approver created");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Approver, ApprovalError> {
        Ok(self.store.get_approver(id)?)
    }
}

impl<S: Storage + ?Sized> RequestService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn get(&self, id: &str) -> Result<Request, ApprovalError> {
        Ok(self.store.get_request(id)?)
    }

    /// Persist a new request after checking it against its stored requester.
    ///
    /// Only the id, requester id, type and expiration are taken from `request`. The row is
    /// always stored as PENDING with the requester as currently stored.
    pub fn create(&self, request: &Request) -> Result<(), ApprovalError> {
        self.create_at(request, Utc::now())
    }

    pub fn create_at(&self, request: &Request, now: DateTime<Utc>) -> Result<(), ApprovalError> {
        if request.status() != Status::Pending {
            debug!(request_id = request.id(), status = %request.status(), "status reset to pending");
        }
        self.persist_new(
            request.id().to_string(),
            request.requester().id(),
            request.request_type(),
            request.expiration_date(),
            now,
        )?;
        Ok(())
    }

    /// Open a request on behalf of a stored requester, returning what was persisted.
    pub fn submit(
        &self,
        id: impl Into<String>,
        requester_id: &str,
        request_type: TypeTag,
        expiration_date: TimeStamp,
    ) -> Result<Request, ApprovalError> {
        self.persist_new(id.into(), requester_id, request_type, expiration_date, Utc::now())
    }

    // Expiry first, then the requester lookup, then the role.
    #[instrument(skip(self, id), fields(request_id = %id))]
    fn persist_new(
        &self,
        id: String,
        requester_id: &str,
        request_type: TypeTag,
        expiration_date: TimeStamp,
        now: DateTime<Utc>,
    ) -> Result<Request, ApprovalError> {
        if let Err(rejection) = engine::check_expiration(expiration_date, now) {
            warn!(%rejection, "request creation rejected");
            return Err(rejection.into());
        }
        let requester = self.stored_requester(requester_id)?;
        if let Err(rejection) = engine::check_role(&requester, request_type) {
            warn!(%rejection, "request creation rejected");
            return Err(rejection.into());
        }

        let request = Request::new(id, requester, request_type, expiration_date);
        self.store.put_request(&request)?;
        info!(
            request_type = %request.request_type(),
            expires = %request.expiration_date(),
            "request created"
        );
        Ok(request)
    }

    /// Approve or reject a pending request on behalf of `approver`, returning the new status.
    pub fn process(
        &self,
        request_id: &str,
        approver: &Approver,
        decision: Decision,
    ) -> Result<Status, ApprovalError> {
        self.process_at(request_id, approver, decision, Utc::now())
    }

    #[instrument(skip(self, approver), fields(approver_id = approver.id()))]
    pub fn process_at(
        &self,
        request_id: &str,
        approver: &Approver,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<Status, ApprovalError> {
        let request = self.get(request_id)?;

        let status = match engine::decide(&request, approver, decision, now) {
            Ok(status) => status,
            Err(rejection) => {
                warn!(%rejection, "decision rejected");
                return Err(rejection.into());
            }
        };

        match self.store.set_request_status(request.id(), status) {
            Ok(()) => {}
            Err(StoreError::NotPending { .. }) => {
                warn!("request was decided concurrently");
                return Err(Rejection::AlreadyProcessed.into());
            }
            Err(err) => return Err(err.into()),
        }

        info!(%status, "request processed");
        Ok(status)
    }

    fn stored_requester(&self, requester_id: &str) -> Result<Requester, ApprovalError> {
        match self.store.get_requester(requester_id) {
            Ok(requester) => Ok(requester),
            Err(StoreError::NotFound { .. }) => Err(StoreError::ForeignKeyMissing {
                requester_id: requester_id.to_string(),
            }
            .into()),
            Err(err) => Err(err.into()),
        }
    }
}
