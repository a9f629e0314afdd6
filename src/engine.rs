//! Authorization and lifecycle rules for requests.
//!
//! Both checks are pure: they see only their arguments, including the instant `now`
//! against which expiry is judged. Checks run in a fixed order and the first failure
//! is reported.
use chrono::{DateTime, Utc};

use crate::domain::{Approver, Request, Requester};
use crate::error::Rejection;
use crate::types::{Decision, Status, TimeStamp, TypeTag};

/// Decide whether `requester` may open a request of `candidate_type` expiring at `expiration`.
///
/// The expiration must lie strictly after `now`, and the type must equal the requester's role.
pub fn validate_creation(
    requester: &Requester,
    candidate_type: TypeTag,
    expiration: TimeStamp,
    now: DateTime<Utc>,
) -> Result<(), Rejection> {
    check_expiration(expiration, now)?;
    check_role(requester, candidate_type)
}

/// First creation rule. It needs no stored state, so callers can run it before any lookup.
pub fn check_expiration(expiration: TimeStamp, now: DateTime<Utc>) -> Result<(), Rejection> {
    if expiration.to_datetime_utc() <= now {
        return Err(Rejection::Expired);
    }
    Ok(())
}

pub fn check_role(requester: &Requester, candidate_type: TypeTag) -> Result<(), Rejection> {
    if candidate_type != requester.role() {
        return Err(Rejection::TypeRoleMismatch);
    }
    Ok(())
}

/// Decide whether `approver` may apply `decision` to `request`, returning the status it moves to.
pub fn decide(
    request: &Request,
    approver: &Approver,
    decision: Decision,
    now: DateTime<Utc>,
) -> Result<Status, Rejection> {
    if request.is_expired_at(now) {
        return Err(Rejection::Expired);
    }
    if request.status() != Status::Pending {
        return Err(Rejection::AlreadyProcessed);
    }
    if !approver.permits(request.request_type()) {
        return Err(Rejection::TypeNotPermitted);
    }
    // Requests from role A requesters cannot be decided by anyone. Kept as-is pending
    // product clarification.
    if request.requester().role() == TypeTag::A {
        return Err(Rejection::RequesterRoleForbidden);
    }

    Ok(decision.target_status())
}
