use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{RequestRow, Storage, check_transition};
use crate::domain::{Approver, Request, Requester};
use crate::error::{Entity, StoreError};
use crate::types::Status;

/// In-process backend. A single lock covers all three relations, so every call is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    requesters: HashMap<String, Requester>,
    requests: HashMap<String, RequestRow>,
    approvers: HashMap<String, Approver>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // a panic mid-call cannot leave a half-applied write, so poisoning is ignored
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for MemoryStore {
    fn put_requester(&self, requester: &Requester) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.requesters.contains_key(requester.id()) {
            return Err(StoreError::DuplicateId {
                entity: Entity::Requester,
                id: requester.id().to_string(),
            });
        }
        tables
            .requesters
            .insert(requester.id().to_string(), requester.clone());
        Ok(())
    }

    fn get_requester(&self, id: &str) -> Result<Requester, StoreError> {
        self.tables()
            .requesters
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: Entity::Requester,
                id: id.to_string(),
            })
    }

    fn delete_requester(&self, id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.requesters.remove(id).is_none() {
            return Err(StoreError::NotFound {
                entity: Entity::Requester,
                id: id.to_string(),
            });
        }
        tables.requests.retain(|_, row| row.requester_id != id);
        Ok(())
    }

    fn put_request(&self, request: &Request) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.requests.contains_key(request.id()) {
            return Err(StoreError::DuplicateId {
                entity: Entity::Request,
                id: request.id().to_string(),
            });
        }
        let requester_id = request.requester().id();
        if !tables.requesters.contains_key(requester_id) {
            return Err(StoreError::ForeignKeyMissing {
                requester_id: requester_id.to_string(),
            });
        }
        tables
            .requests
            .insert(request.id().to_string(), RequestRow::from_request(request));
        Ok(())
    }

    fn get_request(&self, id: &str) -> Result<Request, StoreError> {
        let tables = self.tables();
        let not_found = || StoreError::NotFound {
            entity: Entity::Request,
            id: id.to_string(),
        };
        let row = tables.requests.get(id).ok_or_else(not_found)?;
        let requester = tables
            .requesters
            .get(&row.requester_id)
            .ok_or_else(not_found)?;

        Ok(row.clone().into_request(requester.clone()))
    }

    fn set_request_status(&self, id: &str, status: Status) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let row = tables
            .requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: Entity::Request,
                id: id.to_string(),
            })?;
        check_transition(id, row.status, status)?;
        row.status = status;
        Ok(())
    }

    fn put_approver(&self, approver: &Approver) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.approvers.contains_key(approver.id()) {
            return Err(StoreError::DuplicateId {
                entity: Entity::Approver,
                id: approver.id().to_string(),
            });
        }
        tables
            .approvers
            .insert(approver.id().to_string(), approver.clone());
        Ok(())
    }

    fn get_approver(&self, id: &str) -> Result<Approver, StoreError> {
        self.tables()
            .approvers
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: Entity::Approver,
                id: id.to_string(),
            })
    }
}
