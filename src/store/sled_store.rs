use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{CompareAndSwapError, Db, IVec, Transactional, Tree};

use super::{ApproverRow, RequestRow, Storage, check_transition};
use crate::config::StoreConfig;
use crate::domain::{Approver, Request, Requester};
use crate::error::{Entity, StoreError};
use crate::types::Status;

const REQUESTER_TREE: &str = "requester";
const REQUEST_TREE: &str = "request";
const APPROVER_TREE: &str = "approver";
// key: len(requester_id) as u32 BE ++ requester_id ++ request_id, value: empty
const REQUESTER_INDEX_TREE: &str = "request_by_requester";
// key: requester_id, value: number of index entries under it as u64 BE
const REQUEST_COUNT_TREE: &str = "request_count";

/// Embedded backend: one sled tree per relation, rows encoded as CBOR.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    requesters: Tree,
    requests: Tree,
    approvers: Tree,
    requester_index: Tree,
    request_counts: Tree,
}

/// Abort reasons for the cascade transaction.
enum CascadeAbort {
    Store(StoreError),
    // a request was stored after the index scan
    Stale,
}

impl SledStore {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut sled_config = sled::Config::new()
            .path(&config.path)
            .temporary(config.temporary);
        if let Some(bytes) = config.cache_capacity {
            sled_config = sled_config.cache_capacity(bytes);
        }
        tracing::debug!(
            path = %config.path.display(),
            temporary = config.temporary,
            "opening sled store"
        );

        Self::from_db(sled_config.open()?)
    }

    pub fn from_db(db: Db) -> Result<Self, StoreError> {
        Ok(Self {
            requesters: db.open_tree(REQUESTER_TREE)?,
            requests: db.open_tree(REQUEST_TREE)?,
            approvers: db.open_tree(APPROVER_TREE)?,
            requester_index: db.open_tree(REQUESTER_INDEX_TREE)?,
            request_counts: db.open_tree(REQUEST_COUNT_TREE)?,
            db,
        })
    }

    /// Drops every stored row.
    pub fn reset(&self) -> Result<(), StoreError> {
        for tree in [
            &self.request_counts,
            &self.requester_index,
            &self.requests,
            &self.approvers,
            &self.requesters,
        ] {
            tree.clear()?;
        }
        Ok(())
    }

    /// Flushes outstanding writes and releases the handle.
    pub fn close(self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Inserts `row` under `key` only if the key is vacant.
    fn insert_new(
        tree: &Tree,
        entity: Entity,
        key: &str,
        row: Vec<u8>,
    ) -> Result<(), StoreError> {
        match tree.compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(row))? {
            Ok(()) => Ok(()),
            Err(CompareAndSwapError { .. }) => Err(StoreError::DuplicateId {
                entity,
                id: key.to_string(),
            }),
        }
    }
}

fn index_prefix(requester_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(4 + requester_id.len());
    prefix.extend_from_slice(&(requester_id.len() as u32).to_be_bytes());
    prefix.extend_from_slice(requester_id.as_bytes());
    prefix
}

fn index_key(requester_id: &str, request_id: &str) -> Vec<u8> {
    let mut key = index_prefix(requester_id);
    key.extend_from_slice(request_id.as_bytes());
    key
}

fn read_count(value: Option<IVec>) -> u64 {
    value
        .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_ref()).ok())
        .map(u64::from_be_bytes)
        .unwrap_or(0)
}

impl Storage for SledStore {
    fn put_requester(&self, requester: &Requester) -> Result<(), StoreError> {
        let row = minicbor::to_vec(requester)?;
        Self::insert_new(&self.requesters, Entity::Requester, requester.id(), row)?;
        tracing::debug!(requester_id = requester.id(), "stored requester");
        Ok(())
    }

    fn get_requester(&self, id: &str) -> Result<Requester, StoreError> {
        let row = self
            .requesters
            .get(id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound {
                entity: Entity::Requester,
                id: id.to_string(),
            })?;
        Ok(minicbor::decode(&row)?)
    }

    fn delete_requester(&self, id: &str) -> Result<(), StoreError> {
        let prefix = index_prefix(id);

        let cascaded = loop {
            let owned = self
                .requester_index
                .scan_prefix(&prefix)
                .keys()
                .collect::<Result<Vec<_>, _>>()?;

            let outcome = (
                &self.requesters,
                &self.requests,
                &self.requester_index,
                &self.request_counts,
            )
                .transaction(|(requesters, requests, index, counts)| {
                    if requesters.remove(id.as_bytes())?.is_none() {
                        return Err(ConflictableTransactionError::Abort(CascadeAbort::Store(
                            StoreError::NotFound {
                                entity: Entity::Requester,
                                id: id.to_string(),
                            },
                        )));
                    }
                    if read_count(counts.remove(id.as_bytes())?) != owned.len() as u64 {
                        return Err(ConflictableTransactionError::Abort(CascadeAbort::Stale));
                    }
                    for key in &owned {
                        requests.remove(&key[prefix.len()..])?;
                        index.remove(key.clone())?;
                    }
                    Ok(())
                });

            match outcome {
                Ok(()) => break owned.len(),
                Err(TransactionError::Abort(CascadeAbort::Stale)) => {
                    tracing::debug!(requester_id = id, "request index moved, rescanning");
                }
                Err(TransactionError::Abort(CascadeAbort::Store(err))) => return Err(err),
                Err(TransactionError::Storage(err)) => return Err(err.into()),
            }
        };

        tracing::debug!(requester_id = id, cascaded, "deleted requester");
        Ok(())
    }

    fn put_request(&self, request: &Request) -> Result<(), StoreError> {
        let row = minicbor::to_vec(RequestRow::from_request(request))?;
        let requester_id = request.requester().id();
        let index_entry = index_key(requester_id, request.id());

        (
            &self.requesters,
            &self.requests,
            &self.requester_index,
            &self.request_counts,
        )
            .transaction(|(requesters, requests, index, counts)| {
                if requests.get(request.id().as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::DuplicateId {
                        entity: Entity::Request,
                        id: request.id().to_string(),
                    }));
                }
                if requesters.get(requester_id.as_bytes())?.is_none() {
                    return Err(ConflictableTransactionError::Abort(
                        StoreError::ForeignKeyMissing {
                            requester_id: requester_id.to_string(),
                        },
                    ));
                }
                let count = read_count(counts.get(requester_id.as_bytes())?);
                requests.insert(request.id().as_bytes(), row.clone())?;
                index.insert(index_entry.clone(), Vec::<u8>::new())?;
                counts.insert(requester_id.as_bytes(), (count + 1).to_be_bytes().to_vec())?;
                Ok(())
            })?;

        tracing::debug!(request_id = request.id(), requester_id, "stored request");
        Ok(())
    }

    fn get_request(&self, id: &str) -> Result<Request, StoreError> {
        let not_found = || StoreError::NotFound {
            entity: Entity::Request,
            id: id.to_string(),
        };
        let row = self.requests.get(id.as_bytes())?.ok_or_else(not_found)?;
        let row: RequestRow = minicbor::decode(&row)?;
        // a dangling row is treated as gone; cascade removes it with its requester
        let requester = match self.get_requester(&row.requester_id) {
            Ok(requester) => requester,
            Err(StoreError::NotFound { .. }) => return Err(not_found()),
            Err(err) => return Err(err),
        };

        Ok(row.into_request(requester))
    }

    fn set_request_status(&self, id: &str, status: Status) -> Result<(), StoreError> {
        loop {
            let current = self
                .requests
                .get(id.as_bytes())?
                .ok_or_else(|| StoreError::NotFound {
                    entity: Entity::Request,
                    id: id.to_string(),
                })?;
            let mut row: RequestRow = minicbor::decode(&current)?;
            check_transition(id, row.status, status)?;
            row.status = status;
            let next = minicbor::to_vec(&row)?;

            match self
                .requests
                .compare_and_swap(id.as_bytes(), Some(&current), Some(next))?
            {
                Ok(()) => {
                    tracing::debug!(request_id = id, %status, "updated request status");
                    return Ok(());
                }
                // lost a race; re-read so the loser reports NotPending
                Err(_) => continue,
            }
        }
    }

    fn put_approver(&self, approver: &Approver) -> Result<(), StoreError> {
        let row = minicbor::to_vec(ApproverRow::from_approver(approver))?;
        Self::insert_new(&self.approvers, Entity::Approver, approver.id(), row)?;
        tracing::debug!(approver_id = approver.id(), "stored approver");
        Ok(())
    }

    fn get_approver(&self, id: &str) -> Result<Approver, StoreError> {
        let row = self
            .approvers
            .get(id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound {
                entity: Entity::Approver,
                id: id.to_string(),
            })?;
        minicbor::decode::<ApproverRow>(&row)?.into_approver()
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::types::{TimeStamp, TypeTag};
    use chrono::Duration;
    use std::collections::BTreeSet;
    use std::thread;

    fn temporary() -> SledStore {
        SledStore::from_db(sled::Config::new().temporary(true).open().unwrap()).unwrap()
    }

    #[test]
    fn index_prefix_does_not_confuse_nested_ids() {
        assert!(!index_key("ab", "c").starts_with(&index_prefix("a")));
        assert!(index_key("a", "bc").starts_with(&index_prefix("a")));
    }

    #[test]
    fn cascade_leaves_other_requesters_alone() {
        let store = temporary();
        let expiry = TimeStamp::from_now(Duration::days(1));
        let r1 = Requester::new("a", "requester1", TypeTag::B);
        let r2 = Requester::new("ab", "requester2", TypeTag::C);
        store.put_requester(&r1).unwrap();
        store.put_requester(&r2).unwrap();
        store
            .put_request(&Request::new("1", r1.clone(), TypeTag::B, expiry))
            .unwrap();
        store
            .put_request(&Request::new("2", r2.clone(), TypeTag::C, expiry))
            .unwrap();

        store.delete_requester("a").unwrap();

        assert!(matches!(
            store.get_request("1"),
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(store.get_request("2").unwrap().requester(), &r2);
    }

    #[test]
    fn reset_empties_every_tree() {
        let store = temporary();
        store
            .put_requester(&Requester::new("1", "requester1", TypeTag::A))
            .unwrap();
        store.reset().unwrap();

        assert!(matches!(
            store.get_requester("1"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn recreated_requester_keeps_its_new_requests() {
        let store = temporary();
        let expiry = TimeStamp::from_now(Duration::days(1));
        let requester = Requester::new("r", "requester1", TypeTag::B);
        store.put_requester(&requester).unwrap();
        store
            .put_request(&Request::new("old", requester.clone(), TypeTag::B, expiry))
            .unwrap();
        store.delete_requester("r").unwrap();

        store.put_requester(&requester).unwrap();
        store
            .put_request(&Request::new("new", requester.clone(), TypeTag::B, expiry))
            .unwrap();

        assert!(store.get_request("old").is_err());
        assert_eq!(store.get_request("new").unwrap().requester(), &requester);
        assert_eq!(read_count(store.request_counts.get("r").unwrap()), 1);
    }

    #[test]
    fn cascade_racing_inserts_leaves_no_orphans() {
        let store = temporary();
        let expiry = TimeStamp::from_now(Duration::days(1));
        let requester = Requester::new("r", "requester1", TypeTag::B);

        for round in 0..20 {
            store.put_requester(&requester).unwrap();
            let writer = {
                let store = store.clone();
                let requester = requester.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        // fails with ForeignKeyMissing once the delete has committed
                        let _ = store.put_request(&Request::new(
                            format!("{round}-{i}"),
                            requester.clone(),
                            TypeTag::B,
                            expiry,
                        ));
                    }
                })
            };
            store.delete_requester("r").unwrap();
            writer.join().expect("writer thread");

            assert!(store.requests.is_empty(), "round {round}");
            assert!(store.requester_index.is_empty(), "round {round}");
            assert!(store.request_counts.is_empty(), "round {round}");
        }
    }

    #[test]
    fn stored_approver_rows_are_validated_on_load() {
        let store = temporary();
        let row = ApproverRow {
            id: "1".into(),
            name: "approver1".into(),
            allowed_types: BTreeSet::new(),
        };
        store
            .approvers
            .insert("1", minicbor::to_vec(&row).unwrap())
            .unwrap();

        assert!(matches!(
            store.get_approver("1"),
            Err(StoreError::InvalidRow {
                entity: Entity::Approver,
                source: ValidationError::EmptyAllowedTypes,
                ..
            })
        ));
    }
}
