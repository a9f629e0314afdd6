//! Approval workflow engine.
//!
//! A requester opens a typed request that an approver may approve or reject before it
//! expires. [`engine`] holds the rules, [`store`] the persistence port and its backends,
//! and [`service`] the façades that tie them together.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use domain::{Approver, Request, Requester};
pub use error::{ApprovalError, ErrorKind, Rejection, StoreError, ValidationError};
pub use service::{ApproverService, RequestService, RequesterService, Services};
pub use store::{MemoryStore, SledStore, Storage};
pub use types::{Decision, Status, TimeStamp, TypeTag};
