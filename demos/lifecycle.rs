//! Walks one request through its lifecycle against a sled store.
//!
//! Configuration comes from the environment, see `config.rs`. Run with
//! `APPROVAL_DB_TEMPORARY=true` to leave nothing behind.
use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use request_approval::config::AppConfig;
use request_approval::utils::generate_id;
use request_approval::{
    Approver, Decision, ErrorKind, Requester, Services, SledStore, TimeStamp, TypeTag, telemetry,
};

fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let store = Arc::new(SledStore::open(&config.store)?);
    let services = Services::new(store.clone());

    let requester = Requester::new(generate_id("requester_")?, "requester2", TypeTag::B);
    let approver = Approver::new(
        generate_id("approver_")?,
        "approver4",
        [TypeTag::A, TypeTag::B],
    )?;
    services.requesters.create(&requester)?;
    services.approvers.create(&approver)?;

    let request = services
        .requests
        .submit(
            generate_id("req_")?,
            requester.id(),
            TypeTag::B,
            TimeStamp::from_now(Duration::days(1)),
        )
        .context("Request failed on submit: ")?;

    let status = services
        .requests
        .process(request.id(), &approver, Decision::default())
        .context("Request failed on approval: ")?;
    println!("{} -> {}", request.id(), status);

    // a second decision always loses
    let err = services
        .requests
        .process(request.id(), &approver, Decision::Reject)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyProcessed);
    println!("second decision refused: {err}");

    drop(services);
    if let Ok(store) = Arc::try_unwrap(store) {
        store.close()?;
    }

    Ok(())
}
