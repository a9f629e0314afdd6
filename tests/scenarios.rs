//! End-to-end request lifecycle scenarios against a sled store.
use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use request_approval::config::StoreConfig;
use request_approval::{
    Approver, Decision, ErrorKind, Rejection, Request, Requester, Services, SledStore, Status,
    TimeStamp, TypeTag,
};
use tempfile::{TempDir, tempdir};

// Sled locks its directory, so every test opens its own database under a temp dir.
// The TempDir is returned so it outlives the store.
fn open_services(name: &str) -> anyhow::Result<(TempDir, Services<SledStore>)> {
    let temp_dir = tempdir()?;
    let config = StoreConfig {
        path: temp_dir.path().join(name),
        ..StoreConfig::default()
    };
    let store = SledStore::open(&config)?;
    store.reset()?;

    Ok((temp_dir, Services::new(Arc::new(store))))
}

fn future() -> TimeStamp {
    TimeStamp::from_now(Duration::days(1))
}

/// Requesters 1..3 with roles A..C and approvers 1..5 as in the reference fixture set.
fn seed(services: &Services<SledStore>) -> anyhow::Result<Vec<Approver>> {
    for (id, role) in [("1", TypeTag::A), ("2", TypeTag::B), ("3", TypeTag::C)] {
        services
            .requesters
            .create(&Requester::new(id, format!("requester{id}"), role))?;
    }

    let approvers = vec![
        Approver::new("1", "approver1", [TypeTag::A])?,
        Approver::new("2", "approver2", [TypeTag::B])?,
        Approver::new("3", "approver3", [TypeTag::C])?,
        Approver::new("4", "approver4", [TypeTag::A, TypeTag::B])?,
        Approver::new("5", "approver5", TypeTag::ALL)?,
    ];
    for approver in &approvers {
        services.approvers.create(approver)?;
    }
    Ok(approvers)
}

#[test]
fn role_a_requests_cannot_be_decided() -> anyhow::Result<()> {
    let (_dir, services) = open_services("role_a.db")?;
    let approvers = seed(&services)?;

    services
        .requests
        .submit("1", "1", TypeTag::A, future())
        .context("Request failed on submit: ")?;

    // approver4 holds type A, yet requester role A is off limits
    for approver in [&approvers[0], &approvers[3], &approvers[4]] {
        let err = services
            .requests
            .process("1", approver, Decision::Approve)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequesterRoleForbidden);
    }
    assert_eq!(services.requests.get("1")?.status(), Status::Pending);

    Ok(())
}

#[test]
fn approver_with_a_b_approves_type_b() -> anyhow::Result<()> {
    let (_dir, services) = open_services("approve_b.db")?;
    let approvers = seed(&services)?;

    services.requests.submit("2", "2", TypeTag::B, future())?;
    let status = services
        .requests
        .process("2", &approvers[3], Decision::default())
        .context("Request failed on approval: ")?;

    assert_eq!(status, Status::Approved);
    assert_eq!(services.requests.get("2")?.status(), Status::Approved);

    Ok(())
}

#[test]
fn approver_with_all_types_rejects_type_c() -> anyhow::Result<()> {
    let (_dir, services) = open_services("reject_c.db")?;
    let approvers = seed(&services)?;

    services.requests.submit("5", "3", TypeTag::C, future())?;
    services
        .requests
        .process("5", &approvers[4], Decision::from(false))?;

    assert_eq!(services.requests.get("5")?.status(), Status::Rejected);

    Ok(())
}

#[test]
fn past_expiration_fails_creation() -> anyhow::Result<()> {
    let (_dir, services) = open_services("expired.db")?;
    seed(&services)?;

    let requester = services.requesters.get("1")?;
    let expired = Request::new(
        "4",
        requester,
        TypeTag::A,
        TimeStamp::from_now(Duration::days(-1)),
    );
    let err = services.requests.create(&expired).unwrap_err();

    assert_eq!(err.rejection(), Some(Rejection::Expired));
    assert_eq!(services.requests.get("4").unwrap_err().kind(), ErrorKind::NotFound);

    Ok(())
}

#[test]
fn type_outside_allowed_set_is_not_permitted() -> anyhow::Result<()> {
    let (_dir, services) = open_services("not_permitted.db")?;
    let approvers = seed(&services)?;

    services.requests.submit("1", "1", TypeTag::A, future())?;
    let err = services
        .requests
        .process("1", &approvers[1], Decision::Approve)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TypeNotPermitted);

    Ok(())
}

#[test]
fn second_decision_is_already_processed() -> anyhow::Result<()> {
    let (_dir, services) = open_services("second_decision.db")?;
    let approvers = seed(&services)?;

    services.requests.submit("3", "3", TypeTag::C, future())?;
    services
        .requests
        .process("3", &approvers[2], Decision::Approve)?;

    for approver in &approvers {
        for decision in [Decision::Approve, Decision::Reject] {
            let err = services
                .requests
                .process("3", approver, decision)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AlreadyProcessed);
        }
    }
    assert_eq!(services.requests.get("3")?.status(), Status::Approved);

    Ok(())
}

#[test]
fn stored_entities_read_back_unchanged() -> anyhow::Result<()> {
    let (_dir, services) = open_services("read_back.db")?;
    let approvers = seed(&services)?;

    let request = services.requests.submit("1", "1", TypeTag::A, future())?;

    assert_eq!(services.requests.get("1")?, request);
    assert_eq!(services.approvers.get("4")?, approvers[3]);
    assert_eq!(
        services.requesters.get("1")?,
        Requester::new("1", "requester1", TypeTag::A)
    );

    Ok(())
}

#[test]
fn deleting_a_requester_removes_its_requests() -> anyhow::Result<()> {
    let (_dir, services) = open_services("cascade.db")?;
    seed(&services)?;

    services.requests.submit("2", "2", TypeTag::B, future())?;
    services.requests.submit("3", "3", TypeTag::C, future())?;
    services.requesters.delete("2")?;

    assert_eq!(services.requests.get("2").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(services.requesters.get("2").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(services.requests.get("3")?.status(), Status::Pending);

    Ok(())
}

#[test]
fn data_survives_reopening_the_store() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let config = StoreConfig {
        path: temp_dir.path().join("reopen.db"),
        ..StoreConfig::default()
    };

    {
        let store = Arc::new(SledStore::open(&config)?);
        let services = Services::new(store.clone());
        seed(&services)?;
        services.requests.submit("2", "2", TypeTag::B, future())?;
        drop(services);
        Arc::try_unwrap(store)
            .ok()
            .context("store still shared")?
            .close()?;
    }

    let services = Services::new(Arc::new(SledStore::open(&config)?));
    assert_eq!(services.requests.get("2")?.status(), Status::Pending);
    assert_eq!(services.approvers.get("5")?.allowed_types().len(), 3);

    Ok(())
}
