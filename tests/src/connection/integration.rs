#![cfg(target_os = "linux")]
use crate::utils::{self, Receiver};
use linkr_common::endpoint::Endpoint;
use linkr_common::store::{EndpointStore, FileEndpointStore};
use linkr_core::dispatch::{Attempt, Delivery};
use linkr_core::establish::EstablishError;
use linkr_core::link::Outcome;
use linkr_core::session::{ConnectionState, SessionEvent};
use tokio::sync::broadcast::Receiver as Events;

fn scanned(events: &mut Events<SessionEvent>) -> bool {
    let mut seen = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::ScanStarted { .. }) {
            seen = true;
        }
    }
    seen
}

/// With nothing stored, the sweep finds the only listening receiver and
/// remembers it.
#[tokio::test(flavor = "multi_thread")]
async fn first_run_discovers_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("endpoint.toml");
    let receiver = Receiver::start(42, 0).await.unwrap();

    let connector = utils::connector(utils::config(receiver.port()), &store_path);
    let mut events = connector.session().subscribe();

    let endpoint = connector.establish().await.unwrap();

    assert_eq!(endpoint, Endpoint::new(receiver.ip(), receiver.port()));
    assert_eq!(
        connector.session().state(),
        ConnectionState::Connected(endpoint.clone())
    );
    assert!(scanned(&mut events));

    let stored = FileEndpointStore::new(&store_path, receiver.port()).load().unwrap();
    assert_eq!(stored, Some(endpoint));
}

#[tokio::test(flavor = "multi_thread")]
async fn stored_endpoint_skips_the_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("endpoint.toml");
    let receiver = Receiver::start(43, 0).await.unwrap();
    let expected = Endpoint::new(receiver.ip(), receiver.port());
    FileEndpointStore::new(&store_path, receiver.port())
        .save(&expected)
        .unwrap();

    let connector = utils::connector(utils::config(receiver.port()), &store_path);
    let mut events = connector.session().subscribe();

    assert_eq!(connector.establish().await.unwrap(), expected);
    assert_eq!(connector.probe_count(), 1);
    assert!(!scanned(&mut events));
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_stored_endpoint_falls_back_to_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("endpoint.toml");
    let receiver = Receiver::start(44, 0).await.unwrap();
    let store = FileEndpointStore::new(&store_path, receiver.port());
    store
        .save(&Endpoint::new("127.0.0.200", receiver.port()))
        .unwrap();

    let connector = utils::connector(utils::config(receiver.port()), &store_path);
    let endpoint = connector.establish().await.unwrap();

    assert_eq!(endpoint.address(), receiver.ip());
    assert_eq!(store.load().unwrap(), Some(endpoint));
}

#[tokio::test(flavor = "multi_thread")]
async fn message_reaches_the_receiver() {
    let dir = tempfile::tempdir().unwrap();
    let mut receiver = Receiver::start(45, 0).await.unwrap();
    let connector = utils::connector(
        utils::config(receiver.port()),
        &dir.path().join("endpoint.toml"),
    );

    connector.establish().await.unwrap();
    let report = connector.dispatcher().send("hello over loopback", None).await;

    assert!(report.is_sent());
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(receiver.next_message().await.as_deref(), Some("hello over loopback"));
}

/// The receiver restarts on another address: the first send fails and
/// refuses the old endpoint, a fresh establishment finds the new one.
#[tokio::test(flavor = "multi_thread")]
async fn receiver_moving_address_is_rediscovered() {
    let dir = tempfile::tempdir().unwrap();
    let first = Receiver::start(46, 0).await.unwrap();
    let port = first.port();
    let connector = utils::connector(utils::config(port), &dir.path().join("endpoint.toml"));

    let old = connector.establish().await.unwrap();
    first.close().await;
    let mut second = Receiver::start(47, port).await.unwrap();

    let report = connector.dispatcher().send("lost", None).await;
    assert_eq!(report.delivery, Delivery::NoEndpointAvailable);
    assert_eq!(
        report.attempts,
        vec![(old.clone(), Attempt::Rejected(Outcome::Refused))]
    );
    assert!(connector.session().is_refused(&old));

    let new = connector.establish().await.unwrap();
    assert_eq!(new.address(), second.ip());

    let report = connector.dispatcher().send("found", None).await;
    assert_eq!(report.sent_to(), Some(&new));
    assert_eq!(second.next_message().await.as_deref(), Some("found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn dead_manual_endpoint_does_not_trigger_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let receiver = Receiver::start(48, 0).await.unwrap();
    let mut cfg = utils::config(receiver.port());
    cfg.manual_override_enabled = true;
    cfg.manual_address = Some("127.0.0.201".into());

    let connector = utils::connector(cfg, &dir.path().join("endpoint.toml"));
    let mut events = connector.session().subscribe();

    let err = connector.establish().await.unwrap_err();

    assert!(matches!(err, EstablishError::RetriesExhausted { attempts: 1 }));
    assert_eq!(connector.session().state(), ConnectionState::Failed);
    assert!(!scanned(&mut events));
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_send_goes_only_to_the_override() {
    let dir = tempfile::tempdir().unwrap();
    let mut receiver = Receiver::start(49, 0).await.unwrap();
    let mut cfg = utils::config(receiver.port());
    cfg.manual_override_enabled = true;
    cfg.manual_address = Some(receiver.ip());

    let connector = utils::connector(cfg, &dir.path().join("endpoint.toml"));
    let manual = connector.config().manual_override().unwrap();

    let report = connector.dispatcher().send("direct", Some(&manual)).await;

    assert_eq!(report.delivery, Delivery::Sent(manual));
    assert_eq!(receiver.next_message().await.as_deref(), Some("direct"));
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_forgets_the_receiver() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("endpoint.toml");
    let receiver = Receiver::start(50, 0).await.unwrap();
    let connector = utils::connector(utils::config(receiver.port()), &store_path);

    connector.establish().await.unwrap();
    assert!(store_path.exists());

    connector.reset().unwrap();

    assert!(!store_path.exists());
    let snapshot = connector.session().snapshot();
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert!(snapshot.candidates.is_empty());
}
