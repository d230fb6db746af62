//! End-to-end iSCSI flows through the dispatcher and the memory backend

use serde_json::{json, Value};
use std::sync::Arc;

use csi_proxy::error::ErrorKind;
use csi_proxy::iscsi::{MutualChapSecret, TargetPortal};
use csi_proxy::os::{Backend, MemoryIscsi, MemoryStorage, MemoryTarget};
use csi_proxy::{build_dispatcher, Dispatcher};

const IQN: &str = "iqn.2020-01.world.srv:disk1";
const CHAP_IQN: &str = "iqn.2020-01.world.srv:chap";
const MUTUAL_IQN: &str = "iqn.2020-01.world.srv:mutual";

fn portal() -> Value {
    json!({ "address": "10.0.0.5", "port": 0 })
}

fn setup() -> (Dispatcher, Arc<MemoryIscsi>) {
    let portal = TargetPortal::new("10.0.0.5", 3260);
    let iscsi = Arc::new(
        MemoryIscsi::new()
            .with_target(MemoryTarget::new(portal.clone(), IQN).with_disks(["2", "3"]))
            .with_target(MemoryTarget::new(portal.clone(), CHAP_IQN).with_chap("user", "secret"))
            .with_target(
                MemoryTarget::new(portal, MUTUAL_IQN)
                    .with_chap("user", "secret")
                    .with_mutual_secret("correct-reverse-secret"),
            ),
    );
    let backend = Backend::memory(iscsi.clone(), Arc::new(MemoryStorage::new()));
    let dispatcher = build_dispatcher(backend, MutualChapSecret::new()).unwrap();
    (dispatcher, iscsi)
}

fn kind(result: Result<Value, csi_proxy::ProxyError>) -> ErrorKind {
    result.unwrap_err().kind()
}

#[test]
fn test_start_initiator_service_then_connect() {
    let (dispatcher, iscsi) = setup();
    let service = json!({ "name": "MSiSCSI" });

    let state = dispatcher.dispatch("GetService", "v1", service.clone()).unwrap();
    assert_eq!(state["status"], "STOPPED");
    assert_eq!(state["start_type"], "MANUAL");

    dispatcher.dispatch("StartService", "v1", service.clone()).unwrap();
    let state = dispatcher.dispatch("GetService", "v1alpha1", service).unwrap();
    assert_eq!(state["status"], "RUNNING");

    dispatcher
        .dispatch("AddTargetPortal", "v1", json!({ "target_portal": portal() }))
        .unwrap();
    let request = json!({ "target_portal": portal(), "iqn": IQN });
    dispatcher.dispatch("ConnectTarget", "v1", request.clone()).unwrap();
    assert_eq!(
        dispatcher.dispatch("GetTargetDisks", "v1", request.clone()).unwrap(),
        json!({ "disk_ids": ["2", "3"] })
    );
    dispatcher.dispatch("DisconnectTarget", "v1", request).unwrap();
    assert_eq!(iscsi.session_count(), 0);

    assert_eq!(
        kind(dispatcher.dispatch("StartService", "v1", json!({ "name": "NoSuchService" }))),
        ErrorKind::ServiceOperationFailed
    );
}

#[test]
fn test_portal_lifecycle() {
    let (dispatcher, _) = setup();

    let listed = dispatcher.dispatch("ListTargetPortals", "v1", json!({})).unwrap();
    assert_eq!(listed, json!({ "target_portals": [] }));

    dispatcher
        .dispatch("AddTargetPortal", "v1", json!({ "target_portal": portal() }))
        .unwrap();
    let listed = dispatcher.dispatch("ListTargetPortals", "v1", json!({})).unwrap();
    assert_eq!(
        listed,
        json!({ "target_portals": [{ "address": "10.0.0.5", "port": 3260 }] })
    );

    dispatcher
        .dispatch("RemoveTargetPortal", "v1", json!({ "target_portal": portal() }))
        .unwrap();
    let listed = dispatcher.dispatch("ListTargetPortals", "v1", json!({})).unwrap();
    assert_eq!(listed, json!({ "target_portals": [] }));
}

#[test]
fn test_discover_and_connect_without_auth() {
    let (dispatcher, iscsi) = setup();
    dispatcher
        .dispatch("AddTargetPortal", "v1", json!({ "target_portal": portal() }))
        .unwrap();

    let discovered = dispatcher
        .dispatch("DiscoverTargetPortal", "v1", json!({ "target_portal": portal() }))
        .unwrap();
    let iqns = discovered["iqns"].as_array().unwrap();
    assert!(iqns.contains(&json!(IQN)));

    let request = json!({ "target_portal": portal(), "iqn": IQN });
    dispatcher.dispatch("ConnectTarget", "v1", request.clone()).unwrap();
    assert!(iscsi.is_connected(&TargetPortal::new("10.0.0.5", 0), IQN));

    let disks = dispatcher.dispatch("GetTargetDisks", "v1", request.clone()).unwrap();
    assert_eq!(disks, json!({ "disk_ids": ["2", "3"] }));

    dispatcher.dispatch("DisconnectTarget", "v1", request.clone()).unwrap();
    assert_eq!(iscsi.session_count(), 0);
    assert_eq!(
        kind(dispatcher.dispatch("GetTargetDisks", "v1", request)),
        ErrorKind::SessionNotFound
    );
}

#[test]
fn test_one_way_chap_requires_matching_credentials() {
    let (dispatcher, iscsi) = setup();
    dispatcher
        .dispatch("AddTargetPortal", "v1", json!({ "target_portal": portal() }))
        .unwrap();

    let rejected = dispatcher.dispatch(
        "ConnectTarget",
        "v1",
        json!({
            "target_portal": portal(),
            "iqn": CHAP_IQN,
            "auth_type": "ONE_WAY_CHAP",
            "chap_username": "user",
            "chap_secret": "wrong",
        }),
    );
    assert_eq!(kind(rejected), ErrorKind::AuthenticationFailed);
    assert_eq!(
        kind(dispatcher.dispatch(
            "GetTargetDisks",
            "v1",
            json!({ "target_portal": portal(), "iqn": CHAP_IQN })
        )),
        ErrorKind::SessionNotFound
    );

    dispatcher
        .dispatch(
            "ConnectTarget",
            "v1",
            json!({
                "target_portal": portal(),
                "iqn": CHAP_IQN,
                "auth_type": "ONE_WAY_CHAP",
                "chap_username": "user",
                "chap_secret": "secret",
            }),
        )
        .unwrap();
    assert!(iscsi.is_connected(&TargetPortal::new("10.0.0.5", 3260), CHAP_IQN));
}

#[test]
fn test_chap_type_without_credentials_is_invalid() {
    let (dispatcher, iscsi) = setup();
    let result = dispatcher.dispatch(
        "ConnectTarget",
        "v1",
        json!({ "target_portal": portal(), "iqn": CHAP_IQN, "auth_type": "ONE_WAY_CHAP" }),
    );
    assert_eq!(kind(result), ErrorKind::InvalidArgument);
    assert_eq!(iscsi.session_count(), 0);
}

#[test]
fn test_mutual_chap_uses_latest_secret() {
    let (dispatcher, iscsi) = setup();
    dispatcher
        .dispatch("AddTargetPortal", "v1", json!({ "target_portal": portal() }))
        .unwrap();
    let connect = json!({
        "target_portal": portal(),
        "iqn": MUTUAL_IQN,
        "auth_type": "MUTUAL_CHAP",
        "chap_username": "user",
        "chap_secret": "secret",
    });

    dispatcher
        .dispatch(
            "SetMutualChapSecret",
            "v1",
            json!({ "mutual_chap_secret": "wrong-reverse-secret" }),
        )
        .unwrap();
    assert_eq!(
        kind(dispatcher.dispatch("ConnectTarget", "v1", connect.clone())),
        ErrorKind::AuthenticationFailed
    );

    dispatcher
        .dispatch(
            "SetMutualChapSecret",
            "v1",
            json!({ "mutual_chap_secret": "correct-reverse-secret" }),
        )
        .unwrap();
    assert_eq!(
        iscsi.initiator_mutual_secret().as_deref(),
        Some("correct-reverse-secret")
    );
    dispatcher.dispatch("ConnectTarget", "v1", connect).unwrap();
    assert!(iscsi.is_connected(&TargetPortal::new("10.0.0.5", 0), MUTUAL_IQN));
}

#[test]
fn test_v1alpha1_has_no_mutual_chap() {
    let (dispatcher, _) = setup();

    assert_eq!(
        kind(dispatcher.dispatch(
            "SetMutualChapSecret",
            "v1alpha1",
            json!({ "mutual_chap_secret": "reverse" })
        )),
        ErrorKind::UnsupportedVersion
    );
    assert_eq!(
        kind(dispatcher.dispatch(
            "ConnectTarget",
            "v1alpha1",
            json!({
                "target_portal": portal(),
                "iqn": MUTUAL_IQN,
                "auth_type": "MUTUAL_CHAP",
                "chap_username": "user",
                "chap_secret": "secret",
            })
        )),
        ErrorKind::InvalidArgument
    );

    // Everything else is served by all three versions
    for version in ["v1alpha1", "v1alpha2", "v1"] {
        dispatcher
            .dispatch("ListTargetPortals", version, json!({}))
            .unwrap();
    }
}

#[test]
fn test_version_and_operation_errors() {
    let (dispatcher, _) = setup();

    assert_eq!(
        kind(dispatcher.dispatch("ListTargetPortals", "v2", json!({}))),
        ErrorKind::UnsupportedVersion
    );
    assert_eq!(
        kind(dispatcher.dispatch("ListTargetPortals", "v01", json!({}))),
        ErrorKind::InvalidVersion
    );
    assert_eq!(
        kind(dispatcher.dispatch("FormatTheWorld", "v1", json!({}))),
        ErrorKind::UnknownOperation
    );
    assert_eq!(
        kind(dispatcher.dispatch("AddTargetPortal", "v1", json!({ "portal": 1 }))),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn test_failed_secret_update_keeps_previous_secret() {
    let (dispatcher, iscsi) = setup();
    dispatcher
        .dispatch(
            "SetMutualChapSecret",
            "v1alpha2",
            json!({ "mutual_chap_secret": "correct-reverse-secret" }),
        )
        .unwrap();

    iscsi.fail_next("set_mutual_chap_secret", "initiator rejected secret");
    assert_eq!(
        kind(dispatcher.dispatch(
            "SetMutualChapSecret",
            "v1alpha2",
            json!({ "mutual_chap_secret": "other" })
        )),
        ErrorKind::AuthenticationFailed
    );
    assert_eq!(
        iscsi.initiator_mutual_secret().as_deref(),
        Some("correct-reverse-secret")
    );

    dispatcher
        .dispatch("AddTargetPortal", "v1alpha2", json!({ "target_portal": portal() }))
        .unwrap();
    dispatcher
        .dispatch(
            "ConnectTarget",
            "v1alpha2",
            json!({
                "target_portal": portal(),
                "iqn": MUTUAL_IQN,
                "auth_type": "MUTUAL_CHAP",
                "chap_username": "user",
                "chap_secret": "secret",
            }),
        )
        .unwrap();
}

#[test]
fn test_concurrent_dispatch() {
    let (dispatcher, iscsi) = setup();
    dispatcher
        .dispatch("AddTargetPortal", "v1", json!({ "target_portal": portal() }))
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || {
                dispatcher
                    .dispatch("DiscoverTargetPortal", "v1", json!({ "target_portal": portal() }))
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap()["iqns"].as_array().unwrap().len(), 3);
    }
    assert_eq!(iscsi.session_count(), 0);
}
