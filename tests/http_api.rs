//! HTTP transport over a real loopback socket

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use csi_proxy::iscsi::{MutualChapSecret, TargetPortal};
use csi_proxy::os::{Backend, MemoryIscsi, MemoryStorage, MemoryTarget};
use csi_proxy::server;

const IQN: &str = "iqn.2020-01.world.srv:disk1";

struct TestServer {
    addr: std::net::SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start() -> TestServer {
    let iscsi = MemoryIscsi::new().with_target(
        MemoryTarget::new(TargetPortal::new("10.0.0.5", 0), IQN).with_disks(["7"]),
    );
    let storage = MemoryStorage::new().with_disk(7, &["vol-7"]);
    let backend = Backend::memory(Arc::new(iscsi), Arc::new(storage));
    let dispatcher = csi_proxy::build_dispatcher(backend, MutualChapSecret::new()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(server::serve(listener, dispatcher, async {
        let _ = rx.await;
    }));

    TestServer {
        addr,
        shutdown: Some(tx),
    }
}

/// Send one request and return (status, JSON body)
async fn request(server: &TestServer, method: &str, path: &str, body: &str) -> (u16, Value) {
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let raw = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        method,
        path,
        server.addr,
        body.len(),
        body
    );
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();

    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap();
    let (_, body) = response.split_once("\r\n\r\n").unwrap();
    (status, serde_json::from_str(body).unwrap())
}

#[tokio::test]
async fn test_connect_flow_over_http() {
    let server = start().await;
    let portal = json!({ "address": "10.0.0.5" }).to_string();

    let (status, body) = request(
        &server,
        "POST",
        "/api/v1/AddTargetPortal",
        &format!(r#"{{"target_portal": {}}}"#, portal),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    let (status, body) = request(&server, "POST", "/api/v1/ListTargetPortals", "").await;
    assert_eq!(status, 200);
    assert_eq!(
        body["data"],
        json!({ "target_portals": [{ "address": "10.0.0.5", "port": 3260 }] })
    );

    let session = format!(r#"{{"target_portal": {}, "iqn": "{}"}}"#, portal, IQN);
    let (status, _) = request(&server, "POST", "/api/v1/ConnectTarget", &session).await;
    assert_eq!(status, 200);

    let (status, body) = request(&server, "POST", "/api/v1/GetTargetDisks", &session).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!({ "disk_ids": ["7"] }));

    let (status, body) = request(&server, "POST", "/api/v1/ConnectTarget", &session).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["kind"], "ConnectFailed");
}

#[tokio::test]
async fn test_errors_map_to_status_codes() {
    let server = start().await;

    let (status, body) = request(&server, "POST", "/api/v1/NoSuchOperation", "{}").await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["error"]["kind"], "UnknownOperation");

    let (status, body) = request(&server, "POST", "/api/v2/ListTargetPortals", "{}").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["kind"], "UnsupportedVersion");

    let (status, body) = request(&server, "POST", "/api/version1/ListTargetPortals", "{}").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "InvalidVersion");

    let (status, body) = request(&server, "POST", "/api/v1/GetDiskState", "{not json").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "InvalidArgument");

    let (status, body) = request(
        &server,
        "POST",
        "/api/v1/GetTargetDisks",
        &format!(r#"{{"target_portal": {{"address": "10.0.0.5"}}, "iqn": "{}"}}"#, IQN),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["kind"], "SessionNotFound");
}

#[tokio::test]
async fn test_list_operations() {
    let server = start().await;

    let (status, body) = request(&server, "GET", "/api/operations", "").await;
    assert_eq!(status, 200);

    let operations = body["data"].as_array().unwrap();
    let connect = operations
        .iter()
        .find(|op| op["name"] == "ConnectTarget")
        .unwrap();
    assert_eq!(connect["versions"], json!(["v1", "v1alpha2", "v1alpha1"]));

    let secret = operations
        .iter()
        .find(|op| op["name"] == "SetMutualChapSecret")
        .unwrap();
    assert_eq!(secret["versions"], json!(["v1", "v1alpha2"]));

    let resize = operations
        .iter()
        .find(|op| op["name"] == "ResizeVolume")
        .unwrap();
    assert_eq!(resize["versions"], json!(["v1", "v1beta1"]));

    let start = operations
        .iter()
        .find(|op| op["name"] == "StartService")
        .unwrap();
    assert_eq!(start["versions"], json!(["v1", "v1alpha1"]));
}

#[tokio::test]
async fn test_missing_service_is_not_found() {
    let server = start().await;

    let (status, body) = request(&server, "POST", "/api/v1/StartService", r#"{"name": "nope"}"#).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["kind"], "ServiceOperationFailed");

    let (status, body) = request(&server, "POST", "/api/v1/PathExists", r#"{"path": "relative"}"#).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "InvalidArgument");
}
