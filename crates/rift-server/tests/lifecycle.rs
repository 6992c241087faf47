//! Editor buffers, hot updates and shutdown against a running pipeline.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use rift_config::ResolvedConfig;
use rift_server::{DevServer, EditorBufferBridge, GateDecision, StageRegistry};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tower::ServiceExt;
use url::Url;

async fn body(server: &DevServer, uri: &str) -> String {
    let res = server
        .router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn next_message(rx: &mut mpsc::Receiver<String>) -> serde_json::Value {
    let raw = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no message within 5s")
        .expect("client channel closed");
    serde_json::from_str(&raw).unwrap()
}

fn server(dir: &TempDir) -> DevServer {
    let config =
        ResolvedConfig::minimal(dir.path().to_path_buf(), "development", Default::default());
    DevServer::new(config, &StageRegistry::new()).unwrap()
}

#[tokio::test]
async fn buffer_edit_is_served_and_pushed() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("main.js");
    fs::write(&file, "export const a = 1\n").unwrap();
    let server = server(&dir);
    let (_, mut rx) = server.context().clients.register();

    assert!(body(&server, "/main.js").await.contains("a = 1"));

    let bridge = EditorBufferBridge::new(server.context());
    let uri = Url::from_file_path(&file).unwrap();
    let decision = bridge.document_changed(uri.as_str(), "export const a = 2\n");
    assert_eq!(decision, Some(GateDecision::Propagate));

    assert!(body(&server, "/main.js").await.contains("a = 2"));
    assert_eq!(fs::read_to_string(&file).unwrap(), "export const a = 1\n");

    let message = next_message(&mut rx).await;
    assert_eq!(message["type"], "update");
    assert_eq!(message["path"], "/main.js");

    assert!(bridge.document_closed(uri.as_str()));
    assert!(body(&server, "/main.js").await.contains("a = 1"));
}

#[tokio::test]
async fn broken_component_is_held_back_until_fixed() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("App.vue");
    fs::write(&file, "<template><p>hi</p></template>\n").unwrap();
    let server = server(&dir);
    let (_, mut rx) = server.context().clients.register();
    body(&server, "/App.vue").await;

    let bridge = EditorBufferBridge::new(server.context());
    let uri = Url::from_file_path(&file).unwrap();

    let decision = bridge.document_changed(uri.as_str(), "<template><div>");
    assert_eq!(decision, Some(GateDecision::Suppress));
    // Suppressed text still lands in the store.
    assert_eq!(
        server.context().store.get(&file).as_deref(),
        Some("<template><div>")
    );

    let decision =
        bridge.document_changed(uri.as_str(), "<template><div>ok</div></template>\n");
    assert_eq!(decision, Some(GateDecision::Propagate));

    let message = next_message(&mut rx).await;
    assert_eq!(message["type"], "update");
    assert_eq!(message["path"], "/App.vue");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn editing_an_unserved_file_reloads_the_page() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("later.js");
    fs::write(&file, "1").unwrap();
    let server = server(&dir);
    let (_, mut rx) = server.context().clients.register();

    let bridge = EditorBufferBridge::new(server.context());
    let uri = Url::from_file_path(&file).unwrap();
    bridge.document_changed(uri.as_str(), "2");

    let message = next_message(&mut rx).await;
    assert_eq!(message["type"], "full-reload");
}

#[tokio::test]
async fn documents_outside_the_project_are_ignored() {
    let dir = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let server = server(&dir);
    let bridge = EditorBufferBridge::new(server.context());

    let uri = Url::from_file_path(other.path().join("x.js")).unwrap();
    assert_eq!(bridge.document_changed(uri.as_str(), "x"), None);
    assert_eq!(bridge.document_changed("untitled:Untitled-1", "x"), None);
}

#[tokio::test]
async fn bridge_reads_json_lines() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("main.js");
    fs::write(&file, "disk").unwrap();
    let server = server(&dir);
    let bridge = EditorBufferBridge::new(server.context());

    let uri = Url::from_file_path(&file).unwrap();
    let input = format!(
        "not json\n\n{}\n",
        serde_json::json!({
            "method": "documentChanged",
            "params": { "uri": uri.as_str(), "text": "buffer" }
        })
    );
    bridge.serve_lines(input.as_bytes()).await.unwrap();

    assert_eq!(server.context().store.get(&file).as_deref(), Some("buffer"));
}

#[tokio::test]
async fn shutdown_stops_serving_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let server = Arc::new(server(&dir));

    let running = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(([127, 0, 0, 1], 0).into()).await })
    };

    let addr = timeout(Duration::from_secs(5), async {
        loop {
            if let Some(addr) = server.local_addr() {
                break addr;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_ne!(addr.port(), 0);

    server.shutdown();
    server.shutdown();

    let result = timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert!(server.context().is_shut_down());
    assert!(!server.context().watcher.is_watching_disk());
}
