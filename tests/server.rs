//! Integration tests for the HTTP server, health endpoint, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use teeproxy::capture::{CaptureSink, CaptureWorker, RollingFileWriter};
use teeproxy::config::ProxyConfig;
use teeproxy::health::HealthResponse;
use teeproxy::server::{self, AppState};
use teeproxy::upstream::UpstreamClient;

struct TestServer {
    addr: SocketAddr,
    upstream_addr: SocketAddr,
    shutdown: tokio::sync::oneshot::Sender<()>,
    upstream: Arc<UpstreamClient>,
    _worker: CaptureWorker,
    _dir: tempfile::TempDir,
}

async fn start_test_server(health_path: Option<&str>) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    // Bound then released, so forwarded requests are refused.
    let refused = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let mut config = ProxyConfig::new(&format!("http://{refused}")).unwrap();
    config.health_path = health_path.map(String::from);
    config.capture.log_file = dir.path().join("record.log");
    let config = Arc::new(config);

    let writer = RollingFileWriter::open(
        &config.capture.log_file,
        config.capture.rotation_bytes,
        config.capture.retention,
    )
    .await
    .unwrap();
    let (sink, worker) = CaptureSink::open(writer, config.capture.queue_capacity);
    let upstream = Arc::new(UpstreamClient::open(config.pool_max_idle));
    let state = Arc::new(AppState::new(config, Arc::clone(&upstream), sink).unwrap());

    let router = server::build_router(state, None);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .unwrap();
    });

    TestServer {
        addr,
        upstream_addr: refused,
        shutdown: shutdown_tx,
        upstream,
        _worker: worker,
        _dir: dir,
    }
}

#[tokio::test]
async fn health_endpoint_returns_healthy() {
    let server = start_test_server(Some("/_health")).await;

    let url = format!("http://{}/_health", server.addr);
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);

    let health: HealthResponse = resp.json().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.upstream, format!("http://{}", server.upstream_addr));
    assert_eq!(health.stats.requests_forwarded, 0);
    assert_eq!(health.stats.requests_failed, 0);
    assert_eq!(health.capture.dropped, 0);

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn health_reports_stopping_once_upstream_closed() {
    let server = start_test_server(Some("/_health")).await;
    server.upstream.close();

    let url = format!("http://{}/_health", server.addr);
    let health: HealthResponse = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(health.status, "stopping");

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn health_path_is_forwarded_when_not_configured() {
    let server = start_test_server(None).await;

    let url = format!("http://{}/_health", server.addr);
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 502);

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn failed_exchanges_are_counted() {
    let server = start_test_server(Some("/_health")).await;

    let resp = reqwest::get(format!("http://{}/api/orders", server.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);

    let url = format!("http://{}/_health", server.addr);
    let health: HealthResponse = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(health.stats.requests_failed, 1);
    assert_eq!(health.stats.requests_forwarded, 0);
    assert_eq!(health.capture.submitted, 1);

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn health_version_matches_crate() {
    let server = start_test_server(Some("/_health")).await;

    let url = format!("http://{}/_health", server.addr);
    let health: HealthResponse = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn graceful_shutdown_works() {
    let server = start_test_server(Some("/_health")).await;

    // Verify server is running
    let url = format!("http://{}/_health", server.addr);
    assert!(reqwest::get(&url).await.is_ok());

    // Send shutdown
    let _ = server.shutdown.send(());

    // Give it a moment to shut down
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // Server should no longer accept connections
    let result = reqwest::get(&url).await;
    assert!(result.is_err());
}
