//! `teeproxy run`: start the proxy server.
//!
//! Opens the capture log and its writer task, opens the upstream client,
//! and serves until SIGTERM / Ctrl+C. Shutdown runs in a fixed order:
//! stop accepting, let in-flight exchanges finish, close the upstream
//! client, then drain the capture queue.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::capture::{CaptureSink, RollingFileWriter};
use crate::cli::RunArgs;
use crate::config::ProxyConfig;
use crate::error::{CaptureError, TeeProxyError};
use crate::logging;
use crate::server::{self, AppState};
use crate::upstream::UpstreamClient;

pub async fn execute(args: RunArgs) -> Result<(), TeeProxyError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let config = Arc::new(ProxyConfig::from_args(&args)?);

    let writer = RollingFileWriter::open(
        &config.capture.log_file,
        config.capture.rotation_bytes,
        config.capture.retention,
    )
    .await
    .map_err(|source| CaptureError::Write {
        path: config.capture.log_file.display().to_string(),
        source,
    })?;
    let (sink, worker) = CaptureSink::open(writer, config.capture.queue_capacity);

    let upstream = Arc::new(UpstreamClient::open(config.pool_max_idle));

    let state = AppState::new(Arc::clone(&config), Arc::clone(&upstream), sink)
        .map_err(|e| TeeProxyError::InvalidConfig(e.to_string()))?;
    let router = server::build_router(Arc::new(state), args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        upstream = %config.origin(),
        capture_log = %config.capture.log_file.display(),
        timeout_ms = args.timeout,
        "teeproxy started"
    );

    let served = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(server::shutdown_signal())
    .await;

    // Queued records are drained even when serving failed.
    upstream.close();
    worker.shutdown(config.capture.drain_timeout).await;
    served?;

    tracing::info!("teeproxy stopped");
    Ok(())
}
