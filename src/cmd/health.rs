//! `teeproxy health`: check the health of a running instance.
//!
//! Sends a `GET` to the given health URL (the instance must have been
//! started with a health path) and displays the response as formatted
//! text or raw JSON.

use http_body_util::BodyExt;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::cli::HealthArgs;
use crate::error::TeeProxyError;
use crate::health::HealthResponse;

pub async fn execute(args: HealthArgs) -> Result<(), TeeProxyError> {
    let uri: hyper::Uri =
        args.url
            .parse()
            .map_err(|e: http::uri::InvalidUri| TeeProxyError::UriParse {
                source: Box::new(e),
            })?;

    let connector = hyper_util::client::legacy::connect::HttpConnector::new();
    let client = Client::builder(TokioExecutor::new()).build(connector);

    let req = hyper::Request::builder()
        .uri(uri)
        .body(http_body_util::Full::new(bytes::Bytes::new()))
        .map_err(|e| TeeProxyError::HttpRequest {
            source: Box::new(e),
        })?;

    let response = tokio::time::timeout(std::time::Duration::from_secs(10), client.request(req))
        .await
        .map_err(|_| TeeProxyError::HttpRequest {
            source: "health check timed out after 10s".into(),
        })?
        .map_err(|e| TeeProxyError::HttpRequest {
            source: Box::new(e),
        })?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| TeeProxyError::HttpRequest {
            source: Box::new(e),
        })?
        .to_bytes();

    if !status.is_success() {
        return Err(TeeProxyError::HealthCheckFailed(status));
    }

    if args.json {
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    match serde_json::from_slice::<HealthResponse>(&body) {
        Ok(health) => {
            let uptime = format_uptime(health.uptime_seconds);
            println!("\u{2713} teeproxy is {} ({})", health.status, args.url);
            println!("  version:   {}", health.version);
            println!("  uptime:    {uptime}");
            println!("  upstream:  {}", health.upstream);
            println!(
                "  requests:  {} forwarded, {} failed",
                health.stats.requests_forwarded, health.stats.requests_failed
            );
            println!(
                "  capture:   {} written, {} dropped, {} failed",
                health.capture.written, health.capture.dropped, health.capture.failed
            );
        }
        Err(e) => {
            eprintln!("Failed to parse health response: {e}");
            println!("{}", String::from_utf8_lossy(&body));
        }
    }

    Ok(())
}

fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
