//! Asynchronous capture pipeline: a bounded queue drained by one worker.
//!
//! [`CaptureSink::submit`] never waits. When the queue is at capacity the
//! record is dropped and counted, so a slow or failing log destination can
//! only cost capture completeness, never response latency. The single
//! [`CaptureWorker`] serializes writes, so lines from concurrent exchanges
//! cannot interleave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::record::CaptureRecord;
use super::writer::CaptureWriter;
use crate::error::CaptureError;

#[derive(Debug, Default)]
pub struct SinkStats {
    pub submitted: AtomicU64,
    pub written: AtomicU64,
    pub dropped: AtomicU64,
    pub failed: AtomicU64,
}

impl SinkStats {
    fn pending(&self) -> u64 {
        let done = self.written.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed);
        self.submitted.load(Ordering::Relaxed).saturating_sub(done)
    }
}

#[derive(Clone)]
pub struct CaptureSink {
    tx: mpsc::Sender<CaptureRecord>,
    stats: Arc<SinkStats>,
}

pub struct CaptureWorker {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
    stats: Arc<SinkStats>,
}

impl CaptureSink {
    /// Start the worker. Must be called inside a Tokio runtime.
    pub fn open<W>(writer: W, capacity: usize) -> (Self, CaptureWorker)
    where
        W: CaptureWriter + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(SinkStats::default());

        let handle = tokio::spawn(run_worker(writer, rx, shutdown_rx, Arc::clone(&stats)));

        (
            Self {
                tx,
                stats: Arc::clone(&stats),
            },
            CaptureWorker {
                handle,
                shutdown: shutdown_tx,
                stats,
            },
        )
    }

    /// Enqueue a record without waiting. Returns `false` if it was dropped.
    pub fn submit(&self, record: CaptureRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(record)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    method = %record.method,
                    path = %record.path,
                    capacity = self.tx.max_capacity(),
                    "capture queue full, record dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    method = %record.method,
                    path = %record.path,
                    "capture sink closed, record dropped"
                );
                false
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }
}

impl CaptureWorker {
    /// Stop accepting records, write everything already queued, and wait
    /// for the worker to finish. If that takes longer than `drain_timeout`
    /// the worker is aborted and the remaining records are lost.
    /// Returns the total number of records written.
    pub async fn shutdown(self, drain_timeout: Duration) -> u64 {
        let _ = self.shutdown.send(());
        let mut handle = self.handle;

        match tokio::time::timeout(drain_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "capture worker failed"),
            Err(_) => {
                handle.abort();
                tracing::warn!(
                    lost = self.stats.pending(),
                    timeout_ms = u64::try_from(drain_timeout.as_millis()).unwrap_or(u64::MAX),
                    "capture drain timed out, queued records lost"
                );
            }
        }
        let written = self.stats.written.load(Ordering::Relaxed);
        tracing::info!(
            written,
            dropped = self.stats.dropped.load(Ordering::Relaxed),
            failed = self.stats.failed.load(Ordering::Relaxed),
            "capture sink stopped"
        );
        written
    }
}

async fn run_worker<W: CaptureWriter>(
    mut writer: W,
    mut rx: mpsc::Receiver<CaptureRecord>,
    mut shutdown: oneshot::Receiver<()>,
    stats: Arc<SinkStats>,
) {
    loop {
        tokio::select! {
            biased;
            record = rx.recv() => {
                let Some(record) = record else { break };
                write_record(&mut writer, &record, &stats).await;
                if rx.is_empty() {
                    flush(&mut writer).await;
                }
            }
            // Resolves on an explicit shutdown or when the worker handle is dropped.
            _ = &mut shutdown => {
                rx.close();
                while let Some(record) = rx.recv().await {
                    write_record(&mut writer, &record, &stats).await;
                }
                break;
            }
        }
    }
    flush(&mut writer).await;
}

async fn write_record<W: CaptureWriter>(writer: &mut W, record: &CaptureRecord, stats: &SinkStats) {
    let result = match serde_json::to_vec(record) {
        Ok(mut line) => {
            line.push(b'\n');
            match writer.write_line(&line).await {
                Ok(()) => Ok(()),
                Err(source) => Err(CaptureError::Write {
                    path: writer.describe(),
                    source,
                }),
            }
        }
        Err(e) => Err(CaptureError::from(e)),
    };

    match result {
        Ok(()) => {
            stats.written.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                error = %e,
                method = %record.method,
                path = %record.path,
                "capture record dropped"
            );
        }
    }
}

async fn flush<W: CaptureWriter>(writer: &mut W) {
    if let Err(e) = writer.flush().await {
        tracing::error!(target_file = %writer.describe(), error = %e, "capture flush failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};

    use super::*;
    use crate::capture::record::{CapturedBody, Outcome, RequestSnapshot, ResponseCapture};

    #[derive(Clone, Default)]
    struct MemoryWriter {
        buf: Arc<Mutex<Vec<u8>>>,
        delay: Duration,
        fail: bool,
    }

    impl MemoryWriter {
        fn lines(&self) -> Vec<serde_json::Value> {
            let buf = self.buf.lock().unwrap();
            String::from_utf8(buf.clone())
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl CaptureWriter for MemoryWriter {
        fn describe(&self) -> String {
            "memory".into()
        }

        async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            self.buf.lock().unwrap().extend_from_slice(line);
            Ok(())
        }

        async fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn record(path: &str) -> CaptureRecord {
        RequestSnapshot::new(
            &Method::GET,
            &path.parse().unwrap(),
            &HeaderMap::new(),
            &Bytes::new(),
        )
        .into_record(ResponseCapture {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: CapturedBody::Text("ok".into()),
            elapsed: Duration::from_millis(1),
            outcome: Outcome::Complete,
            error: None,
        })
    }

    #[tokio::test]
    async fn shutdown_drains_queued_records() {
        let writer = MemoryWriter::default();
        let (sink, worker) = CaptureSink::open(writer.clone(), 64);
        for i in 0..10 {
            assert!(sink.submit(record(&format!("/r/{i}"))));
        }

        let written = worker.shutdown(Duration::from_secs(5)).await;
        assert_eq!(written, 10);

        let lines = writer.lines();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0]["path"], "/r/0");
        assert_eq!(lines[9]["path"], "/r/9");
    }

    #[tokio::test]
    async fn full_queue_drops_with_count() {
        let writer = MemoryWriter::default();
        let (sink, worker) = CaptureSink::open(writer.clone(), 2);

        // Current-thread runtime: the worker cannot run until we yield.
        assert!(sink.submit(record("/a")));
        assert!(sink.submit(record("/b")));
        assert!(!sink.submit(record("/c")));
        assert_eq!(sink.stats().dropped.load(Ordering::Relaxed), 1);

        assert_eq!(worker.shutdown(Duration::from_secs(5)).await, 2);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_dropped() {
        let (sink, worker) = CaptureSink::open(MemoryWriter::default(), 4);
        worker.shutdown(Duration::from_secs(1)).await;
        assert!(!sink.submit(record("/late")));
    }

    #[tokio::test]
    async fn slow_writer_does_not_block_submit() {
        let writer = MemoryWriter {
            delay: Duration::from_millis(200),
            ..MemoryWriter::default()
        };
        let (sink, worker) = CaptureSink::open(writer.clone(), 16);

        let start = Instant::now();
        for i in 0..5 {
            sink.submit(record(&format!("/slow/{i}")));
        }
        assert!(start.elapsed() < Duration::from_millis(50));

        assert_eq!(worker.shutdown(Duration::from_secs(5)).await, 5);
    }

    #[tokio::test]
    async fn write_failures_are_counted_not_propagated() {
        let writer = MemoryWriter {
            fail: true,
            ..MemoryWriter::default()
        };
        let (sink, worker) = CaptureSink::open(writer, 8);
        assert!(sink.submit(record("/x")));
        assert!(sink.submit(record("/y")));

        assert_eq!(worker.shutdown(Duration::from_secs(1)).await, 0);
        assert_eq!(sink.stats().failed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn drain_timeout_bounds_shutdown() {
        let writer = MemoryWriter {
            delay: Duration::from_secs(60),
            ..MemoryWriter::default()
        };
        let (sink, worker) = CaptureSink::open(writer, 8);
        sink.submit(record("/stuck"));

        let start = Instant::now();
        assert_eq!(worker.shutdown(Duration::from_millis(50)).await, 0);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
