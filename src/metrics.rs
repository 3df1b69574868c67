// ═══════════════════════════════════════════════════════════════
// METRICS — Because "is it still watching?" deserves a real answer
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters for every interesting thing a cycle does, plus a tiny
// HTTP endpoint that hands out a JSON snapshot to whoever asks. No routing,
// no keep-alive, no framework. Connect, get JSON, goodbye.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Anything bigger than this is not a request we want to answer.
const MAX_REQUEST_HEAD: usize = 8 * 1024;
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(2);

use crate::writers::{WriterSnapshot, WriterStats};

/// What gets serialized to JSON
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub cycles_started: u64,
    pub cycles_finished: u64,
    pub crawlers_due: u64,
    pub tracks_crawled: u64,
    pub crawl_errors: u64,
    pub crawler_panics: u64,
    pub writes_dispatched: u64,
    pub writes_in_flight: u64,
    pub uptime_seconds: u64,
    pub tracks_per_minute: f64,
    pub writer: Option<WriterSnapshot>,
    pub status: String,
}

/// Thread-safe atomic metrics shared by the watcher and every cycle it spawns
pub struct WatchMetrics {
    cycles_started: AtomicU64,
    cycles_finished: AtomicU64,
    crawlers_due: AtomicU64,
    tracks_crawled: AtomicU64,
    crawl_errors: AtomicU64,
    crawler_panics: AtomicU64,
    writes_dispatched: AtomicU64,
    writes_in_flight: AtomicU64,
    writer: Option<Arc<WriterStats>>,
    start_time: Instant,
}

impl Default for WatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchMetrics {
    pub fn new() -> Self {
        Self {
            cycles_started: AtomicU64::new(0),
            cycles_finished: AtomicU64::new(0),
            crawlers_due: AtomicU64::new(0),
            tracks_crawled: AtomicU64::new(0),
            crawl_errors: AtomicU64::new(0),
            crawler_panics: AtomicU64::new(0),
            writes_dispatched: AtomicU64::new(0),
            writes_in_flight: AtomicU64::new(0),
            writer: None,
            start_time: Instant::now(),
        }
    }

    /// Include a writer's own counters in every snapshot.
    pub fn with_writer_stats(mut self, stats: Arc<WriterStats>) -> Self {
        self.writer = Some(stats);
        self
    }

    pub fn cycle_started(&self, due: usize) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
        self.crawlers_due.fetch_add(due as u64, Ordering::Relaxed);
    }

    pub fn cycle_finished(&self) {
        self.cycles_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_crawled(&self) {
        self.tracks_crawled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_crawl_errors(&self) {
        self.crawl_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_panics(&self) {
        self.crawler_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_dispatched(&self) {
        self.writes_dispatched.fetch_add(1, Ordering::Relaxed);
        self.writes_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_completed(&self) {
        self.writes_in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all metrics (lock-free reads)
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        let tracks_crawled = self.tracks_crawled.load(Ordering::Relaxed);
        let tracks_per_minute = if uptime > 0 {
            (tracks_crawled as f64 / uptime as f64) * 60.0
        } else {
            0.0
        };

        MetricsSnapshot {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_finished: self.cycles_finished.load(Ordering::Relaxed),
            crawlers_due: self.crawlers_due.load(Ordering::Relaxed),
            tracks_crawled,
            crawl_errors: self.crawl_errors.load(Ordering::Relaxed),
            crawler_panics: self.crawler_panics.load(Ordering::Relaxed),
            writes_dispatched: self.writes_dispatched.load(Ordering::Relaxed),
            writes_in_flight: self.writes_in_flight.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            tracks_per_minute,
            writer: self.writer.as_ref().map(|w| w.snapshot()),
            status: "watching".to_string(),
        }
    }
}

/// Bind `0.0.0.0:<port>` and serve metrics until shutdown.
pub async fn run_metrics_server(
    metrics: Arc<WatchMetrics>,
    port: u16,
    shutdown: &mut watch::Receiver<bool>,
) {
    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(l) => l,
        Err(e) => {
            error!(port = port, error = %e, "Failed to bind metrics server");
            return;
        }
    };

    info!("📊 Metrics server listening on http://0.0.0.0:{}", port);
    serve_metrics(listener, metrics, shutdown).await;
}

/// Answer every connection on `listener` with a JSON snapshot.
pub async fn serve_metrics(
    listener: TcpListener,
    metrics: Arc<WatchMetrics>,
    shutdown: &mut watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _addr)) => {
                        tokio::spawn(answer(stream, Arc::clone(&metrics)));
                    }
                    Err(e) => {
                        error!(error = %e, "Metrics server accept error");
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("Metrics server: shutting down");
                break;
            }
        }
    }
}

/// Read the request head (whatever it asks for), then send the snapshot.
async fn answer(mut stream: TcpStream, metrics: Arc<WatchMetrics>) {
    match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_head(&mut stream)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            debug!(error = %e, "Metrics request could not be read");
            return;
        }
        Err(_) => {
            debug!("Metrics client sent no request in time");
            return;
        }
    }

    let json = serde_json::to_string_pretty(&metrics.snapshot()).unwrap_or_else(|_| "{}".to_string());
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: *\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        json.len(),
        json,
    );

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "Failed to send metrics response");
        return;
    }
    let _ = stream.shutdown().await;
}

async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        head.extend_from_slice(&buf[..n]);
        if head.len() > MAX_REQUEST_HEAD {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request head too large",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get(addr: std::net::SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_counters_and_in_flight_gauge() {
        let metrics = WatchMetrics::new();
        metrics.cycle_started(3);
        metrics.increment_crawled();
        metrics.increment_crawl_errors();
        metrics.increment_panics();
        metrics.write_dispatched();
        metrics.write_dispatched();
        metrics.write_completed();
        metrics.cycle_finished();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cycles_started, 1);
        assert_eq!(snapshot.cycles_finished, 1);
        assert_eq!(snapshot.crawlers_due, 3);
        assert_eq!(snapshot.tracks_crawled, 1);
        assert_eq!(snapshot.crawl_errors, 1);
        assert_eq!(snapshot.crawler_panics, 1);
        assert_eq!(snapshot.writes_dispatched, 2);
        assert_eq!(snapshot.writes_in_flight, 1);
        assert!(snapshot.writer.is_none());
    }

    #[test]
    fn test_writer_stats_are_included() {
        let stats = Arc::new(WriterStats::new());
        stats.record_written();
        let metrics = WatchMetrics::new().with_writer_stats(Arc::clone(&stats));

        assert_eq!(metrics.snapshot().writer.map(|w| w.written), Some(1));
    }

    #[tokio::test]
    async fn test_serves_json_snapshot() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let metrics = Arc::new(WatchMetrics::new());
        metrics.cycle_started(2);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = tokio::spawn({
            let metrics = Arc::clone(&metrics);
            async move { serve_metrics(listener, metrics, &mut shutdown_rx).await }
        });

        let response = get(addr).await;

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        let body = response.split("\r\n\r\n").nth(1).unwrap();
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["crawlers_due"], 2);
        assert_eq!(json["status"], "watching");

        shutdown_tx.send(true).unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_client_does_not_block_others() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let metrics = Arc::new(WatchMetrics::new());

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = tokio::spawn({
            let metrics = Arc::clone(&metrics);
            async move { serve_metrics(listener, metrics, &mut shutdown_rx).await }
        });

        let _silent = TcpStream::connect(addr).await.unwrap();
        let response = tokio::time::timeout(Duration::from_secs(1), get(addr))
            .await
            .expect("second client must be answered");
        assert!(response.starts_with("HTTP/1.1 200 OK"));

        shutdown_tx.send(true).unwrap();
        server.await.unwrap();
    }
}
