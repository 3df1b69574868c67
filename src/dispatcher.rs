// =============================================================================
// dispatcher.rs — ONE CYCLE, START TO FINISH
// =============================================================================
//
// A cycle is one pass over the station registry:
//
//   snapshot "now"  ──►  pick due crawlers  ──►  one task per crawler
//                                                    │  (panic boundary)
//                                                    ▼
//        writer tasks  ◄──  fan-in consumer  ◄──  capacity-1 channel
//       (detached, never awaited)
//
// "Due" is decided against ONE timestamp taken at the start of the cycle.
// A station that becomes due while the cycle is busy waits for the next
// tick; it is never picked up mid-cycle.
//
// Every probe task owns a clone of the fan-in sender. The channel closes
// when the last task finishes, and that closing IS the completion barrier:
// the consumer loop ends exactly when every due crawler has either
// produced a track, failed, or panicked. A crawler whose next_crawl_time
// panics is logged and left out of the cycle.
//
// The capacity-1 channel makes a probe task wait until the consumer takes
// its outcome. The consumer itself never waits for a writer: each track is
// handed to a freshly spawned task and forgotten. Write tasks are not
// tracked or bounded; the in-flight gauge in WatchMetrics shows how many
// are outstanding.
//
// Nothing here has a timeout. A crawler that hangs keeps its cycle open
// forever (and the summary line never gets logged), but the watcher's next
// tick starts a new cycle regardless.
// =============================================================================

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::crawler::{CrawlError, Crawler};
use crate::metrics::WatchMetrics;
use crate::models::TrackInfo;
use crate::writers::Writer;

/// How one crawler's turn in a cycle ended.
#[derive(Debug)]
pub enum CrawlOutcome {
    /// A track, already trimmed.
    Crawled(TrackInfo),
    /// The crawler returned an error.
    Failed { crawler: String, error: CrawlError },
    /// The crawler panicked; `message` is the panic payload.
    Panicked { crawler: String, message: String },
}

/// What a finished cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub due: usize,
    pub crawled: usize,
    pub failed: usize,
    /// Panics in `crawl`, plus panics in `next_crawl_time` (those crawlers
    /// are skipped and not counted as due).
    pub panicked: usize,
    pub writes_dispatched: usize,
    pub duration: Duration,
}

impl CycleReport {
    fn new(cycle_id: Uuid, due: usize) -> Self {
        Self {
            cycle_id,
            due,
            crawled: 0,
            failed: 0,
            panicked: 0,
            writes_dispatched: 0,
            duration: Duration::ZERO,
        }
    }
}

/// Runs polling cycles over a fixed set of crawlers.
///
/// Cheap to clone; every clone shares the same crawlers, writer and metrics.
#[derive(Clone)]
pub struct CycleDispatcher {
    crawlers: Arc<[Arc<dyn Crawler>]>,
    writer: Arc<dyn Writer>,
    metrics: Arc<WatchMetrics>,
}

impl CycleDispatcher {
    pub fn new(
        crawlers: Arc<[Arc<dyn Crawler>]>,
        writer: Arc<dyn Writer>,
        metrics: Arc<WatchMetrics>,
    ) -> Self {
        Self {
            crawlers,
            writer,
            metrics,
        }
    }

    pub fn crawler_count(&self) -> usize {
        self.crawlers.len()
    }

    /// Run one cycle. Returns once every due crawler has finished and every
    /// track has been handed to a write task; the writes themselves may
    /// still be running.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let start = Utc::now();
        let started = Instant::now();

        let mut due: Vec<Arc<dyn Crawler>> = Vec::new();
        let mut schedule_panics = 0;
        for crawler in self.crawlers.iter() {
            match std::panic::catch_unwind(AssertUnwindSafe(|| crawler.next_crawl_time())) {
                Ok(next) if next < start => due.push(Arc::clone(crawler)),
                Ok(_) => {}
                Err(payload) => {
                    schedule_panics += 1;
                    self.metrics.increment_panics();
                    error!(
                        cycle_id = %cycle_id,
                        crawler = %crawler.name(),
                        message = %panic_message(payload.as_ref()),
                        "Crawler panicked"
                    );
                }
            }
        }

        let mut report = CycleReport::new(cycle_id, due.len());
        report.panicked = schedule_panics;
        self.metrics.cycle_started(due.len());

        let (tx, mut rx) = mpsc::channel::<CrawlOutcome>(1);
        for crawler in due {
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = probe(crawler, cycle_id).await;
                // The consumer only goes away if the cycle itself was dropped.
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        while let Some(outcome) = rx.recv().await {
            match outcome {
                CrawlOutcome::Crawled(track) => {
                    report.crawled += 1;
                    self.metrics.increment_crawled();
                    self.dispatch_write(track);
                    report.writes_dispatched += 1;
                }
                CrawlOutcome::Failed { .. } => {
                    report.failed += 1;
                    self.metrics.increment_crawl_errors();
                }
                CrawlOutcome::Panicked { .. } => {
                    report.panicked += 1;
                    self.metrics.increment_panics();
                }
            }
        }

        report.duration = started.elapsed();
        self.metrics.cycle_finished();

        if report.due > 0 {
            info!(
                cycle_id = %cycle_id,
                count = report.due,
                crawled = report.crawled,
                failed = report.failed + report.panicked,
                duration_secs = report.duration.as_secs_f64(),
                "Crawling finished"
            );
        }

        report
    }

    /// Hand a track to the writer in its own task and move on.
    fn dispatch_write(&self, track: TrackInfo) {
        let writer = Arc::clone(&self.writer);
        let in_flight = InFlightWrite::start(Arc::clone(&self.metrics));
        tokio::spawn(async move {
            let _in_flight = in_flight;
            writer.write(track).await;
        });
    }
}

/// Keeps the in-flight write gauge honest even if a writer panics.
struct InFlightWrite(Arc<WatchMetrics>);

impl InFlightWrite {
    fn start(metrics: Arc<WatchMetrics>) -> Self {
        metrics.write_dispatched();
        Self(metrics)
    }
}

impl Drop for InFlightWrite {
    fn drop(&mut self) {
        self.0.write_completed();
    }
}

/// Crawl once inside a panic boundary and log whatever went wrong.
async fn probe(crawler: Arc<dyn Crawler>, cycle_id: Uuid) -> CrawlOutcome {
    let name = crawler.name().to_string();

    match AssertUnwindSafe(crawler.crawl()).catch_unwind().await {
        Ok(Ok(track)) => {
            info!(
                cycle_id = %cycle_id,
                station = %track.station,
                artist = %track.artist,
                title = %track.title,
                "Crawled station"
            );
            CrawlOutcome::Crawled(track.trimmed())
        }
        Ok(Err(error)) => {
            error!(
                cycle_id = %cycle_id,
                crawler = %name,
                error = %error,
                "Error while crawling"
            );
            CrawlOutcome::Failed {
                crawler: name,
                error,
            }
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                cycle_id = %cycle_id,
                crawler = %name,
                message = %message,
                "Crawler panicked"
            );
            CrawlOutcome::Panicked {
                crawler: name,
                message,
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
