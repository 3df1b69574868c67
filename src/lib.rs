//! radiowatch: polls radio stations for what they are playing and writes
//! every track down.
//!
//! The moving parts:
//!
//! - [`Watcher`] owns the station registry and the refresh interval, and
//!   starts a crawling cycle on every tick.
//! - [`CycleDispatcher`] runs one cycle: every due [`Crawler`] in its own
//!   task behind a panic boundary, results funneled through one channel,
//!   each track handed to the [`Writer`] without waiting for it.
//! - [`crawlers`] and [`writers`] hold the concrete implementations.

pub mod circuit_breaker;
pub mod config;
pub mod crawler;
pub mod crawlers;
pub mod dedup;
pub mod dispatcher;
pub mod metrics;
pub mod models;
pub mod watcher;
pub mod writers;

#[cfg(test)]
mod testing;

pub use config::{Config, WriterKind};
pub use crawler::{CrawlError, Crawler};
pub use dispatcher::{CrawlOutcome, CycleDispatcher, CycleReport};
pub use metrics::WatchMetrics;
pub use models::TrackInfo;
pub use watcher::{WatchError, Watcher};
pub use writers::Writer;
