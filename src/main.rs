// ██████╗  █████╗ ██████╗ ██╗ ██████╗
// ██╔══██╗██╔══██╗██╔══██╗██║██╔═══██╗
// ██████╔╝███████║██║  ██║██║██║   ██║
// ██╔══██╗██╔══██║██║  ██║██║██║   ██║
// ██║  ██║██║  ██║██████╔╝██║╚██████╔╝
// ╚═╝  ╚═╝╚═╝  ╚═╝╚═════╝ ╚═╝ ╚═════╝
//
// W A T C H
//
// Asks every radio station in the stations file what it is playing,
// once a minute, forever, and writes the answers down.
// Somebody has to know how often they really play that one song.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use radiowatch::config::{Config, WriterKind};
use radiowatch::crawlers::{build_crawlers, http_client, load_stations};
use radiowatch::dedup::RepeatGuard;
use radiowatch::metrics::{self, WatchMetrics};
use radiowatch::watcher::Watcher;
use radiowatch::writers::{CsvWriter, JsonWriter, RedisWriter, Writer, WriterStats};

/// How long in-flight cycles and writes get after Ctrl+C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn print_banner() {
    let banner = r#"

    ╔══════════════════════════════════════════════════╗
    ║                                                  ║
    ║     ((( •  R A D I O W A T C H  • )))            ║
    ║                                                  ║
    ║   Crawls:   every station, on its own schedule   ║
    ║   Writes:   CSV | JSON lines | Redis             ║
    ║   Panics:   caught, logged, ignored              ║
    ║                                                  ║
    ║   "They said it was on heavy rotation.           ║
    ║    We counted."                                  ║
    ║                                                  ║
    ╚══════════════════════════════════════════════════╝

    "#;
    println!("{}", banner);
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.with_ansi(true).init();
    }
}

/// Build the configured writer and hand back its counters alongside it.
async fn build_writer(config: &Config) -> anyhow::Result<(Arc<dyn Writer>, Arc<WriterStats>)> {
    match config.writer {
        WriterKind::Csv | WriterKind::Json => {
            tokio::fs::create_dir_all(&config.output_dir)
                .await
                .with_context(|| format!("creating output directory {}", config.output_dir))?;

            if config.writer == WriterKind::Csv {
                let writer = CsvWriter::new(config.output_dir.clone());
                let stats = writer.stats();
                Ok((Arc::new(writer), stats))
            } else {
                let writer = JsonWriter::new(config.output_dir.clone());
                let stats = writer.stats();
                Ok((Arc::new(writer), stats))
            }
        }
        WriterKind::Redis => {
            let guard = Arc::new(RepeatGuard::new(config.repeat_memory));
            let writer = RedisWriter::new(&config.redis_url, config.redis_prefix.clone(), guard)
                .context("creating Redis writer")?;
            let stats = writer.stats();
            Ok((Arc::new(writer), stats))
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // Logging first: parsing the rest of the config may already warn.
    init_tracing(Config::log_json_from_env());
    let config = Config::from_env();

    if !config.log_json {
        print_banner();
    }

    info!(
        writer = %config.writer,
        stations_file = %config.stations_file,
        interval = %config.refresh_interval,
        "📻 radiowatch initializing..."
    );

    let (writer, writer_stats) = build_writer(&config).await?;
    info!(writer = %config.writer, "✅ Writer ready");

    let metrics = Arc::new(WatchMetrics::new().with_writer_stats(writer_stats));

    let stations = load_stations(&config.stations_file)
        .await
        .with_context(|| format!("loading stations from {}", config.stations_file))?;
    if stations.is_empty() {
        warn!(stations_file = %config.stations_file, "No stations configured, nothing will be crawled");
    }

    let client = http_client(config.http_timeout).context("building HTTP client")?;
    let crawlers = build_crawlers(stations, &client, config.breaker);
    info!(count = crawlers.len(), "✅ Crawlers built");

    let mut watcher = Watcher::new(writer).with_metrics(Arc::clone(&metrics));
    watcher.set_interval(&config.refresh_interval)?;
    watcher.add_crawlers(crawlers);

    // Shutdown signal for the metrics server
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics_handle = if config.metrics_port != 0 {
        let metrics = Arc::clone(&metrics);
        let port = config.metrics_port;
        let mut shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            metrics::run_metrics_server(metrics, port, &mut shutdown).await;
            info!("📊 Metrics server: OFFLINE");
        }))
    } else {
        None
    };

    let first = watcher.start_crawling().await?;
    info!(
        due = first.due,
        crawled = first.crawled,
        failed = first.failed + first.panicked,
        "═══ 🟢 WATCHING. Press Ctrl+C to stop ═══"
    );

    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "❌ Signal listener error");
    }
    warn!("🛑 Shutdown signal received!");

    watcher.stop_crawling()?;
    let _ = shutdown_tx.send(true);

    info!(grace = ?SHUTDOWN_GRACE, "⏳ Giving in-flight crawls and writes a moment...");
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    while metrics.snapshot().writes_in_flight > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    let snapshot = metrics.snapshot();
    info!(
        cycles = snapshot.cycles_finished,
        tracks = snapshot.tracks_crawled,
        writes_in_flight = snapshot.writes_in_flight,
        "📻 radiowatch: OFFLINE"
    );
    Ok(())
}
