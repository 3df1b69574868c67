// =============================================================================
// crawlers/mod.rs — THE LISTENING POST
// =============================================================================
//
// Concrete crawlers live here. Right now that's one generic JSON crawler
// that covers every station with a "now playing" endpoint, configured from
// the stations file. Stations that need HTML scraping or an ICY metadata
// stream get their own Crawler implementation next to it.
// =============================================================================

pub mod now_playing;
pub mod stations;

use std::sync::Arc;

pub use now_playing::{http_client, NowPlayingCrawler};
pub use stations::{load_stations, parse_stations, Station, StationConfig, StationError};

use crate::circuit_breaker::BreakerSettings;
use crate::crawler::Crawler;

/// One NowPlayingCrawler per station, all sharing one HTTP client.
pub fn build_crawlers(
    stations: Vec<Station>,
    client: &reqwest::Client,
    breaker: BreakerSettings,
) -> Vec<Arc<dyn Crawler>> {
    stations
        .into_iter()
        .map(|station| {
            Arc::new(NowPlayingCrawler::new(station, client.clone(), breaker)) as Arc<dyn Crawler>
        })
        .collect()
}
