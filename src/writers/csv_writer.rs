// =============================================================================
// writers/csv_writer.rs — THE SPREADSHEET WHISPERER
// =============================================================================
//
// "CSV" in the loosest sense: tab-separated, because commas show up in
// song titles and tabs (so far) don't.
//
//   artist<TAB>title<TAB>station<TAB>crawl_time
// =============================================================================

use std::sync::Arc;

use crate::models::TrackInfo;
use crate::writers::file_writer::FileWriter;
use crate::writers::{Writer, WriterStats};

const SEPARATOR: &str = "\t";

/// Appends one tab-separated line per track to `<path>/<station>.csv`.
#[derive(Debug)]
pub struct CsvWriter {
    file: FileWriter,
    stats: Arc<WriterStats>,
}

impl CsvWriter {
    /// Takes the directory at which the results are saved.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            file: FileWriter::new(path),
            stats: Arc::new(WriterStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<WriterStats> {
        Arc::clone(&self.stats)
    }

    fn format_line(track: &TrackInfo) -> String {
        let crawl_time = track.crawl_time.to_rfc3339();
        let mut line = [
            track.artist.as_str(),
            track.title.as_str(),
            track.station.as_str(),
            crawl_time.as_str(),
        ]
        .join(SEPARATOR);
        line.push('\n');
        line
    }
}

#[async_trait::async_trait]
impl Writer for CsvWriter {
    async fn write(&self, track: TrackInfo) {
        let path = self.file.station_file(&track.normalized_station_name(), "csv");
        let line = Self::format_line(&track);

        if self.file.write_file(&path, line.as_bytes(), &track.station).await {
            self.stats.record_written();
        } else {
            self.stats.record_error();
        }
    }
}
