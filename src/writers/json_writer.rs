// =============================================================================
// writers/json_writer.rs — THE JSON LINES SCRIBE
// =============================================================================
//
// One JSON object per line in `<station>.rwjson`. Greppable, streamable,
// and readable by anything that has ever heard of JSON.
// =============================================================================

use std::sync::Arc;

use tracing::error;

use crate::models::TrackInfo;
use crate::writers::file_writer::FileWriter;
use crate::writers::{Writer, WriterStats};

/// Converts each track to a JSON line and appends it to
/// `<path>/<station>.rwjson`.
#[derive(Debug)]
pub struct JsonWriter {
    file: FileWriter,
    stats: Arc<WriterStats>,
}

impl JsonWriter {
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
}

#[async_trait::async_trait]
impl Writer for JsonWriter {
    async fn write(&self, track: TrackInfo) {
        let mut buffer = match serde_json::to_vec(&track) {
            Ok(buffer) => buffer,
            Err(e) => {
                error!(
                    station = %track.station,
                    error = %e,
                    "Error while converting result to json"
                );
                self.stats.record_error();
                return;
            }
        };
        buffer.push(b'\n');

        let path = self.file.station_file(&track.normalized_station_name(), "rwjson");
        if self.file.write_file(&path, &buffer, &track.station).await {
            self.stats.record_written();
        } else {
            self.stats.record_error();
        }
    }
}
