//! Pipeline metrics, recorded through the `metrics` facade.
//!
//! Nothing here installs a recorder; the binary or an embedding service
//! decides where the numbers go.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::sync::Once;

pub const BATCHES_COMMITTED: &str = "dwh_batches_committed_total";
pub const BATCHES_FAILED: &str = "dwh_batches_failed_total";
pub const BATCH_DURATION: &str = "dwh_batch_duration_seconds";
pub const ROWS_WRITTEN: &str = "dwh_rows_written_total";
pub const SOURCE_FILES_LOADED: &str = "dwh_source_files_loaded_total";
pub const RESOLVER_ROWS: &str = "dwh_resolver_rows_total";

static REGISTER: Once = Once::new();

/// Describe every metric once so exporters can publish help text.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        describe_counter!(BATCHES_COMMITTED, "Statement batches committed");
        describe_counter!(BATCHES_FAILED, "Statement batches rolled back");
        describe_histogram!(BATCH_DURATION, Unit::Seconds, "Wall time per statement batch");
        describe_counter!(ROWS_WRITTEN, "Rows written per target table");
        describe_counter!(SOURCE_FILES_LOADED, "Source files read by the bulk loader");
        describe_counter!(RESOLVER_ROWS, "Artist identity rows emitted per resolution step");
    });
}

pub fn batch_committed(batch: &str, duration_secs: f64) {
    counter!(BATCHES_COMMITTED, "batch" => batch.to_string()).increment(1);
    histogram!(BATCH_DURATION, "batch" => batch.to_string()).record(duration_secs);
}

pub fn batch_failed(batch: &str) {
    counter!(BATCHES_FAILED, "batch" => batch.to_string()).increment(1);
}

pub fn rows_written(table: &str, rows: usize) {
    counter!(ROWS_WRITTEN, "table" => table.to_string()).increment(rows as u64);
}

pub fn source_files_loaded(table: &str, files: usize) {
    counter!(SOURCE_FILES_LOADED, "table" => table.to_string()).increment(files as u64);
}

pub fn resolver_rows(step: u8, rows: usize) {
    counter!(RESOLVER_ROWS, "step" => step.to_string()).increment(rows as u64);
}
