//! Raw staging loader: bulk copy of source JSON into string-typed tables.

pub mod json_path;
pub mod local_json;

pub use local_json::LocalJsonLoader;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// How source records are mapped onto the target table's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonFormat {
    /// Object keys match column names exactly
    Auto,
    /// Object keys match column names ignoring ASCII case
    AutoIgnoreCase,
    /// A JSONPaths file whose expressions map positionally onto the columns
    JsonPaths(String),
}

impl JsonFormat {
    pub fn parse(spec: &str) -> Self {
        match spec.trim().to_ascii_lowercase().as_str() {
            "auto" => JsonFormat::Auto,
            "auto ignorecase" => JsonFormat::AutoIgnoreCase,
            _ => JsonFormat::JsonPaths(spec.trim().to_string()),
        }
    }

    /// The value of the COPY `JSON '...'` option.
    pub fn as_copy_option(&self) -> &str {
        match self {
            JsonFormat::Auto => "auto",
            JsonFormat::AutoIgnoreCase => "auto ignorecase",
            JsonFormat::JsonPaths(path) => path,
        }
    }
}

/// Everything a bulk load needs: where from, where to, and as whom.
#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub source_uri: String,
    pub table: String,
    pub credential: String,
    pub region: String,
    pub format: JsonFormat,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoadReport {
    pub table: String,
    pub files: usize,
    pub rows: usize,
}

#[async_trait]
pub trait BulkLoader: Send + Sync {
    /// Populate `request.table` with one row per source record.
    async fn load(&self, request: &CopyRequest) -> Result<LoadReport>;
}
