use super::json_path::JsonPath;
use super::{BulkLoader, CopyRequest, JsonFormat, LoadReport};
use crate::error::{Result, WarehouseError};
use crate::metrics;
use crate::schema::{self, TableSpec};
use crate::warehouse::{Batch, Statement, TransactionalExecutor, Value};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

/// Bulk loader for JSON files on the local filesystem.
///
/// Accepts `file://` URIs and plain paths. A directory is walked recursively
/// in file-name order and every `*.json` file is read; each file may hold one
/// object or many concatenated / newline-delimited objects. Object storage
/// schemes are rejected.
pub struct LocalJsonLoader {
    executor: Arc<dyn TransactionalExecutor>,
}

impl LocalJsonLoader {
    pub fn new(executor: Arc<dyn TransactionalExecutor>) -> Self {
        Self { executor }
    }
}

fn resolve_local_path(uri: &str) -> Result<PathBuf> {
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    if let Some((scheme, _)) = uri.split_once("://") {
        return Err(WarehouseError::UnsupportedSource {
            uri: uri.to_string(),
            reason: format!("scheme '{}' needs a remote bulk loader", scheme),
        });
    }
    Ok(PathBuf::from(uri))
}

fn source_files(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        return Err(WarehouseError::UnsupportedSource {
            uri: root.display().to_string(),
            reason: "no such file or directory".to_string(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| WarehouseError::Io(e.into()))?;
        let is_json = entry
            .path()
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        if entry.file_type().is_file() && is_json {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Render one JSON scalar the way a wide string column stores it.
fn stringify(value: Option<&serde_json::Value>) -> Value {
    match value {
        None | Some(serde_json::Value::Null) => Value::Null,
        Some(serde_json::Value::String(s)) => Value::Text(s.clone()),
        Some(other) => Value::Text(other.to_string()),
    }
}

enum ColumnMapping {
    ByName { ignore_case: bool },
    ByPath(Vec<JsonPath>),
}

impl ColumnMapping {
    fn for_request(format: &JsonFormat, table: &TableSpec) -> Result<Self> {
        match format {
            JsonFormat::Auto => Ok(ColumnMapping::ByName { ignore_case: false }),
            JsonFormat::AutoIgnoreCase => Ok(ColumnMapping::ByName { ignore_case: true }),
            JsonFormat::JsonPaths(location) => {
                let path = resolve_local_path(location)?;
                let paths = JsonPath::parse_file(&fs::read_to_string(&path)?)?;
                if paths.len() != table.columns.len() {
                    return Err(WarehouseError::Config(format!(
                        "JSONPaths file '{}' has {} expressions but {} has {} columns",
                        path.display(),
                        paths.len(),
                        table.name,
                        table.columns.len()
                    )));
                }
                Ok(ColumnMapping::ByPath(paths))
            }
        }
    }

    fn row(&self, table: &TableSpec, record: &serde_json::Value) -> Vec<Value> {
        match self {
            ColumnMapping::ByPath(paths) => paths.iter().map(|p| stringify(p.evaluate(record))).collect(),
            ColumnMapping::ByName { ignore_case } => {
                let object = record.as_object();
                table
                    .columns
                    .iter()
                    .map(|column| {
                        let found = object.and_then(|o| {
                            if *ignore_case {
                                o.iter()
                                    .find(|(k, _)| k.eq_ignore_ascii_case(column.name))
                                    .map(|(_, v)| v)
                            } else {
                                o.get(column.name)
                            }
                        });
                        stringify(found)
                    })
                    .collect()
            }
        }
    }
}

#[async_trait]
impl BulkLoader for LocalJsonLoader {
    #[instrument(skip(self, request), fields(table = %request.table, source = %request.source_uri))]
    async fn load(&self, request: &CopyRequest) -> Result<LoadReport> {
        let table = schema::table_spec(&request.table)
            .ok_or_else(|| WarehouseError::Config(format!("Unknown target table '{}'", request.table)))?;
        let mapping = ColumnMapping::for_request(&request.format, table)?;
        let files = source_files(&resolve_local_path(&request.source_uri)?)?;
        debug!(
            "Loading {} file(s) into {} (region {}, credential {})",
            files.len(),
            table.name,
            request.region,
            request.credential
        );

        let insert_sql = table.insert_sql();
        let mut batch = Batch::new(format!("copy:{}", table.name));
        for file in &files {
            let content = fs::read_to_string(file)?;
            let records = serde_json::Deserializer::from_str(&content).into_iter::<serde_json::Value>();
            for (index, record) in records.enumerate() {
                let record = record?;
                if !record.is_object() {
                    return Err(WarehouseError::UnsupportedSource {
                        uri: file.display().to_string(),
                        reason: format!("record {} is not a JSON object", index),
                    });
                }
                batch.push(Statement::with_params(insert_sql.clone(), mapping.row(table, &record)));
            }
        }

        let rows = batch.len();
        self.executor.execute_batch(&batch).await?;

        metrics::source_files_loaded(table.name, files.len());
        metrics::rows_written(table.name, rows);
        info!("Copied {} rows from {} file(s) into {}", rows, files.len(), table.name);

        Ok(LoadReport {
            table: table.name.to_string(),
            files: files.len(),
            rows,
        })
    }
}
