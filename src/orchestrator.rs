//! Sequences the pipeline stages. Each stage commits its own batch; no stage
//! starts until the previous one has committed.

use crate::config::Settings;
use crate::constants::*;
use crate::dimensions::{build_dimensional_model, read_canonical_identities, DimensionalModel};
use crate::error::Result;
use crate::ingestion::{BulkLoader, CopyRequest, JsonFormat, LoadReport};
use crate::resolution::{resolve_artists, ArtistResolution, ResolverOptions};
use crate::schema::{
    copy_sql, recreate_statements, truncate_statements, Dialect, DWH_TABLES, INTERMEDIATE_STAGING_TABLES,
    RAW_STAGING_TABLES,
};
use crate::staging::{read_events, read_song_observations};
use crate::warehouse::{insert_statements, Batch, TransactionalExecutor};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Outcome of one ETL run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub loads: Vec<LoadReport>,
    /// Rows written per table by the intermediate and DWH batches
    pub rows_written: BTreeMap<String, usize>,
    pub skipped_plays: usize,
}

/// The two raw copies: events through the JSONPaths file, songs by column name.
pub fn copy_requests(settings: &Settings) -> [CopyRequest; 2] {
    [
        CopyRequest {
            source_uri: settings.s3.log_data.clone(),
            table: STAGING_EVENTS_TABLE.to_string(),
            credential: settings.iam_role.arn.clone(),
            region: settings.s3.bucket_region.clone(),
            format: JsonFormat::parse(&settings.s3.log_jsonpath),
        },
        CopyRequest {
            source_uri: settings.s3.song_data.clone(),
            table: STAGING_SONGS_TABLE.to_string(),
            credential: settings.iam_role.arn.clone(),
            region: settings.s3.bucket_region.clone(),
            format: JsonFormat::parse(SONG_DATA_FORMAT),
        },
    ]
}

/// Full table script for `dialect` followed by the raw COPY statements.
pub fn render_sql_script(settings: &Settings, dialect: Dialect) -> String {
    let mut statements: Vec<String> = Vec::new();
    for layer in [&RAW_STAGING_TABLES[..], &INTERMEDIATE_STAGING_TABLES[..], &DWH_TABLES[..]] {
        statements.extend(recreate_statements(layer, dialect));
    }
    statements.extend(copy_requests(settings).iter().map(|r| {
        copy_sql(&r.table, &r.source_uri, &r.credential, &r.region, r.format.as_copy_option())
    }));
    statements.join("\n\n")
}

pub struct Orchestrator {
    executor: Arc<dyn TransactionalExecutor>,
    loader: Arc<dyn BulkLoader>,
    settings: Settings,
    resolver_options: ResolverOptions,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn TransactionalExecutor>, loader: Arc<dyn BulkLoader>, settings: Settings) -> Self {
        Self {
            executor,
            loader,
            settings,
            resolver_options: ResolverOptions::default(),
        }
    }

    pub fn with_resolver_options(mut self, options: ResolverOptions) -> Self {
        self.resolver_options = options;
        self
    }

    /// Drop and recreate every table, one batch per layer, in the engine's
    /// own dialect. Redshift DDL is only rendered by [`render_sql_script`].
    #[instrument(skip(self))]
    pub async fn create_tables(&self) -> Result<()> {
        let layers = [
            (RAW_STAGING_BATCH, &RAW_STAGING_TABLES[..]),
            (INTERMEDIATE_STAGING_BATCH, &INTERMEDIATE_STAGING_TABLES[..]),
            (DWH_BATCH, &DWH_TABLES[..]),
        ];
        for (label, tables) in layers {
            let mut batch = Batch::new(label);
            batch.extend(recreate_statements(tables, Dialect::Sqlite));
            self.executor.execute_batch(&batch).await?;
            info!("Recreated {} tables for {}", tables.len(), label);
        }
        Ok(())
    }

    /// Empty the raw tables, then copy events and songs.
    #[instrument(skip(self))]
    pub async fn load_raw_staging(&self) -> Result<Vec<LoadReport>> {
        let mut clear = Batch::new(RAW_STAGING_BATCH);
        clear.extend(truncate_statements(&RAW_STAGING_TABLES));
        self.executor.execute_batch(&clear).await?;

        let mut reports = Vec::with_capacity(2);
        for request in copy_requests(&self.settings) {
            reports.push(self.loader.load(&request).await?);
        }
        Ok(reports)
    }

    /// Score, classify and resolve artists; persist candidates and every
    /// resolution step in one batch.
    #[instrument(skip(self))]
    pub async fn load_intermediate_staging(&self) -> Result<ArtistResolution> {
        let observations = read_song_observations(self.executor.as_ref()).await?;
        let resolution = resolve_artists(&observations, self.resolver_options)?;

        let mut batch = Batch::new(INTERMEDIATE_STAGING_BATCH);
        batch.extend(truncate_statements(&INTERMEDIATE_STAGING_TABLES));
        batch.extend(insert_statements(&resolution.candidates));
        batch.extend(insert_statements(&resolution.identities));
        self.executor.execute_batch(&batch).await?;

        crate::metrics::rows_written(ARTIST_CANDIDATES_TABLE, resolution.candidates.len());
        crate::metrics::rows_written(ARTIST_IDENTITIES_TABLE, resolution.identities.len());
        info!(
            "Staged {} artist candidates and {} identity rows ({} canonical)",
            resolution.candidates.len(),
            resolution.identities.len(),
            resolution.canonical().count()
        );
        Ok(resolution)
    }

    /// Build the star schema from the committed staging tables.
    #[instrument(skip(self))]
    pub async fn load_dwh(&self) -> Result<DimensionalModel> {
        let identities = read_canonical_identities(self.executor.as_ref()).await?;
        let songs = read_song_observations(self.executor.as_ref()).await?;
        let events = read_events(self.executor.as_ref()).await?;

        let model = build_dimensional_model(&identities, &songs, &events);
        self.executor.execute_batch(&model.to_batch()).await?;

        for (table, rows) in model.row_counts() {
            crate::metrics::rows_written(table, rows);
        }
        Ok(model)
    }

    /// Raw staging, intermediate staging, then the star schema.
    #[instrument(skip(self))]
    pub async fn run_etl(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting ETL run {}", run_id);

        let loads = self.load_raw_staging().await?;
        let resolution = self.load_intermediate_staging().await?;
        let model = self.load_dwh().await?;

        let mut rows_written: BTreeMap<String, usize> = model
            .row_counts()
            .into_iter()
            .map(|(table, rows)| (table.to_string(), rows))
            .collect();
        rows_written.insert(ARTIST_CANDIDATES_TABLE.to_string(), resolution.candidates.len());
        rows_written.insert(ARTIST_IDENTITIES_TABLE.to_string(), resolution.identities.len());

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            loads,
            rows_written,
            skipped_plays: model.skipped_plays,
        };
        info!(
            "ETL run {} finished in {} ms",
            run_id,
            (summary.finished_at - summary.started_at).num_milliseconds()
        );
        Ok(summary)
    }

    /// Drop/create every table, then run the ETL.
    pub async fn refresh(&self) -> Result<RunSummary> {
        self.create_tables().await?;
        self.run_etl().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WarehouseError;
    use crate::warehouse::Row;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const SETTINGS: &str = r#"
[CLUSTER]
HOST = "localhost"
DB_NAME = "dwh"
DB_USER = "u"
DB_PASSWORD = "p"
DB_PORT = 5439

[S3]
LOG_DATA = "s3://udacity-dend/log_data"
SONG_DATA = "s3://udacity-dend/song_data"
LOG_JSONPATH = "s3://udacity-dend/log_json_path.json"
BUCKET_REGION = "us-west-2"

[IAM_ROLE]
ARN = "arn:aws:iam::1:role/dwh"
"#;

    /// Records every batch label and fails the one named `fail_on`.
    #[derive(Default)]
    struct RecordingExecutor {
        labels: Mutex<Vec<String>>,
        statements: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl TransactionalExecutor for RecordingExecutor {
        async fn execute_batch(&self, batch: &Batch) -> Result<()> {
            self.labels.lock().unwrap().push(batch.label.clone());
            self.statements
                .lock()
                .unwrap()
                .extend(batch.statements.iter().map(|s| s.sql.clone()));
            if self.fail_on == Some(batch.label.as_str()) {
                return Err(WarehouseError::Statement {
                    batch: batch.label.clone(),
                    index: 0,
                    message: "boom".into(),
                });
            }
            Ok(())
        }

        async fn query(&self, _sql: &str) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }
    }

    struct NoopLoader;

    #[async_trait]
    impl BulkLoader for NoopLoader {
        async fn load(&self, request: &CopyRequest) -> Result<LoadReport> {
            Ok(LoadReport {
                table: request.table.clone(),
                files: 0,
                rows: 0,
            })
        }
    }

    fn orchestrator(executor: Arc<RecordingExecutor>) -> Orchestrator {
        Orchestrator::new(executor, Arc::new(NoopLoader), Settings::from_toml_str(SETTINGS).unwrap())
    }

    #[test]
    fn test_copy_requests_follow_settings() {
        let settings = Settings::from_toml_str(SETTINGS).unwrap();
        let [events, songs] = copy_requests(&settings);
        assert_eq!(events.table, STAGING_EVENTS_TABLE);
        assert_eq!(
            events.format,
            JsonFormat::JsonPaths("s3://udacity-dend/log_json_path.json".into())
        );
        assert_eq!(songs.format, JsonFormat::AutoIgnoreCase);
        assert_eq!(songs.region, "us-west-2");
        assert_eq!(songs.credential, "arn:aws:iam::1:role/dwh");
    }

    #[test]
    fn test_redshift_script_has_ddl_and_copies() {
        let settings = Settings::from_toml_str(SETTINGS).unwrap();
        let script = render_sql_script(&settings, Dialect::Redshift);
        assert!(script.contains("DISTSTYLE ALL"));
        assert!(script.contains("COPY staging_events\nFROM 's3://udacity-dend/log_data'"));
        assert!(script.contains("JSON 'auto ignorecase';"));
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let executor = Arc::new(RecordingExecutor::default());
        let summary = orchestrator(executor.clone()).refresh().await.unwrap();

        let labels = executor.labels.lock().unwrap().clone();
        assert_eq!(
            labels,
            vec![
                RAW_STAGING_BATCH,
                INTERMEDIATE_STAGING_BATCH,
                DWH_BATCH,
                RAW_STAGING_BATCH,
                INTERMEDIATE_STAGING_BATCH,
                DWH_BATCH
            ]
        );
        assert_eq!(summary.loads.len(), 2);
        assert!(summary.finished_at >= summary.started_at);
    }

    #[tokio::test]
    async fn test_create_tables_sends_engine_ddl_only() {
        let executor = Arc::new(RecordingExecutor::default());
        orchestrator(executor.clone()).create_tables().await.unwrap();

        let statements = executor.statements.lock().unwrap().clone();
        assert_eq!(statements.len(), 18);
        assert!(statements.iter().all(|s| !s.contains("DISTSTYLE") && !s.contains("SORTKEY")));
    }

    #[tokio::test]
    async fn test_failed_batch_stops_later_stages() {
        let executor = Arc::new(RecordingExecutor {
            fail_on: Some(INTERMEDIATE_STAGING_BATCH),
            ..Default::default()
        });
        let result = orchestrator(executor.clone()).run_etl().await;

        assert!(matches!(result, Err(WarehouseError::Statement { ref batch, .. }) if batch == INTERMEDIATE_STAGING_BATCH));
        let labels = executor.labels.lock().unwrap().clone();
        assert!(!labels.iter().any(|l| l == DWH_BATCH));
    }
}
