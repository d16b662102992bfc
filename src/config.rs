use crate::error::{Result, WarehouseError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings store for a pipeline run, read from a TOML file with one table
/// per settings group.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(rename = "CLUSTER")]
    pub cluster: ClusterConfig,
    #[serde(rename = "S3")]
    pub s3: S3Config,
    #[serde(rename = "IAM_ROLE")]
    pub iam_role: IamRoleConfig,
    #[serde(rename = "WAREHOUSE", default)]
    pub warehouse: WarehouseConfig,
}

#[derive(Clone, Deserialize)]
pub struct ClusterConfig {
    #[serde(rename = "HOST")]
    pub host: String,
    #[serde(rename = "DB_NAME")]
    pub db_name: String,
    #[serde(rename = "DB_USER")]
    pub db_user: String,
    #[serde(rename = "DB_PASSWORD")]
    pub db_password: String,
    #[serde(rename = "DB_PORT")]
    pub db_port: u16,
}

impl std::fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("host", &self.host)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &"<redacted>")
            .field("db_port", &self.db_port)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    #[serde(rename = "LOG_DATA")]
    pub log_data: String,
    #[serde(rename = "SONG_DATA")]
    pub song_data: String,
    #[serde(rename = "LOG_JSONPATH")]
    pub log_jsonpath: String,
    #[serde(rename = "BUCKET_REGION")]
    pub bucket_region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IamRoleConfig {
    #[serde(rename = "ARN")]
    pub arn: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarehouseConfig {
    #[serde(rename = "DATABASE_PATH")]
    pub database_path: Option<PathBuf>,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            WarehouseError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("CLUSTER.DB_NAME", &self.cluster.db_name),
            ("S3.LOG_DATA", &self.s3.log_data),
            ("S3.SONG_DATA", &self.s3.song_data),
            ("S3.LOG_JSONPATH", &self.s3.log_jsonpath),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(WarehouseError::MissingField(key.to_string()));
            }
        }
        Ok(())
    }

    /// Replace individual values from `DWH_<GROUP>_<KEY>` variables.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`; tests pass a map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides: [(&str, &mut String); 9] = [
            ("DWH_CLUSTER_HOST", &mut self.cluster.host),
            ("DWH_CLUSTER_DB_NAME", &mut self.cluster.db_name),
            ("DWH_CLUSTER_DB_USER", &mut self.cluster.db_user),
            ("DWH_CLUSTER_DB_PASSWORD", &mut self.cluster.db_password),
            ("DWH_S3_LOG_DATA", &mut self.s3.log_data),
            ("DWH_S3_SONG_DATA", &mut self.s3.song_data),
            ("DWH_S3_LOG_JSONPATH", &mut self.s3.log_jsonpath),
            ("DWH_S3_BUCKET_REGION", &mut self.s3.bucket_region),
            ("DWH_IAM_ROLE_ARN", &mut self.iam_role.arn),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key) {
                *slot = value;
            }
        }

        if let Some(port) = lookup("DWH_CLUSTER_DB_PORT") {
            self.cluster.db_port = port.trim().parse().map_err(|_| {
                WarehouseError::Config(format!("DWH_CLUSTER_DB_PORT is not a port: '{}'", port))
            })?;
        }
        if let Some(path) = lookup("DWH_WAREHOUSE_DATABASE_PATH") {
            self.warehouse.database_path = Some(PathBuf::from(path));
        }
        self.validate()
    }

    /// SQLite file backing the warehouse; `<DB_NAME>.db` unless configured.
    pub fn database_path(&self) -> PathBuf {
        self.warehouse
            .database_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.db", self.cluster.db_name)))
    }
}
