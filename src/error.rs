use thiserror::Error;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Warehouse engine error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Cannot reach warehouse: {message}")]
    Connection { message: String },

    #[error("Statement {index} of batch '{batch}' failed: {message}")]
    Statement {
        batch: String,
        index: usize,
        message: String,
    },

    #[error("Unsupported source '{uri}': {reason}")]
    UnsupportedSource { uri: String, reason: String },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, WarehouseError>;
