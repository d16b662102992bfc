use super::{Batch, Row, TransactionalExecutor, Value};
use crate::error::{Result, WarehouseError};
use crate::metrics;
use async_trait::async_trait;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, error, info};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

/// Warehouse engine backed by a single SQLite connection.
pub struct SqliteWarehouse {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteWarehouse")
            .field("conn", &"<Mutex<Connection>>")
            .finish()
    }
}

impl SqliteWarehouse {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| WarehouseError::Connection {
                message: format!("cannot create '{}': {}", parent.display(), e),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| WarehouseError::Connection {
            message: format!("cannot open '{}': {}", path.display(), e),
        })?;
        info!("Opened warehouse at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| WarehouseError::Connection {
            message: format!("cannot open in-memory database: {}", e),
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| WarehouseError::Connection {
            message: "warehouse connection poisoned by an earlier panic".to_string(),
        })
    }
}

fn run_batch(conn: &mut Connection, batch: &Batch) -> Result<()> {
    let tx = conn.transaction()?;
    for (index, statement) in batch.statements.iter().enumerate() {
        tx.execute(&statement.sql, params_from_iter(statement.params.iter()))
            .map_err(|e| WarehouseError::Statement {
                batch: batch.label.clone(),
                index,
                message: e.to_string(),
            })?;
    }
    tx.commit()?;
    Ok(())
}

#[async_trait]
impl TransactionalExecutor for SqliteWarehouse {
    async fn execute_batch(&self, batch: &Batch) -> Result<()> {
        let started = Instant::now();
        let outcome = {
            let mut conn = self.lock()?;
            run_batch(&mut conn, batch)
        };

        match &outcome {
            Ok(()) => {
                let secs = started.elapsed().as_secs_f64();
                metrics::batch_committed(&batch.label, secs);
                debug!(
                    "Committed batch '{}' ({} statements) in {:.3}s",
                    batch.label,
                    batch.len(),
                    secs
                );
            }
            Err(e) => {
                metrics::batch_failed(&batch.label);
                error!("Batch '{}' rolled back: {}", batch.label, e);
            }
        }
        outcome
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(Value::from(row.get_ref(i)?));
            }
            out.push(Row(values));
        }
        Ok(out)
    }
}
