//! Transactional executor port and its SQLite-backed implementation.

pub mod sqlite;

pub use sqlite::SqliteWarehouse;

use crate::error::Result;
use crate::schema::TableSpec;
use async_trait::async_trait;

/// A single cell value passed to or read from the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        v.map(Value::Text).unwrap_or(Value::Null)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map(Value::Real).unwrap_or(Value::Null)
    }
}

impl From<Option<i64>> for Value {
    fn from(v: Option<i64>) -> Self {
        v.map(Value::Integer).unwrap_or(Value::Null)
    }
}

/// One SQL statement plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::new(sql)
    }
}

/// An ordered statement group that commits or rolls back as a unit.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub label: String,
    pub statements: Vec<Statement>,
}

impl Batch {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            statements: Vec::new(),
        }
    }

    pub fn push(&mut self, statement: impl Into<Statement>) {
        self.statements.push(statement.into());
    }

    pub fn extend<I, S>(&mut self, statements: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Statement>,
    {
        self.statements.extend(statements.into_iter().map(Into::into));
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// A row returned by [`TransactionalExecutor::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn get(&self, idx: usize) -> &Value {
        self.0.get(idx).unwrap_or(&Value::Null)
    }

    pub fn text(&self, idx: usize) -> Option<String> {
        match self.get(idx) {
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(f) => Some(f.to_string()),
            Value::Null => None,
        }
    }

    pub fn integer(&self, idx: usize) -> Option<i64> {
        match self.get(idx) {
            Value::Integer(i) => Some(*i),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn real(&self, idx: usize) -> Option<f64> {
        match self.get(idx) {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }
}

/// A typed row that can be written to one warehouse table.
pub trait TableRow {
    fn table() -> &'static TableSpec;

    /// Values in the table's column order.
    fn values(&self) -> Vec<Value>;
}

pub fn insert_statements<R: TableRow>(rows: &[R]) -> Vec<Statement> {
    let sql = R::table().insert_sql();
    rows.iter()
        .map(|row| Statement::with_params(sql.clone(), row.values()))
        .collect()
}

/// Executes statement batches against the warehouse.
///
/// A batch runs inside one transaction: the first failing statement aborts
/// the batch, nothing it attempted is committed, and the remaining
/// statements are not run. Separate batches commit independently.
#[async_trait]
pub trait TransactionalExecutor: Send + Sync {
    async fn execute_batch(&self, batch: &Batch) -> Result<()>;

    async fn query(&self, sql: &str) -> Result<Vec<Row>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_accessors_coerce() {
        let row = Row(vec![
            Value::Text("42".into()),
            Value::Integer(7),
            Value::Null,
            Value::Real(1.5),
        ]);
        assert_eq!(row.integer(0), Some(42));
        assert_eq!(row.real(1), Some(7.0));
        assert_eq!(row.text(2), None);
        assert_eq!(row.text(3).as_deref(), Some("1.5"));
        assert_eq!(row.get(99), &Value::Null);
    }

    #[test]
    fn test_batch_collects_plain_sql() {
        let mut batch = Batch::new("ddl");
        batch.extend(vec!["DROP TABLE IF EXISTS a;".to_string()]);
        batch.push(Statement::with_params("INSERT INTO a VALUES (?1)", vec![true.into()]));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.statements[1].params, vec![Value::Integer(1)]);
    }
}
