use serde_json::{Map, Value};

/// A row as the remote store sees it: snake_case column names to JSON values.
pub type Row = Map<String, Value>;

/// Equality filter on a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.field).unwrap_or(&Value::Null) == &self.value
    }
}

/// Storage abstraction over the hosted relational backend.
///
/// Rows passed to `insert` without an `id` column get a durable id assigned by
/// the store; the inserted row is returned with that id filled in.
pub trait RemoteStore: Send + Sync {
    fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, StoreError>;
    fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError>;
    fn update(&self, table: &str, id: &str, row: Row) -> Result<(), StoreError>;
    fn delete(&self, table: &str, id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("row {id} not found in {table}")]
    NotFound { table: String, id: String },
    #[error("row {id} already exists in {table}")]
    Conflict { table: String, id: String },
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
}

/// Bucket-style file storage returning publicly resolvable URLs.
pub trait FileStorage: Send + Sync {
    fn upload(&self, path: &str, content: &[u8], mime_type: &str) -> Result<String, StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("upload rejected: {0}")]
    Rejected(String),
    #[error("file storage unavailable: {0}")]
    Unavailable(String),
}
