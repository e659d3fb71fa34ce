use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// One row of the namespaced key-value table.
#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)] // updated_at is maintained by the upsert and read only by operators
pub struct KvEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
