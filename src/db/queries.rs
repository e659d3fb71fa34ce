use sqlx::PgPool;

use super::models::KvEntry;

/// Get a single entry by exact key.
pub async fn get_entry(pool: &PgPool, key: &str) -> Result<Option<KvEntry>, sqlx::Error> {
    sqlx::query_as::<_, KvEntry>("SELECT key, value, updated_at FROM kv_store WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
}

/// Insert or overwrite an entry, bumping `updated_at`.
pub async fn upsert_entry(pool: &PgPool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO kv_store (key, value, updated_at)
         VALUES ($1, $2, NOW())
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete an entry. Deleting a missing key is not an error.
pub async fn delete_entry(pool: &PgPool, key: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM kv_store WHERE key = $1")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

/// List keys starting with `prefix`, in lexical order.
pub async fn list_keys(pool: &PgPool, prefix: &str) -> Result<Vec<String>, sqlx::Error> {
    // Escape LIKE metacharacters so the prefix matches literally
    let pattern = format!(
        "{}%",
        prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    );
    sqlx::query_scalar::<_, String>("SELECT key FROM kv_store WHERE key LIKE $1 ORDER BY key")
        .bind(pattern)
        .fetch_all(pool)
        .await
}

/// Connectivity probe used by the health endpoint.
pub async fn ping(pool: &PgPool) -> bool {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .is_ok()
}
