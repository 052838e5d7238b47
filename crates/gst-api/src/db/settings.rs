//! GST settings persistence. Key/value rows in `gst_settings`.

use std::collections::HashMap;

use sqlx::PgPool;

use super::StoreError;

/// Load all active settings rows.
pub async fn load_active(pool: &PgPool) -> Result<HashMap<String, String>, StoreError> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT setting_key, setting_value FROM gst_settings WHERE is_active = TRUE",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Insert or update settings rows. Updated rows are reactivated.
pub async fn upsert(pool: &PgPool, rows: &HashMap<String, String>) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    for (key, value) in rows {
        sqlx::query(
            "INSERT INTO gst_settings (setting_key, setting_value, is_active, updated_at)
             VALUES ($1, $2, TRUE, NOW())
             ON CONFLICT (setting_key)
             DO UPDATE SET setting_value = EXCLUDED.setting_value, is_active = TRUE,
                           updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}
