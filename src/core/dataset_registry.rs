use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Cache TTL for active version descriptors.
const CACHE_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    loaded_at: Instant,
    versions: serde_json::Value,
}

/// Tracks which version of each reference dataset is active, so every
/// verdict can embed a reproducible snapshot.
///
/// Descriptors are cached in-process for up to 5 minutes. Writes happen in
/// the upstream ingestion pipeline, outside this process, so the TTL alone
/// bounds staleness. When the `dataset_versions` table is missing or
/// incompatible, a degenerate descriptor is computed straight from
/// `reference_layers` under the `"legacy"` version marker.
pub struct DatasetRegistry {
    cache: RwLock<Option<CacheEntry>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self { cache: RwLock::new(None) }
    }

    /// Active version descriptor per layer type:
    /// `{ layer_type: { version, source_date, record_count, ingested_at, checksum } }`.
    pub async fn active_versions(&self, pool: &PgPool) -> Result<serde_json::Value, sqlx::Error> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.loaded_at.elapsed() < CACHE_TTL {
                    return Ok(entry.versions.clone());
                }
            }
        }

        let versions = match self.load_registry(pool).await {
            Ok(v) => v,
            Err(e) => {
                log::warn!("dataset_versions unavailable, using legacy fallback: {e}");
                self.load_legacy(pool).await?
            }
        };

        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry { loaded_at: Instant::now(), versions: versions.clone() });
        Ok(versions)
    }

    async fn load_registry(&self, pool: &PgPool) -> Result<serde_json::Value, sqlx::Error> {
        let rows: Vec<(String, String, Option<NaiveDate>, Option<i32>, DateTime<Utc>, Option<String>)> =
            sqlx::query_as(
                r#"
                SELECT layer_type, version, source_date, record_count, ingested_at, checksum
                FROM dataset_versions
                WHERE is_active = TRUE
                ORDER BY layer_type
                "#,
            )
            .fetch_all(pool)
            .await?;

        let mut map = serde_json::Map::new();
        for (layer_type, version, source_date, record_count, ingested_at, checksum) in rows {
            map.insert(
                layer_type,
                serde_json::json!({
                    "version": version,
                    "source_date": source_date,
                    "record_count": record_count,
                    "ingested_at": ingested_at,
                    "checksum": checksum,
                }),
            );
        }
        Ok(serde_json::Value::Object(map))
    }

    async fn load_legacy(&self, pool: &PgPool) -> Result<serde_json::Value, sqlx::Error> {
        let rows: Vec<(String, i64, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            SELECT layer_type, COUNT(*) AS record_count, MAX(ingested_at) AS ingested_at
            FROM reference_layers
            WHERE is_active = TRUE
            GROUP BY layer_type
            ORDER BY layer_type
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut map = serde_json::Map::new();
        for (layer_type, record_count, ingested_at) in rows {
            map.insert(
                layer_type,
                serde_json::json!({
                    "version": "legacy",
                    "record_count": record_count,
                    "ingested_at": ingested_at,
                }),
            );
        }
        Ok(serde_json::Value::Object(map))
    }
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
