use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::db_models::ApiKeyDb;
use crate::security::error::ApiError;

/// Plans and their monthly validation quotas. `None` is unlimited.
pub const PLANS: [(&str, Option<i32>); 3] =
    [("free", Some(3)), ("professional", Some(50)), ("enterprise", None)];

pub fn plan_quota(plan: &str) -> Result<Option<i32>, ApiError> {
    PLANS
        .iter()
        .find(|(name, _)| *name == plan)
        .map(|(_, quota)| *quota)
        .ok_or_else(|| {
            let options: Vec<&str> = PLANS.iter().map(|(name, _)| *name).collect();
            ApiError::BadRequest(format!("Plano inválido: {plan}. Opções: {options:?}"))
        })
}

/// Usage window length. `requests_this_month` resets when the last reset is
/// at least this old.
const RESET_WINDOW_DAYS: i64 = 30;

/// Quota state right after a successful admission, used for the
/// X-RateLimit response headers.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaSnapshot {
    pub key_id: Uuid,
    pub key_prefix: String,
    pub plan: String,
    pub monthly_quota: Option<i32>,
    pub requests_this_month: i32,
    pub quota_remaining: Option<i32>,
    pub reset_at: i64,
}

/// Freshly created key. The plaintext is returned exactly once.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedApiKey {
    pub api_key: String,
    pub id: Uuid,
    pub key_prefix: String,
    pub client_name: String,
    pub plan: String,
    pub monthly_quota: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// API-key store and quota guard.
pub struct ApiKeyService {
    db_pool: PgPool,
}

impl ApiKeyService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Generates a new key: `gg_live_` + 32 hex chars.
    pub fn generate_api_key() -> String {
        let mut rng = rand::thread_rng();
        let bytes: [u8; 16] = rng.gen();
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        format!("gg_live_{hex}")
    }

    /// SHA-256 of the key; the only form that is ever persisted.
    pub fn hash_api_key(api_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(api_key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Visible prefix for identification (first 12 chars + ellipsis).
    pub fn key_prefix(api_key: &str) -> String {
        if api_key.len() > 12 {
            format!("{}...", &api_key[..12])
        } else {
            api_key.to_string()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_api_key(
        &self,
        client_name: &str,
        plan: &str,
        client_email: Option<&str>,
        client_document: Option<&str>,
        expires_in_days: Option<i64>,
        notes: Option<&str>,
        created_by: Option<&str>,
    ) -> Result<CreatedApiKey, ApiError> {
        let monthly_quota = plan_quota(plan)?;
        let expires_at = expires_in_days.map(|days| Utc::now() + Duration::days(days));

        // SHA-256 collisions are effectively impossible, but the unique
        // index is authoritative: retry generation up to 3 times.
        for _ in 0..3 {
            let api_key = Self::generate_api_key();
            let key_hash = Self::hash_api_key(&api_key);
            let key_prefix = Self::key_prefix(&api_key);
            let id = Uuid::new_v4();
            let now = Utc::now();

            let inserted = sqlx::query(
                r#"
                INSERT INTO api_keys (
                    id, key_hash, key_prefix, client_name, client_email, client_document,
                    plan, monthly_quota, total_requests, requests_this_month,
                    is_active, is_revoked, created_at, expires_at, notes, created_by
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, 0, TRUE, FALSE, $9, $10, $11, $12)
                "#,
            )
            .bind(id)
            .bind(&key_hash)
            .bind(&key_prefix)
            .bind(client_name)
            .bind(client_email)
            .bind(client_document)
            .bind(plan)
            .bind(monthly_quota)
            .bind(now)
            .bind(expires_at)
            .bind(notes)
            .bind(created_by)
            .execute(&self.db_pool)
            .await;

            match inserted {
                Ok(_) => {
                    return Ok(CreatedApiKey {
                        api_key,
                        id,
                        key_prefix,
                        client_name: client_name.to_string(),
                        plan: plan.to_string(),
                        monthly_quota,
                        expires_at,
                        created_at: now,
                    })
                }
                Err(sqlx::Error::Database(e))
                    if e.constraint().map_or(false, |c| c.contains("key_hash")) =>
                {
                    log::warn!("api key hash collision, regenerating");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ApiError::Internal("falha ao gerar API key única após 3 tentativas".into()))
    }

    /// The admission protocol - the only correct quota enforcement under
    /// concurrency.
    ///
    /// One transaction: `SELECT ... FOR UPDATE` on the unique key-hash row,
    /// expiry check, 30-day window reset, quota check (rollback on 429),
    /// then a single UPDATE incrementing both counters. The commit releases
    /// the row lock; nothing else (no I/O, no validation work) runs while
    /// it is held.
    pub async fn admit(&self, api_key: &str) -> Result<QuotaSnapshot, ApiError> {
        let key_hash = Self::hash_api_key(api_key);
        let now = Utc::now();

        let mut tx = self.db_pool.begin().await?;

        let row: Option<ApiKeyDb> = sqlx::query_as(
            r#"
            SELECT * FROM api_keys
            WHERE key_hash = $1 AND is_active = TRUE AND is_revoked = FALSE
            FOR UPDATE
            "#,
        )
        .bind(&key_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(key) = row else {
            tx.rollback().await?;
            return Err(ApiError::Unauthorized("API Key inválida ou expirada.".into()));
        };

        if matches!(key.expires_at, Some(expires) if now > expires) {
            tx.rollback().await?;
            return Err(ApiError::Unauthorized("API Key expirada.".into()));
        }

        let needs_reset = match key.last_reset_at {
            None => true,
            Some(last) => (now - last).num_days() >= RESET_WINDOW_DAYS,
        };
        let used_before = if needs_reset { 0 } else { key.requests_this_month };

        if let Some(quota) = key.monthly_quota {
            if used_before >= quota {
                let reset_at = key.reset_timestamp();
                tx.rollback().await?;
                return Err(ApiError::QuotaExceeded {
                    limit: quota,
                    used: key.requests_this_month,
                    reset_at,
                });
            }
        }

        if needs_reset {
            sqlx::query(
                r#"
                UPDATE api_keys
                SET requests_this_month = 1,
                    total_requests = total_requests + 1,
                    last_reset_at = $2,
                    last_used_at = $2
                WHERE id = $1
                "#,
            )
            .bind(key.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE api_keys
                SET requests_this_month = requests_this_month + 1,
                    total_requests = total_requests + 1,
                    last_used_at = $2
                WHERE id = $1
                "#,
            )
            .bind(key.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let requests_this_month = used_before + 1;
        let reset_at = if needs_reset {
            now.timestamp() + RESET_WINDOW_DAYS * 86_400
        } else {
            key.reset_timestamp()
        };

        Ok(QuotaSnapshot {
            key_id: key.id,
            key_prefix: key.key_prefix,
            plan: key.plan,
            monthly_quota: key.monthly_quota,
            requests_this_month,
            quota_remaining: key.monthly_quota.map(|q| (q - requests_this_month).max(0)),
            reset_at,
        })
    }

    /// Soft delete. Hard deletion is only allowed on already revoked rows.
    pub async fn revoke_api_key(&self, api_key_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query(
            "UPDATE api_keys SET is_revoked = TRUE, revoked_at = $2 WHERE id = $1 AND is_revoked = FALSE",
        )
        .bind(api_key_id)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_api_key(&self, api_key_id: Uuid) -> Result<Option<ApiKeyDb>, ApiError> {
        let key = sqlx::query_as("SELECT * FROM api_keys WHERE id = $1")
            .bind(api_key_id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(key)
    }

    pub async fn list_api_keys(
        &self,
        plan: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ApiKeyDb>, ApiError> {
        let keys = match plan {
            Some(plan) => {
                sqlx::query_as(
                    "SELECT * FROM api_keys WHERE plan = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(plan)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db_pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM api_keys ORDER BY created_at DESC LIMIT $1 OFFSET $2")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.db_pool)
                    .await?
            }
        };
        Ok(keys)
    }

    pub async fn usage_stats(&self) -> Result<serde_json::Value, ApiError> {
        let (total_keys,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys")
            .fetch_one(&self.db_pool)
            .await?;
        let (active_keys,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM api_keys WHERE is_active = TRUE AND is_revoked = FALSE",
        )
        .fetch_one(&self.db_pool)
        .await?;
        let (total_requests,): (Option<i64>,) =
            sqlx::query_as("SELECT SUM(total_requests) FROM api_keys")
                .fetch_one(&self.db_pool)
                .await?;
        let (month_requests,): (Option<i64>,) =
            sqlx::query_as("SELECT SUM(requests_this_month) FROM api_keys")
                .fetch_one(&self.db_pool)
                .await?;
        let by_plan: Vec<(String, i64)> = sqlx::query_as(
            "SELECT plan, COUNT(*) FROM api_keys WHERE is_active = TRUE GROUP BY plan",
        )
        .fetch_all(&self.db_pool)
        .await?;

        Ok(serde_json::json!({
            "total_keys": total_keys,
            "active_keys": active_keys,
            "total_requests": total_requests.unwrap_or(0),
            "requests_this_month": month_requests.unwrap_or(0),
            "by_plan": by_plan.into_iter().collect::<std::collections::BTreeMap<_, _>>(),
        }))
    }

    /// Plan changes grant the new quota immediately: the month counter
    /// resets and the window restarts.
    pub async fn change_plan(&self, api_key_id: Uuid, new_plan: &str) -> Result<ApiKeyDb, ApiError> {
        let monthly_quota = plan_quota(new_plan)?;
        let updated: Option<ApiKeyDb> = sqlx::query_as(
            r#"
            UPDATE api_keys
            SET plan = $2,
                monthly_quota = $3,
                requests_this_month = 0,
                last_reset_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(api_key_id)
        .bind(new_plan)
        .bind(monthly_quota)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?;

        updated.ok_or_else(|| ApiError::NotFound(format!("API key não encontrada: {api_key_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_the_documented_shape() {
        let key = ApiKeyService::generate_api_key();
        assert!(key.starts_with("gg_live_"));
        assert_eq!(key.len(), "gg_live_".len() + 32);
        assert!(key["gg_live_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn keys_are_unique_across_generations() {
        let a = ApiKeyService::generate_api_key();
        let b = ApiKeyService::generate_api_key();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_sha256_hex_and_prefix_is_short() {
        let key = "gg_live_3f7a9b2c5e8d1f4a6b9c2e5f8a1d4b7c";
        let hash = ApiKeyService::hash_api_key(key);
        assert_eq!(hash.len(), 64);
        assert_eq!(ApiKeyService::key_prefix(key), "gg_live_3f7a...");
        assert_eq!(ApiKeyService::key_prefix("short"), "short");
    }

    #[test]
    fn plan_table_matches_pricing() {
        assert_eq!(plan_quota("free").unwrap(), Some(3));
        assert_eq!(plan_quota("professional").unwrap(), Some(50));
        assert_eq!(plan_quota("enterprise").unwrap(), None);
        assert!(plan_quota("platinum").is_err());
    }
}
