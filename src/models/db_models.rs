use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Row of `api_keys`. The plaintext key never touches the database; only
/// its SHA-256 and a short display prefix are stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKeyDb {
    pub id: Uuid,
    pub key_hash: String,
    pub key_prefix: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_document: Option<String>,
    pub plan: String,
    pub monthly_quota: Option<i32>,
    pub total_requests: i64,
    pub requests_this_month: i32,
    pub last_reset_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

impl ApiKeyDb {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active || self.is_revoked {
            return false;
        }
        match self.expires_at {
            Some(expires) => now <= expires,
            None => true,
        }
    }

    pub fn has_quota_available(&self) -> bool {
        match self.monthly_quota {
            None => true,
            Some(quota) => self.requests_this_month < quota,
        }
    }

    pub fn quota_remaining(&self) -> Option<i32> {
        self.monthly_quota
            .map(|quota| (quota - self.requests_this_month).max(0))
    }

    /// Unix timestamp when the 30-day usage window resets.
    pub fn reset_timestamp(&self) -> i64 {
        self.last_reset_at
            .map(|t| t.timestamp() + 30 * 86_400)
            .unwrap_or(0)
    }
}

/// Row of `validation_reports` - the immutable audit snapshot behind a
/// report code.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ValidationReportDb {
    pub id: Uuid,
    pub report_code: String,
    pub status: String,
    pub risk_score: i32,
    pub geometry_geojson: serde_json::Value,
    pub geometry_hash: String,
    pub geometry_area_ha: Option<Decimal>,
    pub geometry_centroid: Option<String>,
    pub geometry_bbox: Option<serde_json::Value>,
    pub pdf_hash: Option<String>,
    pub pdf_size_bytes: Option<i32>,
    pub datasets_version: serde_json::Value,
    pub ruleset_version: String,
    pub api_version: String,
    pub checks_summary: serde_json::Value,
    pub processing_time_ms: Option<i32>,
    pub request_ip: Option<String>,
    pub api_key_hash: Option<String>,
    pub user_agent: Option<String>,
    pub plot_name: Option<String>,
    pub crop_type: Option<String>,
    pub property_name: Option<String>,
    pub state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ValidationReportDb {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires) if now > expires)
    }
}

/// Row of `validations` - a cached verdict for a stored plot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ValidationDb {
    pub id: Uuid,
    pub plot_id: Uuid,
    pub status: String,
    pub risk_score: i32,
    pub validated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reference_data_version: serde_json::Value,
}

/// Row of `validation_checks`, one per check of a cached verdict.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ValidationCheckDb {
    pub id: Uuid,
    pub validation_id: Uuid,
    pub check_type: String,
    pub status: String,
    pub score: Option<i32>,
    pub message: Option<String>,
    pub details: serde_json::Value,
    pub evidence: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(quota: Option<i32>, used: i32) -> ApiKeyDb {
        ApiKeyDb {
            id: Uuid::new_v4(),
            key_hash: "h".repeat(64),
            key_prefix: "gg_live_abcd...".into(),
            client_name: "Cliente Teste".into(),
            client_email: None,
            client_document: None,
            plan: "free".into(),
            monthly_quota: quota,
            total_requests: used as i64,
            requests_this_month: used,
            last_reset_at: None,
            is_active: true,
            is_revoked: false,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
            revoked_at: None,
            notes: None,
            created_by: None,
        }
    }

    #[test]
    fn unlimited_plan_always_has_quota() {
        let k = key(None, 1_000_000);
        assert!(k.has_quota_available());
        assert_eq!(k.quota_remaining(), None);
    }

    #[test]
    fn quota_boundary_is_exclusive() {
        assert!(key(Some(3), 2).has_quota_available());
        assert!(!key(Some(3), 3).has_quota_available());
        assert_eq!(key(Some(3), 3).quota_remaining(), Some(0));
    }

    #[test]
    fn revoked_or_expired_keys_are_invalid() {
        let now = Utc::now();
        let mut k = key(Some(3), 0);
        assert!(k.is_valid(now));
        k.is_revoked = true;
        assert!(!k.is_valid(now));
        k.is_revoked = false;
        k.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(!k.is_valid(now));
    }
}
