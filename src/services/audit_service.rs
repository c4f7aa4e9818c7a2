use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::compliance_models::{GeoValidationResult, PropertyInfo, VerificationResponse};
use crate::config::Settings;
use crate::core::geometry::ValidatedPolygon;
use crate::models::db_models::ValidationReportDb;
use crate::security::error::ApiError;

/// Generates a report code: `GG-<YYYYMMDDhhmmss>-<4 uppercase alnum>`.
///
/// The PDF generator is the single source of codes; the recorder only
/// generates one itself when a verdict is archived without a PDF.
pub fn generate_report_code() -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect();
    format!("GG-{timestamp}-{suffix}")
}

/// Serializes JSON with object keys sorted recursively and no whitespace,
/// so the geometry hash is independent of key order in the input.
pub fn canonical_json(value: &serde_json::Value) -> String {
    fn write(value: &serde_json::Value, out: &mut String) {
        match value {
            serde_json::Value::Object(map) => {
                out.push('{');
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                    out.push(':');
                    write(&map[*key], out);
                }
                out.push('}');
            }
            serde_json::Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }
    let mut out = String::new();
    write(value, &mut out);
    out
}

pub fn hash_geojson(geojson: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(geojson).as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn hash_api_key(api_key: &str) -> String {
    hash_bytes(api_key.as_bytes())
}

/// Request metadata captured alongside each archived verdict.
#[derive(Debug, Default, Clone)]
pub struct RequesterInfo {
    pub request_ip: Option<String>,
    pub api_key: Option<String>,
    pub user_agent: Option<String>,
}

/// Archives verdicts under unique report codes and answers authenticity
/// queries. Every snapshot field is immutable once written.
pub struct AuditService {
    db_pool: PgPool,
}

impl AuditService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Draws a code that is unused right now, for callers that must bake
    /// it into an artifact before the record exists. The unique index
    /// stays authoritative; a lost race surfaces as an insert error.
    pub async fn reserve_report_code(&self) -> Result<String, ApiError> {
        for attempt in 1..=10 {
            let code = generate_report_code();
            if !self.code_exists(&code).await? {
                return Ok(code);
            }
            log::warn!("report code collision, regenerating (attempt {attempt})");
        }
        Err(ApiError::Internal(
            "não foi possível gerar código de laudo único após 10 tentativas".into(),
        ))
    }

    /// Records a verdict (and optionally its rendered PDF) as an audit
    /// record.
    ///
    /// When the caller supplies the code it is already baked into the PDF
    /// bytes and their QR payload; storing the record under any other code
    /// would break that binding, so a collision is an error, never a
    /// regeneration. Only recorder-owned codes (no PDF) are retried.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_validation_report(
        &self,
        settings: &Settings,
        result: &GeoValidationResult,
        polygon: &ValidatedPolygon,
        pdf_bytes: Option<&[u8]>,
        property_info: Option<&PropertyInfo>,
        requester: &RequesterInfo,
        report_code: Option<String>,
        content_hash: Option<String>,
    ) -> Result<ValidationReportDb, ApiError> {
        let code = match report_code {
            Some(code) => {
                if self.code_exists(&code).await? {
                    return Err(ApiError::Internal(format!(
                        "código de laudo já utilizado: {code}"
                    )));
                }
                code
            }
            None => self.reserve_report_code().await?,
        };

        let mut checks_summary = serde_json::Map::new();
        for check in &result.checks {
            checks_summary.insert(
                check.check_type.as_str().to_string(),
                serde_json::json!({
                    "status": check.status.as_str(),
                    "score": check.score,
                    "overlap_ha": check.overlap_area_ha,
                    "overlap_pct": check.overlap_percentage,
                    "message": check.message,
                }),
            );
        }

        let geojson = polygon.geojson().clone();
        let geometry_hash = hash_geojson(&geojson);
        let bbox = polygon.bbox().map(|b| serde_json::json!(b));
        let centroid = polygon.centroid_string();
        let pdf_hash = content_hash.or_else(|| pdf_bytes.map(hash_bytes));
        let pdf_size = pdf_bytes.map(|b| b.len() as i32);

        let (plot_name, crop_type, property_name, state) = match property_info {
            Some(info) => (
                info.plot_name.clone(),
                info.crop_type.clone(),
                info.property_name.clone(),
                info.state.clone(),
            ),
            None => (None, None, None, None),
        };

        let now = Utc::now();
        let expires_at = now + Duration::days(settings.validation_expiry_days);

        let record: ValidationReportDb = sqlx::query_as(
            r#"
            INSERT INTO validation_reports (
                id, report_code, status, risk_score,
                geometry_geojson, geometry_hash, geometry_area_ha, geometry_centroid, geometry_bbox,
                pdf_hash, pdf_size_bytes,
                datasets_version, ruleset_version, api_version,
                checks_summary, processing_time_ms,
                request_ip, api_key_hash, user_agent,
                plot_name, crop_type, property_name, state,
                created_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&code)
        .bind(result.status.as_str())
        .bind(result.risk_score)
        .bind(&geojson)
        .bind(&geometry_hash)
        .bind(rust_decimal::Decimal::try_from(polygon.area_ha()).ok())
        .bind(&centroid)
        .bind(&bbox)
        .bind(&pdf_hash)
        .bind(pdf_size)
        .bind(&result.reference_data_version)
        .bind(&settings.ruleset_version)
        .bind(&settings.app_version)
        .bind(serde_json::Value::Object(checks_summary))
        .bind(result.processing_time_ms as i32)
        .bind(&requester.request_ip)
        .bind(requester.api_key.as_deref().map(hash_api_key))
        .bind(&requester.user_agent)
        .bind(&plot_name)
        .bind(&crop_type)
        .bind(&property_name)
        .bind(&state)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.db_pool)
        .await?;

        log::info!("report recorded: {}", record.report_code);
        Ok(record)
    }

    async fn code_exists(&self, code: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM validation_reports WHERE report_code = $1")
                .bind(code)
                .fetch_optional(&self.db_pool)
                .await?;
        Ok(row.is_some())
    }

    pub async fn get_report_by_code(
        &self,
        code: &str,
    ) -> Result<Option<ValidationReportDb>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM validation_reports WHERE report_code = $1")
            .bind(code)
            .fetch_optional(&self.db_pool)
            .await
    }

    /// Public summary for a report code, with truncated hashes.
    pub async fn verify_code(&self, code: &str) -> Result<Option<VerificationResponse>, sqlx::Error> {
        let Some(report) = self.get_report_by_code(code).await? else {
            return Ok(None);
        };
        let is_expired = report.is_expired(Utc::now());
        Ok(Some(VerificationResponse {
            valid: !is_expired,
            error: is_expired.then(|| "Laudo expirado".to_string()),
            report_code: Some(report.report_code),
            status: Some(report.status),
            risk_score: Some(report.risk_score),
            created_at: Some(report.created_at),
            expires_at: report.expires_at,
            is_expired: Some(is_expired),
            plot_name: report.plot_name,
            property_name: report.property_name,
            state: report.state,
            geometry_hash: Some(truncate_hash(&report.geometry_hash)),
            pdf_hash: report.pdf_hash.as_deref().map(truncate_hash),
        }))
    }

    /// Re-verifies a report against a submitted geometry by recomputing the
    /// canonical hash. Any coordinate change breaks the match.
    pub async fn verify_report(
        &self,
        code: &str,
        geometry: &serde_json::Value,
    ) -> Result<VerificationResponse, sqlx::Error> {
        let Some(report) = self.get_report_by_code(code).await? else {
            return Ok(VerificationResponse {
                valid: false,
                error: Some("Laudo não encontrado".to_string()),
                report_code: None,
                status: None,
                risk_score: None,
                created_at: None,
                expires_at: None,
                is_expired: None,
                plot_name: None,
                property_name: None,
                state: None,
                geometry_hash: None,
                pdf_hash: None,
            });
        };

        if report.is_expired(Utc::now()) {
            return Ok(VerificationResponse {
                valid: false,
                error: Some("Laudo expirado".to_string()),
                report_code: Some(report.report_code),
                status: None,
                risk_score: None,
                created_at: Some(report.created_at),
                expires_at: report.expires_at,
                is_expired: Some(true),
                plot_name: None,
                property_name: None,
                state: None,
                geometry_hash: None,
                pdf_hash: None,
            });
        }

        if hash_geojson(geometry) != report.geometry_hash {
            return Ok(VerificationResponse {
                valid: false,
                error: Some("Geometria não corresponde ao laudo".to_string()),
                report_code: Some(report.report_code),
                status: None,
                risk_score: None,
                created_at: None,
                expires_at: None,
                is_expired: Some(false),
                plot_name: None,
                property_name: None,
                state: None,
                geometry_hash: None,
                pdf_hash: None,
            });
        }

        Ok(VerificationResponse {
            valid: true,
            error: None,
            report_code: Some(report.report_code),
            status: Some(report.status),
            risk_score: Some(report.risk_score),
            created_at: Some(report.created_at),
            expires_at: report.expires_at,
            is_expired: Some(false),
            plot_name: report.plot_name,
            property_name: report.property_name,
            state: report.state,
            geometry_hash: Some(truncate_hash(&report.geometry_hash)),
            pdf_hash: report.pdf_hash.as_deref().map(truncate_hash),
        })
    }
}

fn truncate_hash(hash: &str) -> String {
    let cut = hash.len().min(16);
    format!("{}...", &hash[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_code_matches_format() {
        let code = generate_report_code();
        assert_eq!(code.len(), 3 + 14 + 1 + 4);
        assert!(code.starts_with("GG-"));
        let (ts, suffix) = code[3..].split_once('-').unwrap();
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn report_codes_vary() {
        let codes: std::collections::HashSet<String> =
            (0..50).map(|_| generate_report_code()).collect();
        // Same-second collisions are possible but 50 in a row all equal are not.
        assert!(codes.len() > 1);
    }

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let a = serde_json::json!({ "b": { "y": 2, "x": 1 }, "a": [3, 2] });
        let b = serde_json::json!({ "a": [3, 2], "b": { "x": 1, "y": 2 } });
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":[3,2],"b":{"x":1,"y":2}}"#);
    }

    #[test]
    fn geometry_hash_is_key_order_independent() {
        let a = serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[-46.5, -23.5], [-46.5, -23.51], [-46.49, -23.51], [-46.5, -23.5]]]
        });
        let b = serde_json::json!({
            "coordinates": [[[-46.5, -23.5], [-46.5, -23.51], [-46.49, -23.51], [-46.5, -23.5]]],
            "type": "Polygon"
        });
        assert_eq!(hash_geojson(&a), hash_geojson(&b));
    }

    #[test]
    fn geometry_hash_breaks_on_any_coordinate_change() {
        let a = serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[-46.5, -23.5], [-46.5, -23.51], [-46.49, -23.51], [-46.5, -23.5]]]
        });
        let mutated = serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[-46.5, -23.5], [-46.5, -23.51], [-46.49, -23.510001], [-46.5, -23.5]]]
        });
        assert_ne!(hash_geojson(&a), hash_geojson(&mutated));
    }

    #[test]
    fn pdf_hash_is_sha256_hex() {
        let h = hash_bytes(b"%PDF-1.4 test");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
