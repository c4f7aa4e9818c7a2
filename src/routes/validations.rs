use actix_web::{web, HttpResponse};
use chrono::{Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api_state::AppState;
use crate::compliance_models::{
    BatchErrorDetail, BatchValidationRequest, BatchValidationResponse, GeoJsonGeometry,
    GeoValidationResult, ValidationRequestBody,
};
use crate::core::geometry::ValidatedPolygon;
use crate::core::validation_engine::ValidationEngine;
use crate::database::with_db_retry;
use crate::models::db_models::{ValidationCheckDb, ValidationDb};
use crate::security::error::ApiError;

const MAX_BATCH_SIZE: usize = 100;

/// Runs the full validation flow for one polygon: input invariants, one
/// outer transaction, savepointed checks, commit.
pub async fn run_validation(
    state: &AppState,
    geometry: &GeoJsonGeometry,
    plot_id: Option<Uuid>,
) -> Result<(GeoValidationResult, ValidatedPolygon), ApiError> {
    let polygon = ValidatedPolygon::from_geojson(geometry, &state.settings)
        .map_err(|e| ApiError::GeometryInvalid(e.to_string()))?;

    // Pool acquisition is the retryable part; the work itself is not.
    let mut tx = with_db_retry(|| state.db_pool.begin()).await?;

    let engine = ValidationEngine::new(&state.db_pool, &state.registry, &state.settings);
    let verdict = engine.validate(&mut tx, &polygon, plot_id).await?;

    tx.commit().await?;
    Ok((verdict, polygon))
}

/// Quick validation: public demo endpoint, not billed against any quota.
#[utoipa::path(
    post,
    path = "/api/v1/validations/quick",
    request_body = ValidationRequestBody,
    responses(
        (status = 200, description = "Verdict for the polygon", body = GeoValidationResult),
        (status = 400, description = "Invalid geometry")
    )
)]
pub async fn quick_validate(
    body: web::Json<ValidationRequestBody>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let (geometry, _, _) = body.into_inner().into_parts();
    let (verdict, _) = run_validation(&state, &geometry, None).await?;
    Ok(HttpResponse::Ok().json(verdict))
}

/// Billed validation: same engine, admitted through the API-key quota
/// guard by the middleware stack.
#[utoipa::path(
    post,
    path = "/api/v1/validations/validate",
    request_body = ValidationRequestBody,
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Verdict for the polygon", body = GeoValidationResult),
        (status = 400, description = "Invalid geometry"),
        (status = 401, description = "Invalid API key"),
        (status = 429, description = "Quota or rate limit exceeded")
    )
)]
pub async fn validate(
    body: web::Json<ValidationRequestBody>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let (geometry, _, _) = body.into_inner().into_parts();
    let (verdict, _) = run_validation(&state, &geometry, None).await?;
    Ok(HttpResponse::Ok().json(verdict))
}

/// Validates a stored plot and caches the verdict.
#[utoipa::path(
    post,
    path = "/api/v1/validations/plot/{id}",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Verdict for the stored plot", body = GeoValidationResult),
        (status = 404, description = "Unknown plot")
    )
)]
pub async fn validate_plot(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let plot_id = path.into_inner();
    let verdict = validate_stored_plot(&state, plot_id).await?;
    Ok(HttpResponse::Ok().json(verdict))
}

async fn validate_stored_plot(
    state: &AppState,
    plot_id: Uuid,
) -> Result<GeoValidationResult, ApiError> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT ST_AsGeoJSON(geom) FROM plots WHERE id = $1 AND is_active = TRUE",
    )
    .bind(plot_id)
    .fetch_optional(&state.db_pool)
    .await?;

    let Some((geojson_text,)) = row else {
        return Err(ApiError::NotFound(format!("Talhão não encontrado: {plot_id}")));
    };

    let geometry: GeoJsonGeometry = serde_json::from_str(&geojson_text)
        .map_err(|e| ApiError::Internal(format!("stored plot geometry unreadable: {e}")))?;

    let (verdict, _) = run_validation(state, &geometry, Some(plot_id)).await?;
    cache_verdict(state, plot_id, &verdict).await?;
    Ok(verdict)
}

/// Persists a verdict into `validations`/`validation_checks` and rolls the
/// plot's compliance summary forward.
async fn cache_verdict(
    state: &AppState,
    plot_id: Uuid,
    verdict: &GeoValidationResult,
) -> Result<Uuid, ApiError> {
    let mut tx = state.db_pool.begin().await?;
    let validation_id = Uuid::new_v4();
    let expires_at = verdict.validated_at + Duration::days(state.settings.validation_expiry_days);

    sqlx::query(
        r#"
        INSERT INTO validations (id, plot_id, status, risk_score, validated_at, expires_at, reference_data_version)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(validation_id)
    .bind(plot_id)
    .bind(verdict.status.as_str())
    .bind(verdict.risk_score)
    .bind(verdict.validated_at)
    .bind(expires_at)
    .bind(&verdict.reference_data_version)
    .execute(&mut *tx)
    .await?;

    for check in &verdict.checks {
        sqlx::query(
            r#"
            INSERT INTO validation_checks (id, validation_id, check_type, status, score, message, details, evidence)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(validation_id)
        .bind(check.check_type.as_str())
        .bind(check.status.as_str())
        .bind(check.score)
        .bind(&check.message)
        .bind(serde_json::json!({
            "overlap_area_ha": check.overlap_area_ha,
            "overlap_percentage": check.overlap_percentage,
            "last_layer_update": check.last_layer_update,
        }))
        .bind(serde_json::json!({
            "features": check.overlapping_features,
        }))
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        UPDATE plots
        SET compliance_status = $2, risk_score = $3, last_validation_at = $4
        WHERE id = $1
        "#,
    )
    .bind(plot_id)
    .bind(verdict.status.as_str())
    .bind(verdict.risk_score)
    .bind(verdict.validated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(validation_id)
}

/// Batch validation over stored plots: per-item successes and failures,
/// never all-or-nothing.
#[utoipa::path(
    post,
    path = "/api/v1/validations/batch",
    request_body = BatchValidationRequest,
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Per-plot outcomes", body = BatchValidationResponse),
        (status = 400, description = "Too many plot ids")
    )
)]
pub async fn validate_batch(
    body: web::Json<BatchValidationRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let plot_ids = body.into_inner().plot_ids;
    if plot_ids.is_empty() {
        return Err(ApiError::BadRequest("Lista de talhões vazia".into()));
    }
    if plot_ids.len() > MAX_BATCH_SIZE {
        return Err(ApiError::BadRequest(format!(
            "Máximo de {MAX_BATCH_SIZE} talhões por lote (recebidos: {})",
            plot_ids.len()
        )));
    }

    let total = plot_ids.len();
    let mut results = Vec::new();
    let mut errors = Vec::new();

    for plot_id in plot_ids {
        match validate_stored_plot(&state, plot_id).await {
            Ok(verdict) => results.push(verdict),
            Err(e) => errors.push(BatchErrorDetail { plot_id, error: e.to_string() }),
        }
    }

    Ok(HttpResponse::Ok().json(BatchValidationResponse {
        total,
        succeeded: results.len(),
        failed: errors.len(),
        results,
        errors,
    }))
}

/// Stored verdict as returned by `GET /validations/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct StoredValidationResponse {
    pub id: Uuid,
    pub plot_id: Uuid,
    pub status: String,
    pub risk_score: i32,
    pub validated_at: chrono::DateTime<Utc>,
    pub expires_at: Option<chrono::DateTime<Utc>>,
    #[schema(value_type = Object)]
    pub reference_data_version: serde_json::Value,
    pub checks: Vec<StoredCheckResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StoredCheckResponse {
    pub check_type: String,
    pub status: String,
    pub score: Option<i32>,
    pub message: Option<String>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
}

/// Retrieves a previously cached verdict.
#[utoipa::path(
    get,
    path = "/api/v1/validations/{id}",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Stored verdict", body = StoredValidationResponse),
        (status = 404, description = "Unknown validation")
    )
)]
pub async fn get_validation(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let validation_id = path.into_inner();

    let validation: Option<ValidationDb> =
        sqlx::query_as("SELECT * FROM validations WHERE id = $1")
            .bind(validation_id)
            .fetch_optional(&state.db_pool)
            .await?;

    let Some(validation) = validation else {
        return Err(ApiError::NotFound(format!("Validação não encontrada: {validation_id}")));
    };

    let checks: Vec<ValidationCheckDb> = sqlx::query_as(
        "SELECT * FROM validation_checks WHERE validation_id = $1 ORDER BY check_type",
    )
    .bind(validation_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(StoredValidationResponse {
        id: validation.id,
        plot_id: validation.plot_id,
        status: validation.status,
        risk_score: validation.risk_score,
        validated_at: validation.validated_at,
        expires_at: validation.expires_at,
        reference_data_version: validation.reference_data_version,
        checks: checks
            .into_iter()
            .map(|c| StoredCheckResponse {
                check_type: c.check_type,
                status: c.status,
                score: c.score,
                message: c.message,
                details: c.details,
            })
            .collect(),
    }))
}
