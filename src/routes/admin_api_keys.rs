use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api_state::AppState;
use crate::models::db_models::ApiKeyDb;
use crate::security::api_keys::ApiKeyService;
use crate::security::auth::require_admin;
use crate::security::error::ApiError;

#[derive(Deserialize, ToSchema)]
pub struct CreateApiKeyRequest {
    pub client_name: String,
    #[serde(default = "default_plan")]
    pub plan: String,
    pub client_email: Option<String>,
    pub client_document: Option<String>,
    pub expires_in_days: Option<i64>,
    pub notes: Option<String>,
}

fn default_plan() -> String {
    "free".to_string()
}

/// Key metadata exposed to admins. Never includes the hash.
#[derive(Serialize, ToSchema)]
pub struct ApiKeyInfoResponse {
    pub id: Uuid,
    pub key_prefix: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub plan: String,
    pub monthly_quota: Option<i32>,
    pub requests_this_month: i32,
    pub total_requests: i64,
    pub is_active: bool,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiKeyDb> for ApiKeyInfoResponse {
    fn from(key: ApiKeyDb) -> Self {
        Self {
            id: key.id,
            key_prefix: key.key_prefix,
            client_name: key.client_name,
            client_email: key.client_email,
            plan: key.plan,
            monthly_quota: key.monthly_quota,
            requests_this_month: key.requests_this_month,
            total_requests: key.total_requests,
            is_active: key.is_active,
            is_revoked: key.is_revoked,
            created_at: key.created_at,
            expires_at: key.expires_at,
            last_used_at: key.last_used_at,
        }
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub plan: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePlanRequest {
    pub plan: String,
}

/// Creates a key. The plaintext is returned exactly once, here.
#[utoipa::path(
    post,
    path = "/api/v1/admin/api-keys",
    request_body = CreateApiKeyRequest,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Key created (plaintext shown once)"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn create_api_key(
    req: HttpRequest,
    body: web::Json<CreateApiKeyRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let claims = require_admin(&req, &state.auth)?;
    let request = body.into_inner();

    let created = ApiKeyService::new(state.db_pool.clone())
        .create_api_key(
            request.client_name.trim(),
            &request.plan,
            request.client_email.as_deref(),
            request.client_document.as_deref(),
            request.expires_in_days,
            request.notes.as_deref(),
            Some(&claims.sub),
        )
        .await?;

    Ok(HttpResponse::Created().json(created))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/api-keys",
    security(("bearer" = [])),
    responses((status = 200, description = "Keys", body = Vec<ApiKeyInfoResponse>))
)]
pub async fn list_api_keys(
    req: HttpRequest,
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state.auth)?;

    let keys = ApiKeyService::new(state.db_pool.clone())
        .list_api_keys(
            query.plan.as_deref(),
            query.limit.unwrap_or(100).clamp(1, 500),
            query.offset.unwrap_or(0).max(0),
        )
        .await?;

    let response: Vec<ApiKeyInfoResponse> = keys.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/api-keys/stats",
    security(("bearer" = [])),
    responses((status = 200, description = "Aggregate usage statistics"))
)]
pub async fn usage_stats(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state.auth)?;
    let stats = ApiKeyService::new(state.db_pool.clone()).usage_stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/api-keys/{id}",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Key", body = ApiKeyInfoResponse),
        (status = 404, description = "Unknown key")
    )
)]
pub async fn get_api_key(
    req: HttpRequest,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state.auth)?;
    let id = path.into_inner();

    let key = ApiKeyService::new(state.db_pool.clone())
        .get_api_key(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("API key não encontrada: {id}")))?;

    Ok(HttpResponse::Ok().json(ApiKeyInfoResponse::from(key)))
}

/// Plan change: new quota applies immediately, month counter resets.
#[utoipa::path(
    put,
    path = "/api/v1/admin/api-keys/{id}/plan",
    request_body = ChangePlanRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Updated key", body = ApiKeyInfoResponse),
        (status = 404, description = "Unknown key")
    )
)]
pub async fn change_plan(
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<ChangePlanRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state.auth)?;

    let updated = ApiKeyService::new(state.db_pool.clone())
        .change_plan(path.into_inner(), &body.plan)
        .await?;

    Ok(HttpResponse::Ok().json(ApiKeyInfoResponse::from(updated)))
}

/// Revocation is a soft delete; the row stays for audit trails.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/api-keys/{id}",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Revoked"),
        (status = 404, description = "Unknown or already revoked key")
    )
)]
pub async fn revoke_api_key(
    req: HttpRequest,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state.auth)?;
    let id = path.into_inner();

    let revoked = ApiKeyService::new(state.db_pool.clone()).revoke_api_key(id).await?;
    if !revoked {
        return Err(ApiError::NotFound(format!("API key não encontrada ou já revogada: {id}")));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "revoked": true, "id": id })))
}
