use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api_state::AppState;
use crate::security::api_keys::ApiKeyService;
use crate::security::auth::{verify_admin_credentials, Claims};
use crate::security::error::ApiError;

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Admin login: bcrypt-verified credentials exchanged for a JWT.
/// Brute force is bounded at 5 attempts per IP every 5 minutes.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "JWT issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    req: HttpRequest,
    body: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let client_ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    let info = state
        .rate_limiter
        .check(&format!("login:{client_ip}"), 5, 300)
        .await;
    if !info.allowed {
        let retry_after = (info.reset_at - chrono::Utc::now().timestamp()).max(1);
        return Err(ApiError::RateLimited { retry_after, limit: 5, reset_at: info.reset_at });
    }

    if !verify_admin_credentials(
        &body.username,
        &body.password,
        &state.settings.admin_username,
        &state.settings.admin_password_hash,
    ) {
        log::warn!("failed admin login for '{}' from {client_ip}", body.username);
        return Err(ApiError::Unauthorized("Credenciais inválidas".into()));
    }

    let expire_minutes = state.settings.access_token_expire_minutes;
    let claims = Claims::admin(body.username.clone(), expire_minutes);
    let token = state.auth.generate_token(&claims)?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        expires_in: expire_minutes * 60,
    }))
}

/// JWTs are stateless; logout is a client-side discard.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses((status = 200, description = "Logged out"))
)]
pub async fn logout() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "message": "Logout realizado com sucesso" }))
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub client_name: String,
    pub client_email: String,
}

/// Public self-registration: issues a free-plan key for evaluation. The
/// plaintext key appears only in this response. Duplicate e-mails conflict.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Key created"),
        (status = 409, description = "E-mail already registered"),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn register(
    body: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    let email = request.client_email.trim().to_lowercase();
    if request.client_name.trim().is_empty() || !email.contains('@') {
        return Err(ApiError::Unprocessable("Informe client_name e um client_email válido".into()));
    }

    let existing: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM api_keys WHERE client_email = $1 AND is_revoked = FALSE LIMIT 1",
    )
    .bind(&email)
    .fetch_optional(&state.db_pool)
    .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict(format!("E-mail já cadastrado: {email}")));
    }

    let created = ApiKeyService::new(state.db_pool.clone())
        .create_api_key(
            request.client_name.trim(),
            "free",
            Some(&email),
            None,
            None,
            Some("auto-registro público"),
            Some("self-registration"),
        )
        .await?;

    log::info!("self-registered key {} for {}", created.key_prefix, email);
    Ok(HttpResponse::Created().json(created))
}
