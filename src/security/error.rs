use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

/// Error taxonomy for the request pipeline. Every variant maps to one HTTP
/// status; the terminal handler renders `{ success: false, error, detail? }`
/// with CORS headers so browser clients see the real status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    GeometryInvalid(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Payload too large. Maximum size: {max_mb:.1} MB")]
    PayloadTooLarge { max_mb: f64 },

    #[error("{0}")]
    Unprocessable(String),

    #[error("Quota mensal excedida. Limite: {limit}, Usado: {used}. Faça upgrade do plano ou aguarde o reset mensal.")]
    QuotaExceeded { limit: i32, used: i32, reset_at: i64 },

    #[error("Rate limit exceeded. Try again in {retry_after} seconds.")]
    RateLimited { retry_after: i64, limit: u32, reset_at: i64 },

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::GeometryInvalid(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::QuotaExceeded { .. } | ApiError::RateLimited { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            // Never leak driver-level detail to clients.
            ApiError::Database(e) => {
                log::error!("database error: {}", redact(&e.to_string()));
                json!({ "success": false, "error": "Internal server error" })
            }
            ApiError::Internal(msg) => {
                log::error!("internal error: {}", redact(msg));
                json!({ "success": false, "error": "Internal server error" })
            }
            ApiError::QuotaExceeded { limit, used, reset_at } => json!({
                "success": false,
                "error": self.to_string(),
                "detail": { "monthly_quota": limit, "requests_this_month": used, "reset_at": reset_at },
            }),
            ApiError::RateLimited { retry_after, .. } => json!({
                "success": false,
                "error": self.to_string(),
                "detail": { "retry_after": retry_after },
            }),
            other => json!({ "success": false, "error": other.to_string() }),
        };

        let mut builder = HttpResponse::build(self.status());
        builder
            .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
            .insert_header((header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"))
            .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "*"))
            .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"));

        match self {
            ApiError::RateLimited { retry_after, limit, reset_at } => {
                builder
                    .insert_header((header::RETRY_AFTER, retry_after.to_string()))
                    .insert_header(("X-RateLimit-Limit", limit.to_string()))
                    .insert_header(("X-RateLimit-Remaining", "0"))
                    .insert_header(("X-RateLimit-Reset", reset_at.to_string()));
            }
            ApiError::QuotaExceeded { limit, reset_at, .. } => {
                builder
                    .insert_header(("X-RateLimit-Limit", limit.to_string()))
                    .insert_header(("X-RateLimit-Remaining", "0"))
                    .insert_header(("X-RateLimit-Reset", reset_at.to_string()));
            }
            _ => {}
        }

        builder.json(body)
    }
}

/// Masks credentials before they reach a log line: API keys, bearer tokens
/// and anything that looks like a password assignment.
pub fn redact(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find("gg_live_") {
        out.push_str(&rest[..pos]);
        out.push_str("gg_live_****");
        let tail = &rest[pos + "gg_live_".len()..];
        let skip = tail
            .char_indices()
            .take_while(|(_, c)| c.is_ascii_alphanumeric())
            .count();
        rest = &tail[skip..];
    }
    out.push_str(rest);

    for marker in ["Bearer ", "password=", "password\":"] {
        if let Some(pos) = out.find(marker) {
            out.truncate(pos + marker.len());
            out.push_str("****");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(ApiError::GeometryInvalid("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::PayloadTooLarge { max_mb: 5.0 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::QuotaExceeded { limit: 3, used: 3, reset_at: 0 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::RateLimited { retry_after: 12, limit: 20, reset_at: 0 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn redact_masks_api_keys_and_tokens() {
        let masked = redact("key gg_live_3f7a9b2c5e8d1f4a6b9c2e5f8a1d4b7c rejected");
        assert!(!masked.contains("3f7a9b2c"));
        assert!(masked.contains("gg_live_****"));

        let masked = redact("Authorization: Bearer eyJhbGciOi.secret");
        assert!(!masked.contains("eyJhbGciOi"));
    }
}
