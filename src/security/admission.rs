use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::HeaderName;
use actix_web::http::Method;
use actix_web::{Error, HttpMessage};
use futures::future::{ok, Ready};
use futures::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::api_state::AppState;
use crate::security::api_keys::{ApiKeyService, QuotaSnapshot};
use crate::security::error::ApiError;

/// Paths admitted without an API key: health, docs, public verification,
/// admin/auth (JWT-guarded) and the quick-validate demo.
fn is_public(path: &str) -> bool {
    matches!(
        path,
        "/" | "/health"
            | "/health/detailed"
            | "/metrics"
            | "/openapi.json"
            | "/api-doc/openapi.json"
            | "/api/v1/metadata/data-freshness"
            | "/api/v1/validations/quick"
    ) || path.starts_with("/docs")
        || path.starts_with("/swagger-ui")
        || path.starts_with("/api/v1/auth/")
        || path.starts_with("/api/v1/admin/")
        || path.starts_with("/api/v1/reports/verify")
}

/// API-key admission middleware.
///
/// For every non-public request it runs the quota-guard protocol
/// (`ApiKeyService::admit`): row lock, window reset, quota check and
/// atomic increment, all committed before the handler runs. The resulting
/// snapshot is attached to the request and echoed in the X-RateLimit
/// response headers.
#[derive(Clone, Default)]
pub struct ApiKeyAdmission;

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAdmission
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyAdmissionMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ApiKeyAdmissionMiddleware { service: Rc::new(service) })
    }
}

pub struct ApiKeyAdmissionMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyAdmissionMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            // CORS preflight never consumes quota.
            if req.method() == Method::OPTIONS || is_public(req.path()) {
                return service.call(req).await;
            }

            let Some(api_key) = req
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
            else {
                return Err(ApiError::Forbidden(
                    "API Key não fornecida. Use o header x-api-key.".into(),
                )
                .into());
            };

            let Some(state) = req.app_data::<actix_web::web::Data<AppState>>() else {
                return Err(ApiError::Internal("application state missing".into()).into());
            };

            let snapshot = ApiKeyService::new(state.db_pool.clone()).admit(&api_key).await?;
            req.extensions_mut().insert(snapshot.clone());

            let mut res = service.call(req).await?;

            // Post-increment quota state for the client.
            let headers = res.headers_mut();
            if let Some(quota) = snapshot.monthly_quota {
                if let Ok(v) = quota.to_string().parse() {
                    headers.insert(HeaderName::from_static("x-ratelimit-limit"), v);
                }
                if let Ok(v) = snapshot
                    .quota_remaining
                    .unwrap_or(0)
                    .to_string()
                    .parse()
                {
                    headers.insert(HeaderName::from_static("x-ratelimit-remaining"), v);
                }
                if let Ok(v) = snapshot.reset_at.to_string().parse() {
                    headers.insert(HeaderName::from_static("x-ratelimit-reset"), v);
                }
            }

            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_allowlist_matches_surface() {
        assert!(is_public("/health"));
        assert!(is_public("/metrics"));
        assert!(is_public("/api/v1/validations/quick"));
        assert!(is_public("/api/v1/metadata/data-freshness"));
        assert!(is_public("/api/v1/reports/verify/GG-20250101120000-A1B2"));
        assert!(is_public("/api/v1/reports/verify/GG-20250101120000-A1B2/page"));
        assert!(is_public("/api/v1/auth/login"));
        assert!(is_public("/api/v1/admin/api-keys"));

        assert!(!is_public("/api/v1/validations/validate"));
        assert!(!is_public("/api/v1/validations/batch"));
        assert!(!is_public("/api/v1/reports/due-diligence/quick"));
    }
}
