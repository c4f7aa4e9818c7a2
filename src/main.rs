use actix_web::{middleware, web, App, HttpServer};
use actix_cors::Cors;
use utoipa::openapi::security::{ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use greengate::security::{
    ApiKeyAdmission, PayloadLimit, RateLimit, RateLimitConfig, RequestLogging, SecurityHeaders,
};
use greengate::{compliance_models, routes, security, AppState, Settings};

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::validations::quick_validate,
        routes::validations::validate,
        routes::validations::validate_plot,
        routes::validations::validate_batch,
        routes::validations::get_validation,
        routes::reports::due_diligence_quick,
        routes::verify::verify_report_code,
        routes::verify::verify_report_geometry,
        routes::verify::verify_report_page,
        routes::metadata::data_freshness,
        routes::auth::login,
        routes::auth::logout,
        routes::auth::register,
        routes::admin_api_keys::create_api_key,
        routes::admin_api_keys::list_api_keys,
        routes::admin_api_keys::usage_stats,
        routes::admin_api_keys::get_api_key,
        routes::admin_api_keys::change_plan,
        routes::admin_api_keys::revoke_api_key,
    ),
    components(schemas(
        compliance_models::CheckType,
        compliance_models::CheckStatus,
        compliance_models::ComplianceStatus,
        compliance_models::Language,
        compliance_models::LayerMetadata,
        compliance_models::OverlapFeature,
        compliance_models::GeoCheckResult,
        compliance_models::GeoValidationResult,
        compliance_models::GeoJsonGeometry,
        compliance_models::PropertyInfo,
        compliance_models::ValidationRequestBody,
        compliance_models::BatchValidationRequest,
        compliance_models::BatchErrorDetail,
        compliance_models::BatchValidationResponse,
        compliance_models::VerificationResponse,
        routes::validations::StoredValidationResponse,
        routes::validations::StoredCheckResponse,
        routes::auth::LoginRequest,
        routes::auth::LoginResponse,
        routes::auth::RegisterRequest,
        routes::admin_api_keys::CreateApiKeyRequest,
        routes::admin_api_keys::ApiKeyInfoResponse,
        routes::admin_api_keys::ChangePlanRequest,
        security::api_keys::CreatedApiKey,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(utoipa::openapi::security::ApiKey::Header(
                    ApiKeyValue::new("x-api-key"),
                )),
            );
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build(),
                ),
            );
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::from_env();
    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);

    log::info!("🌱 GreenGate Geo-Compliance API starting on port {port}");
    log::info!("📚 Swagger UI available at: http://localhost:{port}/swagger-ui/");

    let app_state = match AppState::new(settings.clone()).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("❌ Failed to connect to database: {e}");
            eprintln!("💡 Make sure PostgreSQL/PostGIS is running and DATABASE_URL is set correctly");
            std::process::exit(1);
        }
    };
    log::info!("✅ Database connected");

    let rate_limiter = RateLimit::new(
        app_state.rate_limiter.clone(),
        RateLimitConfig {
            enabled: settings.rate_limit_enabled,
            authenticated_per_minute: settings.rate_limit_authenticated,
            anonymous_per_minute: settings.rate_limit_anonymous,
            window_seconds: 60,
        },
    );
    let max_upload_size = settings.max_upload_size;
    let cors_settings = settings.clone();

    let app_state = web::Data::new(app_state);

    HttpServer::new(move || {
        let origins = cors_settings.cors_origins();
        let cors = if origins.first().map(String::as_str) == Some("*") {
            // Development mode only.
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600)
        } else {
            let mut cors = Cors::default().allow_any_method().allow_any_header().max_age(3600);
            for origin in &origins {
                cors = cors.allowed_origin(origin);
            }
            cors
        };

        // Wrap order is load-bearing. actix runs the LAST wrap first, so
        // this stack executes as: CORS -> security headers -> size limit ->
        // request logging -> API-key admission -> rate limit -> handler.
        App::new()
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(max_upload_size).error_handler(
                |err, _req| {
                    // Malformed bodies are schema failures (422), not 400s.
                    greengate::security::ApiError::Unprocessable(err.to_string()).into()
                },
            ))
            .wrap(rate_limiter.clone())
            .wrap(ApiKeyAdmission)
            .wrap(RequestLogging)
            .wrap(PayloadLimit::new(max_upload_size))
            .wrap(SecurityHeaders)
            .wrap(cors)
            .wrap(middleware::Compress::default())
            .route("/health", web::get().to(greengate::health))
            .route("/health/detailed", web::get().to(greengate::health_detailed))
            .route("/metrics", web::get().to(greengate::metrics))
            .service(
                web::scope("/api/v1")
                    // Validation engine
                    .service(web::resource("/validations/quick").route(web::post().to(routes::validations::quick_validate)))
                    .service(web::resource("/validations/validate").route(web::post().to(routes::validations::validate)))
                    .service(web::resource("/validations/plot/{id}").route(web::post().to(routes::validations::validate_plot)))
                    .service(web::resource("/validations/batch").route(web::post().to(routes::validations::validate_batch)))
                    .service(web::resource("/validations/{id}").route(web::get().to(routes::validations::get_validation)))
                    // Reports and public verification
                    .service(web::resource("/reports/due-diligence/quick").route(web::post().to(routes::reports::due_diligence_quick)))
                    .service(web::resource("/reports/verify/{code}").route(web::get().to(routes::verify::verify_report_code)))
                    .service(web::resource("/reports/verify/{code}/geometry").route(web::post().to(routes::verify::verify_report_geometry)))
                    .service(web::resource("/reports/verify/{code}/page").route(web::get().to(routes::verify::verify_report_page)))
                    // Metadata
                    .service(web::resource("/metadata/data-freshness").route(web::get().to(routes::metadata::data_freshness)))
                    // Admin auth + self registration
                    .service(web::resource("/auth/login").route(web::post().to(routes::auth::login)))
                    .service(web::resource("/auth/logout").route(web::post().to(routes::auth::logout)))
                    .service(web::resource("/auth/register").route(web::post().to(routes::auth::register)))
                    // Admin API-key management (JWT)
                    .service(
                        web::resource("/admin/api-keys")
                            .route(web::post().to(routes::admin_api_keys::create_api_key))
                            .route(web::get().to(routes::admin_api_keys::list_api_keys)),
                    )
                    .service(web::resource("/admin/api-keys/stats").route(web::get().to(routes::admin_api_keys::usage_stats)))
                    .service(
                        web::resource("/admin/api-keys/{id}")
                            .route(web::get().to(routes::admin_api_keys::get_api_key))
                            .route(web::delete().to(routes::admin_api_keys::revoke_api_key)),
                    )
                    .service(web::resource("/admin/api-keys/{id}/plan").route(web::put().to(routes::admin_api_keys::change_plan))),
            )
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-doc/openapi.json", ApiDoc::openapi()))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
