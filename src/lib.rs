// Library crate for GreenGate Geo-Compliance
// Exports modules for use in integration tests

pub mod api_state;
pub mod compliance_models;
pub mod config;
pub mod database;
pub mod models;
pub mod routes;
pub mod security;
pub mod services;

// Core geospatial validation engine (mandatory)
pub mod core;

pub use api_state::AppState;
pub use config::Settings;

use actix_web::{web, HttpResponse, Responder};

/// Liveness probe.
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "greengate",
        "version": "1.0.0"
    }))
}

/// Deep diagnostics: database round trip, pool occupancy and rate-limiter
/// backend state.
pub async fn health_detailed(state: web::Data<AppState>) -> impl Responder {
    let db_ok = sqlx::query("SELECT 1").execute(&state.db_pool).await.is_ok();

    let body = serde_json::json!({
        "status": if db_ok { "healthy" } else { "degraded" },
        "service": "greengate",
        "version": state.settings.app_version,
        "database": {
            "reachable": db_ok,
            "pool_size": state.db_pool.size(),
            "pool_idle": state.db_pool.num_idle(),
        },
        "rate_limiter": state.rate_limiter.stats(),
    });

    if db_ok {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// Operational counters for scrapers.
pub async fn metrics(state: web::Data<AppState>) -> impl Responder {
    let reports: Option<(i64,)> = sqlx::query_as("SELECT COUNT(*) FROM validation_reports")
        .fetch_optional(&state.db_pool)
        .await
        .ok()
        .flatten();
    let active_keys: Option<(i64,)> = sqlx::query_as(
        "SELECT COUNT(*) FROM api_keys WHERE is_active = TRUE AND is_revoked = FALSE",
    )
    .fetch_optional(&state.db_pool)
    .await
    .ok()
    .flatten();

    HttpResponse::Ok().json(serde_json::json!({
        "db_pool_size": state.db_pool.size(),
        "db_pool_idle": state.db_pool.num_idle(),
        "reports_recorded": reports.map(|(n,)| n),
        "active_api_keys": active_keys.map(|(n,)| n),
        "rate_limiter": state.rate_limiter.stats(),
    }))
}
