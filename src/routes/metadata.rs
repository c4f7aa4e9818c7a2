use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};

use crate::api_state::AppState;
use crate::security::error::ApiError;

/// Last-update timestamp of every active reference layer. Public: apps
/// show these as "data freshness" and monitoring polls them.
#[utoipa::path(
    get,
    path = "/api/v1/metadata/data-freshness",
    responses(
        (status = 200, description = "Layer freshness timestamps")
    )
)]
pub async fn data_freshness(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows: Vec<(String, Option<DateTime<Utc>>)> = sqlx::query_as(
        r#"
        SELECT layer_type, MAX(ingested_at) AS last_updated
        FROM reference_layers
        WHERE is_active = TRUE
        GROUP BY layer_type
        ORDER BY layer_type
        "#,
    )
    .fetch_all(&state.db_pool)
    .await?;

    let mut layers = serde_json::Map::new();
    for (layer_type, last_updated) in rows {
        layers.insert(layer_type, serde_json::json!(last_updated));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "layers": layers,
        "last_check": Utc::now(),
    })))
}
