use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::compliance_models::{LayerMetadata, OverlapFeature};

/// Overlaps below this threshold (~1 m²) are edge/point-touch artifacts of
/// the intersection and do not count as real overlap.
pub const MIN_OVERLAP_HA: f64 = 0.0001;

/// Result of intersecting the plot against one reference layer.
#[derive(Debug, Clone, Default)]
pub struct LayerOverlap {
    pub total_overlap_ha: f64,
    pub percentage: f64,
    pub features: Vec<OverlapFeature>,
    pub intersection_geometries: Vec<serde_json::Value>,
}

impl LayerOverlap {
    pub fn has_overlap(&self) -> bool {
        !self.features.is_empty()
    }
}

/// Computes the overlap between a plot polygon and the active rows of one
/// reference layer.
///
/// The query is fully parameter-bound. The `&&` bbox operator runs first so
/// the GiST index prunes candidates before the exact `ST_Intersects`
/// predicate and the geography-typed `ST_Intersection` area (m² → ha).
/// Time-filtered layers pass `min_reference_date`.
pub async fn overlap(
    conn: &mut PgConnection,
    polygon_wkt: &str,
    layer_type: &str,
    plot_area_ha: f64,
    min_reference_date: Option<NaiveDate>,
) -> Result<LayerOverlap, sqlx::Error> {
    let rows: Vec<(Uuid, Option<String>, serde_json::Value, f64, Option<String>)> = sqlx::query_as(
        r#"
        SELECT r.id,
               r.source_name,
               COALESCE(r.extra_data, '{}'::jsonb) AS extra_data,
               ST_Area(ST_Intersection(r.geom, p.poly)::geography) / 10000.0 AS overlap_ha,
               ST_AsGeoJSON(ST_Intersection(r.geom, p.poly)) AS intersection_geojson
        FROM reference_layers r,
             (SELECT ST_SetSRID(ST_GeomFromText($1), 4326) AS poly) p
        WHERE r.layer_type = $2
          AND r.is_active = TRUE
          AND r.geom && p.poly
          AND ST_Intersects(r.geom, p.poly)
          AND ($3::date IS NULL OR r.reference_date >= $3)
        ORDER BY overlap_ha DESC
        "#,
    )
    .bind(polygon_wkt)
    .bind(layer_type)
    .bind(min_reference_date)
    .fetch_all(&mut *conn)
    .await?;

    let mut result = LayerOverlap::default();
    for (id, name, extra_data, overlap_ha, intersection_geojson) in rows {
        if overlap_ha <= MIN_OVERLAP_HA {
            continue;
        }
        let intersection = intersection_geojson
            .as_deref()
            .and_then(|g| serde_json::from_str::<serde_json::Value>(g).ok());
        if let Some(geom) = intersection.clone() {
            result.intersection_geometries.push(geom);
        }
        result.total_overlap_ha += overlap_ha;
        result.features.push(OverlapFeature {
            id,
            name,
            overlap_ha,
            extra_data: LayerMetadata::from_extra_data(layer_type, extra_data),
            intersection_geojson: intersection,
        });
    }

    if plot_area_ha > 0.0 {
        result.percentage = (result.total_overlap_ha / plot_area_ha * 100.0).min(100.0);
    }

    Ok(result)
}

/// Latest ingest timestamp of a layer's active rows, shown as data
/// freshness in verdicts and reports.
pub async fn layer_last_update(
    conn: &mut PgConnection,
    layer_type: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let row: Option<(Option<DateTime<Utc>>,)> = sqlx::query_as(
        r#"
        SELECT MAX(ingested_at)
        FROM reference_layers
        WHERE layer_type = $1 AND is_active = TRUE
        "#,
    )
    .bind(layer_type)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.and_then(|(ts,)| ts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_overlap_suppresses_point_touches() {
        // ~1 m² expressed in hectares.
        assert!(0.00009 < MIN_OVERLAP_HA);
        assert!(0.0002 > MIN_OVERLAP_HA);
    }
}
