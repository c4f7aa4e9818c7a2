use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Instant;
use uuid::Uuid;

use crate::compliance_models::{
    CheckStatus, CheckType, ComplianceStatus, GeoCheckResult, GeoValidationResult,
    UC_STRICT_CATEGORIES,
};
use crate::config::Settings;
use crate::core::dataset_registry::DatasetRegistry;
use crate::core::geometry::ValidatedPolygon;
use crate::core::spatial_gateway::{self, LayerOverlap};
use crate::security::error::redact;

/// Orchestrates the six reference-layer checks for one polygon and turns
/// them into a verdict.
///
/// Every check runs inside its own savepoint on the caller's transaction:
/// a failing or timing-out check is rolled back in isolation, reported as
/// `skip` with a neutral score, and never poisons its siblings or the
/// enclosing request.
pub struct ValidationEngine<'a> {
    pool: &'a PgPool,
    registry: &'a DatasetRegistry,
    settings: &'a Settings,
}

impl<'a> ValidationEngine<'a> {
    pub fn new(pool: &'a PgPool, registry: &'a DatasetRegistry, settings: &'a Settings) -> Self {
        Self { pool, registry, settings }
    }

    pub async fn validate(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        polygon: &ValidatedPolygon,
        plot_id: Option<Uuid>,
    ) -> Result<GeoValidationResult, sqlx::Error> {
        let started = Instant::now();
        let wkt = polygon.to_wkt();
        let area_ha = polygon.area_ha();

        let mut checks = Vec::with_capacity(CheckType::ALL.len());
        for check_type in CheckType::ALL {
            let result = match self.run_check(tx, check_type, &wkt, area_ha).await {
                Ok(r) => r,
                Err(e) => {
                    let msg = redact(&e.to_string());
                    log::warn!("check {check_type} skipped: {msg}");
                    GeoCheckResult::skipped(check_type, &msg)
                }
            };
            checks.push(result);
        }

        let aggregate = aggregate_score(&checks);
        let (status, risk_score) = decide_status(&checks, aggregate);

        // Snapshot the dataset versions active right now; the audit record
        // must capture these bytes unchanged even if upstream rotates.
        let reference_data_version = self.registry.active_versions(self.pool).await?;

        Ok(GeoValidationResult {
            plot_id,
            status,
            risk_score,
            checks,
            validated_at: Utc::now(),
            reference_data_version,
            processing_time_ms: started.elapsed().as_millis() as i64,
        })
    }

    /// Runs one check inside a savepoint. Any error unwinds only the
    /// savepoint (dropped transactions roll back); the caller converts it
    /// into a `skip` result.
    async fn run_check(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        check_type: CheckType,
        polygon_wkt: &str,
        plot_area_ha: f64,
    ) -> Result<GeoCheckResult, sqlx::Error> {
        let mut sp = tx.begin().await?;

        let min_reference_date = match check_type {
            CheckType::DeforestationProdes | CheckType::DeforestationMapbiomas => {
                Some(self.settings.deforestation_min_date())
            }
            _ => None,
        };

        let overlap = spatial_gateway::overlap(
            &mut sp,
            polygon_wkt,
            check_type.layer_type(),
            plot_area_ha,
            min_reference_date,
        )
        .await?;

        let last_layer_update =
            spatial_gateway::layer_last_update(&mut sp, check_type.layer_type()).await?;

        sp.commit().await?;

        Ok(build_check_result(check_type, overlap, last_layer_update))
    }
}

/// Applies the per-check verdict rules to a computed overlap.
fn build_check_result(
    check_type: CheckType,
    overlap: LayerOverlap,
    last_layer_update: Option<chrono::DateTime<Utc>>,
) -> GeoCheckResult {
    let feature_count = overlap.features.len();

    let (status, score, message) = if !overlap.has_overlap() {
        (CheckStatus::Pass, 100, "Nenhuma sobreposição detectada".to_string())
    } else {
        match check_type {
            CheckType::Uc => {
                let strict: Vec<&str> = overlap
                    .features
                    .iter()
                    .filter_map(|f| f.extra_data.uc_category())
                    .filter(|c| UC_STRICT_CATEGORIES.contains(c))
                    .collect();
                if strict.is_empty() {
                    (
                        CheckStatus::Warning,
                        70,
                        format!(
                            "Sobreposição de {:.4} ha com Unidade de Conservação de uso sustentável",
                            overlap.total_overlap_ha
                        ),
                    )
                } else {
                    (
                        CheckStatus::Fail,
                        0,
                        format!(
                            "Sobreposição de {:.4} ha com Unidade de Conservação de proteção integral ({})",
                            overlap.total_overlap_ha,
                            strict.join(", ")
                        ),
                    )
                }
            }
            CheckType::DeforestationProdes => (
                CheckStatus::Fail,
                0,
                format!(
                    "Sobreposição de {:.4} ha com desmatamento PRODES pós-2020",
                    overlap.total_overlap_ha
                ),
            ),
            CheckType::DeforestationMapbiomas => (
                CheckStatus::Fail,
                0,
                format!(
                    "Sobreposição de {:.4} ha com alertas MapBiomas pós-2020",
                    overlap.total_overlap_ha
                ),
            ),
            CheckType::TerraIndigena => (
                CheckStatus::Fail,
                0,
                format!("Sobreposição de {:.4} ha com Terra Indígena", overlap.total_overlap_ha),
            ),
            CheckType::Quilombola => (
                CheckStatus::Fail,
                0,
                format!(
                    "Sobreposição de {:.4} ha com Território Quilombola",
                    overlap.total_overlap_ha
                ),
            ),
            CheckType::EmbargoIbama => (
                CheckStatus::Fail,
                0,
                format!("Sobreposição de {:.4} ha com embargo IBAMA ativo", overlap.total_overlap_ha),
            ),
        }
    };

    let feature_names: Vec<String> = overlap
        .features
        .iter()
        .filter_map(|f| f.name.clone())
        .collect();
    let details = serde_json::json!({
        "feature_count": feature_count,
        "feature_names": feature_names,
    });

    GeoCheckResult {
        check_type,
        status,
        score,
        message,
        overlap_area_ha: overlap.total_overlap_ha,
        overlap_percentage: overlap.percentage,
        overlapping_features: overlap.features,
        intersection_geometries: overlap.intersection_geometries,
        last_layer_update,
        details,
    }
}

/// Weighted aggregate over non-skipped checks. All-skip degrades to the
/// neutral midpoint.
pub fn aggregate_score(checks: &[GeoCheckResult]) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for check in checks {
        if check.status == CheckStatus::Skip {
            continue;
        }
        weighted += check.check_type.weight() * check.score as f64;
        total_weight += check.check_type.weight();
    }
    if total_weight == 0.0 {
        return 50.0;
    }
    weighted / total_weight
}

/// Maps the aggregate score to a status, then applies the critical-blocker
/// veto, which overrides the aggregate entirely.
pub fn decide_status(checks: &[GeoCheckResult], score: f64) -> (ComplianceStatus, i32) {
    if checks.iter().any(|c| c.is_critical()) {
        return (ComplianceStatus::Rejected, 0);
    }

    let has_warning = checks.iter().any(|c| c.status == CheckStatus::Warning);
    let status = if score >= 75.0 {
        if has_warning {
            ComplianceStatus::Warning
        } else {
            ComplianceStatus::Approved
        }
    } else if score >= 60.0 {
        ComplianceStatus::Warning
    } else {
        ComplianceStatus::Rejected
    };

    (status, score.round().clamp(0.0, 100.0) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance_models::{LayerMetadata, OverlapFeature};

    fn check(check_type: CheckType, status: CheckStatus, score: i32) -> GeoCheckResult {
        GeoCheckResult {
            check_type,
            status,
            score,
            message: String::new(),
            overlap_area_ha: 0.0,
            overlap_percentage: 0.0,
            overlapping_features: Vec::new(),
            intersection_geometries: Vec::new(),
            last_layer_update: None,
            details: serde_json::Value::Null,
        }
    }

    fn all_pass() -> Vec<GeoCheckResult> {
        CheckType::ALL
            .iter()
            .map(|&ct| check(ct, CheckStatus::Pass, 100))
            .collect()
    }

    #[test]
    fn clean_area_is_approved_with_full_score() {
        let checks = all_pass();
        let score = aggregate_score(&checks);
        assert_eq!(score, 100.0);
        assert_eq!(decide_status(&checks, score), (ComplianceStatus::Approved, 100));
    }

    #[test]
    fn prodes_fail_vetoes_everything() {
        let mut checks = all_pass();
        checks[0] = check(CheckType::DeforestationProdes, CheckStatus::Fail, 0);
        let score = aggregate_score(&checks);
        // Aggregate is 65, but the veto forces rejected/0.
        assert_eq!(score, 65.0);
        assert_eq!(decide_status(&checks, score), (ComplianceStatus::Rejected, 0));
    }

    #[test]
    fn uc_strict_protection_vetoes_via_zero_score() {
        let mut checks = all_pass();
        checks[5] = check(CheckType::Uc, CheckStatus::Fail, 0);
        let score = aggregate_score(&checks);
        assert_eq!(score, 95.0);
        assert_eq!(decide_status(&checks, score), (ComplianceStatus::Rejected, 0));
    }

    #[test]
    fn uc_sustainable_use_downgrades_to_warning() {
        let mut checks = all_pass();
        checks[5] = check(CheckType::Uc, CheckStatus::Warning, 70);
        let score = aggregate_score(&checks);
        assert!((score - 98.5).abs() < 1e-9);
        assert_eq!(decide_status(&checks, score), (ComplianceStatus::Warning, 99));
    }

    #[test]
    fn mapbiomas_alone_is_not_a_veto() {
        // MapBiomas is weighted but not a critical blocker: the verdict
        // follows the aggregate, which lands exactly on the 75 boundary.
        let mut checks = all_pass();
        checks[1] = check(CheckType::DeforestationMapbiomas, CheckStatus::Fail, 0);
        let score = aggregate_score(&checks);
        assert_eq!(score, 75.0);
        assert_eq!(decide_status(&checks, score), (ComplianceStatus::Approved, 75));
    }

    #[test]
    fn skipped_checks_drop_out_of_the_aggregate() {
        let mut checks = all_pass();
        checks[0] = GeoCheckResult::skipped(CheckType::DeforestationProdes, "timeout");
        let score = aggregate_score(&checks);
        // Remaining weight 65, all passing: still 100.
        assert_eq!(score, 100.0);
        assert_eq!(decide_status(&checks, score).0, ComplianceStatus::Approved);
    }

    #[test]
    fn all_skipped_is_neutral_and_rejected_by_threshold() {
        let checks: Vec<_> = CheckType::ALL
            .iter()
            .map(|&ct| GeoCheckResult::skipped(ct, "db down"))
            .collect();
        let score = aggregate_score(&checks);
        assert_eq!(score, 50.0);
        assert_eq!(decide_status(&checks, score), (ComplianceStatus::Rejected, 50));
    }

    #[test]
    fn mid_band_scores_become_warning() {
        // Embargo skipped, mapbiomas failed: 60 of the remaining 85 weight passes.
        let mut checks = all_pass();
        checks[1] = check(CheckType::DeforestationMapbiomas, CheckStatus::Fail, 0);
        checks[3] = GeoCheckResult::skipped(CheckType::EmbargoIbama, "timeout");
        let score = aggregate_score(&checks);
        assert!((score - 7058.82 / 100.0).abs() < 0.01, "score={score}");
        assert_eq!(decide_status(&checks, score).0, ComplianceStatus::Warning);
    }

    #[test]
    fn uc_overlap_with_strict_category_builds_zero_score_fail() {
        let overlap = LayerOverlap {
            total_overlap_ha: 2.5,
            percentage: 10.0,
            features: vec![OverlapFeature {
                id: uuid::Uuid::new_v4(),
                name: Some("PARNA Serra da Bocaina".into()),
                overlap_ha: 2.5,
                extra_data: LayerMetadata::from_extra_data(
                    "uc",
                    serde_json::json!({ "category": "PARNA" }),
                ),
                intersection_geojson: None,
            }],
            intersection_geometries: Vec::new(),
        };
        let result = build_check_result(CheckType::Uc, overlap, None);
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(result.score, 0);
        assert!(result.is_critical());
        assert!(result.message.contains("PARNA"));
    }

    #[test]
    fn uc_overlap_with_sustainable_category_is_warning_70() {
        let overlap = LayerOverlap {
            total_overlap_ha: 1.0,
            percentage: 5.0,
            features: vec![OverlapFeature {
                id: uuid::Uuid::new_v4(),
                name: Some("APA Piracicaba".into()),
                overlap_ha: 1.0,
                extra_data: LayerMetadata::from_extra_data(
                    "uc",
                    serde_json::json!({ "category": "APA" }),
                ),
                intersection_geojson: None,
            }],
            intersection_geometries: Vec::new(),
        };
        let result = build_check_result(CheckType::Uc, overlap, None);
        assert_eq!(result.status, CheckStatus::Warning);
        assert_eq!(result.score, 70);
        assert!(!result.is_critical());
    }

    #[test]
    fn clean_overlap_passes() {
        let result = build_check_result(CheckType::TerraIndigena, LayerOverlap::default(), None);
        assert_eq!(result.status, CheckStatus::Pass);
        assert_eq!(result.score, 100);
    }
}
