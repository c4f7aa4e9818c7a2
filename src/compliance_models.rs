use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

/// The six screening checks, in execution (and report) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    DeforestationProdes,
    DeforestationMapbiomas,
    TerraIndigena,
    EmbargoIbama,
    Quilombola,
    Uc,
}

impl CheckType {
    pub const ALL: [CheckType; 6] = [
        CheckType::DeforestationProdes,
        CheckType::DeforestationMapbiomas,
        CheckType::TerraIndigena,
        CheckType::EmbargoIbama,
        CheckType::Quilombola,
        CheckType::Uc,
    ];

    /// Wire name used in responses and `checks_summary`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::DeforestationProdes => "deforestation_prodes",
            CheckType::DeforestationMapbiomas => "deforestation_mapbiomas",
            CheckType::TerraIndigena => "terra_indigena",
            CheckType::EmbargoIbama => "embargo_ibama",
            CheckType::Quilombola => "quilombola",
            CheckType::Uc => "uc",
        }
    }

    /// `reference_layers.layer_type` this check screens against.
    pub fn layer_type(&self) -> &'static str {
        match self {
            CheckType::DeforestationProdes => "prodes",
            CheckType::DeforestationMapbiomas => "mapbiomas",
            CheckType::TerraIndigena => "terra_indigena",
            CheckType::EmbargoIbama => "embargo_ibama",
            CheckType::Quilombola => "quilombola",
            CheckType::Uc => "uc",
        }
    }

    /// Contribution to the weighted risk score. The table sums to 100.
    pub fn weight(&self) -> f64 {
        match self {
            CheckType::DeforestationProdes => 35.0,
            CheckType::DeforestationMapbiomas => 25.0,
            CheckType::TerraIndigena => 15.0,
            CheckType::EmbargoIbama => 15.0,
            CheckType::Quilombola => 5.0,
            CheckType::Uc => 5.0,
        }
    }

    /// Checks whose `fail` is disqualifying no matter the aggregate.
    pub fn is_critical_blocker(&self) -> bool {
        !matches!(self, CheckType::DeforestationMapbiomas | CheckType::Uc)
    }

    pub fn display_name(&self, lang: Language) -> &'static str {
        match (self, lang) {
            (CheckType::DeforestationProdes, Language::Pt) => "Desmatamento PRODES (pós-2020)",
            (CheckType::DeforestationProdes, Language::En) => "PRODES deforestation (post-2020)",
            (CheckType::DeforestationMapbiomas, Language::Pt) => "Alertas MapBiomas (pós-2020)",
            (CheckType::DeforestationMapbiomas, Language::En) => "MapBiomas alerts (post-2020)",
            (CheckType::TerraIndigena, Language::Pt) => "Terras Indígenas",
            (CheckType::TerraIndigena, Language::En) => "Indigenous Territories",
            (CheckType::EmbargoIbama, Language::Pt) => "Embargos IBAMA",
            (CheckType::EmbargoIbama, Language::En) => "IBAMA Embargoes",
            (CheckType::Quilombola, Language::Pt) => "Territórios Quilombolas",
            (CheckType::Quilombola, Language::En) => "Quilombola Territories",
            (CheckType::Uc, Language::Pt) => "Unidades de Conservação",
            (CheckType::Uc, Language::En) => "Conservation Units",
        }
    }
}

impl std::fmt::Display for CheckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule outcome of a single check. Independent of the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warning,
    Skip,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "pass",
            CheckStatus::Fail => "fail",
            CheckStatus::Warning => "warning",
            CheckStatus::Skip => "skip",
        }
    }
}

/// Final verdict status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Approved,
    Warning,
    Rejected,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Approved => "approved",
            ComplianceStatus::Warning => "warning",
            ComplianceStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ComplianceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(ComplianceStatus::Approved),
            "warning" => Ok(ComplianceStatus::Warning),
            "rejected" => Ok(ComplianceStatus::Rejected),
            other => Err(format!("unknown compliance status: {other}")),
        }
    }
}

/// Report language. Unknown tags fall back to Portuguese.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Pt,
    En,
}

impl Language {
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.map(|t| t.to_ascii_lowercase()) {
            Some(t) if t == "en" || t.starts_with("en-") => Language::En,
            _ => Language::Pt,
        }
    }
}

/// UC categories under strict protection. Any overlap is disqualifying.
pub const UC_STRICT_CATEGORIES: [&str; 5] = ["PARNA", "ESEC", "REBIO", "EE", "MN"];

/// Per-layer attribute bag, decoded from `reference_layers.extra_data`.
/// Consumers read only the variant matching the row's `layer_type`;
/// anything unrecognized lands in `Opaque` for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerMetadata {
    Prodes {
        #[serde(skip_serializing_if = "Option::is_none")]
        year: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<String>,
    },
    Mapbiomas {
        #[serde(skip_serializing_if = "Option::is_none")]
        alert_code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        detected_at: Option<NaiveDate>,
    },
    TerraIndigena {
        #[serde(skip_serializing_if = "Option::is_none")]
        ethnicity: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        phase: Option<String>,
    },
    Uc {
        #[serde(skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sphere: Option<String>,
    },
    Quilombola {
        #[serde(skip_serializing_if = "Option::is_none")]
        community: Option<String>,
    },
    Embargo {
        #[serde(skip_serializing_if = "Option::is_none")]
        tad_number: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        infraction_date: Option<NaiveDate>,
    },
    Opaque {
        #[schema(value_type = Object)]
        data: serde_json::Value,
    },
}

impl LayerMetadata {
    fn str_field(value: &serde_json::Value, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|k| value.get(*k))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    fn date_field(value: &serde_json::Value, keys: &[&str]) -> Option<NaiveDate> {
        Self::str_field(value, keys).and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
    }

    /// Decode `extra_data` for a given layer type, keeping unknown shapes.
    pub fn from_extra_data(layer_type: &str, value: serde_json::Value) -> Self {
        if !value.is_object() {
            return LayerMetadata::Opaque { data: value };
        }
        match layer_type {
            "prodes" => LayerMetadata::Prodes {
                year: value.get("year").and_then(|v| v.as_i64()).map(|y| y as i32),
                state: Self::str_field(&value, &["state", "uf"]),
            },
            "mapbiomas" => LayerMetadata::Mapbiomas {
                alert_code: Self::str_field(&value, &["alert_code", "codigo"]),
                detected_at: Self::date_field(&value, &["detected_at", "data_deteccao"]),
            },
            "terra_indigena" => LayerMetadata::TerraIndigena {
                ethnicity: Self::str_field(&value, &["ethnicity", "etnia"]),
                phase: Self::str_field(&value, &["phase", "fase"]),
            },
            "uc" => LayerMetadata::Uc {
                category: Self::str_field(&value, &["category", "categoria"]),
                sphere: Self::str_field(&value, &["sphere", "esfera"]),
            },
            "quilombola" => LayerMetadata::Quilombola {
                community: Self::str_field(&value, &["community", "comunidade"]),
            },
            "embargo_ibama" => LayerMetadata::Embargo {
                tad_number: Self::str_field(&value, &["tad_number", "numero_tad"]),
                infraction_date: Self::date_field(&value, &["infraction_date", "data_infracao"]),
            },
            _ => LayerMetadata::Opaque { data: value },
        }
    }

    /// UC category, when this metadata belongs to a conservation unit.
    pub fn uc_category(&self) -> Option<&str> {
        match self {
            LayerMetadata::Uc { category, .. } => category.as_deref(),
            _ => None,
        }
    }
}

/// A reference-layer feature that actually intersects the plot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OverlapFeature {
    pub id: Uuid,
    pub name: Option<String>,
    /// Overlap with the plot, hectares (geography computation).
    pub overlap_ha: f64,
    pub extra_data: LayerMetadata,
    #[schema(value_type = Object)]
    pub intersection_geojson: Option<serde_json::Value>,
}

/// Outcome of one check against one reference layer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeoCheckResult {
    pub check_type: CheckType,
    pub status: CheckStatus,
    /// 0-100; feeds the weighted aggregate independently of `status`.
    pub score: i32,
    pub message: String,
    pub overlap_area_ha: f64,
    pub overlap_percentage: f64,
    pub overlapping_features: Vec<OverlapFeature>,
    #[schema(value_type = Vec<Object>)]
    pub intersection_geometries: Vec<serde_json::Value>,
    pub last_layer_update: Option<DateTime<Utc>>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
}

impl GeoCheckResult {
    /// Neutral result used when a check errors out or times out.
    pub fn skipped(check_type: CheckType, error: &str) -> Self {
        Self {
            check_type,
            status: CheckStatus::Skip,
            score: 50,
            message: format!("Check não executado: {error}"),
            overlap_area_ha: 0.0,
            overlap_percentage: 0.0,
            overlapping_features: Vec::new(),
            intersection_geometries: Vec::new(),
            last_layer_update: None,
            details: serde_json::json!({ "error": error }),
        }
    }

    /// True when this result vetoes the whole verdict.
    pub fn is_critical(&self) -> bool {
        match self.check_type {
            CheckType::Uc => self.score == 0,
            ct => ct.is_critical_blocker() && self.status == CheckStatus::Fail,
        }
    }
}

/// The verdict for one polygon.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeoValidationResult {
    pub plot_id: Option<Uuid>,
    pub status: ComplianceStatus,
    pub risk_score: i32,
    pub checks: Vec<GeoCheckResult>,
    pub validated_at: DateTime<Utc>,
    /// Snapshot of the dataset versions active at validation time.
    /// Captured once; must never mutate afterwards.
    #[schema(value_type = Object)]
    pub reference_data_version: serde_json::Value,
    pub processing_time_ms: i64,
}

/// Raw GeoJSON geometry as submitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeoJsonGeometry {
    #[serde(rename = "type")]
    pub geometry_type: String,
    #[schema(value_type = Object)]
    pub coordinates: serde_json::Value,
}

impl GeoJsonGeometry {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({ "type": self.geometry_type, "coordinates": self.coordinates })
    }
}

/// Optional property/plot context carried into reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PropertyInfo {
    pub property_name: Option<String>,
    pub plot_name: Option<String>,
    pub municipality: Option<String>,
    pub state: Option<String>,
    pub crop_type: Option<String>,
    /// Land use per year, e.g. {"2021": "pastagem", "2022": "soja"}.
    pub land_use_history: Option<BTreeMap<String, String>>,
}

/// Validation request body: either a bare GeoJSON geometry or an envelope
/// with property context and language.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ValidationRequestBody {
    Envelope {
        geometry: GeoJsonGeometry,
        #[serde(default)]
        property_info: Option<PropertyInfo>,
        #[serde(default)]
        lang: Option<String>,
    },
    Bare(GeoJsonGeometry),
}

impl ValidationRequestBody {
    pub fn into_parts(self) -> (GeoJsonGeometry, Option<PropertyInfo>, Language) {
        match self {
            ValidationRequestBody::Envelope { geometry, property_info, lang } => {
                (geometry, property_info, Language::from_tag(lang.as_deref()))
            }
            ValidationRequestBody::Bare(geometry) => (geometry, None, Language::Pt),
        }
    }
}

/// Batch validation request: stored plot ids, at most 100.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatchValidationRequest {
    pub plot_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchErrorDetail {
    pub plot_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchValidationResponse {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<GeoValidationResult>,
    pub errors: Vec<BatchErrorDetail>,
}

/// Public authenticity response for a report code.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerificationResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_expired: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Truncated SHA-256 of the canonical geometry JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry_hash: Option<String>,
    /// Truncated SHA-256 of the PDF bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one_hundred() {
        let total: f64 = CheckType::ALL.iter().map(|c| c.weight()).sum();
        assert_eq!(total, 100.0);
    }

    #[test]
    fn wire_names_are_stable() {
        assert_eq!(CheckType::DeforestationProdes.as_str(), "deforestation_prodes");
        assert_eq!(CheckType::DeforestationProdes.layer_type(), "prodes");
        assert_eq!(CheckType::Uc.as_str(), "uc");
        assert_eq!(
            serde_json::to_string(&CheckType::TerraIndigena).unwrap(),
            "\"terra_indigena\""
        );
    }

    #[test]
    fn critical_blockers_match_rules() {
        assert!(CheckType::DeforestationProdes.is_critical_blocker());
        assert!(CheckType::TerraIndigena.is_critical_blocker());
        assert!(CheckType::Quilombola.is_critical_blocker());
        assert!(CheckType::EmbargoIbama.is_critical_blocker());
        assert!(!CheckType::DeforestationMapbiomas.is_critical_blocker());
        // UC only vetoes through a zero score (strict-protection overlap).
        assert!(!CheckType::Uc.is_critical_blocker());
        let strict_uc = GeoCheckResult {
            check_type: CheckType::Uc,
            status: CheckStatus::Fail,
            score: 0,
            message: String::new(),
            overlap_area_ha: 1.0,
            overlap_percentage: 10.0,
            overlapping_features: Vec::new(),
            intersection_geometries: Vec::new(),
            last_layer_update: None,
            details: serde_json::Value::Null,
        };
        assert!(strict_uc.is_critical());
        let sustainable_uc = GeoCheckResult { score: 70, status: CheckStatus::Warning, ..strict_uc };
        assert!(!sustainable_uc.is_critical());
    }

    #[test]
    fn language_falls_back_to_portuguese() {
        assert_eq!(Language::from_tag(Some("en")), Language::En);
        assert_eq!(Language::from_tag(Some("EN-us")), Language::En);
        assert_eq!(Language::from_tag(Some("pt")), Language::Pt);
        assert_eq!(Language::from_tag(Some("de")), Language::Pt);
        assert_eq!(Language::from_tag(None), Language::Pt);
    }

    #[test]
    fn extra_data_decodes_per_layer() {
        let uc = LayerMetadata::from_extra_data(
            "uc",
            serde_json::json!({ "category": "PARNA", "sphere": "federal" }),
        );
        assert_eq!(uc.uc_category(), Some("PARNA"));

        let other = LayerMetadata::from_extra_data("unknown_layer", serde_json::json!({ "a": 1 }));
        assert!(matches!(other, LayerMetadata::Opaque { .. }));
    }

    #[test]
    fn request_body_accepts_bare_and_envelope() {
        let bare: ValidationRequestBody = serde_json::from_value(serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[-46.5, -23.5], [-46.5, -23.51], [-46.49, -23.51], [-46.5, -23.5]]]
        }))
        .unwrap();
        let (geom, info, lang) = bare.into_parts();
        assert_eq!(geom.geometry_type, "Polygon");
        assert!(info.is_none());
        assert_eq!(lang, Language::Pt);

        let envelope: ValidationRequestBody = serde_json::from_value(serde_json::json!({
            "geometry": { "type": "Polygon", "coordinates": [] },
            "property_info": { "property_name": "Fazenda Boa Vista", "state": "SP" },
            "lang": "en"
        }))
        .unwrap();
        let (_, info, lang) = envelope.into_parts();
        assert_eq!(info.unwrap().property_name.as_deref(), Some("Fazenda Boa Vista"));
        assert_eq!(lang, Language::En);
    }
}
