pub mod labels;
pub mod qr;
pub mod sketch;

use chrono::{DateTime, FixedOffset, Utc};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point, Polygon,
    PolygonMode, Rgb,
};
use std::io::BufWriter;

#[inline]
fn mm(v: f64) -> Mm {
    Mm(v as f32)
}

use crate::compliance_models::{
    CheckStatus, ComplianceStatus, GeoValidationResult, Language, PropertyInfo,
};
use crate::config::Settings;
use crate::core::geometry::ValidatedPolygon;
use crate::security::error::ApiError;
use crate::services::audit_service::{generate_report_code, hash_bytes, hash_geojson};
use self::labels::Labels;

const PAGE_W: f64 = 210.0;
const PAGE_H: f64 = 297.0;
const MARGIN: f64 = 15.0;

/// A rendered due-diligence report. The code is baked into the cover and
/// the QR payload, so the audit record must be stored under exactly this
/// code.
pub struct RenderedReport {
    pub bytes: Vec<u8>,
    pub report_code: String,
    pub content_hash: String,
}

/// Renders the three-page bilingual screening report bound to a verdict.
pub struct DueDiligenceReportGenerator<'a> {
    settings: &'a Settings,
}

struct Fonts {
    bold: IndirectFontRef,
    regular: IndirectFontRef,
}

impl<'a> DueDiligenceReportGenerator<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Renders with a freshly minted code. Callers that also archive the
    /// report must reserve the code first (`AuditService::reserve_report_code`)
    /// and use `render_with_code`, or a collision at record time leaves the
    /// PDF pointing at a dead code.
    pub fn render(
        &self,
        verdict: &GeoValidationResult,
        polygon: &ValidatedPolygon,
        property_info: Option<&PropertyInfo>,
        lang: Language,
    ) -> Result<RenderedReport, ApiError> {
        self.render_with_code(verdict, polygon, property_info, lang, generate_report_code())
    }

    pub fn render_with_code(
        &self,
        verdict: &GeoValidationResult,
        polygon: &ValidatedPolygon,
        property_info: Option<&PropertyInfo>,
        lang: Language,
        report_code: String,
    ) -> Result<RenderedReport, ApiError> {
        let labels = Labels::new(lang);
        let issued_at = Utc::now();

        let (doc, page1, layer1) = PdfDocument::new(
            format!("GreenGate {report_code}"),
            mm(PAGE_W),
            mm(PAGE_H),
            "Layer 1",
        );
        let fonts = Fonts {
            bold: doc
                .add_builtin_font(BuiltinFont::HelveticaBold)
                .map_err(|e| ApiError::Internal(format!("pdf font: {e:?}")))?,
            regular: doc
                .add_builtin_font(BuiltinFont::Helvetica)
                .map_err(|e| ApiError::Internal(format!("pdf font: {e:?}")))?,
        };

        let cover = doc.get_page(page1).get_layer(layer1);
        self.draw_cover(&cover, &fonts, &labels, verdict, polygon, property_info, &report_code, issued_at);
        draw_footer(&cover, &fonts, &labels, 1);

        let (page2, layer2) = doc.add_page(mm(PAGE_W), mm(PAGE_H), "Layer 1");
        let criteria = doc.get_page(page2).get_layer(layer2);
        self.draw_criteria(&criteria, &fonts, &labels, verdict, property_info);
        draw_footer(&criteria, &fonts, &labels, 2);

        let (page3, layer3) = doc.add_page(mm(PAGE_W), mm(PAGE_H), "Layer 1");
        let sources = doc.get_page(page3).get_layer(layer3);
        self.draw_sources(&sources, &fonts, &labels, verdict, polygon, &report_code, issued_at)?;
        draw_footer(&sources, &fonts, &labels, 3);

        let mut bytes: Vec<u8> = Vec::new();
        doc.save(&mut BufWriter::new(&mut bytes))
            .map_err(|e| ApiError::Internal(format!("pdf save: {e:?}")))?;
        let content_hash = hash_bytes(&bytes);

        Ok(RenderedReport { bytes, report_code, content_hash })
    }

    /// Download filename: `GreenGate_<safe>_<safe>_<YYYYMMDD_HHMMSS>.pdf`.
    pub fn suggested_filename(
        property_info: Option<&PropertyInfo>,
        issued_at: DateTime<Utc>,
    ) -> String {
        let property = property_info
            .and_then(|i| i.property_name.as_deref())
            .map(sanitize_filename_part)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Propriedade".to_string());
        let plot = property_info
            .and_then(|i| i.plot_name.as_deref())
            .map(sanitize_filename_part)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Talhao".to_string());
        format!(
            "GreenGate_{}_{}_{}.pdf",
            property,
            plot,
            issued_at.with_timezone(&brasilia_offset()).format("%Y%m%d_%H%M%S")
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_cover(
        &self,
        layer: &PdfLayerReference,
        fonts: &Fonts,
        labels: &Labels,
        verdict: &GeoValidationResult,
        polygon: &ValidatedPolygon,
        property_info: Option<&PropertyInfo>,
        report_code: &str,
        issued_at: DateTime<Utc>,
    ) {
        // Header band
        fill_rect(layer, 0.0, PAGE_H - 22.0, PAGE_W, 22.0, Rgb::new(0.04, 0.29, 0.14, None));
        layer.set_fill_color(Color::Rgb(Rgb::new(1.0, 1.0, 1.0, None)));
        layer.use_text(labels.title(), 16.0, mm(MARGIN), mm(PAGE_H - 12.0), &fonts.bold);
        layer.use_text(labels.subtitle(), 9.0, mm(MARGIN), mm(PAGE_H - 18.0), &fonts.regular);

        let brasilia = issued_at.with_timezone(&brasilia_offset());
        layer.set_fill_color(Color::Rgb(Rgb::new(0.25, 0.25, 0.25, None)));
        layer.use_text(
            format!("{}: {}", labels.report_code(), report_code),
            9.0,
            mm(MARGIN),
            mm(PAGE_H - 29.0),
            &fonts.bold,
        );
        layer.use_text(
            format!(
                "{}: {} ({})",
                labels.issued_at(),
                brasilia.format("%d/%m/%Y %H:%M"),
                labels.brasilia_time()
            ),
            9.0,
            mm(110.0),
            mm(PAGE_H - 29.0),
            &fonts.regular,
        );

        // Executive summary card, colored by verdict status
        let card_top = PAGE_H - 36.0;
        let status_color = status_color(verdict.status);
        fill_rect(layer, MARGIN, card_top - 26.0, PAGE_W - 2.0 * MARGIN, 26.0, status_color);
        layer.set_fill_color(Color::Rgb(Rgb::new(1.0, 1.0, 1.0, None)));
        layer.use_text(labels.executive_summary(), 8.0, mm(MARGIN + 4.0), mm(card_top - 6.0), &fonts.regular);
        layer.use_text(
            labels.status_label(verdict.status),
            20.0,
            mm(MARGIN + 4.0),
            mm(card_top - 16.0),
            &fonts.bold,
        );
        layer.use_text(
            format!("{}: {}/100", labels.risk_score(), verdict.risk_score),
            10.0,
            mm(MARGIN + 4.0),
            mm(card_top - 23.0),
            &fonts.regular,
        );

        // Score gauge on the right side of the card.
        let gauge_x = 120.0;
        let gauge_y = card_top - 17.0;
        let gauge_w = 55.0;
        fill_rect(layer, gauge_x, gauge_y, gauge_w, 4.0, Rgb::new(1.0, 1.0, 1.0, None));
        let filled = gauge_w * (verdict.risk_score.clamp(0, 100) as f64 / 100.0);
        if filled > 0.0 {
            fill_rect(layer, gauge_x, gauge_y, filled, 4.0, Rgb::new(0.15, 0.15, 0.15, None));
        }
        layer.set_fill_color(Color::Rgb(Rgb::new(1.0, 1.0, 1.0, None)));
        layer.use_text("0", 6.5, mm(gauge_x), mm(gauge_y - 3.5), &fonts.regular);
        layer.use_text("100", 6.5, mm(gauge_x + gauge_w - 4.0), mm(gauge_y - 3.5), &fonts.regular);

        // Decision synthesis card
        let synth_top = card_top - 32.0;
        let passed = verdict.checks.iter().filter(|c| c.status == CheckStatus::Pass).count();
        let warnings = verdict.checks.iter().filter(|c| c.status == CheckStatus::Warning).count();
        let failed = verdict.checks.iter().filter(|c| c.status == CheckStatus::Fail).count();
        let skipped = verdict.checks.iter().filter(|c| c.status == CheckStatus::Skip).count();

        layer.set_fill_color(Color::Rgb(Rgb::new(0.1, 0.1, 0.1, None)));
        layer.use_text(labels.decision_synthesis(), 10.0, mm(MARGIN), mm(synth_top), &fonts.bold);
        hline(layer, MARGIN, synth_top - 1.5, PAGE_W - MARGIN);
        layer.use_text(
            format!(
                "{} {}  |  {} {}  |  {} {}  |  {} {}",
                passed, labels.checks_passed(),
                warnings, labels.checks_warning(),
                failed, labels.checks_failed(),
                skipped, labels.checks_skipped(),
            ),
            9.0,
            mm(MARGIN),
            mm(synth_top - 7.0),
            &fonts.regular,
        );

        // Interpretation paragraph, dynamic by verdict
        let interp_top = synth_top - 15.0;
        layer.use_text(labels.interpretation_title(), 10.0, mm(MARGIN), mm(interp_top), &fonts.bold);
        hline(layer, MARGIN, interp_top - 1.5, PAGE_W - MARGIN);
        let interpretation = self.interpretation_text(labels, verdict);
        let mut y = interp_top - 7.0;
        for line in wrap_text(&interpretation, 104) {
            layer.use_text(line, 9.0, mm(MARGIN), mm(y), &fonts.regular);
            y -= 4.5;
        }

        // Polygon sketch with overlap outlines
        let sketch_top = y - 4.0;
        layer.use_text(labels.sketch_title(), 10.0, mm(MARGIN), mm(sketch_top), &fonts.bold);
        let box_h = 62.0;
        let box_y = sketch_top - 3.0 - box_h;
        let plot_rings = sketch::rings_from_geojson(polygon.geojson());
        if let Some(sketch_box) = sketch::SketchBox::fit(MARGIN, box_y, 95.0, box_h, &plot_rings) {
            sketch_box.draw_frame(layer);
            for ring in &plot_rings {
                sketch_box.draw_ring(layer, ring, Rgb::new(0.04, 0.29, 0.14, None), 0.9);
            }
            for check in &verdict.checks {
                for geom in &check.intersection_geometries {
                    for ring in sketch::rings_from_geojson(geom) {
                        sketch_box.draw_ring(layer, &ring, Rgb::new(0.8, 0.1, 0.1, None), 0.7);
                    }
                }
            }
        }
        layer.set_fill_color(Color::Rgb(Rgb::new(0.25, 0.25, 0.25, None)));
        layer.use_text(
            format!("—— {}", labels.sketch_legend_plot()),
            7.5,
            mm(MARGIN),
            mm(box_y - 4.5),
            &fonts.regular,
        );
        layer.use_text(
            format!("—— {}", labels.sketch_legend_overlap()),
            7.5,
            mm(MARGIN + 50.0),
            mm(box_y - 4.5),
            &fonts.regular,
        );

        // Metadata block to the right of the sketch
        let meta_x = 118.0;
        let mut meta_y = sketch_top - 6.0;
        layer.set_fill_color(Color::Rgb(Rgb::new(0.1, 0.1, 0.1, None)));
        layer.use_text(labels.metadata_title(), 9.0, mm(meta_x), mm(meta_y + 3.0), &fonts.bold);
        meta_y -= 3.0;
        let not_informed = labels.not_informed().to_string();
        let rows: Vec<(String, String)> = vec![
            (
                labels.property().into(),
                property_info.and_then(|i| i.property_name.clone()).unwrap_or_else(|| not_informed.clone()),
            ),
            (
                labels.plot().into(),
                property_info.and_then(|i| i.plot_name.clone()).unwrap_or_else(|| not_informed.clone()),
            ),
            (
                labels.municipality_state().into(),
                match property_info {
                    Some(i) => match (&i.municipality, &i.state) {
                        (Some(m), Some(s)) => format!("{m}/{s}"),
                        (Some(m), None) => m.clone(),
                        (None, Some(s)) => s.clone(),
                        (None, None) => not_informed.clone(),
                    },
                    None => not_informed.clone(),
                },
            ),
            (
                labels.crop().into(),
                property_info.and_then(|i| i.crop_type.clone()).unwrap_or_else(|| not_informed.clone()),
            ),
            (labels.area().into(), format!("{:.4} ha", polygon.area_ha())),
            (
                labels.centroid().into(),
                polygon.centroid_string().unwrap_or_else(|| not_informed.clone()),
            ),
        ];
        for (label, value) in rows {
            layer.use_text(format!("{label}:"), 8.0, mm(meta_x), mm(meta_y), &fonts.bold);
            layer.use_text(value, 8.0, mm(meta_x + 28.0), mm(meta_y), &fonts.regular);
            meta_y -= 5.0;
        }
    }

    fn interpretation_text(&self, labels: &Labels, verdict: &GeoValidationResult) -> String {
        match verdict.status {
            ComplianceStatus::Approved => labels.interpretation_approved().to_string(),
            ComplianceStatus::Warning => labels.interpretation_warning().to_string(),
            ComplianceStatus::Rejected => {
                let blockers: Vec<&str> = verdict
                    .checks
                    .iter()
                    .filter(|c| c.is_critical())
                    .map(|c| c.check_type.display_name(labels.lang))
                    .collect();
                if blockers.is_empty() {
                    labels.interpretation_rejected_score().to_string()
                } else {
                    format!("{}{}.", labels.interpretation_rejected_prefix(), blockers.join("; "))
                }
            }
        }
    }

    fn draw_criteria(
        &self,
        layer: &PdfLayerReference,
        fonts: &Fonts,
        labels: &Labels,
        verdict: &GeoValidationResult,
        property_info: Option<&PropertyInfo>,
    ) {
        layer.set_fill_color(Color::Rgb(Rgb::new(0.1, 0.1, 0.1, None)));
        layer.use_text(labels.criteria_title(), 13.0, mm(MARGIN), mm(PAGE_H - 20.0), &fonts.bold);

        let header_y = PAGE_H - 30.0;
        layer.use_text(labels.col_criterion(), 8.5, mm(MARGIN), mm(header_y), &fonts.bold);
        layer.use_text(labels.col_result(), 8.5, mm(92.0), mm(header_y), &fonts.bold);
        layer.use_text(labels.col_affected_area(), 8.5, mm(132.0), mm(header_y), &fonts.bold);
        layer.use_text(labels.col_score(), 8.5, mm(178.0), mm(header_y), &fonts.bold);
        hline(layer, MARGIN, header_y - 2.0, PAGE_W - MARGIN);

        let mut y = header_y - 9.0;
        for check in &verdict.checks {
            layer.set_fill_color(Color::Rgb(Rgb::new(0.1, 0.1, 0.1, None)));
            layer.use_text(check.check_type.display_name(labels.lang), 8.5, mm(MARGIN), mm(y), &fonts.regular);
            layer.set_fill_color(Color::Rgb(check_color(check.status)));
            layer.use_text(labels.result_word(check.status), 8.5, mm(92.0), mm(y), &fonts.bold);
            layer.set_fill_color(Color::Rgb(Rgb::new(0.1, 0.1, 0.1, None)));
            layer.use_text(format_area(check.overlap_area_ha), 8.5, mm(132.0), mm(y), &fonts.regular);
            layer.use_text(format!("{}", check.score), 8.5, mm(178.0), mm(y), &fonts.regular);

            layer.set_fill_color(Color::Rgb(Rgb::new(0.35, 0.35, 0.35, None)));
            let mut msg_y = y - 4.0;
            for line in wrap_text(&check.message, 110) {
                layer.use_text(line, 7.5, mm(MARGIN + 3.0), mm(msg_y), &fonts.regular);
                msg_y -= 3.8;
            }

            light_hline(layer, MARGIN, msg_y - 1.0, PAGE_W - MARGIN);
            y = msg_y - 6.0;
        }

        // Optional land-use history table
        if let Some(history) = property_info.and_then(|i| i.land_use_history.as_ref()) {
            if !history.is_empty() {
                y -= 4.0;
                layer.set_fill_color(Color::Rgb(Rgb::new(0.1, 0.1, 0.1, None)));
                layer.use_text(labels.land_use_title(), 11.0, mm(MARGIN), mm(y), &fonts.bold);
                y -= 7.0;
                layer.use_text(labels.col_year(), 8.5, mm(MARGIN), mm(y), &fonts.bold);
                layer.use_text(labels.col_land_use(), 8.5, mm(45.0), mm(y), &fonts.bold);
                hline(layer, MARGIN, y - 2.0, PAGE_W - MARGIN);
                y -= 7.0;
                for (year, land_use) in history {
                    if y < 20.0 {
                        break;
                    }
                    layer.use_text(year.as_str(), 8.5, mm(MARGIN), mm(y), &fonts.regular);
                    layer.use_text(land_use.as_str(), 8.5, mm(45.0), mm(y), &fonts.regular);
                    y -= 5.0;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_sources(
        &self,
        layer: &PdfLayerReference,
        fonts: &Fonts,
        labels: &Labels,
        verdict: &GeoValidationResult,
        polygon: &ValidatedPolygon,
        report_code: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        layer.set_fill_color(Color::Rgb(Rgb::new(0.1, 0.1, 0.1, None)));
        layer.use_text(labels.sources_title(), 13.0, mm(MARGIN), mm(PAGE_H - 20.0), &fonts.bold);

        let header_y = PAGE_H - 30.0;
        layer.use_text(labels.col_layer(), 8.5, mm(MARGIN), mm(header_y), &fonts.bold);
        layer.use_text(labels.col_source(), 8.5, mm(90.0), mm(header_y), &fonts.bold);
        layer.use_text(labels.col_updated(), 8.5, mm(145.0), mm(header_y), &fonts.bold);
        hline(layer, MARGIN, header_y - 2.0, PAGE_W - MARGIN);

        let mut y = header_y - 8.0;
        for check in &verdict.checks {
            let freshness = verdict
                .reference_data_version
                .get(check.check_type.layer_type())
                .and_then(|d| d.get("ingested_at"))
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
                .or(check.last_layer_update);
            let freshness_text = freshness
                .map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_else(|| "-".to_string());

            layer.use_text(check.check_type.display_name(labels.lang), 8.5, mm(MARGIN), mm(y), &fonts.regular);
            layer.use_text(labels.source_org(check.check_type), 8.5, mm(90.0), mm(y), &fonts.regular);
            layer.use_text(freshness_text, 8.5, mm(145.0), mm(y), &fonts.regular);
            y -= 6.0;
        }

        // Scope and limitations
        y -= 6.0;
        layer.use_text(labels.scope_title(), 11.0, mm(MARGIN), mm(y), &fonts.bold);
        hline(layer, MARGIN, y - 1.5, PAGE_W - MARGIN);
        y -= 7.0;
        layer.set_fill_color(Color::Rgb(Rgb::new(0.25, 0.25, 0.25, None)));
        for line in wrap_text(labels.scope_text(), 108) {
            layer.use_text(line, 8.5, mm(MARGIN), mm(y), &fonts.regular);
            y -= 4.2;
        }

        // Authenticity block with QR code
        y -= 8.0;
        layer.set_fill_color(Color::Rgb(Rgb::new(0.1, 0.1, 0.1, None)));
        layer.use_text(labels.authenticity_title(), 11.0, mm(MARGIN), mm(y), &fonts.bold);
        hline(layer, MARGIN, y - 1.5, PAGE_W - MARGIN);
        let verify_url = format!(
            "{}/reports/verify/{}/page",
            self.settings.public_base_url.trim_end_matches('/'),
            report_code
        );
        let qr_size = 30.0;
        let qr_x = PAGE_W - MARGIN - qr_size;
        let qr_y = y - 6.0 - qr_size;
        qr::draw_qr(layer, &verify_url, qr_x, qr_y, qr_size)
            .map_err(|e| ApiError::Internal(format!("qr render: {e:?}")))?;

        let mut auth_y = y - 8.0;
        layer.set_fill_color(Color::Rgb(Rgb::new(0.25, 0.25, 0.25, None)));
        for line in wrap_text(labels.authenticity_text(), 80) {
            layer.use_text(line, 8.5, mm(MARGIN), mm(auth_y), &fonts.regular);
            auth_y -= 4.2;
        }
        auth_y -= 2.0;
        layer.use_text(verify_url.as_str(), 7.5, mm(MARGIN), mm(auth_y), &fonts.bold);

        // Technical metadata
        let mut tech_y = qr_y - 10.0;
        layer.set_fill_color(Color::Rgb(Rgb::new(0.1, 0.1, 0.1, None)));
        layer.use_text(labels.technical_title(), 11.0, mm(MARGIN), mm(tech_y), &fonts.bold);
        hline(layer, MARGIN, tech_y - 1.5, PAGE_W - MARGIN);
        tech_y -= 7.0;
        let brasilia = issued_at.with_timezone(&brasilia_offset());
        let tech_rows: Vec<(String, String)> = vec![
            (labels.geometry_hash().into(), hash_geojson(polygon.geojson())),
            (
                labels.engine_version().into(),
                format!("{} {}", self.settings.app_name, self.settings.app_version),
            ),
            (labels.ruleset_version().into(), self.settings.ruleset_version.clone()),
            (labels.processing_time().into(), format!("{} ms", verdict.processing_time_ms)),
            (
                labels.brasilia_time().into(),
                brasilia.format("%d/%m/%Y %H:%M:%S %z").to_string(),
            ),
        ];
        layer.set_fill_color(Color::Rgb(Rgb::new(0.25, 0.25, 0.25, None)));
        for (label, value) in tech_rows {
            layer.use_text(format!("{label}:"), 8.0, mm(MARGIN), mm(tech_y), &fonts.bold);
            layer.use_text(value, 7.5, mm(MARGIN + 58.0), mm(tech_y), &fonts.regular);
            tech_y -= 5.0;
        }

        Ok(())
    }
}

fn brasilia_offset() -> FixedOffset {
    // UTC-3, no daylight saving since 2019.
    FixedOffset::west_opt(3 * 3600).unwrap()
}

fn status_color(status: ComplianceStatus) -> Rgb {
    match status {
        ComplianceStatus::Approved => Rgb::new(0.13, 0.50, 0.21, None),
        ComplianceStatus::Warning => Rgb::new(0.80, 0.56, 0.05, None),
        ComplianceStatus::Rejected => Rgb::new(0.72, 0.12, 0.12, None),
    }
}

fn check_color(status: CheckStatus) -> Rgb {
    match status {
        CheckStatus::Pass => Rgb::new(0.13, 0.50, 0.21, None),
        CheckStatus::Warning => Rgb::new(0.80, 0.56, 0.05, None),
        CheckStatus::Fail => Rgb::new(0.72, 0.12, 0.12, None),
        CheckStatus::Skip => Rgb::new(0.45, 0.45, 0.45, None),
    }
}

/// Affected-area column: sub-hectare overlaps are shown in m² with the
/// hectare equivalent alongside.
fn format_area(overlap_ha: f64) -> String {
    if overlap_ha <= 0.0 {
        "-".to_string()
    } else if overlap_ha < 1.0 {
        format!("{:.0} m² ({:.4} ha)", overlap_ha * 10_000.0, overlap_ha)
    } else {
        format!("{overlap_ha:.2} ha")
    }
}

/// Greedy word wrap by character budget. Helvetica at the sizes used here
/// keeps ~104 chars inside the text column.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn fill_rect(layer: &PdfLayerReference, x: f64, y: f64, w: f64, h: f64, color: Rgb) {
    layer.set_fill_color(Color::Rgb(color));
    layer.add_polygon(Polygon {
        rings: vec![vec![
            (Point::new(mm(x), mm(y)), false),
            (Point::new(mm(x + w), mm(y)), false),
            (Point::new(mm(x + w), mm(y + h)), false),
            (Point::new(mm(x), mm(y + h)), false),
        ]],
        mode: PolygonMode::Fill,
        ..Default::default()
    });
}

fn hline(layer: &PdfLayerReference, x1: f64, y: f64, x2: f64) {
    layer.set_outline_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
    layer.set_outline_thickness(0.5);
    layer.add_line(Line {
        points: vec![
            (Point::new(mm(x1), mm(y)), false),
            (Point::new(mm(x2), mm(y)), false),
        ],
        is_closed: false,
    });
}

fn light_hline(layer: &PdfLayerReference, x1: f64, y: f64, x2: f64) {
    layer.set_outline_color(Color::Rgb(Rgb::new(0.8, 0.8, 0.8, None)));
    layer.set_outline_thickness(0.3);
    layer.add_line(Line {
        points: vec![
            (Point::new(mm(x1), mm(y)), false),
            (Point::new(mm(x2), mm(y)), false),
        ],
        is_closed: false,
    });
}

fn draw_footer(layer: &PdfLayerReference, fonts: &Fonts, labels: &Labels, page: usize) {
    layer.set_fill_color(Color::Rgb(Rgb::new(0.5, 0.5, 0.5, None)));
    layer.use_text(labels.page_footer(), 7.5, mm(MARGIN), mm(9.0), &fonts.regular);
    layer.use_text(format!("{page}/3"), 7.5, mm(PAGE_W - MARGIN - 8.0), mm(9.0), &fonts.regular);
}

fn sanitize_filename_part(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .chars()
        .take(40)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance_models::{GeoCheckResult, GeoJsonGeometry};

    fn polygon() -> ValidatedPolygon {
        let geom: GeoJsonGeometry = serde_json::from_value(serde_json::json!({
            "type": "Polygon",
            "coordinates": [[
                [-46.50, -23.50], [-46.50, -23.51], [-46.49, -23.51],
                [-46.49, -23.50], [-46.50, -23.50]
            ]]
        }))
        .unwrap();
        ValidatedPolygon::from_geojson(&geom, &Settings::from_env()).unwrap()
    }

    fn verdict(status: ComplianceStatus, checks: Vec<GeoCheckResult>) -> GeoValidationResult {
        GeoValidationResult {
            plot_id: None,
            status,
            risk_score: 100,
            checks,
            validated_at: Utc::now(),
            reference_data_version: serde_json::json!({}),
            processing_time_ms: 42,
        }
    }

    fn pass_check(ct: crate::compliance_models::CheckType) -> GeoCheckResult {
        GeoCheckResult {
            check_type: ct,
            status: CheckStatus::Pass,
            score: 100,
            message: "Nenhuma sobreposição detectada".into(),
            overlap_area_ha: 0.0,
            overlap_percentage: 0.0,
            overlapping_features: Vec::new(),
            intersection_geometries: Vec::new(),
            last_layer_update: None,
            details: serde_json::Value::Null,
        }
    }

    #[test]
    fn renders_a_parsable_three_page_pdf() {
        let settings = Settings::from_env();
        let generator = DueDiligenceReportGenerator::new(&settings);
        let checks: Vec<_> = crate::compliance_models::CheckType::ALL
            .iter()
            .map(|&ct| pass_check(ct))
            .collect();
        let report = generator
            .render(&verdict(ComplianceStatus::Approved, checks), &polygon(), None, Language::Pt)
            .unwrap();

        assert!(report.bytes.starts_with(b"%PDF"));
        assert!(report.bytes.len() > 2_000);
        assert_eq!(report.content_hash, hash_bytes(&report.bytes));
        assert!(report.report_code.starts_with("GG-"));
    }

    #[test]
    fn render_with_code_uses_the_reserved_code() {
        let settings = Settings::from_env();
        let generator = DueDiligenceReportGenerator::new(&settings);
        let checks: Vec<_> = crate::compliance_models::CheckType::ALL
            .iter()
            .map(|&ct| pass_check(ct))
            .collect();
        let report = generator
            .render_with_code(
                &verdict(ComplianceStatus::Approved, checks),
                &polygon(),
                None,
                Language::Pt,
                "GG-20250101120000-A1B2".to_string(),
            )
            .unwrap();
        assert_eq!(report.report_code, "GG-20250101120000-A1B2");
        assert!(report.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn rejected_report_renders_in_english_too() {
        let settings = Settings::from_env();
        let generator = DueDiligenceReportGenerator::new(&settings);
        let mut checks: Vec<_> = crate::compliance_models::CheckType::ALL
            .iter()
            .map(|&ct| pass_check(ct))
            .collect();
        checks[0].status = CheckStatus::Fail;
        checks[0].score = 0;
        checks[0].overlap_area_ha = 0.0523;
        let report = generator
            .render(&verdict(ComplianceStatus::Rejected, checks), &polygon(), None, Language::En)
            .unwrap();
        assert!(report.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn interpretation_enumerates_blocking_layers() {
        let settings = Settings::from_env();
        let generator = DueDiligenceReportGenerator::new(&settings);
        let labels = Labels::new(Language::En);
        let mut checks: Vec<_> = crate::compliance_models::CheckType::ALL
            .iter()
            .map(|&ct| pass_check(ct))
            .collect();
        checks[2].status = CheckStatus::Fail;
        checks[2].score = 0;
        let text = generator.interpretation_text(&labels, &verdict(ComplianceStatus::Rejected, checks));
        assert!(text.contains("NOT SUITABLE"));
        assert!(text.contains("Indigenous Territories"));
    }

    #[test]
    fn sub_hectare_overlaps_render_in_square_meters() {
        assert_eq!(format_area(0.0), "-");
        assert_eq!(format_area(0.0523), "523 m² (0.0523 ha)");
        assert_eq!(format_area(2.5), "2.50 ha");
    }

    #[test]
    fn wrap_text_respects_budget() {
        let lines = wrap_text("um dois tres quatro cinco seis", 11);
        assert_eq!(lines, vec!["um dois", "tres quatro", "cinco seis"]);
        assert!(wrap_text("", 10).is_empty());
    }

    #[test]
    fn filename_is_sanitized_and_stamped() {
        let info = PropertyInfo {
            property_name: Some("Fazenda São João".into()),
            plot_name: Some("Talhão 7/A".into()),
            ..Default::default()
        };
        let name = DueDiligenceReportGenerator::suggested_filename(Some(&info), Utc::now());
        assert!(name.starts_with("GreenGate_Fazenda_S_o_Jo_o_Talh_o_7_A_"));
        assert!(name.ends_with(".pdf"));
        let default = DueDiligenceReportGenerator::suggested_filename(None, Utc::now());
        assert!(default.starts_with("GreenGate_Propriedade_Talhao_"));
    }
}
