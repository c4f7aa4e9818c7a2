use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;

use crate::api_state::AppState;
use crate::compliance_models::ValidationRequestBody;
use crate::routes::validations::run_validation;
use crate::security::error::ApiError;
use crate::services::audit_service::{AuditService, RequesterInfo};
use crate::services::report::DueDiligenceReportGenerator;

/// Validates a polygon, renders the due-diligence PDF and archives the
/// audit record, all in one billed request.
///
/// The report code is reserved against the audit store before rendering,
/// so the code baked into the PDF cover and its QR is exactly the one the
/// record is stored under; the recorder stores it together with the
/// geometry hash, the PDF hash and the dataset-version snapshot, binding
/// the document to the verdict.
#[utoipa::path(
    post,
    path = "/api/v1/reports/due-diligence/quick",
    request_body = ValidationRequestBody,
    security(("api_key" = [])),
    responses(
        (status = 200, description = "PDF report", content_type = "application/pdf"),
        (status = 400, description = "Invalid geometry"),
        (status = 401, description = "Invalid API key"),
        (status = 429, description = "Quota or rate limit exceeded")
    )
)]
pub async fn due_diligence_quick(
    req: HttpRequest,
    body: web::Json<ValidationRequestBody>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let (geometry, property_info, lang) = body.into_inner().into_parts();

    let (verdict, polygon) = run_validation(&state, &geometry, None).await?;

    let audit = AuditService::new(state.db_pool.clone());
    let report_code = audit.reserve_report_code().await?;

    let generator = DueDiligenceReportGenerator::new(&state.settings);
    let report =
        generator.render_with_code(&verdict, &polygon, property_info.as_ref(), lang, report_code)?;

    let requester = RequesterInfo {
        request_ip: req
            .connection_info()
            .realip_remote_addr()
            .map(|ip| ip.to_string()),
        api_key: req
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
        user_agent: req
            .headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
    };

    let record = audit
        .record_validation_report(
            &state.settings,
            &verdict,
            &polygon,
            Some(&report.bytes),
            property_info.as_ref(),
            &requester,
            Some(report.report_code.clone()),
            Some(report.content_hash.clone()),
        )
        .await?;

    let filename =
        DueDiligenceReportGenerator::suggested_filename(property_info.as_ref(), Utc::now());
    let truncated_hash = &report.content_hash[..report.content_hash.len().min(16)];

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header(("Content-Disposition", format!("attachment; filename={filename}")))
        .insert_header(("X-Report-Code", record.report_code))
        .insert_header(("X-Content-Hash", truncated_hash.to_string()))
        .body(report.bytes))
}
