use actix_web::{web, HttpResponse};

use crate::api_state::AppState;
use crate::compliance_models::VerificationResponse;
use crate::security::error::ApiError;
use crate::services::audit_service::AuditService;

/// Public authenticity JSON for a report code.
#[utoipa::path(
    get,
    path = "/api/v1/reports/verify/{code}",
    responses(
        (status = 200, description = "Report summary", body = VerificationResponse),
        (status = 404, description = "Unknown report code")
    )
)]
pub async fn verify_report_code(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let code = path.into_inner();
    let audit = AuditService::new(state.db_pool.clone());

    match audit.verify_code(&code).await? {
        Some(response) => Ok(HttpResponse::Ok().json(response)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "valid": false,
            "error": "Laudo não encontrado",
            "report_code": code,
        }))),
    }
}

/// Re-verifies a report against a submitted geometry. The body is either a
/// bare GeoJSON geometry or an envelope with a `geometry` field; the
/// canonical hash must match the archived one exactly.
#[utoipa::path(
    post,
    path = "/api/v1/reports/verify/{code}/geometry",
    responses(
        (status = 200, description = "Verification outcome", body = VerificationResponse)
    )
)]
pub async fn verify_report_geometry(
    path: web::Path<String>,
    body: web::Json<serde_json::Value>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let code = path.into_inner();
    let payload = body.into_inner();
    let geometry = payload.get("geometry").cloned().unwrap_or(payload);

    let audit = AuditService::new(state.db_pool.clone());
    let response = audit.verify_report(&code, &geometry).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Public authenticity page. Unknown codes render an HTML not-found body
/// rather than a raw error.
#[utoipa::path(
    get,
    path = "/api/v1/reports/verify/{code}/page",
    responses(
        (status = 200, description = "Authenticity page", content_type = "text/html"),
        (status = 404, description = "Not-found page", content_type = "text/html")
    )
)]
pub async fn verify_report_page(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let code = path.into_inner();
    let audit = AuditService::new(state.db_pool.clone());

    match audit.verify_code(&code).await? {
        Some(summary) => Ok(HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(render_page(&summary))),
        None => Ok(HttpResponse::NotFound()
            .content_type("text/html; charset=utf-8")
            .body(render_not_found(&code))),
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn status_style(status: Option<&str>) -> (&'static str, &'static str) {
    match status {
        Some("approved") => ("#1f7a34", "APTO"),
        Some("warning") => ("#c9910d", "APTO COM RESSALVAS"),
        Some("rejected") => ("#b81f1f", "NÃO APTO"),
        _ => ("#666666", "DESCONHECIDO"),
    }
}

fn render_page(summary: &VerificationResponse) -> String {
    let (color, status_text) = status_style(summary.status.as_deref());
    let code = summary.report_code.as_deref().unwrap_or("-");
    let score = summary
        .risk_score
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let created = summary
        .created_at
        .map(|d| d.format("%d/%m/%Y %H:%M UTC").to_string())
        .unwrap_or_else(|| "-".to_string());
    let expires = summary
        .expires_at
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "-".to_string());
    let validity = if summary.valid {
        r#"<p class="ok">Laudo autêntico e dentro da validade.</p>"#
    } else {
        r#"<p class="bad">Laudo expirado ou inválido.</p>"#
    };

    let detail_row = |label: &str, value: &str| {
        format!("<tr><th>{}</th><td>{}</td></tr>", escape_html(label), escape_html(value))
    };
    let mut rows = String::new();
    rows.push_str(&detail_row("Código", code));
    rows.push_str(&detail_row("Índice de conformidade", &score));
    rows.push_str(&detail_row("Emitido em", &created));
    rows.push_str(&detail_row("Válido até", &expires));
    if let Some(property) = &summary.property_name {
        rows.push_str(&detail_row("Propriedade", property));
    }
    if let Some(plot) = &summary.plot_name {
        rows.push_str(&detail_row("Talhão", plot));
    }
    if let Some(state) = &summary.state {
        rows.push_str(&detail_row("UF", state));
    }
    if let Some(hash) = &summary.geometry_hash {
        rows.push_str(&detail_row("Hash da geometria", hash));
    }
    if let Some(hash) = &summary.pdf_hash {
        rows.push_str(&detail_row("Hash do PDF", hash));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>GreenGate - Verificação de Laudo {code}</title>
<style>
body {{ font-family: Helvetica, Arial, sans-serif; background: #f4f6f4; margin: 0; padding: 2rem; }}
.card {{ max-width: 640px; margin: 0 auto; background: #fff; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,.08); overflow: hidden; }}
.banner {{ background: {color}; color: #fff; padding: 1.2rem 1.5rem; }}
.banner h1 {{ margin: 0; font-size: 1.1rem; font-weight: normal; }}
.banner .status {{ font-size: 1.8rem; font-weight: bold; margin-top: .3rem; }}
.content {{ padding: 1.5rem; }}
table {{ width: 100%; border-collapse: collapse; }}
th {{ text-align: left; padding: .4rem .6rem .4rem 0; color: #555; font-weight: 600; width: 40%; }}
td {{ padding: .4rem 0; color: #222; }}
tr + tr {{ border-top: 1px solid #eee; }}
.ok {{ color: #1f7a34; font-weight: bold; }}
.bad {{ color: #b81f1f; font-weight: bold; }}
footer {{ text-align: center; color: #888; font-size: .8rem; margin-top: 1.5rem; }}
</style>
</head>
<body>
<div class="card">
  <div class="banner">
    <h1>GreenGate - Verificação de Autenticidade</h1>
    <div class="status">{status_text}</div>
  </div>
  <div class="content">
    {validity}
    <table>{rows}</table>
  </div>
</div>
<footer>GreenGate Geo-Compliance - verificação pública de laudos</footer>
</body>
</html>"#,
        code = escape_html(code),
        color = color,
        status_text = status_text,
        validity = validity,
        rows = rows,
    )
}

fn render_not_found(code: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
<meta charset="utf-8">
<title>GreenGate - Laudo não encontrado</title>
<style>
body {{ font-family: Helvetica, Arial, sans-serif; background: #f4f6f4; padding: 3rem; text-align: center; }}
.card {{ max-width: 480px; margin: 0 auto; background: #fff; border-radius: 8px; padding: 2rem; box-shadow: 0 2px 8px rgba(0,0,0,.08); }}
h1 {{ color: #b81f1f; font-size: 1.3rem; }}
code {{ background: #f0f0f0; padding: .2rem .4rem; border-radius: 4px; }}
</style>
</head>
<body>
<div class="card">
  <h1>Laudo não encontrado</h1>
  <p>Nenhum laudo foi localizado com o código <code>{}</code>.</p>
  <p>Confira o código impresso no documento ou leia novamente o QR Code.</p>
</div>
</body>
</html>"#,
        escape_html(code)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escaping_neutralizes_markup() {
        assert_eq!(escape_html("<script>&\"x\""), "&lt;script&gt;&amp;&quot;x&quot;");
    }

    #[test]
    fn page_reflects_status_styling() {
        let summary = VerificationResponse {
            valid: true,
            error: None,
            report_code: Some("GG-20250101120000-A1B2".into()),
            status: Some("approved".into()),
            risk_score: Some(92),
            created_at: None,
            expires_at: None,
            is_expired: Some(false),
            plot_name: None,
            property_name: Some("Fazenda <Teste>".into()),
            state: None,
            geometry_hash: Some("abcd1234...".into()),
            pdf_hash: None,
        };
        let html = render_page(&summary);
        assert!(html.contains("APTO"));
        assert!(html.contains("#1f7a34"));
        assert!(html.contains("Fazenda &lt;Teste&gt;"));
        assert!(!html.contains("Fazenda <Teste>"));
    }

    #[test]
    fn not_found_page_names_the_code() {
        let html = render_not_found("GG-123");
        assert!(html.contains("GG-123"));
        assert!(html.contains("não encontrado"));
    }
}
