use actix_web::{test, web, App};
use greengate::routes::{validations, verify};
use greengate::security::{ApiKeyAdmission, ApiKeyService};
use greengate::{health, AppState, Settings};

// Helper to create test AppState with database
async fn create_test_state() -> AppState {
    let mut settings = Settings::from_env();
    if let Ok(url) = std::env::var("TEST_DATABASE_URL") {
        settings.database_url = url;
    }
    AppState::new(settings)
        .await
        .expect("Failed to create test AppState. Make sure PostgreSQL/PostGIS is running and TEST_DATABASE_URL is set.")
}

fn clean_polygon() -> serde_json::Value {
    serde_json::json!({
        "type": "Polygon",
        "coordinates": [[
            [-46.50, -23.50], [-46.50, -23.51], [-46.49, -23.51],
            [-46.49, -23.50], [-46.50, -23.50]
        ]]
    })
}

fn prodes_polygon() -> serde_json::Value {
    // Overlaps the PRODES fixture seeded in the test database.
    serde_json::json!({
        "type": "Polygon",
        "coordinates": [[
            [-47.285, -22.745], [-47.285, -22.755], [-47.275, -22.755],
            [-47.275, -22.745], [-47.285, -22.745]
        ]]
    })
}

#[actix_web::test]
async fn test_health_endpoint() {
    let app = test::init_service(App::new().route("/health", web::get().to(health))).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "greengate");
}

#[actix_web::test]
#[ignore = "requires PostGIS test database"]
async fn test_quick_validation_clean_area_approved() {
    let app_state = web::Data::new(create_test_state().await);
    let app = test::init_service(
        App::new().app_data(app_state.clone()).service(
            web::scope("/api/v1").service(
                web::resource("/validations/quick")
                    .route(web::post().to(validations::quick_validate)),
            ),
        ),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/validations/quick")
        .set_json(clean_polygon())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "approved");
    assert!(body["risk_score"].as_i64().unwrap() >= 70);

    // All six check kinds must be present.
    let kinds: Vec<&str> = body["checks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["check_type"].as_str().unwrap())
        .collect();
    for expected in [
        "deforestation_prodes",
        "deforestation_mapbiomas",
        "terra_indigena",
        "embargo_ibama",
        "quilombola",
        "uc",
    ] {
        assert!(kinds.contains(&expected), "missing check '{expected}'");
    }
}

#[actix_web::test]
#[ignore = "requires PostGIS test database"]
async fn test_quick_validation_prodes_overlap_rejected() {
    let app_state = web::Data::new(create_test_state().await);
    let app = test::init_service(
        App::new().app_data(app_state.clone()).service(
            web::scope("/api/v1").service(
                web::resource("/validations/quick")
                    .route(web::post().to(validations::quick_validate)),
            ),
        ),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/validations/quick")
        .set_json(prodes_polygon())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["risk_score"], 0);

    let prodes = body["checks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["check_type"] == "deforestation_prodes")
        .expect("prodes check present");
    assert_eq!(prodes["status"], "fail");
    assert!(prodes["overlap_area_ha"].as_f64().unwrap() > 0.0);
}

#[actix_web::test]
#[ignore = "requires PostGIS test database"]
async fn test_invalid_geometries_rejected_before_store_access() {
    let app_state = web::Data::new(create_test_state().await);
    let app = test::init_service(
        App::new().app_data(app_state.clone()).service(
            web::scope("/api/v1").service(
                web::resource("/validations/quick")
                    .route(web::post().to(validations::quick_validate)),
            ),
        ),
    )
    .await;

    // Not closed
    let open_ring = serde_json::json!({
        "type": "Polygon",
        "coordinates": [[[-46.5, -23.5], [-46.5, -23.51], [-46.49, -23.51], [-46.49, -23.5]]]
    });
    // Too few vertices
    let triangle = serde_json::json!({
        "type": "Polygon",
        "coordinates": [[[-46.5, -23.5], [-46.49, -23.51], [-46.5, -23.5]]]
    });
    // Outside Brazil
    let paris = serde_json::json!({
        "type": "Polygon",
        "coordinates": [[[2.29, 48.85], [2.29, 48.86], [2.30, 48.86], [2.30, 48.85], [2.29, 48.85]]]
    });

    for bad in [open_ring, triangle, paris] {
        let req = test::TestRequest::post()
            .uri("/api/v1/validations/quick")
            .set_json(bad)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
    }
}

#[actix_web::test]
#[ignore = "requires PostGIS test database"]
async fn test_quota_exhaustion_returns_429_with_headers() {
    let state = create_test_state().await;
    let service = ApiKeyService::new(state.db_pool.clone());
    let created = service
        .create_api_key("Quota Test", "free", None, None, None, None, Some("test"))
        .await
        .unwrap();

    let app_state = web::Data::new(state);
    let app = test::init_service(
        App::new()
            .app_data(app_state.clone())
            .wrap(ApiKeyAdmission)
            .service(
                web::scope("/api/v1").service(
                    web::resource("/validations/validate")
                        .route(web::post().to(validations::validate)),
                ),
            ),
    )
    .await;

    // Free plan: 3 admissions pass, the 4th is 429.
    for i in 1..=3 {
        let req = test::TestRequest::post()
            .uri("/api/v1/validations/validate")
            .insert_header(("x-api-key", created.api_key.clone()))
            .set_json(clean_polygon())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success(), "request {i} should be admitted");
        let remaining = resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap();
        assert_eq!(remaining, 3 - i);
    }

    let req = test::TestRequest::post()
        .uri("/api/v1/validations/validate")
        .insert_header(("x-api-key", created.api_key.clone()))
        .set_json(clean_polygon())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 429);
    assert_eq!(
        resp.headers().get("x-ratelimit-remaining").and_then(|v| v.to_str().ok()),
        Some("0")
    );
}

#[actix_web::test]
#[ignore = "requires PostGIS test database"]
async fn test_concurrent_admission_never_double_spends() {
    let state = create_test_state().await;
    let service = std::sync::Arc::new(ApiKeyService::new(state.db_pool.clone()));
    let created = service
        .create_api_key("Concurrency Test", "free", None, None, None, None, Some("test"))
        .await
        .unwrap();

    // Consume 2 of 3.
    service.admit(&created.api_key).await.unwrap();
    service.admit(&created.api_key).await.unwrap();

    // Two simultaneous admissions race for the last unit: exactly one wins.
    let (a, b) = tokio::join!(service.admit(&created.api_key), service.admit(&created.api_key));
    assert_ne!(a.is_ok(), b.is_ok(), "exactly one concurrent admission must succeed");

    let key = service.get_api_key(created.id).await.unwrap().unwrap();
    assert_eq!(key.requests_this_month, 3);
    assert_eq!(key.monthly_quota, Some(3));
}

#[actix_web::test]
#[ignore = "requires PostGIS test database"]
async fn test_report_authenticity_round_trip() {
    use greengate::routes::reports;

    let state = create_test_state().await;
    let service = ApiKeyService::new(state.db_pool.clone());
    let created = service
        .create_api_key("Report Test", "enterprise", None, None, None, None, Some("test"))
        .await
        .unwrap();

    let app_state = web::Data::new(state);
    let app = test::init_service(
        App::new().app_data(app_state.clone()).service(
            web::scope("/api/v1")
                .service(
                    web::resource("/reports/due-diligence/quick")
                        .route(web::post().to(reports::due_diligence_quick)),
                )
                .service(
                    web::resource("/reports/verify/{code}")
                        .route(web::get().to(verify::verify_report_code)),
                )
                .service(
                    web::resource("/reports/verify/{code}/geometry")
                        .route(web::post().to(verify::verify_report_geometry)),
                ),
        ),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/reports/due-diligence/quick")
        .insert_header(("x-api-key", created.api_key.clone()))
        .set_json(serde_json::json!({
            "geometry": clean_polygon(),
            "property_info": { "property_name": "Fazenda Teste", "plot_name": "Talhao 1", "state": "SP" },
            "lang": "pt"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let report_code = resp
        .headers()
        .get("x-report-code")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    let body = test::read_body(resp).await;
    assert!(body.starts_with(b"%PDF"));

    // Public JSON verification
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/reports/verify/{report_code}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["valid"], true);

    // Geometry re-verification: original matches, mutated does not.
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/verify/{report_code}/geometry"))
        .set_json(clean_polygon())
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["valid"], true);

    let mut mutated = clean_polygon();
    mutated["coordinates"][0][0][0] = serde_json::json!(-46.500001);
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/verify/{report_code}/geometry"))
        .set_json(mutated)
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "Geometria não corresponde ao laudo");
}

#[actix_web::test]
#[ignore = "requires PostGIS test database"]
async fn test_unknown_report_code_renders_not_found_page() {
    let app_state = web::Data::new(create_test_state().await);
    let app = test::init_service(
        App::new().app_data(app_state.clone()).service(
            web::scope("/api/v1").service(
                web::resource("/reports/verify/{code}/page")
                    .route(web::get().to(verify::verify_report_page)),
            ),
        ),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/reports/verify/GG-00000000000000-ZZZZ/page")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
    let content_type = resp.headers().get("content-type").and_then(|v| v.to_str().ok()).unwrap();
    assert!(content_type.starts_with("text/html"));
}
