// End-to-end handler tests against a fresh in-memory database per test.
// Each test boots the full API router with the seeded 55-device inventory;
// the AI endpoint points at an unreachable address, so AI-backed paths
// exercise the degraded fallbacks.

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use serde_json::{json, Value};
use std::time::Duration;

use crate::api::create_api_router;
use crate::config::Config;
use crate::state::AppState;

async fn test_state() -> AppState {
    AppState::new(Config::for_tests())
        .await
        .expect("failed to build test state")
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .service(create_api_router()),
        )
        .await
    };
}

#[actix_web::test]
async fn device_inventory_is_seeded_and_paginated() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::get().uri("/api/devices").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalItems"], 55);
    assert_eq!(body["totalPages"], 6);
    assert_eq!(body["itemsPerPage"], 10);
    assert_eq!(body["currentPage"], 1);
    assert_eq!(body["data"].as_array().unwrap().len(), 10);

    // Last page carries the remainder.
    let req = test::TestRequest::get()
        .uri("/api/devices?page=6")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 5);

    // Pages beyond the data are empty, not an error.
    let req = test::TestRequest::get()
        .uri("/api/devices?page=7")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    assert_eq!(body["currentPage"], 7);
}

#[actix_web::test]
async fn device_list_filters_by_active_flag() {
    let state = test_state().await;
    let app = test_app!(state);

    // Every sixth seeded device is inactive: 10 of 55.
    let req = test::TestRequest::get()
        .uri("/api/devices?isActive=false&limit=100")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalItems"], 10);
    for device in body["data"].as_array().unwrap() {
        assert_eq!(device["isActive"], false);
    }

    let req = test::TestRequest::get()
        .uri("/api/devices?isActive=maybe")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn device_update_round_trips() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::put()
        .uri("/api/devices/device-fw-2")
        .set_json(json!({ "isActive": false, "location": "DR Site" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/devices/device-fw-2")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["isActive"], false);
    assert_eq!(body["location"], "DR Site");
    // Untouched fields survive the partial update.
    assert_eq!(body["id"], "device-fw-2");
    assert!(body["name"].as_str().unwrap().len() > 0);
}

#[actix_web::test]
async fn device_creation_validates_required_fields() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/devices")
        .set_json(json!({ "name": "", "brand": "Cisco", "model": "ASA", "ipAddress": "10.0.0.9" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/devices")
        .set_json(json!({
            "name": "edge-fw-99",
            "brand": "Cisco",
            "model": "ASA 5506-X",
            "ipAddress": "10.0.0.9"
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let id = body["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("device-"));

    let req = test::TestRequest::get()
        .uri(&format!("/api/devices/{}", id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["name"], "edge-fw-99");
}

/// Poll a scan until it settles in a terminal status.
async fn poll_scan<S>(app: &S, scan_id: &str) -> Value
where
    S: actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
    >,
{
    for _ in 0..200 {
        let req = test::TestRequest::get()
            .uri(&format!("/api/scans/{}", scan_id))
            .to_request();
        let body: Value = test::call_and_read_body_json(app, req).await;
        if matches!(
            body["status"].as_str(),
            Some("completed") | Some("failed") | Some("cancelled")
        ) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("scan {} never reached a terminal status", scan_id);
}

#[actix_web::test]
async fn full_scan_completes_without_ai_analysis() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/scans")
        .set_json(json!({ "deviceId": "device-fw-2", "scanType": "full" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "pending");
    let scan_id = body["id"].as_str().unwrap().to_string();

    let scan = poll_scan(&app, &scan_id).await;
    assert_eq!(scan["status"], "completed");
    assert!(scan["startedAt"].is_string());
    assert!(scan["completedAt"].is_string());
    assert!(scan["summary"].as_str().unwrap().contains("open"));
    // Plain scans carry no AI analysis payload.
    assert!(scan.get("aiAnalysis").is_none());

    // vulnerabilitiesFound counts open results only.
    let open = scan["results"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r["status"] == "open")
        .count() as i64;
    assert_eq!(scan["vulnerabilitiesFound"].as_i64().unwrap(), open);
}

#[actix_web::test]
async fn ai_scan_falls_back_when_provider_is_unreachable() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/scans")
        .set_json(json!({ "deviceId": "device-fw-3", "scanType": "ai" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let scan_id = body["id"].as_str().unwrap().to_string();

    // The provider endpoint is unreachable, so the scan must still complete
    // with the fallback summary and enhancement.
    let scan = poll_scan(&app, &scan_id).await;
    assert_eq!(scan["status"], "completed");
    assert!(!scan["summary"].as_str().unwrap().is_empty());
    let analysis = &scan["aiAnalysis"];
    assert!(analysis.is_object());
    assert!(analysis["executiveSummary"].is_string());
    assert!(analysis["confidenceScore"].as_f64().unwrap() <= 0.2);
}

#[actix_web::test]
async fn scan_trigger_rejects_bad_input() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/scans")
        .set_json(json!({ "deviceId": "device-fw-2", "scanType": "quantum" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/scans")
        .set_json(json!({ "deviceId": "device-fw-999", "scanType": "full" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn completed_scan_produces_notifications() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/scans")
        .set_json(json!({ "deviceId": "device-fw-4", "scanType": "local" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let scan_id = body["id"].as_str().unwrap().to_string();
    poll_scan(&app, &scan_id).await;

    let req = test::TestRequest::get().uri("/api/notifications").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["totalItems"].as_i64().unwrap() >= 1);
    assert!(body["unreadCount"].as_i64().unwrap() >= 1);
    let first = &body["data"][0];
    assert!(first["type"].is_string());
    assert_eq!(first["isRead"], false);

    let req = test::TestRequest::post()
        .uri("/api/notifications/read-all")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/api/notifications").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["unreadCount"], 0);
}

#[actix_web::test]
async fn custom_report_fails_on_inverted_date_range() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/reports/custom")
        .set_json(json!({
            "report_type": "vulnerability_summary",
            "filters": { "date_range": { "start": "2026-02-01", "end": "2026-01-01" } },
            "format": "pdf"
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "failed");
    assert!(body.get("data").is_none());
}

#[actix_web::test]
async fn custom_report_returns_download_link() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/reports/custom")
        .set_json(json!({
            "report_type": "vulnerability_summary",
            "filters": {
                "severity_levels": ["critical", "high"],
                "date_range": { "start": "2026-01-01", "end": "2026-01-31" }
            },
            "include_trends": true,
            "format": "csv"
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "completed");
    assert!(body["report_id"].as_str().unwrap().starts_with("report-"));
    let link = body["data"]["downloadLink"].as_str().unwrap();
    assert!(link.ends_with(".csv"));
    assert_eq!(body["data"]["trendsIncluded"], true);
    assert!(body["data"]["trendSummary"].is_string());

    // An unsupported format is rejected up front.
    let req = test::TestRequest::post()
        .uri("/api/reports/custom")
        .set_json(json!({ "report_type": "vulnerability_summary", "format": "docx" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn scan_report_requires_a_completed_scan() {
    let state = test_state().await;
    let app = test_app!(state);

    // A scan inserted without a running lifecycle stays pending.
    let device = crate::api::devices::fetch_device(&state.db, "device-fw-5")
        .await
        .unwrap()
        .unwrap();
    let pending =
        crate::api::scans::insert_pending_scan(&state.db, &device, vulnwatch_core::ScanType::Full)
            .await
            .unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/reports/scan/{}", pending.id))
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri("/api/reports/scan/scan-missing")
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn profile_updates_validate_email() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::get().uri("/api/profile").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["id"], "user-1");
    assert_eq!(body["email"], "admin@example.com");

    let req = test::TestRequest::put()
        .uri("/api/profile")
        .set_json(json!({ "email": "not-an-email" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::put()
        .uri("/api/profile")
        .set_json(json!({ "name": "Jordan Ops", "email": "jordan@example.com" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["name"], "Jordan Ops");
    assert_eq!(body["email"], "jordan@example.com");
}

#[actix_web::test]
async fn schedule_crud_recomputes_next_run() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/schedules")
        .set_json(json!({
            "deviceId": "device-fw-6",
            "scanType": "full",
            "scheduleType": "daily"
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["cronExpression"], "0 2 * * *");
    assert_eq!(body["isActive"], true);
    let id = body["id"].as_str().unwrap().to_string();
    let daily_next = body["nextRunAt"].as_str().unwrap().to_string();

    let req = test::TestRequest::put()
        .uri(&format!("/api/schedules/{}", id))
        .set_json(json!({ "scheduleType": "weekly" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["cronExpression"], "0 2 * * 1");
    // Weekly pushes the next run past the daily one.
    assert!(body["nextRunAt"].as_str().unwrap() > daily_next.as_str());

    let req = test::TestRequest::get()
        .uri("/api/schedules?deviceId=device-fw-6")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalItems"], 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/schedules/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/schedules/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Schedules require a known device.
    let req = test::TestRequest::post()
        .uri("/api/schedules")
        .set_json(json!({
            "deviceId": "device-fw-999",
            "scanType": "full",
            "scheduleType": "once"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn dashboard_summary_reflects_inventory() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::get()
        .uri("/api/dashboard/summary")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalDevices"], 55);
    assert_eq!(body["activeDevices"], 45);
    assert_eq!(body["scanActivity"].as_array().unwrap().len(), 7);
    assert!(body["averageTimeToRemediate"].is_string());
}

#[actix_web::test]
async fn remediation_endpoint_degrades_gracefully() {
    let state = test_state().await;
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/ai/remediation")
        .set_json(json!({
            "vulnerabilityDescription": "SNMP service exposed with default community string",
            "deviceInformation": "Cisco ASA 5506-X, firmware 9.8"
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["degraded"], true);
    assert!(body["degradedReason"].is_string());
    assert!(!body["remediationSteps"].as_str().unwrap().is_empty());
    assert!(body["confidenceScore"].as_f64().unwrap() <= 0.2);

    let req = test::TestRequest::post()
        .uri("/api/ai/remediation")
        .set_json(json!({ "vulnerabilityDescription": "", "deviceInformation": "" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn shutdown_cancellation_marks_in_flight_scans() {
    // A long first-phase delay keeps the scan in flight while we shut down.
    let mut config = Config::for_tests();
    config.scan_start_delay = Duration::from_secs(30);
    let state = AppState::new(config)
        .await
        .expect("failed to build test state");
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/scans")
        .set_json(json!({ "deviceId": "device-fw-2", "scanType": "full" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let scan_id = body["id"].as_str().unwrap().to_string();

    state.shutdown.cancel();
    state.tasks.close();
    state.tasks.wait().await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/scans/{}", scan_id))
        .to_request();
    let scan: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(scan["status"], "cancelled");
    assert!(scan["completedAt"].is_string());
}

#[actix_web::test]
async fn device_list_filters_match_table_counts() {
    let state = test_state().await;
    let app = test_app!(state);

    // Brands rotate over five entries, so Cisco owns 11 of the 55 seeds.
    let req = test::TestRequest::get()
        .uri("/api/devices?name=cisco&limit=100")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalItems"], 11);
    assert_eq!(body["data"].as_array().unwrap().len(), 11);
    for device in body["data"].as_array().unwrap() {
        assert!(device["name"].as_str().unwrap().contains("Cisco"));
    }

    let req = test::TestRequest::get()
        .uri("/api/devices?brand=Fortinet&limit=100")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalItems"], 11);
    for device in body["data"].as_array().unwrap() {
        assert_eq!(device["brand"], "Fortinet");
    }

    // An unmatched exact filter yields an empty, well-formed page.
    let req = test::TestRequest::get()
        .uri("/api/devices?brand=Netgate")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalItems"], 0);
    assert_eq!(body["totalPages"], 0);
}

#[actix_web::test]
async fn scan_history_filters_narrow_results() {
    let state = test_state().await;
    let app = test_app!(state);

    for (device_id, scan_type) in [("device-fw-2", "full"), ("device-fw-3", "local")] {
        let req = test::TestRequest::post()
            .uri("/api/scans")
            .set_json(json!({ "deviceId": device_id, "scanType": scan_type }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let scan_id = body["id"].as_str().unwrap().to_string();
        poll_scan(&app, &scan_id).await;
    }

    let req = test::TestRequest::get()
        .uri("/api/scans?deviceId=device-fw-2")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalItems"], 1);
    assert_eq!(body["data"][0]["deviceId"], "device-fw-2");

    let req = test::TestRequest::get()
        .uri("/api/scans?scanType=local")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalItems"], 1);
    assert_eq!(body["data"][0]["scanType"], "local");

    // The 'all' sentinel matches everything, same as no filter.
    let req = test::TestRequest::get()
        .uri("/api/scans?status=all&scanType=all")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalItems"], 2);

    let req = test::TestRequest::get()
        .uri("/api/scans?status=completed&deviceId=device-fw-3")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalItems"], 1);

    let req = test::TestRequest::get()
        .uri("/api/scans?status=running")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn malformed_stored_tags_degrade_to_empty_list() {
    let state = test_state().await;
    let app = test_app!(state);

    sqlx::query("UPDATE devices SET tags = '{broken' WHERE id = 'device-fw-7'")
        .execute(&state.db)
        .await
        .unwrap();

    let req = test::TestRequest::get()
        .uri("/api/devices/device-fw-7")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["id"], "device-fw-7");
    assert_eq!(body["tags"], json!([]));
}

#[actix_web::test]
async fn malformed_stored_analysis_is_omitted_from_response() {
    let state = test_state().await;
    let app = test_app!(state);

    let now = vulnwatch_core::time::now();
    sqlx::query(
        "INSERT INTO scans (id, device_id, device_name, scan_type, status,
                            completed_at, summary, ai_analysis,
                            vulnerabilities_found, created_at)
         VALUES ('scan-corrupt', 'device-fw-2', 'Cisco Firewall ASA-1001', 'ai',
                 'completed', ?, 'done', 'not-json', 0, ?)",
    )
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await
    .unwrap();

    let req = test::TestRequest::get()
        .uri("/api/scans/scan-corrupt")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["summary"], "done");
    assert!(body.get("aiAnalysis").is_none());
}
