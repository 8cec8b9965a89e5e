use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use uuid::Uuid;

use vulnwatch_core::{time, NotificationKind, ScanStatus, Severity};

use crate::api::notifications::insert_notification;
use crate::api::scans::{ScanRow, SCAN_COLUMNS};
use crate::state::AppState;

/// Report request parameters. Wire names follow the reporting contract
/// (snake_case), unlike the camelCase entity endpoints.
#[derive(Deserialize, Serialize, Clone)]
pub struct CustomReportParams {
    pub report_type: String,
    #[serde(default)]
    pub filters: CustomReportFilters,
    #[serde(default)]
    pub include_trends: bool,
    pub format: String,
}

#[derive(Deserialize, Serialize, Clone, Default)]
pub struct CustomReportFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_brands: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub severity_levels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Deserialize)]
pub struct ScanReportParams {
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "pdf".to_string()
}

#[derive(Serialize)]
pub struct CustomReportResponse {
    pub report_id: String,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<CustomReportData>,
    pub generated_at: String,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CustomReportData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters_applied: Option<CustomReportFilters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trends_included: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<serde_json::Value>,
}

const REPORT_FORMATS: [&str; 2] = ["pdf", "csv"];

pub fn configure_report_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/custom", web::post().to(generate_custom_report)) // POST /api/reports/custom
        .route("/scan/{id}", web::post().to(generate_scan_report)); // POST /api/reports/scan/{id}
}

/// Filter-driven report. Generation is simulated: no file is produced and
/// the download link is a synthetic path. Failure is explicit and
/// deterministic (an inverted date range), never random.
pub async fn generate_custom_report(
    state: web::Data<AppState>,
    params: web::Json<CustomReportParams>,
) -> impl Responder {
    let params = params.into_inner();

    if !REPORT_FORMATS.contains(&params.format.as_str()) {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Report format must be one of {:?}, got '{}'", REPORT_FORMATS, params.format)
        }));
    }
    for level in &params.filters.severity_levels {
        if level.parse::<Severity>().is_err() {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Invalid severity level '{}'", level)
            }));
        }
    }

    // Simulated generation time
    sleep(state.config.report_delay).await;

    if let Some(range) = &params.filters.date_range {
        if let (Some(start), Some(end)) = (&range.start, &range.end) {
            if start > end {
                return HttpResponse::Ok().json(CustomReportResponse {
                    report_id: format!("report-{}", Uuid::new_v4()),
                    status: "failed".to_string(),
                    message: format!(
                        "Report generation failed: date range starts at {} but ends at {}.",
                        start, end
                    ),
                    data: None,
                    generated_at: time::now(),
                });
            }
        }
    }

    let trend_summary = if params.include_trends {
        match build_trend_summary(&state).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::error!("Failed to compute trend summary: {}", e);
                return HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": format!("Failed to compute trend summary: {}", e)
                }));
            }
        }
    } else {
        None
    };

    let report_id = format!("report-{}", Uuid::new_v4());
    let download_link = format!("/reports/files/{}.{}", report_id, params.format);

    if let Err(e) = insert_notification(
        &state.db,
        NotificationKind::ReportReady,
        "Report ready",
        &format!("Custom report '{}' is ready for download.", params.report_type),
        Some(&download_link),
    )
    .await
    {
        tracing::error!("Failed to record report notification: {}", e);
    }

    let message = format!(
        "Custom report '{}' generated successfully.",
        params.report_type
    );
    let details = format!(
        "{} report of type '{}'.",
        params.format.to_uppercase(),
        params.report_type
    );

    HttpResponse::Ok().json(CustomReportResponse {
        report_id,
        status: "completed".to_string(),
        message,
        data: Some(CustomReportData {
            download_link: Some(download_link),
            details: Some(details),
            filters_applied: Some(params.filters.clone()),
            trends_included: Some(params.include_trends),
            trend_summary,
            ai_analysis: None,
        }),
        generated_at: time::now(),
    })
}

/// Report for one completed scan, merging its stored AI analysis.
pub async fn generate_scan_report(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Json<ScanReportParams>,
) -> impl Responder {
    let scan_id = path.into_inner();

    if !REPORT_FORMATS.contains(&params.format.as_str()) {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Report format must be one of {:?}, got '{}'", REPORT_FORMATS, params.format)
        }));
    }

    let sql = format!("SELECT {} FROM scans WHERE id = ?", SCAN_COLUMNS);
    let scan = match sqlx::query_as::<_, ScanRow>(&sql)
        .bind(&scan_id)
        .fetch_optional(&state.db)
        .await
    {
        Ok(Some(scan)) => scan,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("Scan '{}' not found", scan_id)
            }));
        }
        Err(e) => {
            tracing::error!("Failed to fetch scan: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to fetch scan: {}", e)
            }));
        }
    };

    if scan.status != ScanStatus::Completed.as_str() {
        return HttpResponse::Conflict().json(serde_json::json!({
            "error": format!(
                "Scan '{}' is '{}'; reports need a completed scan",
                scan_id, scan.status
            )
        }));
    }

    sleep(state.config.report_delay).await;

    let report_id = format!("report-{}", Uuid::new_v4());
    let download_link = format!("/reports/files/{}.{}", report_id, params.format);
    let ai_analysis = scan
        .ai_analysis
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok());

    if let Err(e) = insert_notification(
        &state.db,
        NotificationKind::ReportReady,
        "Report ready",
        &format!("Scan report for {} is ready for download.", scan.device_name),
        Some(&download_link),
    )
    .await
    {
        tracing::error!("Failed to record report notification: {}", e);
    }

    HttpResponse::Ok().json(CustomReportResponse {
        report_id,
        status: "completed".to_string(),
        message: format!("Scan report for '{}' generated successfully.", scan_id),
        data: Some(CustomReportData {
            download_link: Some(download_link),
            details: Some(format!(
                "{} report for scan '{}' on device '{}' ({} open findings).",
                params.format.to_uppercase(),
                scan.id,
                scan.device_name,
                scan.vulnerabilities_found
            )),
            ai_analysis,
            ..CustomReportData::default()
        }),
        generated_at: time::now(),
    })
}

/// Open-finding counts for the current vs previous 7-day window.
async fn build_trend_summary(state: &AppState) -> sqlx::Result<String> {
    let (current,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*)
         FROM scan_results r
         JOIN scans s ON r.scan_id = s.id
         WHERE s.status = 'completed' AND r.status = 'open'
           AND r.created_at >= datetime('now', '-7 days')",
    )
    .fetch_one(&state.db)
    .await?;

    let (previous,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*)
         FROM scan_results r
         JOIN scans s ON r.scan_id = s.id
         WHERE s.status = 'completed' AND r.status = 'open'
           AND r.created_at >= datetime('now', '-14 days')
           AND r.created_at < datetime('now', '-7 days')",
    )
    .fetch_one(&state.db)
    .await?;

    let direction = if current > previous {
        "increased"
    } else if current < previous {
        "decreased"
    } else {
        "held steady"
    };

    Ok(format!(
        "Open vulnerability count {} compared to the previous period: {} now vs {} before.",
        direction, current, previous
    ))
}
