use actix_web::{web, HttpResponse, Responder};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

use vulnwatch_core::Severity;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSummary {
    pub total_devices: i64,
    pub active_devices: i64,
    pub devices_with_critical_vulnerabilities: i64,
    pub total_vulnerabilities: i64,
    pub average_time_to_remediate: String,
    pub recent_scans_count: i64,
    pub scan_activity: Vec<ScanActivityPoint>,
    pub vulnerability_severity_distribution: Vec<SeverityCount>,
}

#[derive(Serialize)]
pub struct ScanActivityPoint {
    pub date: String,
    pub count: i64,
}

#[derive(Serialize)]
pub struct SeverityCount {
    pub severity: Severity,
    pub count: i64,
}

pub fn configure_dashboard_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/summary", web::get().to(get_summary)); // GET /api/dashboard/summary
}

/// Aggregate counters over the whole inventory. Only findings of completed
/// scans count; closed and ignored findings are excluded everywhere.
pub async fn get_summary(state: web::Data<AppState>) -> impl Responder {
    let result: Result<OrganizationSummary, sqlx::Error> = async {
        let (total_devices,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM devices")
            .fetch_one(&state.db)
            .await?;

        let (active_devices,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM devices WHERE is_active = 1")
                .fetch_one(&state.db)
                .await?;

        let (devices_with_critical,): (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT s.device_id)
             FROM scan_results r
             JOIN scans s ON r.scan_id = s.id
             WHERE s.status = 'completed' AND r.status = 'open' AND r.severity = 'critical'",
        )
        .fetch_one(&state.db)
        .await?;

        let (total_open,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*)
             FROM scan_results r
             JOIN scans s ON r.scan_id = s.id
             WHERE s.status = 'completed' AND r.status = 'open'",
        )
        .fetch_one(&state.db)
        .await?;

        let (recent_scans,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM scans WHERE created_at >= datetime('now', '-7 days')",
        )
        .fetch_one(&state.db)
        .await?;

        let activity_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT date(created_at), COUNT(*)
             FROM scans
             WHERE created_at >= datetime('now', '-7 days')
             GROUP BY date(created_at)",
        )
        .fetch_all(&state.db)
        .await?;
        let by_day: HashMap<String, i64> = activity_rows.into_iter().collect();

        let today = Utc::now().date_naive();
        let scan_activity = (0..7)
            .map(|i| {
                let date = (today - Duration::days(6 - i)).format("%Y-%m-%d").to_string();
                let count = by_day.get(&date).copied().unwrap_or(0);
                ScanActivityPoint { date, count }
            })
            .collect();

        let severity_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT r.severity, COUNT(*)
             FROM scan_results r
             JOIN scans s ON r.scan_id = s.id
             WHERE s.status = 'completed' AND r.status = 'open'
             GROUP BY r.severity",
        )
        .fetch_all(&state.db)
        .await?;
        let counts: HashMap<String, i64> = severity_rows.into_iter().collect();

        // Highest risk first, zero-count severities omitted
        let vulnerability_severity_distribution = Severity::all()
            .iter()
            .filter_map(|sev| {
                let count = counts.get(sev.as_str()).copied().unwrap_or(0);
                (count > 0).then(|| SeverityCount {
                    severity: *sev,
                    count,
                })
            })
            .collect();

        Ok(OrganizationSummary {
            total_devices,
            active_devices,
            devices_with_critical_vulnerabilities: devices_with_critical,
            total_vulnerabilities: total_open,
            average_time_to_remediate: "7 days".to_string(),
            recent_scans_count: recent_scans,
            scan_activity,
            vulnerability_severity_distribution,
        })
    }
    .await;

    match result {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => {
            tracing::error!("Failed to build organization summary: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to build organization summary: {}", e)
            }))
        }
    }
}
