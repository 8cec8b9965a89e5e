use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Pool, Sqlite};
use uuid::Uuid;

use vulnwatch_core::{time, Device, ScanStatus, ScanType};

use crate::api::devices::fetch_device;
use crate::api::{bind_all, Bind};
use crate::lifecycle;
use crate::pagination::{clamp_paging, offset, Page};
use crate::state::AppState;

/// scans row, snake_case columns as stored.
#[derive(FromRow)]
pub struct ScanRow {
    pub id: String,
    pub device_id: String,
    pub device_name: String,
    pub scan_type: String,
    pub status: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub summary: Option<String>,
    pub ai_analysis: Option<String>,
    pub vulnerabilities_found: i64,
    pub created_at: String,
}

/// Scan as rendered on the wire.
#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: String,
    pub device_id: String,
    pub device_name: String,
    pub scan_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<serde_json::Value>,
    pub vulnerabilities_found: i64,
    pub created_at: String,
}

impl From<ScanRow> for ScanRecord {
    fn from(row: ScanRow) -> Self {
        let ai_analysis = row.ai_analysis.as_deref().and_then(|raw| {
            serde_json::from_str(raw)
                .map_err(|e| {
                    tracing::warn!("Scan {} carries malformed ai_analysis JSON: {}", row.id, e);
                })
                .ok()
        });
        ScanRecord {
            id: row.id,
            device_id: row.device_id,
            device_name: row.device_name,
            scan_type: row.scan_type,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            summary: row.summary,
            ai_analysis,
            vulnerabilities_found: row.vulnerabilities_found,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
pub struct ScanResultRow {
    pub id: String,
    pub scan_id: String,
    pub vulnerability_id: Option<String>,
    pub finding: String,
    pub details: Option<String>,
    pub severity: String,
    pub status: String,
    pub ai_confidence_score: Option<f64>,
    pub ai_suggested_remediation: Option<String>,
    pub created_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultRecord {
    pub id: String,
    pub scan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulnerability_id: Option<String>,
    pub finding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub severity: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_confidence_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_suggested_remediation: Option<String>,
    pub created_at: String,
}

impl From<ScanResultRow> for ScanResultRecord {
    fn from(row: ScanResultRow) -> Self {
        ScanResultRecord {
            id: row.id,
            scan_id: row.scan_id,
            vulnerability_id: row.vulnerability_id,
            finding: row.finding,
            details: row.details,
            severity: row.severity,
            status: row.status,
            ai_confidence_score: row.ai_confidence_score,
            ai_suggested_remediation: row.ai_suggested_remediation,
            created_at: row.created_at,
        }
    }
}

/// Scan plus its result rows, for the detail view.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDetail {
    #[serde(flatten)]
    pub scan: ScanRecord,
    pub results: Vec<ScanResultRecord>,
}

pub(crate) const SCAN_COLUMNS: &str =
    "id, device_id, device_name, scan_type, status, started_at, completed_at, \
     summary, ai_analysis, vulnerabilities_found, created_at";

const SCAN_RESULT_COLUMNS: &str =
    "id, scan_id, vulnerability_id, finding, details, severity, status, \
     ai_confidence_score, ai_suggested_remediation, created_at";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerScanRequest {
    pub device_id: String,
    pub scan_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkScanRequest {
    pub device_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanListQuery {
    pub device_id: Option<String>,
    pub status: Option<String>,
    pub scan_type: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub fn configure_scan_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::post().to(trigger_scan)) // POST /api/scans
        .route("", web::get().to(list_scans)) // GET  /api/scans
        .route("/bulk", web::post().to(trigger_bulk_scan)) // POST /api/scans/bulk
        .route("/{id}", web::get().to(get_scan)); // GET  /api/scans/{id}
}

pub async fn trigger_scan(
    state: web::Data<AppState>,
    req: web::Json<TriggerScanRequest>,
) -> impl Responder {
    let scan_type: ScanType = match req.scan_type.parse() {
        Ok(scan_type) => scan_type,
        Err(_) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Invalid scan type '{}'", req.scan_type)
            }));
        }
    };

    let device = match fetch_device(&state.db, &req.device_id).await {
        Ok(Some(device)) => device,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("Device '{}' not found", req.device_id)
            }));
        }
        Err(e) => {
            tracing::error!("Failed to fetch device: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to fetch device: {}", e)
            }));
        }
    };

    match insert_pending_scan(&state.db, &device, scan_type).await {
        Ok(record) => {
            tracing::info!(
                "Triggered {} scan {} for device {}",
                scan_type,
                record.id,
                device.id
            );
            lifecycle::spawn_scan(state.get_ref().clone(), record.id.clone(), device, scan_type);
            HttpResponse::Ok().json(record)
        }
        Err(e) => {
            tracing::error!("Failed to create scan: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to create scan: {}", e)
            }))
        }
    }
}

/// Bulk scans always run the full scan type, matching the single-device
/// trigger for each known id. Unknown ids are skipped, not an error.
pub async fn trigger_bulk_scan(
    state: web::Data<AppState>,
    req: web::Json<BulkScanRequest>,
) -> impl Responder {
    let mut started = 0usize;

    for device_id in &req.device_ids {
        let device = match fetch_device(&state.db, device_id).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                tracing::warn!("Bulk scan skipping unknown device '{}'", device_id);
                continue;
            }
            Err(e) => {
                tracing::error!("Failed to fetch device '{}': {}", device_id, e);
                continue;
            }
        };

        match insert_pending_scan(&state.db, &device, ScanType::Full).await {
            Ok(record) => {
                lifecycle::spawn_scan(
                    state.get_ref().clone(),
                    record.id.clone(),
                    device,
                    ScanType::Full,
                );
                started += 1;
            }
            Err(e) => {
                tracing::error!("Failed to create bulk scan for '{}': {}", device_id, e);
            }
        }
    }

    HttpResponse::Ok().json(serde_json::json!({
        "jobId": format!("bulk-job-{}", Uuid::new_v4()),
        "message": format!("{} firewall scans initiated.", started),
        "started": started,
    }))
}

pub async fn list_scans(
    state: web::Data<AppState>,
    query: web::Query<ScanListQuery>,
) -> impl Responder {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Bind> = Vec::new();

    if let Some(device_id) = query.device_id.as_deref().filter(|s| !s.is_empty()) {
        clauses.push("device_id = ?");
        binds.push(Bind::Text(device_id.to_string()));
    }
    if let Some(status) = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty() && *s != "all")
    {
        if status.parse::<ScanStatus>().is_err() {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Invalid scan status '{}'", status)
            }));
        }
        clauses.push("status = ?");
        binds.push(Bind::Text(status.to_string()));
    }
    if let Some(scan_type) = query
        .scan_type
        .as_deref()
        .filter(|s| !s.is_empty() && *s != "all")
    {
        if scan_type.parse::<ScanType>().is_err() {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Invalid scan type '{}'", scan_type)
            }));
        }
        clauses.push("scan_type = ?");
        binds.push(Bind::Text(scan_type.to_string()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let (page, limit) = clamp_paging(query.page, query.limit);

    let count_sql = format!("SELECT COUNT(*) FROM scans{}", where_sql);
    let total_items = match bind_all(sqlx::query_as::<_, (i64,)>(&count_sql), &binds)
        .fetch_one(&state.db)
        .await
    {
        Ok((count,)) => count,
        Err(e) => {
            tracing::error!("Failed to count scans: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to count scans: {}", e)
            }));
        }
    };

    let page_sql = format!(
        "SELECT {} FROM scans{} ORDER BY created_at DESC, id LIMIT {} OFFSET {}",
        SCAN_COLUMNS,
        where_sql,
        limit,
        offset(page, limit)
    );
    let rows = match bind_all(sqlx::query_as::<_, ScanRow>(&page_sql), &binds)
        .fetch_all(&state.db)
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!("Failed to list scans: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to list scans: {}", e)
            }));
        }
    };

    let scans: Vec<ScanRecord> = rows.into_iter().map(ScanRecord::from).collect();
    HttpResponse::Ok().json(Page::new(scans, page, limit, total_items))
}

pub async fn get_scan(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();

    let sql = format!("SELECT {} FROM scans WHERE id = ?", SCAN_COLUMNS);
    let row = match sqlx::query_as::<_, ScanRow>(&sql)
        .bind(&id)
        .fetch_optional(&state.db)
        .await
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("Scan '{}' not found", id)
            }));
        }
        Err(e) => {
            tracing::error!("Failed to fetch scan: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to fetch scan: {}", e)
            }));
        }
    };

    let results_sql = format!(
        "SELECT {} FROM scan_results WHERE scan_id = ? ORDER BY created_at, id",
        SCAN_RESULT_COLUMNS
    );
    let results = match sqlx::query_as::<_, ScanResultRow>(&results_sql)
        .bind(&id)
        .fetch_all(&state.db)
        .await
    {
        Ok(rows) => rows.into_iter().map(ScanResultRecord::from).collect(),
        Err(e) => {
            tracing::error!("Failed to fetch scan results: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to fetch scan results: {}", e)
            }));
        }
    };

    HttpResponse::Ok().json(ScanDetail {
        scan: ScanRecord::from(row),
        results,
    })
}

/// Insert a scan in `pending` state and return it as a wire record.
pub(crate) async fn insert_pending_scan(
    pool: &Pool<Sqlite>,
    device: &Device,
    scan_type: ScanType,
) -> sqlx::Result<ScanRecord> {
    let id = format!("scan-{}", Uuid::new_v4());
    let created_at = time::now();

    sqlx::query(
        "INSERT INTO scans (id, device_id, device_name, scan_type, status,
                            vulnerabilities_found, created_at)
         VALUES (?, ?, ?, ?, 'pending', 0, ?)",
    )
    .bind(&id)
    .bind(&device.id)
    .bind(&device.name)
    .bind(scan_type.as_str())
    .bind(&created_at)
    .execute(pool)
    .await?;

    Ok(ScanRecord {
        id,
        device_id: device.id.clone(),
        device_name: device.name.clone(),
        scan_type: scan_type.as_str().to_string(),
        status: ScanStatus::Pending.as_str().to_string(),
        started_at: None,
        completed_at: None,
        summary: None,
        ai_analysis: None,
        vulnerabilities_found: 0,
        created_at,
    })
}

/// The most recent scans for one device, newest first.
pub(crate) async fn fetch_recent_for_device(
    pool: &Pool<Sqlite>,
    device_id: &str,
    limit: i64,
) -> sqlx::Result<Vec<ScanRecord>> {
    let sql = format!(
        "SELECT {} FROM scans WHERE device_id = ? ORDER BY created_at DESC, id LIMIT {}",
        SCAN_COLUMNS, limit
    );
    let rows = sqlx::query_as::<_, ScanRow>(&sql)
        .bind(device_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(ScanRecord::from).collect())
}
