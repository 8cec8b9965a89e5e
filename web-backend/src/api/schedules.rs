use actix_web::{web, HttpResponse, Responder};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use vulnwatch_core::{time, ScanType, ScheduleType};

use crate::api::devices::fetch_device;
use crate::pagination::{clamp_paging, offset, Page};
use crate::state::AppState;

#[derive(FromRow)]
pub struct ScheduleRow {
    pub id: String,
    pub device_id: String,
    pub scan_type: String,
    pub schedule_type: String,
    pub cron_expression: String,
    pub next_run_at: String,
    pub last_run_at: Option<String>,
    pub is_active: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    pub id: String,
    pub device_id: String,
    pub scan_type: String,
    pub schedule_type: String,
    pub cron_expression: String,
    pub next_run_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ScheduleRow> for ScheduleRecord {
    fn from(row: ScheduleRow) -> Self {
        ScheduleRecord {
            id: row.id,
            device_id: row.device_id,
            scan_type: row.scan_type,
            schedule_type: row.schedule_type,
            cron_expression: row.cron_expression,
            next_run_at: row.next_run_at,
            last_run_at: row.last_run_at,
            is_active: row.is_active != 0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SCHEDULE_COLUMNS: &str = "id, device_id, scan_type, schedule_type, cron_expression, \
                                next_run_at, last_run_at, is_active, created_at, updated_at";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    pub device_id: String,
    pub scan_type: String,
    pub schedule_type: String,
    pub is_active: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleRequest {
    pub scan_type: Option<String>,
    pub schedule_type: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleListQuery {
    pub device_id: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub fn configure_schedule_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(list_schedules)) // GET    /api/schedules
        .route("", web::post().to(create_schedule)) // POST   /api/schedules
        .route("/{id}", web::put().to(update_schedule)) // PUT    /api/schedules/{id}
        .route("/{id}", web::delete().to(delete_schedule)); // DELETE /api/schedules/{id}
}

/// Next execution time for a schedule type, relative to `from`.
/// Monthly schedules use a fixed 30-day stride.
fn next_run_after(schedule_type: ScheduleType, from: DateTime<Utc>) -> DateTime<Utc> {
    match schedule_type {
        ScheduleType::Once => from,
        ScheduleType::Daily => from + Duration::days(1),
        ScheduleType::Weekly => from + Duration::days(7),
        ScheduleType::Monthly => from + Duration::days(30),
    }
}

/// Derived cron-like expression stored alongside the schedule type.
fn cron_for(schedule_type: ScheduleType) -> &'static str {
    match schedule_type {
        ScheduleType::Once => "@once",
        ScheduleType::Daily => "0 2 * * *",
        ScheduleType::Weekly => "0 2 * * 1",
        ScheduleType::Monthly => "0 2 1 * *",
    }
}

pub async fn list_schedules(
    state: web::Data<AppState>,
    query: web::Query<ScheduleListQuery>,
) -> impl Responder {
    let (where_sql, device_id) = match query.device_id.as_deref().filter(|s| !s.is_empty()) {
        Some(device_id) => (" WHERE device_id = ?", Some(device_id.to_string())),
        None => ("", None),
    };
    let (page, limit) = clamp_paging(query.page, query.limit);

    let count_sql = format!("SELECT COUNT(*) FROM scheduled_scans{}", where_sql);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(device_id) = &device_id {
        count_query = count_query.bind(device_id);
    }
    let total_items = match count_query.fetch_one(&state.db).await {
        Ok((count,)) => count,
        Err(e) => {
            tracing::error!("Failed to count schedules: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to count schedules: {}", e)
            }));
        }
    };

    let page_sql = format!(
        "SELECT {} FROM scheduled_scans{} ORDER BY next_run_at, id LIMIT {} OFFSET {}",
        SCHEDULE_COLUMNS,
        where_sql,
        limit,
        offset(page, limit)
    );
    let mut page_query = sqlx::query_as::<_, ScheduleRow>(&page_sql);
    if let Some(device_id) = &device_id {
        page_query = page_query.bind(device_id);
    }
    let rows = match page_query.fetch_all(&state.db).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!("Failed to list schedules: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to list schedules: {}", e)
            }));
        }
    };

    let schedules: Vec<ScheduleRecord> = rows.into_iter().map(ScheduleRecord::from).collect();
    HttpResponse::Ok().json(Page::new(schedules, page, limit, total_items))
}

pub async fn create_schedule(
    state: web::Data<AppState>,
    req: web::Json<CreateScheduleRequest>,
) -> impl Responder {
    let scan_type: ScanType = match req.scan_type.parse() {
        Ok(scan_type) => scan_type,
        Err(_) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Invalid scan type '{}'", req.scan_type)
            }));
        }
    };
    let schedule_type: ScheduleType = match req.schedule_type.parse() {
        Ok(schedule_type) => schedule_type,
        Err(_) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Invalid schedule type '{}'", req.schedule_type)
            }));
        }
    };

    match fetch_device(&state.db, &req.device_id).await {
        Ok(Some(_)) => {}
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
    }

    let now = time::now();
    let record = ScheduleRecord {
        id: format!("schedule-{}", Uuid::new_v4()),
        device_id: req.device_id.clone(),
        scan_type: scan_type.as_str().to_string(),
        schedule_type: schedule_type.as_str().to_string(),
        cron_expression: cron_for(schedule_type).to_string(),
        next_run_at: time::format(next_run_after(schedule_type, Utc::now())),
        last_run_at: None,
        is_active: req.is_active.unwrap_or(true),
        created_at: now.clone(),
        updated_at: now,
    };

    let result = sqlx::query(
        "INSERT INTO scheduled_scans (id, device_id, scan_type, schedule_type,
                                      cron_expression, next_run_at, last_run_at,
                                      is_active, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.device_id)
    .bind(&record.scan_type)
    .bind(&record.schedule_type)
    .bind(&record.cron_expression)
    .bind(&record.next_run_at)
    .bind(record.is_active as i64)
    .bind(&record.created_at)
    .bind(&record.updated_at)
    .execute(&state.db)
    .await;

    match result {
        Ok(_) => HttpResponse::Ok().json(record),
        Err(e) => {
            tracing::error!("Failed to create schedule: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to create schedule: {}", e)
            }))
        }
    }
}

pub async fn update_schedule(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<UpdateScheduleRequest>,
) -> impl Responder {
    let id = path.into_inner();

    let sql = format!("SELECT {} FROM scheduled_scans WHERE id = ?", SCHEDULE_COLUMNS);
    let existing = match sqlx::query_as::<_, ScheduleRow>(&sql)
        .bind(&id)
        .fetch_optional(&state.db)
        .await
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("Schedule '{}' not found", id)
            }));
        }
        Err(e) => {
            tracing::error!("Failed to fetch schedule: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to fetch schedule: {}", e)
            }));
        }
    };

    let scan_type = match &req.scan_type {
        Some(raw) => match raw.parse::<ScanType>() {
            Ok(scan_type) => scan_type.as_str().to_string(),
            Err(_) => {
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "error": format!("Invalid scan type '{}'", raw)
                }));
            }
        },
        None => existing.scan_type.clone(),
    };

    // A changed schedule type re-anchors the next run to now.
    let (schedule_type, cron_expression, next_run_at) = match &req.schedule_type {
        Some(raw) => match raw.parse::<ScheduleType>() {
            Ok(schedule_type) => (
                schedule_type.as_str().to_string(),
                cron_for(schedule_type).to_string(),
                time::format(next_run_after(schedule_type, Utc::now())),
            ),
            Err(_) => {
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "error": format!("Invalid schedule type '{}'", raw)
                }));
            }
        },
        None => (
            existing.schedule_type.clone(),
            existing.cron_expression.clone(),
            existing.next_run_at.clone(),
        ),
    };

    let is_active = req.is_active.unwrap_or(existing.is_active != 0);
    let updated_at = time::now();

    let result = sqlx::query(
        "UPDATE scheduled_scans SET scan_type = ?, schedule_type = ?, cron_expression = ?,
                next_run_at = ?, is_active = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&scan_type)
    .bind(&schedule_type)
    .bind(&cron_expression)
    .bind(&next_run_at)
    .bind(is_active as i64)
    .bind(&updated_at)
    .bind(&id)
    .execute(&state.db)
    .await;

    match result {
        Ok(_) => HttpResponse::Ok().json(ScheduleRecord {
            id,
            device_id: existing.device_id,
            scan_type,
            schedule_type,
            cron_expression,
            next_run_at,
            last_run_at: existing.last_run_at,
            is_active,
            created_at: existing.created_at,
            updated_at,
        }),
        Err(e) => {
            tracing::error!("Failed to update schedule: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to update schedule: {}", e)
            }))
        }
    }
}

pub async fn delete_schedule(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();

    match sqlx::query("DELETE FROM scheduled_scans WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await
    {
        Ok(result) if result.rows_affected() == 0 => {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("Schedule '{}' not found", id)
            }))
        }
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "message": "Schedule deleted" })),
        Err(e) => {
            tracing::error!("Failed to delete schedule: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to delete schedule: {}", e)
            }))
        }
    }
}
