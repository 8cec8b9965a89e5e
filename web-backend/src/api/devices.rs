use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Pool, Sqlite};
use uuid::Uuid;

use vulnwatch_core::{time, Device};

use crate::api::scans::{fetch_recent_for_device, ScanRecord};
use crate::api::{bind_all, Bind};
use crate::pagination::{clamp_paging, offset, Page};
use crate::state::AppState;

/// devices row, snake_case columns as stored.
#[derive(FromRow)]
pub struct DeviceRow {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub model: String,
    pub version: String,
    pub location: String,
    pub ip_address: String,
    pub mac_address: String,
    pub os: String,
    pub os_version: String,
    pub is_active: i64,
    pub last_seen: String,
    pub created_at: String,
    pub updated_at: String,
    pub tags: String,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        let tags = serde_json::from_str(&row.tags).unwrap_or_else(|e| {
            tracing::warn!("Device {} carries malformed tags JSON: {}", row.id, e);
            Vec::new()
        });
        Device {
            id: row.id,
            name: row.name,
            brand: row.brand,
            model: row.model,
            version: row.version,
            location: row.location,
            ip_address: row.ip_address,
            mac_address: row.mac_address,
            os: row.os,
            os_version: row.os_version,
            is_active: row.is_active != 0,
            last_seen: row.last_seen,
            created_at: row.created_at,
            updated_at: row.updated_at,
            tags,
        }
    }
}

const DEVICE_COLUMNS: &str = "id, name, brand, model, version, location, ip_address, \
                              mac_address, os, os_version, is_active, last_seen, \
                              created_at, updated_at, tags";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListQuery {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub location: Option<String>,
    pub is_active: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeviceRequest {
    pub name: String,
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub location: String,
    pub ip_address: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub os_version: String,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeviceRequest {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub location: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub is_active: Option<bool>,
    pub tags: Option<Vec<String>>,
}

/// Device plus its most recent scans, for the detail view.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetail {
    #[serde(flatten)]
    pub device: Device,
    pub scans: Vec<ScanRecord>,
}

pub fn configure_device_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(list_devices)) // GET    /api/devices
        .route("", web::post().to(create_device)) // POST   /api/devices
        .route("/brands", web::get().to(list_brands)) // GET    /api/devices/brands
        .route("/locations", web::get().to(list_locations)) // GET    /api/devices/locations
        .route("/{id}", web::get().to(get_device)) // GET    /api/devices/{id}
        .route("/{id}", web::put().to(update_device)); // PUT    /api/devices/{id}
}

fn device_filter_clauses(query: &DeviceListQuery) -> Result<(String, Vec<Bind>), String> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Bind> = Vec::new();

    if let Some(name) = query.name.as_deref().filter(|s| !s.is_empty()) {
        clauses.push("LOWER(name) LIKE ?");
        binds.push(Bind::Text(format!("%{}%", name.to_lowercase())));
    }
    if let Some(brand) = query.brand.as_deref().filter(|s| !s.is_empty() && *s != "all") {
        clauses.push("brand = ?");
        binds.push(Bind::Text(brand.to_string()));
    }
    if let Some(model) = query.model.as_deref().filter(|s| !s.is_empty()) {
        clauses.push("LOWER(model) LIKE ?");
        binds.push(Bind::Text(format!("%{}%", model.to_lowercase())));
    }
    if let Some(version) = query.version.as_deref().filter(|s| !s.is_empty()) {
        clauses.push("version = ?");
        binds.push(Bind::Text(version.to_string()));
    }
    if let Some(location) = query
        .location
        .as_deref()
        .filter(|s| !s.is_empty() && *s != "all")
    {
        clauses.push("location = ?");
        binds.push(Bind::Text(location.to_string()));
    }
    match query.is_active.as_deref() {
        None | Some("") | Some("all") => {}
        Some("true") => {
            clauses.push("is_active = ?");
            binds.push(Bind::Int(1));
        }
        Some("false") => {
            clauses.push("is_active = ?");
            binds.push(Bind::Int(0));
        }
        Some(other) => {
            return Err(format!(
                "isActive must be 'true', 'false' or 'all', got '{}'",
                other
            ));
        }
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    Ok((where_sql, binds))
}

pub async fn list_devices(
    state: web::Data<AppState>,
    query: web::Query<DeviceListQuery>,
) -> impl Responder {
    let (where_sql, binds) = match device_filter_clauses(&query) {
        Ok(parts) => parts,
        Err(message) => {
            return HttpResponse::BadRequest().json(serde_json::json!({ "error": message }));
        }
    };
    let (page, limit) = clamp_paging(query.page, query.limit);

    // Exact count for pagination metadata
    let count_sql = format!("SELECT COUNT(*) FROM devices{}", where_sql);
    let total_items = match bind_all(
        sqlx::query_as::<_, (i64,)>(&count_sql),
        &binds,
    )
    .fetch_one(&state.db)
    .await
    {
        Ok((count,)) => count,
        Err(e) => {
            tracing::error!("Failed to count devices: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to count devices: {}", e)
            }));
        }
    };

    let page_sql = format!(
        "SELECT {} FROM devices{} ORDER BY created_at DESC, id LIMIT {} OFFSET {}",
        DEVICE_COLUMNS,
        where_sql,
        limit,
        offset(page, limit)
    );
    let rows = match bind_all(sqlx::query_as::<_, DeviceRow>(&page_sql), &binds)
        .fetch_all(&state.db)
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!("Failed to list devices: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to list devices: {}", e)
            }));
        }
    };

    let devices: Vec<Device> = rows.into_iter().map(Device::from).collect();
    HttpResponse::Ok().json(Page::new(devices, page, limit, total_items))
}

pub async fn get_device(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();

    let sql = format!("SELECT {} FROM devices WHERE id = ?", DEVICE_COLUMNS);
    let row = match sqlx::query_as::<_, DeviceRow>(&sql)
        .bind(&id)
        .fetch_optional(&state.db)
        .await
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("Device '{}' not found", id)
            }));
        }
        Err(e) => {
            tracing::error!("Failed to fetch device: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to fetch device: {}", e)
            }));
        }
    };

    let scans = match fetch_recent_for_device(&state.db, &id, 5).await {
        Ok(scans) => scans,
        Err(e) => {
            tracing::error!("Failed to fetch recent scans for device {}: {}", id, e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to fetch recent scans: {}", e)
            }));
        }
    };

    HttpResponse::Ok().json(DeviceDetail {
        device: Device::from(row),
        scans,
    })
}

pub async fn create_device(
    state: web::Data<AppState>,
    req: web::Json<CreateDeviceRequest>,
) -> impl Responder {
    if req.name.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Device name is required"
        }));
    }
    if req.ip_address.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Device IP address is required"
        }));
    }

    let now = time::now();
    let device = Device {
        id: format!("device-{}", Uuid::new_v4()),
        name: req.name.trim().to_string(),
        brand: req.brand.clone(),
        model: req.model.clone(),
        version: req.version.clone(),
        location: req.location.clone(),
        ip_address: req.ip_address.trim().to_string(),
        mac_address: req.mac_address.clone(),
        os: req.os.clone(),
        os_version: req.os_version.clone(),
        is_active: req.is_active.unwrap_or(true),
        last_seen: now.clone(),
        created_at: now.clone(),
        updated_at: now,
        tags: req.tags.clone(),
    };

    match insert_device(&state.db, &device).await {
        Ok(()) => {
            tracing::info!("Created device {} ({})", device.name, device.id);
            HttpResponse::Ok().json(device)
        }
        Err(e) => {
            tracing::error!("Failed to create device: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to create device: {}", e)
            }))
        }
    }
}

pub async fn update_device(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<UpdateDeviceRequest>,
) -> impl Responder {
    let id = path.into_inner();

    let sql = format!("SELECT {} FROM devices WHERE id = ?", DEVICE_COLUMNS);
    let existing = match sqlx::query_as::<_, DeviceRow>(&sql)
        .bind(&id)
        .fetch_optional(&state.db)
        .await
    {
        Ok(Some(row)) => Device::from(row),
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("Device '{}' not found", id)
            }));
        }
        Err(e) => {
            tracing::error!("Failed to fetch device: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to fetch device: {}", e)
            }));
        }
    };

    let req = req.into_inner();
    let updated = Device {
        id: existing.id,
        name: req.name.unwrap_or(existing.name),
        brand: req.brand.unwrap_or(existing.brand),
        model: req.model.unwrap_or(existing.model),
        version: req.version.unwrap_or(existing.version),
        location: req.location.unwrap_or(existing.location),
        ip_address: req.ip_address.unwrap_or(existing.ip_address),
        mac_address: req.mac_address.unwrap_or(existing.mac_address),
        os: req.os.unwrap_or(existing.os),
        os_version: req.os_version.unwrap_or(existing.os_version),
        is_active: req.is_active.unwrap_or(existing.is_active),
        last_seen: existing.last_seen,
        created_at: existing.created_at,
        updated_at: time::now(),
        tags: req.tags.unwrap_or(existing.tags),
    };

    let tags_json = serde_json::to_string(&updated.tags).unwrap_or_else(|_| "[]".to_string());
    let result = sqlx::query(
        "UPDATE devices SET name = ?, brand = ?, model = ?, version = ?, location = ?,
                ip_address = ?, mac_address = ?, os = ?, os_version = ?, is_active = ?,
                updated_at = ?, tags = ?
         WHERE id = ?",
    )
    .bind(&updated.name)
    .bind(&updated.brand)
    .bind(&updated.model)
    .bind(&updated.version)
    .bind(&updated.location)
    .bind(&updated.ip_address)
    .bind(&updated.mac_address)
    .bind(&updated.os)
    .bind(&updated.os_version)
    .bind(updated.is_active as i64)
    .bind(&updated.updated_at)
    .bind(&tags_json)
    .bind(&updated.id)
    .execute(&state.db)
    .await;

    match result {
        Ok(_) => HttpResponse::Ok().json(updated),
        Err(e) => {
            tracing::error!("Failed to update device: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to update device: {}", e)
            }))
        }
    }
}

pub async fn list_brands(state: web::Data<AppState>) -> impl Responder {
    match sqlx::query_scalar::<_, String>("SELECT DISTINCT brand FROM devices ORDER BY brand")
        .fetch_all(&state.db)
        .await
    {
        Ok(brands) => HttpResponse::Ok().json(brands),
        Err(e) => {
            tracing::error!("Failed to list brands: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to list brands: {}", e)
            }))
        }
    }
}

pub async fn list_locations(state: web::Data<AppState>) -> impl Responder {
    match sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT location FROM devices WHERE location != '' ORDER BY location",
    )
    .fetch_all(&state.db)
    .await
    {
        Ok(locations) => HttpResponse::Ok().json(locations),
        Err(e) => {
            tracing::error!("Failed to list locations: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to list locations: {}", e)
            }))
        }
    }
}

/// Insert one device row. Shared with first-run seeding.
pub(crate) async fn insert_device(pool: &Pool<Sqlite>, device: &Device) -> sqlx::Result<()> {
    let tags_json = serde_json::to_string(&device.tags).unwrap_or_else(|_| "[]".to_string());
    sqlx::query(
        "INSERT INTO devices (id, name, brand, model, version, location, ip_address,
                              mac_address, os, os_version, is_active, last_seen,
                              created_at, updated_at, tags)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&device.id)
    .bind(&device.name)
    .bind(&device.brand)
    .bind(&device.model)
    .bind(&device.version)
    .bind(&device.location)
    .bind(&device.ip_address)
    .bind(&device.mac_address)
    .bind(&device.os)
    .bind(&device.os_version)
    .bind(device.is_active as i64)
    .bind(&device.last_seen)
    .bind(&device.created_at)
    .bind(&device.updated_at)
    .bind(&tags_json)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch one device as the core model. Shared with the scan trigger path.
pub(crate) async fn fetch_device(
    pool: &Pool<Sqlite>,
    id: &str,
) -> sqlx::Result<Option<Device>> {
    let sql = format!("SELECT {} FROM devices WHERE id = ?", DEVICE_COLUMNS);
    let row = sqlx::query_as::<_, DeviceRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Device::from))
}
