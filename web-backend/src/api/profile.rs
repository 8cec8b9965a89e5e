use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use vulnwatch_core::time;

use crate::state::AppState;

/// The backend tracks a single operator profile row, keyed `user-1`.
const PROFILE_ID: &str = "user-1";

#[derive(FromRow)]
pub struct ProfileRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ProfileRow> for ProfileRecord {
    fn from(row: ProfileRow) -> Self {
        ProfileRecord {
            id: row.id,
            name: row.name,
            email: row.email,
            role: row.role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

pub fn configure_profile_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(get_profile)) // GET /api/profile
        .route("", web::put().to(update_profile)); // PUT /api/profile
}

async fn fetch_profile(pool: &sqlx::Pool<sqlx::Sqlite>) -> sqlx::Result<Option<ProfileRow>> {
    sqlx::query_as::<_, ProfileRow>(
        "SELECT id, name, email, role, created_at, updated_at FROM user_profile WHERE id = ?",
    )
    .bind(PROFILE_ID)
    .fetch_optional(pool)
    .await
}

pub async fn get_profile(state: web::Data<AppState>) -> impl Responder {
    match fetch_profile(&state.db).await {
        Ok(Some(row)) => HttpResponse::Ok().json(ProfileRecord::from(row)),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Profile not found"
        })),
        Err(e) => {
            tracing::error!("Failed to fetch profile: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to fetch profile: {}", e)
            }))
        }
    }
}

pub async fn update_profile(
    state: web::Data<AppState>,
    req: web::Json<UpdateProfileRequest>,
) -> impl Responder {
    if let Some(email) = &req.email {
        if !email.contains('@') {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Invalid email address '{}'", email)
            }));
        }
    }
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Name must not be empty"
            }));
        }
    }

    let existing = match fetch_profile(&state.db).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "Profile not found"
            }));
        }
        Err(e) => {
            tracing::error!("Failed to fetch profile: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to fetch profile: {}", e)
            }));
        }
    };

    let name = req.name.clone().unwrap_or(existing.name);
    let email = req.email.clone().unwrap_or(existing.email);
    let role = req.role.clone().unwrap_or(existing.role);
    let updated_at = time::now();

    let result = sqlx::query(
        "UPDATE user_profile SET name = ?, email = ?, role = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(&email)
    .bind(&role)
    .bind(&updated_at)
    .bind(PROFILE_ID)
    .execute(&state.db)
    .await;

    match result {
        Ok(_) => HttpResponse::Ok().json(ProfileRecord {
            id: existing.id,
            name,
            email,
            role,
            created_at: existing.created_at,
            updated_at,
        }),
        Err(e) => {
            tracing::error!("Failed to update profile: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to update profile: {}", e)
            }))
        }
    }
}
