use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Pool, Sqlite};
use uuid::Uuid;

use vulnwatch_core::{time, NotificationKind};

use crate::pagination::{clamp_paging, offset, Page};
use crate::state::AppState;

#[derive(FromRow)]
pub struct NotificationRow {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub is_read: i64,
    pub link: Option<String>,
    pub created_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub created_at: String,
}

impl From<NotificationRow> for NotificationRecord {
    fn from(row: NotificationRow) -> Self {
        NotificationRecord {
            id: row.id,
            kind: row.kind,
            title: row.title,
            message: row.message,
            is_read: row.is_read != 0,
            link: row.link,
            created_at: row.created_at,
        }
    }
}

/// Paginated notification list plus the global unread total the
/// notification bell renders.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    #[serde(flatten)]
    pub page: Page<NotificationRecord>,
    pub unread_count: i64,
}

#[derive(Deserialize)]
pub struct NotificationListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub fn configure_notification_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(list_notifications)) // GET    /api/notifications
        .route("/read-all", web::post().to(mark_all_read)) // POST   /api/notifications/read-all
        .route("/{id}/read", web::post().to(mark_read)) // POST   /api/notifications/{id}/read
        .route("/{id}", web::delete().to(delete_notification)); // DELETE /api/notifications/{id}
}

pub async fn list_notifications(
    state: web::Data<AppState>,
    query: web::Query<NotificationListQuery>,
) -> impl Responder {
    let where_sql = match query.status.as_deref() {
        None | Some("") | Some("all") => "",
        Some("read") => " WHERE is_read = 1",
        Some("unread") => " WHERE is_read = 0",
        Some(other) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("status must be 'read', 'unread' or 'all', got '{}'", other)
            }));
        }
    };
    let (page, limit) = clamp_paging(query.page, query.limit);

    let count_sql = format!("SELECT COUNT(*) FROM notifications{}", where_sql);
    let total_items = match sqlx::query_scalar::<_, i64>(&count_sql)
        .fetch_one(&state.db)
        .await
    {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("Failed to count notifications: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to count notifications: {}", e)
            }));
        }
    };

    let unread_count = match sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE is_read = 0",
    )
    .fetch_one(&state.db)
    .await
    {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("Failed to count unread notifications: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to count unread notifications: {}", e)
            }));
        }
    };

    let page_sql = format!(
        "SELECT id, kind, title, message, is_read, link, created_at
         FROM notifications{} ORDER BY created_at DESC, id LIMIT {} OFFSET {}",
        where_sql,
        limit,
        offset(page, limit)
    );
    let rows = match sqlx::query_as::<_, NotificationRow>(&page_sql)
        .fetch_all(&state.db)
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!("Failed to list notifications: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to list notifications: {}", e)
            }));
        }
    };

    let data: Vec<NotificationRecord> = rows.into_iter().map(NotificationRecord::from).collect();
    HttpResponse::Ok().json(NotificationPage {
        page: Page::new(data, page, limit, total_items),
        unread_count,
    })
}

pub async fn mark_read(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();

    match sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await
    {
        Ok(result) if result.rows_affected() == 0 => {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("Notification '{}' not found", id)
            }))
        }
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "message": "Notification marked as read" })),
        Err(e) => {
            tracing::error!("Failed to mark notification read: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to mark notification read: {}", e)
            }))
        }
    }
}

pub async fn mark_all_read(state: web::Data<AppState>) -> impl Responder {
    match sqlx::query("UPDATE notifications SET is_read = 1 WHERE is_read = 0")
        .execute(&state.db)
        .await
    {
        Ok(result) => HttpResponse::Ok().json(serde_json::json!({
            "message": "All notifications marked as read",
            "updated": result.rows_affected(),
        })),
        Err(e) => {
            tracing::error!("Failed to mark notifications read: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to mark notifications read: {}", e)
            }))
        }
    }
}

pub async fn delete_notification(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();

    match sqlx::query("DELETE FROM notifications WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await
    {
        Ok(result) if result.rows_affected() == 0 => {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("Notification '{}' not found", id)
            }))
        }
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "message": "Notification deleted" })),
        Err(e) => {
            tracing::error!("Failed to delete notification: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to delete notification: {}", e)
            }))
        }
    }
}

/// Record a user-facing event. Called by the scan lifecycle and the report
/// generator.
pub(crate) async fn insert_notification(
    pool: &Pool<Sqlite>,
    kind: NotificationKind,
    title: &str,
    message: &str,
    link: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO notifications (id, kind, title, message, is_read, link, created_at)
         VALUES (?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(format!("notification-{}", Uuid::new_v4()))
    .bind(kind.as_str())
    .bind(title)
    .bind(message)
    .bind(link)
    .bind(time::now())
    .execute(pool)
    .await?;
    Ok(())
}
