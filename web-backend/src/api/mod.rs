use actix_web::{web, Scope};
use sqlx::Sqlite;

pub mod ai;
pub mod dashboard;
pub mod devices;
pub mod notifications;
pub mod profile;
pub mod reports;
pub mod scans;
pub mod schedules;

pub fn create_api_router() -> Scope {
    web::scope("/api")
        .service(device_routes())
        .service(scan_routes())
        .service(dashboard_routes())
        .service(ai_routes())
        .service(report_routes())
        .service(schedule_routes())
        .service(notification_routes())
        .service(profile_routes())
}

fn device_routes() -> Scope {
    web::scope("/devices").configure(devices::configure_device_routes)
}

fn scan_routes() -> Scope {
    web::scope("/scans").configure(scans::configure_scan_routes)
}

fn dashboard_routes() -> Scope {
    web::scope("/dashboard").configure(dashboard::configure_dashboard_routes)
}

fn ai_routes() -> Scope {
    web::scope("/ai").configure(ai::configure_ai_routes)
}

fn report_routes() -> Scope {
    web::scope("/reports").configure(reports::configure_report_routes)
}

fn schedule_routes() -> Scope {
    web::scope("/schedules").configure(schedules::configure_schedule_routes)
}

fn notification_routes() -> Scope {
    web::scope("/notifications").configure(notifications::configure_notification_routes)
}

fn profile_routes() -> Scope {
    web::scope("/profile").configure(profile::configure_profile_routes)
}

/// SQL bind value for dynamically assembled filter clauses.
pub(crate) enum Bind {
    Text(String),
    Int(i64),
}

/// Apply collected bind values to a query in clause order.
pub(crate) fn bind_all<'q, O>(
    mut query: sqlx::query::QueryAs<'q, Sqlite, O, sqlx::sqlite::SqliteArguments<'q>>,
    binds: &'q [Bind],
) -> sqlx::query::QueryAs<'q, Sqlite, O, sqlx::sqlite::SqliteArguments<'q>> {
    for bind in binds {
        query = match bind {
            Bind::Text(v) => query.bind(v.as_str()),
            Bind::Int(v) => query.bind(*v),
        };
    }
    query
}
