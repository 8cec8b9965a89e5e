use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::Result;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod lifecycle;
mod pagination;
mod state;
#[cfg(test)]
mod tests;

use api::create_api_router;
use config::Config;
use state::AppState;

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vulnwatch_web=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize state
    let config = Config::from_env();
    let bind_address = config.bind_address.clone();
    let state = AppState::new(config).await?;
    let app_state = state.clone();

    tracing::info!("VulnWatch server listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            // API routes
            .service(create_api_router())
            // Health check
            .route("/health", web::get().to(health_check))
    })
    .bind(&bind_address)?
    .run()
    .await?;

    // The workers are gone, but the lifecycle tasks run on this runtime.
    // Signal them so each in-flight scan records a cancelled status instead
    // of being dropped mid-transition, then drain them before exiting.
    tracing::info!("Shutting down, cancelling in-flight scans");
    state.shutdown.cancel();
    state.tasks.close();
    state.tasks.wait().await;

    Ok(())
}
