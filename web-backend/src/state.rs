use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use vulnwatch_core::{AiClient, ScanEngine, SimulatedEngine};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Sqlite>,
    pub ai: Arc<AiClient>,
    pub engine: Arc<dyn ScanEngine>,
    pub config: Arc<Config>,
    /// Cancelled at shutdown; in-flight scan lifecycles watch it.
    pub shutdown: CancellationToken,
    /// Runtime the lifecycle tasks run on. Captured at startup so the tasks
    /// outlive the HTTP worker runtimes and can still observe `shutdown`.
    pub runtime: Handle,
    /// Tracks spawned lifecycle tasks so shutdown can drain them.
    pub tasks: TaskTracker,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db = init_db(&config.database_path).await?;
        seed_if_empty(&db).await?;

        let ai = Arc::new(AiClient::new(
            &config.ai_base_url,
            &config.ai_api_key,
            &config.ai_model,
        ));

        Ok(Self {
            db,
            ai,
            engine: Arc::new(SimulatedEngine),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
            runtime: Handle::current(),
            tasks: TaskTracker::new(),
        })
    }
}

async fn init_db(database_path: &str) -> anyhow::Result<Pool<Sqlite>> {
    // A pooled in-memory database would open one database per connection,
    // so memory mode pins the pool to a single connection.
    let (url, max_connections) = if database_path == ":memory:" {
        ("sqlite::memory:".to_string(), 1)
    } else {
        (format!("sqlite://{}", database_path), 5)
    };

    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    // Create tables
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            brand TEXT NOT NULL,
            model TEXT NOT NULL,
            version TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            ip_address TEXT NOT NULL,
            mac_address TEXT NOT NULL DEFAULT '',
            os TEXT NOT NULL DEFAULT '',
            os_version TEXT NOT NULL DEFAULT '',
            is_active INTEGER NOT NULL DEFAULT 1,
            last_seen TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS scans (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            device_name TEXT NOT NULL,
            scan_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            started_at TEXT,
            completed_at TEXT,
            summary TEXT,
            ai_analysis TEXT,
            vulnerabilities_found INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(device_id) REFERENCES devices(id)
        );

        CREATE TABLE IF NOT EXISTS scan_results (
            id TEXT PRIMARY KEY,
            scan_id TEXT NOT NULL,
            vulnerability_id TEXT,
            finding TEXT NOT NULL,
            details TEXT,
            severity TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            ai_confidence_score REAL,
            ai_suggested_remediation TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(scan_id) REFERENCES scans(id)
        );

        CREATE TABLE IF NOT EXISTS scheduled_scans (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            scan_type TEXT NOT NULL,
            schedule_type TEXT NOT NULL,
            cron_expression TEXT NOT NULL,
            next_run_at TEXT NOT NULL,
            last_run_at TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(device_id) REFERENCES devices(id)
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            link TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_profile (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(&pool)
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create tables: {}", e))?;

    Ok(pool)
}

/// First-run seeding: a starter device inventory and the profile row.
async fn seed_if_empty(pool: &Pool<Sqlite>) -> anyhow::Result<()> {
    let device_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices")
        .fetch_one(pool)
        .await?;

    if device_count == 0 {
        let devices = vulnwatch_core::seed_devices(55);
        for device in &devices {
            crate::api::devices::insert_device(pool, device).await?;
        }
        tracing::info!("Seeded {} devices into empty inventory", devices.len());
    }

    let now = vulnwatch_core::time::now();
    sqlx::query(
        "INSERT OR IGNORE INTO user_profile (id, name, email, role, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind("user-1")
    .bind("Security Admin")
    .bind("admin@example.com")
    .bind("administrator")
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}
