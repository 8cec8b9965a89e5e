// Scan lifecycle driver. Each triggered scan runs as one spawned task that
// walks the scan through pending -> in_progress -> completed, persists the
// findings, and records the user-facing notifications. Shutdown cancellation
// marks an in-flight scan as cancelled instead of abandoning it.

use sqlx::{Pool, Sqlite};
use tokio::time::sleep;
use uuid::Uuid;

use vulnwatch_core::{time, Device, Finding, FindingStatus, NotificationKind, ScanType, Severity};

use crate::api::notifications::insert_notification;
use crate::state::AppState;

/// Spawn the lifecycle task onto the startup runtime, not the calling HTTP
/// worker's. Worker runtimes stop with the server; the startup runtime lives
/// until `main` returns, so the task can still see the cancelled token and
/// record a `cancelled` status.
pub fn spawn_scan(state: AppState, scan_id: String, device: Device, scan_type: ScanType) {
    let tracker = state.tasks.clone();
    let runtime = state.runtime.clone();
    tracker.spawn_on(
        async move {
            if let Err(e) = run_scan(&state, &scan_id, &device, scan_type).await {
                tracing::error!("Scan {} lifecycle failed: {}", scan_id, e);
                if let Err(e) = mark_failed(&state.db, &scan_id).await {
                    tracing::error!("Failed to mark scan {} as failed: {}", scan_id, e);
                }
            }
        },
        &runtime,
    );
}

async fn run_scan(
    state: &AppState,
    scan_id: &str,
    device: &Device,
    scan_type: ScanType,
) -> anyhow::Result<()> {
    // Phase 1: pending -> in_progress
    tokio::select! {
        _ = state.shutdown.cancelled() => {
            mark_cancelled(&state.db, scan_id).await?;
            return Ok(());
        }
        _ = sleep(state.config.scan_start_delay) => {}
    }

    let started = sqlx::query(
        "UPDATE scans SET status = 'in_progress', started_at = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(time::now())
    .bind(scan_id)
    .execute(&state.db)
    .await?;
    if started.rows_affected() == 0 {
        tracing::warn!("Scan {} no longer pending, lifecycle stops", scan_id);
        return Ok(());
    }
    tracing::info!("Scan {} is in_progress", scan_id);

    // Phase 2: assessment
    tokio::select! {
        _ = state.shutdown.cancelled() => {
            mark_cancelled(&state.db, scan_id).await?;
            return Ok(());
        }
        _ = sleep(state.config.scan_run_delay) => {}
    }

    let findings = state.engine.run(device).await;
    let open_count = findings
        .iter()
        .filter(|f| f.status == FindingStatus::Open)
        .count() as i64;
    let has_open_critical = findings
        .iter()
        .any(|f| f.status == FindingStatus::Open && f.severity == Severity::Critical);

    // AI post-processing. Degradation never fails the scan; the scan
    // completes with the fallback payload.
    let findings_json = serde_json::to_string(&findings)?;
    let summary;
    let mut ai_analysis: Option<String> = None;

    if scan_type.wants_ai_summary() {
        let outcome = state.ai.summarize_findings(&findings_json).await;
        if let Some(reason) = outcome.reason() {
            tracing::warn!("Scan {} completed with degraded AI summary: {}", scan_id, reason);
        }
        summary = outcome.into_payload().summary;

        if scan_type.wants_ai_enhancement() {
            let outcome = state.ai.enhance_report(&findings_json).await;
            if let Some(reason) = outcome.reason() {
                tracing::warn!(
                    "Scan {} completed with degraded AI enhancement: {}",
                    scan_id,
                    reason
                );
            }
            ai_analysis = Some(serde_json::to_string(outcome.payload())?);
        }
    } else {
        summary = format!(
            "Scan completed. Found {} open vulnerabilities.",
            open_count
        );
    }

    // Persist results and completion in one transaction.
    let completed_at = time::now();
    let mut tx = state.db.begin().await?;

    for finding in &findings {
        insert_scan_result(&mut tx, scan_id, finding, &completed_at).await?;
    }

    let completed = sqlx::query(
        "UPDATE scans SET status = 'completed', completed_at = ?, summary = ?,
                ai_analysis = ?, vulnerabilities_found = ?
         WHERE id = ? AND status = 'in_progress'",
    )
    .bind(&completed_at)
    .bind(&summary)
    .bind(&ai_analysis)
    .bind(open_count)
    .bind(scan_id)
    .execute(&mut *tx)
    .await?;
    if completed.rows_affected() == 0 {
        tracing::warn!("Scan {} left in_progress during assessment, dropping results", scan_id);
        tx.rollback().await?;
        return Ok(());
    }

    tx.commit().await?;
    tracing::info!(
        "Scan {} completed with {} findings ({} open)",
        scan_id,
        findings.len(),
        open_count
    );

    // The device answered a scan, so it was seen just now.
    sqlx::query("UPDATE devices SET last_seen = ? WHERE id = ?")
        .bind(&completed_at)
        .bind(&device.id)
        .execute(&state.db)
        .await?;

    let link = format!("/scans/{}", scan_id);
    insert_notification(
        &state.db,
        NotificationKind::ScanCompleted,
        &format!("Scan completed on {}", device.name),
        &format!(
            "{} scan finished with {} open findings.",
            scan_type, open_count
        ),
        Some(&link),
    )
    .await?;

    if has_open_critical {
        insert_notification(
            &state.db,
            NotificationKind::CriticalAlert,
            &format!("Critical vulnerability on {}", device.name),
            "An open critical-severity finding was reported. Immediate review recommended.",
            Some(&link),
        )
        .await?;
    }

    Ok(())
}

async fn insert_scan_result(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    scan_id: &str,
    finding: &Finding,
    created_at: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO scan_results (id, scan_id, vulnerability_id, finding, details,
                                   severity, status, ai_confidence_score,
                                   ai_suggested_remediation, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(format!("scanresult-{}", Uuid::new_v4()))
    .bind(scan_id)
    .bind(&finding.vulnerability_id)
    .bind(&finding.finding)
    .bind(&finding.details)
    .bind(finding.severity.as_str())
    .bind(finding.status.as_str())
    .bind(finding.ai_confidence_score)
    .bind(&finding.ai_suggested_remediation)
    .bind(created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn mark_cancelled(pool: &Pool<Sqlite>, scan_id: &str) -> sqlx::Result<()> {
    let result = sqlx::query(
        "UPDATE scans SET status = 'cancelled', completed_at = ?
         WHERE id = ? AND status IN ('pending', 'in_progress')",
    )
    .bind(time::now())
    .bind(scan_id)
    .execute(pool)
    .await?;
    if result.rows_affected() > 0 {
        tracing::info!("Scan {} cancelled by shutdown", scan_id);
    }
    Ok(())
}

async fn mark_failed(pool: &Pool<Sqlite>, scan_id: &str) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE scans SET status = 'failed', completed_at = ?
         WHERE id = ? AND status IN ('pending', 'in_progress')",
    )
    .bind(time::now())
    .bind(scan_id)
    .execute(pool)
    .await?;
    Ok(())
}
