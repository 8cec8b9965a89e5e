use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use vulnwatch_core::AiSuggestion;

use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationRequest {
    pub vulnerability_description: String,
    pub device_information: String,
}

/// Suggestion payload plus the degradation marker, so the caller can tell a
/// genuine model answer from the static fallback.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationResponse {
    #[serde(flatten)]
    pub suggestion: AiSuggestion,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

pub fn configure_ai_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/remediation", web::post().to(suggest_remediation)); // POST /api/ai/remediation
}

pub async fn suggest_remediation(
    state: web::Data<AppState>,
    req: web::Json<RemediationRequest>,
) -> impl Responder {
    if req.vulnerability_description.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "vulnerabilityDescription is required"
        }));
    }

    let outcome = state
        .ai
        .suggest_remediation(&req.vulnerability_description, &req.device_information)
        .await;

    let degraded = outcome.is_degraded();
    let degraded_reason = outcome.reason().map(|r| r.to_string());

    HttpResponse::Ok().json(RemediationResponse {
        suggestion: outcome.into_payload(),
        degraded,
        degraded_reason,
    })
}
