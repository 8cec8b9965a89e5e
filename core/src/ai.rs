// AI analysis adapter. Talks to an OpenAI-compatible chat completions API
// and parses the model output into one of three fixed payload shapes.
//
// No operation here ever hard-fails its caller: a network, status or parse
// error is reported as `AiOutcome::Degraded` carrying a low-confidence
// fallback payload, so callers can still distinguish nominal from degraded
// output without handling an error path.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Confidence score attached to every fallback payload. Kept well under the
/// 0.2 line that marks an answer as degraded.
pub const DEGRADED_CONFIDENCE: f64 = 0.1;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("API returned no completion content")]
    EmptyResponse,

    #[error("Failed to parse model output: {0}")]
    Parse(String),
}

/// Outcome of an AI operation. `Degraded` means the adapter substituted a
/// fallback payload and records why.
#[derive(Debug, Clone)]
pub enum AiOutcome<T> {
    Ok(T),
    Degraded(T, String),
}

impl<T> AiOutcome<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, AiOutcome::Degraded(..))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            AiOutcome::Ok(_) => None,
            AiOutcome::Degraded(_, reason) => Some(reason),
        }
    }

    pub fn payload(&self) -> &T {
        match self {
            AiOutcome::Ok(payload) | AiOutcome::Degraded(payload, _) => payload,
        }
    }

    pub fn into_payload(self) -> T {
        match self {
            AiOutcome::Ok(payload) | AiOutcome::Degraded(payload, _) => payload,
        }
    }
}

/// Remediation suggestion for a single vulnerability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSuggestion {
    pub remediation_steps: String,
    pub confidence_score: f64,
}

impl AiSuggestion {
    fn fallback(vulnerability_description: &str, device_information: &str) -> Self {
        AiSuggestion {
            remediation_steps: format!(
                "AI suggestion unavailable. Standard advice: 1. Identify affected firmware \
                 for {}.\n2. Check vendor advisories for a patch for '{}'.\n3. Apply the \
                 patch if available and test.\n4. Monitor device logs.",
                device_information, vulnerability_description
            ),
            confidence_score: DEGRADED_CONFIDENCE,
        }
    }
}

/// Executive-level enhancement of a full scan report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiEnhancement {
    pub executive_summary: String,
    pub prioritized_recommendations: String,
    pub confidence_score: f64,
}

impl AiEnhancement {
    fn fallback() -> Self {
        AiEnhancement {
            executive_summary: "AI enhancement unavailable. The scan report indicates \
                                potential vulnerabilities. Manual review is recommended."
                .to_string(),
            prioritized_recommendations: "1. Manually review all 'critical' and 'high' \
                                          severity findings.\n2. Cross-reference findings \
                                          with vendor documentation."
                .to_string(),
            confidence_score: DEGRADED_CONFIDENCE,
        }
    }
}

/// Short natural-language summary of a scan's findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSummary {
    pub summary: String,
    pub key_insights: String,
    pub confidence_score: f64,
}

impl AiSummary {
    fn fallback() -> Self {
        AiSummary {
            summary: "AI summary unavailable. The scan likely identified several findings. \
                      Please review the detailed results."
                .to_string(),
            key_insights: "- Manual review of scan results is necessary.".to_string(),
            confidence_score: DEGRADED_CONFIDENCE,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

const SYSTEM_PROMPT: &str = "You are a network security analyst for firewall \
    infrastructure. Reply with a single JSON object only, no prose and no \
    markdown fences, using exactly the keys requested.";

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct AiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with custom timeout, using default: {}", e);
                Client::new()
            });

        AiClient {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Suggest remediation steps for one vulnerability on one device.
    pub async fn suggest_remediation(
        &self,
        vulnerability_description: &str,
        device_information: &str,
    ) -> AiOutcome<AiSuggestion> {
        let user = format!(
            "Suggest remediation steps for the following vulnerability.\n\
             Vulnerability: {}\nDevice: {}\n\
             Respond with JSON keys \"remediationSteps\" (string) and \
             \"confidenceScore\" (number between 0 and 1).",
            vulnerability_description, device_information
        );

        match self.request::<AiSuggestion>(&user).await {
            Ok(mut payload) => {
                payload.confidence_score = clamp_confidence(payload.confidence_score);
                AiOutcome::Ok(payload)
            }
            Err(e) => {
                warn!("AI remediation suggestion degraded: {}", e);
                AiOutcome::Degraded(
                    AiSuggestion::fallback(vulnerability_description, device_information),
                    e.to_string(),
                )
            }
        }
    }

    /// Enhance a completed scan report with an executive summary and
    /// prioritized recommendations.
    pub async fn enhance_report(&self, scan_report: &str) -> AiOutcome<AiEnhancement> {
        let user = format!(
            "Enhance the following vulnerability scan report.\nReport JSON: {}\n\
             Respond with JSON keys \"executiveSummary\" (string), \
             \"prioritizedRecommendations\" (string) and \"confidenceScore\" \
             (number between 0 and 1).",
            scan_report
        );

        match self.request::<AiEnhancement>(&user).await {
            Ok(mut payload) => {
                payload.confidence_score = clamp_confidence(payload.confidence_score);
                AiOutcome::Ok(payload)
            }
            Err(e) => {
                warn!("AI report enhancement degraded: {}", e);
                AiOutcome::Degraded(AiEnhancement::fallback(), e.to_string())
            }
        }
    }

    /// Summarize the findings of a completed scan.
    pub async fn summarize_findings(&self, scan_data: &str) -> AiOutcome<AiSummary> {
        let user = format!(
            "Summarize the following vulnerability scan findings.\nFindings JSON: {}\n\
             Respond with JSON keys \"summary\" (string), \"keyInsights\" (string) \
             and \"confidenceScore\" (number between 0 and 1).",
            scan_data
        );

        match self.request::<AiSummary>(&user).await {
            Ok(mut payload) => {
                payload.confidence_score = clamp_confidence(payload.confidence_score);
                AiOutcome::Ok(payload)
            }
            Err(e) => {
                warn!("AI findings summary degraded: {}", e);
                AiOutcome::Degraded(AiSummary::fallback(), e.to_string())
            }
        }
    }

    async fn request<T: DeserializeOwned>(&self, user: &str) -> Result<T, AiError> {
        let content = self.complete(user).await?;
        extract_json(&content)
    }

    async fn complete(&self, user: &str) -> Result<String, AiError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            temperature: 0.2,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!("Sending completion request to {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AiError::EmptyResponse)
    }
}

fn clamp_confidence(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

/// Parse a JSON payload out of raw model output. Models occasionally wrap
/// the object in markdown fences or surrounding prose, so fall back to the
/// outermost brace pair when a direct parse fails.
fn extract_json<T: DeserializeOwned>(raw: &str) -> Result<T, AiError> {
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return Ok(value);
    }

    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            return serde_json::from_str::<T>(&trimmed[start..=end])
                .map_err(|e| AiError::Parse(e.to_string()));
        }
    }

    Err(AiError::Parse(format!(
        "no JSON object found in model output: {:?}",
        truncate(trimmed, 120)
    )))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_payload_from_fenced_output() {
        let raw = "```json\n{\"summary\": \"ok\", \"keyInsights\": \"-\", \
                   \"confidenceScore\": 0.8}\n```";
        let parsed: AiSummary = extract_json(raw).unwrap();
        assert_eq!(parsed.summary, "ok");
        assert!((parsed.confidence_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn extracts_payload_embedded_in_prose() {
        let raw = "Here is the analysis: {\"remediationSteps\": \"patch\", \
                   \"confidenceScore\": 1.4} hope that helps";
        let parsed: AiSuggestion = extract_json(raw).unwrap();
        assert_eq!(parsed.remediation_steps, "patch");
        // Clamping happens at the operation level, not in the parser.
        assert!(clamp_confidence(parsed.confidence_score) <= 1.0);
    }

    #[test]
    fn rejects_output_without_json() {
        let result: Result<AiSummary, _> = extract_json("no object here");
        assert!(matches!(result, Err(AiError::Parse(_))));
    }

    #[test]
    fn fallback_payloads_stay_under_degraded_line() {
        assert!(AiSuggestion::fallback("x", "y").confidence_score <= 0.2);
        assert!(AiEnhancement::fallback().confidence_score <= 0.2);
        assert!(AiSummary::fallback().confidence_score <= 0.2);
    }

    #[test]
    fn confidence_clamps_into_unit_interval() {
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(0.42), 0.42);
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_with_fallback() {
        // Nothing listens on port 1; the connection is refused immediately.
        let client = AiClient::new("http://127.0.0.1:1", "test-key", "test-model");
        let outcome = client.summarize_findings("[]").await;

        assert!(outcome.is_degraded());
        assert!(outcome.reason().is_some());
        assert!(outcome.payload().confidence_score <= 0.2);
    }
}
