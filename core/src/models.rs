// Domain model shared between the scan engine, the AI client and the web API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Ordinal risk classification of a finding. Ordering follows risk,
/// so `Severity::Critical` compares greater than every other variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Informational => "informational",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// All severities from highest to lowest risk.
    pub fn all() -> [Severity; 5] {
        [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Informational,
        ]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "informational" => Ok(Severity::Informational),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(CoreError::Parse(format!("unknown severity '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Full,
    Local,
    Web,
    Ai,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Full => "full",
            ScanType::Local => "local",
            ScanType::Web => "web",
            ScanType::Ai => "ai",
        }
    }

    /// Whether completion of this scan type invokes the AI summarizer.
    pub fn wants_ai_summary(&self) -> bool {
        matches!(self, ScanType::Web | ScanType::Ai)
    }

    /// Whether completion of this scan type invokes the AI report enhancer.
    pub fn wants_ai_enhancement(&self) -> bool {
        matches!(self, ScanType::Ai)
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ScanType::Full),
            "local" => Ok(ScanType::Local),
            "web" => Ok(ScanType::Web),
            "ai" => Ok(ScanType::Ai),
            other => Err(CoreError::Parse(format!("unknown scan type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::InProgress => "in_progress",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal scans are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled
        )
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "in_progress" => Ok(ScanStatus::InProgress),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            "cancelled" => Ok(ScanStatus::Cancelled),
            other => Err(CoreError::Parse(format!("unknown scan status '{}'", other))),
        }
    }
}

/// Workflow state of a single finding within a scan's results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    Open,
    Closed,
    Ignored,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingStatus::Open => "open",
            FindingStatus::Closed => "closed",
            FindingStatus::Ignored => "ignored",
        }
    }
}

impl fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FindingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(FindingStatus::Open),
            "closed" => Ok(FindingStatus::Closed),
            "ignored" => Ok(FindingStatus::Ignored),
            other => Err(CoreError::Parse(format!(
                "unknown finding status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Once,
    Daily,
    Weekly,
    Monthly,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Once => "once",
            ScheduleType::Daily => "daily",
            ScheduleType::Weekly => "weekly",
            ScheduleType::Monthly => "monthly",
        }
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(ScheduleType::Once),
            "daily" => Ok(ScheduleType::Daily),
            "weekly" => Ok(ScheduleType::Weekly),
            "monthly" => Ok(ScheduleType::Monthly),
            other => Err(CoreError::Parse(format!(
                "unknown schedule type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ScanCompleted,
    CriticalAlert,
    ReportReady,
    SystemUpdate,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ScanCompleted => "scan_completed",
            NotificationKind::CriticalAlert => "critical_alert",
            NotificationKind::ReportReady => "report_ready",
            NotificationKind::SystemUpdate => "system_update",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan_completed" => Ok(NotificationKind::ScanCompleted),
            "critical_alert" => Ok(NotificationKind::CriticalAlert),
            "report_ready" => Ok(NotificationKind::ReportReady),
            "system_update" => Ok(NotificationKind::SystemUpdate),
            other => Err(CoreError::Parse(format!(
                "unknown notification kind '{}'",
                other
            ))),
        }
    }
}

/// A network device tracked in the inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub model: String,
    /// Firmware version of the device itself.
    pub version: String,
    pub location: String,
    pub ip_address: String,
    pub mac_address: String,
    pub os: String,
    pub os_version: String,
    pub is_active: bool,
    pub last_seen: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A catalog entry describing a known vulnerability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityDef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cve_id: Option<String>,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_software: Option<String>,
}

/// A single issue reported by a scan engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulnerability_id: Option<String>,
    pub finding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub severity: Severity,
    pub status: FindingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_confidence_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_suggested_remediation: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_by_risk() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Informational);
    }

    #[test]
    fn enums_round_trip_through_strings() {
        for sev in Severity::all() {
            assert_eq!(sev.as_str().parse::<Severity>().unwrap(), sev);
        }
        for status in [
            ScanStatus::Pending,
            ScanStatus::InProgress,
            ScanStatus::Completed,
            ScanStatus::Failed,
            ScanStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ScanStatus>().unwrap(), status);
        }
        assert_eq!("ai".parse::<ScanType>().unwrap(), ScanType::Ai);
        assert!("bogus".parse::<ScanType>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        assert_eq!(
            serde_json::to_string(&ScanStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&NotificationKind::CriticalAlert).unwrap(),
            "\"critical_alert\""
        );
        assert_eq!(
            serde_json::to_string(&Severity::Informational).unwrap(),
            "\"informational\""
        );
    }

    #[test]
    fn ai_hooks_follow_scan_type() {
        assert!(ScanType::Ai.wants_ai_summary());
        assert!(ScanType::Web.wants_ai_summary());
        assert!(!ScanType::Full.wants_ai_summary());
        assert!(ScanType::Ai.wants_ai_enhancement());
        assert!(!ScanType::Web.wants_ai_enhancement());
    }
}
