// VulnWatch Core Library
// Domain model, device/vulnerability catalog, scan engine and AI client.

mod ai;
mod catalog;
mod engine;
mod models;

// Re-export the commonly used types
pub use ai::{AiClient, AiEnhancement, AiError, AiOutcome, AiSuggestion, AiSummary};
pub use catalog::{device_brands, device_locations, known_vulnerabilities, seed_devices};
pub use engine::{ScanEngine, SimulatedEngine};
pub use models::{
    Device, Finding, FindingStatus, NotificationKind, ScanStatus, ScanType, ScheduleType,
    Severity, VulnerabilityDef,
};

pub mod time {
    use chrono::{DateTime, Utc};

    /// Storage format for all timestamps. Plain UTC text keeps sqlite
    /// `datetime(...)` comparisons lexicographic-safe.
    pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn format(dt: DateTime<Utc>) -> String {
        dt.format(TS_FORMAT).to_string()
    }

    pub fn now() -> String {
        format(Utc::now())
    }
}

pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum CoreError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Parse error: {0}")]
        Parse(String),

        #[error("Engine error: {0}")]
        Engine(String),
    }

    pub type Result<T> = std::result::Result<T, CoreError>;
}
