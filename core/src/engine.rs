// Scan engine interface and the simulated implementation.

use async_trait::async_trait;
use rand::Rng;

use crate::catalog::known_vulnerabilities;
use crate::models::{Device, Finding, FindingStatus};

/// A scan engine assesses one device and reports its findings.
/// Engines are injected into the application state so the lifecycle
/// driver never depends on a concrete implementation.
#[async_trait]
pub trait ScanEngine: Send + Sync {
    /// Engine name, recorded for diagnostics.
    fn name(&self) -> String;

    /// Assess a single device and return the findings.
    async fn run(&self, device: &Device) -> Vec<Finding>;
}

/// Simulated engine: draws between zero and four findings per run from the
/// known-vulnerability catalog. Inactive devices always yield nothing.
pub struct SimulatedEngine;

impl Default for SimulatedEngine {
    fn default() -> Self {
        SimulatedEngine
    }
}

const STATUS_CYCLE: [FindingStatus; 3] = [
    FindingStatus::Open,
    FindingStatus::Closed,
    FindingStatus::Ignored,
];

const REMEDIATION_HINT: &str =
    "Update firmware to the latest vendor-supplied version. Refer to vendor advisory.";

#[async_trait]
impl ScanEngine for SimulatedEngine {
    fn name(&self) -> String {
        "SimulatedEngine".to_string()
    }

    async fn run(&self, device: &Device) -> Vec<Finding> {
        if !device.is_active {
            tracing::debug!("Device {} is inactive, skipping assessment", device.id);
            return Vec::new();
        }

        let catalog = known_vulnerabilities();
        let mut rng = rand::thread_rng();
        let count = rng.gen_range(0..=4);

        (0..count)
            .map(|i| {
                let vuln = &catalog[i % catalog.len()];
                Finding {
                    vulnerability_id: Some(vuln.id.clone()),
                    finding: vuln.name.clone(),
                    details: Some(vuln.description.clone()),
                    severity: vuln.severity,
                    status: STATUS_CYCLE[i % STATUS_CYCLE.len()],
                    ai_confidence_score: rng.gen_bool(0.5).then(|| rng.gen::<f64>()),
                    ai_suggested_remediation: rng
                        .gen_bool(0.5)
                        .then(|| REMEDIATION_HINT.to_string()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::seed_devices;

    fn active_device() -> Device {
        let mut device = seed_devices(2).remove(1);
        device.is_active = true;
        device
    }

    #[tokio::test]
    async fn inactive_devices_yield_no_findings() {
        let mut device = active_device();
        device.is_active = false;

        let findings = SimulatedEngine.run(&device).await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn findings_reference_catalog_entries() {
        let device = active_device();
        let catalog = known_vulnerabilities();

        // Randomized count, so sample a few runs.
        for _ in 0..10 {
            let findings = SimulatedEngine.run(&device).await;
            assert!(findings.len() <= 4);
            for finding in findings {
                let id = finding.vulnerability_id.expect("catalog-backed finding");
                assert!(catalog.iter().any(|v| v.id == id));
                if let Some(score) = finding.ai_confidence_score {
                    assert!((0.0..=1.0).contains(&score));
                }
            }
        }
    }
}
