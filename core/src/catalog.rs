// Static firewall catalog: brands, models, operating systems, the known
// vulnerability definitions and the deterministic inventory seed generator.

use chrono::{Duration, Utc};

use crate::models::{Device, Severity, VulnerabilityDef};
use crate::time;

const BRANDS: [&str; 5] = [
    "Cisco",
    "Palo Alto Networks",
    "Fortinet",
    "Juniper Networks",
    "Check Point",
];

const LOCATIONS: [&str; 4] = [
    "Data Center A",
    "Branch Office X",
    "DMZ Zone",
    "Cloud VPC Segment",
];

const TAG_SETS: [&[&str]; 3] = [
    &["core-network", "high-availability"],
    &["perimeter-security"],
    &["internal-segmentation"],
];

fn models_for(brand: &str) -> &'static [&'static str] {
    match brand {
        "Cisco" => &["ASA 5500-X", "Firepower 1000", "Meraki MX"],
        "Palo Alto Networks" => &["PA-220", "PA-800 Series", "PA-3200 Series"],
        "Fortinet" => &["FortiGate 60F", "FortiGate 100F", "FortiGate 1800F"],
        "Juniper Networks" => &["SRX300 Series", "SRX1500", "SRX4600"],
        "Check Point" => &[
            "Quantum Spark",
            "Quantum Security Gateway",
            "Maestro Hyperscale Orchestrator",
        ],
        _ => &["Generic Firewall"],
    }
}

fn os_for(brand: &str) -> &'static str {
    match brand {
        "Cisco" => "Cisco ASA Software",
        "Palo Alto Networks" => "PAN-OS",
        "Fortinet" => "FortiOS",
        "Juniper Networks" => "Junos OS",
        "Check Point" => "Gaia OS",
        _ => "Unknown OS",
    }
}

pub fn device_brands() -> Vec<&'static str> {
    BRANDS.to_vec()
}

pub fn device_locations() -> Vec<&'static str> {
    LOCATIONS.to_vec()
}

/// Known vulnerability definitions the simulated engine draws findings from.
pub fn known_vulnerabilities() -> Vec<VulnerabilityDef> {
    vec![
        VulnerabilityDef {
            id: "vuln-fw-1".into(),
            cve_id: Some("CVE-2023-20202".into()),
            name: "Cisco IOS XE Web UI Auth Bypass".into(),
            description: "A critical authentication bypass in Cisco IOS XE Web UI.".into(),
            severity: Severity::Critical,
            cvss_score: Some(9.8),
            affected_software: Some("Cisco IOS XE".into()),
        },
        VulnerabilityDef {
            id: "vuln-fw-2".into(),
            cve_id: Some("CVE-2022-30524".into()),
            name: "PAN-OS GlobalProtect Heap Overflow".into(),
            description: "A high severity heap overflow in Palo Alto Networks GlobalProtect."
                .into(),
            severity: Severity::High,
            cvss_score: Some(8.8),
            affected_software: Some("PAN-OS".into()),
        },
        VulnerabilityDef {
            id: "vuln-fw-3".into(),
            cve_id: None,
            name: "FortiOS Weak SSL/TLS Configuration".into(),
            description: "FortiGate device supports weak SSL/TLS ciphers.".into(),
            severity: Severity::Medium,
            cvss_score: Some(5.3),
            affected_software: Some("FortiOS".into()),
        },
        VulnerabilityDef {
            id: "vuln-fw-4".into(),
            cve_id: None,
            name: "Junos OS Default Credentials Active".into(),
            description: "Default credentials still active on Juniper SRX device.".into(),
            severity: Severity::High,
            cvss_score: Some(7.5),
            affected_software: Some("Junos OS".into()),
        },
        VulnerabilityDef {
            id: "vuln-fw-5".into(),
            cve_id: None,
            name: "Outdated Firmware - General".into(),
            description: "Device firmware is outdated and misses security patches.".into(),
            severity: Severity::Low,
            cvss_score: Some(3.5),
            affected_software: None,
        },
    ]
}

/// Generate a deterministic starter inventory of `n` firewall devices.
/// Every 6th device is inactive.
pub fn seed_devices(n: usize) -> Vec<Device> {
    let now = Utc::now();

    (0..n)
        .map(|i| {
            let brand = BRANDS[i % BRANDS.len()];
            let models = models_for(brand);
            let model = models[i % models.len()];

            let short_brand = brand.split_whitespace().next().unwrap_or(brand);
            let short_model = model.split_whitespace().next().unwrap_or(model);

            Device {
                id: format!("device-fw-{}", i + 1),
                name: format!("{} Firewall {}-{}", short_brand, short_model, 1000 + i),
                brand: brand.to_string(),
                model: model.to_string(),
                version: format!("{}.{}.{}", 1 + (i % 4), i % 10, i % 5),
                location: LOCATIONS[i % LOCATIONS.len()].to_string(),
                ip_address: format!("10.0.{}.{}", i % 255, 10 + (i % 200)),
                mac_address: format!("00:A1:B2:C3:D4:{:02X}", 10 + i),
                os: os_for(brand).to_string(),
                os_version: format!("{}.{}.{}", 9 + (i % 3), i % 5, i % 9),
                is_active: i % 6 != 0,
                last_seen: time::format(now - Duration::hours((i % 168) as i64)),
                created_at: time::format(now - Duration::days((i % 30) as i64)),
                updated_at: time::format(now),
                tags: TAG_SETS[i % TAG_SETS.len()]
                    .iter()
                    .map(|t| t.to_string())
                    .collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn seed_produces_requested_count_with_unique_ids() {
        let devices = seed_devices(55);
        assert_eq!(devices.len(), 55);

        let ids: HashSet<_> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids.len(), 55);
    }

    #[test]
    fn every_sixth_device_is_inactive() {
        let devices = seed_devices(55);
        for (i, device) in devices.iter().enumerate() {
            assert_eq!(device.is_active, i % 6 != 0, "device index {}", i);
        }
    }

    #[test]
    fn seeded_devices_use_catalog_brands_and_matching_os() {
        for device in seed_devices(20) {
            assert!(BRANDS.contains(&device.brand.as_str()));
            assert_eq!(device.os, os_for(&device.brand));
            assert!(models_for(&device.brand).contains(&device.model.as_str()));
        }
    }

    #[test]
    fn catalog_contains_a_critical_entry() {
        let vulns = known_vulnerabilities();
        assert!(vulns.iter().any(|v| v.severity == Severity::Critical));
        assert!(vulns
            .iter()
            .all(|v| v.cvss_score.map_or(true, |s| (0.0..=10.0).contains(&s))));
    }
}
