use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::ServiceCatalog;
use crate::types::{Finding, PortResult, ScanTarget};

/// A service whose version is older than the catalog's current one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OutdatedService {
    pub port: u16,
    pub service: String,
    pub found_version: String,
    pub current_version: String,
}

/// An open port with at least one finding.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MisconfiguredPort {
    pub port: u16,
    pub service: Option<String>,
    pub findings: Vec<Finding>,
}

/// Aggregate view over a completed scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub target: ScanTarget,
    pub open_ports: BTreeSet<u16>,
    pub outdated_services: Vec<OutdatedService>,
    pub misconfigured: Vec<MisconfiguredPort>,
}

impl ScanReport {
    /// Derive the report from per-port results.
    ///
    /// Results for ports outside the target's range are ignored and a port
    /// reported twice counts once (first occurrence wins). Entries are ordered
    /// by port.
    pub fn build(target: &ScanTarget, results: &[PortResult], catalog: &ServiceCatalog) -> Self {
        let mut by_port: BTreeMap<u16, &PortResult> = BTreeMap::new();
        for r in results.iter().filter(|r| target.contains(r.port)) {
            by_port.entry(r.port).or_insert(r);
        }

        let mut open_ports = BTreeSet::new();
        let mut outdated_services = Vec::new();
        let mut misconfigured = Vec::new();

        for (&port, result) in by_port.iter().filter(|(_, r)| r.open) {
            open_ports.insert(port);

            if let Some(info) = &result.service {
                if let Some(current) = catalog.outdated(&info.name, &info.version) {
                    outdated_services.push(OutdatedService {
                        port,
                        service: info.name.clone(),
                        found_version: info.version.clone(),
                        current_version: current.to_string(),
                    });
                }
            }

            if !result.findings.is_empty() {
                misconfigured.push(MisconfiguredPort {
                    port,
                    service: result.service_name().map(str::to_string),
                    findings: result.findings.clone(),
                });
            }
        }

        Self {
            target: target.clone(),
            open_ports,
            outdated_services,
            misconfigured,
        }
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = self.target.host();
        if self.open_ports.is_empty() {
            writeln!(
                f,
                "No open ports found on {host} in the range {}-{}",
                self.target.start(),
                self.target.end()
            )?;
        } else {
            let ports: Vec<String> = self.open_ports.iter().map(u16::to_string).collect();
            writeln!(f, "Open ports on {host}: {}", ports.join(", "))?;
        }

        if self.outdated_services.is_empty() {
            writeln!(f, "No outdated software versions detected.")?;
        } else {
            writeln!(f, "Outdated software versions detected:")?;
            for o in &self.outdated_services {
                writeln!(
                    f,
                    "  Port {}: {} {} (current: {})",
                    o.port, o.service, o.found_version, o.current_version
                )?;
            }
        }

        if self.misconfigured.is_empty() {
            write!(f, "No misconfigurations detected.")
        } else {
            write!(f, "Misconfigurations detected:")?;
            for m in &self.misconfigured {
                write!(
                    f,
                    "\n  Port {}: {}",
                    m.port,
                    m.service.as_deref().unwrap_or("unknown service")
                )?;
                for finding in &m.findings {
                    write!(f, "\n    {finding}")?;
                }
            }
            Ok(())
        }
    }
}
