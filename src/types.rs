use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Host and inclusive port range to probe, plus the number of ports probed at once.
///
/// Built once from user input and never mutated; `new` rejects anything the
/// coordinator could not dispatch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    host: String,
    start: u16,
    end: u16,
    concurrency: usize,
}

impl ScanTarget {
    pub fn new(
        host: impl Into<String>,
        start: u16,
        end: u16,
        concurrency: usize,
    ) -> Result<Self, ScanError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ScanError::EmptyHost);
        }
        if start == 0 {
            return Err(ScanError::InvalidPortRange {
                start,
                end,
                reason: "ports start at 1",
            });
        }
        if start > end {
            return Err(ScanError::InvalidPortRange {
                start,
                end,
                reason: "start is greater than end",
            });
        }
        if concurrency == 0 {
            return Err(ScanError::InvalidConcurrency);
        }
        Ok(Self {
            host,
            start,
            end,
            concurrency,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn ports(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports().contains(&port)
    }

    pub fn port_count(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }
}

/// Service name and version parsed from a banner. Both are always present together.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// A single issue detected on an open port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "description", rename_all = "snake_case")]
pub enum Finding {
    Misconfiguration(String),
    CertificateIssue(String),
}

impl Finding {
    pub fn description(&self) -> &str {
        match self {
            Finding::Misconfiguration(d) | Finding::CertificateIssue(d) => d,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Outcome of probing one port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortResult {
    pub port: u16,
    pub open: bool,
    pub service: Option<ServiceInfo>,
    pub findings: Vec<Finding>,
}

impl PortResult {
    /// Closed, filtered or otherwise uninformative port.
    pub fn closed(port: u16) -> Self {
        Self {
            port,
            open: false,
            service: None,
            findings: Vec::new(),
        }
    }

    pub fn open(port: u16, service: Option<ServiceInfo>, findings: Vec<Finding>) -> Self {
        Self {
            port,
            open: true,
            service,
            findings,
        }
    }

    pub fn service_name(&self) -> Option<&str> {
        self.service.as_ref().map(|s| s.name.as_str())
    }

    pub fn version(&self) -> Option<&str> {
        self.service.as_ref().map(|s| s.version.as_str())
    }
}
