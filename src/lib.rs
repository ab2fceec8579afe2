//! Library crate for vuln-scan-rs exposing the scan pipeline and its building blocks.
pub mod banner;
pub mod catalog;
pub mod certificate;
pub mod checks;
pub mod config;
pub mod connector;
pub mod error;
pub mod logging;
pub mod report;
pub mod scanner;
pub mod types;

pub use catalog::ServiceCatalog;
pub use config::ScanConfig;
pub use connector::{ConnectError, Connector, TcpConnector};
pub use error::ScanError;
pub use report::ScanReport;
pub use scanner::Scanner;
pub use types::{Finding, PortResult, ScanTarget, ServiceInfo};
