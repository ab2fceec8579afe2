use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::banner::{grab_banner, parse_banner};
use crate::catalog::ServiceCatalog;
use crate::certificate::inspect_certificate;
use crate::checks::check_misconfigurations;
use crate::config::{ScanConfig, MAX_CONCURRENCY};
use crate::connector::Connector;
use crate::error::ScanError;
use crate::report::ScanReport;
use crate::types::{PortResult, ScanTarget};

/// Runs port scans through a [`Connector`].
///
/// Cloning is cheap; clones share the connector and configuration.
#[derive(Debug)]
pub struct Scanner<C> {
    connector: Arc<C>,
    config: Arc<ScanConfig>,
}

impl<C> Clone for Scanner<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            config: Arc::clone(&self.config),
        }
    }
}

impl<C: Connector> Scanner<C> {
    pub fn new(connector: C, config: ScanConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan the target's range and aggregate the results against `catalog`.
    pub async fn run(
        &self,
        target: &ScanTarget,
        catalog: &ServiceCatalog,
    ) -> Result<ScanReport, ScanError> {
        let results = self.scan(target).await?;
        Ok(ScanReport::build(target, &results, catalog))
    }

    /// Scan every port of the target's inclusive range with bounded concurrency.
    ///
    /// - Resolves the host once; an unresolvable host fails the whole scan.
    /// - Limits ports in flight using a `Semaphore` sized to the target's
    ///   concurrency, capped at [`MAX_CONCURRENCY`].
    /// - Returns exactly one result per port, ordered by port.
    /// - A port whose worker fails unexpectedly (error or panic) is reported closed.
    pub async fn scan(&self, target: &ScanTarget) -> Result<Vec<PortResult>, ScanError> {
        let addr: Arc<str> = Arc::from(self.resolve(target.host()).await?);
        let host: Arc<str> = Arc::from(target.host());
        let workers = target.concurrency().clamp(1, MAX_CONCURRENCY);
        let sem = Arc::new(Semaphore::new(workers));
        let mut set = JoinSet::new();

        debug!(
            "scanning {} ({}) ports {}-{} with {} workers",
            host,
            addr,
            target.start(),
            target.end(),
            workers
        );

        for port in target.ports() {
            let permit = sem
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore in scope");
            let scanner = self.clone();
            let host = Arc::clone(&host);
            let addr = Arc::clone(&addr);

            set.spawn(async move {
                let _permit = permit; // keep permit until task completes
                (port, scanner.scan_resolved(&host, &addr, port).await)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((port, Ok(result))) => {
                    results.insert(port, result);
                }
                Ok((port, Err(e))) => {
                    warn!("port {port}: {e}; reporting as closed");
                    results.insert(port, PortResult::closed(port));
                }
                Err(e) => warn!("scan task failed: {e}"),
            }
        }

        // Ports whose task panicked never reported back.
        for port in target.ports() {
            results.entry(port).or_insert_with(|| PortResult::closed(port));
        }
        Ok(results.into_values().collect())
    }

    /// Probe a single port.
    ///
    /// Timeouts and refusals give a closed result. An unresolvable host or any
    /// other connect failure is returned as an error. Once connected, every
    /// later step degrades to "nothing found" instead of failing.
    pub async fn scan_port(&self, host: &str, port: u16) -> Result<PortResult, ScanError> {
        let addr = self.resolve(host).await?;
        self.scan_resolved(host, &addr, port).await
    }

    async fn resolve(&self, host: &str) -> Result<String, ScanError> {
        self.connector
            .resolve(host)
            .await
            .map_err(|source| ScanError::UnresolvedHost {
                host: host.to_string(),
                source,
            })
    }

    /// Connections go to `addr`; `host` is kept for TLS name checks.
    async fn scan_resolved(
        &self,
        host: &str,
        addr: &str,
        port: u16,
    ) -> Result<PortResult, ScanError> {
        let config = &self.config;
        let banner = {
            let mut stream = match self.connector.connect(addr, port).await {
                Ok(stream) => stream,
                Err(e) if e.is_closed_port() => {
                    debug!("port {port} is closed: {e}");
                    return Ok(PortResult::closed(port));
                }
                Err(e) => return Err(e.into()),
            };
            grab_banner(&mut stream, config.io_timeout, config.banner_max_bytes).await
            // stream dropped here, before any follow-up probe connects
        };

        let service = banner.as_deref().and_then(parse_banner);
        match &service {
            Some(s) => info!("port {port} is open: {} {}", s.name, s.version),
            None => info!("port {port} is open"),
        }

        let mut findings = match &service {
            Some(s) => check_misconfigurations(&*self.connector, addr, port, &s.name, config).await,
            None => Vec::new(),
        };

        if config.is_tls_port(port) {
            findings.extend(inspect_certificate(&*self.connector, addr, host, port, config).await);
        }

        Ok(PortResult::open(port, service, findings))
    }
}
