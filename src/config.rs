use std::time::Duration;

/// Default number of ports probed at once.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Ports probed at once never exceed this, whatever the target asks for.
pub const MAX_CONCURRENCY: usize = 5_000;

/// Default bound for connect, send, receive and TLS handshake steps.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest banner or probe response read from a service.
pub const DEFAULT_BANNER_MAX_BYTES: usize = 1024;

/// Ports where certificate inspection is attempted.
pub const DEFAULT_TLS_PORTS: &[u16] = &[443, 8443];

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Runtime knobs shared read-only by every worker of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    pub banner_max_bytes: usize,
    pub tls_ports: Vec<u16>,
    pub ssh_default_port: u16,
}

impl ScanConfig {
    /// Use the same bound for connecting and for every I/O step.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.io_timeout = timeout;
        self
    }

    pub fn is_tls_port(&self, port: u16) -> bool {
        self.tls_ports.contains(&port)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            io_timeout: DEFAULT_TIMEOUT,
            banner_max_bytes: DEFAULT_BANNER_MAX_BYTES,
            tls_ports: DEFAULT_TLS_PORTS.to_vec(),
            ssh_default_port: DEFAULT_SSH_PORT,
        }
    }
}
