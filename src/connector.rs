use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tokio::time;

/// Upper bound for resolving the target host before a scan.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a connection attempt did not produce a stream.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connection to {host}:{port} timed out")]
    Timeout { host: String, port: u16 },

    #[error("connection to {host}:{port} refused")]
    Refused { host: String, port: u16 },

    #[error("cannot resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("connection to {host}:{port} failed: {source}")]
    Io {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
}

impl ConnectError {
    /// Timeouts and refusals are the normal answer of a closed or filtered port.
    pub fn is_closed_port(&self) -> bool {
        matches!(self, ConnectError::Timeout { .. } | ConnectError::Refused { .. })
    }
}

/// Opens connections to `(host, port)` pairs.
///
/// Every probe in the pipeline goes through this trait. The returned stream is
/// released when dropped, so a connection cannot outlive the scope holding it.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Map a host name to the address every probe of a scan connects to.
    ///
    /// Called once per scan. The default passes the host through unchanged.
    async fn resolve(&self, host: &str) -> Result<String, ConnectError> {
        Ok(host.to_string())
    }

    async fn connect(&self, host: &str, port: u16) -> Result<Self::Stream, ConnectError>;
}

/// Plain TCP connector with a mandatory connect timeout.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn resolve(&self, host: &str) -> Result<String, ConnectError> {
        let resolve_error = |source| ConnectError::Resolve {
            host: host.to_string(),
            source,
        };
        let mut addrs = time::timeout(RESOLVE_TIMEOUT, lookup_host((host, 0)))
            .await
            .map_err(|_| resolve_error(io::Error::from(io::ErrorKind::TimedOut)))?
            .map_err(resolve_error)?;
        addrs
            .next()
            .map(|addr| addr.ip().to_string())
            .ok_or_else(|| {
                resolve_error(io::Error::new(io::ErrorKind::NotFound, "no addresses found"))
            })
    }

    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, ConnectError> {
        match time::timeout(self.timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(classify(host, port, e)),
            Err(_) => Err(ConnectError::Timeout {
                host: host.to_string(),
                port,
            }),
        }
    }
}

fn classify(host: &str, port: u16, e: io::Error) -> ConnectError {
    let host = host.to_string();
    match e.kind() {
        io::ErrorKind::ConnectionRefused => ConnectError::Refused { host, port },
        io::ErrorKind::TimedOut => ConnectError::Timeout { host, port },
        _ => ConnectError::Io {
            host,
            port,
            source: e,
        },
    }
}
