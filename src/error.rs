use thiserror::Error;

use crate::connector::ConnectError;

/// Errors surfaced by the scan pipeline.
///
/// The first four reject a target before anything is dispatched. `Connect`
/// carries a connect failure that is neither a timeout nor a refusal; the
/// coordinator downgrades such ports to closed instead of aborting.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid port range {start}-{end}: {reason}")]
    InvalidPortRange {
        start: u16,
        end: u16,
        reason: &'static str,
    },

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("target host must not be empty")]
    EmptyHost,

    #[error("cannot scan {host}: {source}")]
    UnresolvedHost {
        host: String,
        #[source]
        source: ConnectError,
    },

    #[error(transparent)]
    Connect(#[from] ConnectError),
}
