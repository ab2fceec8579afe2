use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;

use crate::types::ServiceInfo;

/// Generic probe sent to coax a greeting out of services that wait for the client.
pub const BANNER_PROBE: &[u8] = b"HEAD / HTTP/1.0\r\n\r\n";

/// Field whose value names the service and its version.
pub const SERVER_MARKER: &str = "Server:";

/// Send the generic probe and read the service's answer.
///
/// Returns `None` on any I/O error, timeout, empty read or non UTF-8 reply.
pub async fn grab_banner<S>(
    stream: &mut S,
    io_timeout: Duration,
    max_bytes: usize,
) -> Option<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    exchange(stream, BANNER_PROBE, io_timeout, max_bytes).await
}

/// Write `request`, then read one reply of at most `max_bytes`.
pub(crate) async fn exchange<S>(
    stream: &mut S,
    request: &[u8],
    io_timeout: Duration,
    max_bytes: usize,
) -> Option<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    time::timeout(io_timeout, stream.write_all(request))
        .await
        .ok()?
        .ok()?;
    read_reply(stream, io_timeout, max_bytes).await
}

/// Read one chunk of at most `max_bytes` and decode it as trimmed text.
pub(crate) async fn read_reply<S>(
    stream: &mut S,
    io_timeout: Duration,
    max_bytes: usize,
) -> Option<String>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; max_bytes.max(1)];
    let n = time::timeout(io_timeout, stream.read(&mut buf))
        .await
        .ok()?
        .ok()?;
    if n == 0 {
        return None;
    }
    let text = std::str::from_utf8(&buf[..n]).ok()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Pull a service name and version out of a banner.
///
/// Takes the first two whitespace separated tokens after the first `Server:`
/// marker. Anything else yields `None`; this is a heuristic, not a parser.
pub fn parse_banner(banner: &str) -> Option<ServiceInfo> {
    let (_, rest) = banner.split_once(SERVER_MARKER)?;
    let mut tokens = rest.split_whitespace();
    let name = tokens.next()?;
    let version = tokens.next()?;
    Some(ServiceInfo::new(name, version))
}
