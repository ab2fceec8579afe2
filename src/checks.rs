use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time;

use crate::banner::{exchange, read_reply};
use crate::config::ScanConfig;
use crate::connector::Connector;
use crate::types::Finding;

pub const HTTP_STATUS_PROBE: &[u8] = b"GET /server-status HTTP/1.0\r\n\r\n";
pub const FTP_USER_PROBE: &[u8] = b"USER anonymous\r\n";
pub const FTP_PASS_PROBE: &[u8] = b"PASS anonymous@\r\n";

pub const STATUS_PAGE_ACCESSIBLE: &str = "Server-status page is accessible";
pub const ANONYMOUS_FTP_ALLOWED: &str = "Anonymous FTP login allowed";
pub const SSH_DEFAULT_PORT: &str = "SSH on default port";

/// Run the protocol specific checks for `service` against `host:port`.
///
/// Unknown services produce nothing. A probe that cannot connect or gets no
/// usable reply contributes no finding.
pub async fn check_misconfigurations<C: Connector>(
    connector: &C,
    host: &str,
    port: u16,
    service: &str,
    config: &ScanConfig,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    match service.to_ascii_lowercase().as_str() {
        "http" => {
            if status_page_accessible(connector, host, port, config).await {
                findings.push(Finding::Misconfiguration(STATUS_PAGE_ACCESSIBLE.into()));
            }
        }
        "ftp" => {
            if anonymous_login_allowed(connector, host, port, config).await {
                findings.push(Finding::Misconfiguration(ANONYMOUS_FTP_ALLOWED.into()));
            }
        }
        "ssh" => {
            if port == config.ssh_default_port {
                findings.push(Finding::Misconfiguration(SSH_DEFAULT_PORT.into()));
            }
        }
        _ => {}
    }
    findings
}

async fn status_page_accessible<C: Connector>(
    connector: &C,
    host: &str,
    port: u16,
    config: &ScanConfig,
) -> bool {
    let mut stream = match connector.connect(host, port).await {
        Ok(s) => s,
        Err(e) => {
            debug!("server-status probe on port {port} skipped: {e}");
            return false;
        }
    };
    exchange(&mut stream, HTTP_STATUS_PROBE, config.io_timeout, config.banner_max_bytes)
        .await
        .is_some_and(|reply| reply.contains("200 OK"))
}

async fn anonymous_login_allowed<C: Connector>(
    connector: &C,
    host: &str,
    port: u16,
    config: &ScanConfig,
) -> bool {
    let mut stream = match connector.connect(host, port).await {
        Ok(s) => s,
        Err(e) => {
            debug!("anonymous FTP probe on port {port} skipped: {e}");
            return false;
        }
    };
    ftp_anonymous_dialogue(&mut stream, config).await
}

/// `USER anonymous`, then `PASS` if the server asks for one; `230` means logged in.
async fn ftp_anonymous_dialogue<S>(stream: &mut S, config: &ScanConfig) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(mut reply) =
        exchange(stream, FTP_USER_PROBE, config.io_timeout, config.banner_max_bytes).await
    else {
        return false;
    };

    // The greeting usually arrives before the answer to USER.
    if is_greeting_only(&reply) {
        match read_reply(stream, config.io_timeout, config.banner_max_bytes).await {
            Some(next) => reply = next,
            None => return false,
        }
    }

    if has_reply_code(&reply, "230") {
        return true;
    }
    if !has_reply_code(&reply, "331") {
        return false;
    }

    if !matches!(
        time::timeout(config.io_timeout, stream.write_all(FTP_PASS_PROBE)).await,
        Ok(Ok(()))
    ) {
        return false;
    }
    read_reply(stream, config.io_timeout, config.banner_max_bytes)
        .await
        .is_some_and(|r| has_reply_code(&r, "230"))
}

/// True when every coded line is a `220`; uncoded continuation lines are ignored.
fn is_greeting_only(reply: &str) -> bool {
    let mut codes = reply.lines().filter_map(reply_code).peekable();
    codes.peek().is_some() && codes.all(|code| code == "220")
}

/// The three-digit code a reply line starts with, if any.
fn reply_code(line: &str) -> Option<&str> {
    let code = line.get(..3)?;
    code.bytes().all(|b| b.is_ascii_digit()).then_some(code)
}

fn has_reply_code(reply: &str, code: &str) -> bool {
    reply.contains(code)
}
