#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::ssl::{Ssl, SslAcceptor, SslMethod};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_openssl::SslStream;

use vuln_scan_rs::{ConnectError, Connector, ScanConfig};

/// Short timeouts so silent doubles do not slow the suite down.
pub fn quick_config() -> ScanConfig {
    ScanConfig::default().with_timeout(Duration::from_millis(200))
}

/// How a scripted port answers.
#[derive(Debug, Clone)]
pub enum Behavior {
    Refuse,
    Timeout,
    /// Connect fails with an I/O error that is not a timeout or refusal.
    Fail,
    /// Connect panics inside the worker.
    Panic,
    /// Read one request, wait for the hold delay, write this reply, then close.
    Reply(String),
    /// Accept the connection but never answer.
    Silent,
    /// Every read on the connection errors.
    BrokenRead,
}

/// Connection accounting shared between the connector and its streams.
#[derive(Debug, Default)]
pub struct Stats {
    active: AtomicUsize,
    max_active: AtomicUsize,
    connects: AtomicUsize,
    releases: AtomicUsize,
    resolves: AtomicUsize,
    hosts: Mutex<BTreeSet<String>>,
}

impl Stats {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    /// Every host name passed to `connect`.
    pub fn hosts(&self) -> BTreeSet<String> {
        self.hosts.lock().unwrap().clone()
    }
}

/// In-memory connector driven by a per-port script; unscripted ports refuse.
pub struct ScriptedConnector {
    script: HashMap<u16, Behavior>,
    default: Behavior,
    hold: Duration,
    unresolvable: bool,
    pub stats: Arc<Stats>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
            default: Behavior::Refuse,
            hold: Duration::ZERO,
            unresolvable: false,
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn port(mut self, port: u16, behavior: Behavior) -> Self {
        self.script.insert(port, behavior);
        self
    }

    pub fn otherwise(mut self, behavior: Behavior) -> Self {
        self.default = behavior;
        self
    }

    /// Delay replies by this long, keeping the client's connection busy.
    pub fn hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    /// Fail every name lookup, as for a host that does not exist.
    pub fn unresolvable(mut self) -> Self {
        self.unresolvable = true;
        self
    }

    fn open(&self, broken: bool) -> (CountedStream, DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(now, Ordering::SeqCst);
        let stream = CountedStream {
            inner: client,
            broken,
            stats: Arc::clone(&self.stats),
        };
        (stream, server)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Stream = CountedStream;

    async fn resolve(&self, host: &str) -> Result<String, ConnectError> {
        self.stats.resolves.fetch_add(1, Ordering::SeqCst);
        if self.unresolvable {
            return Err(ConnectError::Resolve {
                host: host.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted lookup failure"),
            });
        }
        Ok(format!("addr-of-{host}"))
    }

    async fn connect(&self, host: &str, port: u16) -> Result<CountedStream, ConnectError> {
        let host = host.to_string();
        self.stats.hosts.lock().unwrap().insert(host.clone());
        let behavior = self.script.get(&port).unwrap_or(&self.default).clone();
        match behavior {
            Behavior::Refuse => Err(ConnectError::Refused { host, port }),
            Behavior::Timeout => Err(ConnectError::Timeout { host, port }),
            Behavior::Fail => Err(ConnectError::Io {
                host,
                port,
                source: io::Error::new(io::ErrorKind::PermissionDenied, "scripted failure"),
            }),
            Behavior::Panic => panic!("scripted panic on port {port}"),
            Behavior::Reply(reply) => {
                let (stream, mut server) = self.open(false);
                let hold = self.hold;
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = server.read(&mut buf).await;
                    tokio::time::sleep(hold).await;
                    let _ = server.write_all(reply.as_bytes()).await;
                });
                Ok(stream)
            }
            Behavior::Silent => {
                let (stream, server) = self.open(false);
                let hold = self.hold.max(Duration::from_secs(5));
                tokio::spawn(async move {
                    let _server = server;
                    tokio::time::sleep(hold).await;
                });
                Ok(stream)
            }
            Behavior::BrokenRead => {
                let (stream, _server) = self.open(true);
                Ok(stream)
            }
        }
    }
}

/// Client half of a scripted connection; updates [`Stats`] when dropped.
pub struct CountedStream {
    inner: DuplexStream,
    broken: bool,
    stats: Arc<Stats>,
}

impl Drop for CountedStream {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncRead for CountedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.broken {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "scripted read failure",
            )));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for CountedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Routes logical ports to real local listeners; unmapped ports refuse.
pub struct PortMapConnector {
    routes: HashMap<u16, SocketAddr>,
}

impl PortMapConnector {
    pub fn new(routes: impl IntoIterator<Item = (u16, SocketAddr)>) -> Self {
        Self {
            routes: routes.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Connector for PortMapConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, ConnectError> {
        let Some(addr) = self.routes.get(&port) else {
            return Err(ConnectError::Refused {
                host: host.to_string(),
                port,
            });
        };
        TcpStream::connect(addr).await.map_err(|source| ConnectError::Io {
            host: host.to_string(),
            port,
            source,
        })
    }
}

/// Plain TCP service answering every request with `reply`.
pub async fn spawn_reply_server(reply: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut tcp, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = tcp.read(&mut buf).await;
                let _ = tcp.write_all(reply.as_bytes()).await;
            });
        }
    });
    addr
}

/// TLS service presenting `cert`.
pub async fn spawn_tls_server(cert: X509, key: PKey<Private>) -> SocketAddr {
    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    builder.set_private_key(&key).unwrap();
    builder.set_certificate(&cert).unwrap();
    builder.check_private_key().unwrap();
    let acceptor = Arc::new(builder.build());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let acceptor = Arc::clone(&acceptor);
            tokio::spawn(async move {
                let Ok(ssl) = Ssl::new(acceptor.context()) else {
                    return;
                };
                let Ok(mut stream) = SslStream::new(ssl, tcp) else {
                    return;
                };
                if Pin::new(&mut stream).accept().await.is_err() {
                    return;
                }
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
            });
        }
    });
    addr
}

pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

pub const DAY: i64 = 86_400;

fn name(cn: &str) -> X509Name {
    let mut builder = X509NameBuilder::new().unwrap();
    builder.append_entry_by_text("CN", cn).unwrap();
    builder.build()
}

fn build_certificate(
    subject: &str,
    issuer: &X509Name,
    key: &PKey<Private>,
    signer: &PKey<Private>,
    not_before: i64,
    not_after: i64,
) -> X509 {
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name(subject)).unwrap();
    builder.set_issuer_name(issuer).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(not_before).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(not_after).unwrap())
        .unwrap();
    builder.sign(signer, MessageDigest::sha256()).unwrap();
    builder.build()
}

fn new_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

/// Self-signed certificate valid over `[not_before, not_after]` (unix seconds).
pub fn self_signed_certificate(
    cn: &str,
    not_before: i64,
    not_after: i64,
) -> (X509, PKey<Private>) {
    let key = new_key();
    let cert = build_certificate(cn, &name(cn), &key, &key, not_before, not_after);
    (cert, key)
}

/// Leaf certificate issued by a throwaway CA.
pub fn ca_issued_certificate(
    cn: &str,
    not_before: i64,
    not_after: i64,
) -> (X509, PKey<Private>) {
    let ca_key = new_key();
    let key = new_key();
    let cert = build_certificate(
        cn,
        &name("Test Root CA"),
        &key,
        &ca_key,
        not_before,
        not_after,
    );
    (cert, key)
}
