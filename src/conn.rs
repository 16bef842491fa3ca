//! RESP connections
//!
//! `RespConn` is a single request/response connection to a Redis-protocol
//! server (a sentinel or a master) over TCP or a unix socket. The watchdog
//! only sees connections through the `SentinelLink` / `Dialer` seams so that
//! custom transports can be plugged in.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::resp::{self, Parser, RespValue};

/// Transport used to reach sentinels and masters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Tcp,
    #[cfg(unix)]
    Unix,
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tcp" | "tcp4" | "tcp6" => Ok(Self::Tcp),
            #[cfg(unix)]
            "unix" => Ok(Self::Unix),
            _ => Err(Error::Configuration(format!("unsupported network '{}'", s))),
        }
    }
}

/// Options applied to every connection a dialer opens
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub network: Network,
    /// Upper bound on TCP connect plus the optional AUTH round trip
    pub dial_timeout: Duration,
    /// Upper bound on a single command round trip (zero = unbounded)
    pub command_timeout: Duration,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            network: Network::Tcp,
            dial_timeout: Duration::from_millis(500),
            command_timeout: Duration::from_secs(1),
            username: None,
            password: None,
        }
    }
}

enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    async fn read_buf(&mut self, buf: &mut BytesMut) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read_buf(buf).await,
            #[cfg(unix)]
            Stream::Unix(s) => s.read_buf(buf).await,
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(s) => s.write_all(buf).await,
            #[cfg(unix)]
            Stream::Unix(s) => s.write_all(buf).await,
        }
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown().await,
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown().await,
        }
    }
}

/// A single RESP connection
pub struct RespConn {
    addr: String,
    stream: Stream,
    buf: BytesMut,
    command_timeout: Duration,
    /// Set once a command fails at the connection level; the stream may
    /// still hold a stale or half-read reply
    broken: bool,
}

impl RespConn {
    /// Dial `addr`, bounded by `opts.dial_timeout`, and authenticate if a
    /// password is configured.
    pub async fn connect(addr: &str, opts: &ConnectOptions) -> Result<Self> {
        let handshake = async {
            let stream = match opts.network {
                Network::Tcp => {
                    let s = TcpStream::connect(addr).await?;
                    s.set_nodelay(true)?;
                    Stream::Tcp(s)
                }
                #[cfg(unix)]
                Network::Unix => Stream::Unix(UnixStream::connect(addr).await?),
            };

            let mut conn = Self {
                addr: addr.to_string(),
                stream,
                buf: BytesMut::with_capacity(4096),
                command_timeout: opts.command_timeout,
                broken: false,
            };

            if let Some(pass) = &opts.password {
                match &opts.username {
                    Some(user) => conn.command(&["AUTH", user.as_str(), pass.as_str()]).await?,
                    None => conn.command(&["AUTH", pass.as_str()]).await?,
                };
            }

            Ok::<_, Error>(conn)
        };

        match timeout(opts.dial_timeout, handshake).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(Error::Io(e))) => Err(Error::dial(addr, e)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::dial(
                addr,
                std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timeout"),
            )),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether a previous command left the connection out of sync
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Send one command and wait for its reply. Error replies become
    /// `Error::Reply`.
    pub async fn command(&mut self, parts: &[&str]) -> Result<RespValue> {
        let limit = self.command_timeout;
        let round_trip = async {
            self.send(parts).await?;
            self.read_reply().await
        };

        let reply = if limit.is_zero() {
            round_trip.await
        } else {
            timeout(limit, round_trip)
                .await
                .unwrap_or(Err(Error::Timeout))
        };

        match reply {
            Ok(reply) => resp::into_result(reply),
            Err(e) => {
                if e.is_connection_failure() {
                    self.broken = true;
                }
                Err(e)
            }
        }
    }

    async fn send(&mut self, parts: &[&str]) -> Result<()> {
        let mut out = Vec::with_capacity(64);
        RespValue::command(parts).write_to(&mut out);
        self.stream.write_all(&out).await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<RespValue> {
        loop {
            if let Some(value) = Parser::parse(&mut self.buf)? {
                return Ok(value);
            }

            let n = self.stream.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
        }
    }

    /// Shut the write half down and drop the connection
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// A live connection to a sentinel, as seen by the resolver and discovery code
pub trait SentinelLink: Send {
    /// Issue one command and return its (non-error) reply
    fn command(&mut self, parts: &[&str]) -> impl Future<Output = Result<RespValue>> + Send;

    /// Address this link was dialed at
    fn peer_addr(&self) -> &str;
}

impl SentinelLink for RespConn {
    fn command(&mut self, parts: &[&str]) -> impl Future<Output = Result<RespValue>> + Send {
        RespConn::command(self, parts)
    }

    fn peer_addr(&self) -> &str {
        &self.addr
    }
}

/// Opens short-lived sentinel connections
pub trait Dialer: Send + Sync + 'static {
    type Link: SentinelLink;

    fn dial(&self, addr: &str) -> impl Future<Output = Result<Self::Link>> + Send;
}

/// Default dialer producing `RespConn`s
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    opts: ConnectOptions,
}

impl TcpDialer {
    pub fn new(opts: ConnectOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.opts
    }
}

impl Dialer for TcpDialer {
    type Link = RespConn;

    fn dial(&self, addr: &str) -> impl Future<Output = Result<RespConn>> + Send {
        RespConn::connect(addr, &self.opts)
    }
}
