//! Test doubles shared by the unit tests
//!
//! `MockSentinelServer` speaks RESP over a real socket and answers the small
//! command set a sentinel client uses. `MockDialer` / `MockPool` /
//! `MockFactory` replace the network entirely for watchdog and switch tests.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::conn::{Dialer, SentinelLink};
use crate::error::{Error, Result};
use crate::pool::{Pool, PoolFactory};
use crate::resp::{Parser, RespValue};

fn master_record(name: &str, ip: &str, port: &str) -> RespValue {
    RespValue::field_array(&[
        ("name", name),
        ("ip", ip),
        ("port", port),
        ("runid", "0000000000000000000000000000000000000000"),
        ("flags", "master"),
    ])
}

fn sentinel_records(peers: &[(&str, &str)]) -> RespValue {
    RespValue::array(
        peers
            .iter()
            .map(|&(ip, port)| {
                let name = format!("{}:{}", ip, port);
                RespValue::field_array(&[
                    ("name", name.as_str()),
                    ("ip", ip),
                    ("port", port),
                    ("flags", "sentinel"),
                ])
            })
            .collect(),
    )
}

fn no_such_master() -> RespValue {
    RespValue::error("ERR No such master with that name")
}

// ---------------------------------------------------------------------------
// Socket-level mock sentinel
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ServerState {
    masters: HashMap<String, RespValue>,
    sentinels: HashMap<String, RespValue>,
    password: Option<String>,
    silent: bool,
    reply_delay: Option<Duration>,
}

/// A sentinel (and PING-answering master) listening on 127.0.0.1
pub struct MockSentinelServer {
    addr: String,
    state: Arc<Mutex<ServerState>>,
    task: JoinHandle<()>,
}

impl MockSentinelServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new(ServerState::default()));

        let task = {
            let state = state.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let state = state.clone();
                    tokio::spawn(async move {
                        let _ = handle_client(socket, state).await;
                    });
                }
            })
        };

        Self {
            addr,
            state,
            task,
        }
    }

    pub fn addr(&self) -> String {
        self.addr.clone()
    }

    /// Host and port, split, for use in SENTINEL replies
    pub fn host_port(&self) -> (String, String) {
        let (host, port) = self.addr.rsplit_once(':').unwrap();
        (host.to_string(), port.to_string())
    }

    pub fn set_master(&self, name: &str, ip: &str, port: &str) {
        self.set_master_reply(name, master_record(name, ip, port));
    }

    pub fn set_master_reply(&self, name: &str, reply: RespValue) {
        self.state.lock().masters.insert(name.to_string(), reply);
    }

    pub fn set_sentinels(&self, name: &str, peers: &[(&str, &str)]) {
        self.state
            .lock()
            .sentinels
            .insert(name.to_string(), sentinel_records(peers));
    }

    pub fn require_password(&self, password: &str) {
        self.state.lock().password = Some(password.to_string());
    }

    /// Read commands but never answer them
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// Hold every reply back for `delay` before writing it
    pub fn set_reply_delay(&self, delay: Option<Duration>) {
        self.state.lock().reply_delay = delay;
    }
}

impl Drop for MockSentinelServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_client(mut socket: TcpStream, state: Arc<Mutex<ServerState>>) -> std::io::Result<()> {
    socket.set_nodelay(true)?;

    let mut buffer = BytesMut::with_capacity(4096);
    let mut authed = false;

    loop {
        let n = socket.read_buf(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }

        loop {
            match Parser::parse(&mut buffer) {
                Ok(Some(frame)) => {
                    let args = command_args(&frame);
                    if let Some(response) = process_command(&args, &state, &mut authed) {
                        let delay = state.lock().reply_delay;
                        if let Some(delay) = delay {
                            tokio::time::sleep(delay).await;
                        }
                        socket.write_all(&response.serialize()).await?;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let error = RespValue::error(&format!("ERR {}", e));
                    socket.write_all(&error.serialize()).await?;
                    buffer.clear();
                    break;
                }
            }
        }
    }
}

fn command_args(frame: &RespValue) -> Vec<String> {
    match frame {
        RespValue::Array(items) => items
            .iter()
            .map(|item| item.as_str().unwrap_or_default().to_string())
            .collect(),
        _ => Vec::new(),
    }
}

fn process_command(
    args: &[String],
    state: &Mutex<ServerState>,
    authed: &mut bool,
) -> Option<RespValue> {
    let state = state.lock();
    if state.silent {
        return None;
    }
    if args.is_empty() {
        return Some(RespValue::error("ERR empty command"));
    }

    let command = args[0].to_uppercase();
    if command == "AUTH" {
        let given = args.last().map(String::as_str);
        return Some(match (&state.password, given) {
            (Some(expected), Some(given)) if args.len() >= 2 && expected == given => {
                *authed = true;
                RespValue::ok()
            }
            (None, _) => RespValue::error(
                "ERR AUTH <password> called without any password configured for the default user",
            ),
            _ => RespValue::error("WRONGPASS invalid username-password pair or user is disabled."),
        });
    }

    if state.password.is_some() && !*authed {
        return Some(RespValue::error("NOAUTH Authentication required."));
    }

    let reply = match command.as_str() {
        "PING" => RespValue::SimpleString("PONG".into()),
        "ECHO" if args.len() == 2 => RespValue::bulk_string(&args[1]),
        "SENTINEL" if args.len() == 3 => {
            let name = args[2].as_str();
            match args[1].to_uppercase().as_str() {
                "MASTER" => state.masters.get(name).cloned().unwrap_or_else(no_such_master),
                "SENTINELS" => match state.sentinels.get(name) {
                    Some(reply) => reply.clone(),
                    None if state.masters.contains_key(name) => RespValue::array(vec![]),
                    None => no_such_master(),
                },
                _ => RespValue::error("ERR Unknown sentinel subcommand"),
            }
        }
        _ => RespValue::error(&format!("ERR unknown command '{}'", args[0])),
    };
    Some(reply)
}

// ---------------------------------------------------------------------------
// In-memory sentinels and dialer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeState {
    masters: HashMap<String, RespValue>,
    sentinels: HashMap<String, RespValue>,
    broken: bool,
    queries: usize,
}

/// Scriptable in-memory sentinel
#[derive(Clone, Default)]
pub struct FakeSentinel {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeSentinel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_master(&self, name: &str, ip: &str, port: &str) {
        self.set_master_reply(name, master_record(name, ip, port));
    }

    pub fn set_master_reply(&self, name: &str, reply: RespValue) {
        self.inner.lock().masters.insert(name.to_string(), reply);
    }

    pub fn set_sentinels(&self, name: &str, peers: &[(&str, &str)]) {
        self.set_sentinels_reply(name, sentinel_records(peers));
    }

    pub fn set_sentinels_reply(&self, name: &str, reply: RespValue) {
        self.inner.lock().sentinels.insert(name.to_string(), reply);
    }

    /// Accept the connection but fail every command with a reset
    pub fn set_broken(&self, broken: bool) {
        self.inner.lock().broken = broken;
    }

    /// Number of commands answered so far
    pub fn queries(&self) -> usize {
        self.inner.lock().queries
    }

    fn answer(&self, parts: &[&str]) -> Result<RespValue> {
        let mut state = self.inner.lock();
        if state.broken {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        state.queries += 1;

        let reply = match parts {
            ["SENTINEL", "MASTER", name] => state
                .masters
                .get(*name)
                .cloned()
                .unwrap_or_else(no_such_master),
            ["SENTINEL", "SENTINELS", name] => state
                .sentinels
                .get(*name)
                .cloned()
                .unwrap_or_else(|| RespValue::array(vec![])),
            _ => RespValue::error("ERR unknown command"),
        };
        crate::resp::into_result(reply)
    }
}

/// Link handed out by `MockDialer`
pub struct MockLink {
    addr: String,
    sentinel: FakeSentinel,
}

impl MockLink {
    pub fn new(addr: &str, sentinel: FakeSentinel) -> Self {
        Self {
            addr: addr.to_string(),
            sentinel,
        }
    }
}

impl SentinelLink for MockLink {
    fn command(&mut self, parts: &[&str]) -> impl Future<Output = Result<RespValue>> + Send {
        let result = self.sentinel.answer(parts);
        async move { result }
    }

    fn peer_addr(&self) -> &str {
        &self.addr
    }
}

#[derive(Default)]
struct DialerState {
    sentinels: Mutex<HashMap<String, FakeSentinel>>,
    down: Mutex<HashSet<String>>,
    dials: Mutex<Vec<String>>,
}

/// Dialer over a set of in-memory sentinels. Unknown or downed addresses
/// fail with a refused dial.
#[derive(Clone, Default)]
pub struct MockDialer {
    inner: Arc<DialerState>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, addr: &str, sentinel: FakeSentinel) {
        self.inner
            .sentinels
            .lock()
            .insert(addr.to_string(), sentinel);
    }

    pub fn set_down(&self, addr: &str, down: bool) {
        let mut set = self.inner.down.lock();
        if down {
            set.insert(addr.to_string());
        } else {
            set.remove(addr);
        }
    }

    /// Every address dialed, in order
    pub fn dials(&self) -> Vec<String> {
        self.inner.dials.lock().clone()
    }

    pub fn clear_dials(&self) {
        self.inner.dials.lock().clear();
    }

    fn connect(&self, addr: &str) -> Result<MockLink> {
        self.inner.dials.lock().push(addr.to_string());
        if self.inner.down.lock().contains(addr) {
            return Err(refused(addr));
        }
        match self.inner.sentinels.lock().get(addr) {
            Some(sentinel) => Ok(MockLink::new(addr, sentinel.clone())),
            None => Err(refused(addr)),
        }
    }
}

fn refused(addr: &str) -> Error {
    Error::dial(
        addr,
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
    )
}

impl Dialer for MockDialer {
    type Link = MockLink;

    fn dial(&self, addr: &str) -> impl Future<Output = Result<MockLink>> + Send {
        let result = self.connect(addr);
        async move { result }
    }
}

// ---------------------------------------------------------------------------
// In-memory pools
// ---------------------------------------------------------------------------

/// Connection handed out by `MockPool`
#[derive(Debug)]
pub struct MockConn {
    pub pool_id: usize,
    pub addr: String,
}

struct PoolState {
    id: usize,
    addr: String,
    closed: AtomicBool,
    failing: AtomicBool,
    close_fails: bool,
    close_calls: AtomicUsize,
    checked_out: AtomicUsize,
    returned: AtomicUsize,
    dropped: AtomicUsize,
}

/// Pool that counts what happens to it
#[derive(Clone)]
pub struct MockPool {
    inner: Arc<PoolState>,
}

impl MockPool {
    fn new(id: usize, addr: &str, close_fails: bool) -> Self {
        Self {
            inner: Arc::new(PoolState {
                id,
                addr: addr.to_string(),
                closed: AtomicBool::new(false),
                failing: AtomicBool::new(false),
                close_fails,
                close_calls: AtomicUsize::new(0),
                checked_out: AtomicUsize::new(0),
                returned: AtomicUsize::new(0),
                dropped: AtomicUsize::new(0),
            }),
        }
    }

    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    pub fn checked_out(&self) -> usize {
        self.inner.checked_out.load(Ordering::SeqCst)
    }

    pub fn returned(&self) -> usize {
        self.inner.returned.load(Ordering::SeqCst)
    }

    /// Connections handed back after close
    pub fn dropped(&self) -> usize {
        self.inner.dropped.load(Ordering::SeqCst)
    }

    /// Make `get` fail as if the master refused connections
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }
}

impl Pool for MockPool {
    type Conn = MockConn;

    fn get(&self) -> impl Future<Output = Result<MockConn>> + Send {
        let result = if self.is_closed() {
            Err(Error::PoolClosed)
        } else if self.inner.failing.load(Ordering::SeqCst) {
            Err(refused(&self.inner.addr))
        } else {
            self.inner.checked_out.fetch_add(1, Ordering::SeqCst);
            Ok(MockConn {
                pool_id: self.inner.id,
                addr: self.inner.addr.clone(),
            })
        };
        async move { result }
    }

    fn put(&self, _conn: MockConn) {
        if self.is_closed() {
            self.inner.dropped.fetch_add(1, Ordering::SeqCst);
        } else {
            self.inner.returned.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn close(&self) -> impl Future<Output = Result<()>> + Send {
        self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.closed.store(true, Ordering::SeqCst);
        let result = if self.inner.close_fails {
            Err(Error::Pool(format!("close failed for {}", self.inner.addr)))
        } else {
            Ok(())
        };
        async move { result }
    }
}

#[derive(Default)]
struct FactoryState {
    built: Mutex<Vec<MockPool>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    close_fails: AtomicBool,
}

/// Factory recording every pool it builds
#[derive(Clone, Default)]
pub struct MockFactory {
    inner: Arc<FactoryState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn built(&self) -> Vec<MockPool> {
        self.inner.built.lock().clone()
    }

    pub fn pools_for(&self, addr: &str) -> Vec<MockPool> {
        self.built()
            .into_iter()
            .filter(|p| p.addr() == addr)
            .collect()
    }

    pub fn set_failing(&self, addr: &str, failing: bool) {
        let mut set = self.inner.failing.lock();
        if failing {
            set.insert(addr.to_string());
        } else {
            set.remove(addr);
        }
    }

    /// Pools built from now on report an error when closed
    pub fn set_close_failing(&self, failing: bool) {
        self.inner.close_fails.store(failing, Ordering::SeqCst);
    }

    /// Delay every build, to widen race windows
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.inner.delay.lock() = delay;
    }

    fn make(&self, addr: &str) -> Result<MockPool> {
        if self.inner.failing.lock().contains(addr) {
            return Err(Error::Pool(format!("cannot reach master {}", addr)));
        }
        let mut built = self.inner.built.lock();
        let close_fails = self.inner.close_fails.load(Ordering::SeqCst);
        let pool = MockPool::new(built.len(), addr, close_fails);
        built.push(pool.clone());
        Ok(pool)
    }
}

impl PoolFactory for MockFactory {
    type Pool = MockPool;

    fn build(&self, addr: &str) -> impl Future<Output = Result<MockPool>> + Send {
        let result = self.make(addr);
        let delay = *self.inner.delay.lock();
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        }
    }
}
