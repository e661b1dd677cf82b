//! Key-value store client speaking RESP over TCP.
//!
//! Only the handful of commands the synchronizer needs are implemented:
//! `PING` to validate a fresh connection, `SET`, `GET` and `QUIT`.

use async_trait::async_trait;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::kv::{KvStore, StoreConnector};
use twinsync_common::{Error, Result};

/// Port used when an endpoint does not name one.
pub const DEFAULT_PORT: u16 = 6379;

/// Largest bulk string a server may send (the Redis `proto-max-bulk-len` default).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Default time allowed for the TCP handshake plus `PING`.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A decoded server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK`
    Simple(String),
    /// `-ERR ...`
    Error(String),
    /// `:1`
    Integer(i64),
    /// `$n` followed by payload; `None` for the null bulk string.
    Bulk(Option<Vec<u8>>),
}

/// Encode a command as a RESP array of bulk strings.
pub fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Read one reply from `reader`.
///
/// I/O failures and protocol violations both mean the stream can no longer
/// be trusted, so both are reported as `Error::Connection`.
pub async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Reply> {
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .await
        .map_err(|e| Error::Connection(format!("Failed to read reply: {}", e)))?;
    if n == 0 {
        return Err(Error::Connection("Connection closed by server".to_string()));
    }

    let line = line.trim_end_matches(['\r', '\n']);
    let Some(kind) = line.chars().next() else {
        return Err(Error::Connection("Empty reply line".to_string()));
    };
    let rest = &line[kind.len_utf8()..];

    match kind {
        '+' => Ok(Reply::Simple(rest.to_string())),
        '-' => Ok(Reply::Error(rest.to_string())),
        ':' => rest
            .parse()
            .map(Reply::Integer)
            .map_err(|_| Error::Connection(format!("Invalid integer reply: {}", rest))),
        '$' => {
            let len: i64 = rest
                .parse()
                .map_err(|_| Error::Connection(format!("Invalid bulk length: {}", rest)))?;
            if len < 0 {
                return Ok(Reply::Bulk(None));
            }
            if len > MAX_BULK_LEN {
                return Err(Error::Connection(format!(
                    "Bulk reply of {} bytes exceeds the {} byte limit",
                    len, MAX_BULK_LEN
                )));
            }

            let len = len as usize;
            let mut payload = vec![0u8; len + 2];
            reader
                .read_exact(&mut payload)
                .await
                .map_err(|e| Error::Connection(format!("Failed to read bulk reply: {}", e)))?;
            payload.truncate(len);
            Ok(Reply::Bulk(Some(payload)))
        }
        _ => Err(Error::Connection(format!("Unsupported reply: {}", line))),
    }
}

/// Split an endpoint into a socket address, defaulting the port.
///
/// Accepts `host`, `host:port`, `[v6]`, `[v6]:port` and a bare IPv6
/// address. Anything after a comma (client options in some
/// connection-string dialects) is ignored.
pub fn socket_address(endpoint: &str) -> Result<String> {
    let host = endpoint.split(',').next().unwrap_or_default().trim();
    if host.is_empty() {
        return Err(Error::InvalidInput("Store endpoint is empty".to_string()));
    }
    if host.parse::<Ipv6Addr>().is_ok() {
        return Ok(format!("[{}]:{}", host, DEFAULT_PORT));
    }

    let has_port = if let Some(rest) = host.strip_prefix('[') {
        rest.contains("]:")
    } else {
        host.contains(':')
    };

    if has_port {
        Ok(host.to_string())
    } else {
        Ok(format!("{}:{}", host, DEFAULT_PORT))
    }
}

/// Opens RESP connections over plain TCP.
#[derive(Debug, Clone)]
pub struct RespConnector {
    connect_timeout: Duration,
}

impl RespConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the time allowed for connecting and the initial `PING`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn open(&self, endpoint: &str) -> Result<RespStore> {
        let address = socket_address(endpoint)?;

        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| Error::Connection(format!("Failed to connect to {}: {}", address, e)))?;
        stream.set_nodelay(true).ok();

        let store = RespStore {
            endpoint: endpoint.to_string(),
            stream: Mutex::new(BufStream::new(stream)),
            connected: AtomicBool::new(true),
        };

        match store.command(&["PING"]).await? {
            Reply::Simple(ref pong) if pong == "PONG" => Ok(store),
            Reply::Error(message) => Err(Error::Connection(format!(
                "Server at {} rejected PING: {}",
                address, message
            ))),
            other => Err(Error::Connection(format!(
                "Unexpected PING reply from {}: {:?}",
                address, other
            ))),
        }
    }
}

impl Default for RespConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreConnector for RespConnector {
    fn name(&self) -> &str {
        "resp"
    }

    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn KvStore>> {
        let store = tokio::time::timeout(self.connect_timeout, self.open(endpoint))
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "Timed out connecting to {} after {:?}",
                    endpoint, self.connect_timeout
                ))
            })??;

        debug!(endpoint, "store connection established");
        Ok(Arc::new(store))
    }
}

/// One RESP connection. Commands are pipelined one at a time.
pub struct RespStore {
    endpoint: String,
    stream: Mutex<BufStream<TcpStream>>,
    connected: AtomicBool,
}

impl RespStore {
    async fn command(&self, args: &[&str]) -> Result<Reply> {
        if !self.is_connected() {
            return Err(Error::Connection(format!(
                "Connection to {} is closed",
                self.endpoint
            )));
        }

        let mut stream = self.stream.lock().await;
        let result = round_trip(&mut stream, args).await;

        if let Err(Error::Connection(ref message)) = result {
            warn!(endpoint = %self.endpoint, "store connection lost: {}", message);
            self.connected.store(false, Ordering::SeqCst);
        }
        result
    }
}

async fn round_trip(stream: &mut BufStream<TcpStream>, args: &[&str]) -> Result<Reply> {
    stream
        .write_all(&encode_command(args))
        .await
        .map_err(|e| Error::Connection(format!("Failed to send command: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::Connection(format!("Failed to send command: {}", e)))?;
    read_reply(stream).await
}

#[async_trait]
impl KvStore for RespStore {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        match self.command(&["SET", key, value]).await? {
            Reply::Simple(_) => Ok(()),
            Reply::Error(message) => Err(Error::Write {
                key: key.to_string(),
                message,
            }),
            other => Err(Error::Write {
                key: key.to_string(),
                message: format!("Unexpected reply: {:?}", other),
            }),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.command(&["GET", key]).await? {
            Reply::Bulk(None) => Ok(None),
            Reply::Bulk(Some(bytes)) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Reply::Error(message) => Err(Error::InvalidInput(format!(
                "GET {} failed: {}",
                key, message
            ))),
            other => Err(Error::InvalidInput(format!(
                "Unexpected GET reply: {:?}",
                other
            ))),
        }
    }

    async fn close(&self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }

        // Best effort: the server may already be gone.
        if let Err(e) = self.command(&["QUIT"]).await {
            debug!(endpoint = %self.endpoint, "QUIT failed: {}", e);
        }
        self.connected.store(false, Ordering::SeqCst);

        let mut stream = self.stream.lock().await;
        stream.get_mut().shutdown().await.ok();
        Ok(())
    }
}
