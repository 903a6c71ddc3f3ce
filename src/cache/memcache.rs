// Memcached cache backend.
// Speaks the memcached text protocol (get/set) over one lazily opened TCP
// connection per server, reconnecting after I/O errors.

use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ApiError, Result};

use super::CacheBackend;

/// Longest key memcached accepts.
pub const MAX_KEY_LENGTH: usize = 250;

/// Default per-operation timeout (connect + round trip).
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(1);

type Connection = BufStream<TcpStream>;

struct Server {
    addr: String,
    conn: Mutex<Option<Connection>>,
}

/// Memcached client distributing keys over a fixed server list.
pub struct MemcacheCache {
    servers: Vec<Server>,
    io_timeout: Duration,
}

impl std::fmt::Debug for MemcacheCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcacheCache")
            .field(
                "servers",
                &self.servers.iter().map(|s| &s.addr).collect::<Vec<_>>(),
            )
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}

impl MemcacheCache {
    /// Create a backend for `host:port` addresses. No connection is opened
    /// until the first operation.
    pub fn new(addresses: Vec<String>) -> Result<Self> {
        if addresses.is_empty() {
            return Err(ApiError::Config(
                "memcache backend needs at least one server".into(),
            ));
        }

        let servers = addresses
            .into_iter()
            .map(|addr| Server {
                addr,
                conn: Mutex::new(None),
            })
            .collect();

        Ok(Self {
            servers,
            io_timeout: DEFAULT_IO_TIMEOUT,
        })
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    fn server_for(&self, key: &str) -> &Server {
        let digest = Sha256::digest(key.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let index = u64::from_be_bytes(prefix) % self.servers.len() as u64;
        &self.servers[index as usize]
    }

    async fn run<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        F: for<'c> FnOnce(
            &'c mut Connection,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = std::io::Result<T>> + Send + 'c>,
        >,
    {
        let server = self.server_for(key);
        let mut guard = server.conn.lock().await;

        let outcome = tokio::time::timeout(self.io_timeout, async {
            match connect(&mut *guard, &server.addr).await {
                Ok(conn) => op(conn).await,
                Err(e) => Err(e),
            }
        })
        .await;

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                *guard = None;
                Err(ApiError::Cache(format!("{}: {}", server.addr, e)))
            }
            Err(_) => {
                *guard = None;
                Err(ApiError::Cache(format!("{}: operation timed out", server.addr)))
            }
        }
    }
}

/// Key as sent on the wire. Keys memcached would reject are replaced by
/// their SHA-256 hex digest.
pub fn wire_key(key: &str) -> String {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LENGTH
        && key.bytes().all(|b| b > b' ' && b != 0x7f);

    if valid {
        key.to_string()
    } else {
        format!("{:x}", Sha256::digest(key.as_bytes()))
    }
}

async fn connect<'g>(
    slot: &'g mut Option<Connection>,
    addr: &str,
) -> std::io::Result<&'g mut Connection> {
    if slot.is_none() {
        debug!(%addr, "connecting to memcached");
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        *slot = Some(BufStream::new(stream));
    }
    slot.as_mut()
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotConnected))
}

fn protocol_error(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

async fn read_line(conn: &mut Connection) -> std::io::Result<String> {
    let mut line = String::new();
    if conn.read_line(&mut line).await? == 0 {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn get_value(conn: &mut Connection, key: &str) -> std::io::Result<Option<String>> {
    conn.write_all(format!("get {}\r\n", key).as_bytes()).await?;
    conn.flush().await?;

    let header = read_line(conn).await?;
    if header == "END" {
        return Ok(None);
    }

    // VALUE <key> <flags> <bytes> [<cas>]
    let mut parts = header.split_whitespace();
    if parts.next() != Some("VALUE") {
        return Err(protocol_error(format!("unexpected reply to get: {}", header)));
    }
    let len: usize = parts
        .nth(2)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| protocol_error(format!("malformed VALUE line: {}", header)))?;

    let mut data = vec![0u8; len + 2];
    conn.read_exact(&mut data).await?;
    data.truncate(len);

    let trailer = read_line(conn).await?;
    if trailer != "END" {
        return Err(protocol_error(format!("expected END, got {}", trailer)));
    }

    String::from_utf8(data)
        .map(Some)
        .map_err(|e| protocol_error(e.to_string()))
}

async fn set_value(conn: &mut Connection, key: &str, value: &str) -> std::io::Result<()> {
    conn.write_all(format!("set {} 0 0 {}\r\n", key, value.len()).as_bytes())
        .await?;
    conn.write_all(value.as_bytes()).await?;
    conn.write_all(b"\r\n").await?;
    conn.flush().await?;

    match read_line(conn).await?.as_str() {
        "STORED" => Ok(()),
        reply => Err(protocol_error(format!("set rejected: {}", reply))),
    }
}

#[async_trait]
impl CacheBackend for MemcacheCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let wire = wire_key(key);
        self.run(key, move |conn| Box::pin(async move { get_value(conn, &wire).await }))
            .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let wire = wire_key(key);
        let value = value.to_string();
        self.run(key, move |conn| {
            Box::pin(async move { set_value(conn, &wire, &value).await })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Arc;

    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Minimal memcached speaking get/set, enough to exercise the client.
    async fn spawn_fake_memcached() -> (String, Arc<parking_lot::Mutex<HashMap<String, String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let store = Arc::new(parking_lot::Mutex::new(HashMap::<String, String>::new()));

        let shared = store.clone();
        tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                let store = shared.clone();
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut reader = BufReader::new(read);
                    loop {
                        let mut line = String::new();
                        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                            return;
                        }
                        let parts: Vec<String> =
                            line.split_whitespace().map(str::to_string).collect();
                        match parts[0].as_str() {
                            "get" => {
                                let value = store.lock().get(&parts[1]).cloned();
                                let reply = match value {
                                    Some(v) => format!(
                                        "VALUE {} 0 {}\r\n{}\r\nEND\r\n",
                                        parts[1],
                                        v.len(),
                                        v
                                    ),
                                    None => "END\r\n".to_string(),
                                };
                                write.write_all(reply.as_bytes()).await.unwrap();
                            }
                            "set" => {
                                let len: usize = parts[4].parse().unwrap();
                                let mut data = vec![0u8; len + 2];
                                reader.read_exact(&mut data).await.unwrap();
                                data.truncate(len);
                                store
                                    .lock()
                                    .insert(parts[1].clone(), String::from_utf8(data).unwrap());
                                write.write_all(b"STORED\r\n").await.unwrap();
                            }
                            _ => {
                                write.write_all(b"ERROR\r\n").await.unwrap();
                            }
                        }
                    }
                });
            }
        });

        (addr, store)
    }

    #[test]
    fn test_wire_key_passthrough() {
        assert_eq!(wire_key("twitter:1:http://x/y.json"), "twitter:1:http://x/y.json");
    }

    #[test]
    fn test_wire_key_hashes_long_or_spaced_keys() {
        let long = "k".repeat(MAX_KEY_LENGTH + 1);
        let hashed = wire_key(&long);
        assert_eq!(hashed.len(), 64);
        assert_eq!(hashed, wire_key(&long));

        assert_eq!(wire_key("has space").len(), 64);
    }

    #[test]
    fn test_requires_a_server() {
        assert!(matches!(MemcacheCache::new(vec![]), Err(ApiError::Config(_))));
    }

    #[tokio::test]
    async fn test_get_miss_then_set_then_hit() {
        let (addr, store) = spawn_fake_memcached().await;
        let cache = MemcacheCache::new(vec![addr]).unwrap();

        assert!(cache.get("twitter:1:url").await.unwrap().is_none());

        let json = r#"[{"id":1,"text":"hello world"}]"#;
        cache.set("twitter:1:url", json).await.unwrap();
        assert_eq!(store.lock().get("twitter:1:url").map(String::as_str), Some(json));

        assert_eq!(cache.get("twitter:1:url").await.unwrap().as_deref(), Some(json));
    }

    #[tokio::test]
    async fn test_long_key_round_trips_through_digest() {
        let (addr, store) = spawn_fake_memcached().await;
        let cache = MemcacheCache::new(vec![addr]).unwrap();

        let key = format!("twitter:1:http://x/{}.json", "a".repeat(300));
        cache.set(&key, "{}").await.unwrap();

        assert!(store.lock().contains_key(&wire_key(&key)));
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_cache_error() {
        // Bind then drop to get a port nothing listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let cache = MemcacheCache::new(vec![addr]).unwrap();

        let err = cache.get("k").await.unwrap_err();
        assert!(matches!(err, ApiError::Cache(_)));
    }
}
