//! Shared Tier - Networked Cache Adapter
//!
//! Stateless adapter over a remote key/value store with server-side TTL.
//!
//! # Design
//!
//! - Pluggable backend behind the [`SharedTier`] trait
//! - [`RedisSharedTier`]: multiplexed tokio connection, every call bounded by
//!   the configured timeout, no internal retry
//! - [`InMemorySharedTier`]: `DashMap` stand-in with an availability switch,
//!   used by tests and the CLI's `memory` mode

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::debug;

use crate::config::MAX_TTL_SECONDS;
use crate::error::TierError;

/// Result type for shared tier calls
pub type TierResult<T> = std::result::Result<T, TierError>;

/// Keys requested per `SCAN` round trip
const SCAN_BATCH: usize = 1000;

/// Shared tier backend trait
#[async_trait]
pub trait SharedTier: Send + Sync {
    /// Establish (or re-establish) the connection
    async fn connect(&self) -> TierResult<()>;

    /// Drop the connection
    async fn disconnect(&self) {}

    /// Fetch the raw payload stored under `key`
    async fn get(&self, key: &str) -> TierResult<Option<Bytes>>;

    /// Store `data` under `key`, expiring after `ttl_seconds`
    async fn set(&self, key: &str, data: Bytes, ttl_seconds: u64) -> TierResult<()>;

    /// Remove `key`
    async fn delete(&self, key: &str) -> TierResult<()>;

    /// Remove every key in `keys`
    async fn delete_many(&self, keys: &[String]) -> TierResult<()>;

    /// List keys matching the glob `pattern`
    async fn scan(&self, pattern: &str) -> TierResult<Vec<String>>;

    /// Round-trip check
    async fn ping(&self) -> TierResult<()>;

    /// Bytes used by the remote store, if it reports them
    async fn usage_bytes(&self) -> TierResult<u64>;

    /// Backend name for logs and health output
    fn name(&self) -> &'static str;
}

// =============================================================================
// Redis
// =============================================================================

/// Redis-backed shared tier
///
/// Single commands are bounded by `timeout`. A `scan` is a series of `SCAN`
/// round trips; each is bounded by `timeout` and the whole series by
/// `scan_timeout`.
pub struct RedisSharedTier {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    timeout: Duration,
    scan_timeout: Duration,
}

impl RedisSharedTier {
    /// Create an adapter for `address` without connecting
    ///
    /// Fails only when the connection string cannot be parsed.
    pub fn new(address: &str, timeout: Duration) -> TierResult<Self> {
        let client = redis::Client::open(address)
            .map_err(|e| TierError::Connect(format!("invalid address '{}': {}", address, e)))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            timeout,
            scan_timeout: timeout,
        })
    }

    /// Set the deadline for a complete `scan`
    pub fn with_scan_timeout(mut self, scan_timeout: Duration) -> Self {
        self.scan_timeout = scan_timeout;
        self
    }

    fn connection(&self) -> TierResult<MultiplexedConnection> {
        self.connection.lock().clone().ok_or(TierError::NotConnected)
    }

    /// Run a redis future under the configured timeout
    async fn bounded<T, F>(&self, operation: &str, fut: F) -> TierResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(TierError::from),
            Err(_) => Err(TierError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

impl std::fmt::Debug for RedisSharedTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSharedTier")
            .field("timeout", &self.timeout)
            .field("scan_timeout", &self.scan_timeout)
            .field("connected", &self.connection.lock().is_some())
            .finish()
    }
}

#[async_trait]
impl SharedTier for RedisSharedTier {
    async fn connect(&self) -> TierResult<()> {
        let mut conn = self
            .bounded("connect", self.client.get_multiplexed_async_connection())
            .await?;

        let pong: String = self
            .bounded("ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        debug!(reply = %pong, "redis connection established");

        *self.connection.lock() = Some(conn);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connection.lock().take();
    }

    async fn get(&self, key: &str) -> TierResult<Option<Bytes>> {
        let mut conn = self.connection()?;
        let data: Option<Vec<u8>> = self.bounded("get", conn.get(key)).await?;
        Ok(data.map(Bytes::from))
    }

    async fn set(&self, key: &str, data: Bytes, ttl_seconds: u64) -> TierResult<()> {
        let mut conn = self.connection()?;
        self.bounded("set", conn.set_ex::<_, _, ()>(key, data.as_ref(), ttl_seconds))
            .await
    }

    async fn delete(&self, key: &str) -> TierResult<()> {
        let mut conn = self.connection()?;
        self.bounded("delete", conn.del::<_, ()>(key)).await
    }

    async fn delete_many(&self, keys: &[String]) -> TierResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection()?;
        self.bounded("delete_many", conn.del::<_, ()>(keys.to_vec()))
            .await
    }

    async fn scan(&self, pattern: &str) -> TierResult<Vec<String>> {
        let mut conn = self.connection()?;

        let rounds = async {
            let mut cursor: u64 = 0;
            let mut found = Vec::new();
            loop {
                let mut cmd = redis::cmd("SCAN");
                cmd.arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH);

                let (next, keys): (u64, Vec<String>) =
                    self.bounded("scan", cmd.query_async(&mut conn)).await?;
                found.extend(keys);

                cursor = next;
                if cursor == 0 {
                    return Ok::<_, TierError>(found);
                }
            }
        };

        let mut found = match tokio::time::timeout(self.scan_timeout, rounds).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TierError::Timeout {
                    operation: "scan".to_string(),
                    timeout_ms: self.scan_timeout.as_millis() as u64,
                })
            }
        };

        // SCAN may return a key more than once
        found.sort_unstable();
        found.dedup();
        Ok(found)
    }

    async fn ping(&self) -> TierResult<()> {
        let mut conn = self.connection()?;
        let _: String = self
            .bounded("ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn usage_bytes(&self) -> TierResult<u64> {
        let mut conn = self.connection()?;
        let info: String = self
            .bounded(
                "info",
                redis::cmd("INFO").arg("memory").query_async(&mut conn),
            )
            .await?;
        parse_used_memory(&info)
            .ok_or_else(|| TierError::Protocol("INFO reply without used_memory".to_string()))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Extract `used_memory` from an `INFO memory` reply
fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("used_memory:"))
        .and_then(|value| value.trim().parse().ok())
}

// =============================================================================
// In-Memory
// =============================================================================

/// In-memory shared tier for testing
///
/// Honors TTLs, glob `scan` and can be switched unavailable to simulate an
/// unreachable store: every call then fails with [`TierError::Connect`].
pub struct InMemorySharedTier {
    storage: DashMap<String, (Bytes, Instant)>,
    available: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl Default for InMemorySharedTier {
    fn default() -> Self {
        Self {
            storage: DashMap::new(),
            available: AtomicBool::new(true),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }
}

impl InMemorySharedTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects every call
    pub fn unavailable() -> Self {
        let tier = Self::default();
        tier.set_available(false);
        tier
    }

    /// Toggle simulated reachability
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Store bytes directly, bypassing availability (e.g. data written by
    /// another instance)
    pub fn insert_raw(&self, key: impl Into<String>, data: Bytes, ttl: Duration) {
        let ttl = ttl.min(Duration::from_secs(MAX_TTL_SECONDS));
        self.storage.insert(key.into(), (data, Instant::now() + ttl));
    }

    /// Live payload under `key`, bypassing availability
    pub fn peek(&self, key: &str) -> Option<Bytes> {
        self.storage
            .get(key)
            .filter(|item| Instant::now() < item.1)
            .map(|item| item.0.clone())
    }

    /// Number of stored keys, expired ones included
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    fn check(&self) -> TierResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(TierError::Connect("shared tier unavailable".to_string()))
        }
    }
}

#[async_trait]
impl SharedTier for InMemorySharedTier {
    async fn connect(&self) -> TierResult<()> {
        self.check()
    }

    async fn get(&self, key: &str) -> TierResult<Option<Bytes>> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let expired = match self.storage.get(key) {
            Some(item) if now < item.1 => return Ok(Some(item.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.storage.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, data: Bytes, ttl_seconds: u64) -> TierResult<()> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.insert_raw(key, data, Duration::from_secs(ttl_seconds));
        Ok(())
    }

    async fn delete(&self, key: &str) -> TierResult<()> {
        self.check()?;
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.storage.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> TierResult<()> {
        self.check()?;
        for key in keys {
            self.deletes.fetch_add(1, Ordering::Relaxed);
            self.storage.remove(key);
        }
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> TierResult<Vec<String>> {
        self.check()?;
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .storage
            .iter()
            .filter(|item| now < item.value().1 && glob_match(pattern, item.key()))
            .map(|item| item.key().clone())
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }

    async fn ping(&self) -> TierResult<()> {
        self.check()
    }

    async fn usage_bytes(&self) -> TierResult<u64> {
        self.check()?;
        Ok(self
            .storage
            .iter()
            .map(|item| (item.key().len() + item.value().0.len()) as u64)
            .sum())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis-style glob match supporting `*`, `?` and backslash escapes
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                t += 1;
                continue;
            }
            Some('\\') if pattern.get(p + 1) == Some(&text[t]) => {
                p += 2;
                t += 1;
                continue;
            }
            Some(c) if *c != '\\' && *c == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }

        match backtrack {
            Some((star, matched)) => {
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_in_memory_set_get_delete() {
        let tier = InMemorySharedTier::new();
        tier.set("k", Bytes::from_static(b"data"), 60).await.unwrap();

        assert_eq!(tier.get("k").await.unwrap(), Some(Bytes::from_static(b"data")));

        tier.delete("k").await.unwrap();
        assert_eq!(tier.get("k").await.unwrap(), None);
        assert_eq!(tier.writes(), 1);
        assert_eq!(tier.reads(), 2);
        assert_eq!(tier.deletes(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_unavailable() {
        let tier = InMemorySharedTier::unavailable();
        assert_matches!(tier.connect().await, Err(TierError::Connect(_)));
        assert_matches!(tier.get("k").await, Err(TierError::Connect(_)));
        assert_matches!(
            tier.set("k", Bytes::new(), 1).await,
            Err(TierError::Connect(_))
        );

        assert_err!(tier.scan("*").await);

        tier.set_available(true);
        assert_ok!(tier.ping().await);
    }

    #[tokio::test]
    async fn test_in_memory_ttl() {
        let tier = InMemorySharedTier::new();
        tier.insert_raw("k", Bytes::from_static(b"v"), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(tier.get("k").await.unwrap(), None);
        assert!(tier.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_scan_and_delete_many() {
        let tier = InMemorySharedTier::new();
        for key in ["app:user:1", "app:user:2", "app:org:1", "other:user:1"] {
            tier.set(key, Bytes::from_static(b"x"), 60).await.unwrap();
        }

        let keys = tier.scan("app:*user:*").await.unwrap();
        assert_eq!(keys, vec!["app:user:1".to_string(), "app:user:2".to_string()]);

        assert_ok!(tier.delete_many(&keys).await);
        assert_eq!(tier.scan("*").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_usage_bytes() {
        let tier = InMemorySharedTier::new();
        tier.set("ab", Bytes::from_static(b"1234"), 60).await.unwrap();
        assert_eq!(tier.usage_bytes().await.unwrap(), 6);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", ""));
        assert!(glob_match("app:*", "app:user:1"));
        assert!(glob_match("app:*user:*", "app:superuser:1"));
        assert!(!glob_match("app:*user:*", "app:org:1"));
        assert!(glob_match("k?y", "key"));
        assert!(glob_match("a\\*b:*", "a*b:x"));
        assert!(!glob_match("a\\*b:*", "axb:x"));
        assert!(!glob_match("app:*", "ap"));
    }

    #[test]
    fn test_parse_used_memory() {
        let info = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n";
        assert_eq!(parse_used_memory(info), Some(1_048_576));
        assert_eq!(parse_used_memory("# Memory\r\n"), None);
    }

    #[test]
    fn test_redis_invalid_address() {
        let result = RedisSharedTier::new("not a url", Duration::from_millis(100));
        assert_matches!(result, Err(TierError::Connect(_)));
    }

    #[tokio::test]
    async fn test_redis_requires_connect() {
        let tier = RedisSharedTier::new("redis://127.0.0.1:6379", Duration::from_millis(100)).unwrap();
        assert_matches!(tier.get("k").await, Err(TierError::NotConnected));
        assert_matches!(tier.ping().await, Err(TierError::NotConnected));
        assert_eq!(tier.name(), "redis");
    }

    #[tokio::test]
    async fn test_in_memory_huge_ttl_does_not_overflow() {
        let tier = InMemorySharedTier::new();
        assert_ok!(tier.set("k", Bytes::from_static(b"v"), u64::MAX).await);
        assert_eq!(tier.peek("k"), Some(Bytes::from_static(b"v")));
    }

    /// One RESP command (array of bulk strings) and the bytes it used
    fn parse_command(buf: &[u8]) -> Option<(Vec<String>, usize)> {
        fn line(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
            let end = buf.get(pos..)?.windows(2).position(|w| w == b"\r\n")? + pos;
            Some((&buf[pos..end], end + 2))
        }
        fn number(raw: &[u8], marker: &[u8]) -> Option<usize> {
            std::str::from_utf8(raw.strip_prefix(marker)?).ok()?.parse().ok()
        }

        let (header, mut pos) = line(buf, 0)?;
        let count = number(header, b"*")?;
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            let (len_line, start) = line(buf, pos)?;
            let end = start + number(len_line, b"$")?;
            if buf.len() < end + 2 {
                return None;
            }
            args.push(String::from_utf8_lossy(&buf[start..end]).into_owned());
            pos = end + 2;
        }
        Some((args, pos))
    }

    /// Redis stand-in whose keyspace never ends: every SCAN answers a
    /// non-zero cursor after `delay`
    async fn serve_endless_scan(listener: tokio::net::TcpListener, delay: Duration) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&chunk[..n]);

                    while let Some((args, used)) = parse_command(&buf) {
                        buf.drain(..used);
                        let command = args.first().map(|a| a.to_ascii_uppercase());
                        let reply: &[u8] = match command.as_deref() {
                            Some("PING") => &b"+PONG\r\n"[..],
                            Some("SCAN") => {
                                tokio::time::sleep(delay).await;
                                &b"*2\r\n$1\r\n1\r\n*0\r\n"[..]
                            }
                            _ => &b"+OK\r\n"[..],
                        };
                        if socket.write_all(reply).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    }

    #[tokio::test]
    async fn test_redis_scan_bounded_as_a_whole() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("redis://{}", listener.local_addr().unwrap());
        tokio::spawn(serve_endless_scan(listener, Duration::from_millis(50)));

        // Each round (50ms) is well inside the per-call timeout
        let tier = RedisSharedTier::new(&address, Duration::from_secs(1))
            .unwrap()
            .with_scan_timeout(Duration::from_millis(300));
        assert_ok!(tier.connect().await);

        let started = Instant::now();
        let result = tier.scan("app:*").await;
        assert_matches!(
            result,
            Err(TierError::Timeout { operation, timeout_ms: 300 }) if operation == "scan"
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
