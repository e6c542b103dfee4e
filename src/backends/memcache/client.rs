//! Memcached text protocol client.
//!
//! ```text
//!   version\r\n                         VERSION 1.6.21\r\n
//!   get <key>\r\n                       VALUE <key> <flags> <len>\r\n<data>\r\nEND\r\n
//!                                       END\r\n                  (miss)
//!   set <key> <flags> <exp> <len>\r\n   STORED\r\n
//!   <data>\r\n
//!   delete <key>\r\n                    DELETED\r\n | NOT_FOUND\r\n
//!   flush_all\r\n                       OK\r\n
//!   lru_crawler metadump all\r\n        key=<url-encoded> exp=... ...\r\n ... END\r\n
//! ```

use crate::connection::{Dial, FramedStream};
use crate::error::{Result, StorageError};
use crate::protocol::parser::find_crlf;
use crate::storage::Scratch;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use percent_encoding::percent_decode_str;
use std::future::Future;
use std::time::Duration;

pub(crate) const BACKEND: &str = "memcache";

/// Longest key memcached accepts.
pub const MAX_KEY_LENGTH: usize = 250;

/// A reusable `set` request.
#[derive(Debug, Default)]
pub struct Item {
    pub key: String,
    pub value: Vec<u8>,
    pub flags: u32,
    /// Seconds from now, or an absolute unix time beyond 30 days
    pub expiration: u32,
}

impl Scratch for Item {
    fn clear(&mut self) {
        self.key.clear();
        self.value.clear();
        self.flags = 0;
        self.expiration = 0;
    }
}

/// Rejects keys memcached would refuse: too long, or containing
/// whitespace or control characters.
pub fn check_key(key: &str) -> Result<()> {
    if key.len() > MAX_KEY_LENGTH || key.bytes().any(|b| b <= b' ' || b == 0x7f) {
        return Err(StorageError::backend(
            BACKEND,
            format!("malformed key: {:?}", key),
        ));
    }
    Ok(())
}

/// Parses one CRLF-terminated line.
pub(crate) fn line(buf: &[u8]) -> Result<Option<(String, usize)>> {
    match find_crlf(buf) {
        Some(pos) => {
            let text = std::str::from_utf8(&buf[..pos])
                .map_err(|_| StorageError::Protocol("non UTF-8 memcached reply".to_string()))?;
            Ok(Some((text.to_string(), pos + 2)))
        }
        None => Ok(None),
    }
}

/// Maps error lines to errors, passing everything else through.
fn check_line(line: String) -> Result<String> {
    if line == "ERROR"
        || line.starts_with("CLIENT_ERROR")
        || line.starts_with("SERVER_ERROR")
    {
        return Err(StorageError::backend(BACKEND, line));
    }
    Ok(line)
}

/// One connection speaking the text protocol.
#[derive(Debug)]
pub struct MemcacheConnection {
    stream: FramedStream,
    timeout: Duration,
    scratch: BytesMut,
}

impl MemcacheConnection {
    pub fn new(stream: FramedStream, timeout: Duration) -> Self {
        Self {
            stream,
            timeout,
            scratch: BytesMut::new(),
        }
    }

    async fn read_line(&mut self) -> Result<String> {
        check_line(self.stream.read_frame(line).await?)
    }

    fn unexpected(reply: &str) -> StorageError {
        StorageError::Protocol(format!("unexpected memcached reply: {:?}", reply))
    }

    /// Returns the server version.
    pub async fn version(&mut self) -> Result<String> {
        within(self.timeout, self.version_inner()).await
    }

    async fn version_inner(&mut self) -> Result<String> {
        self.stream.send(b"version\r\n").await?;
        let reply = self.read_line().await?;
        reply
            .strip_prefix("VERSION ")
            .map(str::to_string)
            .ok_or_else(|| Self::unexpected(&reply))
    }

    /// Fetches one key.
    pub async fn get(&mut self, key: &str) -> Result<Option<Bytes>> {
        within(self.timeout, self.get_inner(key)).await
    }

    async fn get_inner(&mut self, key: &str) -> Result<Option<Bytes>> {
        self.scratch.clear();
        self.scratch.put_slice(b"get ");
        self.scratch.put_slice(key.as_bytes());
        self.scratch.put_slice(b"\r\n");
        self.stream.send(&self.scratch).await?;

        let header = self.read_line().await?;
        if header == "END" {
            return Ok(None);
        }

        // VALUE <key> <flags> <bytes> [<cas>]
        let mut parts = header.split(' ');
        let length = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("VALUE"), Some(_), Some(_), Some(len)) => len
                .parse::<usize>()
                .map_err(|_| Self::unexpected(&header))?,
            _ => return Err(Self::unexpected(&header)),
        };

        let data = self.stream.read_frame(|buf| data_block(buf, length)).await?;

        let end = self.read_line().await?;
        if end != "END" {
            return Err(Self::unexpected(&end));
        }
        Ok(Some(data))
    }

    /// Stores an item.
    pub async fn set(&mut self, item: &Item) -> Result<()> {
        within(self.timeout, self.set_inner(item)).await
    }

    async fn set_inner(&mut self, item: &Item) -> Result<()> {
        self.scratch.clear();
        self.scratch.put_slice(
            format!(
                "set {} {} {} {}\r\n",
                item.key,
                item.flags,
                item.expiration,
                item.value.len()
            )
            .as_bytes(),
        );
        self.scratch.put_slice(&item.value);
        self.scratch.put_slice(b"\r\n");
        self.stream.send(&self.scratch).await?;

        match self.read_line().await?.as_str() {
            "STORED" => Ok(()),
            other => Err(Self::unexpected(other)),
        }
    }

    /// Deletes a key. Returns `false` if it did not exist.
    pub async fn delete(&mut self, key: &str) -> Result<bool> {
        within(self.timeout, self.delete_inner(key)).await
    }

    async fn delete_inner(&mut self, key: &str) -> Result<bool> {
        self.stream
            .send(format!("delete {}\r\n", key).as_bytes())
            .await?;
        match self.read_line().await?.as_str() {
            "DELETED" => Ok(true),
            "NOT_FOUND" => Ok(false),
            other => Err(Self::unexpected(other)),
        }
    }

    /// Invalidates every item on the server.
    pub async fn flush_all(&mut self) -> Result<()> {
        within(self.timeout, self.flush_all_inner()).await
    }

    async fn flush_all_inner(&mut self) -> Result<()> {
        self.stream.send(b"flush_all\r\n").await?;
        match self.read_line().await?.as_str() {
            "OK" => Ok(()),
            other => Err(Self::unexpected(other)),
        }
    }

    /// Lists every key on the server with `lru_crawler metadump all`.
    ///
    /// Keys arrive percent-encoded and are returned decoded.
    pub async fn metadump_keys(&mut self) -> Result<Vec<String>> {
        // A full dump can take far longer than a single request
        let timeout = self.timeout.max(Duration::from_secs(10));
        within(timeout, self.metadump_inner()).await
    }

    async fn metadump_inner(&mut self) -> Result<Vec<String>> {
        self.stream.send(b"lru_crawler metadump all\r\n").await?;

        let mut keys = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == "END" {
                return Ok(keys);
            }
            // BUSY and similar lines mean the crawler is unavailable
            let Some(encoded) = line.split(' ').find_map(|field| field.strip_prefix("key=")) else {
                return Err(StorageError::backend(BACKEND, line));
            };
            keys.push(percent_decode_str(encoded).decode_utf8_lossy().into_owned());
        }
    }
}

/// Bounds one request/reply exchange.
async fn within<T>(timeout: Duration, op: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, op)
        .await
        .map_err(|_| StorageError::Timeout { backend: BACKEND })?
}

/// Parses a `<data>\r\n` block of known length.
pub(crate) fn data_block(buf: &[u8], length: usize) -> Result<Option<(Bytes, usize)>> {
    if buf.len() < length + 2 {
        return Ok(None);
    }
    if &buf[length..length + 2] != b"\r\n" {
        return Err(StorageError::Protocol(
            "memcached data block missing trailing CRLF".to_string(),
        ));
    }
    Ok(Some((Bytes::copy_from_slice(&buf[..length]), length + 2)))
}

/// Opens connections to one memcached server.
#[derive(Debug, Clone)]
pub struct MemcacheDialer {
    addr: String,
    timeout: Duration,
}

impl MemcacheDialer {
    pub fn new(addr: String, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Dial for MemcacheDialer {
    type Conn = MemcacheConnection;

    async fn dial(&self) -> Result<MemcacheConnection> {
        let stream = FramedStream::connect(&self.addr, self.timeout, BACKEND).await?;
        Ok(MemcacheConnection::new(stream, self.timeout))
    }
}
