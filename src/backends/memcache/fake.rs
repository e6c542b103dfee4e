//! In-process memcached text protocol server for tests.

use super::client::{data_block, line};
use crate::backends::memory::MemoryEngine;
use crate::connection::FramedStream;
use crate::error::Result;
use crate::storage::Value;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;

/// Relative expiration times above this are absolute unix timestamps.
const RELATIVE_LIMIT: u64 = 60 * 60 * 24 * 30;

/// A running fake server.
pub struct FakeMemcache {
    pub addr: SocketAddr,
    pub engine: Arc<MemoryEngine>,
}

impl FakeMemcache {
    /// Starts a server. With `metadump` false, `lru_crawler` answers
    /// `ERROR` like servers built without the crawler.
    pub async fn start(metadump: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let engine = Arc::new(MemoryEngine::new());

        let shared = Arc::clone(&engine);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let engine = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = serve(stream, engine, metadump).await;
                });
            }
        });

        Self { addr, engine }
    }

    pub fn server(&self) -> String {
        self.addr.to_string()
    }
}

async fn serve(stream: tokio::net::TcpStream, engine: Arc<MemoryEngine>, metadump: bool) -> Result<()> {
    let mut framed = FramedStream::new(stream, 1024 * 1024)?;

    loop {
        let request = framed.read_frame(line).await?;
        let parts: Vec<&str> = request.split(' ').collect();

        let reply = match parts.as_slice() {
            ["version"] => "VERSION 1.6.21-fake\r\n".to_string(),
            ["get", key] => match engine.get(key) {
                Some(Value::Bytes(data)) => {
                    let mut reply = format!("VALUE {} 0 {}\r\n", key, data.len()).into_bytes();
                    reply.extend_from_slice(&data);
                    reply.extend_from_slice(b"\r\nEND\r\n");
                    framed.send(&reply).await?;
                    continue;
                }
                _ => "END\r\n".to_string(),
            },
            ["set", key, _flags, exptime, length] => {
                let (Ok(exptime), Ok(length)) = (exptime.parse::<u64>(), length.parse::<usize>())
                else {
                    framed.send(b"CLIENT_ERROR bad command line format\r\n").await?;
                    continue;
                };
                let data = framed.read_frame(|buf| data_block(buf, length)).await?;
                engine.set(key.to_string(), Value::Bytes(data), ttl(exptime));
                "STORED\r\n".to_string()
            }
            ["delete", key] => {
                if engine.delete(key) {
                    "DELETED\r\n".to_string()
                } else {
                    "NOT_FOUND\r\n".to_string()
                }
            }
            ["flush_all"] => {
                engine.flush();
                "OK\r\n".to_string()
            }
            ["lru_crawler", "metadump", "all"] if metadump => {
                let mut reply = String::new();
                for key in engine.keys("*") {
                    reply.push_str(&format!(
                        "key={} exp=-1 la=0 cas=0 fetch=no cls=1 size=64\r\n",
                        utf8_percent_encode(&key, NON_ALPHANUMERIC)
                    ));
                }
                reply.push_str("END\r\n");
                reply
            }
            _ => "ERROR\r\n".to_string(),
        };

        framed.send(reply.as_bytes()).await?;
    }
}

fn ttl(exptime: u64) -> Option<Duration> {
    if exptime == 0 {
        return None;
    }
    if exptime <= RELATIVE_LIMIT {
        return Some(Duration::from_secs(exptime));
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    // Absolute times in the past expire immediately
    Some(Duration::from_secs(exptime.saturating_sub(now)).max(Duration::from_nanos(1)))
}
