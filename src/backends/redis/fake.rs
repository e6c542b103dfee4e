//! In-process RESP server for tests.
//!
//! Implements the handful of commands the adapter sends, on top of the
//! memory engine, so the adapter can be exercised over real sockets.

use crate::backends::memory::MemoryEngine;
use crate::connection::FramedStream;
use crate::protocol::{parse_frame, RespValue};
use crate::storage::Value;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// A running fake server.
pub struct FakeRedis {
    pub addr: SocketAddr,
    pub engine: Arc<MemoryEngine>,
}

impl FakeRedis {
    /// Starts a server; when `password` is set, every command but AUTH
    /// requires authentication first.
    pub async fn start(password: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let engine = Arc::new(MemoryEngine::new());
        let password = password.map(str::to_string);

        let shared = Arc::clone(&engine);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Handler {
                    engine: Arc::clone(&shared),
                    password: password.clone(),
                    authenticated: password.is_none(),
                };
                tokio::spawn(handler.run(stream));
            }
        });

        Self { addr, engine }
    }

    pub fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }
}

struct Handler {
    engine: Arc<MemoryEngine>,
    password: Option<String>,
    authenticated: bool,
}

impl Handler {
    async fn run(mut self, stream: tokio::net::TcpStream) {
        let Ok(mut framed) = FramedStream::new(stream, 1024 * 1024) else {
            return;
        };

        // Any read error means the client went away
        while let Ok(command) = framed.read_frame(|buf| Ok(parse_frame(buf)?)).await {
            let reply = self.execute(command);
            if framed.send(&reply.serialize()).await.is_err() {
                return;
            }
        }
    }

    fn execute(&mut self, command: RespValue) -> RespValue {
        let Some(args) = command.into_array() else {
            return RespValue::error("ERR invalid command format");
        };
        let args: Vec<Bytes> = args.into_iter().filter_map(RespValue::into_bytes).collect();
        let Some(name) = args.first() else {
            return RespValue::error("ERR empty command");
        };
        let name = String::from_utf8_lossy(name).to_uppercase();
        let args = &args[1..];

        if name == "AUTH" {
            return self.cmd_auth(args);
        }
        if !self.authenticated {
            return RespValue::error("NOAUTH Authentication required.");
        }

        match name.as_str() {
            "PING" => RespValue::simple_string("PONG"),
            "SELECT" => RespValue::simple_string("OK"),
            "GET" => self.cmd_get(args),
            "SET" => self.cmd_set(args),
            "DEL" => self.cmd_del(args),
            "SCAN" => self.cmd_scan(args),
            "FLUSHDB" => {
                self.engine.flush();
                RespValue::simple_string("OK")
            }
            _ => RespValue::error(format!("ERR unknown command '{}'", name)),
        }
    }

    fn cmd_auth(&mut self, args: &[Bytes]) -> RespValue {
        let given = args.last().map(|p| String::from_utf8_lossy(p).into_owned());
        if given.is_some() && given == self.password {
            self.authenticated = true;
            RespValue::simple_string("OK")
        } else {
            RespValue::error("WRONGPASS invalid username-password pair")
        }
    }

    fn cmd_get(&self, args: &[Bytes]) -> RespValue {
        let [key] = args else {
            return RespValue::error("ERR wrong number of arguments for 'GET' command");
        };
        match self.engine.get(&String::from_utf8_lossy(key)) {
            Some(Value::Bytes(data)) => RespValue::BulkString(data),
            _ => RespValue::Null,
        }
    }

    /// SET key value [PX milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> RespValue {
        let (key, value, ttl) = match args {
            [key, value] => (key, value, None),
            [key, value, opt, ms] if opt.eq_ignore_ascii_case(b"PX") => {
                let now = crate::storage::unix_millis_now();
                match std::str::from_utf8(ms).ok().and_then(|s| s.parse::<i64>().ok()) {
                    Some(ms) if ms > 0 && now.checked_add(ms).is_some() => {
                        (key, value, Some(Duration::from_millis(ms as u64)))
                    }
                    _ => return RespValue::error("ERR invalid expire time in 'set' command"),
                }
            }
            _ => return RespValue::error("ERR syntax error"),
        };

        self.engine.set(
            String::from_utf8_lossy(key).into_owned(),
            Value::Bytes(value.clone()),
            ttl,
        );
        RespValue::simple_string("OK")
    }

    fn cmd_del(&self, args: &[Bytes]) -> RespValue {
        let keys: Vec<String> = args
            .iter()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .collect();
        RespValue::Integer(self.engine.delete_many(&keys) as i64)
    }

    /// SCAN cursor [MATCH pattern] [COUNT count]
    ///
    /// The cursor is an offset into the sorted key list.
    fn cmd_scan(&self, args: &[Bytes]) -> RespValue {
        let Some(cursor) = args
            .first()
            .and_then(|c| std::str::from_utf8(c).ok())
            .and_then(|c| c.parse::<usize>().ok())
        else {
            return RespValue::error("ERR invalid cursor");
        };

        let mut pattern = "*".to_string();
        let mut count = 10usize;
        for pair in args[1..].chunks(2) {
            match pair {
                [opt, value] if opt.eq_ignore_ascii_case(b"MATCH") => {
                    pattern = String::from_utf8_lossy(value).into_owned();
                }
                [opt, value] if opt.eq_ignore_ascii_case(b"COUNT") => {
                    count = String::from_utf8_lossy(value).parse().unwrap_or(10);
                }
                _ => return RespValue::error("ERR syntax error"),
            }
        }

        let mut keys = self.engine.keys(&pattern);
        keys.sort();
        let page: Vec<RespValue> = keys
            .iter()
            .skip(cursor)
            .take(count)
            .map(|k| RespValue::bulk_string(k.clone()))
            .collect();
        let next = if cursor + page.len() >= keys.len() {
            0
        } else {
            cursor + page.len()
        };

        RespValue::Array(vec![
            RespValue::bulk_string(next.to_string()),
            RespValue::Array(page),
        ])
    }
}
