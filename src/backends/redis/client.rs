//! RESP client connection and dialer.

use super::config::Endpoint;
use crate::connection::{Dial, FramedStream};
use crate::error::{Result, StorageError};
use crate::protocol::{parse_frame, RespValue};
use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;
use tracing::trace;

pub(crate) const BACKEND: &str = "redis";

/// One connection speaking RESP.
#[derive(Debug)]
pub struct RespConnection {
    stream: FramedStream,
    timeout: Duration,
    scratch: BytesMut,
}

impl RespConnection {
    pub fn new(stream: FramedStream, timeout: Duration) -> Self {
        Self {
            stream,
            timeout,
            scratch: BytesMut::new(),
        }
    }

    /// Sends one command and waits for its reply.
    ///
    /// Error replies become [`StorageError::Backend`].
    pub async fn call(&mut self, command: RespValue) -> Result<RespValue> {
        let reply = tokio::time::timeout(self.timeout, self.round_trip(&command))
            .await
            .map_err(|_| StorageError::Timeout { backend: BACKEND })??;

        match reply {
            RespValue::Error(message) => Err(StorageError::backend(BACKEND, message)),
            reply => Ok(reply),
        }
    }

    async fn round_trip(&mut self, command: &RespValue) -> Result<RespValue> {
        self.scratch.clear();
        command.serialize_into(&mut self.scratch);
        self.stream.send(&self.scratch).await?;

        let reply = self
            .stream
            .read_frame(|buf| Ok(parse_frame(buf)?))
            .await?;
        trace!(reply = reply.type_name(), "Redis reply");
        Ok(reply)
    }

    /// Sends a command that must answer `+OK` (or `+PONG`).
    pub async fn expect_status(&mut self, command: RespValue) -> Result<()> {
        match self.call(command).await? {
            RespValue::SimpleString(_) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

/// Builds the error for a reply of the wrong type.
pub(crate) fn unexpected(reply: &RespValue) -> StorageError {
    StorageError::Protocol(format!("unexpected redis reply: {}", reply.type_name()))
}

/// Opens authenticated connections to one endpoint.
#[derive(Debug, Clone)]
pub struct RedisDialer {
    endpoint: Endpoint,
    timeout: Duration,
}

impl RedisDialer {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Dial for RedisDialer {
    type Conn = RespConnection;

    async fn dial(&self) -> Result<RespConnection> {
        let stream = FramedStream::connect(&self.endpoint.addr, self.timeout, BACKEND).await?;
        let mut conn = RespConnection::new(stream, self.timeout);

        if let Some(password) = &self.endpoint.password {
            let mut auth = vec!["AUTH".to_string()];
            if let Some(username) = &self.endpoint.username {
                auth.push(username.clone());
            }
            auth.push(password.clone());
            conn.expect_status(RespValue::command(auth)).await?;
        }

        if self.endpoint.database != 0 {
            conn.expect_status(RespValue::command([
                "SELECT".to_string(),
                self.endpoint.database.to_string(),
            ]))
            .await?;
        }

        Ok(conn)
    }
}
