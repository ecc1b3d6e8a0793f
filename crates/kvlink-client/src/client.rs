//! RESP client over a single connection.
//!
//! Requests are pipelined: a writer task sends them in submission order and
//! a reader task hands replies back in the same order. Callers never wait on
//! each other, only on their own reply.

use crate::error::{ClientError, Result};
use crate::resp::{self, Frame};
use crate::store::{Connector, Store};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};

type Reply = oneshot::Sender<Result<Frame>>;

struct Pending {
    payload: Vec<u8>,
    reply: Reply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Bounds both the TCP connect and the readiness `PING`.
    pub connect_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(5)),
            request_timeout: Some(Duration::from_secs(10)),
        }
    }
}

pub struct RespClient {
    addr: String,
    requests: mpsc::UnboundedSender<Pending>,
    request_timeout: Option<Duration>,
    closed: watch::Receiver<Option<String>>,
}

impl RespClient {
    /// Connect and wait until the store answers `PING`.
    pub async fn connect(host: &str, port: u16, options: ClientOptions) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream = with_limit(options.connect_timeout, TcpStream::connect(&addr))
            .await
            .ok_or_else(|| ClientError::ConnectTimeout { addr: addr.clone() })??;
        stream.set_nodelay(true)?;

        let client = Self::from_io(stream, addr.clone(), options.request_timeout);
        with_limit(options.connect_timeout, client.request(&["PING"]))
            .await
            .ok_or_else(|| ClientError::ConnectTimeout { addr: addr.clone() })??;

        tracing::debug!("store at {} is ready", addr);
        Ok(client)
    }

    /// Run the client over an already established byte stream.
    pub fn from_io<S>(io: S, addr: String, request_timeout: Option<Duration>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (inflight, inflight_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed) = watch::channel(None);

        tokio::spawn(write_loop(writer, requests_rx, inflight));
        tokio::spawn(read_loop(reader, inflight_rx, closed_tx, addr.clone()));

        Self {
            addr,
            requests,
            request_timeout,
            closed,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one command and wait for its reply. Error replies become
    /// [`ClientError::Server`].
    pub async fn request<A: AsRef<[u8]> + Sync>(&self, args: &[A]) -> Result<Frame> {
        if self.closed.borrow().is_some() {
            return Err(ClientError::Closed);
        }
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Pending {
                payload: resp::encode_command(args),
                reply,
            })
            .map_err(|_| ClientError::Closed)?;

        with_limit(self.request_timeout, rx)
            .await
            .ok_or(ClientError::Timeout)?
            .map_err(|_| ClientError::Closed)?
    }
}

/// `None` if the limit elapsed first.
async fn with_limit<F: std::future::Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut requests: mpsc::UnboundedReceiver<Pending>,
    inflight: mpsc::UnboundedSender<Reply>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(Pending { payload, reply }) = requests.recv().await {
        if let Err(e) = writer.write_all(&payload).await {
            tracing::warn!("write to store failed: {}", e);
            let _ = reply.send(Err(e.into()));
            break;
        }
        // A closed reader drops the reply, which the caller sees as Closed.
        if inflight.send(reply).is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<R>(
    mut reader: R,
    mut inflight: mpsc::UnboundedReceiver<Reply>,
    closed: watch::Sender<Option<String>>,
    addr: String,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let reason = loop {
        match deliver(&mut buf, &mut inflight).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => break e.to_string(),
        }
        match reader.read(&mut chunk).await {
            Ok(0) => break "closed by peer".to_string(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => break e.to_string(),
        }
    };

    tracing::warn!("connection to store at {} lost: {}", addr, reason);
    // Published before any waiter hears about it.
    closed.send_replace(Some(reason));
    inflight.close();
    while let Ok(waiter) = inflight.try_recv() {
        let _ = waiter.send(Err(ClientError::Closed));
    }
}

/// Hand every complete frame in `buf` to the oldest waiter.
///
/// Returns `Ok(false)` once no more requests can arrive.
async fn deliver(buf: &mut Vec<u8>, inflight: &mut mpsc::UnboundedReceiver<Reply>) -> Result<bool> {
    while let Some((frame, used)) = resp::parse(buf)? {
        buf.drain(..used);
        let Some(waiter) = inflight.recv().await else {
            return Ok(false);
        };
        let result = match frame {
            Frame::Error(message) => Err(ClientError::Server(message)),
            other => Ok(other),
        };
        let _ = waiter.send(result);
    }
    Ok(true)
}

#[async_trait]
impl Store for RespClient {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let bytes = self.request(&["GET", key]).await?.into_optional_bytes()?;
        bytes
            .map(String::from_utf8)
            .transpose()
            .map_err(|_| ClientError::protocol(format!("value at '{key}' is not valid UTF-8")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.request(&["SET", key, value]).await?.into_text()?;
        Ok(())
    }

    async fn append(&self, key: &str, value: &str) -> Result<i64> {
        self.request(&["APPEND", key, value]).await?.into_integer()
    }

    async fn dbsize(&self) -> Result<i64> {
        self.request(&["DBSIZE"]).await?.into_integer()
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        self.request(&["DECR", key]).await?.into_integer()
    }

    async fn decrby(&self, key: &str, by: i64) -> Result<i64> {
        let by = by.to_string();
        self.request(&["DECRBY", key, by.as_str()]).await?.into_integer()
    }

    async fn del(&self, keys: &[String]) -> Result<i64> {
        self.request(with_keys("DEL", keys).as_slice()).await?.into_integer()
    }

    async fn dump(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.request(&["DUMP", key]).await?.into_optional_bytes()
    }

    async fn exists(&self, keys: &[String]) -> Result<i64> {
        self.request(with_keys("EXISTS", keys).as_slice()).await?.into_integer()
    }

    async fn key_type(&self, key: &str) -> Result<String> {
        self.request(&["TYPE", key]).await?.into_text()
    }

    async fn renamenx(&self, key: &str, new_key: &str) -> Result<bool> {
        let renamed = self.request(&["RENAMENX", key, new_key]).await?.into_integer()?;
        Ok(renamed == 1)
    }

    fn closed(&self) -> Option<String> {
        self.closed.borrow().clone()
    }
}

fn with_keys<'a>(command: &'a str, keys: &'a [String]) -> Vec<&'a str> {
    let mut args = Vec::with_capacity(keys.len() + 1);
    args.push(command);
    args.extend(keys.iter().map(String::as_str));
    args
}

/// Opens [`RespClient`] connections.
#[derive(Debug, Clone, Default)]
pub struct RespConnector {
    options: ClientOptions,
}

impl RespConnector {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for RespConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn Store>> {
        let client = RespClient::connect(host, port, self.options).await?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A client wired to an in-process fake store driven by `respond`.
    fn scripted<F>(mut respond: F, request_timeout: Option<Duration>) -> RespClient
    where
        F: FnMut(Vec<String>) -> Option<Vec<u8>> + Send + 'static,
    {
        let (client_io, server_io) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let (mut rd, mut wr) = tokio::io::split(server_io);
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                while let Some((frame, used)) = resp::parse(&buf).unwrap() {
                    buf.drain(..used);
                    let Frame::Array(Some(items)) = frame else {
                        panic!("commands are arrays");
                    };
                    let args = items.into_iter().map(|f| f.into_text().unwrap()).collect();
                    match respond(args) {
                        Some(reply) => wr.write_all(&reply).await.unwrap(),
                        None => return,
                    }
                }
                let n = rd.read(&mut chunk).await.unwrap();
                if n == 0 {
                    return;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        });
        RespClient::from_io(client_io, "scripted:0".into(), request_timeout)
    }

    #[tokio::test]
    async fn typed_replies() {
        let client = scripted(
            |args| {
                let reply: &[u8] = match args[0].as_str() {
                    "SET" => b"+OK\r\n",
                    "GET" if args[1] == "missing" => b"$-1\r\n",
                    "GET" => b"$7\r\n{\"a\":1}\r\n",
                    "TYPE" => b"+string\r\n",
                    "RENAMENX" => b":0\r\n",
                    "DEL" | "EXISTS" => return Some(format!(":{}\r\n", args.len() - 1).into_bytes()),
                    _ => b"-ERR unknown command\r\n",
                };
                Some(reply.to_vec())
            },
            Some(Duration::from_secs(2)),
        );

        client.set("x", "{\"a\":1}").await.unwrap();
        assert_eq!(client.get("x").await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(client.get("missing").await.unwrap(), None);
        assert_eq!(client.key_type("x").await.unwrap(), "string");
        assert!(!client.renamenx("x", "y").await.unwrap());
        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(client.del(&keys).await.unwrap(), 3);
        assert_eq!(client.exists(&keys[..1]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn error_replies_pass_through() {
        let client = scripted(
            |_| Some(b"-ERR value is not an integer or out of range\r\n".to_vec()),
            None,
        );
        match client.decr("name").await {
            Err(ClientError::Server(msg)) => {
                assert_eq!(msg, "ERR value is not an integer or out of range")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn pipelined_replies_keep_their_order() {
        let client = scripted(
            |args| Some(format!(":{}\r\n", args[2]).into_bytes()),
            Some(Duration::from_secs(2)),
        );
        let (a, b, c) = tokio::join!(
            client.decrby("k", 1),
            client.decrby("k", 2),
            client.decrby("k", 3)
        );
        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (1, 2, 3));
    }

    #[tokio::test]
    async fn dropped_connection_fails_pending_requests() {
        let client = scripted(|_| None, Some(Duration::from_secs(2)));
        assert!(matches!(client.dbsize().await, Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn lost_connection_is_reported() {
        let client = scripted(|_| None, Some(Duration::from_secs(2)));
        assert_eq!(client.closed(), None);

        assert!(matches!(client.dbsize().await, Err(ClientError::Closed)));
        assert_eq!(client.closed().as_deref(), Some("closed by peer"));
        assert!(matches!(client.dbsize().await, Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn non_utf8_values_are_rejected() {
        let client = scripted(|_| Some(b"$2\r\n\xff\xfe\r\n".to_vec()), Some(Duration::from_secs(2)));
        match client.get("bin").await {
            Err(ClientError::Protocol(msg)) => assert!(msg.contains("'bin'"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_store_times_out() {
        let client = scripted(|_| Some(Vec::new()), Some(Duration::from_millis(50)));
        assert!(matches!(client.dbsize().await, Err(ClientError::Timeout)));
    }
}
