//! RESP command channel.
//!
//! Requests go out as an array of bulk strings, replies are decoded from the
//! five RESP reply kinds. Any stream that is [`AsyncRead`] + [`AsyncWrite`]
//! works, [`RespChannel::connect`] builds one over TCP.

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::debug;

use crate::channel::{ChannelError, CommandChannel, Reply};
use crate::Address;

const CRLF: &[u8] = b"\r\n";
// Largest bulk string a redis node will hand out.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
const MAX_ARRAY_LEN: i64 = 1024 * 1024;
// Arrays grow as elements arrive instead of trusting the header.
const ARRAY_PREALLOC: usize = 16;

pub struct RespChannel<S = TcpStream> {
    stream: BufStream<S>,
}

impl RespChannel<TcpStream> {
    /// Open a TCP connection to `addr`, giving up after `timeout` when one is set.
    pub async fn connect(addr: &Address, timeout: Option<Duration>) -> Result<Self, ChannelError> {
        let connect = TcpStream::connect((addr.host(), addr.port()));
        let stream = match timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| ChannelError::Timeout(limit))??,
            None => connect.await?,
        };
        stream.set_nodelay(true)?;
        debug!(%addr, "Connected");
        Ok(Self::new(stream))
    }
}

impl<S> RespChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

impl<S> CommandChannel for RespChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn execute(&mut self, command: &str, args: &[&str]) -> Result<Reply, ChannelError> {
        debug!(command, ?args, "Sending command");
        self.stream.write_all(&encode_command(command, args)).await?;
        self.stream.flush().await?;
        read_reply(&mut self.stream).await
    }
}

/// Encode a command and its arguments as a RESP array of bulk strings.
pub fn encode_command(command: &str, args: &[&str]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", args.len() + 1).into_bytes();
    for part in std::iter::once(command).chain(args.iter().copied()) {
        buf.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        buf.extend_from_slice(part.as_bytes());
        buf.extend_from_slice(CRLF);
    }
    buf
}

// Arrays nest, so the decoder recurses through a boxed future.
fn read_reply<'a, S>(stream: &'a mut BufStream<S>) -> BoxFuture<'a, Result<Reply, ChannelError>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'a,
{
    async move {
        let line = read_line(stream).await?;
        let mut chars = line.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ChannelError::Protocol("empty reply line".to_string()))?;
        let rest = chars.as_str();

        match kind {
            '+' => Ok(Reply::Status(rest.to_string())),
            '-' => Ok(Reply::Error(rest.to_string())),
            ':' => Ok(Reply::Integer(parse_int(rest)?)),
            '$' => {
                let len = parse_int(rest)?;
                if len < 0 {
                    return Ok(Reply::Bulk(None));
                }
                if len > MAX_BULK_LEN {
                    return Err(ChannelError::Protocol(format!(
                        "bulk length {len} exceeds {MAX_BULK_LEN}"
                    )));
                }
                let mut payload = vec![0; len as usize + CRLF.len()];
                stream.read_exact(&mut payload).await?;
                if !payload.ends_with(CRLF) {
                    return Err(ChannelError::Protocol(
                        "bulk payload not terminated by CRLF".to_string(),
                    ));
                }
                payload.truncate(len as usize);
                Ok(Reply::Bulk(Some(payload)))
            }
            '*' => {
                let count = parse_int(rest)?;
                if count < 0 {
                    return Ok(Reply::Array(None));
                }
                if count > MAX_ARRAY_LEN {
                    return Err(ChannelError::Protocol(format!(
                        "array length {count} exceeds {MAX_ARRAY_LEN}"
                    )));
                }
                let mut items = Vec::with_capacity((count as usize).min(ARRAY_PREALLOC));
                for _ in 0..count {
                    items.push(read_reply(stream).await?);
                }
                Ok(Reply::Array(Some(items)))
            }
            other => Err(ChannelError::Protocol(format!(
                "unknown reply type '{other}'"
            ))),
        }
    }
    .boxed()
}

async fn read_line<S>(stream: &mut BufStream<S>) -> Result<String, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut line = String::new();
    if stream.read_line(&mut line).await? == 0 {
        return Err(ChannelError::Closed);
    }
    match line.strip_suffix("\r\n") {
        Some(stripped) => Ok(stripped.to_string()),
        None => Err(ChannelError::Protocol(format!(
            "line not terminated by CRLF: {line:?}"
        ))),
    }
}

fn parse_int(raw: &str) -> Result<i64, ChannelError> {
    raw.parse::<i64>()
        .map_err(|_| ChannelError::Protocol(format!("invalid integer '{raw}'")))
}

#[cfg(test)]
mod test {
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    use super::*;

    async fn exchange(reply: &[u8], command: &str, args: &[&str]) -> (Result<Reply, ChannelError>, Vec<u8>) {
        let (client, mut server) = duplex(4096);
        server.write_all(reply).await.unwrap();
        let mut channel = RespChannel::new(client);
        let result = channel.execute(command, args).await;

        drop(channel);
        let mut sent = Vec::new();
        server.read_to_end(&mut sent).await.unwrap();
        (result, sent)
    }

    #[test]
    fn encodes_commands_as_bulk_arrays() {
        assert_eq!(
            encode_command("SLAVEOF", &["10.0.0.1", "6380"]),
            b"*3\r\n$7\r\nSLAVEOF\r\n$8\r\n10.0.0.1\r\n$4\r\n6380\r\n".to_vec()
        );
        assert_eq!(encode_command("PING", &[]), b"*1\r\n$4\r\nPING\r\n".to_vec());
    }

    #[tokio::test]
    async fn writes_request_and_decodes_status() {
        let (reply, sent) = exchange(b"+OK\r\n", "SLAVEOF", &["NO", "ONE"]).await;
        assert_eq!(reply.unwrap(), Reply::Status("OK".to_string()));
        assert_eq!(sent, encode_command("SLAVEOF", &["NO", "ONE"]));
    }

    #[tokio::test]
    async fn decodes_each_reply_kind() {
        let (reply, _) = exchange(b"-ERR not allowed\r\n", "SLAVEOF", &[]).await;
        assert_eq!(reply.unwrap(), Reply::Error("ERR not allowed".to_string()));

        let (reply, _) = exchange(b":42\r\n", "DBSIZE", &[]).await;
        assert_eq!(reply.unwrap(), Reply::Integer(42));

        let (reply, _) = exchange(b"$13\r\nlast:1\r\nx:2\r\n\r\n", "INFO", &[]).await;
        assert_eq!(reply.unwrap(), Reply::Bulk(Some(b"last:1\r\nx:2\r\n".to_vec())));

        let (reply, _) = exchange(b"$-1\r\n", "GET", &["k"]).await;
        assert_eq!(reply.unwrap(), Reply::Bulk(None));

        let (reply, _) = exchange(b"*2\r\n:1\r\n*1\r\n+a\r\n", "X", &[]).await;
        assert_eq!(
            reply.unwrap(),
            Reply::Array(Some(vec![
                Reply::Integer(1),
                Reply::Array(Some(vec![Reply::Status("a".to_string())]))
            ]))
        );

        let (reply, _) = exchange(b"*-1\r\n", "X", &[]).await;
        assert_eq!(reply.unwrap(), Reply::Array(None));
    }

    #[tokio::test]
    async fn rejects_malformed_replies() {
        let (reply, _) = exchange(b"?what\r\n", "PING", &[]).await;
        assert!(matches!(reply, Err(ChannelError::Protocol(_))));

        let (reply, _) = exchange(b":nan\r\n", "PING", &[]).await;
        assert!(matches!(reply, Err(ChannelError::Protocol(_))));

        let (reply, _) = exchange(b"$2\r\nabcd", "PING", &[]).await;
        assert!(matches!(reply, Err(ChannelError::Protocol(_))));
    }

    // Length headers are checked before anything is allocated for them
    #[tokio::test]
    async fn rejects_oversized_length_headers() {
        let (reply, _) = exchange(b"*9223372036854775807\r\n", "INFO", &["REPLICATION"]).await;
        assert!(matches!(reply, Err(ChannelError::Protocol(_))));

        let (reply, _) = exchange(b"$9223372036854775807\r\n", "INFO", &["REPLICATION"]).await;
        assert!(matches!(reply, Err(ChannelError::Protocol(_))));

        let (reply, _) = exchange(b"$536870913\r\n", "INFO", &[]).await;
        assert!(matches!(reply, Err(ChannelError::Protocol(_))));
    }

    #[tokio::test]
    async fn reports_closed_connection() {
        let (client, mut server): (DuplexStream, DuplexStream) = duplex(4096);
        server.shutdown().await.unwrap();
        let mut channel = RespChannel::new(client);
        assert!(matches!(
            channel.execute("PING", &[]).await,
            Err(ChannelError::Closed)
        ));
    }
}
