//! The command channel is the only way the orchestrator talks to a replica.
//!
//! Anything able to send a named command with string arguments and hand back a
//! [`Reply`] can drive a failover; [`crate::RespChannel`] is the TCP one.

use std::future::Future;

/// Reply to a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple status line such as `OK`.
    Status(String),

    /// The node refused the command.
    Error(String),

    Integer(i64),

    /// Binary safe payload, `None` for the null bulk reply.
    Bulk(Option<Vec<u8>>),

    /// Nested replies, `None` for the null array reply.
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Textual payload of a status or bulk reply.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Reply::Status(s) => Some(s.clone()),
            Reply::Bulk(Some(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed reply: {0}")]
    Protocol(String),

    #[error("Connection closed by peer")]
    Closed,

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A live connection able to execute commands against one node.
///
/// Implementations are used by one command at a time, the returned future
/// must resolve before the next command is issued on the same channel.
pub trait CommandChannel: Send {
    fn execute(
        &mut self,
        command: &str,
        args: &[&str],
    ) -> impl Future<Output = Result<Reply, ChannelError>> + Send;
}
