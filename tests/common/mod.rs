#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use failover::{Address, ChannelError, CommandChannel, Replica, Reply};

/// Every command issued across all mock channels, as `address COMMAND args`.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Commands sent to one address, without the address prefix.
    pub fn sent_to(&self, address: &str) -> Vec<String> {
        let prefix = format!("{address} ");
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.split(' ').nth(1) == Some(command))
            .count()
    }

    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }
}

/// In-memory stand-in for a replica's connection.
///
/// `INFO` replies are served in order, the last one repeating forever.
pub struct MockChannel {
    address: String,
    log: CommandLog,
    info: Vec<Reply>,
    slaveof: Reply,
    unreachable: bool,
    hanging: bool,
}

impl MockChannel {
    pub fn new(address: &str, log: &CommandLog) -> Self {
        Self {
            address: address.to_string(),
            log: log.clone(),
            info: vec![info_reply(0, 0, 0)],
            slaveof: Reply::Status("OK".to_string()),
            unreachable: false,
            hanging: false,
        }
    }

    pub fn with_info(mut self, replies: Vec<Reply>) -> Self {
        assert!(!replies.is_empty());
        self.info = replies;
        self
    }

    pub fn rejecting_slaveof(mut self, reason: &str) -> Self {
        self.slaveof = Reply::Error(reason.to_string());
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Accept commands but never answer them.
    pub fn hanging(mut self) -> Self {
        self.hanging = true;
        self
    }
}

impl CommandChannel for MockChannel {
    async fn execute(&mut self, command: &str, args: &[&str]) -> Result<Reply, ChannelError> {
        let mut entry = format!("{} {}", self.address, command);
        for arg in args {
            entry.push(' ');
            entry.push_str(arg);
        }
        self.log.push(entry);

        if self.unreachable {
            return Err(ChannelError::Closed);
        }
        if self.hanging {
            std::future::pending::<()>().await;
        }
        match command {
            "INFO" if self.info.len() > 1 => Ok(self.info.remove(0)),
            "INFO" => Ok(self.info[0].clone()),
            "SLAVEOF" => Ok(self.slaveof.clone()),
            _ => Ok(Reply::Error(format!("ERR unknown command '{command}'"))),
        }
    }
}

pub fn info_reply(first: u64, last: u64, commit: u64) -> Reply {
    Reply::Bulk(Some(
        format!(
            "# Replication\r\nrole:slave\r\nslaveof:10.0.0.1:6380\r\nlast_log_id:{last}\r\nfirst_log_id:{first}\r\ncommit_log_id:{commit}\r\n"
        )
        .into_bytes(),
    ))
}

pub fn addr(s: &str) -> Address {
    s.parse().expect("valid test address")
}

/// A drained replica at `address` reporting the given first and last log ids.
pub fn replica(address: &str, first: u64, last: u64, log: &CommandLog) -> Replica<MockChannel> {
    let channel = MockChannel::new(address, log).with_info(vec![info_reply(first, last, last)]);
    Replica::new(addr(address), channel).with_poll_interval(Duration::from_millis(1))
}

pub fn replica_with(address: &str, channel: MockChannel) -> Replica<MockChannel> {
    Replica::new(addr(address), channel).with_poll_interval(Duration::from_millis(1))
}
