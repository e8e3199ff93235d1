use std::time::Duration;

use tracing::debug;

use crate::channel::{CommandChannel, Reply};
use crate::{Address, FailoverError, ReplicationStatus, Result, RespChannel};
use crate::{DEFAULT_DRAIN_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL};

/// Handle on one replicated node.
///
/// The handle owns the node's [`CommandChannel`] for as long as it lives; hand
/// it back with [`Replica::into_channel`] to keep using the connection.
pub struct Replica<C> {
    address: Address,
    channel: C,
    poll_interval: Duration,
}

impl Replica<RespChannel> {
    /// Connect to `address` over TCP.
    pub async fn connect(address: Address, timeout: Option<Duration>) -> Result<Self> {
        let channel = RespChannel::connect(&address, timeout)
            .await
            .map_err(|source| FailoverError::Channel {
                address: address.to_string(),
                source,
            })?;
        Ok(Replica::new(address, channel))
    }
}

impl<C> Replica<C>
where
    C: CommandChannel,
{
    pub fn new(address: Address, channel: C) -> Self {
        Self {
            address,
            channel,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Use `interval` between status polls while waiting for a drain.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Read the node's current replication progress with `INFO REPLICATION`.
    pub async fn fetch_replication_status(&mut self) -> Result<ReplicationStatus> {
        let reply = self
            .channel
            .execute("INFO", &["REPLICATION"])
            .await
            .map_err(|e| self.status_unavailable(e))?;

        let info = match reply {
            Reply::Error(reason) => return Err(self.status_unavailable(reason)),
            other => other
                .as_text()
                .ok_or_else(|| self.status_unavailable(format!("unexpected reply {other:?}")))?,
        };

        let status = info
            .parse::<ReplicationStatus>()
            .map_err(|e| self.status_unavailable(e))?;
        debug!(address = %self.address, ?status, "Fetched replication status");
        Ok(status)
    }

    /// Detach the node from its primary so it serves as one itself.
    ///
    /// Promoting a node that already is a primary succeeds.
    pub async fn promote(&mut self) -> Result<()> {
        self.command("SLAVEOF", &["NO", "ONE"]).await
    }

    /// Make the node replicate from `target`.
    pub async fn follow(&mut self, target: &Address) -> Result<()> {
        if target == &self.address {
            return Err(FailoverError::SelfReference {
                address: self.address.to_string(),
            });
        }
        let port = target.port().to_string();
        self.command("SLAVEOF", &[target.host(), port.as_str()]).await
    }

    /// Poll until every received log entry has been applied.
    ///
    /// A non-positive `timeout_seconds` waits for the default 60 seconds.
    /// The budget bounds wall-clock time as well, so a node that stops
    /// answering still ends in `DrainTimeout`. Status errors stop the wait
    /// immediately.
    pub async fn wait_for_replication_drain(&mut self, timeout_seconds: i64) -> Result<()> {
        let budget = drain_budget(timeout_seconds);
        let attempts = poll_attempts(budget, self.poll_interval);

        let drained = match tokio::time::timeout(budget, self.poll_until_drained(attempts)).await {
            Ok(drained) => drained?,
            Err(_) => {
                debug!(address = %self.address, ?budget, "Node did not answer within the drain budget");
                false
            }
        };
        if drained {
            return Ok(());
        }

        Err(FailoverError::DrainTimeout {
            address: self.address.to_string(),
            seconds: budget.as_secs(),
        })
    }

    async fn poll_until_drained(&mut self, attempts: u64) -> Result<bool> {
        for attempt in 1..=attempts {
            let status = self.fetch_replication_status().await?;
            if status.is_drained() {
                return Ok(true);
            }
            debug!(
                address = %self.address,
                attempt,
                backlog = status.last_log_id.saturating_sub(status.commit_log_id),
                "Replication backlog not drained yet"
            );
            if attempt < attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        Ok(false)
    }

    async fn command(&mut self, command: &str, args: &[&str]) -> Result<()> {
        match self.channel.execute(command, args).await {
            Ok(Reply::Error(reason)) => Err(FailoverError::CommandRejected {
                address: self.address.to_string(),
                command: std::iter::once(command)
                    .chain(args.iter().copied())
                    .collect::<Vec<_>>()
                    .join(" "),
                reason,
            }),
            Ok(_) => Ok(()),
            Err(source) => Err(FailoverError::Channel {
                address: self.address.to_string(),
                source,
            }),
        }
    }

    fn status_unavailable(&self, reason: impl ToString) -> FailoverError {
        FailoverError::StatusUnavailable {
            address: self.address.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Time allowed for a drain wait, non-positive inputs fall back to the default.
pub fn drain_budget(timeout_seconds: i64) -> Duration {
    if timeout_seconds <= 0 {
        Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS)
    } else {
        Duration::from_secs(timeout_seconds as u64)
    }
}

// Number of status polls that fit in the budget, always at least one.
fn poll_attempts(budget: Duration, interval: Duration) -> u64 {
    let attempts = budget.as_nanos() / interval.as_nanos().max(1);
    u64::try_from(attempts).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn non_positive_timeout_uses_default_budget() {
        assert_eq!(drain_budget(0), Duration::from_secs(60));
        assert_eq!(drain_budget(-3), drain_budget(60));
        assert_eq!(drain_budget(5), Duration::from_secs(5));
    }

    #[test]
    fn one_poll_per_interval() {
        assert_eq!(poll_attempts(Duration::from_secs(60), Duration::from_secs(1)), 60);
        assert_eq!(poll_attempts(Duration::from_secs(1), Duration::from_millis(100)), 10);
        assert_eq!(poll_attempts(Duration::from_secs(1), Duration::from_secs(5)), 1);
    }
}
