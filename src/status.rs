use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Snapshot of how far a replica has followed the old primary's log.
///
/// `first_log_id <= commit_log_id <= last_log_id` is expected to hold, it is
/// not checked here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationStatus {
    /// Oldest log id still retained.
    pub first_log_id: u64,

    /// Newest log id received from the primary.
    pub last_log_id: u64,

    /// Newest log id durably applied.
    pub commit_log_id: u64,
}

impl ReplicationStatus {
    pub fn new(first_log_id: u64, last_log_id: u64, commit_log_id: u64) -> Self {
        Self {
            first_log_id,
            last_log_id,
            commit_log_id,
        }
    }

    /// Rank two replicas as promotion candidates.
    ///
    /// More data received from the old primary wins. Between replicas holding
    /// the same log tail, the one that purged fewer entries wins. The commit id
    /// plays no part in the ranking.
    pub fn compare(&self, other: &ReplicationStatus) -> Ordering {
        self.last_log_id
            .cmp(&other.last_log_id)
            .then_with(|| other.first_log_id.cmp(&self.first_log_id))
    }

    /// Every received entry has been applied.
    pub fn is_drained(&self) -> bool {
        self.last_log_id == self.commit_log_id
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseStatusError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("missing field {0}")]
    MissingField(&'static str),
}

/// Parses the body of an `INFO REPLICATION` reply.
///
/// Lines are `key:value` pairs separated by CRLF. Section headers (`# ...`),
/// blank lines and keys other than the three log ids are ignored.
impl FromStr for ReplicationStatus {
    type Err = ParseStatusError;

    fn from_str(info: &str) -> Result<Self, Self::Err> {
        let mut first = None;
        let mut last = None;
        let mut commit = None;

        for line in info.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let slot = match key {
                "first_log_id" => &mut first,
                "last_log_id" => &mut last,
                "commit_log_id" => &mut commit,
                _ => continue,
            };
            let id = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseStatusError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
            *slot = Some(id);
        }

        Ok(ReplicationStatus {
            first_log_id: first.ok_or(ParseStatusError::MissingField("first_log_id"))?,
            last_log_id: last.ok_or(ParseStatusError::MissingField("last_log_id"))?,
            commit_log_id: commit.ok_or(ParseStatusError::MissingField("commit_log_id"))?,
        })
    }
}
