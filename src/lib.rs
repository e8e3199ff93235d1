//! Failover orchestration for log-replicated stores.
//!
//! After the primary of a replicated store has gone away, [`Coordinator`] picks
//! the replica holding the most replicated data, promotes it and repoints every
//! other [`Replica`] at it. Each replica is driven through a [`CommandChannel`];
//! [`RespChannel`] is the stock implementation for RESP speaking servers.

pub mod address;
pub mod channel;
pub mod coordinator;
mod error;
pub mod events;
pub mod replica;
pub mod resp;
pub mod status;

pub use address::Address;
pub use channel::{ChannelError, CommandChannel, Reply};
pub use coordinator::{best_candidates, Candidate, Coordinator, FailoverReport, FailoverStep};
pub use error::FailoverError;
pub use events::{EventSink, FailoverEvent, MemorySink, TracingSink};
pub use replica::Replica;
pub use resp::RespChannel;
pub use status::ReplicationStatus;

/// Drain budget used when a caller passes a non-positive timeout.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 60;

/// Default cadence for polling replication status while waiting for a drain.
pub const DEFAULT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

pub type Result<T> = std::result::Result<T, FailoverError>;
