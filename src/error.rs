use crate::channel::ChannelError;

#[derive(Debug, thiserror::Error)]
pub enum FailoverError {
    #[error("Replication status of {address} is unavailable: {reason}")]
    StatusUnavailable { address: String, reason: String },

    #[error("{address} rejected '{command}': {reason}")]
    CommandRejected {
        address: String,
        command: String,
        reason: String,
    },

    #[error("{address} cannot follow itself")]
    SelfReference { address: String },

    #[error("{address} did not drain its replication backlog within {seconds}s")]
    DrainTimeout { address: String, seconds: u64 },

    #[error("No candidate replicas to promote")]
    NoCandidates,

    #[error("Invalid replica address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Channel to {address} failed: {source}")]
    Channel {
        address: String,
        source: ChannelError,
    },
}
