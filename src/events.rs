//! Structured events emitted while a failover runs.
//!
//! The coordinator never logs on its own; it hands every event to an
//! [`EventSink`]. [`TracingSink`] forwards them to `tracing`, [`MemorySink`]
//! keeps them around so a caller can inspect how far a failed run got.

use tracing::{error, info};

use crate::coordinator::FailoverStep;
use crate::{Address, ReplicationStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverEvent {
    /// A replica had no replication backlog left.
    Drained { address: Address },

    /// A replica reported its replication progress.
    StatusFetched {
        address: Address,
        status: ReplicationStatus,
    },

    /// The best-set was computed, in tie-break order.
    CandidatesSelected { candidates: Vec<Address> },

    /// The chosen replica no longer follows any primary.
    Promoted { address: Address },

    /// A replica now follows the promoted one.
    Repointed { address: Address, primary: Address },

    /// A step failed and the run stopped there.
    StepFailed { step: FailoverStep, error: String },

    /// Every other replica follows the new primary.
    Completed {
        primary: Address,
        repointed: usize,
    },
}

impl FailoverEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Drained { .. } => "failover.drained",
            Self::StatusFetched { .. } => "failover.status_fetched",
            Self::CandidatesSelected { .. } => "failover.candidates_selected",
            Self::Promoted { .. } => "failover.promoted",
            Self::Repointed { .. } => "failover.repointed",
            Self::StepFailed { .. } => "failover.step_failed",
            Self::Completed { .. } => "failover.completed",
        }
    }
}

pub trait EventSink {
    fn record(&mut self, event: FailoverEvent);
}

/// Sink writing every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&mut self, event: FailoverEvent) {
        let name = event.event_name();
        match event {
            FailoverEvent::Drained { address } => info!(event = name, %address, "Replication drained"),
            FailoverEvent::StatusFetched { address, status } => info!(
                event = name,
                %address,
                first_log_id = status.first_log_id,
                last_log_id = status.last_log_id,
                commit_log_id = status.commit_log_id,
                "Fetched replication status"
            ),
            FailoverEvent::CandidatesSelected { candidates } => {
                info!(event = name, ?candidates, "Selected best candidates")
            }
            FailoverEvent::Promoted { address } => info!(event = name, %address, "Promoted replica"),
            FailoverEvent::Repointed { address, primary } => {
                info!(event = name, %address, %primary, "Replica now follows new primary")
            }
            FailoverEvent::StepFailed { step, error } => {
                error!(event = name, ?step, error = %error, "Failover aborted")
            }
            FailoverEvent::Completed { primary, repointed } => {
                info!(event = name, %primary, repointed, "Failover completed")
            }
        }
    }
}

/// Sink that keeps every event in memory, in emission order.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Vec<FailoverEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[FailoverEvent] {
        &self.events
    }

    /// The step a run stopped at, if it failed.
    pub fn failed_step(&self) -> Option<FailoverStep> {
        self.events.iter().find_map(|e| match e {
            FailoverEvent::StepFailed { step, .. } => Some(*step),
            _ => None,
        })
    }

    /// Replicas already following the new primary, in repoint order.
    pub fn repointed(&self) -> Vec<Address> {
        self.events
            .iter()
            .filter_map(|e| match e {
                FailoverEvent::Repointed { address, .. } => Some(address.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MemorySink {
    fn record(&mut self, event: FailoverEvent) {
        self.events.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn record(&mut self, event: FailoverEvent) {
        (**self).record(event)
    }
}
