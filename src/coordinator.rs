//! Candidate selection and the promote/repoint sequence.
//!
//! A run is a fixed pipeline: optionally wait for every replica to drain
//! (all waits run at once, the first failure in input order is reported),
//! select the best candidates, promote the first of them, then repoint the
//! remaining replicas one at a time. The first failing step ends the run.
//! Nothing is retried and replicas already repointed stay repointed; the
//! event sink shows how far the run got.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::debug;

use crate::channel::CommandChannel;
use crate::events::{EventSink, FailoverEvent, TracingSink};
use crate::{Address, FailoverError, Replica, ReplicationStatus, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailoverStep {
    Drain,
    Select,
    Promote,
    Repoint,
}

/// A replica in the best-set together with the status it was ranked by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Position of the replica in the input slice.
    pub index: usize,
    pub address: Address,
    pub status: ReplicationStatus,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct FailoverReport {
    pub primary: Address,
    pub primary_status: ReplicationStatus,
    /// Every replica that tied for best, the primary first.
    pub candidates: Vec<Address>,
    pub repointed: Vec<Address>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Indices of the best statuses, in input order.
///
/// The first status seeds the set, a strictly better one replaces it, an equal
/// one joins it and a worse one is skipped.
pub fn best_candidates(statuses: &[ReplicationStatus]) -> Vec<usize> {
    statuses
        .iter()
        .enumerate()
        .fold(Vec::new(), |mut best, (i, status)| {
            match best.first().map(|&b| status.compare(&statuses[b])) {
                None | Some(Ordering::Greater) => vec![i],
                Some(Ordering::Equal) => {
                    best.push(i);
                    best
                }
                Some(Ordering::Less) => best,
            }
        })
}

pub struct Coordinator<S = TracingSink> {
    sink: S,
    drain_timeout: Option<i64>,
}

impl Default for Coordinator<TracingSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator<TracingSink> {
    pub fn new() -> Self {
        Self::with_sink(TracingSink)
    }
}

impl<S> Coordinator<S>
where
    S: EventSink,
{
    pub fn with_sink(sink: S) -> Self {
        Self {
            sink,
            drain_timeout: None,
        }
    }

    /// Wait for every replica to drain its backlog before selecting.
    ///
    /// A replica that does not drain in time fails the run with
    /// [`FailoverError::DrainTimeout`]; whether to retry without waiting is
    /// left to the caller.
    pub fn with_drain_wait(mut self, timeout_seconds: i64) -> Self {
        self.drain_timeout = Some(timeout_seconds);
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Rank every replica and return the ones tied for best.
    ///
    /// Statuses are fetched concurrently, but all of them must arrive: the
    /// first failure in input order is returned and nothing is ranked.
    pub async fn select_best_candidates<C>(
        &mut self,
        replicas: &mut [Replica<C>],
    ) -> Result<Vec<Candidate>>
    where
        C: CommandChannel,
    {
        let statuses = join_all(replicas.iter_mut().map(|r| r.fetch_replication_status()))
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        for (replica, status) in replicas.iter().zip(&statuses) {
            self.sink.record(FailoverEvent::StatusFetched {
                address: replica.address().clone(),
                status: *status,
            });
        }

        let candidates = best_candidates(&statuses)
            .into_iter()
            .map(|index| Candidate {
                index,
                address: replicas[index].address().clone(),
                status: statuses[index],
            })
            .collect::<Vec<_>>();
        self.sink.record(FailoverEvent::CandidatesSelected {
            candidates: candidates.iter().map(|c| c.address.clone()).collect(),
        });
        Ok(candidates)
    }

    /// Promote the best replica and make every other replica follow it.
    #[tracing::instrument(skip_all, fields(replicas = replicas.len()))]
    pub async fn run_failover<C>(&mut self, replicas: &mut [Replica<C>]) -> Result<FailoverReport>
    where
        C: CommandChannel,
    {
        let started_at = Utc::now();

        if let Some(timeout) = self.drain_timeout {
            let drained = self.drain(replicas, timeout).await;
            self.step(FailoverStep::Drain, drained)?;
        }

        let selected = self.select_best_candidates(replicas).await;
        let candidates = self.step(FailoverStep::Select, selected)?;
        let primary = self.step(
            FailoverStep::Select,
            candidates.first().cloned().ok_or(FailoverError::NoCandidates),
        )?;

        let promoted = replicas[primary.index].promote().await;
        self.step(FailoverStep::Promote, promoted)?;
        self.sink.record(FailoverEvent::Promoted {
            address: primary.address.clone(),
        });

        let repointed = self.repoint(replicas, &primary.address).await?;
        self.sink.record(FailoverEvent::Completed {
            primary: primary.address.clone(),
            repointed: repointed.len(),
        });

        Ok(FailoverReport {
            primary: primary.address,
            primary_status: primary.status,
            candidates: candidates.into_iter().map(|c| c.address).collect(),
            repointed,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn drain<C>(&mut self, replicas: &mut [Replica<C>], timeout: i64) -> Result<()>
    where
        C: CommandChannel,
    {
        join_all(
            replicas
                .iter_mut()
                .map(|r| r.wait_for_replication_drain(timeout)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

        for replica in replicas.iter() {
            self.sink.record(FailoverEvent::Drained {
                address: replica.address().clone(),
            });
        }
        Ok(())
    }

    // Followers are repointed strictly one after another, a failure leaves
    // the rest untouched.
    async fn repoint<C>(
        &mut self,
        replicas: &mut [Replica<C>],
        primary: &Address,
    ) -> Result<Vec<Address>>
    where
        C: CommandChannel,
    {
        let mut repointed = Vec::with_capacity(replicas.len().saturating_sub(1));
        for replica in replicas.iter_mut() {
            if replica.address() == primary {
                debug!(%primary, "Skipping promoted replica");
                continue;
            }
            let followed = replica.follow(primary).await;
            self.step(FailoverStep::Repoint, followed)?;
            self.sink.record(FailoverEvent::Repointed {
                address: replica.address().clone(),
                primary: primary.clone(),
            });
            repointed.push(replica.address().clone());
        }
        Ok(repointed)
    }

    // Reports a failed step to the sink before handing the error back.
    fn step<T>(&mut self, step: FailoverStep, result: Result<T>) -> Result<T> {
        result.map_err(|error| {
            self.sink.record(FailoverEvent::StepFailed {
                step,
                error: error.to_string(),
            });
            error
        })
    }
}
