//! Waiting for a job to complete.
//!
//! [`JobWaiter`] selects over three sources: watch events forwarded by a
//! background task, a fixed-interval status poll and an absolute deadline.
//! The first to produce a terminal state ends the wait.

use crate::cluster::{ClusterError, ControlPlane, WatchEvent};
use crate::error::{DeployError, Result};
use k8s_openapi::api::batch::v1::Job;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

/// Timing for [`JobWaiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// Consecutive poll failures that end the wait.
    pub max_poll_failures: u32,
    /// Absolute deadline.
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            max_poll_failures: 5,
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// Observed state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// No pods active and no condition reported.
    Pending,
    /// Pods active, no terminal condition yet.
    Running,
    /// The job completed.
    Succeeded,
    /// The job reached a non-complete condition.
    Failed {
        /// The condition's message.
        message: String,
    },
}

impl JobState {
    /// Evaluate a job's status conditions.
    ///
    /// Only conditions with status `True` count. `Complete` is success;
    /// `SuccessCriteriaMet` and `Suspended` leave the job running; any other
    /// condition type is a failure carrying its message.
    pub fn of(job: &Job) -> Self {
        let Some(status) = job.status.as_ref() else {
            return Self::Pending;
        };
        for condition in status.conditions.iter().flatten() {
            if condition.status != "True" {
                continue;
            }
            match condition.type_.as_str() {
                "Complete" => return Self::Succeeded,
                "SuccessCriteriaMet" | "Suspended" => {}
                other => {
                    return Self::Failed {
                        message: condition
                            .message
                            .clone()
                            .or_else(|| condition.reason.clone())
                            .unwrap_or_else(|| other.to_string()),
                    };
                }
            }
        }
        if status.active.unwrap_or(0) > 0 {
            Self::Running
        } else {
            Self::Pending
        }
    }

    /// The final outcome, if this state is terminal.
    pub fn outcome(&self) -> Option<JobOutcome> {
        match self {
            Self::Succeeded => Some(JobOutcome::Succeeded),
            Self::Failed { message } => Some(JobOutcome::Failed {
                message: message.clone(),
            }),
            Self::Pending | Self::Running => None,
        }
    }
}

/// How a waited-on job finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job completed.
    Succeeded,
    /// The job failed.
    Failed {
        /// Failure message from the job's status.
        message: String,
    },
}

/// Waits for one job to reach a terminal condition.
pub struct JobWaiter<'a> {
    cluster: &'a dyn ControlPlane,
    config: WaitConfig,
}

impl<'a> JobWaiter<'a> {
    /// Create a waiter.
    pub fn new(cluster: &'a dyn ControlPlane, config: WaitConfig) -> Self {
        Self { cluster, config }
    }

    /// Wait for job `name` in `namespace`.
    ///
    /// Deletion, an undecodable watch event, too many consecutive poll
    /// failures and the deadline are all fatal.
    pub async fn wait(&self, name: &str, namespace: &str) -> Result<JobOutcome> {
        let deadline = Instant::now() + self.config.timeout;
        tracing::info!(job = %name, namespace = %namespace, "Waiting for job");

        let job = self.cluster.get_job(name, namespace).await?.ok_or_else(|| {
            ClusterError::NotFound {
                message: format!("job {name:?} not found in namespace {namespace:?}"),
            }
        })?;
        let mut last = JobState::of(&job);
        if let Some(outcome) = last.outcome() {
            return Ok(outcome);
        }

        let mut stream = self.cluster.watch_job(name, namespace).await?;
        let (tx, rx) = mpsc::channel(16);
        let forwarder = tokio::spawn(async move {
            use futures::StreamExt;
            while let Some(event) = stream.next().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        let result = self.drive(name, namespace, rx, deadline, &mut last).await;
        forwarder.abort();
        result
    }

    async fn drive(
        &self,
        name: &str,
        namespace: &str,
        mut events: mpsc::Receiver<crate::cluster::ClusterResult<WatchEvent<Job>>>,
        deadline: Instant,
        last: &mut JobState,
    ) -> Result<JobOutcome> {
        let period = self.config.poll_interval;
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let timeout = tokio::time::sleep_until(deadline);
        tokio::pin!(timeout);

        let mut watching = true;
        let mut poll_failures = 0;

        loop {
            let job = tokio::select! {
                biased;

                event = events.recv(), if watching => match event {
                    Some(Ok(WatchEvent::Applied(job))) => job,
                    Some(Ok(WatchEvent::Deleted(_))) => {
                        return Err(DeployError::Deleted {
                            kind: "job".to_string(),
                            name: name.to_string(),
                        });
                    }
                    Some(Err(e)) => return Err(DeployError::WatchStream(e.to_string())),
                    None => {
                        tracing::warn!(job = %name, "Watch stream closed, relying on polls");
                        watching = false;
                        continue;
                    }
                },

                _ = poll.tick() => match self.cluster.get_job(name, namespace).await {
                    Ok(Some(job)) => {
                        poll_failures = 0;
                        job
                    }
                    Ok(None) => {
                        return Err(DeployError::Deleted {
                            kind: "job".to_string(),
                            name: name.to_string(),
                        });
                    }
                    Err(e) => {
                        poll_failures += 1;
                        if poll_failures >= self.config.max_poll_failures {
                            return Err(e.into());
                        }
                        tracing::warn!(job = %name, error = %e, poll_failures, "Job poll failed");
                        continue;
                    }
                },

                _ = &mut timeout => {
                    return Err(DeployError::Timeout {
                        name: name.to_string(),
                        after: self.config.timeout,
                    });
                }
            };

            let state = JobState::of(&job);
            if state != *last {
                tracing::debug!(job = %name, state = ?state, "Job state changed");
                *last = state;
            }
            if let Some(outcome) = last.outcome() {
                match &outcome {
                    JobOutcome::Succeeded => tracing::info!(job = %name, "Job completed"),
                    JobOutcome::Failed { message } => {
                        tracing::warn!(job = %name, message = %message, "Job failed")
                    }
                }
                return Ok(outcome);
            }
        }
    }
}
