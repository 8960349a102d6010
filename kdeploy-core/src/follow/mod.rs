//! Following a pod's log across container restarts.
//!
//! The driving loop in [`LogFollower::follow`] owns all control state. The
//! pod watch and the log copy run as background tasks that only push events
//! into channels; [`FollowerMachine`] decides what each event means.

mod machine;

pub use machine::{Action, FollowerMachine, Signal, StreamState};

use crate::cluster::{ClusterError, ClusterResult, ControlPlane, PodPhase, WatchEvent};
use crate::error::{DeployError, Result};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ContainerState, Pod};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Sleep;

/// Timing for [`LogFollower`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowConfig {
    /// Poll interval while the pod is pending.
    pub pending_poll: Duration,
    /// Delay between a container terminating and closing its stream.
    pub close_grace: Duration,
    /// Pod lookups after a stream ends before it is reopened.
    pub phase_checks: u32,
    /// Delay before each of those lookups.
    pub phase_check_interval: Duration,
    /// Consecutive reopens after a stream ends while the container runs.
    pub max_reconnects: u32,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            pending_poll: Duration::from_secs(2),
            close_grace: Duration::from_secs(3),
            phase_checks: 5,
            phase_check_interval: Duration::from_secs(1),
            max_reconnects: 5,
        }
    }
}

/// The final phase of a followed pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodOutcome {
    /// Every container exited successfully.
    Succeeded,
    /// The pod failed.
    Failed {
        /// Termination reason of the first container, if reported.
        reason: Option<String>,
        /// Exit code of the first container, if reported.
        exit_code: Option<i32>,
    },
    /// The pod's phase became unknown.
    Unknown,
}

impl PodOutcome {
    fn of(pod: &Pod) -> Option<Self> {
        match PodPhase::of(pod) {
            PodPhase::Succeeded => Some(Self::Succeeded),
            PodPhase::Unknown => Some(Self::Unknown),
            PodPhase::Failed => {
                let terminated = first_container_state(pod).and_then(|s| s.terminated.as_ref());
                Some(Self::Failed {
                    reason: terminated.and_then(|t| t.reason.clone()),
                    exit_code: terminated.map(|t| t.exit_code),
                })
            }
            PodPhase::Pending | PodPhase::Running => None,
        }
    }
}

fn first_container_state(pod: &Pod) -> Option<&ContainerState> {
    pod.status
        .as_ref()?
        .container_statuses
        .as_ref()?
        .first()?
        .state
        .as_ref()
}

fn container_signal(pod: &Pod) -> Option<Signal> {
    let state = first_container_state(pod)?;
    if state.running.is_some() {
        Some(Signal::Start)
    } else if state.terminated.is_some() {
        Some(Signal::Close)
    } else {
        None
    }
}

/// Streams a pod's log to a writer until the pod finishes.
pub struct LogFollower<'a> {
    cluster: &'a dyn ControlPlane,
    config: FollowConfig,
}

impl<'a> LogFollower<'a> {
    /// Create a follower.
    pub fn new(cluster: &'a dyn ControlPlane, config: FollowConfig) -> Self {
        Self { cluster, config }
    }

    /// Follow pod `name`, copying its log into `out`.
    pub async fn follow<W>(&self, name: &str, namespace: &str, out: Arc<Mutex<W>>) -> Result<PodOutcome>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pod = self.wait_until_started(name, namespace).await?;

        let mut watch = self.cluster.watch_pod(name, namespace).await?;
        let (event_tx, events) = mpsc::channel(16);
        let watcher = tokio::spawn(async move {
            while let Some(event) = watch.next().await {
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        let (ended_tx, ended) = mpsc::channel(4);
        let mut session = Session {
            cluster: self.cluster,
            config: self.config,
            name,
            namespace,
            out,
            ended_tx,
            machine: FollowerMachine::new(),
            copy: None,
            generation: 0,
            grace: None,
            outcome: PodOutcome::of(&pod),
            running: container_signal(&pod) == Some(Signal::Start),
            reconnects: 0,
        };

        let result = session.run(events, ended).await;
        watcher.abort();
        if let Some(copy) = session.copy.take() {
            copy.abort();
        }
        result
    }

    async fn wait_until_started(&self, name: &str, namespace: &str) -> Result<Pod> {
        loop {
            let pod = self.cluster.get_pod(name, namespace).await?.ok_or_else(|| {
                ClusterError::NotFound {
                    message: format!("pod {name:?} not found in namespace {namespace:?}"),
                }
            })?;
            match PodPhase::of(&pod) {
                PodPhase::Unknown => {
                    return Err(DeployError::UnknownPodPhase {
                        name: name.to_string(),
                    });
                }
                PodPhase::Pending => {
                    tracing::debug!(pod = %name, "Pod pending");
                    tokio::time::sleep(self.config.pending_poll).await;
                }
                _ => return Ok(pod),
            }
        }
    }
}

/// Completion notice from a copy task: its generation and any write error.
type Ended = (u64, Option<std::io::Error>);

type PodEvents = mpsc::Receiver<ClusterResult<WatchEvent<Pod>>>;

struct Session<'s, W> {
    cluster: &'s dyn ControlPlane,
    config: FollowConfig,
    name: &'s str,
    namespace: &'s str,
    out: Arc<Mutex<W>>,
    ended_tx: mpsc::Sender<Ended>,
    machine: FollowerMachine,
    copy: Option<JoinHandle<()>>,
    generation: u64,
    grace: Option<Pin<Box<Sleep>>>,
    outcome: Option<PodOutcome>,
    running: bool,
    reconnects: u32,
}

impl<W> Session<'_, W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn run(
        &mut self,
        mut events: PodEvents,
        mut ended: mpsc::Receiver<Ended>,
    ) -> Result<PodOutcome> {
        self.signal(Signal::Start).await?;

        loop {
            if self.machine.state() == StreamState::Idle
                && let Some(outcome) = &self.outcome
            {
                return Ok(outcome.clone());
            }

            tokio::select! {
                event = events.recv() => {
                    let pod = self.applied(event)?;
                    self.on_pod(&pod).await?;
                },

                Some((generation, error)) = ended.recv() => {
                    if let Some(e) = error {
                        return Err(DeployError::Output(e));
                    }
                    if generation == self.generation {
                        self.on_stream_ended(&mut events).await?;
                    }
                },

                () = grace_elapsed(&mut self.grace) => {
                    self.grace = None;
                    self.signal(Signal::GraceElapsed).await?;
                },
            }
        }
    }

    fn applied(&self, event: Option<ClusterResult<WatchEvent<Pod>>>) -> Result<Pod> {
        match event {
            Some(Ok(WatchEvent::Applied(pod))) => Ok(pod),
            Some(Ok(WatchEvent::Deleted(_))) => Err(self.deleted()),
            Some(Err(e)) => Err(DeployError::WatchStream(e.to_string())),
            None => Err(DeployError::WatchStream("pod watch ended".to_string())),
        }
    }

    fn deleted(&self) -> DeployError {
        DeployError::Deleted {
            kind: "pod".to_string(),
            name: self.name.to_string(),
        }
    }

    /// Record a pod's phase and container state without acting on it.
    fn observe(&mut self, pod: &Pod) -> Option<Signal> {
        if let Some(outcome) = PodOutcome::of(pod) {
            self.outcome = Some(outcome);
        }
        let signal = container_signal(pod);
        self.running = signal == Some(Signal::Start);
        if signal == Some(Signal::Close) {
            self.reconnects = 0;
        }
        signal
    }

    /// No stream is needed once the pod finished or its container stopped.
    fn settled(&self) -> bool {
        self.outcome.is_some() || !self.running
    }

    async fn on_pod(&mut self, pod: &Pod) -> Result<()> {
        match self.observe(pod) {
            Some(signal) => self.signal(signal).await,
            None => Ok(()),
        }
    }

    async fn on_stream_ended(&mut self, events: &mut PodEvents) -> Result<()> {
        self.copy = None;
        self.grace = None;
        self.machine.on(Signal::StreamEnded);
        if self.settled() || self.recheck(events).await? {
            return Ok(());
        }
        self.reconnects += 1;
        if self.reconnects > self.config.max_reconnects {
            return Err(DeployError::WatchStream(format!(
                "log stream for pod {:?} ended {} times while the container was running",
                self.name, self.reconnects
            )));
        }
        tracing::warn!(
            pod = %self.name,
            attempt = self.reconnects,
            "Log stream ended while pod still running, reopening; some lines may be lost"
        );
        self.signal(Signal::Start).await
    }

    /// Look the pod up at a fixed interval after its stream ended, taking in
    /// watch events meanwhile. Returns true once [`Self::settled`] holds.
    async fn recheck(&mut self, events: &mut PodEvents) -> Result<bool> {
        for check in 1..=self.config.phase_checks {
            let delay = tokio::time::sleep(self.config.phase_check_interval);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    () = &mut delay => break,
                    event = events.recv() => {
                        let pod = self.applied(event)?;
                        self.observe(&pod);
                        if self.settled() {
                            return Ok(true);
                        }
                    },
                }
            }

            let pod = self
                .cluster
                .get_pod(self.name, self.namespace)
                .await?
                .ok_or_else(|| self.deleted())?;
            tracing::debug!(
                pod = %self.name,
                check,
                phase = ?PodPhase::of(&pod),
                "Pod rechecked after stream end"
            );
            self.observe(&pod);
            if self.settled() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn signal(&mut self, signal: Signal) -> Result<()> {
        let Some(action) = self.machine.on(signal) else {
            return Ok(());
        };
        tracing::debug!(pod = %self.name, ?signal, ?action, "Follower action");
        match action {
            Action::Open { tail_lines } => self.open(tail_lines).await?,
            Action::ScheduleClose => {
                self.grace = Some(Box::pin(tokio::time::sleep(self.config.close_grace)));
            }
            Action::CancelClose => self.grace = None,
            Action::CloseStream => {
                if let Some(copy) = self.copy.take() {
                    copy.abort();
                }
            }
        }
        Ok(())
    }

    async fn open(&mut self, tail_lines: Option<i64>) -> Result<()> {
        let mut logs = self
            .cluster
            .pod_logs(self.name, self.namespace, tail_lines)
            .await?;
        self.generation += 1;
        let generation = self.generation;
        let out = Arc::clone(&self.out);
        let done = self.ended_tx.clone();

        self.copy = Some(tokio::spawn(async move {
            let mut error = None;
            while let Some(chunk) = logs.next().await {
                match chunk {
                    Ok(bytes) => {
                        let mut writer = out.lock().await;
                        if let Err(e) = writer.write_all(&bytes).await {
                            error = Some(e);
                            break;
                        }
                        if let Err(e) = writer.flush().await {
                            error = Some(e);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Log stream error");
                        break;
                    }
                }
            }
            let _ = done.send((generation, error)).await;
        }));
        Ok(())
    }
}

async fn grace_elapsed(grace: &mut Option<Pin<Box<Sleep>>>) {
    match grace.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
