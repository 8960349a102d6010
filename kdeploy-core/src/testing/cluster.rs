//! A recording, in-memory [`ControlPlane`].

use crate::cluster::{
    ClusterError, ClusterFuture, ClusterResult, ControlPlane, DependentKind, LogStream,
    WatchEvent, WatchStream,
};
use crate::manifest::{Resource, ResourceKind, ResourceMeta};
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use futures::stream;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// A call received by [`FakeCluster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    /// `exists`.
    Exists {
        /// Kind.
        kind: ResourceKind,
        /// Object name.
        name: String,
    },
    /// `create`.
    Create {
        /// Kind.
        kind: ResourceKind,
        /// Object name.
        name: String,
        /// Target namespace.
        namespace: String,
    },
    /// `update`.
    Update {
        /// Kind.
        kind: ResourceKind,
        /// Object name.
        name: String,
    },
    /// `delete`.
    Delete {
        /// Kind.
        kind: ResourceKind,
        /// Object name.
        name: String,
    },
    /// `list_dependents`.
    ListDependents {
        /// Dependent kind.
        kind: DependentKind,
        /// Label selector.
        selector: String,
    },
    /// `delete_dependent`.
    DeleteDependent {
        /// Dependent kind.
        kind: DependentKind,
        /// Dependent name.
        name: String,
    },
    /// `delete_dependents`.
    DeleteDependents {
        /// Dependent kind.
        kind: DependentKind,
        /// Label selector.
        selector: String,
    },
    /// `namespace_exists`.
    NamespaceExists(String),
    /// `create_namespace`.
    CreateNamespace(String),
    /// `delete_namespace`.
    DeleteNamespace(String),
    /// `get_deployment`.
    GetDeployment(String),
    /// `update_deployment`.
    UpdateDeployment(String),
    /// `get_job`.
    GetJob(String),
    /// `watch_job`.
    WatchJob(String),
    /// `get_pod`.
    GetPod(String),
    /// `watch_pod`.
    WatchPod(String),
    /// `pod_logs`.
    PodLogs {
        /// Pod name.
        name: String,
        /// Requested history.
        tail_lines: Option<i64>,
    },
}

type Sender<T> = UnboundedSender<ClusterResult<WatchEvent<T>>>;

/// Buffers events until a watcher subscribes, then fans them out.
struct Watchers<T> {
    pending: Vec<ClusterResult<WatchEvent<T>>>,
    senders: Vec<Sender<T>>,
}

impl<T> Default for Watchers<T> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            senders: Vec::new(),
        }
    }
}

impl<T: Clone + Send + 'static> Watchers<T> {
    fn push(&mut self, event: ClusterResult<WatchEvent<T>>) {
        if self.senders.is_empty() {
            self.pending.push(event);
            return;
        }
        self.senders
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    fn subscribe(&mut self) -> WatchStream<T> {
        let (tx, rx) = unbounded();
        for event in self.pending.drain(..) {
            let _ = tx.unbounded_send(event);
        }
        self.senders.push(tx);
        rx.boxed()
    }
}

struct ScriptedLog {
    chunks: Vec<Bytes>,
    ends: bool,
}

#[derive(Default)]
struct State {
    calls: Vec<ClusterCall>,
    objects: BTreeSet<(String, String, String)>,
    namespaces: BTreeSet<String>,
    failures: HashMap<&'static str, VecDeque<ClusterError>>,
    dependents: HashMap<(DependentKind, String), Vec<String>>,
    deployments: HashMap<String, Deployment>,
    jobs: HashMap<String, VecDeque<Job>>,
    pods: HashMap<String, VecDeque<Pod>>,
    job_watchers: Watchers<Job>,
    pod_watchers: Watchers<Pod>,
    logs: VecDeque<ScriptedLog>,
}

impl State {
    fn fail(&mut self, operation: &'static str) -> ClusterResult<()> {
        match self.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn key(kind: ResourceKind, name: &str, namespace: &str) -> (String, String, String) {
    let namespace = if kind.is_namespaced() { namespace } else { "" };
    (kind.as_str().to_string(), namespace.to_string(), name.to_string())
}

/// Returns the front of a scripted sequence, advancing until the last entry.
fn advance<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

/// An in-memory control plane.
///
/// Created objects are tracked by kind, namespace and name. Jobs and pods are
/// scripted per name as a sequence of states; each lookup returns the next
/// state and the last one repeats. Watch events pushed before anyone watches
/// are delivered to the first watcher.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    /// An empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an existing namespace.
    pub fn with_namespace(self, namespace: &str) -> Self {
        self.state.lock().namespaces.insert(namespace.to_string());
        self
    }

    /// Add an existing object.
    pub fn with_object(self, kind: ResourceKind, name: &str, namespace: &str) -> Self {
        self.state.lock().objects.insert(key(kind, name, namespace));
        self
    }

    /// Register dependents returned for `selector`.
    pub fn with_dependents(self, kind: DependentKind, selector: &str, names: &[&str]) -> Self {
        self.state.lock().dependents.insert(
            (kind, selector.to_string()),
            names.iter().map(|n| n.to_string()).collect(),
        );
        self
    }

    /// Add a live deployment; it also counts as an existing object.
    pub fn with_deployment(self, namespace: &str, deployment: Deployment) -> Self {
        {
            let mut state = self.state.lock();
            let name = deployment.metadata.name.clone().unwrap_or_default();
            state
                .objects
                .insert(key(ResourceKind::Deployment, &name, namespace));
            state.deployments.insert(name, deployment);
        }
        self
    }

    /// Fail the next call of `operation` (the trait method name) with `error`.
    pub fn fail_next(&self, operation: &'static str, error: ClusterError) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Script the states `get_job` returns for `name`.
    pub fn script_job(&self, name: &str, states: Vec<Job>) {
        self.state
            .lock()
            .jobs
            .insert(name.to_string(), states.into());
    }

    /// Forget job `name`; later lookups return `None`.
    pub fn remove_job(&self, name: &str) {
        self.state.lock().jobs.remove(name);
    }

    /// Script the states `get_pod` returns for `name`.
    pub fn script_pod(&self, name: &str, states: Vec<Pod>) {
        self.state
            .lock()
            .pods
            .insert(name.to_string(), states.into());
    }

    /// Deliver a job watch event.
    pub fn push_job_event(&self, event: ClusterResult<WatchEvent<Job>>) {
        self.state.lock().job_watchers.push(event);
    }

    /// Deliver a pod watch event.
    pub fn push_pod_event(&self, event: ClusterResult<WatchEvent<Pod>>) {
        self.state.lock().pod_watchers.push(event);
    }

    /// End every open watch stream.
    pub fn close_watches(&self) {
        let mut state = self.state.lock();
        state.job_watchers.senders.clear();
        state.pod_watchers.senders.clear();
    }

    /// Queue the next log stream. With `ends` false the stream stays open
    /// after its chunks.
    pub fn script_log(&self, chunks: &[&str], ends: bool) {
        self.state.lock().logs.push_back(ScriptedLog {
            chunks: chunks
                .iter()
                .map(|c| Bytes::copy_from_slice(c.as_bytes()))
                .collect(),
            ends,
        });
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<ClusterCall> {
        self.state.lock().calls.clone()
    }

    /// `kind/name` of every create call, in order.
    pub fn created(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ClusterCall::Create { kind, name, .. } => Some(format!("{kind}/{name}")),
                _ => None,
            })
            .collect()
    }

    /// `kind/name` of every delete call, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ClusterCall::Delete { kind, name } => Some(format!("{kind}/{name}")),
                _ => None,
            })
            .collect()
    }

    /// Whether the object is currently stored.
    pub fn contains(&self, kind: ResourceKind, name: &str, namespace: &str) -> bool {
        self.state
            .lock()
            .objects
            .contains(&key(kind, name, namespace))
    }

    /// Whether the namespace currently exists.
    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.state.lock().namespaces.contains(namespace)
    }

    /// The stored deployment `name`.
    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.state.lock().deployments.get(name).cloned()
    }

    fn record(&self, call: ClusterCall, operation: &'static str) -> ClusterResult<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        state.fail(operation)
    }
}

impl ControlPlane for FakeCluster {
    fn exists<'a>(
        &'a self,
        kind: ResourceKind,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, bool> {
        Box::pin(async move {
            self.record(
                ClusterCall::Exists {
                    kind,
                    name: name.to_string(),
                },
                "exists",
            )?;
            Ok(self.contains(kind, name, namespace))
        })
    }

    fn create<'a>(&'a self, resource: &'a Resource, namespace: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            let kind = resource.kind();
            let name = resource.name();
            self.record(
                ClusterCall::Create {
                    kind,
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                },
                "create",
            )?;
            let mut state = self.state.lock();
            if !state.objects.insert(key(kind, name, namespace)) {
                return Err(ClusterError::Conflict {
                    message: format!("{kind} {name:?} already exists"),
                });
            }
            if let Resource::Deployment(deployment) = resource {
                state
                    .deployments
                    .insert(name.to_string(), deployment.clone());
            }
            Ok(())
        })
    }

    fn update<'a>(&'a self, resource: &'a Resource, namespace: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            let kind = resource.kind();
            let name = resource.name();
            self.record(
                ClusterCall::Update {
                    kind,
                    name: name.to_string(),
                },
                "update",
            )?;
            if !self.contains(kind, name, namespace) {
                return Err(ClusterError::NotFound {
                    message: format!("{kind} {name:?} not found"),
                });
            }
            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        kind: ResourceKind,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.record(
                ClusterCall::Delete {
                    kind,
                    name: name.to_string(),
                },
                "delete",
            )?;
            let mut state = self.state.lock();
            if !state.objects.remove(&key(kind, name, namespace)) {
                return Err(ClusterError::NotFound {
                    message: format!("{kind} {name:?} not found"),
                });
            }
            if kind == ResourceKind::Deployment {
                state.deployments.remove(name);
            }
            Ok(())
        })
    }

    fn list_dependents<'a>(
        &'a self,
        kind: DependentKind,
        _namespace: &'a str,
        selector: &'a str,
    ) -> ClusterFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.record(
                ClusterCall::ListDependents {
                    kind,
                    selector: selector.to_string(),
                },
                "list_dependents",
            )?;
            Ok(self
                .state
                .lock()
                .dependents
                .get(&(kind, selector.to_string()))
                .cloned()
                .unwrap_or_default())
        })
    }

    fn delete_dependent<'a>(
        &'a self,
        kind: DependentKind,
        name: &'a str,
        _namespace: &'a str,
    ) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.record(
                ClusterCall::DeleteDependent {
                    kind,
                    name: name.to_string(),
                },
                "delete_dependent",
            )
        })
    }

    fn delete_dependents<'a>(
        &'a self,
        kind: DependentKind,
        _namespace: &'a str,
        selector: &'a str,
    ) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.record(
                ClusterCall::DeleteDependents {
                    kind,
                    selector: selector.to_string(),
                },
                "delete_dependents",
            )?;
            self.state
                .lock()
                .dependents
                .remove(&(kind, selector.to_string()));
            Ok(())
        })
    }

    fn namespace_exists<'a>(&'a self, name: &'a str) -> ClusterFuture<'a, bool> {
        Box::pin(async move {
            self.record(ClusterCall::NamespaceExists(name.to_string()), "namespace_exists")?;
            Ok(self.has_namespace(name))
        })
    }

    fn create_namespace<'a>(&'a self, name: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.record(ClusterCall::CreateNamespace(name.to_string()), "create_namespace")?;
            if !self.state.lock().namespaces.insert(name.to_string()) {
                return Err(ClusterError::Conflict {
                    message: format!("namespace {name:?} already exists"),
                });
            }
            Ok(())
        })
    }

    fn delete_namespace<'a>(&'a self, name: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            self.record(ClusterCall::DeleteNamespace(name.to_string()), "delete_namespace")?;
            if !self.state.lock().namespaces.remove(name) {
                return Err(ClusterError::NotFound {
                    message: format!("namespace {name:?} not found"),
                });
            }
            Ok(())
        })
    }

    fn get_deployment<'a>(
        &'a self,
        name: &'a str,
        _namespace: &'a str,
    ) -> ClusterFuture<'a, Option<Deployment>> {
        Box::pin(async move {
            self.record(ClusterCall::GetDeployment(name.to_string()), "get_deployment")?;
            Ok(self.deployment(name))
        })
    }

    fn update_deployment<'a>(
        &'a self,
        deployment: &'a Deployment,
        _namespace: &'a str,
    ) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            let name = deployment.metadata.name.clone().unwrap_or_default();
            self.record(ClusterCall::UpdateDeployment(name.clone()), "update_deployment")?;
            self.state
                .lock()
                .deployments
                .insert(name, deployment.clone());
            Ok(())
        })
    }

    fn get_job<'a>(&'a self, name: &'a str, _namespace: &'a str) -> ClusterFuture<'a, Option<Job>> {
        Box::pin(async move {
            self.record(ClusterCall::GetJob(name.to_string()), "get_job")?;
            Ok(self.state.lock().jobs.get_mut(name).and_then(advance))
        })
    }

    fn watch_job<'a>(
        &'a self,
        name: &'a str,
        _namespace: &'a str,
    ) -> ClusterFuture<'a, WatchStream<Job>> {
        Box::pin(async move {
            self.record(ClusterCall::WatchJob(name.to_string()), "watch_job")?;
            Ok(self.state.lock().job_watchers.subscribe())
        })
    }

    fn get_pod<'a>(&'a self, name: &'a str, _namespace: &'a str) -> ClusterFuture<'a, Option<Pod>> {
        Box::pin(async move {
            self.record(ClusterCall::GetPod(name.to_string()), "get_pod")?;
            Ok(self.state.lock().pods.get_mut(name).and_then(advance))
        })
    }

    fn watch_pod<'a>(
        &'a self,
        name: &'a str,
        _namespace: &'a str,
    ) -> ClusterFuture<'a, WatchStream<Pod>> {
        Box::pin(async move {
            self.record(ClusterCall::WatchPod(name.to_string()), "watch_pod")?;
            Ok(self.state.lock().pod_watchers.subscribe())
        })
    }

    fn pod_logs<'a>(
        &'a self,
        name: &'a str,
        _namespace: &'a str,
        tail_lines: Option<i64>,
    ) -> ClusterFuture<'a, LogStream> {
        Box::pin(async move {
            self.record(
                ClusterCall::PodLogs {
                    name: name.to_string(),
                    tail_lines,
                },
                "pod_logs",
            )?;
            let scripted = self.state.lock().logs.pop_front();
            let stream: LogStream = match scripted {
                Some(ScriptedLog { chunks, ends: true }) => {
                    stream::iter(chunks.into_iter().map(Ok)).boxed()
                }
                Some(ScriptedLog { chunks, ends: false }) => stream::iter(chunks.into_iter().map(Ok))
                    .chain(stream::pending())
                    .boxed(),
                None => stream::pending().boxed(),
            };
            Ok(stream)
        })
    }
}
