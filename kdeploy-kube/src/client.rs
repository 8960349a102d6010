//! [`ControlPlane`] over the Kubernetes API.

use crate::error::{ConnectError, classify, classify_watch};
use bytes::Bytes;
use futures::channel::oneshot;
use futures::{AsyncBufRead, AsyncBufReadExt, StreamExt, future, stream};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Namespace, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kdeploy_core::cluster::{
    ClusterError, ClusterFuture, ClusterResult, ControlPlane, DependentKind, LogStream,
    WatchEvent, WatchStream,
};
use kdeploy_core::manifest::{Resource, ResourceKind};
use kube::api::{DeleteParams, ListParams, LogParams, PostParams, PropagationPolicy};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, watcher};
use kube::{Api, Client, Config};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::path::PathBuf;
use tokio::sync::mpsc;

const LOG_BUFFER: usize = 64;

/// Builds a typed `Api` for a kind, scoped by its table entry.
macro_rules! scoped_api {
    (namespaced, $ty:ident, $client:expr, $ns:expr) => {
        Api::<$ty>::namespaced($client, $ns)
    };
    (cluster, $ty:ident, $client:expr, $ns:expr) => {{
        let _ = $ns;
        Api::<$ty>::all($client)
    }};
}

/// Every manageable kind with its scope. Type names match the variants.
macro_rules! for_each_kind {
    ($callback:ident!($($args:tt)*)) => {
        $callback!($($args)*;
            Pod namespaced,
            Deployment namespaced,
            Service namespaced,
            Job namespaced,
            PersistentVolumeClaim namespaced,
            ConfigMap namespaced,
            Secret namespaced,
            Ingress namespaced,
            Endpoints namespaced,
            DaemonSet namespaced,
            ServiceAccount namespaced,
            Role namespaced,
            ClusterRole cluster,
            RoleBinding namespaced,
            ClusterRoleBinding cluster,
            StatefulSet namespaced
        )
    };
}

/// Evaluates `$body` with `$api` bound to the typed `Api` for `$kind`.
macro_rules! match_kind {
    ($kind:expr, $client:expr, $ns:expr, |$api:ident| $body:expr; $($variant:ident $scope:ident),*) => {
        match $kind {
            $(ResourceKind::$variant => {
                let $api = scoped_api!($scope, $variant, $client, $ns);
                $body
            })*
        }
    };
}

/// Evaluates `$body` with `$obj` bound to the typed object inside `$resource`.
macro_rules! match_resource {
    ($resource:expr, $client:expr, $ns:expr, |$api:ident, $obj:ident| $body:expr; $($variant:ident $scope:ident),*) => {
        match $resource {
            $(Resource::$variant($obj) => {
                let $api = scoped_api!($scope, $variant, $client, $ns);
                $body
            })*
        }
    };
}

fn receiver_stream(rx: mpsc::Receiver<ClusterResult<Bytes>>) -> LogStream {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

/// Copy raw chunks from `reader` until it ends, fails or the receiver drops.
async fn forward_chunks<R: AsyncBufRead>(reader: R, tx: mpsc::Sender<ClusterResult<Bytes>>) {
    let mut reader = std::pin::pin!(reader);
    loop {
        let read = tokio::select! {
            read = reader.fill_buf() => read.map(Bytes::copy_from_slice),
            () = tx.closed() => break,
        };
        let (chunk, last) = match read {
            Ok(chunk) if chunk.is_empty() => break,
            Ok(chunk) => {
                reader.consume_unpin(chunk.len());
                (Ok(chunk), false)
            }
            Err(e) => (Err(ClusterError::Transport(e.to_string())), true),
        };
        if tx.send(chunk).await.is_err() || last {
            break;
        }
    }
}

fn delete_params() -> DeleteParams {
    DeleteParams {
        grace_period_seconds: Some(0),
        propagation_policy: Some(PropagationPolicy::Background),
        ..Default::default()
    }
}

/// A live cluster reached through a kubeconfig.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    /// Wrap an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using `kubeconfig` (or the default discovery chain) and `context`.
    pub async fn connect(
        kubeconfig: Option<PathBuf>,
        context: Option<String>,
    ) -> Result<Self, ConnectError> {
        let options = KubeConfigOptions {
            context,
            ..Default::default()
        };
        let config = match kubeconfig {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Reading kubeconfig");
                let kubeconfig = Kubeconfig::read_from(&path)?;
                Config::from_custom_kubeconfig(kubeconfig, &options).await?
            }
            None if options.context.is_some() => Config::from_kubeconfig(&options).await?,
            None => Config::infer().await?,
        };
        tracing::info!(cluster = %config.cluster_url, "Connected to cluster");
        Ok(Self::new(Client::try_from(config)?))
    }

    fn client(&self) -> Client {
        self.client.clone()
    }
}

async fn exists_in<K>(api: Api<K>, name: &str) -> ClusterResult<bool>
where
    K: Clone + DeserializeOwned + Debug,
{
    Ok(api.get_opt(name).await.map_err(classify)?.is_some())
}

async fn create_in<K>(api: Api<K>, object: &K) -> ClusterResult<()>
where
    K: Clone + DeserializeOwned + Debug + Serialize,
{
    api.create(&PostParams::default(), object)
        .await
        .map(drop)
        .map_err(classify)
}

/// Replace with the live resource version so the write is not rejected as stale.
async fn replace_in<K>(api: Api<K>, object: &K) -> ClusterResult<()>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Serialize,
{
    let name = object.meta().name.clone().unwrap_or_default();
    let live = api.get(&name).await.map_err(classify)?;
    let mut desired = object.clone();
    desired.meta_mut().resource_version = live.meta().resource_version.clone();
    api.replace(&name, &PostParams::default(), &desired)
        .await
        .map(drop)
        .map_err(classify)
}

async fn delete_in<K>(api: Api<K>, name: &str) -> ClusterResult<()>
where
    K: Clone + DeserializeOwned + Debug,
{
    api.delete(name, &delete_params())
        .await
        .map(drop)
        .map_err(classify)
}

fn watch_by_name<K>(api: Api<K>, name: &str) -> WatchStream<K>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
    watcher(api, config)
        .default_backoff()
        .filter_map(|event| {
            future::ready(match event {
                Ok(watcher::Event::Apply(obj) | watcher::Event::InitApply(obj)) => {
                    Some(Ok(WatchEvent::Applied(obj)))
                }
                Ok(watcher::Event::Delete(obj)) => Some(Ok(WatchEvent::Deleted(obj))),
                Ok(watcher::Event::Init | watcher::Event::InitDone) => None,
                Err(e) => classify_watch(e).map(Err),
            })
        })
        .boxed()
}

impl ControlPlane for KubeControlPlane {
    fn exists<'a>(
        &'a self,
        kind: ResourceKind,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, bool> {
        Box::pin(async move {
            for_each_kind!(match_kind!(kind, self.client(), namespace, |api| exists_in(api, name).await))
        })
    }

    fn create<'a>(&'a self, resource: &'a Resource, namespace: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            for_each_kind!(match_resource!(resource, self.client(), namespace, |api, object| {
                create_in(api, object).await
            }))
        })
    }

    fn update<'a>(&'a self, resource: &'a Resource, namespace: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            for_each_kind!(match_resource!(resource, self.client(), namespace, |api, object| {
                replace_in(api, object).await
            }))
        })
    }

    fn delete<'a>(
        &'a self,
        kind: ResourceKind,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            for_each_kind!(match_kind!(kind, self.client(), namespace, |api| delete_in(api, name).await))
        })
    }

    fn list_dependents<'a>(
        &'a self,
        kind: DependentKind,
        namespace: &'a str,
        selector: &'a str,
    ) -> ClusterFuture<'a, Vec<String>> {
        Box::pin(async move {
            let params = ListParams::default().labels(selector);
            let names = match kind {
                DependentKind::ReplicaSet => {
                    let api = Api::<ReplicaSet>::namespaced(self.client(), namespace);
                    let list = api.list(&params).await.map_err(classify)?;
                    list.items.into_iter().filter_map(|rs| rs.metadata.name).collect()
                }
                DependentKind::Pod => {
                    let api = Api::<Pod>::namespaced(self.client(), namespace);
                    let list = api.list(&params).await.map_err(classify)?;
                    list.items.into_iter().filter_map(|pod| pod.metadata.name).collect()
                }
            };
            Ok(names)
        })
    }

    fn delete_dependent<'a>(
        &'a self,
        kind: DependentKind,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            match kind {
                DependentKind::ReplicaSet => {
                    delete_in(Api::<ReplicaSet>::namespaced(self.client(), namespace), name).await
                }
                DependentKind::Pod => {
                    delete_in(Api::<Pod>::namespaced(self.client(), namespace), name).await
                }
            }
        })
    }

    fn delete_dependents<'a>(
        &'a self,
        kind: DependentKind,
        namespace: &'a str,
        selector: &'a str,
    ) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            let params = ListParams::default().labels(selector);
            let result = match kind {
                DependentKind::ReplicaSet => {
                    Api::<ReplicaSet>::namespaced(self.client(), namespace)
                        .delete_collection(&delete_params(), &params)
                        .await
                        .map(drop)
                }
                DependentKind::Pod => {
                    Api::<Pod>::namespaced(self.client(), namespace)
                        .delete_collection(&delete_params(), &params)
                        .await
                        .map(drop)
                }
            };
            result.map_err(classify)
        })
    }

    fn namespace_exists<'a>(&'a self, name: &'a str) -> ClusterFuture<'a, bool> {
        Box::pin(async move { exists_in(Api::<Namespace>::all(self.client()), name).await })
    }

    fn create_namespace<'a>(&'a self, name: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            let namespace = Namespace {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            };
            create_in(Api::<Namespace>::all(self.client()), &namespace).await
        })
    }

    fn delete_namespace<'a>(&'a self, name: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            match delete_in(Api::<Namespace>::all(self.client()), name).await {
                // A missing namespace reports itself as the missing parent.
                Err(ClusterError::NamespaceMissing { namespace }) => Err(ClusterError::NotFound {
                    message: format!("namespace {namespace:?} not found"),
                }),
                other => other,
            }
        })
    }

    fn get_deployment<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, Option<Deployment>> {
        Box::pin(async move {
            Api::<Deployment>::namespaced(self.client(), namespace)
                .get_opt(name)
                .await
                .map_err(classify)
        })
    }

    fn update_deployment<'a>(
        &'a self,
        deployment: &'a Deployment,
        namespace: &'a str,
    ) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            let name = deployment.metadata.name.as_deref().unwrap_or_default();
            Api::<Deployment>::namespaced(self.client(), namespace)
                .replace(name, &PostParams::default(), deployment)
                .await
                .map(drop)
                .map_err(classify)
        })
    }

    fn get_job<'a>(&'a self, name: &'a str, namespace: &'a str) -> ClusterFuture<'a, Option<Job>> {
        Box::pin(async move {
            Api::<Job>::namespaced(self.client(), namespace)
                .get_opt(name)
                .await
                .map_err(classify)
        })
    }

    fn watch_job<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, WatchStream<Job>> {
        Box::pin(async move {
            Ok(watch_by_name(
                Api::<Job>::namespaced(self.client(), namespace),
                name,
            ))
        })
    }

    fn get_pod<'a>(&'a self, name: &'a str, namespace: &'a str) -> ClusterFuture<'a, Option<Pod>> {
        Box::pin(async move {
            Api::<Pod>::namespaced(self.client(), namespace)
                .get_opt(name)
                .await
                .map_err(classify)
        })
    }

    fn watch_pod<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, WatchStream<Pod>> {
        Box::pin(async move {
            Ok(watch_by_name(
                Api::<Pod>::namespaced(self.client(), namespace),
                name,
            ))
        })
    }

    fn pod_logs<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
        tail_lines: Option<i64>,
    ) -> ClusterFuture<'a, LogStream> {
        Box::pin(async move {
            let api = Api::<Pod>::namespaced(self.client(), namespace);
            let params = LogParams {
                follow: true,
                tail_lines,
                ..Default::default()
            };
            let (opened_tx, opened_rx) = oneshot::channel();
            let (chunk_tx, chunk_rx) = mpsc::channel(LOG_BUFFER);
            let pod = name.to_string();

            // The reader borrows its client, so it lives inside the task that owns it.
            tokio::spawn(async move {
                let reader = match api.log_stream(&pod, &params).await {
                    Ok(reader) => {
                        let _ = opened_tx.send(Ok(()));
                        reader
                    }
                    Err(e) => {
                        let _ = opened_tx.send(Err(classify(e)));
                        return;
                    }
                };
                forward_chunks(reader, chunk_tx).await;
                tracing::debug!(pod = %pod, "Log stream closed");
            });

            opened_rx.await.map_err(|_| {
                ClusterError::Transport(format!("log stream for pod {name:?} was dropped"))
            })??;
            Ok(receiver_stream(chunk_rx))
        })
    }
}
