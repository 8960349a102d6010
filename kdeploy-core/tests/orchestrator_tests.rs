//! Integration tests for the up / down / update / autoupdate pipelines.
//!
//! Runs the orchestrator against the in-memory fakes and asserts on the
//! exact sequence of side effects each pipeline produces.

use k8s_openapi::api::core::v1::{Pod, PodStatus};
use kdeploy_core::build::RetryPolicy;
use kdeploy_core::cluster::{ClusterError, DependentKind};
use kdeploy_core::manifest::{Resource, ResourceKind};
use kdeploy_core::orchestrator::{AssetOutcome, Orchestrator, OrchestratorConfig};
use kdeploy_core::progress::{Outcome, Stage};
use kdeploy_core::project::{
    AutoUpdate, AutoUpdateContainer, AutoUpdateCredential, Credential, Project, ProjectBuild,
    ProjectConfig,
};
use kdeploy_core::registry::{ManifestEntry, TagListing};
use kdeploy_core::testing::{
    BackendCall, ClusterCall, FakeCluster, RecordingBackend, RecordingProgress, RecordingScripts,
    StaticRegistry,
};
use kdeploy_core::{Asset, DeployError};
use std::path::PathBuf;
use std::time::Duration;

mod common;

use common::{asset, config_map, deployment, job, pod, project, service};

struct Harness {
    cluster: FakeCluster,
    images: RecordingBackend,
    scripts: RecordingScripts,
    progress: RecordingProgress,
    config: OrchestratorConfig,
}

impl Harness {
    fn new(cluster: FakeCluster) -> Self {
        Self {
            cluster,
            images: RecordingBackend::new(),
            scripts: RecordingScripts::new(),
            progress: RecordingProgress::new(),
            config: OrchestratorConfig::default(),
        }
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(&self.cluster, &self.images)
            .with_scripts(&self.scripts)
            .with_progress(&self.progress)
            .with_config(self.config)
    }

    fn outcomes(&self, stage: Stage) -> Vec<(String, Outcome)> {
        self.progress
            .events()
            .into_iter()
            .filter(|e| e.stage == stage && e.outcome != Outcome::Started)
            .map(|e| (e.name, e.outcome))
            .collect()
    }
}

fn shop_project(config: ProjectConfig) -> Project {
    project(
        config,
        "shop",
        vec![asset("resources/settings.yml", &config_map("settings"))],
        vec![asset("jobs/migrate.yml", &job("migrate", "busybox"))],
        vec![asset("services/web.yml", &service("web"))],
    )
}

fn pod_in_phase(phase: &str) -> Pod {
    Pod {
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn live_deployment(asset: &Asset) -> k8s_openapi::api::apps::v1::Deployment {
    match asset.resource() {
        Resource::Deployment(d) => d.clone(),
        other => panic!("not a deployment: {:?}", other.kind()),
    }
}

fn container_images(cluster: &FakeCluster, name: &str) -> Vec<String> {
    cluster
        .deployment(name)
        .and_then(|d| d.spec)
        .and_then(|s| s.template.spec)
        .map(|s| s.containers.into_iter().filter_map(|c| c.image).collect())
        .unwrap_or_default()
}

// up

#[tokio::test]
async fn up_creates_collections_in_order_between_scripts() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    let project = shop_project(ProjectConfig {
        init_up: vec!["make assets".into()],
        finalize_up: vec!["notify".into()],
        ..Default::default()
    });

    harness.orchestrator().up(&project).await.unwrap();

    assert_eq!(
        harness.cluster.created(),
        vec!["configmap/settings", "job/migrate", "service/web"]
    );
    assert_eq!(
        harness.scripts.runs(),
        vec![
            ("make assets".to_string(), PathBuf::from("/srv/app")),
            ("notify".to_string(), PathBuf::from("/srv/app")),
        ]
    );
}

#[tokio::test]
async fn up_twice_creates_nothing_the_second_time() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    let project = shop_project(ProjectConfig::default());

    harness.orchestrator().up(&project).await.unwrap();
    harness.orchestrator().up(&project).await.unwrap();

    assert_eq!(harness.cluster.created().len(), 3);
    let already: Vec<_> = harness
        .outcomes(Stage::Create)
        .into_iter()
        .filter(|(_, o)| *o == Outcome::AlreadyExists)
        .map(|(name, _)| name)
        .collect();
    assert_eq!(already, vec!["settings", "migrate", "web"]);
}

#[tokio::test]
async fn up_creates_missing_namespace_before_assets() {
    let harness = Harness::new(FakeCluster::new());
    harness
        .orchestrator()
        .up(&shop_project(ProjectConfig::default()))
        .await
        .unwrap();

    let calls = harness.cluster.calls();
    let ns = calls
        .iter()
        .position(|c| *c == ClusterCall::CreateNamespace("shop".into()))
        .expect("namespace created");
    let first_create = calls
        .iter()
        .position(|c| matches!(c, ClusterCall::Create { .. }))
        .expect("asset created");
    assert!(ns < first_create);
    assert!(harness.cluster.has_namespace("shop"));
}

#[tokio::test]
async fn script_output_is_reported_as_progress() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    harness.scripts.print_on("make assets", "compiled 3 files\n");
    harness.scripts.print_on("never", "unreachable\n");
    harness.scripts.fail_on("never");
    let project = shop_project(ProjectConfig {
        init_up: vec!["make assets".into(), "true".into(), "never".into()],
        ..Default::default()
    });

    let err = harness.orchestrator().up(&project).await.unwrap_err();

    assert!(matches!(err, DeployError::Script { script, .. } if script == "never"));
    let output = |stdout: &str| Outcome::Output {
        stdout: stdout.to_string(),
        stderr: String::new(),
    };
    assert_eq!(
        harness.outcomes(Stage::Script),
        vec![
            ("make assets".to_string(), output("compiled 3 files\n")),
            ("never".to_string(), output("unreachable\n")),
        ]
    );
}

#[tokio::test]
async fn failing_init_script_stops_before_any_create() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    harness.scripts.fail_on("make assets");
    let project = shop_project(ProjectConfig {
        init_up: vec!["make assets".into(), "never".into()],
        ..Default::default()
    });

    let err = harness.orchestrator().up(&project).await.unwrap_err();
    assert!(matches!(err, DeployError::Script { .. }));
    assert_eq!(harness.scripts.scripts(), vec!["make assets"]);
    assert!(harness.cluster.created().is_empty());
}

#[tokio::test]
async fn prologue_pulls_logs_in_and_builds_before_creating() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    let config = ProjectConfig {
        pulls: vec!["gcr.io/acme/web".into()],
        credentials: vec![Credential {
            host: "gcr.io".into(),
            username: "_json_key".into(),
            password: Some("secret".into()),
            password_file: None,
        }],
        build: vec![ProjectBuild {
            name: "gcr.io/acme/api".into(),
            tag: "4".into(),
            from: "api".into(),
            push: true,
            ..Default::default()
        }],
        ..Default::default()
    };
    let project = project(
        config,
        "shop",
        vec![
            asset("a.yml", &deployment("web", "gcr.io/acme/web:7")),
            asset("b.yml", &deployment("web-canary", "gcr.io/acme/web:7")),
            asset("c.yml", &deployment("proxy", "nginx:1.25")),
        ],
        vec![],
        vec![],
    );

    harness.orchestrator().up(&project).await.unwrap();

    assert_eq!(
        harness.images.calls(),
        vec![
            BackendCall::Pull("gcr.io/acme/web:7".into()),
            BackendCall::Login {
                host: "gcr.io".into(),
                username: "_json_key".into()
            },
            BackendCall::Build {
                context: PathBuf::from("/srv/app/api"),
                tag: "gcr.io/acme/api:4".into()
            },
            BackendCall::Push("gcr.io/acme/api:4".into()),
        ]
    );
    assert_eq!(harness.cluster.created().len(), 3);
}

#[tokio::test]
async fn build_failure_aborts_up() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    harness.images.fail_next("build", "no such file: Dockerfile");
    let project = shop_project(ProjectConfig {
        build: vec![ProjectBuild {
            name: "web".into(),
            tag: "1".into(),
            ..Default::default()
        }],
        ..Default::default()
    });

    let err = harness.orchestrator().up(&project).await.unwrap_err();
    assert!(matches!(err, DeployError::Build(_)));
    assert!(harness.cluster.created().is_empty());
}

#[tokio::test(start_paused = true)]
async fn create_retries_while_namespace_terminates() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    for _ in 0..2 {
        harness.cluster.fail_next(
            "create",
            ClusterError::NamespaceTerminating {
                message: "namespace shop is being terminated".into(),
            },
        );
    }
    let project = project(
        ProjectConfig::default(),
        "shop",
        vec![asset("settings.yml", &config_map("settings"))],
        vec![],
        vec![],
    );

    let started = tokio::time::Instant::now();
    harness.orchestrator().up(&project).await.unwrap();

    assert_eq!(harness.cluster.created().len(), 3);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(harness.cluster.contains(ResourceKind::ConfigMap, "settings", "shop"));
}

#[tokio::test(start_paused = true)]
async fn create_gives_up_after_retry_budget() {
    let mut harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    harness.config.create_retry = RetryPolicy::new(3, Duration::from_secs(5));
    for _ in 0..5 {
        harness.cluster.fail_next(
            "create",
            ClusterError::NamespaceTerminating {
                message: "namespace shop is being terminated".into(),
            },
        );
    }
    let project = shop_project(ProjectConfig::default());

    let err = harness.orchestrator().up(&project).await.unwrap_err();
    assert!(matches!(
        err,
        DeployError::Cluster(ClusterError::NamespaceTerminating { .. })
    ));
    assert_eq!(harness.cluster.created(), vec!["configmap/settings"; 3]);
}

#[tokio::test(start_paused = true)]
async fn default_create_budget_allows_ten_retries() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    for _ in 0..10 {
        harness.cluster.fail_next(
            "create",
            ClusterError::NamespaceTerminating {
                message: "namespace shop is being terminated".into(),
            },
        );
    }
    let asset = asset("settings.yml", &config_map("settings"));

    let started = tokio::time::Instant::now();
    let outcome = harness.orchestrator().create_asset(&asset, "shop").await.unwrap();

    assert_eq!(outcome, AssetOutcome::Created);
    assert_eq!(harness.cluster.created(), vec!["configmap/settings"; 11]);
    assert!(started.elapsed() >= Duration::from_secs(50));
}

#[tokio::test]
async fn missing_namespace_on_create_is_created_once() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    let missing = || ClusterError::NamespaceMissing {
        namespace: "shop".into(),
    };
    harness.cluster.fail_next("create", missing());
    let asset = asset("settings.yml", &config_map("settings"));

    let outcome = harness.orchestrator().create_asset(&asset, "shop").await.unwrap();
    assert_eq!(outcome, AssetOutcome::Created);
    assert_eq!(harness.cluster.created().len(), 2);

    harness.cluster.fail_next("create", missing());
    harness.cluster.fail_next("create", missing());
    let other = common::asset("other.yml", &config_map("other"));
    let err = harness.orchestrator().create_asset(&other, "shop").await.unwrap_err();
    assert!(matches!(
        err,
        DeployError::Cluster(ClusterError::NamespaceMissing { .. })
    ));
}

#[tokio::test]
async fn completed_pod_is_replaced() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    harness.cluster.script_pod("runner", vec![pod_in_phase("Succeeded")]);
    let runner = asset("runner.yml", &pod("runner", "busybox"));

    let outcome = harness.orchestrator().create_asset(&runner, "shop").await.unwrap();

    assert_eq!(outcome, AssetOutcome::Created);
    assert_eq!(
        harness.cluster.calls(),
        vec![
            ClusterCall::GetPod("runner".into()),
            ClusterCall::Delete {
                kind: ResourceKind::Pod,
                name: "runner".into()
            },
            ClusterCall::Create {
                kind: ResourceKind::Pod,
                name: "runner".into(),
                namespace: "shop".into()
            },
        ]
    );
}

#[tokio::test]
async fn running_pod_counts_as_existing() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    harness.cluster.script_pod("runner", vec![pod_in_phase("Running")]);
    let runner = asset("runner.yml", &pod("runner", "busybox"));

    let outcome = harness.orchestrator().create_asset(&runner, "shop").await.unwrap();
    assert_eq!(outcome, AssetOutcome::AlreadyExists);
}

#[tokio::test]
async fn unknown_pod_phase_is_an_error() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    harness.cluster.script_pod("runner", vec![pod_in_phase("Unknown")]);
    let runner = asset("runner.yml", &pod("runner", "busybox"));

    let err = harness.orchestrator().create_asset(&runner, "shop").await.unwrap_err();
    assert!(matches!(err, DeployError::UnknownPodPhase { name } if name == "runner"));
}

// down

#[tokio::test]
async fn down_destroys_services_jobs_then_resources() {
    let cluster = FakeCluster::new()
        .with_namespace("shop")
        .with_object(ResourceKind::ConfigMap, "settings", "shop")
        .with_object(ResourceKind::Job, "migrate", "shop")
        .with_object(ResourceKind::Service, "web", "shop");
    let harness = Harness::new(cluster);
    let project = shop_project(ProjectConfig {
        init_down: vec!["drain".into()],
        finalize_down: vec!["cleanup".into()],
        ..Default::default()
    });

    harness.orchestrator().down(&project).await.unwrap();

    assert_eq!(
        harness.cluster.deleted(),
        vec!["service/web", "job/migrate", "configmap/settings"]
    );
    assert_eq!(harness.scripts.scripts(), vec!["drain", "cleanup"]);
    assert!(harness.cluster.has_namespace("shop"));
}

#[tokio::test]
async fn absent_assets_are_skipped_except_pods() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    let project = project(
        ProjectConfig::default(),
        "shop",
        vec![
            asset("settings.yml", &config_map("settings")),
            asset("runner.yml", &pod("runner", "busybox")),
        ],
        vec![],
        vec![],
    );

    harness.orchestrator().down(&project).await.unwrap();

    assert_eq!(harness.cluster.deleted(), vec!["pod/runner".to_string()]);
    assert_eq!(
        harness.outcomes(Stage::Destroy),
        vec![
            ("settings".to_string(), Outcome::NotExisted),
            ("runner".to_string(), Outcome::Succeeded),
        ]
    );
}

#[tokio::test]
async fn deployment_destroy_sweeps_replica_sets_and_pods() {
    let cluster = FakeCluster::new()
        .with_namespace("shop")
        .with_object(ResourceKind::Deployment, "web", "shop")
        .with_dependents(DependentKind::ReplicaSet, "name=web", &["web-5d8f", "web-7c2a"]);
    let harness = Harness::new(cluster);
    let web = asset("web.yml", &deployment("web", "nginx"));

    let outcome = harness.orchestrator().destroy_asset(&web, "shop").await.unwrap();

    assert_eq!(outcome, AssetOutcome::Destroyed);
    let calls: Vec<_> = harness
        .cluster
        .calls()
        .into_iter()
        .filter(|c| !matches!(c, ClusterCall::Exists { .. }))
        .collect();
    assert_eq!(
        calls,
        vec![
            ClusterCall::Delete {
                kind: ResourceKind::Deployment,
                name: "web".into()
            },
            ClusterCall::ListDependents {
                kind: DependentKind::ReplicaSet,
                selector: "name=web".into()
            },
            ClusterCall::DeleteDependent {
                kind: DependentKind::ReplicaSet,
                name: "web-5d8f".into()
            },
            ClusterCall::DeleteDependent {
                kind: DependentKind::ReplicaSet,
                name: "web-7c2a".into()
            },
            ClusterCall::DeleteDependents {
                kind: DependentKind::Pod,
                selector: "name=web".into()
            },
        ]
    );
}

#[tokio::test]
async fn job_destroy_sweeps_pods_by_job_name() {
    let cluster = FakeCluster::new()
        .with_namespace("shop")
        .with_object(ResourceKind::Job, "migrate", "shop");
    let harness = Harness::new(cluster);
    let migrate = asset("migrate.yml", &job("migrate", "busybox"));

    harness.orchestrator().destroy_asset(&migrate, "shop").await.unwrap();

    assert!(harness.cluster.calls().contains(&ClusterCall::DeleteDependents {
        kind: DependentKind::Pod,
        selector: "job-name=migrate".into()
    }));
}

#[tokio::test]
async fn down_deletes_namespace_when_configured() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    let project = shop_project(ProjectConfig {
        delete_namespace: true,
        ..Default::default()
    });

    harness.orchestrator().down(&project).await.unwrap();
    assert!(!harness.cluster.has_namespace("shop"));
}

#[tokio::test]
async fn default_namespace_is_never_deleted() {
    let harness = Harness::new(FakeCluster::new().with_namespace("default"));
    let project = project(
        ProjectConfig {
            delete_namespace: true,
            ..Default::default()
        },
        "default",
        vec![],
        vec![],
        vec![],
    );

    harness.orchestrator().down(&project).await.unwrap();

    assert!(harness.cluster.has_namespace("default"));
    assert!(
        !harness
            .cluster
            .calls()
            .contains(&ClusterCall::DeleteNamespace("default".into()))
    );
    assert!(matches!(
        harness.outcomes(Stage::Namespace).as_slice(),
        [(_, Outcome::Skipped(_))]
    ));
}

#[tokio::test(start_paused = true)]
async fn namespace_delete_retries_while_busy() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    harness.cluster.fail_next(
        "delete_namespace",
        ClusterError::Conflict {
            message: "operation in progress".into(),
        },
    );
    let project = project(
        ProjectConfig {
            delete_namespace: true,
            ..Default::default()
        },
        "shop",
        vec![],
        vec![],
        vec![],
    );

    harness.orchestrator().down(&project).await.unwrap();

    let deletes = harness
        .cluster
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ClusterCall::DeleteNamespace(_)))
        .count();
    assert_eq!(deletes, 2);
    assert!(!harness.cluster.has_namespace("shop"));
}

#[tokio::test]
async fn down_removes_auto_clean_images() {
    let harness = Harness::new(FakeCluster::new().with_namespace("shop"));
    let project = shop_project(ProjectConfig {
        build: vec![
            ProjectBuild {
                name: "gcr.io/acme/web".into(),
                tag: "7".into(),
                push: true,
                push_latest: true,
                auto_clean: true,
                ..Default::default()
            },
            ProjectBuild {
                name: "gcr.io/acme/keep".into(),
                tag: "1".into(),
                ..Default::default()
            },
        ],
        ..Default::default()
    });

    harness.orchestrator().down(&project).await.unwrap();

    assert_eq!(
        harness.images.calls(),
        vec![
            BackendCall::Remove("gcr.io/acme/web:7".into()),
            BackendCall::Remove("gcr.io/acme/web:latest".into()),
        ]
    );
}

#[tokio::test]
async fn down_services_leaves_other_collections() {
    let cluster = FakeCluster::new()
        .with_namespace("shop")
        .with_object(ResourceKind::ConfigMap, "settings", "shop")
        .with_object(ResourceKind::Service, "web", "shop")
        .with_object(ResourceKind::Service, "api", "shop");
    let harness = Harness::new(cluster);
    let project = project(
        ProjectConfig::default(),
        "shop",
        vec![asset("settings.yml", &config_map("settings"))],
        vec![],
        vec![
            asset("web.yml", &service("web")),
            asset("api.yml", &service("api")),
        ],
    );

    harness.orchestrator().down_services(&project).await.unwrap();

    assert_eq!(harness.cluster.deleted(), vec!["service/web", "service/api"]);
    assert!(harness.cluster.contains(ResourceKind::ConfigMap, "settings", "shop"));
}

// update

#[tokio::test]
async fn update_replaces_only_existing_updatable_kinds() {
    let cluster = FakeCluster::new()
        .with_namespace("shop")
        .with_object(ResourceKind::ConfigMap, "settings", "shop")
        .with_object(ResourceKind::Service, "web", "shop");
    let harness = Harness::new(cluster);
    let project = project(
        ProjectConfig::default(),
        "shop",
        vec![
            asset("settings.yml", &config_map("settings")),
            asset("api.yml", &deployment("api", "gcr.io/acme/api:2")),
        ],
        vec![],
        vec![asset("web.yml", &service("web"))],
    );

    harness.orchestrator().update(&project).await.unwrap();

    let updates: Vec<_> = harness
        .cluster
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ClusterCall::Update { .. }))
        .collect();
    assert_eq!(
        updates,
        vec![ClusterCall::Update {
            kind: ResourceKind::ConfigMap,
            name: "settings".into()
        }]
    );
    assert_eq!(
        harness.outcomes(Stage::Update),
        vec![
            ("settings".to_string(), Outcome::Succeeded),
            ("api".to_string(), Outcome::NotExisted),
        ]
    );
    assert!(harness.cluster.created().is_empty());
}

// autoupdate

fn listing() -> TagListing {
    let mut listing = TagListing::default();
    listing.manifests.insert(
        "sha256:aaa".into(),
        ManifestEntry {
            tags: vec!["2".into()],
            created_ms: 1_000,
        },
    );
    listing.manifests.insert(
        "sha256:bbb".into(),
        ManifestEntry {
            tags: vec!["3".into(), "latest".into()],
            created_ms: 2_000,
        },
    );
    listing
}

fn auto_update_project(image: &str, credential: Option<&str>) -> (Project, FakeCluster) {
    let web = asset("web.yml", &deployment("web", image));
    let cluster = FakeCluster::new()
        .with_namespace("shop")
        .with_deployment("shop", live_deployment(&web));
    let config = ProjectConfig {
        auto_updates: vec![AutoUpdate {
            name: "web".into(),
            containers: vec![
                AutoUpdateContainer {
                    name: "web".into(),
                    credential: credential.map(String::from),
                },
                AutoUpdateContainer {
                    name: "sidecar".into(),
                    credential: None,
                },
            ],
        }],
        auto_update_credentials: vec![AutoUpdateCredential {
            name: "gcr".into(),
            username: "_json_key".into(),
            password: Some("secret".into()),
            password_file: None,
        }],
        ..Default::default()
    };
    (project(config, "shop", vec![web], vec![], vec![]), cluster)
}

#[tokio::test]
async fn autoupdate_moves_to_newest_registry_tag() {
    let (project, cluster) = auto_update_project("gcr.io/acme/web:1", Some("gcr"));
    let harness = Harness::new(cluster);
    let registry = StaticRegistry::new(listing());

    harness
        .orchestrator()
        .auto_update(&project, &registry, None)
        .await
        .unwrap();

    assert_eq!(container_images(&harness.cluster, "web"), vec!["gcr.io/acme/web:3"]);
    assert_eq!(
        registry.requests(),
        vec![("gcr.io/acme/web".to_string(), Some("_json_key".to_string()))]
    );
    assert!(harness.outcomes(Stage::AutoUpdate).iter().any(|(_, o)| matches!(
        o,
        Outcome::Changed(change) if change == "web -> gcr.io/acme/web:3"
    )));
}

#[tokio::test]
async fn autoupdate_explicit_tag_skips_registry() {
    let (project, cluster) = auto_update_project("nginx:1.25", None);
    let harness = Harness::new(cluster);
    let registry = StaticRegistry::new(TagListing::default());

    harness
        .orchestrator()
        .auto_update(&project, &registry, Some("1.27"))
        .await
        .unwrap();

    assert_eq!(container_images(&harness.cluster, "web"), vec!["nginx:1.27"]);
    assert!(registry.requests().is_empty());
}

#[tokio::test]
async fn autoupdate_already_current_is_unchanged() {
    let (project, cluster) = auto_update_project("gcr.io/acme/web:3", None);
    let harness = Harness::new(cluster);
    let registry = StaticRegistry::new(listing());

    harness
        .orchestrator()
        .auto_update(&project, &registry, None)
        .await
        .unwrap();

    assert!(
        !harness
            .cluster
            .calls()
            .iter()
            .any(|c| matches!(c, ClusterCall::UpdateDeployment(_)))
    );
}

#[tokio::test]
async fn autoupdate_skips_unsupported_registry() {
    let (project, cluster) = auto_update_project("docker.io/library/nginx:1.25", None);
    let harness = Harness::new(cluster);
    let registry = StaticRegistry::new(listing());

    harness
        .orchestrator()
        .auto_update(&project, &registry, None)
        .await
        .unwrap();

    assert_eq!(
        container_images(&harness.cluster, "web"),
        vec!["docker.io/library/nginx:1.25"]
    );
    assert!(
        harness
            .outcomes(Stage::AutoUpdate)
            .iter()
            .any(|(_, o)| matches!(o, Outcome::Skipped(reason) if reason.contains("unsupported registry")))
    );
}

#[tokio::test]
async fn autoupdate_unknown_credential_is_config_error() {
    let (project, cluster) = auto_update_project("gcr.io/acme/web:1", Some("quay"));
    let harness = Harness::new(cluster);
    let registry = StaticRegistry::new(listing());

    let err = harness
        .orchestrator()
        .auto_update(&project, &registry, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::InvalidConfig(_)));
}
