//! The closed set of resource kinds a project may declare.
//!
//! The table in [`resource_kinds!`] is the only place a kind is registered:
//! one row yields the [`ResourceKind`] variant, the [`Resource`] variant
//! wrapping the typed `k8s-openapi` object, name/namespace access and typed
//! decoding.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::fmt;

macro_rules! resource_kinds {
    ($(
        $variant:ident($ty:ty) => $name:literal, namespaced: $namespaced:literal, legacy: [$($legacy:literal),*];
    )*) => {
        /// A supported resource kind, identified by its lower-cased manifest `kind`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ResourceKind {
            $(
                #[doc = concat!("`kind: ", stringify!($variant), "`")]
                $variant,
            )*
        }

        impl ResourceKind {
            /// Every supported kind.
            pub const ALL: &'static [ResourceKind] = &[$(ResourceKind::$variant),*];

            /// Lower-cased kind name, as stored on an [`Asset`](super::Asset).
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            /// Parse a manifest `kind` (case-insensitive).
            pub fn parse(kind: &str) -> Option<Self> {
                match kind.to_lowercase().as_str() {
                    $($name => Some(Self::$variant),)*
                    _ => None,
                }
            }

            /// The served `apiVersion` the typed object decodes from.
            pub fn api_version(&self) -> &'static str {
                match self {
                    $(Self::$variant => <$ty as k8s_openapi::Resource>::API_VERSION,)*
                }
            }

            /// The canonical CamelCase `kind`.
            pub fn canonical_kind(&self) -> &'static str {
                match self {
                    $(Self::$variant => <$ty as k8s_openapi::Resource>::KIND,)*
                }
            }

            /// Older group versions rewritten to [`api_version`](Self::api_version) on decode.
            pub fn legacy_api_versions(&self) -> &'static [&'static str] {
                match self {
                    $(Self::$variant => &[$($legacy),*],)*
                }
            }

            /// Whether objects of this kind live inside a namespace.
            pub fn is_namespaced(&self) -> bool {
                match self {
                    $(Self::$variant => $namespaced,)*
                }
            }
        }

        /// A decoded resource of one of the supported kinds.
        #[derive(Debug, Clone, PartialEq)]
        #[allow(clippy::large_enum_variant)]
        pub enum Resource {
            $(
                #[doc = concat!("A `", stringify!($variant), "`.")]
                $variant($ty),
            )*
        }

        impl Resource {
            /// The kind of this resource.
            pub fn kind(&self) -> ResourceKind {
                match self {
                    $(Self::$variant(_) => ResourceKind::$variant,)*
                }
            }

            /// Object metadata.
            pub fn metadata(&self) -> &ObjectMeta {
                match self {
                    $(Self::$variant(r) => &r.metadata,)*
                }
            }

            /// Mutable object metadata.
            pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
                match self {
                    $(Self::$variant(r) => &mut r.metadata,)*
                }
            }

            /// Decode a normalized manifest into the typed object for `kind`.
            pub(crate) fn from_value(
                kind: ResourceKind,
                value: serde_yaml::Value,
            ) -> Result<Self, serde_yaml::Error> {
                match kind {
                    $(ResourceKind::$variant => serde_yaml::from_value::<$ty>(value).map(Self::$variant),)*
                }
            }

            /// Encode the typed object back to JSON.
            pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
                match self {
                    $(Self::$variant(r) => serde_json::to_value(r),)*
                }
            }
        }
    };
}

resource_kinds! {
    Pod(Pod) => "pod", namespaced: true, legacy: [];
    Deployment(Deployment) => "deployment", namespaced: true,
        legacy: ["extensions/v1beta1", "apps/v1beta1", "apps/v1beta2"];
    Service(Service) => "service", namespaced: true, legacy: [];
    Job(Job) => "job", namespaced: true, legacy: [];
    PersistentVolumeClaim(PersistentVolumeClaim) => "persistentvolumeclaim", namespaced: true, legacy: [];
    ConfigMap(ConfigMap) => "configmap", namespaced: true, legacy: [];
    Secret(Secret) => "secret", namespaced: true, legacy: [];
    Ingress(Ingress) => "ingress", namespaced: true, legacy: [];
    Endpoints(Endpoints) => "endpoints", namespaced: true, legacy: [];
    DaemonSet(DaemonSet) => "daemonset", namespaced: true,
        legacy: ["extensions/v1beta1", "apps/v1beta2"];
    ServiceAccount(ServiceAccount) => "serviceaccount", namespaced: true, legacy: [];
    Role(Role) => "role", namespaced: true, legacy: ["rbac.authorization.k8s.io/v1beta1"];
    ClusterRole(ClusterRole) => "clusterrole", namespaced: false,
        legacy: ["rbac.authorization.k8s.io/v1beta1"];
    RoleBinding(RoleBinding) => "rolebinding", namespaced: true,
        legacy: ["rbac.authorization.k8s.io/v1beta1"];
    ClusterRoleBinding(ClusterRoleBinding) => "clusterrolebinding", namespaced: false,
        legacy: ["rbac.authorization.k8s.io/v1beta1"];
    StatefulSet(StatefulSet) => "statefulset", namespaced: true,
        legacy: ["apps/v1beta1", "apps/v1beta2"];
}

impl ResourceKind {
    /// Whether `update` replaces objects of this kind in place.
    pub fn supports_update(&self) -> bool {
        matches!(
            self,
            Self::Pod | Self::Deployment | Self::ConfigMap | Self::Secret
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform name/namespace access over every resource variant.
pub trait ResourceMeta {
    /// `metadata.name`, empty when unset.
    fn name(&self) -> &str;

    /// `metadata.namespace`, empty when unset.
    fn namespace(&self) -> &str;

    /// Overwrite `metadata.namespace`.
    fn set_namespace(&mut self, namespace: &str);
}

impl ResourceMeta for Resource {
    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut().namespace = Some(namespace.to_string());
    }
}
