//! Error mapping between `kube` and the control-plane taxonomy.

use kdeploy_core::cluster::ClusterError;
use kube::runtime::watcher;
use thiserror::Error;

/// Errors raised while connecting to a cluster.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The kubeconfig file could not be read or resolved.
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// No in-cluster or default configuration was found.
    #[error("failed to infer cluster configuration: {0}")]
    Infer(#[from] kube::config::InferConfigError),

    /// The HTTP client could not be built.
    #[error("failed to create Kubernetes client: {0}")]
    Client(#[from] kube::Error),
}

/// Classify a `kube` error.
pub(crate) fn classify(err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(status) => {
            ClusterError::from_status(status.code, &status.reason, &status.message)
        }
        kube::Error::SerdeError(e) => ClusterError::Decode(e.to_string()),
        other => ClusterError::Transport(other.to_string()),
    }
}

/// Classify a watcher error; `None` means the watcher recovers on its own.
///
/// Client errors persist across retries and are reported, except `410 Gone`
/// (an expired resource version) and `429 Too Many Requests`.
pub(crate) fn classify_watch(err: watcher::Error) -> Option<ClusterError> {
    let status = match &err {
        watcher::Error::WatchFailed(kube::Error::SerdeError(e)) => {
            return Some(ClusterError::Decode(e.to_string()));
        }
        watcher::Error::InitialListFailed(kube::Error::Api(status))
        | watcher::Error::WatchStartFailed(kube::Error::Api(status))
        | watcher::Error::WatchFailed(kube::Error::Api(status))
        | watcher::Error::WatchError(status) => Some(status),
        _ => None,
    };
    match status {
        Some(status) if persistent(status.code) => Some(ClusterError::from_status(
            status.code,
            &status.reason,
            &status.message,
        )),
        _ => {
            tracing::warn!(error = %err, "Watch interrupted, retrying");
            None
        }
    }
}

fn persistent(code: u16) -> bool {
    (400..500).contains(&code) && code != 410 && code != 429
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
        kube::Error::Api(status(code, reason, message))
    }

    #[test]
    fn api_statuses_are_classified() {
        assert!(matches!(
            classify(api_error(404, "NotFound", "pods \"web\" not found")),
            ClusterError::NotFound { .. }
        ));
        assert_eq!(
            classify(api_error(404, "NotFound", "namespaces \"shop\" not found")),
            ClusterError::NamespaceMissing {
                namespace: "shop".to_string()
            }
        );
        assert!(matches!(
            classify(api_error(409, "AlreadyExists", "configmaps \"settings\" already exists")),
            ClusterError::Conflict { .. }
        ));
    }

    fn status(code: u16, reason: &str, message: &str) -> ErrorResponse {
        ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: reason.to_string(),
            code,
        }
    }

    #[test]
    fn forbidden_watch_is_reported() {
        let err = watcher::Error::InitialListFailed(api_error(
            403,
            "Forbidden",
            "pods is forbidden: User \"ci\" cannot watch resource \"pods\"",
        ));
        assert!(matches!(
            classify_watch(err),
            Some(ClusterError::Api { code: 403, .. })
        ));
    }

    #[test]
    fn missing_resource_watch_is_reported() {
        let err =
            watcher::Error::WatchStartFailed(api_error(404, "NotFound", "pods \"web\" not found"));
        assert!(matches!(
            classify_watch(err),
            Some(ClusterError::NotFound { .. })
        ));
    }

    #[test]
    fn expired_and_throttled_watches_are_retried() {
        let gone = watcher::Error::WatchError(status(410, "Expired", "too old resource version"));
        assert_eq!(classify_watch(gone), None);
        let throttled = watcher::Error::WatchFailed(api_error(429, "TooManyRequests", "slow down"));
        assert_eq!(classify_watch(throttled), None);
        let server =
            watcher::Error::InitialListFailed(api_error(500, "InternalError", "etcd timeout"));
        assert_eq!(classify_watch(server), None);
    }

    #[test]
    fn decode_failures_are_not_transport() {
        let serde = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            classify(kube::Error::SerdeError(serde)),
            ClusterError::Decode(_)
        ));
    }
}
