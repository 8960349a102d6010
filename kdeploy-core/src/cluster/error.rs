//! Control-plane error taxonomy.

use thiserror::Error;

const TERMINATING_PREFIX: &str = "unable to create new content in namespace";
const TERMINATING_SUFFIX: &str = "being terminated";

/// Errors reported by a [`ControlPlane`](super::ControlPlane).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// The named object does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Server message.
        message: String,
    },

    /// The target namespace does not exist yet.
    #[error("namespace {namespace:?} not found")]
    NamespaceMissing {
        /// The missing namespace.
        namespace: String,
    },

    /// The target namespace is being deleted.
    #[error("namespace is terminating: {message}")]
    NamespaceTerminating {
        /// Server message.
        message: String,
    },

    /// The object is busy or was modified concurrently.
    #[error("conflict: {message}")]
    Conflict {
        /// Server message.
        message: String,
    },

    /// Any other API status.
    #[error("API error {code} ({reason}): {message}")]
    Api {
        /// HTTP status code.
        code: u16,
        /// Status reason.
        reason: String,
        /// Server message.
        message: String,
    },

    /// Connection or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// An object or event could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Result type for control-plane calls.
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

impl ClusterError {
    /// Classify an API status.
    pub fn from_status(code: u16, reason: &str, message: &str) -> Self {
        if message.contains(TERMINATING_PREFIX) && message.contains(TERMINATING_SUFFIX) {
            return Self::NamespaceTerminating {
                message: message.to_string(),
            };
        }
        match code {
            404 => match missing_namespace(message) {
                Some(namespace) => Self::NamespaceMissing {
                    namespace: namespace.to_string(),
                },
                None => Self::NotFound {
                    message: message.to_string(),
                },
            },
            409 => Self::Conflict {
                message: message.to_string(),
            },
            _ => Self::Api {
                code,
                reason: reason.to_string(),
                message: message.to_string(),
            },
        }
    }

    /// Whether the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Extract `<ns>` from `namespaces "<ns>" not found`.
fn missing_namespace(message: &str) -> Option<&str> {
    let start = message.find("namespaces \"")? + "namespaces \"".len();
    let rest = &message[start..];
    let end = rest.find('"')?;
    rest[end..]
        .starts_with("\" not found")
        .then(|| &rest[..end])
}
