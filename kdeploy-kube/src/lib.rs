//! Kubernetes adapter for kdeploy.
//!
//! Implements [`kdeploy_core::ControlPlane`] with `kube`, dispatching each
//! supported resource kind to its typed API.

#![warn(missing_docs)]

mod client;
mod error;

pub use client::KubeControlPlane;
pub use error::ConnectError;
