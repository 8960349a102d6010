//! Common imports for driving a project.

pub use crate::build::{ImageBackend, RetryPolicy};
pub use crate::cluster::ControlPlane;
pub use crate::error::{DeployError, Result};
pub use crate::follow::{FollowConfig, LogFollower, PodOutcome};
pub use crate::manifest::{Asset, ResourceKind, ResourceMeta};
pub use crate::orchestrator::{Orchestrator, OrchestratorConfig};
pub use crate::progress::{ProgressEvent, ProgressSink};
pub use crate::project::{LoadOptions, Project};
pub use crate::registry::RegistryClient;
pub use crate::scripts::ScriptRunner;
pub use crate::variables::VariableScope;
pub use crate::wait::{JobOutcome, JobWaiter, WaitConfig};
