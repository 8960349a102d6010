//! Log output for the `kdeploy` binary.
//!
//! The format is chosen by `KDEPLOY_LOG_FORMAT`:
//! - `json` - one JSON object per event
//! - `pretty` - multi-line human output (default on a TTY)
//! - `compact` - single-line output (default otherwise)
//!
//! The filter comes from `RUST_LOG` when set, else from the `-v` count.

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig};
pub use tracing_setup::init_tracing;
