//! Registry tag listing for kdeploy auto-updates.
//!
//! [`GcrRegistry`] implements [`kdeploy_core::RegistryClient`] against the
//! Google Container Registry `/v2/<repository>/tags/list` endpoint, which
//! reports each manifest digest with its tags and creation time.
//!
//! # Example
//!
//! ```no_run
//! use kdeploy_core::registry::{ImageRef, discover_latest_tag};
//! use kdeploy_registry::GcrRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = GcrRegistry::new()?;
//! let image = ImageRef::parse("gcr.io/acme/web:1.2")?;
//! let tag = discover_latest_tag(&registry, &image, None).await?;
//! println!("newest tag: {tag}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod client;
mod types;

pub use client::GcrRegistry;
