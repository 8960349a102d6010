//! Image references and registry tag discovery.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Alias tag never chosen by tag discovery.
pub const LATEST_TAG: &str = "latest";

const DEFAULT_REGISTRY: &str = "docker.io";

/// Errors from tag discovery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry host is not one the client can query.
    #[error("registry host {host:?} is not supported for tag discovery")]
    UnsupportedHost {
        /// Registry host of the image.
        host: String,
    },

    /// The registry answered with an error status.
    #[error("registry returned {status} for {image}: {message}")]
    Http {
        /// HTTP status.
        status: u16,
        /// Image being looked up.
        image: String,
        /// Response body.
        message: String,
    },

    /// The request could not be sent.
    #[error("registry request failed: {0}")]
    Transport(String),

    /// The listing could not be parsed.
    #[error("invalid tag listing: {0}")]
    Parse(String),

    /// The listing contains no usable tag.
    #[error("no tag other than `latest` found for {image}")]
    NoTag {
        /// Image being looked up.
        image: String,
    },

    /// An image reference could not be parsed.
    #[error("invalid image reference {0:?}")]
    InvalidReference(String),
}

/// Result type for registry calls.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// A parsed image reference: `[registry/]repository[:tag][@digest]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Registry host, `docker.io` when omitted.
    pub registry: String,
    /// Repository path below the registry.
    pub repository: String,
    /// Tag, if any.
    pub tag: Option<String>,
    /// Digest, if any.
    pub digest: Option<String>,
    explicit_registry: bool,
}

impl ImageRef {
    /// Parse an image reference.
    pub fn parse(image: &str) -> RegistryResult<Self> {
        if image.is_empty() || image.contains(char::is_whitespace) {
            return Err(RegistryError::InvalidReference(image.to_string()));
        }
        let (rest, digest) = match image.split_once('@') {
            Some((rest, digest)) => (rest, Some(digest.to_string())),
            None => (image, None),
        };

        // A colon after the last slash separates the tag; earlier colons are ports.
        let last_slash = rest.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match rest[last_slash..].rfind(':') {
            Some(i) => (
                &rest[..last_slash + i],
                Some(rest[last_slash + i + 1..].to_string()),
            ),
            None => (rest, None),
        };

        let (registry, repository, explicit_registry) = match name.split_once('/') {
            Some((host, repo))
                if host.contains('.') || host.contains(':') || host == "localhost" =>
            {
                (host.to_string(), repo.to_string(), true)
            }
            _ => (DEFAULT_REGISTRY.to_string(), name.to_string(), false),
        };

        if repository.is_empty() || tag.as_deref() == Some("") {
            return Err(RegistryError::InvalidReference(image.to_string()));
        }
        Ok(Self {
            registry,
            repository,
            tag,
            digest,
            explicit_registry,
        })
    }

    /// The reference without tag or digest, as written.
    pub fn name(&self) -> String {
        if self.explicit_registry {
            format!("{}/{}", self.registry, self.repository)
        } else {
            self.repository.clone()
        }
    }

    /// The same image with `tag`.
    pub fn with_tag(&self, tag: &str) -> String {
        format!("{}:{tag}", self.name())
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

/// Basic-auth credentials for a registry.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    /// User name.
    pub username: String,
    /// Password or token.
    pub password: String,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One manifest in a tag listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Tags pointing at this manifest.
    pub tags: Vec<String>,
    /// Creation time in milliseconds since the epoch.
    pub created_ms: i64,
}

/// Manifests of a repository, keyed by digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagListing {
    /// Digest to manifest.
    pub manifests: BTreeMap<String, ManifestEntry>,
}

impl TagListing {
    /// The newest tag, excluding [`LATEST_TAG`].
    ///
    /// Within one manifest the last non-latest tag wins. Manifests without
    /// such a tag are ignored; on equal timestamps the first digest wins.
    pub fn latest_tag(&self) -> Option<&str> {
        let mut best: Option<(i64, &str)> = None;
        for entry in self.manifests.values() {
            let Some(tag) = entry.tags.iter().rev().find(|t| *t != LATEST_TAG) else {
                continue;
            };
            if best.is_none_or(|(created, _)| entry.created_ms > created) {
                best = Some((entry.created_ms, tag));
            }
        }
        best.map(|(_, tag)| tag)
    }
}

/// Boxed future returned by registry calls.
pub type RegistryFuture<'a, T> = Pin<Box<dyn Future<Output = RegistryResult<T>> + Send + 'a>>;

/// Lists the manifests of an image repository.
pub trait RegistryClient: Send + Sync {
    /// Whether `image` lives on a registry this client can query.
    fn supports(&self, image: &ImageRef) -> bool;

    /// Fetch the tag listing for `image`.
    fn list_tags<'a>(
        &'a self,
        image: &'a ImageRef,
        credentials: Option<&'a RegistryCredentials>,
    ) -> RegistryFuture<'a, TagListing>;
}

/// Find the newest non-latest tag of `image`.
pub async fn discover_latest_tag(
    client: &dyn RegistryClient,
    image: &ImageRef,
    credentials: Option<&RegistryCredentials>,
) -> RegistryResult<String> {
    if !client.supports(image) {
        return Err(RegistryError::UnsupportedHost {
            host: image.registry.clone(),
        });
    }
    let listing = client.list_tags(image, credentials).await?;
    let tag = listing
        .latest_tag()
        .ok_or_else(|| RegistryError::NoTag {
            image: image.name(),
        })?
        .to_string();
    tracing::debug!(image = %image.name(), tag = %tag, "Discovered latest tag");
    Ok(tag)
}
