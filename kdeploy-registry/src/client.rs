//! HTTP client for the tag listing endpoint.

use crate::types::TagListResponse;
use kdeploy_core::registry::{
    ImageRef, RegistryClient, RegistryCredentials, RegistryError, RegistryFuture, RegistryResult,
    TagListing,
};
use reqwest::Client as HttpClient;
use std::time::Duration;

const GCR_HOST: &str = "gcr.io";

/// Tag listing client for `gcr.io` and its regional hosts.
#[derive(Debug, Clone)]
pub struct GcrRegistry {
    http: HttpClient,
    /// Replaces `https://<registry>` when set.
    base_url: Option<String>,
}

impl GcrRegistry {
    /// Create a client with a 30 second request timeout.
    pub fn new() -> RegistryResult<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RegistryError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: None,
        })
    }

    /// Send every request to `base_url` instead of the image's registry host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn url(&self, image: &ImageRef) -> String {
        let base = match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}", image.registry),
        };
        format!("{base}/v2/{}/tags/list", image.repository)
    }

    async fn fetch(
        &self,
        image: &ImageRef,
        credentials: Option<&RegistryCredentials>,
    ) -> RegistryResult<TagListing> {
        let url = self.url(image);
        tracing::debug!(image = %image.name(), url = %url, "Listing registry tags");

        let mut request = self.http.get(&url);
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RegistryError::Http {
                status: status.as_u16(),
                image: image.name(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;
        let listing: TagListResponse =
            serde_json::from_str(&body).map_err(|e| RegistryError::Parse(e.to_string()))?;
        TagListing::try_from(listing)
    }
}

impl RegistryClient for GcrRegistry {
    fn supports(&self, image: &ImageRef) -> bool {
        image.registry == GCR_HOST || image.registry.ends_with(".gcr.io")
    }

    fn list_tags<'a>(
        &'a self,
        image: &'a ImageRef,
        credentials: Option<&'a RegistryCredentials>,
    ) -> RegistryFuture<'a, TagListing> {
        Box::pin(self.fetch(image, credentials))
    }
}
