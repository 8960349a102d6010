//! Wire format of the tag listing.

use kdeploy_core::registry::{ManifestEntry, RegistryError, TagListing};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Body of `GET /v2/<repository>/tags/list`.
#[derive(Debug, Deserialize)]
pub(crate) struct TagListResponse {
    #[serde(default)]
    pub manifest: BTreeMap<String, ManifestInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ManifestInfo {
    #[serde(default)]
    pub tag: Vec<String>,
    /// Milliseconds since the epoch, encoded as a decimal string.
    #[serde(rename = "timeCreatedMs", default)]
    pub time_created_ms: Option<String>,
}

impl TryFrom<TagListResponse> for TagListing {
    type Error = RegistryError;

    fn try_from(response: TagListResponse) -> Result<Self, Self::Error> {
        let mut manifests = BTreeMap::new();
        for (digest, info) in response.manifest {
            let created_ms = match info.time_created_ms.as_deref() {
                Some(ms) => ms.parse::<i64>().map_err(|e| {
                    RegistryError::Parse(format!("timeCreatedMs {ms:?} of {digest}: {e}"))
                })?,
                None => 0,
            };
            manifests.insert(
                digest,
                ManifestEntry {
                    tags: info.tag,
                    created_ms,
                },
            );
        }
        Ok(TagListing { manifests })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_listing() {
        let body = r#"{
            "name": "acme/web",
            "manifest": {
                "sha256:aaa": {"tag": ["1", "latest"], "timeCreatedMs": "1500000000000"},
                "sha256:bbb": {"tag": [], "timeCreatedMs": "1400000000000"}
            }
        }"#;
        let response: TagListResponse = serde_json::from_str(body).unwrap();
        let listing = TagListing::try_from(response).unwrap();

        assert_eq!(listing.manifests.len(), 2);
        assert_eq!(listing.manifests["sha256:aaa"].created_ms, 1_500_000_000_000);
        assert_eq!(listing.latest_tag(), Some("1"));
    }

    #[test]
    fn rejects_non_numeric_timestamp() {
        let body = r#"{"manifest": {"sha256:aaa": {"tag": ["1"], "timeCreatedMs": "soon"}}}"#;
        let response: TagListResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            TagListing::try_from(response),
            Err(RegistryError::Parse(_))
        ));
    }
}
