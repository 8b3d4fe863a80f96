//! Dual-path publication.
//!
//! ## `publish` protocol
//!
//! 1. Prune keys under `{prefix}/{version}/{variant}/` that are not in the
//!    artifact set, so a retried version is replaced rather than merged.
//! 2. Upload every file to the versioned prefix and to the stable alias
//!    `{prefix}/{variant}/`, concurrently, each write individually timed out.
//! 3. Once every write is acknowledged, prune stale keys from the stable
//!    alias. Only top-level files and files inside a top-level directory the
//!    current set also has are candidates; the manifest object never is.
//!    Deeper keys under other names belong to whatever else shares the
//!    alias path, such as a version namespace named like the variant.
//!
//! Any failure fails the whole publish; the caller must not touch the
//! manifest in that case.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};

use movenet_core::{ModelVersion, Variant, VariantName};

use crate::artifact::{ArtifactFile, ArtifactSet};
use crate::error::PublishError;
use crate::store::{with_timeout, ObjectStore};

/// Everything written for one variant in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    pub variant: VariantName,
    pub version: ModelVersion,
    pub versioned_keys: Vec<String>,
    pub stable_keys: Vec<String>,
    /// Keys removed because they were not part of this artifact set.
    pub pruned_keys: Vec<String>,
}

impl PublishRecord {
    pub fn object_count(&self) -> usize {
        self.versioned_keys.len() + self.stable_keys.len()
    }
}

#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    max_concurrent_uploads: usize,
    upload_timeout: Duration,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        max_concurrent_uploads: usize,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            store,
            max_concurrent_uploads: max_concurrent_uploads.max(1),
            upload_timeout,
        }
    }

    pub async fn publish(
        &self,
        variant: &Variant,
        set: &ArtifactSet,
        version: &ModelVersion,
    ) -> Result<PublishRecord, PublishError> {
        let versioned_prefix = variant.versioned_prefix(version);
        let stable_prefix = variant.stable_prefix();

        let versioned_keys: Vec<String> = set
            .files()
            .iter()
            .map(|f| format!("{versioned_prefix}/{}", f.relative_path))
            .collect();
        let stable_keys: Vec<String> = set
            .files()
            .iter()
            .map(|f| format!("{stable_prefix}/{}", f.relative_path))
            .collect();

        // Step 1: clear leftovers from an earlier attempt at this version.
        let current: BTreeSet<&str> = versioned_keys.iter().map(String::as_str).collect();
        let mut pruned_keys = self
            .prune(&versioned_prefix, |_, key| !current.contains(key))
            .await?;

        // Step 2: upload both copies of every file.
        stream::iter(set.files().iter().zip(versioned_keys.iter().zip(stable_keys.iter())))
            .map(|(file, (versioned, stable))| self.upload_file(file, versioned, stable))
            .buffer_unordered(self.max_concurrent_uploads)
            .try_collect::<Vec<()>>()
            .await?;

        // Step 3: the alias now mirrors this set; drop what it no longer has.
        let manifest_key = variant.manifest_key();
        let current: BTreeSet<&str> = stable_keys.iter().map(String::as_str).collect();
        let dirs = set.top_level_dirs();
        pruned_keys.extend(
            self.prune(&stable_prefix, |relative, key| {
                key != manifest_key
                    && !current.contains(key)
                    && relative
                        .split_once('/')
                        .map_or(true, |(dir, _)| dirs.contains(dir))
            })
            .await?,
        );

        tracing::info!(
            variant = %variant.name,
            version = %version,
            files = set.len(),
            bytes = set.total_bytes(),
            pruned = pruned_keys.len(),
            "artifacts published",
        );

        Ok(PublishRecord {
            variant: variant.name.clone(),
            version: version.clone(),
            versioned_keys,
            stable_keys,
            pruned_keys,
        })
    }

    async fn upload_file(
        &self,
        file: &ArtifactFile,
        versioned_key: &str,
        stable_key: &str,
    ) -> Result<(), PublishError> {
        let body = tokio::fs::read(&file.path)
            .await
            .map_err(|e| PublishError::UploadFailed {
                key: versioned_key.to_string(),
                reason: format!("cannot read {}: {e}", file.path.display()),
            })?;
        futures::try_join!(
            self.put(versioned_key, body.clone()),
            self.put(stable_key, body),
        )?;
        Ok(())
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), PublishError> {
        with_timeout(key, self.upload_timeout, self.store.put(key, body))
            .await
            .map_err(|e| PublishError::UploadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(key, "uploaded");
        Ok(())
    }

    /// Delete the keys under `{prefix}/` that `is_stale(relative_path, key)`
    /// selects.
    async fn prune(
        &self,
        prefix: &str,
        is_stale: impl Fn(&str, &str) -> bool,
    ) -> Result<Vec<String>, PublishError> {
        let list_prefix = format!("{prefix}/");
        let existing = with_timeout(&list_prefix, self.upload_timeout, self.store.list(&list_prefix))
            .await
            .map_err(|e| PublishError::UploadFailed {
                key: list_prefix.clone(),
                reason: format!("cannot list existing objects: {e}"),
            })?;

        let stale: Vec<String> = existing
            .into_iter()
            .filter(|key| {
                key.strip_prefix(&list_prefix)
                    .is_some_and(|relative| is_stale(relative, key.as_str()))
            })
            .collect();

        for key in &stale {
            with_timeout(key, self.upload_timeout, self.store.delete(key))
                .await
                .map_err(|e| PublishError::UploadFailed {
                    key: key.clone(),
                    reason: format!("cannot remove stale object: {e}"),
                })?;
            tracing::debug!(key = %key, "pruned stale object");
        }
        Ok(stale)
    }
}
