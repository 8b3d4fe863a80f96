//! Sync orchestration.
//!
//! Each variant moves through
//! `Pending -> Fetched -> HashCompared -> Published | Skipped | Failed`.
//! Variants run concurrently up to the worker limit; a failure is recorded on
//! that variant's report and never stops the others.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::{self, Instant};

use movenet_core::{ContentHash, ManifestEntry, ModelVersion, SyncConfig, Variant, VariantName};

use crate::artifact::ArtifactSet;
use crate::change::should_publish;
use crate::convert;
use crate::error::{fetch_io, FetchError, SyncError};
use crate::fetcher::{validate_artifacts, ArtifactFetcher};
use crate::hasher;
use crate::manifest::ManifestStore;
use crate::publisher::{PublishRecord, Publisher};
use crate::staging::StagingArea;
use crate::store::ObjectStore;

/// Per-variant pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantState {
    Pending,
    Fetched,
    HashCompared,
    Published,
    Skipped,
    Failed,
}

impl std::fmt::Display for VariantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            VariantState::Pending => "pending",
            VariantState::Fetched => "fetched",
            VariantState::HashCompared => "hash-compared",
            VariantState::Published => "published",
            VariantState::Skipped => "skipped",
            VariantState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Terminal outcome of one variant.
#[derive(Debug)]
pub enum VariantOutcome {
    Published {
        hash: ContentHash,
        record: PublishRecord,
        entry: ManifestEntry,
    },
    Skipped {
        hash: ContentHash,
    },
    Failed {
        /// Last state reached before the failure.
        reached: VariantState,
        error: SyncError,
    },
}

impl VariantOutcome {
    pub fn state(&self) -> VariantState {
        match self {
            VariantOutcome::Published { .. } => VariantState::Published,
            VariantOutcome::Skipped { .. } => VariantState::Skipped,
            VariantOutcome::Failed { .. } => VariantState::Failed,
        }
    }

    pub fn hash(&self) -> Option<&ContentHash> {
        match self {
            VariantOutcome::Published { hash, .. } | VariantOutcome::Skipped { hash } => Some(hash),
            VariantOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct VariantReport {
    pub variant: VariantName,
    pub outcome: VariantOutcome,
    pub duration: Duration,
}

/// Summary of one run, in configuration order.
#[derive(Debug)]
pub struct SyncReport {
    pub version: ModelVersion,
    pub variants: Vec<VariantReport>,
}

impl SyncReport {
    /// True when no variant failed.
    pub fn is_success(&self) -> bool {
        self.failed().is_empty()
    }

    pub fn failed(&self) -> Vec<&VariantName> {
        self.with_state(VariantState::Failed)
    }

    pub fn published(&self) -> Vec<&VariantName> {
        self.with_state(VariantState::Published)
    }

    pub fn skipped(&self) -> Vec<&VariantName> {
        self.with_state(VariantState::Skipped)
    }

    pub fn get(&self, variant: &str) -> Option<&VariantReport> {
        self.variants.iter().find(|r| r.variant.0 == variant)
    }

    fn with_state(&self, state: VariantState) -> Vec<&VariantName> {
        self.variants
            .iter()
            .filter(|r| r.outcome.state() == state)
            .map(|r| &r.variant)
            .collect()
    }
}

/// Run-wide knobs, derived from [`SyncConfig`].
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub version: ModelVersion,
    pub staging_root: PathBuf,
    pub max_concurrent_variants: usize,
    pub max_concurrent_uploads: usize,
    pub fetch_timeout: Duration,
    pub upload_timeout: Duration,
}

impl RunSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            version: config.version.clone(),
            staging_root: config.staging_root.clone(),
            max_concurrent_variants: config.max_concurrent_variants,
            max_concurrent_uploads: config.max_concurrent_uploads,
            fetch_timeout: config.fetch_timeout,
            upload_timeout: config.upload_timeout,
        }
    }
}

pub struct SyncOrchestrator {
    settings: RunSettings,
    fetcher: Arc<dyn ArtifactFetcher>,
    manifest: ManifestStore,
    publisher: Publisher,
}

impl SyncOrchestrator {
    pub fn new(
        settings: RunSettings,
        fetcher: Arc<dyn ArtifactFetcher>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let manifest = ManifestStore::new(store.clone(), settings.upload_timeout);
        let publisher = Publisher::new(
            store,
            settings.max_concurrent_uploads,
            settings.upload_timeout,
        );
        Self {
            settings,
            fetcher,
            manifest,
            publisher,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Sync every variant and report each outcome.
    ///
    /// Dropping the returned future cancels in-flight variants; their staging
    /// directories are removed as they unwind.
    pub async fn run(&self, variants: &[Variant]) -> SyncReport {
        tracing::info!(
            version = %self.settings.version,
            variants = variants.len(),
            workers = self.settings.max_concurrent_variants,
            "sync run started",
        );
        let reports: Vec<VariantReport> = stream::iter(variants)
            .map(|variant| self.sync_variant(variant))
            .buffered(self.settings.max_concurrent_variants.max(1))
            .collect()
            .await;

        let report = SyncReport {
            version: self.settings.version.clone(),
            variants: reports,
        };
        tracing::info!(
            published = report.published().len(),
            skipped = report.skipped().len(),
            failed = report.failed().len(),
            "sync run finished",
        );
        report
    }

    /// Drive a single variant to a terminal state.
    pub async fn sync_variant(&self, variant: &Variant) -> VariantReport {
        let started = Instant::now();
        let mut reached = VariantState::Pending;
        let outcome = match self.drive(variant, &mut reached).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(
                    variant = %variant.name,
                    reached = %reached,
                    error = %error,
                    "variant sync failed",
                );
                VariantOutcome::Failed { reached, error }
            }
        };
        VariantReport {
            variant: variant.name.clone(),
            outcome,
            duration: started.elapsed(),
        }
    }

    async fn drive(
        &self,
        variant: &Variant,
        reached: &mut VariantState,
    ) -> Result<VariantOutcome, SyncError> {
        let version = &self.settings.version;
        let staging = StagingArea::acquire(&self.settings.staging_root, &version.0, &variant.name)?;

        // Pending -> Fetched
        let set = self.fetch(variant, &staging).await?;
        *reached = VariantState::Fetched;
        tracing::info!(
            variant = %variant.name,
            files = set.len(),
            bytes = set.total_bytes(),
            "fetched",
        );
        if set.is_empty() {
            tracing::warn!(variant = %variant.name, "source produced no files");
        }

        // Fetched -> HashCompared
        let hash = hasher::hash_blocking(set.clone()).await?;
        let stored = self
            .manifest
            .get(variant)
            .await
            .map_err(SyncError::ManifestRead)?;
        *reached = VariantState::HashCompared;
        tracing::info!(
            variant = %variant.name,
            hash = %hash.short(),
            stored = stored.as_ref().map(|h| h.short()).unwrap_or("none"),
            "hash compared",
        );

        if !should_publish(&hash, stored.as_ref()) {
            tracing::info!(variant = %variant.name, "unchanged, skipping publish");
            release(staging, &variant.name);
            return Ok(VariantOutcome::Skipped { hash });
        }

        // HashCompared -> Published; the manifest write waits for every upload.
        let record = self.publisher.publish(variant, &set, version).await?;
        let entry = ManifestEntry {
            variant: variant.name.clone(),
            hash: hash.clone(),
            version: version.clone(),
            published_at: Utc::now(),
        };
        self.manifest.put(variant, &entry).await?;
        release(staging, &variant.name);

        Ok(VariantOutcome::Published {
            hash,
            record,
            entry,
        })
    }

    /// Fetch plus any conversion, together bounded by the fetch timeout.
    async fn fetch(&self, variant: &Variant, staging: &StagingArea) -> Result<ArtifactSet, SyncError> {
        let timeout = self.settings.fetch_timeout;
        let deadline = Instant::now() + timeout;
        let set = time::timeout_at(deadline, self.fetcher.fetch(&variant.source, staging.path()))
            .await
            .map_err(|_| FetchError::Unreachable {
                locator: variant.source.to_string(),
                status: None,
                reason: format!("timed out after {timeout:?}"),
            })??;

        let Some(command) = variant.convert.as_deref() else {
            return Ok(set);
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        convert::run_converter(command, staging.path(), remaining).await?;
        let dir = staging.path().to_path_buf();
        let set = tokio::task::spawn_blocking(move || validate_artifacts(&dir))
            .await
            .map_err(|e| fetch_io(staging.path(), std::io::Error::other(e)))??;
        Ok(set)
    }
}

fn release(staging: StagingArea, variant: &VariantName) {
    if let Err(err) = staging.close() {
        tracing::warn!(variant = %variant, error = %err, "failed to remove staging directory");
    }
}
