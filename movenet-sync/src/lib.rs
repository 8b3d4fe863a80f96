//! # movenet-sync
//!
//! Hash-gated model artifact sync: fetch each variant into a scoped staging
//! directory, hash it, compare with the published manifest, and publish to
//! versioned + stable object-store prefixes when the content changed.
//!
//! Build a [`SyncOrchestrator`] and call [`SyncOrchestrator::run`] with the
//! configured variants.

pub mod artifact;
pub mod bundle;
pub mod change;
pub mod convert;
pub mod error;
pub mod fetcher;
pub mod hasher;
pub mod manifest;
pub mod pipeline;
pub mod publisher;
pub mod staging;
pub mod store;

pub use artifact::{ArtifactFile, ArtifactSet};
pub use error::{FetchError, HashError, PublishError, StoreError, SyncError};
pub use fetcher::{ArtifactFetcher, HttpFetcher};
pub use pipeline::{
    RunSettings, SyncOrchestrator, SyncReport, VariantOutcome, VariantReport, VariantState,
};
pub use publisher::{PublishRecord, Publisher};
pub use store::ObjectStore;
