//! MoveNet model sync core library: domain types, configuration, errors.
//!
//! - [`types`]: newtypes, [`Variant`], [`Locator`], object key layout
//! - [`config`]: [`SyncConfig`] built from the environment
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{KaggleCredentials, SyncConfig};
pub use error::ConfigError;
pub use types::{
    BundleFormat, ContentHash, Locator, ManifestEntry, ModelVersion, NamedUrl, Variant,
    VariantName, MANIFEST_FILE,
};
