//! Domain types for the model sync pipeline.
//!
//! All types are serializable/deserializable via serde + serde_yaml so the
//! variant list can be supplied as a YAML file.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File name of the manifest object stored under each variant's stable prefix.
pub const MANIFEST_FILE: &str = "model_hash.txt";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for one independently synced model variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantName(pub String);

impl fmt::Display for VariantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for VariantName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VariantName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Version stamp shared by every variant published in one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelVersion(pub String);

impl ModelVersion {
    /// Current UTC date as `YYYYMMDD`.
    pub fn today_utc() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format("%Y%m%d").to_string())
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ModelVersion {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Hex-encoded SHA-256 digest over an artifact set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse manifest object text. Surrounding whitespace is ignored; an empty
    /// body is treated as no hash at all.
    pub fn parse_stored(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_ascii_lowercase()))
        }
    }

    /// Short prefix for log lines and tables.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ContentHash {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ContentHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Locator
// ---------------------------------------------------------------------------

/// Archive format of a compressed bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleFormat {
    Zip,
    TarGz,
}

impl BundleFormat {
    /// Guess the format from a URL suffix, ignoring any query string.
    /// Falls back to zip.
    pub fn infer(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            BundleFormat::TarGz
        } else {
            BundleFormat::Zip
        }
    }
}

impl fmt::Display for BundleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleFormat::Zip => write!(f, "zip"),
            BundleFormat::TarGz => write!(f, "tar.gz"),
        }
    }
}

/// One entry of a multi-URL locator. The file lands in `<dest>/<name>/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUrl {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Where a variant's artifact bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// A single direct download.
    Url {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
    /// Several downloads, each in its own subdirectory.
    MultiUrl { files: Vec<NamedUrl> },
    /// A compressed archive extracted into the staging directory.
    Bundle {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<BundleFormat>,
    },
    /// A Kaggle dataset (`owner/slug`), downloaded as a zip bundle.
    KaggleDataset { dataset: String },
}

impl Locator {
    pub fn needs_kaggle_credentials(&self) -> bool {
        matches!(self, Locator::KaggleDataset { .. })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Url { url, .. } => write!(f, "url {url}"),
            Locator::MultiUrl { files } => {
                let names: Vec<&str> = files.iter().map(|n| n.name.as_str()).collect();
                write!(f, "multi_url [{}]", names.join(", "))
            }
            Locator::Bundle { url, format } => {
                let format = format.unwrap_or_else(|| BundleFormat::infer(url));
                write!(f, "bundle ({format}) {url}")
            }
            Locator::KaggleDataset { dataset } => write!(f, "kaggle dataset {dataset}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// One independently synced model, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub name: VariantName,
    pub source: Locator,
    pub destination_prefix: String,
    /// External conversion command run between fetch and hash. `{dir}` is
    /// replaced with the staging directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<Vec<String>>,
}

impl Variant {
    /// `{prefix}/{version}/{variant}`
    pub fn versioned_prefix(&self, version: &ModelVersion) -> String {
        format!("{}/{}/{}", self.destination_prefix, version, self.name)
    }

    /// `{prefix}/{variant}`: the stable alias.
    pub fn stable_prefix(&self) -> String {
        format!("{}/{}", self.destination_prefix, self.name)
    }

    /// `{prefix}/{variant}/model_hash.txt`
    pub fn manifest_key(&self) -> String {
        format!("{}/{}", self.stable_prefix(), MANIFEST_FILE)
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Last published state of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub variant: VariantName,
    pub hash: ContentHash,
    pub version: ModelVersion,
    pub published_at: DateTime<Utc>,
}
