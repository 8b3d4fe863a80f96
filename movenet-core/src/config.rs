//! Run configuration.
//!
//! # Recognized settings
//!
//! ```text
//! ENV                      prod
//! AWS_REGION               ap-south-1
//! ACCOUNT_ID               (or AWS_ACCOUNT_ID; required unless MODEL_BUCKET is set)
//! MODEL_BUCKET             {ACCOUNT_ID}-{ENV}-movenet-models
//! MODEL_VERSION            current UTC date, YYYYMMDD
//! MODEL_PREFIX             models
//! MODEL_VARIANTS_FILE      built-in variants when unset
//! STAGING_ROOT             system temp dir
//! OBJECT_STORE_ROOT        S3 when unset
//! MAX_CONCURRENT_VARIANTS  2
//! MAX_CONCURRENT_UPLOADS   4
//! FETCH_TIMEOUT_SECS       300
//! UPLOAD_TIMEOUT_SECS      120
//! KAGGLE_USERNAME / KAGGLE_KEY
//! ```
//!
//! # API pattern
//!
//! - `from_lookup(f)`: explicit key lookup; used in tests
//! - `from_env()`: reads the process environment, delegates to `from_lookup`

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{invalid, ConfigError};
use crate::types::{Locator, ModelVersion, Variant, VariantName};

pub const DEFAULT_ENV: &str = "prod";
pub const DEFAULT_REGION: &str = "ap-south-1";
pub const DEFAULT_PREFIX: &str = "models";
pub const DEFAULT_KAGGLE_DATASET: &str = "google/movenet";
pub const DEFAULT_VARIANTS: [&str; 3] = [
    "singlepose-lightning",
    "singlepose-thunder",
    "multipose-lightning",
];

const DEFAULT_MAX_CONCURRENT_VARIANTS: usize = 2;
const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 4;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 120;

/// Kaggle API credentials. `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct KaggleCredentials {
    pub username: String,
    pub key: String,
}

impl fmt::Debug for KaggleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KaggleCredentials")
            .field("username", &self.username)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Everything one run needs, resolved and validated up front.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub env: String,
    pub region: String,
    pub account_id: Option<String>,
    pub bucket: String,
    pub version: ModelVersion,
    pub prefix: String,
    pub staging_root: PathBuf,
    pub object_store_root: Option<PathBuf>,
    pub max_concurrent_variants: usize,
    pub max_concurrent_uploads: usize,
    pub fetch_timeout: Duration,
    pub upload_timeout: Duration,
    pub kaggle: Option<KaggleCredentials>,
    pub variants: Vec<Variant>,
}

impl SyncConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let env = get("ENV").unwrap_or_else(|| DEFAULT_ENV.to_string());
        let region = get("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let account_id = get("ACCOUNT_ID").or_else(|| get("AWS_ACCOUNT_ID"));

        let bucket = match (get("MODEL_BUCKET"), account_id.as_deref()) {
            (Some(bucket), _) => bucket,
            (None, Some(account)) => bucket_name(account, &env),
            (None, None) => return Err(ConfigError::Missing { name: "ACCOUNT_ID" }),
        };
        validate_bucket(&bucket)?;

        let version = match get("MODEL_VERSION") {
            Some(v) => {
                validate_segment("MODEL_VERSION", &v)?;
                ModelVersion(v)
            }
            None => ModelVersion::today_utc(),
        };

        let prefix = normalize_prefix(
            "MODEL_PREFIX",
            &get("MODEL_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
        )?;

        let staging_root = get("STAGING_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        let object_store_root = get("OBJECT_STORE_ROOT").map(PathBuf::from);

        let max_concurrent_variants = parse_limit(
            "MAX_CONCURRENT_VARIANTS",
            get("MAX_CONCURRENT_VARIANTS"),
            DEFAULT_MAX_CONCURRENT_VARIANTS,
        )?;
        let max_concurrent_uploads = parse_limit(
            "MAX_CONCURRENT_UPLOADS",
            get("MAX_CONCURRENT_UPLOADS"),
            DEFAULT_MAX_CONCURRENT_UPLOADS,
        )?;
        let fetch_timeout = Duration::from_secs(parse_limit(
            "FETCH_TIMEOUT_SECS",
            get("FETCH_TIMEOUT_SECS"),
            DEFAULT_FETCH_TIMEOUT_SECS,
        )?);
        let upload_timeout = Duration::from_secs(parse_limit(
            "UPLOAD_TIMEOUT_SECS",
            get("UPLOAD_TIMEOUT_SECS"),
            DEFAULT_UPLOAD_TIMEOUT_SECS,
        )?);

        let kaggle = match (get("KAGGLE_USERNAME"), get("KAGGLE_KEY")) {
            (Some(username), Some(key)) => Some(KaggleCredentials { username, key }),
            _ => None,
        };

        let variants = match get("MODEL_VARIANTS_FILE") {
            Some(path) => load_variants_file(Path::new(&path), &prefix)?,
            None => default_variants(&prefix),
        };
        validate_variants(&variants)?;
        validate_layout(&variants, &version)?;

        if kaggle.is_none() && variants.iter().any(|v| v.source.needs_kaggle_credentials()) {
            return Err(ConfigError::Missing {
                name: "KAGGLE_USERNAME/KAGGLE_KEY",
            });
        }

        Ok(Self {
            env,
            region,
            account_id,
            bucket,
            version,
            prefix,
            staging_root,
            object_store_root,
            max_concurrent_variants,
            max_concurrent_uploads,
            fetch_timeout,
            upload_timeout,
            kaggle,
            variants,
        })
    }
}

/// `{account_id}-{env}-movenet-models`
pub fn bucket_name(account_id: &str, env: &str) -> String {
    format!("{account_id}-{env}-movenet-models")
}

/// The three MoveNet variants, all sourced from the public Kaggle dataset.
pub fn default_variants(prefix: &str) -> Vec<Variant> {
    DEFAULT_VARIANTS
        .iter()
        .map(|name| Variant {
            name: VariantName::from(*name),
            source: Locator::KaggleDataset {
                dataset: DEFAULT_KAGGLE_DATASET.to_string(),
            },
            destination_prefix: prefix.to_string(),
            convert: None,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct VariantsFile {
    variants: Vec<VariantSpec>,
}

#[derive(Debug, Deserialize)]
struct VariantSpec {
    name: String,
    source: Locator,
    #[serde(default)]
    destination_prefix: Option<String>,
    #[serde(default)]
    convert: Option<Vec<String>>,
}

/// Load variants from a YAML file. Entries without a `destination_prefix`
/// inherit `default_prefix`.
pub fn load_variants_file(path: &Path, default_prefix: &str) -> Result<Vec<Variant>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: VariantsFile =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    file.variants
        .into_iter()
        .map(|spec| {
            let destination_prefix = match spec.destination_prefix {
                Some(p) => normalize_prefix("destination_prefix", &p)?,
                None => default_prefix.to_string(),
            };
            Ok(Variant {
                name: VariantName(spec.name.trim().to_string()),
                source: spec.source,
                destination_prefix,
                convert: spec.convert.filter(|cmd| !cmd.is_empty()),
            })
        })
        .collect()
}

fn validate_variants(variants: &[Variant]) -> Result<(), ConfigError> {
    if variants.is_empty() {
        return Err(invalid("variants", "[]", "at least one variant is required"));
    }
    let mut seen = HashSet::new();
    for variant in variants {
        validate_segment("variant name", &variant.name.0)?;
        if !seen.insert(variant.name.0.as_str()) {
            return Err(invalid(
                "variant name",
                variant.name.0.as_str(),
                "duplicate variant name",
            ));
        }
        validate_locator(&variant.name, &variant.source)?;
    }
    Ok(())
}

/// Every variant owns `{prefix}/{name}/` and `{prefix}/{version}/{name}/`;
/// no other variant's destination may sit inside either.
fn validate_layout(variants: &[Variant], version: &ModelVersion) -> Result<(), ConfigError> {
    if let Some(clash) = variants.iter().find(|v| v.name.0 == version.0) {
        return Err(invalid(
            "MODEL_VERSION",
            &version.0,
            format!("collides with variant name '{}'", clash.name),
        ));
    }
    for owner in variants {
        let owned = [
            format!("{}/", owner.stable_prefix()),
            format!("{}/", owner.versioned_prefix(version)),
        ];
        for other in variants.iter().filter(|v| v.name.0 != owner.name.0) {
            let nested = format!("{}/", other.destination_prefix);
            if let Some(space) = owned.iter().find(|space| nested.starts_with(space.as_str())) {
                return Err(invalid(
                    format!("{}.destination_prefix", other.name),
                    &other.destination_prefix,
                    format!("lies inside '{space}', owned by variant '{}'", owner.name),
                ));
            }
        }
    }
    Ok(())
}

fn validate_locator(name: &VariantName, locator: &Locator) -> Result<(), ConfigError> {
    let field = format!("{name}.source");
    match locator {
        Locator::Url { url, file_name } => {
            if let Some(file_name) = file_name {
                validate_segment(&format!("{field}.file_name"), file_name)?;
            }
            validate_url(&field, url)
        }
        Locator::Bundle { url, .. } => validate_url(&field, url),
        Locator::MultiUrl { files } => {
            if files.is_empty() {
                return Err(invalid(field, "[]", "multi_url needs at least one file"));
            }
            let mut names = HashSet::new();
            for entry in files {
                validate_segment(&field, &entry.name)?;
                if let Some(file_name) = &entry.file_name {
                    validate_segment(&format!("{field}.file_name"), file_name)?;
                }
                if !names.insert(entry.name.as_str()) {
                    return Err(invalid(field, entry.name.as_str(), "duplicate entry name"));
                }
                validate_url(&field, &entry.url)?;
            }
            Ok(())
        }
        Locator::KaggleDataset { dataset } => {
            let parts: Vec<&str> = dataset.split('/').collect();
            if parts.len() != 2 || parts.iter().any(|p| p.trim().is_empty()) {
                return Err(invalid(field, dataset.as_str(), "expected owner/dataset"));
            }
            Ok(())
        }
    }
}

fn validate_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(invalid(field, url, "expected an http(s) URL"))
    }
}

/// A single key segment: non-empty, no `/`, no `..`.
fn validate_segment(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || value.contains('/') || value.contains('\\') || value == "." || value == ".."
    {
        return Err(invalid(name, value, "must be a single non-empty path segment"));
    }
    Ok(())
}

fn normalize_prefix(name: &str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(invalid(name, value, "destination prefix resolves to an empty key"));
    }
    if trimmed.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(invalid(name, value, "destination prefix has an empty or relative segment"));
    }
    Ok(trimmed.to_string())
}

fn validate_bucket(bucket: &str) -> Result<(), ConfigError> {
    let valid_chars = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let edges_ok = bucket
        .chars()
        .next()
        .zip(bucket.chars().last())
        .map(|(a, b)| a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric())
        .unwrap_or(false);
    if (3..=63).contains(&bucket.len()) && valid_chars && edges_ok {
        Ok(())
    } else {
        Err(invalid(
            "MODEL_BUCKET",
            bucket,
            "bucket names are 3-63 lowercase letters, digits, '-' or '.'",
        ))
    }
}

fn parse_limit<T>(name: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    let Some(raw) = value else {
        return Ok(default);
    };
    let parsed: T = raw
        .parse()
        .map_err(|_| invalid(name, raw.as_str(), "expected a positive integer"))?;
    if parsed < T::from(1) {
        return Err(invalid(name, raw, "must be at least 1"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_trimmed_of_slashes() {
        assert_eq!(normalize_prefix("p", "/models/").unwrap(), "models");
        assert_eq!(normalize_prefix("p", "a/b").unwrap(), "a/b");
        assert!(normalize_prefix("p", "//").is_err());
        assert!(normalize_prefix("p", "a//b").is_err());
        assert!(normalize_prefix("p", "a/../b").is_err());
    }

    #[test]
    fn bucket_rules() {
        assert!(validate_bucket("123456789012-prod-movenet-models").is_ok());
        assert!(validate_bucket("Upper-case").is_err());
        assert!(validate_bucket("-leading").is_err());
        assert!(validate_bucket("ab").is_err());
    }

    #[test]
    fn kaggle_credentials_debug_is_redacted() {
        let creds = KaggleCredentials {
            username: "someone".to_string(),
            key: "s3cr3t".to_string(),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("someone"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn limit_parsing() {
        assert_eq!(parse_limit::<usize>("X", None, 2).unwrap(), 2);
        assert_eq!(parse_limit::<usize>("X", Some("8".into()), 2).unwrap(), 8);
        assert!(parse_limit::<usize>("X", Some("0".into()), 2).is_err());
        assert!(parse_limit::<u64>("X", Some("ten".into()), 2).is_err());
    }
}
