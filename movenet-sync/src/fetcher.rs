//! Artifact retrieval.
//!
//! [`ArtifactFetcher`] is the seam the orchestrator depends on; [`HttpFetcher`]
//! is the production implementation covering every [`Locator`] strategy.
//! Whatever the strategy, the fetch ends by discovering the files under the
//! destination directory and rejecting any that turn out to be an HTML/XML
//! page instead of a binary artifact.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};
use std::time::Duration;

use async_trait::async_trait;

use movenet_core::{BundleFormat, KaggleCredentials, Locator};

use crate::artifact::ArtifactSet;
use crate::bundle;
use crate::error::{fetch_io, FetchError};

pub const DEFAULT_KAGGLE_API: &str = "https://www.kaggle.com/api/v1";
const MAX_REDIRECTS: usize = 10;
const SNIFF_LEN: usize = 512;
const FALLBACK_FILE_NAME: &str = "model.bin";

/// Retrieves the artifact set for one locator into `dest`.
///
/// Implementations must only touch `dest`.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, locator: &Locator, dest: &Path) -> Result<ArtifactSet, FetchError>;
}

/// HTTP(S) fetcher for direct URLs, multi-URL sets, bundles, and Kaggle
/// datasets.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    kaggle: Option<KaggleCredentials>,
    kaggle_api: String,
}

impl HttpFetcher {
    /// `request_timeout` bounds each HTTP request individually.
    pub fn new(
        request_timeout: Duration,
        kaggle: Option<KaggleCredentials>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(request_timeout)
            .user_agent(concat!("movenet-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Unreachable {
                locator: "http client".to_string(),
                status: None,
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            kaggle,
            kaggle_api: DEFAULT_KAGGLE_API.to_string(),
        })
    }

    /// Point Kaggle dataset downloads at a different API base.
    pub fn with_kaggle_api(mut self, base: impl Into<String>) -> Self {
        self.kaggle_api = base.into().trim_end_matches('/').to_string();
        self
    }

    async fn download(
        &self,
        locator: &Locator,
        url: &str,
        basic_auth: Option<&KaggleCredentials>,
    ) -> Result<Vec<u8>, FetchError> {
        let unreachable = |status: Option<u16>, reason: String| FetchError::Unreachable {
            locator: locator.to_string(),
            status,
            reason,
        };

        let mut request = self.client.get(url);
        if let Some(creds) = basic_auth {
            request = request.basic_auth(&creds.username, Some(&creds.key));
        }
        let response = request
            .send()
            .await
            .map_err(|e| unreachable(e.status().map(|s| s.as_u16()), describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unreachable(
                Some(status.as_u16()),
                format!("GET {url} returned {status}"),
            ));
        }
        let final_url = response.url().to_string();
        if final_url != url {
            tracing::debug!(from = url, to = %final_url, "followed redirect");
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| unreachable(Some(status.as_u16()), describe(&e)))?;
        Ok(bytes.to_vec())
    }

    async fn download_to(
        &self,
        locator: &Locator,
        url: &str,
        target: &Path,
    ) -> Result<(), FetchError> {
        let bytes = self.download(locator, url, None).await?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| fetch_io(parent, e))?;
        }
        tokio::fs::write(target, &bytes)
            .await
            .map_err(|e| fetch_io(target, e))?;
        tracing::debug!(path = %target.display(), bytes = bytes.len(), "downloaded");
        Ok(())
    }

    async fn download_bundle(
        &self,
        locator: &Locator,
        url: &str,
        format: BundleFormat,
        basic_auth: Option<&KaggleCredentials>,
        dest: &Path,
    ) -> Result<(), FetchError> {
        let bytes = self.download(locator, url, basic_auth).await?;
        if looks_like_markup(&bytes) {
            return Err(FetchError::InvalidPayload {
                path: dest.to_path_buf(),
                reason: format!("{url} returned an HTML/XML page instead of a {format} bundle"),
            });
        }
        let dest_owned = dest.to_path_buf();
        let count = tokio::task::spawn_blocking(move || bundle::extract(format, &bytes, &dest_owned))
            .await
            .map_err(|e| fetch_io(dest, std::io::Error::other(e)))??;
        tracing::debug!(url, entries = count, "bundle extracted");
        Ok(())
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, locator: &Locator, dest: &Path) -> Result<ArtifactSet, FetchError> {
        match locator {
            Locator::Url { url, file_name } => {
                let name = file_name.clone().unwrap_or_else(|| url_file_name(url));
                let target = dest.join(single_segment(dest, &name)?);
                self.download_to(locator, url, &target).await?;
            }
            Locator::MultiUrl { files } => {
                for entry in files {
                    let name = entry
                        .file_name
                        .clone()
                        .unwrap_or_else(|| url_file_name(&entry.url));
                    let target = dest
                        .join(single_segment(dest, &entry.name)?)
                        .join(single_segment(dest, &name)?);
                    self.download_to(locator, &entry.url, &target).await?;
                }
            }
            Locator::Bundle { url, format } => {
                let format = format.unwrap_or_else(|| BundleFormat::infer(url));
                self.download_bundle(locator, url, format, None, dest).await?;
            }
            Locator::KaggleDataset { dataset } => {
                let creds = self.kaggle.as_ref().ok_or_else(|| FetchError::Unreachable {
                    locator: locator.to_string(),
                    status: None,
                    reason: "no Kaggle credentials configured".to_string(),
                })?;
                let url = format!("{}/datasets/download/{dataset}", self.kaggle_api);
                self.download_bundle(locator, &url, BundleFormat::Zip, Some(creds), dest)
                    .await?;
            }
        }
        let dest_owned = dest.to_path_buf();
        tokio::task::spawn_blocking(move || validate_artifacts(&dest_owned))
            .await
            .map_err(|e| fetch_io(dest, std::io::Error::other(e)))?
    }
}

/// Discover the files under `dest` and reject any error pages among them.
pub fn validate_artifacts(dest: &Path) -> Result<ArtifactSet, FetchError> {
    let set = ArtifactSet::discover(dest).map_err(|e| fetch_io(dest, e))?;
    for file in set.files() {
        let head = read_head(&file.path).map_err(|e| fetch_io(&file.path, e))?;
        if looks_like_markup(&head) {
            return Err(FetchError::InvalidPayload {
                path: file.path.clone(),
                reason: "file starts with HTML/XML markup; the source returned an error page"
                    .to_string(),
            });
        }
    }
    Ok(set)
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    Ok(head)
}

/// True when the leading bytes look like an HTML or XML document.
pub fn looks_like_markup(head: &[u8]) -> bool {
    const MARKERS: [&[u8]; 7] = [
        b"<!doctype",
        b"<html",
        b"<?xml",
        b"<head",
        b"<body",
        b"<!--",
        b"<error",
    ];
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    let rest = &head[start..];
    MARKERS.iter().any(|marker| {
        rest.len() >= marker.len() && rest[..marker.len()].eq_ignore_ascii_case(marker)
    })
}

/// `name` as a path that cannot leave the directory it is joined onto.
fn single_segment<'a>(dest: &Path, name: &'a str) -> Result<&'a Path, FetchError> {
    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(path),
        _ => Err(FetchError::InvalidPayload {
            path: dest.to_path_buf(),
            reason: format!("file name '{name}' is not a single path segment"),
        }),
    }
}

/// Last non-empty path segment of `url`, without query or fragment.
pub fn url_file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    path.split('/')
        .skip(1)
        .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_redirect() {
        format!("too many redirects (limit {MAX_REDIRECTS}): {err}")
    } else if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
