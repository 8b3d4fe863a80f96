//! Compressed bundle extraction (zip, tar.gz).
//!
//! Runs synchronously; callers move it onto the blocking pool.

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::Path;

use flate2::read::GzDecoder;

use movenet_core::BundleFormat;

use crate::error::{fetch_io, FetchError};

/// Extract `bytes` into `dest`. Entries that would land outside `dest` fail
/// the whole bundle.
pub fn extract(format: BundleFormat, bytes: &[u8], dest: &Path) -> Result<usize, FetchError> {
    match format {
        BundleFormat::Zip => extract_zip(bytes, dest),
        BundleFormat::TarGz => extract_tar_gz(bytes, dest),
    }
}

fn invalid(dest: &Path, reason: impl Into<String>) -> FetchError {
    FetchError::InvalidPayload {
        path: dest.to_path_buf(),
        reason: reason.into(),
    }
}

fn extract_zip(bytes: &[u8], dest: &Path) -> Result<usize, FetchError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| invalid(dest, format!("not a zip archive: {e}")))?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| invalid(dest, format!("corrupt zip entry {i}: {e}")))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(invalid(
                dest,
                format!("zip entry {:?} escapes the staging directory", entry.name()),
            ));
        };
        let out = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out).map_err(|e| fetch_io(&out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| fetch_io(parent, e))?;
        }
        let mut file = File::create(&out).map_err(|e| fetch_io(&out, e))?;
        io::copy(&mut entry, &mut file).map_err(|e| fetch_io(&out, e))?;
        extracted += 1;
    }
    Ok(extracted)
}

fn extract_tar_gz(bytes: &[u8], dest: &Path) -> Result<usize, FetchError> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|e| invalid(dest, format!("not a tar.gz archive: {e}")))?;

    let mut extracted = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| invalid(dest, format!("corrupt tar entry: {e}")))?;
        let is_file = entry.header().entry_type().is_file();
        let name = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let inside = entry
            .unpack_in(dest)
            .map_err(|e| invalid(dest, format!("failed to unpack {name:?}: {e}")))?;
        if !inside {
            return Err(invalid(
                dest,
                format!("tar entry {name:?} escapes the staging directory"),
            ));
        }
        if is_file {
            extracted += 1;
        }
    }
    Ok(extracted)
}
