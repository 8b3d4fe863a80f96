//! Content hashing over an artifact set.
//!
//! Every file's bytes are streamed, in sorted relative-path order, through one
//! SHA-256 accumulator. Paths themselves are not part of the digest, so a
//! rename without a content change hashes the same.

use std::fs::File;
use std::io::{BufReader, Read};

use sha2::{Digest, Sha256};

use movenet_core::ContentHash;

use crate::artifact::ArtifactSet;
use crate::error::HashError;

/// SHA-256 of the empty byte sequence: the hash of a set with no files.
pub const EMPTY_HASH: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const CHUNK: usize = 8192;

/// Hash every file in `set`.
pub fn hash(set: &ArtifactSet) -> Result<ContentHash, HashError> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    for file in set.files() {
        let io_failure = |source| HashError::IoFailure {
            path: file.path.clone(),
            source,
        };
        let mut reader = BufReader::new(File::open(&file.path).map_err(io_failure)?);
        loop {
            let n = reader.read(&mut buf).map_err(io_failure)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }
    Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// [`hash`] on the blocking pool.
pub async fn hash_blocking(set: ArtifactSet) -> Result<ContentHash, HashError> {
    let root = set.root().to_path_buf();
    tokio::task::spawn_blocking(move || hash(&set))
        .await
        .map_err(|e| HashError::IoFailure {
            path: root,
            source: std::io::Error::other(e),
        })?
}
