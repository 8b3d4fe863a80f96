//! Filesystem object store: `<root>/<key>`.
//!
//! Writes go to `<path>.movenet.tmp` and are renamed into place, so a reader
//! never observes a half-written object.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::error::{store_io, StoreError};
use crate::store::ObjectStore;

const TMP_SUFFIX: &str = ".movenet.tmp";

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(StoreError::Backend {
                    key: key.to_string(),
                    message: "key has an empty or relative segment".to_string(),
                });
            }
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_io(path, e)),
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store_io(parent, e))?;
        }
        let tmp = PathBuf::from(format!("{}{TMP_SUFFIX}", path.display()));
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| store_io(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(store_io(path, e));
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || list_blocking(&root, &prefix))
            .await
            .map_err(|e| store_io(&self.root, std::io::Error::other(e)))?
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_io(path, e)),
        }
    }
}

fn list_blocking(root: &Path, prefix: &str) -> Result<Vec<String>, StoreError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut keys = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| store_io(root, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if key.ends_with(TMP_SUFFIX) || !key.starts_with(prefix) {
            continue;
        }
        keys.push(key);
    }
    keys.sort();
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_get_list_delete() {
        let tmp = TempDir::new().unwrap();
        let store = FsObjectStore::new(tmp.path());

        assert_eq!(store.get("models/a/model_hash.txt").await.unwrap(), None);
        store.put("models/a/model.tflite", b"m".to_vec()).await.unwrap();
        store.put("models/a/model_hash.txt", b"h".to_vec()).await.unwrap();
        store.put("models/b/model.tflite", b"x".to_vec()).await.unwrap();

        assert_eq!(
            store.get("models/a/model.tflite").await.unwrap(),
            Some(b"m".to_vec())
        );
        assert_eq!(
            store.list("models/a/").await.unwrap(),
            ["models/a/model.tflite", "models/a/model_hash.txt"]
        );

        store.delete("models/a/model.tflite").await.unwrap();
        store.delete("models/a/model.tflite").await.unwrap();
        assert_eq!(store.list("models/a/").await.unwrap(), ["models/a/model_hash.txt"]);
    }

    #[tokio::test]
    async fn overwrite_replaces_content_and_leaves_no_tmp() {
        let tmp = TempDir::new().unwrap();
        let store = FsObjectStore::new(tmp.path());
        store.put("k/v.bin", b"one".to_vec()).await.unwrap();
        store.put("k/v.bin", b"two".to_vec()).await.unwrap();
        assert_eq!(store.get("k/v.bin").await.unwrap(), Some(b"two".to_vec()));
        assert!(!tmp.path().join("k").join("v.bin.movenet.tmp").exists());
    }

    #[tokio::test]
    async fn relative_segments_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = FsObjectStore::new(tmp.path());
        let err = store.put("models/../escape", b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
    }

    #[tokio::test]
    async fn list_on_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FsObjectStore::new(tmp.path().join("nope"));
        assert!(store.list("").await.unwrap().is_empty());
    }
}
