use std::{io::ErrorKind, path::{Path, PathBuf}};

use async_trait::async_trait;

use crate::TrackerError;

use super::KeyValueStore;

/**
 * FileStore keeps each key in its own file under one directory.
 * Writes go to a temporary file that is renamed over the old value, so a
 * crash mid-write leaves the previous value intact.
 */
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let dir = dir.as_ref().to_path_buf();

        // Create dir if it doesn't exist
        if !dir.exists() {
            tokio::fs::create_dir_all(&dir).await
                .map_err(|err| TrackerError::Storage(format!("Failed to create store directory {:?}: {err}", dir)))?;
        }

        Ok(FileStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, TrackerError> {
        let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(TrackerError::Storage(format!("Illegal key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, TrackerError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TrackerError::Storage(format!("Failed to read {:?}: {err}", path))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), TrackerError> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, value).await
            .map_err(|err| TrackerError::Storage(format!("Failed to write {:?}: {err}", tmp_path)))?;
        tokio::fs::rename(&tmp_path, &path).await
            .map_err(|err| TrackerError::Storage(format!("Failed to replace {:?}: {err}", path)))
    }

    async fn remove(&self, key: &str) -> Result<(), TrackerError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(TrackerError::Storage(format!("Failed to remove {:?}: {err}", path))),
        }
    }
}
