//! # JSON Document Files
//!
//! A single JSON document on disk guarded by one async mutex. Every update is
//! a load -> mutate -> save critical section, and saves replace the file
//! atomically (temp file + rename) so a crash never leaves a torn document.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct JsonFile<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _doc: std::marker::PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _doc: std::marker::PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the default document if the file does not exist yet
    pub async fn ensure_exists(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        if tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?
        {
            return Ok(());
        }
        write_atomic(&self.path, &T::default()).await
    }

    pub async fn read(&self) -> Result<T, StorageError> {
        let _guard = self.lock.lock().await;
        load(&self.path).await
    }

    /// Runs `f` on the current document and persists the result, all under
    /// the file's lock.
    pub async fn update<R, F>(&self, f: F) -> Result<R, StorageError>
    where
        F: FnOnce(&mut T) -> R,
    {
        let _guard = self.lock.lock().await;
        let mut doc = load(&self.path).await?;
        let result = f(&mut doc);
        write_atomic(&self.path, &doc).await?;
        Ok(result)
    }

    /// Overwrites the document without reading it first
    pub async fn replace(&self, doc: &T) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        write_atomic(&self.path, doc).await
    }
}

/// Missing or empty files read as the default document; unparseable content
/// is an error and is left untouched on disk.
async fn load<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StorageError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(io_error(path, e)),
    };
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) async fn write_atomic<T: Serialize>(path: &Path, doc: &T) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(doc).map_err(|source| StorageError::Serialize {
        path: path.display().to_string(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| io_error(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}
