//! Device-local persistence of the serialized session.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use futures::future::BoxFuture;
use thiserror::Error;

/// Failure raised by a [`LocalStore`].
#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("failed to read local session from `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write local session to `{path}`")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Key-value slot holding the one serialized session of this device.
pub trait LocalStore: Send + Sync {
    /// Raw stored session, `None` when nothing was saved yet.
    fn load(&self) -> BoxFuture<'static, Result<Option<String>, LocalStoreError>>;
    fn save(&self, raw: String) -> BoxFuture<'static, Result<(), LocalStoreError>>;
}

/// Session slot backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileLocalStore {
    path: Arc<Path>,
}

impl FileLocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::from(path.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.as_os_str().to_owned();
        temp.push(".tmp");
        PathBuf::from(temp)
    }
}

impl LocalStore for FileLocalStore {
    fn load(&self) -> BoxFuture<'static, Result<Option<String>, LocalStoreError>> {
        let path = self.path.clone();
        Box::pin(async move {
            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => Ok(Some(raw)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(source) => Err(LocalStoreError::Read {
                    path: path.to_path_buf(),
                    source,
                }),
            }
        })
    }

    fn save(&self, raw: String) -> BoxFuture<'static, Result<(), LocalStoreError>> {
        let path = self.path.clone();
        let temp = self.temp_path();
        Box::pin(async move {
            let write_err = |source| LocalStoreError::Write {
                path: path.to_path_buf(),
                source,
            };
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
                }
            }
            tokio::fs::write(&temp, raw).await.map_err(write_err)?;
            // Rename so a crash mid-write never leaves a truncated session.
            tokio::fs::rename(&temp, &path).await.map_err(write_err)
        })
    }
}

/// Session slot held in memory, for tests and ephemeral devices.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocalStore {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the slot with a raw session.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(raw.into()))),
        }
    }

    /// Current raw contents of the slot.
    pub fn raw(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace(&self, value: String) {
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(value);
    }
}

impl LocalStore for MemoryLocalStore {
    fn load(&self) -> BoxFuture<'static, Result<Option<String>, LocalStoreError>> {
        let raw = self.raw();
        Box::pin(async move { Ok(raw) })
    }

    fn save(&self, raw: String) -> BoxFuture<'static, Result<(), LocalStoreError>> {
        self.replace(raw);
        Box::pin(async { Ok(()) })
    }
}
