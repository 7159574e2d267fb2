//! Object storage for uploaded image bytes.
//!
//! Keys are relative, `/`-separated paths such as `user_3/uploads/beach.jpg`.

use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::config::StorageConfig;
use crate::models::UserId;

pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove the object. A missing object is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// Public URL for the object.
    fn url(&self, key: &str) -> String;
}

/// Stores objects as files under a root directory.
pub struct FsObjectStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.root, config.public_base_url.clone())
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty() {
            bail!("Empty object key");
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => bail!("Invalid object key: {}", key),
            }
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write object {}", path.display()))?;
        tracing::debug!(key = %key, size = bytes.len(), "Stored object");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow!(e).context(format!("Failed to delete object {}", path.display()))),
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.resolve(key)?.is_file())
    }

    fn url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base, key),
            None => format!("file://{}", self.root.join(key).display()),
        }
    }
}

/// Keep only the final path component of an uploaded file name.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

/// `user_<id>/uploads/<filename>`.
pub fn upload_key(user_id: UserId, filename: &str) -> String {
    format!("user_{}/uploads/{}", user_id, filename)
}

/// An upload key for which `is_taken` is false. Clashes get a numeric
/// suffix before the extension: `beach.jpg`, `beach_1.jpg`, `beach_2.jpg`.
pub fn unique_upload_key<F>(user_id: UserId, filename: &str, mut is_taken: F) -> Result<String>
where
    F: FnMut(&str) -> Result<bool>,
{
    let key = upload_key(user_id, filename);
    if !is_taken(&key)? {
        return Ok(key);
    }

    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());
    let extension = path
        .extension()
        .map(|s| format!(".{}", s.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1u32;
    loop {
        let candidate = upload_key(user_id, &format!("{}_{}{}", stem, n, extension));
        if !is_taken(&candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}
