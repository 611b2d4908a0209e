//! Key providers
//!
//! The engine asks its provider for the key exactly once, at construction.

use anyhow::{Context, Result};
use shadow_shared::CommandKey;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Supplies the process-wide command key
pub trait KeyProvider: Send + Sync {
    fn load(&self) -> Result<CommandKey>;
}

/// Key persisted as URL-safe base64 on disk, generated on first use
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create(&self) -> Result<CommandKey> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create key directory {}", parent.display()))?;
        }

        let key = CommandKey::generate();
        write_private(&self.path, key.encode().as_bytes())
            .with_context(|| format!("Failed to write key to {}", self.path.display()))?;

        info!("[KEY] Generated new command key at {}", self.path.display());
        Ok(key)
    }
}

impl KeyProvider for FileKeyStore {
    fn load(&self) -> Result<CommandKey> {
        if !self.path.exists() {
            return self.create();
        }

        let encoded = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read key from {}", self.path.display()))?;
        CommandKey::from_encoded(&encoded)
            .with_context(|| format!("Invalid key in {}", self.path.display()))
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(contents)
}

/// In-memory key
#[derive(Debug, Clone)]
pub struct StaticKey(pub CommandKey);

impl KeyProvider for StaticKey {
    fn load(&self) -> Result<CommandKey> {
        Ok(self.0.clone())
    }
}
