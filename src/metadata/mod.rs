//! Metadata store
//!
//! Holds admin edited subnet names and symbols plus validator identities.
//! Refreshes read one [`MetadataSnapshot`] up front, so a write that lands
//! mid-refresh is picked up by the next refresh instead of the current one.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::errors::{ApyResult, MetadataStoreError, ValidationError};
use crate::types::{MetadataSnapshot, NetUid, SubnetOverride, ValidatorIdentity};

/// Read/write access to display metadata
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_override(&self, netuid: NetUid) -> ApyResult<Option<SubnetOverride>>;

    async fn set_override(&self, netuid: NetUid, name: &str, symbol: &str) -> ApyResult<()>;

    async fn get_validator_identity(&self, hotkey: &str) -> ApyResult<Option<ValidatorIdentity>>;

    async fn set_validator_identity(
        &self,
        hotkey: &str,
        identity: ValidatorIdentity,
    ) -> ApyResult<()>;

    /// Consistent copy of everything stored
    async fn snapshot(&self) -> ApyResult<MetadataSnapshot>;
}

fn check_override(name: &str, symbol: &str) -> ApyResult<()> {
    if name.trim().is_empty() || symbol.trim().is_empty() {
        return Err(ValidationError::new("subnet name and symbol must not be empty").into());
    }
    Ok(())
}

/// Process local store, lost on restart
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    state: RwLock<MetadataSnapshot>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: MetadataSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_override(&self, netuid: NetUid) -> ApyResult<Option<SubnetOverride>> {
        Ok(self.state.read().await.subnets.get(&netuid).cloned())
    }

    async fn set_override(&self, netuid: NetUid, name: &str, symbol: &str) -> ApyResult<()> {
        check_override(name, symbol)?;
        self.state
            .write()
            .await
            .subnets
            .insert(netuid, SubnetOverride::new(name, symbol));
        Ok(())
    }

    async fn get_validator_identity(&self, hotkey: &str) -> ApyResult<Option<ValidatorIdentity>> {
        Ok(self.state.read().await.validators.get(hotkey).cloned())
    }

    async fn set_validator_identity(
        &self,
        hotkey: &str,
        identity: ValidatorIdentity,
    ) -> ApyResult<()> {
        self.state
            .write()
            .await
            .validators
            .insert(hotkey.to_string(), identity);
        Ok(())
    }

    async fn snapshot(&self) -> ApyResult<MetadataSnapshot> {
        Ok(self.state.read().await.clone())
    }
}

/// Store persisted as one JSON document.
///
/// Every mutation rewrites the whole document. The previous document is
/// copied to `<path>.bak` first, and the new one is written to a temporary
/// file and renamed into place.
#[derive(Debug)]
pub struct JsonFileMetadataStore {
    path: PathBuf,
    state: RwLock<MetadataSnapshot>,
    write_lock: Mutex<()>,
}

impl JsonFileMetadataStore {
    /// Open the store at `path`. A missing or empty file gives an empty
    /// store; an unparsable one is logged and also gives an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> ApyResult<Self> {
        let path = path.into();
        let state = load(&path).await?;
        info!(
            path = %path.display(),
            subnets = state.subnets.len(),
            validators = state.validators.len(),
            "Opened metadata store"
        );
        Ok(Self {
            path,
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.path, "bak")
    }

    /// Apply `change` to a copy of the current state, persist the copy, and
    /// only then make it visible to readers.
    async fn update<F>(&self, change: F) -> ApyResult<()>
    where
        F: FnOnce(&mut MetadataSnapshot) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut next = self.state.read().await.clone();
        change(&mut next);
        self.persist(&next).await?;
        *self.state.write().await = next;
        Ok(())
    }

    async fn persist(&self, snapshot: &MetadataSnapshot) -> ApyResult<()> {
        let display = self.path.display().to_string();
        let store_err =
            |action: &str, e: std::io::Error| MetadataStoreError::with_path(format!("{}: {}", action, e), display.clone());

        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| MetadataStoreError::with_path(e.to_string(), display.clone()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store_err("create directory", e))?;
        }

        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            tokio::fs::copy(&self.path, self.backup_path())
                .await
                .map_err(|e| store_err("write backup", e))?;
        }

        let tmp = with_suffix(&self.path, "tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| store_err("write", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| store_err("rename", e))?;

        debug!(path = %self.path.display(), "Saved metadata store");
        Ok(())
    }
}

async fn load(path: &Path) -> ApyResult<MetadataSnapshot> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No existing metadata file");
            return Ok(MetadataSnapshot::default());
        }
        Err(e) => {
            return Err(MetadataStoreError::with_path(e.to_string(), path.display().to_string()).into())
        }
    };

    if content.trim().is_empty() {
        return Ok(MetadataSnapshot::default());
    }

    match serde_json::from_str(&content) {
        Ok(state) => Ok(state),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to parse metadata file, starting empty");
            Ok(MetadataSnapshot::default())
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[async_trait]
impl MetadataStore for JsonFileMetadataStore {
    async fn get_override(&self, netuid: NetUid) -> ApyResult<Option<SubnetOverride>> {
        Ok(self.state.read().await.subnets.get(&netuid).cloned())
    }

    async fn set_override(&self, netuid: NetUid, name: &str, symbol: &str) -> ApyResult<()> {
        check_override(name, symbol)?;
        let value = SubnetOverride::new(name, symbol);
        self.update(move |s| {
            s.subnets.insert(netuid, value);
        })
        .await
    }

    async fn get_validator_identity(&self, hotkey: &str) -> ApyResult<Option<ValidatorIdentity>> {
        Ok(self.state.read().await.validators.get(hotkey).cloned())
    }

    async fn set_validator_identity(
        &self,
        hotkey: &str,
        identity: ValidatorIdentity,
    ) -> ApyResult<()> {
        let hotkey = hotkey.to_string();
        self.update(move |s| {
            s.validators.insert(hotkey, identity);
        })
        .await
    }

    async fn snapshot(&self) -> ApyResult<MetadataSnapshot> {
        Ok(self.state.read().await.clone())
    }
}
