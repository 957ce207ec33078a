use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::local::LocalFileSystem;
#[cfg(test)]
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tracing::info;

use crate::settings::Settings;

pub const CONNECTION_STRING_VAR: &str = "AZURE_STORAGE_CONNECTION_STRING";
pub const CONTAINER_VAR: &str = "AZURE_CONTAINER_NAME";

/// Where snapshots live: a blob container (plus optional folder), a local
/// directory, or memory.
pub struct SnapshotStore {
    inner: Arc<dyn ObjectStore>,
    prefix: Path,
    label: String,
}

impl SnapshotStore {
    /// `container` may carry a folder after the first `/`, e.g. `lake/dataollama`.
    pub fn azure(connection_string: &str, container: &str) -> Result<Self> {
        let fields = parse_connection_string(connection_string)?;
        let (container_name, folder) = match container.split_once('/') {
            Some((c, f)) => (c, f.trim_matches('/')),
            None => (container, ""),
        };
        if container_name.is_empty() {
            bail!("{} is empty", CONTAINER_VAR);
        }

        let mut builder = MicrosoftAzureBuilder::new().with_container_name(container_name);
        if fields.get("UseDevelopmentStorage").map(String::as_str) == Some("true") {
            builder = builder.with_use_emulator(true);
        } else {
            let account = fields
                .get("AccountName")
                .ok_or_else(|| anyhow!("connection string has no AccountName"))?;
            let key = fields
                .get("AccountKey")
                .ok_or_else(|| anyhow!("connection string has no AccountKey"))?;
            builder = builder.with_account(account).with_access_key(key);
        }
        let store = builder.build().context("Failed to configure Azure blob store")?;

        Ok(SnapshotStore {
            inner: Arc::new(store),
            prefix: Path::from(folder),
            label: format!("az://{}", container.trim_end_matches('/')),
        })
    }

    pub fn local(dir: &FsPath) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
        let store = LocalFileSystem::new_with_prefix(dir)
            .with_context(|| format!("Failed to open {:?}", dir))?;
        Ok(SnapshotStore {
            inner: Arc::new(store),
            prefix: Path::default(),
            label: dir.display().to_string(),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        SnapshotStore {
            inner: Arc::new(InMemory::new()),
            prefix: Path::default(),
            label: "memory".to_string(),
        }
    }

    /// An explicit local directory wins; otherwise the Azure variables must be set.
    pub fn from_env(settings: &Settings) -> Result<Self> {
        if let Some(dir) = &settings.local_dir {
            return Self::local(dir);
        }
        let connection_string = std::env::var(CONNECTION_STRING_VAR)
            .map_err(|_| anyhow!("{} environment variable must be set (or use --local)", CONNECTION_STRING_VAR))?;
        let container = std::env::var(CONTAINER_VAR)
            .map_err(|_| anyhow!("{} environment variable must be set", CONTAINER_VAR))?;
        Self::azure(&connection_string, &container)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn location(&self, name: &str) -> Path {
        self.prefix.child(name)
    }

    /// Human-readable address of a snapshot, e.g. `az://lake/dataollama/x.parquet`.
    pub fn display_path(&self, name: &str) -> String {
        format!("{}/{}", self.label.trim_end_matches('/'), name)
    }

    /// Write (or overwrite) one snapshot object.
    pub async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<String> {
        let location = self.location(name);
        let size = bytes.len();
        self.inner
            .put(&location, PutPayload::from(bytes))
            .await
            .with_context(|| format!("Failed to write {}", self.display_path(name)))?;
        info!("Wrote {} ({} bytes)", self.display_path(name), size);
        Ok(self.display_path(name))
    }

    pub async fn get(&self, name: &str) -> Result<Bytes> {
        let location = self.location(name);
        let result = self
            .inner
            .get(&location)
            .await
            .with_context(|| format!("Failed to read {}", self.display_path(name)))?;
        Ok(result.bytes().await?)
    }

    /// File names directly under the prefix starting with `name_prefix`, sorted.
    pub async fn list(&self, name_prefix: &str) -> Result<Vec<String>> {
        let prefix = if self.prefix.as_ref().is_empty() {
            None
        } else {
            Some(&self.prefix)
        };
        let objects: Vec<_> = self
            .inner
            .list(prefix)
            .try_collect()
            .await
            .with_context(|| format!("Failed to list {}", self.label))?;

        let mut names: Vec<String> = objects
            .into_iter()
            .filter(|meta| meta.location.prefix_matches(&self.prefix))
            .filter(|meta| meta.location.parts().count() == self.prefix.parts().count() + 1)
            .filter_map(|meta| meta.location.filename().map(str::to_string))
            .filter(|name| name.starts_with(name_prefix))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// `Key=Value;Key=Value` → map. Values may contain `=` (base64 keys).
fn parse_connection_string(raw: &str) -> Result<HashMap<String, String>> {
    let mut fields = HashMap::new();
    for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| anyhow!("malformed connection string segment: {:?}", part))?;
        fields.insert(key.trim().to_string(), value.trim().to_string());
    }
    if fields.is_empty() {
        bail!("{} is empty", CONNECTION_STRING_VAR);
    }
    Ok(fields)
}
