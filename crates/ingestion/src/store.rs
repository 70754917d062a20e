//! On-disk document roots
//!
//! Each tenant owns `<data_dir>/<tenant_id>/`; a document is stored under
//! its id. Writes go to a uniquely named hidden file first and are renamed
//! into place, so a crash never leaves a half-written document behind and
//! concurrent writers of one document never share a staging file.

use docvault_common::errors::Result;
use docvault_common::models::TenantId;
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

/// Bytes written next to their final location, not yet visible
#[derive(Debug)]
pub struct StagedDocument {
    staging: PathBuf,
    target: PathBuf,
}

impl StagedDocument {
    /// Move the staged bytes into place
    pub async fn commit(&self) -> Result<()> {
        tokio::fs::rename(&self.staging, &self.target).await?;
        Ok(())
    }

    /// Remove the staged bytes after a failed ingestion
    pub async fn discard(self) {
        match tokio::fs::remove_file(&self.staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.staging.display(), error = %e, "Failed to remove staged document"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Private directory of one tenant
    pub fn tenant_dir(&self, tenant_id: &TenantId) -> PathBuf {
        self.root.join(tenant_id.as_str())
    }

    /// Write a document's bytes to a staging file in the tenant's directory
    pub async fn stage(&self, tenant_id: &TenantId, document_id: &str, bytes: &[u8]) -> Result<StagedDocument> {
        let dir = self.tenant_dir(tenant_id);
        tokio::fs::create_dir_all(&dir).await?;

        let staged = StagedDocument {
            staging: dir.join(format!(".{}.{}.partial", document_id, Uuid::new_v4().simple())),
            target: dir.join(document_id),
        };
        if let Err(e) = tokio::fs::write(&staged.staging, bytes).await {
            staged.discard().await;
            return Err(e.into());
        }
        Ok(staged)
    }

    /// Store (or overwrite) a document's raw bytes
    pub async fn write(&self, tenant_id: &TenantId, document_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        let staged = self.stage(tenant_id, document_id, bytes).await?;
        if let Err(e) = staged.commit().await {
            staged.discard().await;
            return Err(e);
        }
        Ok(staged.target)
    }

    /// Documents in the tenant's directory, sorted by name. Hidden staging
    /// files are not listed; a tenant that never stored anything has an
    /// empty listing.
    pub async fn list(&self, tenant_id: &TenantId) -> Result<Vec<PathBuf>> {
        let dir = self.tenant_dir(tenant_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !hidden && entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}
