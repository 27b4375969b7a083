use crate::gateway::DocumentGateway;
use crate::models::{DocumentRecord, NewDocument};
use crate::services::Storage;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

pub const ALLOWED_CONTENT_TYPES: [&str; 2] = ["application/pdf", "text/plain"];
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Stores uploaded bytes and records them in the document store, where the
/// new record then shows up in every live feed page it belongs to.
#[derive(Clone)]
pub struct DocumentUploader {
    storage: Arc<dyn Storage>,
    gateway: Arc<dyn DocumentGateway>,
    max_bytes: usize,
}

impl DocumentUploader {
    pub fn new(
        storage: Arc<dyn Storage>,
        gateway: Arc<dyn DocumentGateway>,
        max_bytes: usize,
    ) -> Self {
        Self {
            storage,
            gateway,
            max_bytes,
        }
    }

    pub fn validate(&self, name: &str, content_type: &str, size: usize) -> Result<(), AppError> {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Please select a valid file."
            )));
        }

        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(AppError::UnsupportedMediaType(
                "Only PDF or text files are allowed.".to_string(),
            ));
        }

        if size > self.max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File size must be less than {}.",
                size_label(self.max_bytes)
            )));
        }

        Ok(())
    }

    pub async fn upload(
        &self,
        name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<DocumentRecord, AppError> {
        if let Err(e) = self.validate(name, content_type, data.len()) {
            metrics::counter!("documents_upload_rejected_total").increment(1);
            tracing::info!(filename = %name, content_type = %content_type, error = %e, "Upload rejected");
            return Err(e);
        }

        let name = display_name(name);
        let storage_key = format!("documents/{}_{}", Uuid::new_v4(), key_safe(&name));
        let size = data.len();

        self.storage.upload(&storage_key, data).await.map_err(|e| {
            tracing::error!("Failed to upload file {} to storage: {}", storage_key, e);
            e
        })?;

        let url = self.storage.url_for(&storage_key);
        let record = match self.gateway.insert(NewDocument::new(name, url)).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    storage_key = %storage_key,
                    error = %e,
                    "Failed to record uploaded document, removing stored bytes"
                );
                if let Err(cleanup) = self.storage.delete(&storage_key).await {
                    tracing::warn!(storage_key = %storage_key, error = %cleanup, "Cleanup failed");
                }
                return Err(e.into());
            }
        };

        metrics::counter!("documents_uploaded_total").increment(1);
        tracing::info!(
            document_id = %record.id,
            filename = %record.name,
            size = size,
            "Document upload completed successfully"
        );

        Ok(record)
    }
}

/// Last path component of a client-supplied filename.
fn display_name(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .to_string()
}

fn size_label(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{} bytes", bytes)
    }
}

fn key_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
