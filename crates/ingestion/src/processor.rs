//! Import processor
//!
//! Runs receipt images from disk through the same upload pipeline the
//! GraphQL `uploadReceipt` mutation uses.

use crate::errors::ImportError;
use receiptbox_common::services::{ReceiptService, UploadOutcome};
use receiptbox_common::storage::is_image_file_extension;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument};

/// A receipt created from one file
#[derive(Debug, Clone, Serialize)]
pub struct ImportedReceipt {
    pub file: String,
    pub receipt_id: String,
    pub store_name: String,
    pub items: usize,
}

/// A file that went through the pipeline and failed
#[derive(Debug, Clone, Serialize)]
pub struct FailedImport {
    pub file: String,
    pub error: String,
}

/// Outcome of a directory import
#[derive(Debug, Default, Serialize)]
pub struct ImportSummary {
    pub imported: Vec<ImportedReceipt>,
    pub failed: Vec<FailedImport>,
    /// Files without an image extension
    pub skipped: Vec<String>,
}

/// Import processor
pub struct ReceiptImporter {
    receipts: ReceiptService,
}

impl ReceiptImporter {
    pub fn new(receipts: ReceiptService) -> Self {
        Self { receipts }
    }

    /// Import a single image file
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn import_file(&self, path: &Path) -> Result<UploadOutcome, ImportError> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let data = tokio::fs::read(path).await?;
        Ok(self.receipts.upload_receipt(&filename, &data).await?)
    }

    /// Import every image in a directory (not recursive), in filename order.
    ///
    /// A failing file is recorded in the summary and the batch carries on.
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn import_directory(&self, dir: &Path) -> Result<ImportSummary, ImportError> {
        if !dir.is_dir() {
            return Err(ImportError::DirectoryNotFound(dir.display().to_string()));
        }

        info!("Importing directory of receipts");

        let mut paths: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            paths.push(entry.path());
        }
        paths.sort();

        let mut summary = ImportSummary::default();

        for path in paths {
            let file = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            // Follows symlinks; a dangling one is a failed file
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    error!(file = %file, error = %e, "Cannot read directory entry");
                    summary.failed.push(FailedImport {
                        file,
                        error: e.to_string(),
                    });
                    continue;
                }
            }

            if !is_image_file_extension(&file) {
                debug!(file = %file, "Skipping non-image file");
                summary.skipped.push(file);
                continue;
            }

            match self.import_file(&path).await {
                Ok(outcome) => {
                    info!(
                        file = %file,
                        receipt_id = %outcome.created.receipt.id,
                        item_count = outcome.created.items.len(),
                        "Receipt imported"
                    );
                    summary.imported.push(ImportedReceipt {
                        file,
                        receipt_id: outcome.created.receipt.id.to_string(),
                        store_name: outcome.created.receipt.store_name,
                        items: outcome.created.items.len(),
                    });
                }
                Err(e) => {
                    error!(file = %file, error = %e, "Failed to import receipt");
                    summary.failed.push(FailedImport {
                        file,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            imported = summary.imported.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            "Directory import complete"
        );

        Ok(summary)
    }
}
