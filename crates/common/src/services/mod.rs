//! Receipt and item services
//!
//! The layer the GraphQL resolvers and the batch importer call into. Owns the
//! upload pipeline (validate → store → extract → persist) and maps raw ids and
//! date strings from the API onto repository calls.

use crate::dates::parse_date;
use crate::db::{ItemChanges, NewItem, NewReceipt, ReceiptChanges, Repository, StoredReceipt};
use crate::db::models::ItemRecord;
use crate::errors::{AppError, Result};
use crate::extraction::{ExtractedReceipt, ReceiptExtractor};
use crate::metrics::record_upload;
use crate::storage::{is_image_file_extension, StorageProvider, StoredFile};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Receipt as persisted, with generated ids
    pub created: StoredReceipt,
    /// Receipt as read from the image
    pub extracted: ExtractedReceipt,
}

/// Changes to a receipt as received from the API
#[derive(Debug, Clone, Default)]
pub struct ReceiptUpdate {
    pub store_name: Option<String>,
    /// Any accepted date form; unparseable values leave the stored date alone
    pub purchase_date: Option<String>,
    pub total_amount: Option<f64>,
    pub image_url: Option<String>,
}

/// Changes to an item as received from the API
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub quantity: Option<i32>,
    pub price: Option<f64>,
}

/// Ids arrive as free text; anything that is not a UUID matches nothing
pub fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

// ============================================================================
// Receipts
// ============================================================================

#[derive(Clone)]
pub struct ReceiptService {
    repo: Repository,
    storage: Arc<dyn StorageProvider>,
    extractor: ReceiptExtractor,
    max_upload_bytes: usize,
}

impl ReceiptService {
    pub fn new(
        repo: Repository,
        storage: Arc<dyn StorageProvider>,
        extractor: ReceiptExtractor,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            repo,
            storage,
            extractor,
            max_upload_bytes,
        }
    }

    /// Store an uploaded image, extract its contents and persist the receipt
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn upload_receipt(&self, filename: &str, data: &[u8]) -> Result<UploadOutcome> {
        let outcome = self.try_upload(filename, data).await;

        match &outcome {
            Ok(outcome) => {
                record_upload(true, data.len(), outcome.created.items.len());
                info!(
                    receipt_id = %outcome.created.receipt.id,
                    store = %outcome.created.receipt.store_name,
                    items = outcome.created.items.len(),
                    "Receipt uploaded"
                );
            }
            Err(e) => {
                record_upload(false, data.len(), 0);
                warn!(error = %e, "Receipt upload failed");
            }
        }

        outcome
    }

    async fn try_upload(&self, filename: &str, data: &[u8]) -> Result<UploadOutcome> {
        if !is_image_file_extension(filename) {
            return Err(AppError::InvalidFileType {
                filename: filename.to_string(),
            });
        }

        if data.is_empty() {
            return Err(AppError::Validation {
                message: "Uploaded file is empty".to_string(),
                field: Some("file".to_string()),
            });
        }

        if data.len() > self.max_upload_bytes {
            return Err(AppError::PayloadTooLarge {
                size: data.len(),
                limit: self.max_upload_bytes,
            });
        }

        let stored = self.storage.save_file(filename, data).await?;
        let staged = StagedImage::new(self.storage.clone(), stored.key.clone());

        match self.extract_and_persist(&stored).await {
            Ok(outcome) => {
                staged.keep();
                Ok(outcome)
            }
            Err(e) => {
                staged.discard().await;
                Err(e)
            }
        }
    }

    async fn extract_and_persist(&self, stored: &StoredFile) -> Result<UploadOutcome> {
        let extracted = self.extractor.extract(&stored.path).await?;

        let new = NewReceipt {
            store_name: extracted.store_name.clone(),
            purchase_date: extracted.purchase_date,
            total_amount: extracted.total_amount,
            image_url: stored.url.clone(),
            items: extracted
                .items
                .iter()
                .map(|item| NewItem {
                    name: item.name.clone(),
                    quantity: Some(item.quantity),
                    price: item.price,
                })
                .collect(),
        };

        let created = self.repo.create_receipt(new).await?;

        Ok(UploadOutcome { created, extracted })
    }

    /// All receipts, most recent purchase first
    pub async fn list_receipts(&self) -> Result<Vec<StoredReceipt>> {
        self.repo.list_receipts().await
    }

    /// Receipt by id; unknown or malformed ids give `None`
    pub async fn get_receipt(&self, id: &str) -> Result<Option<StoredReceipt>> {
        match parse_id(id) {
            Some(id) => self.repo.find_receipt_by_id(id).await,
            None => Ok(None),
        }
    }

    /// Receipts purchased between `start` and `end`, both inclusive
    pub async fn filter_receipts_by_date(&self, start: &str, end: &str) -> Result<Vec<StoredReceipt>> {
        let start = parse_bound(start, "start")?;
        let end = parse_bound(end, "end")?;

        if start > end {
            return Ok(Vec::new());
        }

        self.repo.filter_receipts_by_date(start, end).await
    }

    /// Update receipt fields; items are edited through [`ItemService`]
    #[instrument(skip(self, update))]
    pub async fn update_receipt(&self, id: &str, update: ReceiptUpdate) -> Result<StoredReceipt> {
        let not_found = || AppError::ReceiptNotFound { id: id.to_string() };
        let uuid = parse_id(id).ok_or_else(not_found)?;

        // A stored image belongs to the receipt it was uploaded with; deleting
        // a receipt removes the image its URL points at.
        if let Some(url) = update.image_url.as_deref() {
            if self.storage.key_from_url(url).is_some() {
                let current = self.repo.find_receipt_by_id(uuid).await?.ok_or_else(not_found)?;
                if current.receipt.image_url != url {
                    return Err(AppError::Validation {
                        message: format!("Image {} is not stored for this receipt", url),
                        field: Some("image_url".to_string()),
                    });
                }
            }
        }

        let purchase_date = update.purchase_date.as_deref().and_then(|raw| {
            let parsed = parse_date(raw);
            if parsed.is_none() {
                warn!(receipt_id = %uuid, purchase_date = %raw, "Ignoring unparseable purchase date");
            }
            parsed
        });

        self.repo
            .update_receipt(
                uuid,
                ReceiptChanges {
                    store_name: update.store_name,
                    purchase_date,
                    total_amount: update.total_amount,
                    image_url: update.image_url,
                },
            )
            .await
    }

    /// Delete a receipt, its items and its stored image
    #[instrument(skip(self))]
    pub async fn delete_receipt(&self, id: &str) -> Result<()> {
        let not_found = || AppError::ReceiptNotFound { id: id.to_string() };

        let uuid = parse_id(id).ok_or_else(not_found)?;
        let receipt = self.repo.delete_receipt(uuid).await?.ok_or_else(not_found)?;

        match self.storage.key_from_url(&receipt.image_url) {
            Some(key) => remove_image(self.storage.as_ref(), &key).await,
            None => warn!(image_url = %receipt.image_url, "Image URL not managed by storage, leaving it"),
        }

        info!(receipt_id = %uuid, "Receipt deleted");
        Ok(())
    }
}

async fn remove_image(storage: &dyn StorageProvider, key: &str) {
    if let Err(e) = storage.delete_file(key).await {
        warn!(key = %key, error = %e, "Failed to remove stored image");
    }
}

/// An image saved for an upload that has not been persisted yet.
///
/// Dropping it while still staged (the upload future was cancelled) removes
/// the image on a background task.
struct StagedImage {
    storage: Arc<dyn StorageProvider>,
    key: Option<String>,
}

impl StagedImage {
    fn new(storage: Arc<dyn StorageProvider>, key: String) -> Self {
        Self { storage, key: Some(key) }
    }

    /// The receipt now references the image
    fn keep(mut self) {
        self.key = None;
    }

    async fn discard(mut self) {
        if let Some(key) = self.key.as_deref() {
            remove_image(self.storage.as_ref(), key).await;
        }
        self.key = None;
    }
}

impl Drop for StagedImage {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(key = %key, "Upload cancelled, removing stored image");
                let storage = self.storage.clone();
                handle.spawn(async move { remove_image(storage.as_ref(), &key).await });
            }
            Err(_) => warn!(key = %key, "Upload cancelled outside a runtime, stored image left behind"),
        }
    }
}

fn parse_bound(raw: &str, field: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    parse_date(raw).ok_or_else(|| AppError::Validation {
        message: format!("Invalid {} date: {}", field, raw),
        field: Some(field.to_string()),
    })
}

// ============================================================================
// Items
// ============================================================================

#[derive(Clone)]
pub struct ItemService {
    repo: Repository,
}

impl ItemService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Items of a receipt in printed order
    pub async fn list_items(&self, receipt_id: &str) -> Result<Vec<ItemRecord>> {
        match parse_id(receipt_id) {
            Some(id) => self.repo.list_items_by_receipt(id).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<ItemRecord>> {
        match parse_id(id) {
            Some(id) => self.repo.find_item_by_id(id).await,
            None => Ok(None),
        }
    }

    #[instrument(skip(self, update))]
    pub async fn update_item(&self, id: &str, update: ItemUpdate) -> Result<ItemRecord> {
        let uuid = parse_id(id).ok_or_else(|| AppError::ItemNotFound { id: id.to_string() })?;

        self.repo
            .update_item(
                uuid,
                ItemChanges {
                    name: update.name,
                    quantity: update.quantity.map(Some),
                    price: update.price,
                },
            )
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_item(&self, id: &str) -> Result<()> {
        let not_found = || AppError::ItemNotFound { id: id.to_string() };

        let uuid = parse_id(id).ok_or_else(not_found)?;
        if !self.repo.delete_item(uuid).await? {
            return Err(not_found());
        }

        Ok(())
    }
}
