//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A receipt together with its line items, ordered by position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReceipt {
    pub receipt: ReceiptRecord,
    pub items: Vec<ItemRecord>,
}

impl StoredReceipt {
    /// Sum of the line totals (informational, not enforced)
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(ItemRecord::line_total).sum()
    }
}

/// Receipt to insert, with its items
#[derive(Debug, Clone, PartialEq)]
pub struct NewReceipt {
    pub store_name: String,
    pub purchase_date: DateTime<Utc>,
    pub total_amount: f64,
    pub image_url: String,
    pub items: Vec<NewItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub quantity: Option<i32>,
    pub price: f64,
}

/// Partial update of a receipt; `None` leaves the column untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiptChanges {
    pub store_name: Option<String>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub total_amount: Option<f64>,
    pub image_url: Option<String>,
}

/// Partial update of an item; `quantity: Some(None)` clears the quantity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub quantity: Option<Option<i32>>,
    pub price: Option<f64>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Receipt Operations
    // ========================================================================

    /// Insert a receipt and all of its items in one transaction
    pub async fn create_receipt(&self, new: NewReceipt) -> Result<StoredReceipt> {
        let receipt_id = Uuid::new_v4();
        let now: DateTimeWithTimeZone = Utc::now().into();

        let txn = self.write_conn().begin().await?;

        let receipt = ReceiptActiveModel {
            id: Set(receipt_id),
            store_name: Set(new.store_name),
            purchase_date: Set(new.purchase_date.into()),
            total_amount: Set(new.total_amount),
            image_url: Set(new.image_url),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(new.items.len());
        for (position, item) in new.items.into_iter().enumerate() {
            let created = ItemActiveModel {
                id: Set(Uuid::new_v4()),
                receipt_id: Set(receipt_id),
                position: Set(position as i32),
                name: Set(item.name),
                quantity: Set(item.quantity),
                price: Set(item.price),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(created);
        }

        txn.commit().await?;

        Ok(StoredReceipt { receipt, items })
    }

    /// Find receipt by ID, with items
    pub async fn find_receipt_by_id(&self, id: Uuid) -> Result<Option<StoredReceipt>> {
        let Some(receipt) = ReceiptEntity::find_by_id(id).one(self.read_conn()).await? else {
            return Ok(None);
        };

        let items = self.list_items_by_receipt(id).await?;
        Ok(Some(StoredReceipt { receipt, items }))
    }

    /// List every receipt, most recent purchase first
    pub async fn list_receipts(&self) -> Result<Vec<StoredReceipt>> {
        let receipts = ReceiptEntity::find()
            .order_by_desc(ReceiptColumn::PurchaseDate)
            .order_by_desc(ReceiptColumn::CreatedAt)
            .all(self.read_conn())
            .await?;

        self.attach_items(receipts).await
    }

    /// Receipts purchased within `[start, end]`, both ends inclusive
    pub async fn filter_receipts_by_date(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredReceipt>> {
        let start: DateTimeWithTimeZone = start.into();
        let end: DateTimeWithTimeZone = end.into();

        let receipts = ReceiptEntity::find()
            .filter(ReceiptColumn::PurchaseDate.gte(start))
            .filter(ReceiptColumn::PurchaseDate.lte(end))
            .order_by_asc(ReceiptColumn::PurchaseDate)
            .order_by_asc(ReceiptColumn::CreatedAt)
            .all(self.read_conn())
            .await?;

        self.attach_items(receipts).await
    }

    /// Apply a partial update to a receipt
    pub async fn update_receipt(&self, id: Uuid, changes: ReceiptChanges) -> Result<StoredReceipt> {
        let mut receipt: ReceiptActiveModel = ReceiptEntity::find_by_id(id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::ReceiptNotFound { id: id.to_string() })?
            .into();

        if let Some(store_name) = changes.store_name {
            receipt.store_name = Set(store_name);
        }

        if let Some(purchase_date) = changes.purchase_date {
            receipt.purchase_date = Set(purchase_date.into());
        }

        if let Some(total_amount) = changes.total_amount {
            receipt.total_amount = Set(total_amount);
        }

        if let Some(image_url) = changes.image_url {
            receipt.image_url = Set(image_url);
        }

        receipt.updated_at = Set(Utc::now().into());

        let receipt = receipt.update(self.write_conn()).await?;
        let items = items_of(self.write_conn(), id).await?;

        Ok(StoredReceipt { receipt, items })
    }

    /// Delete a receipt and its items in one transaction.
    ///
    /// Returns the deleted receipt row, or `None` when no such receipt exists.
    pub async fn delete_receipt(&self, id: Uuid) -> Result<Option<ReceiptRecord>> {
        let txn = self.write_conn().begin().await?;

        let Some(receipt) = ReceiptEntity::find_by_id(id).one(&txn).await? else {
            return Ok(None);
        };

        // Items first so the delete also works on stores without FK cascades
        let removed = ItemEntity::delete_many()
            .filter(ItemColumn::ReceiptId.eq(id))
            .exec(&txn)
            .await?;

        ReceiptEntity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;

        tracing::debug!(receipt_id = %id, items_removed = removed.rows_affected, "Receipt rows deleted");

        Ok(Some(receipt))
    }

    async fn attach_items(&self, receipts: Vec<ReceiptRecord>) -> Result<Vec<StoredReceipt>> {
        if receipts.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = receipts.iter().map(|r| r.id).collect();

        let mut by_receipt: HashMap<Uuid, Vec<ItemRecord>> = HashMap::new();
        for item in ItemEntity::find()
            .filter(ItemColumn::ReceiptId.is_in(ids))
            .order_by_asc(ItemColumn::Position)
            .all(self.read_conn())
            .await?
        {
            by_receipt.entry(item.receipt_id).or_default().push(item);
        }

        Ok(receipts
            .into_iter()
            .map(|receipt| {
                let items = by_receipt.remove(&receipt.id).unwrap_or_default();
                StoredReceipt { receipt, items }
            })
            .collect())
    }

    // ========================================================================
    // Item Operations
    // ========================================================================

    /// Items of a receipt in printed order; empty for unknown receipts
    pub async fn list_items_by_receipt(&self, receipt_id: Uuid) -> Result<Vec<ItemRecord>> {
        items_of(self.read_conn(), receipt_id).await
    }

    /// Find item by ID
    pub async fn find_item_by_id(&self, id: Uuid) -> Result<Option<ItemRecord>> {
        ItemEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Apply a partial update to an item
    pub async fn update_item(&self, id: Uuid, changes: ItemChanges) -> Result<ItemRecord> {
        let mut item: ItemActiveModel = ItemEntity::find_by_id(id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::ItemNotFound { id: id.to_string() })?
            .into();

        if let Some(name) = changes.name {
            item.name = Set(name);
        }

        if let Some(quantity) = changes.quantity {
            item.quantity = Set(quantity);
        }

        if let Some(price) = changes.price {
            item.price = Set(price);
        }

        item.updated_at = Set(Utc::now().into());

        item.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Delete item by ID
    pub async fn delete_item(&self, id: Uuid) -> Result<bool> {
        let result = ItemEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }
}

async fn items_of<C>(conn: &C, receipt_id: Uuid) -> Result<Vec<ItemRecord>>
where
    C: ConnectionTrait,
{
    ItemEntity::find()
        .filter(ItemColumn::ReceiptId.eq(receipt_id))
        .order_by_asc(ItemColumn::Position)
        .all(conn)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn repo() -> Repository {
        Repository::new(DbPool::in_memory().await.unwrap())
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn grocery_run(date: DateTime<Utc>) -> NewReceipt {
        NewReceipt {
            store_name: "Corner Grocer".to_string(),
            purchase_date: date,
            total_amount: 7.25,
            image_url: "/uploads/a.jpg".to_string(),
            items: vec![
                NewItem { name: "Milk".to_string(), quantity: Some(2), price: 1.50 },
                NewItem { name: "Bread".to_string(), quantity: None, price: 4.25 },
            ],
        }
    }

    #[tokio::test]
    async fn test_create_then_fetch_returns_same_fields() {
        let repo = repo().await;
        let created = repo.create_receipt(grocery_run(day(2024, 5, 3))).await.unwrap();

        let fetched = repo.find_receipt_by_id(created.receipt.id).await.unwrap().unwrap();

        assert_eq!(fetched.receipt.id, created.receipt.id);
        assert_eq!(fetched.receipt.store_name, "Corner Grocer");
        assert_eq!(fetched.receipt.total_amount, 7.25);
        assert_eq!(fetched.receipt.image_url, "/uploads/a.jpg");
        assert_eq!(fetched.receipt.purchase_date, created.receipt.purchase_date);
        assert_eq!(fetched.items.len(), 2);
        assert_eq!(fetched.items[0].name, "Milk");
        assert_eq!(fetched.items[0].quantity, Some(2));
        assert_eq!(fetched.items[1].name, "Bread");
        assert_eq!(fetched.items[1].quantity, None);
        assert!(fetched.items.iter().all(|i| i.receipt_id == created.receipt.id));
        assert_eq!(fetched.items_total(), 7.25);
    }

    #[tokio::test]
    async fn test_missing_receipt_is_none() {
        let repo = repo().await;
        assert!(repo.find_receipt_by_id(Uuid::new_v4()).await.unwrap().is_none());
        assert!(repo.list_items_by_receipt(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_receipt_removes_items() {
        let repo = repo().await;
        let created = repo.create_receipt(grocery_run(day(2024, 5, 3))).await.unwrap();
        let item_id = created.items[0].id;

        let deleted = repo.delete_receipt(created.receipt.id).await.unwrap();
        assert_eq!(deleted.map(|r| r.id), Some(created.receipt.id));

        assert!(repo.find_receipt_by_id(created.receipt.id).await.unwrap().is_none());
        assert!(repo.find_item_by_id(item_id).await.unwrap().is_none());
        assert!(repo.list_items_by_receipt(created.receipt.id).await.unwrap().is_empty());

        // Second delete finds nothing
        assert!(repo.delete_receipt(created.receipt.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filter_by_date_is_inclusive() {
        let repo = repo().await;
        for d in [1, 10, 20, 31] {
            repo.create_receipt(grocery_run(day(2024, 1, d))).await.unwrap();
        }
        repo.create_receipt(grocery_run(day(2024, 2, 1))).await.unwrap();

        let found = repo
            .filter_receipts_by_date(day(2024, 1, 10), day(2024, 1, 31))
            .await
            .unwrap();

        let days: Vec<_> = found
            .iter()
            .map(|r| r.receipt.purchase_date.with_timezone(&Utc))
            .collect();
        assert_eq!(days, vec![day(2024, 1, 10), day(2024, 1, 20), day(2024, 1, 31)]);
        assert!(found.iter().all(|r| r.items.len() == 2));

        let none = repo
            .filter_receipts_by_date(day(2024, 3, 1), day(2024, 2, 1))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_by_purchase_date_desc() {
        let repo = repo().await;
        repo.create_receipt(grocery_run(day(2023, 12, 24))).await.unwrap();
        repo.create_receipt(grocery_run(day(2024, 6, 1))).await.unwrap();

        let all = repo.list_receipts().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].receipt.purchase_date.with_timezone(&Utc), day(2024, 6, 1));
    }

    #[tokio::test]
    async fn test_update_receipt_partial() {
        let repo = repo().await;
        let created = repo.create_receipt(grocery_run(day(2024, 5, 3))).await.unwrap();

        let updated = repo
            .update_receipt(
                created.receipt.id,
                ReceiptChanges {
                    store_name: Some("Corner Grocer #2".to_string()),
                    total_amount: Some(9.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.receipt.store_name, "Corner Grocer #2");
        assert_eq!(updated.receipt.total_amount, 9.0);
        assert_eq!(updated.receipt.purchase_date, created.receipt.purchase_date);
        assert_eq!(updated.items.len(), 2);

        let err = repo
            .update_receipt(Uuid::new_v4(), ReceiptChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ReceiptNotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_and_delete_item() {
        let repo = repo().await;
        let created = repo.create_receipt(grocery_run(day(2024, 5, 3))).await.unwrap();
        let bread = created.items[1].id;

        let updated = repo
            .update_item(
                bread,
                ItemChanges {
                    quantity: Some(Some(3)),
                    price: Some(3.99),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Bread");
        assert_eq!(updated.quantity, Some(3));
        assert_eq!(updated.price, 3.99);

        assert!(repo.delete_item(bread).await.unwrap());
        assert!(!repo.delete_item(bread).await.unwrap());

        let remaining = repo.list_items_by_receipt(created.receipt.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "Milk");

        let err = repo.update_item(bread, ItemChanges::default()).await.unwrap_err();
        assert!(matches!(err, AppError::ItemNotFound { .. }));
    }
}
