//! GraphQL object and input types

use async_graphql::{InputObject, Object, ID};
use receiptbox_common::dates::to_iso_string;
use receiptbox_common::db::models::ItemRecord;
use receiptbox_common::services::{ItemUpdate, ReceiptUpdate};
use receiptbox_common::StoredReceipt;
use validator::{Validate, ValidationError};

/// A receipt with its line items
pub struct Receipt(pub StoredReceipt);

#[Object]
impl Receipt {
    async fn id(&self) -> ID {
        ID(self.0.receipt.id.to_string())
    }

    async fn store_name(&self) -> &str {
        &self.0.receipt.store_name
    }

    /// ISO 8601, UTC
    async fn purchase_date(&self) -> String {
        to_iso_string(&self.0.receipt.purchase_date)
    }

    async fn total_amount(&self) -> f64 {
        self.0.receipt.total_amount
    }

    async fn items(&self) -> Vec<Item> {
        self.0.items.iter().cloned().map(Item).collect()
    }

    async fn image_url(&self) -> &str {
        &self.0.receipt.image_url
    }

    async fn created_at(&self) -> String {
        to_iso_string(&self.0.receipt.created_at)
    }
}

/// One printed line of a receipt
pub struct Item(pub ItemRecord);

#[Object]
impl Item {
    async fn id(&self) -> ID {
        ID(self.0.id.to_string())
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn quantity(&self) -> Option<i32> {
        self.0.quantity
    }

    async fn price(&self) -> f64 {
        self.0.price
    }

    async fn created_at(&self) -> String {
        to_iso_string(&self.0.created_at)
    }

    async fn receipt_id(&self) -> ID {
        ID(self.0.receipt_id.to_string())
    }
}

#[derive(Debug, Clone, InputObject, Validate)]
pub struct ReceiptInput {
    #[validate(length(min = 1, max = 500))]
    pub store_name: String,
    pub purchase_date: String,
    #[validate(custom(function = "non_negative_amount"))]
    pub total_amount: f64,
    /// Accepted for compatibility; edit items with `updateItem`
    #[graphql(default)]
    #[validate(nested)]
    pub items: Vec<ItemInput>,
    #[validate(length(min = 1))]
    pub image_url: String,
}

impl From<ReceiptInput> for ReceiptUpdate {
    fn from(input: ReceiptInput) -> Self {
        ReceiptUpdate {
            store_name: Some(input.store_name),
            purchase_date: Some(input.purchase_date),
            total_amount: Some(input.total_amount),
            image_url: Some(input.image_url),
        }
    }
}

#[derive(Debug, Clone, InputObject, Validate)]
pub struct ItemInput {
    #[validate(length(min = 1, max = 500))]
    pub name: String,
    #[validate(range(min = 0))]
    pub quantity: Option<i32>,
    #[validate(custom(function = "non_negative_amount"))]
    pub price: f64,
}

impl From<ItemInput> for ItemUpdate {
    fn from(input: ItemInput) -> Self {
        ItemUpdate {
            name: Some(input.name),
            quantity: input.quantity,
            price: Some(input.price),
        }
    }
}

/// Money amounts: finite, not below zero, and not `-0.0`
fn non_negative_amount(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value.is_sign_positive() {
        Ok(())
    } else {
        Err(ValidationError::new("non_negative_amount"))
    }
}
