//! Query root

use super::types::{Item, Receipt};
use async_graphql::{Context, ErrorExtensions, Object, Result, ID};
use receiptbox_common::services::{ItemService, ReceiptService};

#[derive(Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Every receipt, most recent purchase first
    async fn receipts(&self, ctx: &Context<'_>) -> Result<Vec<Receipt>> {
        let receipts = ctx
            .data::<ReceiptService>()?
            .list_receipts()
            .await
            .map_err(|e| e.extend())?;

        Ok(receipts.into_iter().map(Receipt).collect())
    }

    async fn receipt(&self, ctx: &Context<'_>, id: ID) -> Result<Option<Receipt>> {
        let receipt = ctx
            .data::<ReceiptService>()?
            .get_receipt(&id)
            .await
            .map_err(|e| e.extend())?;

        Ok(receipt.map(Receipt))
    }

    /// Receipts with `start <= purchaseDate <= end`
    async fn filter_receipts_by_date(
        &self,
        ctx: &Context<'_>,
        start: String,
        end: String,
    ) -> Result<Vec<Receipt>> {
        let receipts = ctx
            .data::<ReceiptService>()?
            .filter_receipts_by_date(&start, &end)
            .await
            .map_err(|e| e.extend())?;

        Ok(receipts.into_iter().map(Receipt).collect())
    }

    async fn items(&self, ctx: &Context<'_>, receipt_id: ID) -> Result<Vec<Item>> {
        let items = ctx
            .data::<ItemService>()?
            .list_items(&receipt_id)
            .await
            .map_err(|e| e.extend())?;

        Ok(items.into_iter().map(Item).collect())
    }

    async fn item(&self, ctx: &Context<'_>, id: ID) -> Result<Option<Item>> {
        let item = ctx
            .data::<ItemService>()?
            .get_item(&id)
            .await
            .map_err(|e| e.extend())?;

        Ok(item.map(Item))
    }
}
