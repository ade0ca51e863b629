//! Mutation root

use super::types::{Item, ItemInput, Receipt, ReceiptInput};
use async_graphql::{Context, ErrorExtensions, Object, Result, Upload, ID};
use receiptbox_common::errors::AppError;
use receiptbox_common::services::{ItemService, ReceiptService};
use tokio::io::AsyncReadExt;
use validator::Validate;

#[derive(Default)]
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Store a receipt photo, extract its contents and persist the receipt
    async fn upload_receipt(&self, ctx: &Context<'_>, file: Upload) -> Result<Receipt> {
        let upload = file.value(ctx).map_err(|e| {
            AppError::Internal {
                message: format!("Failed to read upload: {}", e),
            }
            .extend()
        })?;

        let filename = upload.filename;
        let mut data = Vec::new();
        tokio::fs::File::from_std(upload.content)
            .read_to_end(&mut data)
            .await
            .map_err(|e| AppError::from(e).extend())?;

        let outcome = ctx
            .data::<ReceiptService>()?
            .upload_receipt(&filename, &data)
            .await
            .map_err(|e| e.extend())?;

        Ok(Receipt(outcome.created))
    }

    /// Update receipt fields; `items` in the input are not applied
    async fn update_receipt(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: ReceiptInput,
    ) -> Result<Receipt> {
        input.validate().map_err(|e| AppError::from(e).extend())?;

        if !input.items.is_empty() {
            tracing::debug!(receipt_id = %id.as_str(), "Ignoring items in updateReceipt input");
        }

        let receipt = ctx
            .data::<ReceiptService>()?
            .update_receipt(&id, input.into())
            .await
            .map_err(|e| e.extend())?;

        Ok(Receipt(receipt))
    }

    async fn delete_receipt(&self, ctx: &Context<'_>, id: ID) -> Result<bool> {
        ctx.data::<ReceiptService>()?
            .delete_receipt(&id)
            .await
            .map_err(|e| e.extend())?;

        Ok(true)
    }

    async fn update_item(&self, ctx: &Context<'_>, id: ID, input: ItemInput) -> Result<Item> {
        input.validate().map_err(|e| AppError::from(e).extend())?;

        let item = ctx
            .data::<ItemService>()?
            .update_item(&id, input.into())
            .await
            .map_err(|e| e.extend())?;

        Ok(Item(item))
    }

    async fn delete_item(&self, ctx: &Context<'_>, id: ID) -> Result<bool> {
        ctx.data::<ItemService>()?
            .delete_item(&id)
            .await
            .map_err(|e| e.extend())?;

        Ok(true)
    }
}
