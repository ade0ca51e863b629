//! SeaORM entity models
//!
//! Database entities for ReceiptBox

mod receipt;
mod item;

pub use receipt::{
    Entity as ReceiptEntity,
    Model as ReceiptRecord,
    ActiveModel as ReceiptActiveModel,
    Column as ReceiptColumn,
};

pub use item::{
    Entity as ItemEntity,
    Model as ItemRecord,
    ActiveModel as ItemActiveModel,
    Column as ItemColumn,
};
