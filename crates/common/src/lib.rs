//! ReceiptBox Common Library
//!
//! Shared code for the ReceiptBox gateway and importer including:
//! - Database entities, connection pool and repository
//! - Receipt image storage
//! - OCR and chat model clients
//! - The extraction pipeline and the receipt/item services
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod dates;
pub mod db;
pub mod errors;
pub mod extraction;
pub mod llm;
pub mod metrics;
pub mod ocr;
pub mod services;
pub mod storage;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository, StoredReceipt};
pub use errors::{AppError, Result};
pub use extraction::ReceiptExtractor;
pub use services::{ItemService, ReceiptService, UploadOutcome};
pub use storage::StorageProvider;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
