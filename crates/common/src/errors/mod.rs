//! Error types for ReceiptBox services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - GraphQL error extensions
//! - Error codes for client handling

use async_graphql::ErrorExtensions;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    ValidationError,
    InvalidFileType,
    PayloadTooLarge,
    InvalidPurchaseDate,

    // Resource errors
    NotFound,
    ReceiptNotFound,
    ItemNotFound,

    // Database errors
    DatabaseError,
    ConnectionError,

    // External service errors
    OcrError,
    LlmError,
    ExtractionParseError,
    StorageError,

    // Internal errors
    InternalError,
    ConfigurationError,
}

impl ErrorCode {
    /// Wire name used in GraphQL error extensions
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidFileType => "INVALID_FILE_TYPE",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::InvalidPurchaseDate => "INVALID_PURCHASE_DATE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ReceiptNotFound => "RECEIPT_NOT_FOUND",
            ErrorCode::ItemNotFound => "ITEM_NOT_FOUND",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::OcrError => "OCR_ERROR",
            ErrorCode::LlmError => "LLM_ERROR",
            ErrorCode::ExtractionParseError => "EXTRACTION_PARSE_ERROR",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid file format. Only image files are allowed.")]
    InvalidFileType { filename: String },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Invalid purchase date extracted from receipt.")]
    InvalidPurchaseDate { raw: Option<String> },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Receipt not found: {id}")]
    ReceiptNotFound { id: String },

    #[error("Item not found: {id}")]
    ItemNotFound { id: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("OCR error: {message}")]
    Ocr { message: String },

    #[error("LLM error: {message}")]
    Llm { message: String },

    #[error("Could not parse extracted receipt data: {message}")]
    ExtractionParse { message: String },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFileType { .. } => ErrorCode::InvalidFileType,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::InvalidPurchaseDate { .. } => ErrorCode::InvalidPurchaseDate,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::ReceiptNotFound { .. } => ErrorCode::ReceiptNotFound,
            AppError::ItemNotFound { .. } => ErrorCode::ItemNotFound,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::Ocr { .. } => ErrorCode::OcrError,
            AppError::Llm { .. } => ErrorCode::LlmError,
            AppError::ExtractionParse { .. } => ErrorCode::ExtractionParseError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::InvalidFileType { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound { .. } |
            AppError::ReceiptNotFound { .. } |
            AppError::ItemNotFound { .. } => StatusCode::NOT_FOUND,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 422 Unprocessable Entity (image read, content unusable)
            AppError::InvalidPurchaseDate { .. } |
            AppError::ExtractionParse { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 500 Internal Server Error
            AppError::Database(_) |
            AppError::DatabaseConnection { .. } |
            AppError::Storage { .. } |
            AppError::Internal { .. } |
            AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Ocr { .. } |
            AppError::Llm { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    fn log(&self) {
        let code = self.code();
        let status = self.status_code();

        if self.is_server_error() {
            tracing::error!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let body = ErrorResponse {
            error: ErrorDetails {
                code: self.code(),
                message: self.to_string(),
                details: None,
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl ErrorExtensions for AppError {
    fn extend(&self) -> async_graphql::Error {
        self.log();

        async_graphql::Error::new(self.to_string()).extend_with(|_, ext| {
            ext.set("code", self.code().as_str().to_string());
            if let AppError::Validation { field: Some(field), .. } = self {
                ext.set("field", field.clone());
            }
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string()
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::ReceiptNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::ReceiptNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_original_messages_preserved() {
        let err = AppError::InvalidFileType { filename: "notes.txt".into() };
        assert_eq!(err.to_string(), "Invalid file format. Only image files are allowed.");

        let err = AppError::InvalidPurchaseDate { raw: None };
        assert_eq!(err.to_string(), "Invalid purchase date extracted from receipt.");
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "Invalid store name".into(),
            field: Some("store_name".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_server_error() {
        let err = AppError::Internal {
            message: "Something went wrong".into()
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_server_error());
    }

    #[test]
    fn test_graphql_extension_carries_code() {
        let err = AppError::ItemNotFound { id: "abc".into() }.extend();
        assert_eq!(err.message, "Item not found: abc");

        let ext = serde_json::to_value(err.extensions.expect("extensions set")).unwrap();
        assert_eq!(ext["code"], "ITEM_NOT_FOUND");
    }

    #[test]
    fn test_code_wire_name_matches_serde() {
        let code = ErrorCode::ExtractionParseError;
        let json = serde_json::to_value(code).unwrap();
        assert_eq!(json, code.as_str());
    }
}
