//! OCR abstraction
//!
//! Turns a stored receipt image into raw text:
//! - Tesseract (CLI, run as a child process)
//! - Mock (fixed text, for tests and offline development)

use crate::config::OcrConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Trait for text recognition engines
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Recognize the text printed on an image
    async fn recognize_text(&self, image_path: &Path) -> Result<String>;

    /// Engine name, for logs
    fn name(&self) -> &str;
}

/// Tesseract command line engine
pub struct TesseractOcr {
    binary: String,
    language: String,
    timeout: Duration,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<String>, language: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
            timeout,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(
            config.binary.clone(),
            config.language.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl OcrProvider for TesseractOcr {
    async fn recognize_text(&self, image_path: &Path) -> Result<String> {
        let mut command = Command::new(&self.binary);
        command
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AppError::Ocr {
                message: format!("Tesseract timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| AppError::Ocr {
                message: format!("Failed to run {}: {}", self.binary, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Ocr {
                message: format!("Tesseract exited with {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// Mock OCR engine returning the same text for every image
pub struct MockOcr {
    text: String,
}

impl MockOcr {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for MockOcr {
    fn default() -> Self {
        Self::new("CORNER GROCER\n2024-01-15\nMILK 2 x 1.50\nBREAD 4.25\nTOTAL 7.25\n")
    }
}

#[async_trait]
impl OcrProvider for MockOcr {
    async fn recognize_text(&self, _image_path: &Path) -> Result<String> {
        Ok(self.text.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Create an OCR provider based on configuration
pub fn create_ocr_provider(config: &OcrConfig) -> Result<Arc<dyn OcrProvider>> {
    match config.provider.as_str() {
        "tesseract" => Ok(Arc::new(TesseractOcr::from_config(config))),
        "mock" => Ok(Arc::new(MockOcr::default())),
        other => Err(AppError::Configuration {
            message: format!("Unknown OCR provider: {}", other),
        }),
    }
}
