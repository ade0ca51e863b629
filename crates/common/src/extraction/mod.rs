//! Receipt extraction pipeline
//!
//! image → OCR text → chat model → JSON → [`ExtractedReceipt`].
//!
//! The model is asked for plain JSON but frequently wraps it in a markdown
//! code fence and is loose about numbers, so parsing here is forgiving about
//! shape and strict only about the purchase date.

use crate::dates::parse_date;
use crate::errors::{AppError, Result};
use crate::llm::ChatClient;
use crate::metrics::record_extraction;
use crate::ocr::OcrProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

/// System message sent with every extraction request
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant for receipt data extraction.";

/// Store name used when the model finds none
pub const UNKNOWN_STORE: &str = "Unknown store";

static CODE_FENCE: LazyLock<regex_lite::Regex> = LazyLock::new(|| {
    regex_lite::Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("valid fence pattern")
});

/// Structured receipt as read from the image, before persistence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedReceipt {
    pub store_name: String,
    pub purchase_date: DateTime<Utc>,
    pub total_amount: f64,
    pub items: Vec<ExtractedItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedItem {
    pub name: String,
    pub quantity: i32,
    pub price: f64,
}

/// Shape requested from the model; every field is optional on the wire
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    #[serde(default)]
    store_name: Value,
    #[serde(default)]
    purchase_date: Value,
    #[serde(default)]
    total_amount: Value,
    #[serde(default)]
    items: Option<Vec<RawItem>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawItem {
    #[serde(default)]
    name: Value,
    #[serde(default)]
    quantity: Value,
    #[serde(default)]
    price: Value,
}

/// Runs OCR and the chat model over a stored image
#[derive(Clone)]
pub struct ReceiptExtractor {
    ocr: Arc<dyn OcrProvider>,
    chat: Arc<dyn ChatClient>,
}

impl ReceiptExtractor {
    pub fn new(ocr: Arc<dyn OcrProvider>, chat: Arc<dyn ChatClient>) -> Self {
        Self { ocr, chat }
    }

    /// Extract structured receipt data from an image on disk
    #[tracing::instrument(skip(self), fields(ocr = self.ocr.name(), model = self.chat.model_name()))]
    pub async fn extract(&self, image_path: &Path) -> Result<ExtractedReceipt> {
        let started = Instant::now();
        let text = self.ocr.recognize_text(image_path).await;
        record_extraction("ocr", self.ocr.name(), started.elapsed().as_secs_f64(), text.is_ok());
        let text = text?;

        tracing::debug!(chars = text.len(), "OCR finished");

        let started = Instant::now();
        let reply = self.chat.complete(SYSTEM_PROMPT, &build_prompt(&text)).await;
        record_extraction("llm", self.chat.model_name(), started.elapsed().as_secs_f64(), reply.is_ok());
        let reply = reply?;

        parse_extraction(&reply)
    }
}

/// User prompt asking the model to structure the OCR text
pub fn build_prompt(ocr_text: &str) -> String {
    format!(
        "You are an expert at extracting structured data from receipts. \
        Given the following OCR text, extract:\n\
        - storeName (string)\n\
        - purchaseDate (string, must be a valid ISO 8601 date in the format YYYY-MM-DD \
        or YYYY-MM-DDTHH:mm:ss, and must be a real calendar date)\n\
        - totalAmount (number)\n\
        - items (array of {{ name: string, quantity: number, price: number }})\n\n\
        If you cannot find a valid purchase date in the text, respond with \"purchaseDate\": null.\n\n\
        OCR TEXT:\n{}\n\n\
        Respond ONLY with a valid JSON object matching this structure:\n\
        {{\n  \"storeName\": \"...\",\n  \"purchaseDate\": \"...\",\n  \"totalAmount\": ...,\n  \
        \"items\": [\n    {{ \"name\": \"...\", \"quantity\": ..., \"price\": ... }}\n  ]\n}}",
        ocr_text
    )
}

/// Turn the model's reply into an [`ExtractedReceipt`]
pub fn parse_extraction(reply: &str) -> Result<ExtractedReceipt> {
    let json = strip_code_fences(reply);

    let value: Value = serde_json::from_str(json).map_err(|e| AppError::ExtractionParse {
        message: e.to_string(),
    })?;

    if !value.is_object() {
        return Err(AppError::ExtractionParse {
            message: "expected a JSON object".to_string(),
        });
    }

    let raw: RawReceipt = serde_json::from_value(value).map_err(|e| AppError::ExtractionParse {
        message: e.to_string(),
    })?;

    let purchase_date = match &raw.purchase_date {
        Value::String(s) => parse_date(s).ok_or_else(|| AppError::InvalidPurchaseDate {
            raw: Some(s.clone()),
        })?,
        Value::Null => return Err(AppError::InvalidPurchaseDate { raw: None }),
        other => {
            return Err(AppError::InvalidPurchaseDate {
                raw: Some(other.to_string()),
            })
        }
    };

    let store_name = text_value(&raw.store_name).unwrap_or_else(|| UNKNOWN_STORE.to_string());
    let total_amount = amount_value(&raw.total_amount, "totalAmount").unwrap_or(0.0);

    let mut items = Vec::new();
    for (index, item) in raw.items.unwrap_or_default().into_iter().enumerate() {
        let Some(name) = text_value(&item.name) else {
            tracing::debug!(index, "Skipping extracted item without a name");
            continue;
        };

        items.push(ExtractedItem {
            name,
            quantity: quantity_value(&item.quantity),
            price: amount_value(&item.price, "price").unwrap_or(0.0),
        });
    }

    Ok(ExtractedReceipt {
        store_name,
        purchase_date,
        total_amount,
        items,
    })
}

/// Pull the JSON body out of a reply, dropping any markdown fence around it
fn strip_code_fences(reply: &str) -> &str {
    if let Some(body) = CODE_FENCE.captures(reply).and_then(|c| c.get(1)) {
        return body.as_str().trim();
    }

    // Prose around a bare object
    match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => reply.trim(),
    }
}

fn text_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Numbers as numbers or as strings such as `"$12.99"`, `"1,234.50"`, `"12,99"`
fn amount_value(value: &Value, field: &str) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        Value::Null => return None,
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Some(v),
        _ => {
            tracing::warn!(field, value = %value, "Unreadable amount in extraction, defaulting");
            None
        }
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();

    if kept.is_empty() {
        return None;
    }

    // A lone comma followed by one or two digits is a decimal separator
    let decimal_comma = !kept.contains('.')
        && kept.matches(',').count() == 1
        && kept
            .rsplit_once(',')
            .map(|(_, tail)| (1..=2).contains(&tail.len()))
            .unwrap_or(false);

    let normalized = if decimal_comma {
        kept.replacen(',', ".", 1)
    } else {
        kept.replace(',', "")
    };

    normalized.parse().ok()
}

fn quantity_value(value: &Value) -> i32 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    };

    match parsed {
        Some(q) if q.is_finite() && q.round() >= 1.0 => q.round().min(i32::MAX as f64) as i32,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockChatClient;
    use crate::ocr::MockOcr;
    use chrono::TimeZone;

    #[test]
    fn test_fenced_reply_parses() {
        let reply = "```json\n{\"storeName\":\"Shop\",\"purchaseDate\":\"2024-01-15\",\"totalAmount\":9.5,\"items\":[]}\n```";
        let receipt = parse_extraction(reply).unwrap();

        assert_eq!(receipt.store_name, "Shop");
        assert_eq!(receipt.purchase_date, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
        assert_eq!(receipt.total_amount, 9.5);
        assert!(receipt.items.is_empty());
    }

    #[test]
    fn test_unfenced_and_prose_wrapped_reply() {
        let plain = r#"{"storeName":"A","purchaseDate":"2024-02-01T10:30:00"}"#;
        assert_eq!(parse_extraction(plain).unwrap().store_name, "A");

        let chatty = r#"Here is the data: {"storeName":"B","purchaseDate":"2024-02-01"} Hope this helps!"#;
        assert_eq!(parse_extraction(chatty).unwrap().store_name, "B");
    }

    #[test]
    fn test_missing_fields_default() {
        let reply = r#"{"purchaseDate":"2024-03-01","items":[{"name":"Eggs"},{"name":"Tea","quantity":null,"price":"2.40"}]}"#;
        let receipt = parse_extraction(reply).unwrap();

        assert_eq!(receipt.store_name, UNKNOWN_STORE);
        assert_eq!(receipt.total_amount, 0.0);
        assert_eq!(
            receipt.items,
            vec![
                ExtractedItem { name: "Eggs".into(), quantity: 1, price: 0.0 },
                ExtractedItem { name: "Tea".into(), quantity: 1, price: 2.40 },
            ]
        );
    }

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(parse_amount("$12.99"), Some(12.99));
        assert_eq!(parse_amount("1,234.50"), Some(1234.50));
        assert_eq!(parse_amount("12,99 €"), Some(12.99));
        assert_eq!(parse_amount("1,234"), Some(1234.0));
        assert_eq!(parse_amount("-3.00"), Some(-3.0));
        assert_eq!(parse_amount("free"), None);

        assert_eq!(quantity_value(&serde_json::json!(2.6)), 3);
        assert_eq!(quantity_value(&serde_json::json!(0)), 1);
        assert_eq!(quantity_value(&serde_json::json!("4")), 4);
        assert_eq!(quantity_value(&serde_json::json!(true)), 1);
    }

    #[test]
    fn test_nameless_items_skipped() {
        let reply = r#"{"purchaseDate":"2024-03-01","items":[{"price":1},{"name":"  "},{"name":"Soap","price":3}]}"#;
        let receipt = parse_extraction(reply).unwrap();
        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.items[0].name, "Soap");
    }

    #[test]
    fn test_invalid_dates_rejected() {
        for reply in [
            r#"{"storeName":"A"}"#,
            r#"{"storeName":"A","purchaseDate":null}"#,
            r#"{"storeName":"A","purchaseDate":"2024-02-30"}"#,
            r#"{"storeName":"A","purchaseDate":"last tuesday"}"#,
            r#"{"storeName":"A","purchaseDate":20240101}"#,
        ] {
            let err = parse_extraction(reply).unwrap_err();
            assert!(matches!(err, AppError::InvalidPurchaseDate { .. }), "reply {}", reply);
        }
    }

    #[test]
    fn test_garbage_is_parse_error() {
        for reply in ["I could not read this receipt.", "```json\n[1, 2]\n```", ""] {
            let err = parse_extraction(reply).unwrap_err();
            assert!(matches!(err, AppError::ExtractionParse { .. }), "reply {:?}", reply);
        }
    }

    #[test]
    fn test_prompt_embeds_ocr_text() {
        let prompt = build_prompt("TOTAL 12.00");
        assert!(prompt.contains("OCR TEXT:\nTOTAL 12.00\n"));
        assert!(prompt.contains("\"purchaseDate\": null"));
        assert!(prompt.contains("Respond ONLY with a valid JSON object"));
    }

    #[tokio::test]
    async fn test_extractor_with_mocks() {
        let extractor = ReceiptExtractor::new(
            Arc::new(MockOcr::default()),
            Arc::new(MockChatClient::default()),
        );

        let receipt = extractor.extract(Path::new("receipt.png")).await.unwrap();
        assert_eq!(receipt.store_name, "Corner Grocer");
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(receipt.items[0].quantity, 2);
    }
}
