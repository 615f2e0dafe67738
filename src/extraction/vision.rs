//! Vision-language API client for delivery-note extraction.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Extraction, ExtractionError, ImageExtractor, parse_extraction};
use crate::config::AppConfig;

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
const BODY_SNIPPET_CHARS: usize = 200;

const EXTRACTION_PROMPT: &str = r#"Analyze this delivery note/paperwork image and extract equipment movement information.

Look for:
1. Customer name or delivery location
2. Equipment types (pallets, cages, dollies, stillages, containers)
3. Quantities of each equipment type
4. Whether equipment is being delivered TO customer (IN) or collected FROM customer (OUT)
5. Date/time if visible
6. Any other relevant notes

Return the information in this exact JSON format:
{
    "customer_name": "string",
    "movements": [
        {
            "equipment_type": "pallet|cage|dolly|stillage|container|other",
            "quantity": number,
            "direction": "in|out"
        }
    ],
    "date": "YYYY-MM-DD or null",
    "notes": "any additional context",
    "confidence": 0.0-1.0
}

If you cannot extract information confidently, set confidence below 0.7 and explain why in notes."#;

/// Extractor backed by a hosted messages API.
#[derive(Clone)]
pub struct VisionExtractor {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl VisionExtractor {
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("equipment-ledger/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ExtractionError> {
        Self::new(
            config.vision_api_key.clone(),
            config.vision_api_base.clone(),
            config.vision_model.clone(),
            Duration::from_secs(config.vision_timeout_seconds),
        )
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl ImageExtractor for VisionExtractor {
    async fn extract(&self, image: &[u8], media_type: &str) -> Result<Extraction, ExtractionError> {
        let api_key = self.api_key.as_deref().ok_or(ExtractionError::NotConfigured)?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentBlock::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type,
                            data: general_purpose::STANDARD.encode(image),
                        },
                    },
                    ContentBlock::Text {
                        text: EXTRACTION_PROMPT,
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(BODY_SNIPPET_CHARS)
                .collect();
            warn!(status, "vision API rejected extraction request");
            return Err(ExtractionError::Upstream { status, body });
        }

        let body: MessagesResponse = response.json().await?;
        let text = body
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| ExtractionError::Malformed("response has no text content".into()))?;

        debug!(chars = text.len(), "vision API responded");
        parse_extraction(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_to_messages_shape() {
        let request = MessagesRequest {
            model: "m",
            max_tokens: 10,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentBlock::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: "image/png",
                            data: "AAAA".into(),
                        },
                    },
                    ContentBlock::Text { text: "hi" },
                ],
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["content"][0]["type"], "image");
        assert_eq!(
            json["messages"][0]["content"][0]["source"]["media_type"],
            "image/png"
        );
        assert_eq!(json["messages"][0]["content"][1]["type"], "text");
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let extractor = VisionExtractor::new(
            Some("  ".into()),
            "http://127.0.0.1:9",
            "m",
            Duration::from_secs(1),
        )
        .unwrap();
        let result = extractor.extract(b"img", "image/jpeg").await;
        assert!(matches!(result, Err(ExtractionError::NotConfigured)));
    }
}
