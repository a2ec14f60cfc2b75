//! Client for a vision-capable model behind the Anthropic Messages API.
//!
//! The client sends one screenshot plus an instruction and returns the
//! model's free text. Turning that text into product rows lives in
//! [`parse_first_json_array`] and [`looks_empty`].

use std::io::Cursor;
use std::time::Duration;

use base64::Engine as _;
use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};
use pricecrawl_core::AppConfig;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::VisionError;
use crate::retry::retry_linear;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Longest edge the model accepts without server-side downscaling.
pub const MAX_IMAGE_EDGE: u32 = 1568;
/// Pixel budget per image.
pub const MAX_IMAGE_PIXELS: u64 = 1_150_000;

/// Phrases a model uses when the screenshot shows no product grid.
const EMPTY_PAGE_PHRASES: &[&str] = &[
    "no products",
    "no product listings",
    "no items",
    "login required",
    "log in to",
    "sign in to",
    "cookie consent",
    "cookie banner",
    "page is empty",
    "empty page",
    "blank page",
];

pub const PRODUCT_INSTRUCTION: &str = "This is a screenshot of a South African grocery \
retailer's product listing page. Extract every product tile that shows a price. Respond with \
ONLY a JSON array, no prose, where each element is \
{\"name\": string, \"price\": number in rands, \"unit\": string or null, \"category\": string or null}. \
Use the current selling price, not a crossed-out price. If the page shows no products \
(for example a login wall, cookie consent overlay or empty results), respond with an empty \
array [] and say why.";

#[derive(Clone)]
pub struct VisionClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_attempts: u32,
    backoff: Duration,
}

impl std::fmt::Debug for VisionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl VisionClient {
    /// # Errors
    ///
    /// Returns [`VisionError::Http`] if the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout_secs: u64,
    ) -> Result<Self, VisionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("pricecrawl/0.1")
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        })
    }

    /// `None` when no API key is configured, which disables vision. The retry
    /// policy is left at its defaults until [`VisionClient::with_retry`].
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::Http`] if the HTTP client cannot be built.
    pub fn from_app_config(config: &AppConfig) -> Result<Option<Self>, VisionError> {
        let Some(key) = config.vision_api_key.as_deref() else {
            return Ok(None);
        };
        let client = Self::with_base_url(
            key,
            &config.vision_model,
            &config.vision_base_url,
            config.vision_timeout_secs,
        )?;
        Ok(Some(client))
    }

    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.backoff = backoff;
        self
    }

    /// Sends `png` and `instruction`, retrying transient failures with
    /// linear backoff.
    ///
    /// # Errors
    ///
    /// Returns the last [`VisionError`] once attempts are exhausted, or the
    /// first non-retryable one.
    pub async fn describe(&self, png: &[u8], instruction: &str) -> Result<String, VisionError> {
        let image = downsize_png(png)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image);
        retry_linear(self.max_attempts, self.backoff, || {
            self.send_once(&encoded, instruction)
        })
        .await
    }

    async fn send_once(&self, image_b64: &str, instruction: &str) -> Result<String, VisionError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/png",
                            "data": image_b64,
                        }
                    },
                    { "type": "text", "text": instruction }
                ]
            }]
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(VisionError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))?;
        Ok(parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Re-encodes `png` so it fits within [`MAX_IMAGE_EDGE`] and
/// [`MAX_IMAGE_PIXELS`]. Images already inside both bounds are returned as-is.
///
/// # Errors
///
/// Returns [`VisionError::Image`] if the bytes are not a decodable image.
pub fn downsize_png(png: &[u8]) -> Result<Vec<u8>, VisionError> {
    let img = image::load_from_memory(png).map_err(|e| VisionError::Image(e.to_string()))?;
    let (width, height) = img.dimensions();
    let Some((target_w, target_h)) = target_dimensions(width, height) else {
        return Ok(png.to_vec());
    };

    let resized = img.resize(target_w, target_h, FilterType::Triangle);
    let mut out = Vec::new();
    resized
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| VisionError::Image(e.to_string()))?;
    tracing::debug!(width, height, target_w, target_h, "downsized screenshot");
    Ok(out)
}

/// Bounding box for a downscale, or `None` when no scaling is needed.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn target_dimensions(width: u32, height: u32) -> Option<(u32, u32)> {
    let pixels = u64::from(width) * u64::from(height);
    if width.max(height) <= MAX_IMAGE_EDGE && pixels <= MAX_IMAGE_PIXELS {
        return None;
    }
    let edge_scale = f64::from(MAX_IMAGE_EDGE) / f64::from(width.max(height));
    let pixel_scale = (MAX_IMAGE_PIXELS as f64 / pixels as f64).sqrt();
    let scale = edge_scale.min(pixel_scale).min(1.0);
    let w = ((f64::from(width) * scale).floor() as u32).max(1);
    let h = ((f64::from(height) * scale).floor() as u32).max(1);
    Some((w, h))
}

/// The first well-formed JSON array in `text`, skipping any prose around it.
#[must_use]
pub fn parse_first_json_array(text: &str) -> Option<Vec<Value>> {
    text.char_indices()
        .filter(|(_, c)| *c == '[')
        .find_map(|(i, _)| {
            let mut stream = serde_json::Deserializer::from_str(&text[i..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(Value::Array(items))) => Some(items),
                _ => None,
            }
        })
}

/// `true` when the model described a page with nothing to extract.
#[must_use]
pub fn looks_empty(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.trim().is_empty() || EMPTY_PAGE_PHRASES.iter().any(|p| lower.contains(p))
}
