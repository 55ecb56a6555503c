use std::io::Cursor;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;
use reader_contracts::{ImageHandle, ReaderError};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::transport::{block_reason, error_chain_text, ContentTransport};

pub const STYLE_PREAMBLE: &str =
    "High-fidelity cinematic literary masterpiece, atmospheric, detailed, soft volumetric lighting";
pub const ASPECT_RATIO: &str = "16:9";
pub const IMAGE_SIZE: &str = "1K";

/// Renders one illustration for an analysis prompt.
pub trait ImageSynthesisClient: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, prompt: &str) -> Result<ImageHandle, ReaderError>;
}

pub struct GeminiImageClient {
    transport: Arc<dyn ContentTransport>,
    model: String,
}

struct InlineImage {
    bytes: Vec<u8>,
    mime_type: Option<String>,
}

impl GeminiImageClient {
    pub fn new(transport: Arc<dyn ContentTransport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn build_payload(prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("{STYLE_PREAMBLE}: {}", prompt.trim()) }],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {
                    "aspectRatio": ASPECT_RATIO,
                    "imageSize": IMAGE_SIZE,
                },
            },
        })
    }

    fn first_inline_image(response: &Value) -> Result<Option<InlineImage>, ReaderError> {
        let parts = response
            .get("candidates")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|candidate| candidate.pointer("/content/parts").and_then(Value::as_array))
            .flatten();

        for part in parts {
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let bytes = BASE64.decode(data.as_bytes()).map_err(|err| {
                ReaderError::ImageSynthesis(format!("image base64 decode failed: {err}"))
            })?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .map(str::to_string);
            return Ok(Some(InlineImage { bytes, mime_type }));
        }
        Ok(None)
    }
}

/// Checks the payload decodes and re-encodes anything that is not PNG.
pub(crate) fn ensure_png(bytes: Vec<u8>) -> Result<Vec<u8>, ReaderError> {
    let format = image::guess_format(&bytes)
        .map_err(|err| ReaderError::ImageSynthesis(format!("payload is not image data: {err}")))?;
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .map_err(|err| ReaderError::ImageSynthesis(format!("image decode failed: {err}")))?;
    if format == ImageFormat::Png {
        return Ok(bytes);
    }
    let mut out = Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| ReaderError::ImageSynthesis(format!("PNG encode failed: {err}")))?;
    Ok(out.into_inner())
}

impl ImageSynthesisClient for GeminiImageClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, prompt: &str) -> Result<ImageHandle, ReaderError> {
        if prompt.trim().is_empty() {
            return Err(ReaderError::ImageSynthesis("image prompt is empty".to_string()));
        }
        let payload = Self::build_payload(prompt);
        let response = self
            .transport
            .generate_content(&self.model, &payload)
            .map_err(|err| ReaderError::ImageSynthesis(error_chain_text(&err, 512)))?;

        let Some(image) = Self::first_inline_image(&response)? else {
            let detail = block_reason(&response)
                .map(|reason| format!("response blocked ({reason})"))
                .unwrap_or_else(|| "response contained no inline image".to_string());
            warn!(model = %self.model, %detail, "image synthesis returned no image");
            return Err(ReaderError::ImageSynthesis(detail));
        };
        debug!(
            model = %self.model,
            bytes = image.bytes.len(),
            mime_type = image.mime_type.as_deref().unwrap_or("unknown"),
            "image part received"
        );
        Ok(ImageHandle::png(ensure_png(image.bytes)?))
    }
}
