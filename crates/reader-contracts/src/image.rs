use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::ReaderError;

pub const PNG_MIME: &str = "image/png";

/// A rendered illustration, always PNG.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageHandle {
    bytes: Vec<u8>,
}

impl ImageHandle {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn mime_type(&self) -> &'static str {
        PNG_MIME
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// `data:image/png;base64,...`, directly usable as an image source.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", PNG_MIME, self.base64())
    }

    pub fn from_data_uri(uri: &str) -> Result<Self, ReaderError> {
        let payload = uri
            .trim()
            .strip_prefix("data:image/png;base64,")
            .ok_or_else(|| ReaderError::ImageSynthesis("not a PNG data URI".to_string()))?;
        let bytes = BASE64
            .decode(payload.as_bytes())
            .map_err(|err| ReaderError::ImageSynthesis(format!("invalid base64 payload: {err}")))?;
        Ok(Self::png(bytes))
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("mime_type", &PNG_MIME)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}
