use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use reader_contracts::{AnalysisResult, ImageHandle, Language, ReaderError, VisualDetails};
use sha2::{Digest, Sha256};

use crate::analysis::AnalysisClient;
use crate::synthesis::ImageSynthesisClient;
use crate::transport::truncate_text;

const DRYRUN_PROMPT_MAX_CHARS: usize = 160;

/// Deterministic offline stand-in for the analysis model.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryrunAnalysisClient;

/// Deterministic offline stand-in for the image model: a flat 16:9 PNG whose
/// colour is derived from the prompt.
#[derive(Debug, Clone, Copy)]
pub struct DryrunImageClient {
    width: u32,
    height: u32,
}

impl Default for DryrunImageClient {
    fn default() -> Self {
        Self {
            width: 320,
            height: 180,
        }
    }
}

impl DryrunAnalysisClient {
    fn describe(original_text: String, target_language: Language) -> AnalysisResult {
        let excerpt = truncate_text(original_text.trim(), DRYRUN_PROMPT_MAX_CHARS);
        AnalysisResult {
            translated_text: format!("[{}] {}", target_language.code(), original_text.trim()),
            source_language: "Undetermined (dry run)".to_string(),
            visual_details: VisualDetails {
                characters: "Unnamed figures implied by the passage".to_string(),
                gestures: "Still, expectant poses".to_string(),
                environment: "A setting sketched from the passage itself".to_string(),
                lighting: "Soft volumetric light".to_string(),
                mood: "Contemplative".to_string(),
            },
            image_prompt: format!(
                "Cinematic still of a literary scene: {excerpt} [dryrun-{}]",
                short_id(&excerpt)
            ),
            original_text,
        }
    }
}

impl AnalysisClient for DryrunAnalysisClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn analyze_from_image(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        target_language: Language,
    ) -> Result<AnalysisResult, ReaderError> {
        if image_bytes.is_empty() {
            return Err(ReaderError::EmptyResponse);
        }
        let description = format!(
            "An image of {} bytes ({mime_type}) with no legible text.",
            image_bytes.len()
        );
        Ok(Self::describe(description, target_language))
    }

    fn analyze_from_text(
        &self,
        raw_text: &str,
        target_language: Language,
    ) -> Result<AnalysisResult, ReaderError> {
        if raw_text.trim().is_empty() {
            return Err(ReaderError::EmptyResponse);
        }
        Ok(Self::describe(raw_text.to_string(), target_language))
    }
}

impl DryrunImageClient {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

impl ImageSynthesisClient for DryrunImageClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, prompt: &str) -> Result<ImageHandle, ReaderError> {
        if prompt.trim().is_empty() {
            return Err(ReaderError::ImageSynthesis("image prompt is empty".to_string()));
        }
        let (r, g, b) = color_from_prompt(prompt);
        let image = RgbImage::from_pixel(self.width, self.height, Rgb([r, g, b]));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|err| ReaderError::ImageSynthesis(format!("PNG encode failed: {err}")))?;
        Ok(ImageHandle::png(out.into_inner()))
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.trim().as_bytes());
    (digest[0], digest[1], digest[2])
}

fn short_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..4])
}
