use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ReaderError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualDetails {
    pub characters: String,
    pub gestures: String,
    pub environment: String,
    pub lighting: String,
    pub mood: String,
}

/// Structured output of one analysis call.
///
/// Model answers reach this type through [`AnalysisDraft::into_result`], which
/// rejects missing or blank fields. Clients that build it directly must keep
/// every field non-blank as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub original_text: String,
    pub translated_text: String,
    pub source_language: String,
    pub visual_details: VisualDetails,
    pub image_prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VisualDetailsDraft {
    pub characters: Option<String>,
    pub gestures: Option<String>,
    pub environment: Option<String>,
    pub lighting: Option<String>,
    pub mood: Option<String>,
}

/// Lenient wire form of the model's JSON answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDraft {
    pub original_text: Option<String>,
    pub translated_text: Option<String>,
    pub source_language: Option<String>,
    pub visual_details: Option<VisualDetailsDraft>,
    pub image_prompt: Option<String>,
}

impl AnalysisDraft {
    pub fn from_json_str(raw: &str) -> Result<Self, ReaderError> {
        let draft: AnalysisDraft = serde_json::from_str(raw.trim())?;
        Ok(draft)
    }

    pub fn into_result(self) -> Result<AnalysisResult, ReaderError> {
        let details = self
            .visual_details
            .ok_or_else(|| missing_field("visualDetails"))?;
        Ok(AnalysisResult {
            original_text: required(self.original_text, "originalText")?,
            translated_text: required(self.translated_text, "translatedText")?,
            source_language: required(self.source_language, "sourceLanguage")?,
            visual_details: VisualDetails {
                characters: required(details.characters, "visualDetails.characters")?,
                gestures: required(details.gestures, "visualDetails.gestures")?,
                environment: required(details.environment, "visualDetails.environment")?,
                lighting: required(details.lighting, "visualDetails.lighting")?,
                mood: required(details.mood, "visualDetails.mood")?,
            },
            image_prompt: required(self.image_prompt, "imagePrompt")?,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ReaderError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(ReaderError::SchemaValidation(format!(
            "field `{field}` is empty"
        ))),
        None => Err(missing_field(field)),
    }
}

fn missing_field(field: &str) -> ReaderError {
    ReaderError::SchemaValidation(format!("missing required field `{field}`"))
}

/// Response schema requested from the model for every analysis call.
pub fn analysis_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "originalText": { "type": "STRING" },
            "translatedText": { "type": "STRING" },
            "sourceLanguage": { "type": "STRING" },
            "visualDetails": {
                "type": "OBJECT",
                "properties": {
                    "characters": { "type": "STRING" },
                    "gestures": { "type": "STRING" },
                    "environment": { "type": "STRING" },
                    "lighting": { "type": "STRING" },
                    "mood": { "type": "STRING" }
                },
                "required": ["characters", "gestures", "environment", "lighting", "mood"]
            },
            "imagePrompt": { "type": "STRING" }
        },
        "required": ["originalText", "translatedText", "sourceLanguage", "visualDetails", "imagePrompt"]
    })
}
