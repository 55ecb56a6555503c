use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reader_contracts::{
    analysis_response_schema, AnalysisDraft, AnalysisResult, Language, ReaderError,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::transport::{
    block_reason, candidate_text, error_chain_text, mentions_policy_block, ContentTransport,
};

const IMAGE_THINKING_BUDGET: u32 = 4000;
const TEXT_THINKING_BUDGET: u32 = 2000;

/// Turns a passage (or a photographed page) into an [`AnalysisResult`].
pub trait AnalysisClient: Send + Sync {
    fn name(&self) -> &str;

    fn analyze_from_image(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        target_language: Language,
    ) -> Result<AnalysisResult, ReaderError>;

    fn analyze_from_text(
        &self,
        raw_text: &str,
        target_language: Language,
    ) -> Result<AnalysisResult, ReaderError>;
}

pub struct GeminiAnalysisClient {
    transport: Arc<dyn ContentTransport>,
    model: String,
}

impl GeminiAnalysisClient {
    pub fn new(transport: Arc<dyn ContentTransport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn image_system_instruction(target_language: Language) -> String {
        format!(
            "You are \"Insight's Reader\", a world-class literary scholar and visual analyst.\n\
Your task is to analyze images of text such as book pages or handwritten letters.\n\n\
STRICT RULES:\n\
1. OCR: Transcribe all visible text verbatim.\n\
2. VISUAL FALLBACK: If NO text is readable or present, write a detailed description of the \
visual scene in the \"originalText\" field instead (e.g. \"An image of a candle illuminating \
an old leather book\").\n\
3. TRANSLATION: Translate the transcription or description into {language}.\n\
4. JSON: Return ONLY a valid JSON object matching the provided schema, with every field filled.\n\
5. NEVER FAIL: Do not use placeholders if you can describe the scene. Do not return an empty response.",
            language = target_language.label()
        )
    }

    fn image_user_prompt(target_language: Language) -> String {
        format!(
            "Please analyze this image.\n\
- If there is text, transcribe it.\n\
- If there is no text, describe what you see visually.\n\
- Translate all analysis into {language}.\n\
- Generate a high-quality cinematic prompt in English for the \"imagePrompt\" field.",
            language = target_language.label()
        )
    }

    fn text_system_instruction(target_language: Language) -> String {
        format!(
            "You are \"Insight's Reader\", an elite literary scholar.\n\
Translate the passage into literary {language} and analyze its visual properties.\n\
Return JSON matching the provided schema, with every field filled.",
            language = target_language.label()
        )
    }

    fn text_user_prompt(raw_text: &str, target_language: Language) -> String {
        format!(
            "Analyze: \"{raw_text}\"\n\
1. Translation: {language}.\n\
2. Details: Mood/Setting in {language}.\n\
3. Prompt: Cinematic English generation prompt.",
            language = target_language.label()
        )
    }

    fn build_payload(system_instruction: String, parts: Vec<Value>, thinking_budget: u32) -> Value {
        json!({
            "systemInstruction": {
                "parts": [{ "text": system_instruction }],
            },
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": analysis_response_schema(),
                "thinkingConfig": { "thinkingBudget": thinking_budget },
            },
        })
    }

    pub(crate) fn image_payload(
        image_bytes: &[u8],
        mime_type: &str,
        target_language: Language,
    ) -> Value {
        Self::build_payload(
            Self::image_system_instruction(target_language),
            vec![
                json!({
                    "inlineData": {
                        "mimeType": mime_type,
                        "data": BASE64.encode(image_bytes),
                    }
                }),
                json!({ "text": Self::image_user_prompt(target_language) }),
            ],
            IMAGE_THINKING_BUDGET,
        )
    }

    pub(crate) fn text_payload(raw_text: &str, target_language: Language) -> Value {
        Self::build_payload(
            Self::text_system_instruction(target_language),
            vec![json!({ "text": Self::text_user_prompt(raw_text, target_language) })],
            TEXT_THINKING_BUDGET,
        )
    }

    fn request_draft(&self, payload: &Value) -> Result<AnalysisDraft, ReaderError> {
        let response = self
            .transport
            .generate_content(&self.model, payload)
            .map_err(|err| {
                let message = error_chain_text(&err, 512);
                warn!(model = %self.model, error = %message, "analysis request failed");
                if mentions_policy_block(&message) {
                    ReaderError::ContentBlocked
                } else {
                    ReaderError::transport(message)
                }
            })?;

        if let Some(reason) = block_reason(&response) {
            warn!(model = %self.model, %reason, "analysis blocked by content policy");
            return Err(ReaderError::ContentBlocked);
        }

        let text = candidate_text(&response);
        if text.trim().is_empty() {
            return Err(ReaderError::EmptyResponse);
        }
        debug!(model = %self.model, chars = text.len(), "analysis response received");
        AnalysisDraft::from_json_str(&text)
    }
}

impl AnalysisClient for GeminiAnalysisClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn analyze_from_image(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        target_language: Language,
    ) -> Result<AnalysisResult, ReaderError> {
        let payload = Self::image_payload(image_bytes, mime_type, target_language);
        self.request_draft(&payload)?.into_result()
    }

    fn analyze_from_text(
        &self,
        raw_text: &str,
        target_language: Language,
    ) -> Result<AnalysisResult, ReaderError> {
        let payload = Self::text_payload(raw_text, target_language);
        let mut draft = self.request_draft(&payload)?;
        draft.original_text = Some(raw_text.to_string());
        draft.into_result()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::bail;
    use reader_contracts::{ErrorKind, Language, ReaderError};
    use serde_json::{json, Value};

    use super::{AnalysisClient, GeminiAnalysisClient};
    use crate::transport::ContentTransport;

    enum Reply {
        Json(Value),
        Fail(&'static str),
    }

    struct ScriptedTransport {
        reply: Reply,
        seen: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedTransport {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl ContentTransport for ScriptedTransport {
        fn generate_content(&self, model: &str, payload: &Value) -> anyhow::Result<Value> {
            self.seen
                .lock()
                .unwrap()
                .push((model.to_string(), payload.clone()));
            match &self.reply {
                Reply::Json(value) => Ok(value.clone()),
                Reply::Fail(message) => bail!("{message}"),
            }
        }
    }

    fn answer_text(original: &str) -> String {
        json!({
            "originalText": original,
            "translatedText": "Era una noche oscura y tormentosa.",
            "sourceLanguage": "English",
            "visualDetails": {
                "characters": "a lone traveller",
                "gestures": "clutching a coat",
                "environment": "a moor",
                "lighting": "lightning",
                "mood": "ominous"
            },
            "imagePrompt": "A lone traveller on a storm-lashed moor at night"
        })
        .to_string()
    }

    fn model_reply(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }]
        })
    }

    fn client(transport: Arc<ScriptedTransport>) -> GeminiAnalysisClient {
        GeminiAnalysisClient::new(transport, "gemini-3-pro-preview")
    }

    #[test]
    fn text_analysis_overwrites_echoed_original() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new(Reply::Json(model_reply(&answer_text(
            "it was a dark & stormy nite",
        ))));
        let result = client(Arc::clone(&transport))
            .analyze_from_text("It was a dark and stormy night.", Language::Spanish)?;
        assert_eq!(result.original_text, "It was a dark and stormy night.");
        assert_eq!(result.visual_details.mood, "ominous");
        Ok(())
    }

    #[test]
    fn text_analysis_tolerates_omitted_original() -> anyhow::Result<()> {
        let mut answer: Value = serde_json::from_str(&answer_text("x"))?;
        if let Some(object) = answer.as_object_mut() {
            object.remove("originalText");
        }
        let transport = ScriptedTransport::new(Reply::Json(model_reply(&answer.to_string())));
        let result = client(transport).analyze_from_text("Call me Ishmael.", Language::English)?;
        assert_eq!(result.original_text, "Call me Ishmael.");
        Ok(())
    }

    #[test]
    fn text_request_carries_schema_language_and_budget() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new(Reply::Json(model_reply(&answer_text("x"))));
        client(Arc::clone(&transport)).analyze_from_text("Call me Ishmael.", Language::German)?;

        let seen = transport.seen.lock().unwrap();
        let (model, payload) = &seen[0];
        assert_eq!(model, "gemini-3-pro-preview");
        let config = &payload["generationConfig"];
        assert_eq!(config["responseMimeType"], json!("application/json"));
        assert_eq!(config["thinkingConfig"]["thinkingBudget"], json!(2000));
        assert_eq!(config["responseSchema"]["required"].as_array().map(Vec::len), Some(5));
        let prompt = payload["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default();
        assert!(prompt.contains("Call me Ishmael."));
        assert!(prompt.contains("Deutsch"));
        let system = payload["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default();
        assert!(system.contains("literary Deutsch"));
        Ok(())
    }

    #[test]
    fn image_request_sends_inline_data_before_prompt() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new(Reply::Json(model_reply(&answer_text(
            "An image of a candle illuminating an old leather book",
        ))));
        let result = client(Arc::clone(&transport)).analyze_from_image(
            b"jpeg-bytes",
            "image/jpeg",
            Language::French,
        )?;
        assert_eq!(
            result.original_text,
            "An image of a candle illuminating an old leather book"
        );

        let seen = transport.seen.lock().unwrap();
        let parts = &seen[0].1["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("anBlZy1ieXRlcw=="));
        assert!(parts[1]["text"]
            .as_str()
            .is_some_and(|text| text.contains("Français")));
        assert_eq!(
            seen[0].1["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            json!(4000)
        );
        let system = seen[0].1["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default();
        assert!(system.contains("VISUAL FALLBACK"));
        Ok(())
    }

    #[test]
    fn image_analysis_requires_the_transcription() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new(Reply::Json(model_reply(&answer_text("  "))));
        let err = client(transport)
            .analyze_from_image(b"png", "image/png", Language::English)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaValidation);
        Ok(())
    }

    #[test]
    fn whitespace_reply_is_an_empty_response() {
        let transport = ScriptedTransport::new(Reply::Json(model_reply("  \n ")));
        let err = client(transport)
            .analyze_from_text("Call me Ishmael.", Language::English)
            .unwrap_err();
        assert_eq!(err, ReaderError::EmptyResponse);
    }

    #[test]
    fn prose_reply_is_a_schema_failure() {
        let transport = ScriptedTransport::new(Reply::Json(model_reply("I'd love to help!")));
        let err = client(transport)
            .analyze_from_text("Call me Ishmael.", Language::English)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaValidation);
    }

    #[test]
    fn prompt_block_is_content_blocked() {
        let transport = ScriptedTransport::new(Reply::Json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })));
        let err = client(transport)
            .analyze_from_text("Call me Ishmael.", Language::English)
            .unwrap_err();
        assert_eq!(err, ReaderError::ContentBlocked);
    }

    #[test]
    fn safety_marker_in_failure_text_is_content_blocked() {
        let transport = ScriptedTransport::new(Reply::Fail(
            "Gemini request failed (400): Request blocked due to Safety settings",
        ));
        let err = client(transport)
            .analyze_from_text("Call me Ishmael.", Language::English)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContentBlocked);
    }

    #[test]
    fn other_failures_propagate_their_message() {
        let transport = ScriptedTransport::new(Reply::Fail("Gemini request failed (503): overloaded"));
        let err = client(transport)
            .analyze_from_text("Call me Ishmael.", Language::English)
            .unwrap_err();
        assert_eq!(
            err,
            ReaderError::Transport("Gemini request failed (503): overloaded".to_string())
        );
    }
}
