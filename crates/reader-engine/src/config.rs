use std::env;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

/// Runtime settings resolved from the environment, optionally overridden by
/// command-line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub analysis_model: Option<String>,
    pub image_model: Option<String>,
}

impl ReaderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            api_base: read("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key: API_KEY_VARS.iter().find_map(|key| read(*key)),
            analysis_model: read("READER_ANALYSIS_MODEL"),
            image_model: read("READER_IMAGE_MODEL"),
        }
    }

    pub fn with_analysis_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|value| !value.trim().is_empty()) {
            self.analysis_model = Some(model);
        }
        self
    }

    pub fn with_image_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|value| !value.trim().is_empty()) {
            self.image_model = Some(model);
        }
        self
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
