use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target language for translation and analysis.
///
/// `label()` is the native name sent verbatim to the model; `code()` is the
/// short tag shown next to the language picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "Español")]
    Spanish,
    #[serde(rename = "English")]
    English,
    #[serde(rename = "Français")]
    French,
    #[serde(rename = "Deutsch")]
    German,
    #[serde(rename = "Italiano")]
    Italian,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Spanish,
        Language::English,
        Language::French,
        Language::German,
        Language::Italian,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Language::Spanish => "Español",
            Language::English => "English",
            Language::French => "Français",
            Language::German => "Deutsch",
            Language::Italian => "Italiano",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::Spanish => "ESP",
            Language::English => "ENG",
            Language::French => "FRA",
            Language::German => "DEU",
            Language::Italian => "ITA",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Language::Spanish => &["español", "espanol", "spanish", "esp", "es"],
            Language::English => &["english", "eng", "en"],
            Language::French => &["français", "francais", "french", "fra", "fr"],
            Language::German => &["deutsch", "german", "deu", "de"],
            Language::Italian => &["italiano", "italian", "ita", "it"],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase();
        Language::ALL
            .into_iter()
            .find(|language| language.aliases().contains(&normalized.as_str()))
            .ok_or_else(|| {
                let known = Language::ALL
                    .iter()
                    .map(|language| language.label())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Unknown language '{}'. Expected one of: {known}.", raw.trim())
            })
    }
}
