use serde::{Deserialize, Serialize};

/// Identifier of a spoken or written language (e.g. `ja-JP`).
///
/// Treated as opaque text, equality is exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocaleTag(pub String);

impl From<String> for LocaleTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LocaleTag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::ops::Deref for LocaleTag {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for LocaleTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl LocaleTag {
    /// Human readable name, used for track titles in the muxed output.
    /// Unknown tags fall back to the raw tag text.
    pub fn human_name(&self) -> String {
        match self.0.as_str() {
            "ar-ME" | "ar-SA" => "Arabic",
            "ca-ES" => "Catalan (Spain)",
            "de-DE" => "German (Germany)",
            "en-US" => "English (US)",
            "en-IN" => "English (India)",
            "es-419" | "es-LA" => "Spanish (Latin America)",
            "es-ES" => "Spanish (Spain)",
            "fr-FR" => "French (France)",
            "hi-IN" => "Hindi (India)",
            "id-ID" => "Indonesian (Indonesia)",
            "it-IT" => "Italian (Italy)",
            "ja-JP" => "Japanese (Japan)",
            "ko-KR" => "Korean (Korea)",
            "ms-MY" => "Malay (Malaysia)",
            "pl-PL" => "Polish (Poland)",
            "pt-BR" => "Portuguese (Brazil)",
            "pt-PT" => "Portuguese (Portugal)",
            "ru-RU" => "Russian (Russia)",
            "ta-IN" => "Tamil (India)",
            "te-IN" => "Telugu (India)",
            "th-TH" => "Thai (Thailand)",
            "tr-TR" => "Turkish (Turkey)",
            "vi-VN" => "Vietnamese (Vietnam)",
            "zh-CN" => "Chinese (China)",
            "zh-TW" => "Chinese (Taiwan)",
            other => return other.to_string(),
        }
        .to_string()
    }
}

/// Handle to a catalog series.
#[derive(Debug, Clone, Deserialize)]
pub struct SeriesRef {
    pub id: String,
    pub title: String,
}

/// Handle to one season of a series.
#[derive(Debug, Clone, Deserialize)]
pub struct SeasonRef {
    pub id: String,
    pub series_id: String,
    pub title: String,
    pub season_number: u32,
    /// Audio locales this season is available in.
    #[serde(default)]
    pub audio_locales: Vec<LocaleTag>,
}

/// Immutable handle to a catalog episode. Created by the resolver,
/// never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeRef {
    pub id: String,
    pub series_id: String,
    pub season_id: String,
    pub series_title: String,
    pub season_title: String,
    pub season_number: u32,
    /// Episode numbers are positive but may be non-contiguous.
    pub episode_number: u32,
    pub title: String,
    pub audio_locale: LocaleTag,
    /// Identifier used to fetch the stream manifest.
    pub stream_id: String,
}

/// Handle to a subtitle file of one stream.
#[derive(Debug, Clone, Deserialize)]
pub struct SubtitleRef {
    pub locale: LocaleTag,
    pub url: String,
    pub format: String,
}

/// What a catalog URL resolved to.
#[derive(Debug, Clone)]
pub enum MediaRef {
    Series(SeriesRef),
    Episode(EpisodeRef),
}
