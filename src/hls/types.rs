use serde::{Deserialize, Serialize};

use crate::catalog::types::{LocaleTag, SubtitleRef};

/// Video resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u64,
    pub height: u64,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One selectable entry of a master playlist: a concrete resolution of one
/// (audio locale, hardsub) stream, with its fully resolved media playlist url.
#[derive(Debug, Clone)]
pub struct Variant {
    pub resolution: Resolution,
    pub bandwidth: u64,
    pub fps: f64,
    pub audio_locale: LocaleTag,
    /// Subtitle burned into the video, if any.
    pub hardsub: Option<LocaleTag>,
    pub url: String,
}

/// Decryption key reference of a segment (`#EXT-X-KEY`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub url: String,
    /// Explicit 16-byte IV. When absent the key bytes double as the IV.
    pub iv: Option<[u8; 16]>,
}

/// One media segment of a variant. Segments form a contiguous `0..N`
/// sequence within their playlist.
#[derive(Debug, Clone)]
pub struct Segment {
    pub index: usize,
    pub url: String,
    /// The key announced at or before this segment. The parser carries the
    /// active key forward, so per-segment overrides are honored naturally.
    pub key: Option<SegmentKey>,
}

/// The parsed master playlist for one (episode, audio locale) pair.
#[derive(Debug, Clone)]
pub struct HlsManifest {
    pub audio_locale: LocaleTag,
    pub subtitles: Vec<SubtitleRef>,
    pub variants: Vec<Variant>,
}
