use crate::catalog::types::LocaleTag;
use crate::common::errors::{Error, Result};
use crate::hls::types::{HlsManifest, Resolution, Variant};

/// Requested resolution, as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionFilter {
    Best,
    Worst,
    Exact(Resolution),
}

impl std::fmt::Display for ResolutionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionFilter::Best => write!(f, "best"),
            ResolutionFilter::Worst => write!(f, "worst"),
            ResolutionFilter::Exact(r) => write!(f, "{}", r),
        }
    }
}

impl std::str::FromStr for ResolutionFilter {
    type Err = String;

    /// Accepts `best`, `worst`, `WIDTHxHEIGHT` (e.g. `1920x1080`) and the
    /// pixel abbreviations `1080p` / `720p` / `480p` / `360p` / `240p`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "best" => Ok(ResolutionFilter::Best),
            "worst" => Ok(ResolutionFilter::Worst),
            other => {
                if let Some(height) = other.strip_suffix('p') {
                    let height: u64 = height
                        .parse()
                        .map_err(|_| format!("'{}' is not a valid resolution", s))?;
                    let width = match height {
                        // 16:9 rounding would give 427, which the catalog
                        // does not serve.
                        240 => 428,
                        1080 | 720 | 480 | 360 => (height * 16).div_ceil(9),
                        _ => return Err(format!("'{}' is not a valid resolution", s)),
                    };
                    Ok(ResolutionFilter::Exact(Resolution { width, height }))
                } else if let Some((w, h)) = other.split_once('x') {
                    let width = w
                        .parse()
                        .map_err(|_| format!("'{}' is not a valid resolution", s))?;
                    let height = h
                        .parse()
                        .map_err(|_| format!("'{}' is not a valid resolution", s))?;
                    Ok(ResolutionFilter::Exact(Resolution { width, height }))
                } else {
                    Err(format!("'{}' is not a valid resolution", s))
                }
            }
        }
    }
}

/// How subtitles should be delivered for the selected variant.
#[derive(Debug, Clone, Default)]
pub struct SubtitlePolicy {
    pub locale: Option<LocaleTag>,
    /// Burn the subtitle into the video instead of keeping a soft track.
    pub hardsub: bool,
}

/// Picks the single variant of `manifest` matching the requested audio
/// locale, subtitle policy and resolution.
///
/// Ties on `best` / `worst` break towards the order the catalog returned
/// the variants in.
pub fn select_variant<'a>(
    manifest: &'a HlsManifest,
    audio: &LocaleTag,
    subtitle: &SubtitlePolicy,
    resolution: &ResolutionFilter,
) -> Result<&'a Variant> {
    let by_audio: Vec<&Variant> = manifest
        .variants
        .iter()
        .filter(|v| &v.audio_locale == audio)
        .collect();
    if by_audio.is_empty() {
        return Err(Error::NoMatchingVariant(audio.to_string()));
    }

    let candidates: Vec<&Variant> = if subtitle.hardsub {
        let Some(locale) = &subtitle.locale else {
            return Err(Error::NoMatchingSubtitle("hardsub".into()));
        };
        let hardsubbed: Vec<&Variant> = by_audio
            .into_iter()
            .filter(|v| v.hardsub.as_ref() == Some(locale))
            .collect();
        if hardsubbed.is_empty() {
            return Err(Error::NoMatchingSubtitle(locale.to_string()));
        }
        hardsubbed
    } else {
        if let Some(locale) = &subtitle.locale {
            if !manifest.subtitles.iter().any(|s| &s.locale == locale) {
                return Err(Error::NoMatchingSubtitle(locale.to_string()));
            }
        }
        let soft: Vec<&Variant> = by_audio
            .into_iter()
            .filter(|v| v.hardsub.is_none())
            .collect();
        if soft.is_empty() {
            return Err(Error::NoMatchingVariant(audio.to_string()));
        }
        soft
    };

    match resolution {
        // `W + H` comparison, strict inequality keeps the first of equals.
        ResolutionFilter::Best => Ok(candidates
            .iter()
            .fold(None::<&&Variant>, |acc, v| match acc {
                Some(best) if size(best) >= size(v) => acc,
                _ => Some(v),
            })
            .copied()
            .unwrap()),
        ResolutionFilter::Worst => Ok(candidates
            .iter()
            .fold(None::<&&Variant>, |acc, v| match acc {
                Some(worst) if size(worst) <= size(v) => acc,
                _ => Some(v),
            })
            .copied()
            .unwrap()),
        ResolutionFilter::Exact(want) => candidates
            .iter()
            .find(|v| v.resolution == *want)
            .copied()
            .ok_or_else(|| Error::NoMatchingResolution(want.to_string())),
    }
}

fn size(v: &Variant) -> u64 {
    v.resolution.width + v.resolution.height
}
