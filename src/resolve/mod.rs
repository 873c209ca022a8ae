pub mod filter;

use tracing::warn;

use crate::catalog::CatalogClient;
use crate::catalog::types::{EpisodeRef, LocaleTag, MediaRef};
use crate::common::errors::{Error, Result};
use filter::UrlFilter;

/// A catalog url split into its address part and the optional bracketed
/// episode filter.
#[derive(Debug, Clone)]
pub struct ParsedUrl {
    pub url: String,
    pub filter: UrlFilter,
}

/// Splits a trailing `[…]` filter off a url. Text after the closing bracket
/// is a syntax error.
pub fn split_url_filter(raw: &str) -> Result<ParsedUrl> {
    let Some(open) = raw.find('[') else {
        return Ok(ParsedUrl {
            url: raw.to_string(),
            filter: UrlFilter::default(),
        });
    };

    let Some(close) = raw.rfind(']') else {
        return Err(Error::FilterSyntax(raw[open..].to_string()));
    };
    if close != raw.len() - 1 || close < open {
        return Err(Error::FilterSyntax(raw[open..].to_string()));
    }

    Ok(ParsedUrl {
        url: raw[..open].to_string(),
        filter: UrlFilter::parse(&raw[open + 1..close])?,
    })
}

/// The episodes one url resolved to, for one audio locale.
#[derive(Debug, Clone)]
pub struct ResolvedEpisodes {
    pub locale: LocaleTag,
    pub episodes: Vec<EpisodeRef>,
}

/// Resolves a user-supplied url into flat, filtered, per-locale episode
/// lists.
///
/// A series url fans out across `audio` in the given order (the order later
/// decides the primary track); an episode url pins the audio locale itself.
/// Duplicate `(season, episode)` pairs within one locale (the catalog can
/// carry a season twice) keep their first occurrence.
pub async fn resolve_url(
    catalog: &dyn CatalogClient,
    raw_url: &str,
    audio: &[LocaleTag],
) -> Result<Vec<ResolvedEpisodes>> {
    let parsed = split_url_filter(raw_url)?;

    match catalog.resolve_url(&parsed.url).await? {
        MediaRef::Episode(episode) => {
            if !parsed
                .filter
                .is_episode_valid(episode.season_number, episode.episode_number)
            {
                return Err(Error::EmptyAfterFilter);
            }
            Ok(vec![ResolvedEpisodes {
                locale: episode.audio_locale.clone(),
                episodes: vec![episode],
            }])
        }
        MediaRef::Series(series) => {
            let seasons = catalog.seasons(&series).await?;

            let mut results = Vec::new();
            for locale in audio {
                let mut episodes: Vec<EpisodeRef> = Vec::new();

                for season in &seasons {
                    if !parsed.filter.is_season_valid(season.season_number) {
                        continue;
                    }
                    if !season.audio_locales.contains(locale) {
                        continue;
                    }

                    for episode in catalog.episodes(season).await? {
                        if &episode.audio_locale != locale {
                            continue;
                        }
                        if !parsed
                            .filter
                            .is_episode_valid(episode.season_number, episode.episode_number)
                        {
                            continue;
                        }
                        if episodes.iter().any(|e| {
                            e.season_number == episode.season_number
                                && e.episode_number == episode.episode_number
                        }) {
                            continue;
                        }
                        episodes.push(episode);
                    }
                }

                if episodes.is_empty() {
                    warn!("{} is not available with {} audio", series.title, locale);
                }
                results.push(ResolvedEpisodes {
                    locale: locale.clone(),
                    episodes,
                });
            }

            if results.iter().all(|r| r.episodes.is_empty()) {
                return Err(Error::EmptyAfterFilter);
            }
            Ok(results)
        }
    }
}
