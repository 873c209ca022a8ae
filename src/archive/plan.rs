use std::collections::BTreeMap;

use tracing::warn;

use crate::catalog::CatalogClient;
use crate::catalog::types::{EpisodeRef, LocaleTag, SubtitleRef};
use crate::common::errors::{Error, Result};
use crate::hls::select::{ResolutionFilter, SubtitlePolicy, select_variant};
use crate::hls::types::Variant;
use crate::resolve::ResolvedEpisodes;

/// How additional audio locales are stored in the archive output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeBehavior {
    /// Store audio-only tracks when every locale shares the primary's cut,
    /// full video tracks otherwise.
    Auto,
    Audio,
    Video,
}

impl MergeBehavior {
    pub fn parse(s: &str) -> std::result::Result<MergeBehavior, String> {
        Ok(match s.to_lowercase().as_str() {
            "auto" => MergeBehavior::Auto,
            "audio" => MergeBehavior::Audio,
            "video" => MergeBehavior::Video,
            _ => return Err(format!("'{}' is not a valid merge behavior", s)),
        })
    }
}

/// Which subtitle locales end up in the output container.
#[derive(Clone, Debug)]
pub enum SubtitleSelection {
    All,
    Locales(Vec<LocaleTag>),
}

impl SubtitleSelection {
    fn wants(&self, locale: &LocaleTag) -> bool {
        match self {
            SubtitleSelection::All => true,
            SubtitleSelection::Locales(locales) => locales.contains(locale),
        }
    }
}

/// One variant scheduled for download: the episode in a concrete audio
/// locale, bound to the media playlist that will be pulled.
#[derive(Debug, Clone)]
pub struct PlannedTrack {
    pub episode: EpisodeRef,
    pub variant: Variant,
}

/// The per-episode unit of work of the archive command.
///
/// The primary track is the first requested audio locale that had a
/// matching variant; soft subtitles always come from the primary stream.
#[derive(Debug, Clone)]
pub struct EpisodePlan {
    pub season_number: u32,
    pub episode_number: u32,
    pub primary: PlannedTrack,
    pub additional: Vec<PlannedTrack>,
    pub subtitles: Vec<SubtitleRef>,
}

impl EpisodePlan {
    /// Resolves the merge behavior for this episode. `Auto` stores
    /// audio-only tracks when every additional variant reports the
    /// primary's bandwidth; a differing bandwidth signals a differing cut
    /// (regional edits), which needs its own video track.
    ///
    /// The decision is one mode for the whole episode: a single deviating
    /// locale switches every additional track to full video.
    pub fn only_audio(&self, merge: MergeBehavior) -> bool {
        match merge {
            MergeBehavior::Audio => true,
            MergeBehavior::Video => false,
            MergeBehavior::Auto => self
                .additional
                .iter()
                .all(|a| a.variant.bandwidth == self.primary.variant.bandwidth),
        }
    }
}

/// Builds the archive work plan: one [`EpisodePlan`] per `(season, episode)`
/// pair, grouping the per-locale episode lists the resolver produced.
pub async fn build_plans(
    catalog: &dyn CatalogClient,
    resolved: &[ResolvedEpisodes],
    resolution: &ResolutionFilter,
    subtitles: &SubtitleSelection,
) -> Result<Vec<EpisodePlan>> {
    let mut plans: BTreeMap<(u32, u32), EpisodePlan> = BTreeMap::new();

    for per_locale in resolved {
        for episode in &per_locale.episodes {
            let manifest = match catalog.fetch_manifest(episode, &per_locale.locale).await {
                Ok(manifest) => manifest,
                Err(Error::NoMatchingVariant(_)) => {
                    warn!(
                        "S{:02}E{:02} has no {} audio, skipping that track",
                        episode.season_number, episode.episode_number, per_locale.locale
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };

            let variant = select_variant(
                &manifest,
                &per_locale.locale,
                &SubtitlePolicy::default(),
                resolution,
            )?
            .clone();

            let key = (episode.season_number, episode.episode_number);
            match plans.get_mut(&key) {
                Some(plan) => {
                    // Every additional track keeps a distinct locale.
                    if plan.primary.episode.audio_locale == per_locale.locale
                        || plan
                            .additional
                            .iter()
                            .any(|t| t.episode.audio_locale == per_locale.locale)
                    {
                        continue;
                    }
                    plan.additional.push(PlannedTrack {
                        episode: episode.clone(),
                        variant,
                    });
                }
                None => {
                    plans.insert(
                        key,
                        EpisodePlan {
                            season_number: episode.season_number,
                            episode_number: episode.episode_number,
                            primary: PlannedTrack {
                                episode: episode.clone(),
                                variant,
                            },
                            subtitles: manifest
                                .subtitles
                                .iter()
                                .filter(|s| subtitles.wants(&s.locale))
                                .cloned()
                                .collect(),
                            additional: vec![],
                        },
                    );
                }
            }
        }
    }

    if plans.is_empty() {
        return Err(Error::EmptyAfterFilter);
    }
    Ok(plans.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::FakeCatalog;
    use crate::resolve::resolve_url;

    async fn plans_for(
        catalog: &FakeCatalog,
        url: &str,
        locales: &[&str],
    ) -> Vec<EpisodePlan> {
        let locales: Vec<LocaleTag> = locales.iter().map(|l| LocaleTag::from(*l)).collect();
        let resolved = resolve_url(catalog, url, &locales).await.unwrap();
        build_plans(
            catalog,
            &resolved,
            &ResolutionFilter::Best,
            &SubtitleSelection::All,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn filter_expression_yields_fifteen_plans() {
        let catalog = FakeCatalog::series("XYZ", &[("ja-JP", 2, 12)]);
        let plans = plans_for(
            &catalog,
            "https://www.example.tv/series/XYZ[S1E4-S1E6,S2]",
            &["ja-JP"],
        )
        .await;
        assert_eq!(plans.len(), 15);
    }

    #[tokio::test]
    async fn plans_group_locales_by_season_and_episode() {
        let catalog = FakeCatalog::series("XYZ", &[("ja-JP", 1, 3), ("de-DE", 1, 3)]);
        let plans = plans_for(
            &catalog,
            "https://www.example.tv/series/XYZ",
            &["ja-JP", "de-DE"],
        )
        .await;

        assert_eq!(plans.len(), 3);
        for plan in &plans {
            assert_eq!(plan.primary.episode.audio_locale, "ja-JP".into());
            assert_eq!(plan.additional.len(), 1);
            assert_eq!(plan.additional[0].episode.audio_locale, "de-DE".into());
        }
    }

    #[tokio::test]
    async fn primary_falls_back_to_next_locale() {
        // de-DE only has season 1, so its season 2 plans fall back to ja-JP
        // as primary even though de-DE was requested first.
        let catalog = FakeCatalog::series("XYZ", &[("de-DE", 1, 2), ("ja-JP", 2, 2)]);
        let plans = plans_for(
            &catalog,
            "https://www.example.tv/series/XYZ",
            &["de-DE", "ja-JP"],
        )
        .await;

        assert_eq!(plans.len(), 4);
        let season2: Vec<_> = plans.iter().filter(|p| p.season_number == 2).collect();
        assert_eq!(season2.len(), 2);
        for plan in season2 {
            assert_eq!(plan.primary.episode.audio_locale, "ja-JP".into());
            assert!(plan.additional.is_empty());
        }
    }

    #[tokio::test]
    async fn auto_merge_is_audio_on_equal_bandwidths() {
        let catalog = FakeCatalog::series("XYZ", &[("ja-JP", 1, 1), ("de-DE", 1, 1)]);
        let plans = plans_for(
            &catalog,
            "https://www.example.tv/series/XYZ",
            &["ja-JP", "de-DE"],
        )
        .await;

        assert!(plans[0].only_audio(MergeBehavior::Auto));
        assert!(plans[0].only_audio(MergeBehavior::Audio));
        assert!(!plans[0].only_audio(MergeBehavior::Video));
    }

    #[tokio::test]
    async fn auto_merge_is_video_on_bandwidth_mismatch() {
        let mut catalog = FakeCatalog::series("XYZ", &[("ja-JP", 1, 1), ("de-DE", 1, 1)]);
        // The de-DE cut reports different bandwidths, e.g. censored footage.
        catalog.bandwidth_overrides.insert("de-DE".into(), 2);

        let plans = plans_for(
            &catalog,
            "https://www.example.tv/series/XYZ",
            &["ja-JP", "de-DE"],
        )
        .await;

        assert!(!plans[0].only_audio(MergeBehavior::Auto));
    }

    #[tokio::test]
    async fn auto_merge_decides_once_per_episode() {
        let mut catalog = FakeCatalog::series(
            "XYZ",
            &[("ja-JP", 1, 1), ("de-DE", 1, 1), ("fr-FR", 1, 1)],
        );
        // One deviating locale is enough: de-DE matches the primary cut but
        // still gets a full video track alongside fr-FR.
        catalog.bandwidth_overrides.insert("fr-FR".into(), 2);

        let plans = plans_for(
            &catalog,
            "https://www.example.tv/series/XYZ",
            &["ja-JP", "de-DE", "fr-FR"],
        )
        .await;

        assert_eq!(plans[0].additional.len(), 2);
        assert!(!plans[0].only_audio(MergeBehavior::Auto));
    }

    #[tokio::test]
    async fn subtitle_selection_filters_tracks() {
        let catalog = FakeCatalog::series("XYZ", &[("ja-JP", 1, 1)]);
        let resolved = resolve_url(
            &catalog,
            "https://www.example.tv/series/XYZ",
            &["ja-JP".into()],
        )
        .await
        .unwrap();

        let all = build_plans(
            &catalog,
            &resolved,
            &ResolutionFilter::Best,
            &SubtitleSelection::All,
        )
        .await
        .unwrap();
        assert_eq!(all[0].subtitles.len(), 2);

        let some = build_plans(
            &catalog,
            &resolved,
            &ResolutionFilter::Best,
            &SubtitleSelection::Locales(vec!["en-US".into()]),
        )
        .await
        .unwrap();
        assert_eq!(some[0].subtitles.len(), 1);
        assert_eq!(some[0].subtitles[0].locale, "en-US".into());
    }
}
