pub mod http;
pub mod types;

use async_trait::async_trait;

use crate::common::errors::Result;
use crate::hls::types::{HlsManifest, Segment, Variant};
use types::{EpisodeRef, LocaleTag, MediaRef, SeasonRef, SeriesRef, SubtitleRef};

/// Everything the pipeline needs from a streaming catalog.
///
/// The download pipeline is generic over this trait; [`http::HttpCatalog`]
/// is the production implementation, tests substitute fakes. All operations
/// can fail with `AuthExpired`, `NotAvailable` or `Network`.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Resolves a series or episode url to a catalog reference.
    async fn resolve_url(&self, url: &str) -> Result<MediaRef>;

    async fn seasons(&self, series: &SeriesRef) -> Result<Vec<SeasonRef>>;

    async fn episodes(&self, season: &SeasonRef) -> Result<Vec<EpisodeRef>>;

    /// Fetches and parses the master playlist of one (episode, audio) pair.
    async fn fetch_manifest(
        &self,
        episode: &EpisodeRef,
        audio: &LocaleTag,
    ) -> Result<HlsManifest>;

    /// Loads the ordered segment list of a selected variant.
    async fn segments(&self, variant: &Variant) -> Result<Vec<Segment>>;

    /// Downloads one subtitle file into `sink`.
    async fn fetch_subtitle(
        &self,
        subtitle: &SubtitleRef,
        sink: &mut (dyn std::io::Write + Send),
    ) -> Result<()>;
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;

    use super::*;
    use crate::common::errors::Error;
    use crate::hls::types::Resolution;

    /// Deterministic in-memory catalog for pipeline tests.
    ///
    /// Series urls look like `…/series/<id>[filter]`, episode urls like
    /// `…/watch/<id>-s<season>e<episode>`. Each (episode, locale) manifest
    /// carries the usual resolution ladder; per-locale bandwidth overrides
    /// drive the merge-mode tests.
    pub struct FakeCatalog {
        series: SeriesRef,
        /// locale → (season count, episodes per season)
        locales: Vec<(LocaleTag, u32, u32)>,
        pub bandwidth_overrides: HashMap<LocaleTag, u64>,
        pub subtitle_locales: Vec<LocaleTag>,
        pub segments_per_variant: usize,
    }

    impl FakeCatalog {
        pub fn series(id: &str, locales: &[(&str, u32, u32)]) -> Self {
            Self {
                series: SeriesRef {
                    id: id.to_string(),
                    title: format!("Series {}", id),
                },
                locales: locales
                    .iter()
                    .map(|(l, s, e)| (LocaleTag::from(*l), *s, *e))
                    .collect(),
                bandwidth_overrides: HashMap::new(),
                subtitle_locales: vec!["en-US".into(), "de-DE".into()],
                segments_per_variant: 3,
            }
        }

        fn episode(&self, locale: &LocaleTag, season: u32, episode: u32) -> EpisodeRef {
            EpisodeRef {
                id: format!("{}-{}-s{}e{}", self.series.id, locale, season, episode),
                series_id: self.series.id.clone(),
                season_id: format!("{}-s{}", self.series.id, season),
                series_title: self.series.title.clone(),
                season_title: format!("Season {}", season),
                season_number: season,
                episode_number: episode,
                title: format!("Episode {}", episode),
                audio_locale: locale.clone(),
                stream_id: format!("stream-{}-{}-s{}e{}", self.series.id, locale, season, episode),
            }
        }
    }

    #[async_trait]
    impl CatalogClient for FakeCatalog {
        async fn resolve_url(&self, url: &str) -> Result<MediaRef> {
            if url.contains("/watch/") {
                let suffix = url.rsplit('-').next().unwrap_or_default();
                let (s, e) = suffix
                    .trim_start_matches('s')
                    .split_once('e')
                    .ok_or_else(|| Error::Network(format!("bad fake url {}", url)))?;
                let (locale, _, _) = &self.locales[0];
                return Ok(MediaRef::Episode(self.episode(
                    locale,
                    s.parse().unwrap(),
                    e.parse().unwrap(),
                )));
            }
            Ok(MediaRef::Series(self.series.clone()))
        }

        async fn seasons(&self, _series: &SeriesRef) -> Result<Vec<SeasonRef>> {
            let max_seasons = self.locales.iter().map(|(_, s, _)| *s).max().unwrap_or(0);
            Ok((1..=max_seasons)
                .map(|n| SeasonRef {
                    id: format!("{}-s{}", self.series.id, n),
                    series_id: self.series.id.clone(),
                    title: format!("Season {}", n),
                    season_number: n,
                    audio_locales: self
                        .locales
                        .iter()
                        .filter(|(_, seasons, _)| *seasons >= n)
                        .map(|(l, _, _)| l.clone())
                        .collect(),
                })
                .collect())
        }

        async fn episodes(&self, season: &SeasonRef) -> Result<Vec<EpisodeRef>> {
            let mut out = vec![];
            for (locale, seasons, episodes) in &self.locales {
                if *seasons < season.season_number {
                    continue;
                }
                for e in 1..=*episodes {
                    out.push(self.episode(locale, season.season_number, e));
                }
            }
            Ok(out)
        }

        async fn fetch_manifest(
            &self,
            episode: &EpisodeRef,
            audio: &LocaleTag,
        ) -> Result<HlsManifest> {
            if !self.locales.iter().any(|(l, _, _)| l == audio) {
                return Err(Error::NoMatchingVariant(audio.to_string()));
            }
            let bandwidth_scale = self.bandwidth_overrides.get(audio).copied().unwrap_or(1);
            let ladder = [
                (1920u64, 1080u64, 8_000_000u64),
                (1280, 720, 4_000_000),
                (854, 480, 2_000_000),
                (640, 360, 1_000_000),
                (428, 240, 600_000),
            ];
            Ok(HlsManifest {
                audio_locale: audio.clone(),
                subtitles: self
                    .subtitle_locales
                    .iter()
                    .map(|l| SubtitleRef {
                        locale: l.clone(),
                        url: format!("fake://{}/{}.ass", episode.stream_id, l),
                        format: "ass".into(),
                    })
                    .collect(),
                variants: ladder
                    .iter()
                    .map(|(w, h, bw)| Variant {
                        resolution: Resolution {
                            width: *w,
                            height: *h,
                        },
                        bandwidth: bw * bandwidth_scale,
                        fps: 23.98,
                        audio_locale: audio.clone(),
                        hardsub: None,
                        url: format!("fake://{}/{}/{}x{}.m3u8", episode.stream_id, audio, w, h),
                    })
                    .collect(),
            })
        }

        async fn segments(&self, variant: &Variant) -> Result<Vec<Segment>> {
            Ok((0..self.segments_per_variant)
                .map(|i| Segment {
                    index: i,
                    url: format!("{}/{}.ts", variant.url, i),
                    key: None,
                })
                .collect())
        }

        async fn fetch_subtitle(
            &self,
            subtitle: &SubtitleRef,
            sink: &mut (dyn std::io::Write + Send),
        ) -> Result<()> {
            sink.write_all(format!("subtitle:{}", subtitle.locale).as_bytes())?;
            Ok(())
        }
    }
}
