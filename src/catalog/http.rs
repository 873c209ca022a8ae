use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::catalog::CatalogClient;
use crate::catalog::types::{EpisodeRef, LocaleTag, MediaRef, SeasonRef, SeriesRef, SubtitleRef};
use crate::common::errors::{Error, Result};
use crate::hls::types::{HlsManifest, Segment, Variant};
use crate::hls::{fetch_text, parser};

/// Thin JSON/HLS catalog client.
///
/// Holds no session state beyond an optional bearer token; refreshing an
/// expired session is the caller's problem (`AuthExpired`).
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct SeriesModel {
    id: String,
    title: String,
}

#[derive(Deserialize)]
struct SeasonModel {
    id: String,
    title: String,
    season_number: u32,
    #[serde(default)]
    audio_locales: Vec<LocaleTag>,
}

#[derive(Deserialize)]
struct EpisodeModel {
    id: String,
    title: String,
    series_id: String,
    series_title: String,
    season_id: String,
    season_title: String,
    season_number: u32,
    episode_number: u32,
    audio_locale: LocaleTag,
    #[serde(default)]
    versions: Vec<VersionModel>,
}

#[derive(Deserialize)]
struct VersionModel {
    guid: String,
    audio_locale: LocaleTag,
}

#[derive(Deserialize)]
struct StreamsModel {
    #[serde(default)]
    data: Vec<StreamVariantModel>,
    #[serde(default)]
    meta: StreamsMeta,
}

#[derive(Deserialize, Default)]
struct StreamsMeta {
    #[serde(default)]
    subtitles: std::collections::HashMap<String, SubtitleModel>,
}

#[derive(Deserialize)]
struct StreamVariantModel {
    audio_locale: LocaleTag,
    #[serde(default)]
    hardsub_locale: Option<LocaleTag>,
    url: String,
}

#[derive(Deserialize)]
struct SubtitleModel {
    locale: LocaleTag,
    url: String,
    format: String,
}

impl HttpCatalog {
    pub fn new(client: reqwest::Client, base_url: String, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.get(&url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let res = req.send().await?;
        match res.status().as_u16() {
            401 => Err(Error::AuthExpired),
            402 | 403 => Err(Error::NotAvailable(url)),
            code if !(200..300).contains(&code) => {
                Err(Error::Network(format!("{} returned {}", url, code)))
            }
            _ => Ok(res.json::<T>().await?),
        }
    }

    fn episode_ref(&self, model: &EpisodeModel, locale: &LocaleTag) -> Option<EpisodeRef> {
        // Each version is the same cut with another audio track; its guid is
        // the stream id of that locale.
        let stream_id = if &model.audio_locale == locale {
            model.id.clone()
        } else {
            model
                .versions
                .iter()
                .find(|v| &v.audio_locale == locale)?
                .guid
                .clone()
        };

        Some(EpisodeRef {
            id: model.id.clone(),
            series_id: model.series_id.clone(),
            season_id: model.season_id.clone(),
            series_title: model.series_title.clone(),
            season_title: model.season_title.clone(),
            season_number: model.season_number,
            episode_number: model.episode_number,
            title: model.title.clone(),
            audio_locale: locale.clone(),
            stream_id,
        })
    }
}

#[async_trait]
impl CatalogClient for HttpCatalog {
    async fn resolve_url(&self, url: &str) -> Result<MediaRef> {
        let series_re = Regex::new(r"/series/([A-Za-z0-9]+)").unwrap();
        let episode_re = Regex::new(r"/watch/([A-Za-z0-9]+)").unwrap();

        if let Some(captures) = series_re.captures(url) {
            let id = &captures[1];
            let mut found: Collection<SeriesModel> =
                self.get_json(&format!("/content/v2/cms/series/{}", id)).await?;
            if found.data.is_empty() {
                return Err(Error::Network(format!("series {} not found", id)));
            }
            let series = found.data.remove(0);
            return Ok(MediaRef::Series(SeriesRef {
                id: series.id,
                title: series.title,
            }));
        }

        if let Some(captures) = episode_re.captures(url) {
            let id = &captures[1];
            let mut found: Collection<EpisodeModel> = self
                .get_json(&format!("/content/v2/cms/episodes/{}", id))
                .await?;
            if found.data.is_empty() {
                return Err(Error::Network(format!("episode {} not found", id)));
            }
            let episode = found.data.remove(0);
            let locale = episode.audio_locale.clone();
            let episode = self
                .episode_ref(&episode, &locale)
                .ok_or_else(|| Error::NoMatchingVariant(locale.to_string()))?;
            return Ok(MediaRef::Episode(episode));
        }

        Err(Error::Network(format!(
            "'{}' is not a series or episode url",
            url
        )))
    }

    async fn seasons(&self, series: &SeriesRef) -> Result<Vec<SeasonRef>> {
        let found: Collection<SeasonModel> = self
            .get_json(&format!("/content/v2/cms/series/{}/seasons", series.id))
            .await?;
        Ok(found
            .data
            .into_iter()
            .map(|s| SeasonRef {
                id: s.id,
                series_id: series.id.clone(),
                title: s.title,
                season_number: s.season_number,
                audio_locales: s.audio_locales,
            })
            .collect())
    }

    async fn episodes(&self, season: &SeasonRef) -> Result<Vec<EpisodeRef>> {
        let found: Collection<EpisodeModel> = self
            .get_json(&format!("/content/v2/cms/seasons/{}/episodes", season.id))
            .await?;

        // One ref per available audio version, so the resolver can filter by
        // plain locale equality.
        let mut refs = vec![];
        for model in &found.data {
            for locale in &season.audio_locales {
                if let Some(episode) = self.episode_ref(model, locale) {
                    refs.push(episode);
                }
            }
        }
        Ok(refs)
    }

    async fn fetch_manifest(
        &self,
        episode: &EpisodeRef,
        audio: &LocaleTag,
    ) -> Result<HlsManifest> {
        let streams: StreamsModel = self
            .get_json(&format!("/content/v2/cms/videos/{}/streams", episode.stream_id))
            .await?;

        let mut variants = vec![];
        for stream in &streams.data {
            if &stream.audio_locale != audio {
                continue;
            }
            let hardsub = stream
                .hardsub_locale
                .clone()
                .filter(|l| !l.is_empty());

            let master = fetch_text(&self.client, &stream.url).await?;
            for entry in parser::parse_master(&master, &stream.url) {
                variants.push(Variant {
                    resolution: entry.resolution,
                    bandwidth: entry.bandwidth,
                    fps: entry.fps,
                    audio_locale: audio.clone(),
                    hardsub: hardsub.clone(),
                    url: entry.url,
                });
            }
        }

        if variants.is_empty() {
            return Err(Error::NoMatchingVariant(audio.to_string()));
        }

        Ok(HlsManifest {
            audio_locale: audio.clone(),
            subtitles: streams
                .meta
                .subtitles
                .into_values()
                .map(|s| SubtitleRef {
                    locale: s.locale,
                    url: s.url,
                    format: s.format,
                })
                .collect(),
            variants,
        })
    }

    async fn segments(&self, variant: &Variant) -> Result<Vec<Segment>> {
        let text = fetch_text(&self.client, &variant.url).await?;
        parser::parse_media(&text, &variant.url)
    }

    async fn fetch_subtitle(
        &self,
        subtitle: &SubtitleRef,
        sink: &mut (dyn std::io::Write + Send),
    ) -> Result<()> {
        let res = self.client.get(&subtitle.url).send().await?;
        if !res.status().is_success() {
            return Err(Error::Network(format!(
                "subtitle fetch failed {}: {}",
                res.status(),
                subtitle.url
            )));
        }
        sink.write_all(res.bytes().await?.as_ref())?;
        Ok(())
    }
}
