use anyhow::{Result, bail};
use tracing::info;

use crate::archive::plan::{self, MergeBehavior, SubtitleSelection};
use crate::archive::{ArchiveOptions, archive_episode};
use crate::catalog::types::LocaleTag;
use crate::context::Context;
use crate::hls::select::ResolutionFilter;
use crate::resolve::resolve_url;

#[derive(Debug, clap::Parser)]
#[clap(about = "Archive episodes with all audio and subtitle tracks in one file")]
#[command(arg_required_else_help(true))]
pub struct Archive {
    #[arg(help = "Audio languages. Can be used multiple times")]
    #[arg(short, long = "audio", default_values_t = vec!["ja-JP".to_string()])]
    pub audio: Vec<String>,

    #[arg(help = "Subtitle languages. Can be used multiple times, or 'all'")]
    #[arg(short, long = "subtitle", default_values_t = vec!["all".to_string()])]
    pub subtitle: Vec<String>,

    #[arg(help = "Name of the output file.")]
    #[arg(long_help = "Name of the output file.\
    If you use one of the following patterns they will get replaced:\n  \
      {title}          → Title of the video\n  \
      {series_name}    → Name of the series\n  \
      {season_name}    → Name of the season\n  \
      {audio}          → Audio language of the video\n  \
      {subtitle}       → Subtitle languages of the video\n  \
      {resolution}     → Resolution of the video\n  \
      {fps}            → Frame rate of the video\n  \
      {season_number}  → Number of the season\n  \
      {episode_number} → Number of the episode")]
    #[arg(short, long, default_value = "{title}.mkv")]
    pub output: String,

    #[arg(help = "Video resolution: 'best', 'worst', '1920x1080' or '1080p'")]
    #[arg(short, long, default_value = "best")]
    #[arg(value_parser = super::clap_parse_resolution)]
    pub resolution: ResolutionFilter,

    #[arg(
        help = "Behavior of the stream merging. Valid behaviors are 'auto', 'audio' and 'video'"
    )]
    #[arg(long_help = "Some episodes do not have the same length across languages \
    (e.g. when scenes were cut out regionally), so their video tracks differ. \
    'audio' stores one video and every other language as audio only, 'video' stores video + audio \
    for every language, 'auto' compares the streams and behaves like 'video' when they differ, \
    like 'audio' otherwise")]
    #[arg(short, long, default_value = "auto")]
    #[arg(value_parser = MergeBehavior::parse)]
    pub merge: MergeBehavior,

    #[arg(help = "Subtitle language to set as default / auto shown when starting a video")]
    #[arg(long)]
    pub default_subtitle: Option<String>,

    #[arg(help = "Number of parallel segment downloads")]
    #[arg(short, long, alias = "goroutines")]
    pub parallelism: Option<usize>,

    #[arg(help = "Skip files which are already existing")]
    #[arg(long, default_value_t = false)]
    pub skip_existing: bool,

    #[arg(help = "Catalog series url(s)")]
    pub urls: Vec<String>,
}

impl Archive {
    pub async fn execute(self, ctx: Context) -> Result<()> {
        if !std::path::Path::new(&self.output)
            .extension()
            .map(|e| e == "mkv")
            .unwrap_or(false)
        {
            bail!("currently only matroska / '.mkv' output files are supported")
        }

        // Requested locales, first one wins the primary track; duplicates
        // would otherwise produce duplicate audio tracks.
        let mut audio: Vec<LocaleTag> = vec![];
        for locale in &self.audio {
            let locale = LocaleTag::from(locale.as_str());
            if !audio.contains(&locale) {
                audio.push(locale);
            }
        }

        let subtitles = if self.subtitle.iter().any(|s| s == "all") {
            SubtitleSelection::All
        } else {
            SubtitleSelection::Locales(
                self.subtitle
                    .iter()
                    .map(|s| LocaleTag::from(s.as_str()))
                    .collect(),
            )
        };

        let opts = ArchiveOptions {
            merge: self.merge,
            output_template: self.output.clone(),
            container: "matroska".to_string(),
            default_subtitle: self.default_subtitle.as_deref().map(LocaleTag::from),
            skip_existing: self.skip_existing,
        };

        for url in &self.urls {
            let resolved = resolve_url(ctx.catalog.as_ref(), url, &audio).await?;
            let plans =
                plan::build_plans(ctx.catalog.as_ref(), &resolved, &self.resolution, &subtitles)
                    .await?;

            info!("Archiving {} episode(s)", plans.len());
            for plan in &plans {
                info!(
                    "S{:02}E{:02} {} » {}, {:.2} FPS, audio: {}",
                    plan.season_number,
                    plan.episode_number,
                    plan.primary.episode.title,
                    plan.primary.variant.resolution,
                    plan.primary.variant.fps,
                    std::iter::once(&plan.primary)
                        .chain(plan.additional.iter())
                        .map(|t| t.episode.audio_locale.to_string())
                        .collect::<Vec<String>>()
                        .join(", ")
                );
            }

            for plan in &plans {
                archive_episode(&ctx, plan, &opts).await?;
            }
        }

        Ok(())
    }
}
