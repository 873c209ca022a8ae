pub mod mux;
pub mod plan;

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::catalog::types::LocaleTag;
use crate::common::errors::{Error, Result};
use crate::context::Context;
use crate::hls::assemble::write_concat_list;
use crate::hls::pool::SegmentPool;
use crate::hls::types::{Segment, Variant};
use crate::naming::{TemplateVars, ensure_parent, free_file, render_template};
use mux::{MuxInput, MuxJob, TrackKind};
use plan::{EpisodePlan, MergeBehavior};

/// Settings of one archive run.
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub merge: MergeBehavior,
    pub output_template: String,
    /// ffmpeg container name of the final output.
    pub container: String,
    pub default_subtitle: Option<LocaleTag>,
    pub skip_existing: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            merge: MergeBehavior::Auto,
            output_template: "{title}.mkv".to_string(),
            container: "matroska".to_string(),
            default_subtitle: None,
            skip_existing: false,
        }
    }
}

/// Downloads and multiplexes one planned episode. Returns the written path,
/// or `None` when an existing output was skipped.
pub async fn archive_episode(
    ctx: &Context,
    plan: &EpisodePlan,
    opts: &ArchiveOptions,
) -> Result<Option<PathBuf>> {
    let target = PathBuf::from(render_template(
        &opts.output_template,
        &template_vars(plan),
    )?);
    let (target, taken) = free_file(target);
    if taken && opts.skip_existing {
        debug!("skipping already existing file '{}'", target.display());
        return Ok(None);
    }

    let scratch = ctx.scratch_base.join(format!(
        "torii-{}-s{:02}e{:02}",
        plan.primary.episode.series_id, plan.season_number, plan.episode_number
    ));
    std::fs::create_dir_all(&scratch)?;

    let result = archive_episode_inner(ctx, plan, opts, &scratch, &target).await;

    // The scratch directory goes away on success, failure and clean
    // cancellation alike; only a forced second interrupt leaves it behind.
    let _ = std::fs::remove_dir_all(&scratch);

    result.map(|_| Some(target))
}

async fn archive_episode_inner(
    ctx: &Context,
    plan: &EpisodePlan,
    opts: &ArchiveOptions,
    scratch: &Path,
    target: &Path,
) -> Result<()> {
    info!(
        "Downloading S{:02}E{:02} {} to '{}'",
        plan.season_number,
        plan.episode_number,
        plan.primary.episode.title,
        target.display()
    );

    let only_audio = plan.only_audio(opts.merge);
    let mut inputs: Vec<MuxInput> = vec![];

    let primary_path = fetch_variant_track(ctx, plan, &plan.primary.variant, scratch, false).await?;
    inputs.push(MuxInput {
        path: primary_path,
        kind: TrackKind::Video,
        locale: plan.primary.episode.audio_locale.clone(),
        title: plan.primary.episode.audio_locale.human_name(),
        forced: false,
        default: false,
    });

    for additional in &plan.additional {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let path =
            fetch_variant_track(ctx, plan, &additional.variant, scratch, only_audio).await?;
        inputs.push(MuxInput {
            path,
            kind: if only_audio {
                TrackKind::Audio
            } else {
                TrackKind::Video
            },
            locale: additional.episode.audio_locale.clone(),
            title: additional.episode.audio_locale.human_name(),
            forced: false,
            default: false,
        });
    }

    for subtitle in &plan.subtitles {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let path = scratch.join(format!("{}.{}", subtitle.locale, subtitle.format));
        let mut sink = File::create(&path)?;
        ctx.catalog.fetch_subtitle(subtitle, &mut sink).await?;
        inputs.push(MuxInput {
            path,
            kind: TrackKind::Subtitle,
            locale: subtitle.locale.clone(),
            title: subtitle.locale.human_name(),
            forced: false,
            default: opts.default_subtitle.as_ref() == Some(&subtitle.locale),
        });
    }

    if ctx.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let muxed = scratch.join(format!("muxed.{}", extension_of(&opts.container)));
    ctx.muxer.mux(&MuxJob {
        inputs,
        container: opts.container.clone(),
        output: muxed.clone(),
    })?;

    ensure_parent(target)?;
    move_into_place(&muxed, target)?;
    info!("Archived '{}'", target.display());

    Ok(())
}

/// Downloads all segments of one variant into its own scratch subdirectory
/// and concatenates them (stream copy) into a single intermediate file.
/// With `only_audio` the video stream is dropped during the concat.
pub async fn fetch_variant_track(
    ctx: &Context,
    plan: &EpisodePlan,
    variant: &Variant,
    scratch: &Path,
    only_audio: bool,
) -> Result<PathBuf> {
    let locale = &variant.audio_locale;
    let variant_dir = scratch.join(&locale.0);
    std::fs::create_dir_all(&variant_dir)?;

    let segments = ctx.catalog.segments(variant).await?;
    download_segments(ctx, &segments, &variant_dir, &format!("{} audio", locale)).await?;

    let listing = write_concat_list(&variant_dir)?;
    let track = scratch.join(format!(
        "s{:02}e{:02}-{}.{}",
        plan.season_number,
        plan.episode_number,
        locale,
        if only_audio { "aac" } else { "ts" }
    ));
    ctx.muxer.concat(&listing, &track, only_audio)?;

    Ok(track)
}

/// Runs the segment pool with decile progress logging.
pub async fn download_segments(
    ctx: &Context,
    segments: &[Segment],
    scratch_dir: &Path,
    label: &str,
) -> Result<()> {
    let mut pool = SegmentPool::new(ctx.fetcher.clone(), ctx.parallelism);
    pool.retry = ctx.retry;

    let total = segments.len();
    info!("Downloading {} ({} segments)", label, total);
    pool.download(
        segments,
        scratch_dir,
        &ctx.cancel,
        |_segment, done, total, _path| {
            if total >= 10 && done * 10 / total != (done - 1) * 10 / total {
                info!("{}: {}%", label, done * 100 / total);
            }
        },
    )
    .await
}

fn template_vars(plan: &EpisodePlan) -> TemplateVars {
    let primary = &plan.primary;
    TemplateVars {
        title: primary.episode.title.clone(),
        series_name: primary.episode.series_title.clone(),
        season_name: primary.episode.season_title.clone(),
        season_number: plan.season_number,
        episode_number: plan.episode_number,
        resolution: primary.variant.resolution.to_string(),
        fps: primary.variant.fps,
        audio: primary.episode.audio_locale.to_string(),
        subtitle: plan
            .subtitles
            .iter()
            .map(|s| s.locale.to_string())
            .collect::<Vec<_>>()
            .join(","),
    }
}

fn extension_of(container: &str) -> &str {
    match container {
        "matroska" => "mkv",
        "mpegts" => "ts",
        other => other,
    }
}

/// Renames the finished file into place, falling back to copy + remove when
/// the scratch directory sits on another filesystem.
fn move_into_place(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)?;
            Ok(())
        }
    }
}
