use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::archive::download_segments;
use crate::catalog::types::{EpisodeRef, LocaleTag};
use crate::context::Context;
use crate::hls::assemble::{assemble_flat, write_concat_list};
use crate::hls::select::{ResolutionFilter, SubtitlePolicy, select_variant};
use crate::naming::{TemplateVars, ensure_parent, free_file, render_template};
use crate::resolve::resolve_url;

#[derive(Debug, clap::Parser)]
#[clap(about = "Download episodes as single-track video files")]
#[command(arg_required_else_help(true))]
pub struct Download {
    #[arg(help = "Audio language of the video")]
    #[arg(short, long, default_value = "ja-JP")]
    pub audio: String,

    #[arg(help = "Subtitle language, burned into the video (hardsub)")]
    #[arg(short, long)]
    pub subtitle: Option<String>,

    #[arg(help = "Name of the output file; see the archive command for the available {placeholders}")]
    #[arg(short, long, default_value = "{title}.ts")]
    pub output: String,

    #[arg(help = "Video resolution: 'best', 'worst', '1280x720' or '720p'")]
    #[arg(short, long, default_value = "best")]
    #[arg(value_parser = super::clap_parse_resolution)]
    pub resolution: ResolutionFilter,

    #[arg(help = "Number of parallel segment downloads")]
    #[arg(short, long, alias = "goroutines")]
    pub parallelism: Option<usize>,

    #[arg(help = "Skip files which are already existing")]
    #[arg(long, default_value_t = false)]
    pub skip_existing: bool,

    #[arg(help = "Catalog url(s)")]
    pub urls: Vec<String>,
}

impl Download {
    pub async fn execute(self, ctx: Context) -> Result<()> {
        let audio = LocaleTag::from(self.audio.as_str());
        let policy = SubtitlePolicy {
            locale: self.subtitle.as_deref().map(LocaleTag::from),
            hardsub: self.subtitle.is_some(),
        };

        for url in &self.urls {
            let resolved = resolve_url(ctx.catalog.as_ref(), url, std::slice::from_ref(&audio))
                .await?;

            for per_locale in resolved {
                for episode in per_locale.episodes {
                    download_episode(&ctx, &episode, &policy, &self.resolution, &self.output, self.skip_existing)
                        .await?;
                }
            }
        }

        Ok(())
    }
}

/// Downloads one episode as a single video+audio track.
///
/// A `.ts` output is plain segment concatenation; any other extension goes
/// through the muxer so container framing comes out right.
pub(crate) async fn download_episode(
    ctx: &Context,
    episode: &EpisodeRef,
    policy: &SubtitlePolicy,
    resolution: &ResolutionFilter,
    output_template: &str,
    skip_existing: bool,
) -> Result<Option<PathBuf>> {
    let manifest = ctx
        .catalog
        .fetch_manifest(episode, &episode.audio_locale)
        .await?;
    let variant = select_variant(&manifest, &episode.audio_locale, policy, resolution)?.clone();

    let vars = TemplateVars {
        title: episode.title.clone(),
        series_name: episode.series_title.clone(),
        season_name: episode.season_title.clone(),
        season_number: episode.season_number,
        episode_number: episode.episode_number,
        resolution: variant.resolution.to_string(),
        fps: variant.fps,
        audio: episode.audio_locale.to_string(),
        subtitle: policy
            .locale
            .as_ref()
            .map(|l| l.to_string())
            .unwrap_or_default(),
    };
    let target = PathBuf::from(render_template(output_template, &vars)?);
    let (target, taken) = free_file(target);
    if taken && skip_existing {
        debug!("skipping already existing file '{}'", target.display());
        return Ok(None);
    }

    info!(
        "Downloading S{:02}E{:02} {} ({}) to '{}'",
        episode.season_number,
        episode.episode_number,
        episode.title,
        variant.resolution,
        target.display()
    );

    let scratch = ctx.scratch_base.join(format!("torii-{}", episode.id));
    std::fs::create_dir_all(&scratch)?;

    let result = async {
        let segments = ctx.catalog.segments(&variant).await?;
        download_segments(ctx, &segments, &scratch, &episode.title).await?;

        ensure_parent(&target)?;
        if is_raw_stream(&target) {
            let mut sink = BufWriter::new(File::create(&target)?);
            assemble_flat(&scratch, &mut sink)?;
        } else {
            let listing = write_concat_list(&scratch)?;
            ctx.muxer.concat(&listing, &target, false)?;
        }
        Ok::<_, crate::common::errors::Error>(())
    }
    .await;

    let _ = std::fs::remove_dir_all(&scratch);
    if let Err(err) = result {
        // Half-written outputs don't survive a failed or cancelled run.
        let _ = std::fs::remove_file(&target);
        bail!(err)
    }

    info!("Downloaded '{}'", target.display());
    Ok(Some(target))
}

fn is_raw_stream(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("ts")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::archive::mux::{MuxJob, Muxer};
    use crate::catalog::testing::FakeCatalog;
    use crate::common::errors::Result as PipelineResult;
    use crate::hls::fetcher::{RetryPolicy, SegmentFetcher};
    use crate::hls::types::Resolution;

    struct EchoFetcher;

    #[async_trait]
    impl SegmentFetcher for EchoFetcher {
        async fn fetch_raw(&self, url: &str) -> PipelineResult<Vec<u8>> {
            Ok(format!("[{}]", url).into_bytes())
        }
    }

    #[derive(Default)]
    struct CountingMuxer {
        concats: Mutex<usize>,
        muxes: Mutex<usize>,
    }

    impl Muxer for CountingMuxer {
        fn concat(&self, _: &Path, output: &Path, _: bool) -> PipelineResult<()> {
            *self.concats.lock() += 1;
            std::fs::write(output, b"concat").unwrap();
            Ok(())
        }

        fn mux(&self, _: &MuxJob) -> PipelineResult<()> {
            *self.muxes.lock() += 1;
            Ok(())
        }
    }

    async fn fetch_one(
        output_template: String,
        resolution: ResolutionFilter,
    ) -> (Option<PathBuf>, Arc<CountingMuxer>) {
        let catalog = FakeCatalog::series("ABC123", &[("ja-JP", 1, 1)]);
        let muxer = Arc::new(CountingMuxer::default());
        let scratch = tempfile::tempdir().unwrap();

        let ctx = Context {
            catalog: Arc::new(catalog),
            fetcher: Arc::new(EchoFetcher),
            muxer: muxer.clone(),
            parallelism: 2,
            retry: RetryPolicy::default(),
            scratch_base: scratch.path().to_path_buf(),
            cancel: CancellationToken::new(),
        };

        let episode = match ctx
            .catalog
            .resolve_url("https://www.example.tv/watch/ABC123-s1e1")
            .await
            .unwrap()
        {
            crate::catalog::types::MediaRef::Episode(e) => e,
            _ => unreachable!(),
        };

        let path = download_episode(
            &ctx,
            &episode,
            &SubtitlePolicy::default(),
            &resolution,
            &output_template,
            false,
        )
        .await
        .unwrap();
        (path, muxer)
    }

    #[tokio::test]
    async fn ts_output_is_flat_concat_without_muxer() {
        let out = tempfile::tempdir().unwrap();
        let template = out
            .path()
            .join("{title} {resolution}.ts")
            .to_string_lossy()
            .to_string();

        let (path, muxer) = fetch_one(
            template,
            ResolutionFilter::Exact(Resolution {
                width: 1280,
                height: 720,
            }),
        )
        .await;

        let path = path.unwrap();
        assert!(path.to_string_lossy().ends_with("Episode 1 1280x720.ts"));

        // The fake catalog derives segment urls from the variant url, so the
        // flat output proves both the 720p selection and the ordering.
        let body = String::from_utf8(std::fs::read(&path).unwrap()).unwrap();
        assert!(body.contains("1280x720.m3u8/0.ts]"));
        let first = body.find("/0.ts").unwrap();
        let second = body.find("/1.ts").unwrap();
        let third = body.find("/2.ts").unwrap();
        assert!(first < second && second < third);

        assert_eq!(*muxer.concats.lock(), 0);
        assert_eq!(*muxer.muxes.lock(), 0);
    }

    #[tokio::test]
    async fn container_output_goes_through_the_muxer() {
        let out = tempfile::tempdir().unwrap();
        let template = out
            .path()
            .join("{title}.mp4")
            .to_string_lossy()
            .to_string();

        let (path, muxer) = fetch_one(template, ResolutionFilter::Best).await;

        assert!(path.unwrap().exists());
        assert_eq!(*muxer.concats.lock(), 1);
    }
}
