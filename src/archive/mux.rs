use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::catalog::types::LocaleTag;
use crate::common::errors::{Error, Result};

/// One input file of a mux job.
#[derive(Debug, Clone)]
pub struct MuxInput {
    pub path: PathBuf,
    pub kind: TrackKind,
    pub locale: LocaleTag,
    /// Human readable track title shown by players.
    pub title: String,
    pub forced: bool,
    pub default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Full video + audio track.
    Video,
    /// Audio-only track (video stream dropped with `-vn`).
    Audio,
    Subtitle,
}

/// A complete multiplex invocation: every input, already downloaded, plus
/// the target container and output path.
#[derive(Debug, Clone)]
pub struct MuxJob {
    pub inputs: Vec<MuxInput>,
    /// ffmpeg container name, e.g. `matroska`.
    pub container: String,
    pub output: PathBuf,
}

/// External muxer capability. Stream-copy only, the pipeline never
/// re-encodes.
pub trait Muxer: Send + Sync {
    /// Concatenates the files of a listing (`file '<path>'` lines) into one
    /// stream. `only_audio` drops the video stream of every input.
    fn concat(&self, listing: &Path, output: &Path, only_audio: bool) -> Result<()>;

    /// Multiplexes heterogeneous inputs into one container.
    fn mux(&self, job: &MuxJob) -> Result<()>;
}

/// Muxer driving an external `ffmpeg` binary.
pub struct FfmpegMuxer {
    executable: String,
}

impl FfmpegMuxer {
    pub fn new(executable: Option<String>) -> Self {
        Self {
            executable: executable.unwrap_or_else(|| "ffmpeg".to_string()),
        }
    }

    /// True when the configured executable is runnable.
    pub fn available(&self) -> bool {
        Command::new(&self.executable)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn run(&self, args: Vec<String>) -> Result<()> {
        debug!("{} {}", self.executable, args.join(" "));

        let output = Command::new(&self.executable)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .args(args)
            .output()?;

        if !output.status.success() {
            return Err(Error::MuxerFailed {
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

impl Muxer for FfmpegMuxer {
    fn concat(&self, listing: &Path, output: &Path, only_audio: bool) -> Result<()> {
        let mut args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            listing.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
        ];
        if only_audio {
            args.push("-vn".to_string());
        }
        args.push(output.to_string_lossy().to_string());

        self.run(args)
    }

    fn mux(&self, job: &MuxJob) -> Result<()> {
        let mut input = vec![];
        let mut maps = vec![];
        let mut metadata = vec![];
        let mut dispositions = vec![];

        // Stream indexes count per kind; a video input owns both the v and a
        // stream at its position.
        let videos = job
            .inputs
            .iter()
            .filter(|i| i.kind == TrackKind::Video)
            .count();
        let mut video_index = 0usize;
        let mut audio_index = videos;
        let mut subtitle_index = 0usize;

        for (i, track) in job.inputs.iter().enumerate() {
            input.extend(["-i".to_string(), track.path.to_string_lossy().to_string()]);
            maps.extend(["-map".to_string(), i.to_string()]);

            match track.kind {
                TrackKind::Video => {
                    metadata.extend([
                        format!("-metadata:s:v:{}", video_index),
                        format!("language={}", track.locale),
                    ]);
                    metadata.extend([
                        format!("-metadata:s:v:{}", video_index),
                        format!("title={}", track.title),
                    ]);
                    metadata.extend([
                        format!("-metadata:s:a:{}", video_index),
                        format!("language={}", track.locale),
                    ]);
                    metadata.extend([
                        format!("-metadata:s:a:{}", video_index),
                        format!("title={}", track.title),
                    ]);
                    video_index += 1;
                }
                TrackKind::Audio => {
                    metadata.extend([
                        format!("-metadata:s:a:{}", audio_index),
                        format!("language={}", track.locale),
                    ]);
                    metadata.extend([
                        format!("-metadata:s:a:{}", audio_index),
                        format!("title={}", track.title),
                    ]);
                    audio_index += 1;
                }
                TrackKind::Subtitle => {
                    metadata.extend([
                        format!("-metadata:s:s:{}", subtitle_index),
                        format!("language={}", track.locale),
                    ]);
                    metadata.extend([
                        format!("-metadata:s:s:{}", subtitle_index),
                        format!("title={}", track.title),
                    ]);

                    let mut flags = vec![];
                    if track.forced {
                        flags.push("forced");
                    }
                    if track.default {
                        flags.push("default");
                    }
                    dispositions.extend([
                        format!("-disposition:s:{}", subtitle_index),
                        if flags.is_empty() {
                            "0".to_string()
                        } else {
                            flags.join("+")
                        },
                    ]);
                    subtitle_index += 1;
                }
            }
        }

        let mut args = vec!["-y".to_string()];
        args.extend(input);
        args.extend(maps);
        args.extend(metadata);
        args.extend(dispositions);
        args.extend([
            "-c".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            job.container.clone(),
            job.output.to_string_lossy().to_string(),
        ]);

        self.run(args)
    }
}
