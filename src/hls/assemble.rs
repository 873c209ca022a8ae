use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::common::errors::{Error, Result};

/// Name of the concat listing the muxer consumes.
pub const CONCAT_LIST: &str = "list.txt";

/// Returns the scratch directory's segment files sorted by ascending index.
///
/// The pool writes `<index>.ts` files in completion order; reading them back
/// sorted hides the download concurrency from every consumer. A gap in the
/// sequence means a segment never landed and is treated as an IO error.
pub fn ordered_segment_files(scratch_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut indexed: Vec<(usize, PathBuf)> = vec![];
    for entry in std::fs::read_dir(scratch_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if path.extension().and_then(|e| e.to_str()) != Some("ts") {
            continue;
        }
        if let Ok(index) = stem.parse::<usize>() {
            indexed.push((index, path));
        }
    }

    indexed.sort_by_key(|(index, _)| *index);
    for (position, (index, _)) in indexed.iter().enumerate() {
        if position != *index {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("segment {} is missing from {}", position, scratch_dir.display()),
            )));
        }
    }

    Ok(indexed.into_iter().map(|(_, path)| path).collect())
}

/// Concatenates every segment file into `sink`, in segment order.
///
/// This is the raw-stream path: MPEG-TS is a self-synchronizing byte
/// stream, so plain appending yields a playable file without a muxer.
pub fn assemble_flat(scratch_dir: &Path, sink: &mut dyn Write) -> Result<()> {
    for path in ordered_segment_files(scratch_dir)? {
        let mut reader = BufReader::new(File::open(&path)?);
        std::io::copy(&mut reader, sink)?;
    }
    sink.flush()?;
    Ok(())
}

/// Writes the ffmpeg concat-demuxer listing (`file '<path>'` per segment,
/// in order) into the scratch directory and returns its path.
pub fn write_concat_list(scratch_dir: &Path) -> Result<PathBuf> {
    let files = ordered_segment_files(scratch_dir)?;
    let list_path = scratch_dir.join(CONCAT_LIST);

    let mut writer = BufWriter::new(File::create(&list_path)?);
    for path in files {
        writeln!(writer, "file '{}'", path.display())?;
    }
    writer.flush()?;

    Ok(list_path)
}
