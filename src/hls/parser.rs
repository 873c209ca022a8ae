use crate::common::errors::{Error, Result};
use crate::hls::types::{Resolution, Segment, SegmentKey};

/// One `#EXT-X-STREAM-INF` entry of a master playlist, before it is bound
/// to an audio locale and hardsub flavor.
#[derive(Debug, Clone)]
pub struct MasterEntry {
    pub resolution: Resolution,
    pub bandwidth: u64,
    pub fps: f64,
    pub url: String,
}

/// Small M3U8 parser, handles just enough of the spec for the catalog's
/// playlists: stream variants on the master side, `#EXTINF` segments and
/// `#EXT-X-KEY` on the media side.
pub fn parse_master(text: &str, base_url: &str) -> Vec<MasterEntry> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut entries = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.starts_with("#EXT-X-STREAM-INF") {
            let bandwidth = tag_attribute(line, "BANDWIDTH")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let fps = tag_attribute(line, "FRAME-RATE")
                .and_then(|f| f.parse::<f64>().ok())
                .unwrap_or(0.0);
            let resolution = tag_attribute(line, "RESOLUTION")
                .and_then(|r| parse_resolution_attr(&r))
                .unwrap_or(Resolution {
                    width: 0,
                    height: 0,
                });

            // The uri is the next non-tag line.
            let mut j = i + 1;
            while j < lines.len() && lines[j].starts_with('#') {
                j += 1;
            }
            if j < lines.len() && !lines[j].is_empty() {
                entries.push(MasterEntry {
                    resolution,
                    bandwidth,
                    fps,
                    url: resolve_url(base_url, lines[j]),
                });
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }

    entries
}

/// Parses a media playlist into its ordered segment list.
///
/// The key of the most recent `#EXT-X-KEY` tag applies to every following
/// segment until the next key tag, so each returned [`Segment`] carries the
/// key that decrypts it.
pub fn parse_media(text: &str, base_url: &str) -> Result<Vec<Segment>> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut segments = Vec::new();
    let mut active_key: Option<SegmentKey> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.starts_with("#EXT-X-KEY") {
            active_key = parse_key(line, base_url)?;
        } else if line.starts_with("#EXTINF:") {
            let mut j = i + 1;
            while j < lines.len() && lines[j].starts_with('#') {
                if lines[j].starts_with("#EXT-X-KEY") {
                    active_key = parse_key(lines[j], base_url)?;
                }
                j += 1;
            }
            if j < lines.len() && !lines[j].is_empty() {
                segments.push(Segment {
                    index: segments.len(),
                    url: resolve_url(base_url, lines[j]),
                    key: active_key.clone(),
                });
            }
            i = j + 1;
            continue;
        }
        i += 1;
    }

    Ok(segments)
}

fn parse_key(line: &str, base_url: &str) -> Result<Option<SegmentKey>> {
    let method = tag_attribute(line, "METHOD").unwrap_or_default();
    if method == "NONE" {
        return Ok(None);
    }
    if method != "AES-128" {
        return Err(Error::Decrypt(format!(
            "unsupported encryption method '{}'",
            method
        )));
    }

    let url = tag_attribute(line, "URI")
        .map(|u| resolve_url(base_url, &u))
        .ok_or_else(|| Error::Decrypt("encrypted playlist without key uri".into()))?;

    let iv = match tag_attribute(line, "IV") {
        Some(raw) => {
            let hex_str = raw.trim_start_matches("0x").trim_start_matches("0X");
            let bytes = hex::decode(hex_str)
                .map_err(|e| Error::Decrypt(format!("invalid key iv '{}': {}", raw, e)))?;
            let iv: [u8; 16] = bytes
                .try_into()
                .map_err(|_| Error::Decrypt(format!("key iv '{}' is not 16 bytes", raw)))?;
            Some(iv)
        }
        None => None,
    };

    Ok(Some(SegmentKey { url, iv }))
}

fn parse_resolution_attr(attr: &str) -> Option<Resolution> {
    let (w, h) = attr.split_once('x')?;
    Some(Resolution {
        width: w.trim().parse().ok()?,
        height: h.trim().parse().ok()?,
    })
}

/// Returns the value of one attribute of a tag line
/// (`#EXT-X-…:KEY=VALUE,KEY="VALUE",…`).
///
/// The attribute list is walked pair by pair so that commas inside quoted
/// values (signed key uris carry them) never split a value in half.
pub fn tag_attribute(line: &str, name: &str) -> Option<String> {
    let (_, mut rest) = line.split_once(':')?;

    while !rest.is_empty() {
        let (key, after_key) = rest.split_once('=')?;

        let (value, remainder) = if let Some(quoted) = after_key.strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], quoted[end + 1..].trim_start_matches(','))
        } else {
            match after_key.split_once(',') {
                Some((value, remainder)) => (value, remainder),
                None => (after_key, ""),
            }
        };

        if key.trim().eq_ignore_ascii_case(name) {
            return Some(value.trim().to_string());
        }
        rest = remainder;
    }

    None
}

/// Resolves a possibly-relative playlist reference against the url it was
/// found in. Per RFC 3986 the base's query never leaks into the result, so
/// signing tokens on the playlist url stay off the segment urls.
pub fn resolve_url(base: &str, reference: &str) -> String {
    url::Url::parse(base)
        .and_then(|base| base.join(reference))
        .map(|joined| joined.to_string())
        .unwrap_or_else(|_| reference.to_string())
}
