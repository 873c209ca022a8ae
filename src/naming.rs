use std::path::{Path, PathBuf};

use regex::Regex;

use crate::common::errors::{Error, Result};

/// Values available to the output path template.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    pub title: String,
    pub series_name: String,
    pub season_name: String,
    pub season_number: u32,
    pub episode_number: u32,
    pub resolution: String,
    pub fps: f64,
    pub audio: String,
    pub subtitle: String,
}

/// Renders `{placeholder}` substitutions into an output path.
///
/// Placeholders are an enumerated map, not struct reflection: an unknown
/// name aborts the command instead of passing through silently. Substituted
/// values are sanitized for the host filesystem; literal template text is
/// the user's own business.
pub fn render_template(template: &str, vars: &TemplateVars) -> Result<String> {
    // Anything brace-wrapped counts as a placeholder attempt, so typos like
    // `{Title}` or `{fps2}` hit the unknown-name arm instead of passing
    // through as literal text.
    let placeholder_re = Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap();

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for captures in placeholder_re.captures_iter(template) {
        let whole = captures.get(0).unwrap();
        let name = &captures[1];

        let value = match name {
            "title" => vars.title.clone(),
            "series_name" => vars.series_name.clone(),
            "season_name" => vars.season_name.clone(),
            "season_number" => format!("{:02}", vars.season_number),
            "episode_number" => format!("{:02}", vars.episode_number),
            "resolution" => vars.resolution.clone(),
            "fps" => format!("{:.2}", vars.fps),
            "audio" => vars.audio.clone(),
            "subtitle" => vars.subtitle.clone(),
            unknown => return Err(Error::Template(format!("unknown placeholder '{{{}}}'", unknown))),
        };

        out.push_str(&template[last..whole.start()]);
        out.push_str(&sanitize(&value));
        last = whole.end();
    }
    out.push_str(&template[last..]);

    Ok(out)
}

/// Strips characters the host filesystem cannot take in a file name.
pub fn sanitize(value: &str) -> String {
    let forbidden: &[char] = if cfg!(windows) {
        &['\\', '/', ':', '*', '?', '"', '<', '>', '|']
    } else {
        &['/']
    };
    value.replace(forbidden, "")
}

/// Returns a path that does not collide with an existing file, appending
/// ` (N)` before the extension, smallest free `N ≥ 1` first. The second
/// tuple member reports whether the input path was already taken.
pub fn free_file(path: PathBuf) -> (PathBuf, bool) {
    if !path.exists() {
        return (path, false);
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let (stem, extension) = split_extension(&file_name);

    for n in 1.. {
        let candidate = path.with_file_name(format!("{} ({}){}", stem, n, extension));
        if !candidate.exists() {
            return (candidate, true);
        }
    }
    unreachable!()
}

/// Splits `name` into stem and extension, keeping compound `.tar.*`
/// extensions together so `a.tar.gz` renames to `a (1).tar.gz`.
fn split_extension(name: &str) -> (&str, &str) {
    let Some(dot) = name.rfind('.') else {
        return (name, "");
    };
    let (mut stem, mut extension) = name.split_at(dot);
    if let Some(tar) = stem.strip_suffix(".tar") {
        extension = &name[tar.len()..];
        stem = tar;
    }
    (stem, extension)
}

/// Creates the parent directory of `path` when it does not exist yet.
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
