//! Destination paths from templates.

use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};
use std::path::{Path, PathBuf};

use crate::task::Item;

static FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([a-z]+)").unwrap());
static ILLEGAL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).unwrap());

/// Make a string safe to use as a single path component.
pub fn sanitize_component(s: &str) -> String {
    let cleaned = ILLEGAL.replace_all(s, "_");
    let trimmed = cleaned.trim().trim_start_matches('.').trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

fn field_value(item: &Item, name: &str) -> Option<String> {
    let value = match name {
        "albumartist" => item.effective_albumartist().to_string(),
        "artist" => item.artist.clone(),
        "album" => item.album.clone(),
        "title" => item.title.clone(),
        "track" => format!("{:02}", item.track),
        "disc" => item.disc.to_string(),
        "year" => item.year.map(|y| y.to_string()).unwrap_or_default(),
        _ => return None,
    };
    Some(value)
}

/// Destination for `item` under `root`, following `template`.
///
/// Each `/`-separated template segment becomes one sanitized path
/// component; unknown `$fields` are kept literally. The source file's
/// extension is appended.
pub fn destination_for(root: &Path, template: &str, item: &Item) -> PathBuf {
    let mut dest = root.to_path_buf();
    for segment in template.split('/').filter(|s| !s.is_empty()) {
        let expanded = FIELD.replace_all(segment, |caps: &Captures| {
            field_value(item, &caps[1]).unwrap_or_else(|| caps[0].to_string())
        });
        dest.push(sanitize_component(&expanded));
    }
    if let Some(ext) = item.path.extension() {
        let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".");
        name.push(ext);
        dest.set_file_name(name);
    }
    dest
}
