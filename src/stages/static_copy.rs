//! Static copy: everything under the static directory is mirrored into the
//! output root with its relative path, untouched by rules.

use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::asset::relative_slash_path;

/// A file to be copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFile {
    /// Output path, relative to the output root.
    pub rel_path: String,
    pub content: Vec<u8>,
}

/// Collect every regular file below `dir`, in path order.
/// A missing directory yields nothing.
pub fn collect(dir: &Path) -> std::io::Result<Vec<StaticFile>> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "no static directory");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        files.push(StaticFile {
            rel_path: relative_slash_path(dir, entry.path()),
            content: fs::read(entry.path())?,
        });
    }

    debug!(dir = %dir.display(), count = files.len(), "collected static files");
    Ok(files)
}
