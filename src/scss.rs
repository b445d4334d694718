//! Sass compilation through `grass`.
//!
//! Imports are served from the scanned `SourceSet` rather than the disk, so
//! the stylesheet being compiled sees the output of earlier stages and every
//! file pulled in is recorded for the consumed set.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::asset::{SourceAsset, SourceSet};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScssError {
    #[error("{path}: {message}")]
    Compile { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    pub css: String,
    /// Stylesheets pulled in through `@import`/`@use`/`@forward`, sorted.
    pub imported: Vec<String>,
}

/// Compile `entry` (with `content` as its current text) to plain CSS.
///
/// Relative imports resolve next to the importing file; anything else is
/// also tried under each of `search_dirs`, relative to the source root.
pub fn compile(
    entry: &SourceAsset,
    content: &[u8],
    sources: &SourceSet,
    search_dirs: &[String],
) -> Result<Compiled, ScssError> {
    let fs = SourceFs {
        sources,
        entry: &entry.rel_path,
        content,
        read: RefCell::new(BTreeSet::new()),
    };
    let load_paths: Vec<PathBuf> = search_dirs.iter().map(|d| sources.root().join(d)).collect();
    let options = grass::Options::default()
        .fs(&fs)
        .style(grass::OutputStyle::Expanded)
        .load_paths(&load_paths[..])
        .quiet(true);

    let css = grass::from_path(sources.root().join(&entry.rel_path), &options).map_err(|e| {
        ScssError::Compile {
            path: entry.rel_path.clone(),
            message: e.to_string(),
        }
    })?;

    Ok(Compiled {
        css,
        imported: fs.read.into_inner().into_iter().collect(),
    })
}

/// Read-only view of a `SourceSet` as a file system rooted at its root.
struct SourceFs<'a> {
    sources: &'a SourceSet,
    entry: &'a str,
    content: &'a [u8],
    read: RefCell<BTreeSet<String>>,
}

impl fmt::Debug for SourceFs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFs")
            .field("root", &self.sources.root())
            .field("entry", &self.entry)
            .finish()
    }
}

impl SourceFs<'_> {
    fn rel_path(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(self.sources.root()).unwrap_or(path);
        let mut parts: Vec<&str> = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(s) => parts.push(s.to_str()?),
                Component::ParentDir => {
                    parts.pop()?;
                }
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(parts.join("/"))
    }
}

impl grass::Fs for SourceFs<'_> {
    fn is_dir(&self, path: &Path) -> bool {
        let Some(rel) = self.rel_path(path) else {
            return false;
        };
        let prefix = format!("{rel}/");
        self.sources.iter().any(|a| rel.is_empty() || a.rel_path.starts_with(&prefix))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.rel_path(path).map_or(false, |rel| self.sources.get(&rel).is_some())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let not_found = || io::Error::new(io::ErrorKind::NotFound, path.display().to_string());
        let rel = self.rel_path(path).ok_or_else(not_found)?;
        if rel == self.entry {
            return Ok(self.content.to_vec());
        }
        let asset = self.sources.get(&rel).ok_or_else(not_found)?;
        self.read.borrow_mut().insert(rel);
        Ok(asset.content.to_vec())
    }
}
