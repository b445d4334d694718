//! Source Assets - what the pipeline reads
//!
//! A `SourceAsset` is read once per build and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum AssetKind {
    Script,
    Style,
    RawText,
    Image,
    Font,
    /// Anything the pipeline has no detector for. Only ever copied verbatim.
    Other,
}

impl AssetKind {
    /// Detect the kind of a file from its extension (case-insensitive).
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "js" | "mjs" | "cjs" => Self::Script,
            "scss" | "sass" | "css" => Self::Style,
            "glsl" | "frag" | "vert" => Self::RawText,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" => Self::Image,
            "woff" | "woff2" | "eot" | "ttf" | "otf" | "fnt" => Self::Font,
            _ => Self::Other,
        }
    }

    /// Extension used when an artifact of this kind is renamed.
    /// `None` means "keep the source extension".
    pub fn output_extension(&self) -> Option<&'static str> {
        match self {
            Self::Script => Some("js"),
            Self::Style => Some("css"),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Style => "style",
            Self::RawText => "raw-text",
            Self::Image => "image",
            Self::Font => "font",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SourceAsset {
    pub path: PathBuf,
    /// Path relative to the source root, always `/`-separated.
    pub rel_path: String,
    pub content: Arc<[u8]>,
    pub kind: AssetKind,
}

impl SourceAsset {
    pub fn new(path: PathBuf, rel_path: String, content: Vec<u8>) -> Self {
        let kind = AssetKind::detect(&path);
        Self {
            path,
            rel_path,
            content: content.into(),
            kind,
        }
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        self.path.file_stem().and_then(|s| s.to_str()).unwrap_or("asset")
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|s| s.to_str())
    }

    /// Sass-style partial: a stylesheet whose file name starts with `_`.
    /// Partials only exist to be imported and are never compiled on their own.
    pub fn is_partial(&self) -> bool {
        self.kind == AssetKind::Style
            && self
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with('_'))
    }
}

/// Everything read from the source tree in one build, keyed by relative path.
#[derive(Debug, Default)]
pub struct SourceSet {
    root: PathBuf,
    assets: BTreeMap<String, SourceAsset>,
}

impl SourceSet {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            assets: BTreeMap::new(),
        }
    }

    /// Walk `root`, reading every file that is not excluded.
    ///
    /// `skip_dirs` are absolute directories pruned from the walk (output and
    /// static-copy directories). `ignore` patterns match relative paths.
    pub fn scan(
        root: &Path,
        skip_dirs: &[PathBuf],
        ignore: &[glob::Pattern],
    ) -> std::io::Result<Self> {
        let mut set = Self::new(root.to_path_buf());

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !skip_dirs.iter().any(|d| e.path() == d.as_path()));

        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = relative_slash_path(root, entry.path());
            if ignore.iter().any(|p| p.matches(&rel)) {
                debug!(path = %rel, "ignored");
                continue;
            }
            let content = fs::read(entry.path())?;
            set.insert(SourceAsset::new(entry.path().to_path_buf(), rel, content));
        }

        debug!(root = %root.display(), count = set.len(), "scanned sources");
        Ok(set)
    }

    pub fn insert(&mut self, asset: SourceAsset) {
        self.assets.insert(asset.rel_path.clone(), asset);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, rel_path: &str) -> Option<&SourceAsset> {
        self.assets.get(rel_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceAsset> {
        self.assets.values()
    }

    /// Resolve an import `spec` written in `from` (a relative path).
    ///
    /// `./` and `../` specifiers are looked up next to the importer only.
    /// Anything else is tried next to the importer, then under each of
    /// `search_dirs`. `candidates` expands one joined path into the file
    /// names to try, in order.
    pub fn resolve(
        &self,
        from: &str,
        spec: &str,
        search_dirs: &[String],
        candidates: impl Fn(&str) -> Vec<String>,
    ) -> Option<&SourceAsset> {
        let from_dir = parent_slash_path(from);
        let relative = spec.starts_with("./") || spec.starts_with("../");
        let roots = std::iter::once(from_dir)
            .chain(search_dirs.iter().map(String::as_str).filter(|_| !relative));

        for root in roots {
            let Some(joined) = join_slash_path(root, spec) else {
                continue;
            };
            for candidate in candidates(&joined) {
                if let Some(asset) = self.get(&candidate) {
                    return Some(asset);
                }
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// `/`-separated path of `path` relative to `root`.
pub fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Lexically join a relative import onto a `/`-separated directory,
/// resolving `.` and `..`. Returns `None` if the result escapes the root.
pub fn join_slash_path(dir: &str, import: &str) -> Option<String> {
    let mut parts: Vec<&str> = if import.starts_with('/') {
        Vec::new()
    } else {
        dir.split('/').filter(|s| !s.is_empty()).collect()
    };
    for seg in import.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(parts.join("/"))
}

/// Directory part of a `/`-separated relative path (`""` at the root).
pub fn parent_slash_path(rel_path: &str) -> &str {
    rel_path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_kinds() {
        assert_eq!(AssetKind::detect(Path::new("a/index.js")), AssetKind::Script);
        assert_eq!(AssetKind::detect(Path::new("a/_vars.scss")), AssetKind::Style);
        assert_eq!(AssetKind::detect(Path::new("s/wave.FRAG")), AssetKind::RawText);
        assert_eq!(AssetKind::detect(Path::new("logo.jpeg")), AssetKind::Image);
        assert_eq!(AssetKind::detect(Path::new("f/inter.woff2")), AssetKind::Font);
        assert_eq!(AssetKind::detect(Path::new("robots.txt")), AssetKind::Other);
        assert_eq!(AssetKind::detect(Path::new("Makefile")), AssetKind::Other);
    }

    #[test]
    fn test_partial_detection() {
        let partial = SourceAsset::new("styles/_vars.scss".into(), "styles/_vars.scss".into(), vec![]);
        let entry = SourceAsset::new("styles/index.scss".into(), "styles/index.scss".into(), vec![]);
        let script = SourceAsset::new("app/_init.js".into(), "app/_init.js".into(), vec![]);
        assert!(partial.is_partial());
        assert!(!entry.is_partial());
        assert!(!script.is_partial());
    }

    #[test]
    fn test_join_slash_path() {
        assert_eq!(join_slash_path("app/gl", "./shaders/a.glsl").as_deref(), Some("app/gl/shaders/a.glsl"));
        assert_eq!(join_slash_path("app/gl", "../b.glsl").as_deref(), Some("app/b.glsl"));
        assert_eq!(join_slash_path("", "x.glsl").as_deref(), Some("x.glsl"));
        assert_eq!(join_slash_path("app", "../../x"), None);
    }

    #[test]
    fn test_scan_skips_dirs_and_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("app")).unwrap();
        fs::create_dir_all(root.join("public")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("app/index.js"), "x").unwrap();
        fs::write(root.join("public/old.js"), "y").unwrap();
        fs::write(root.join(".git/HEAD"), "z").unwrap();

        let ignore = vec![glob::Pattern::new(".git/**").unwrap()];
        let set = SourceSet::scan(root, &[root.join("public")], &ignore).unwrap();

        assert_eq!(set.len(), 1);
        let asset = set.get("app/index.js").unwrap();
        assert_eq!(asset.kind, AssetKind::Script);
        assert_eq!(&*asset.content, b"x");
    }
}
