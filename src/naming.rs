//! Output Namer - final paths for transformed and copied assets
//!
//! Entry bundles get stable `[stem].ext` names so pages can reference them
//! directly. Every other transformed asset is fingerprinted by content.
//! Assets no rule touched keep their source-relative path.
//!
//! A fingerprint covers the transformed bytes as they leave the stage chain.
//! The `sourceMappingURL` trailer added in development names the fingerprinted
//! file itself, so it is appended after naming and is not part of the hash.

use crate::asset::{AssetKind, SourceAsset};
use crate::config::BuildConfig;
use crate::hashing::content_hash;
use crate::manifest::OutputArtifact;
use crate::stages::static_copy::StaticFile;
use crate::stages::TransformResult;

/// A transformed asset's primary artifact and its optional `.map` sidecar.
#[derive(Debug, Clone)]
pub struct Named {
    pub primary: OutputArtifact,
    pub source_map: Option<OutputArtifact>,
}

pub struct OutputNamer<'a> {
    hash_length: usize,
    entries: &'a [String],
}

impl<'a> OutputNamer<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self {
            hash_length: config.effective_hash_length(),
            entries: &config.entry_points,
        }
    }

    pub fn is_entry(&self, rel_path: &str) -> bool {
        self.entries.iter().any(|e| e == rel_path)
    }

    /// Name a transformed asset, with a sidecar when the result carries a
    /// source map.
    pub fn transformed(&self, asset: &SourceAsset, result: TransformResult) -> Named {
        let entry = self.is_entry(&asset.rel_path);
        let extension = result
            .kind
            .output_extension()
            .or_else(|| asset.extension())
            .map(str::to_string);

        let base = if entry {
            asset.stem().to_string()
        } else {
            content_hash(&result.content, self.hash_length)
        };
        let path = match extension {
            Some(ext) => format!("{base}.{ext}"),
            None => base,
        };

        let mut content = result.content;
        let source_map = result.source_map.map(|map| {
            let map_path = format!("{path}.map");
            let file_name = map_path.rsplit('/').next().unwrap_or(&map_path);
            if !content.ends_with(b"\n") {
                content.push(b'\n');
            }
            content.extend_from_slice(format!("//# sourceMappingURL={file_name}\n").as_bytes());
            OutputArtifact {
                path: map_path.clone(),
                content: map,
                kind: AssetKind::Other,
                entry: false,
                source: asset.rel_path.clone(),
                verbatim: true,
            }
        });

        Named {
            primary: OutputArtifact {
                path,
                content,
                kind: result.kind,
                entry,
                source: asset.rel_path.clone(),
                verbatim: false,
            },
            source_map,
        }
    }

    /// An asset no rule matched: same relative path, same bytes.
    pub fn verbatim(&self, asset: &SourceAsset) -> OutputArtifact {
        OutputArtifact {
            path: asset.rel_path.clone(),
            content: asset.content.to_vec(),
            kind: asset.kind,
            entry: self.is_entry(&asset.rel_path),
            source: asset.rel_path.clone(),
            verbatim: true,
        }
    }

    pub fn static_file(&self, file: StaticFile, static_root: &str) -> OutputArtifact {
        let kind = AssetKind::detect(std::path::Path::new(&file.rel_path));
        OutputArtifact {
            source: format!("{static_root}/{}", file.rel_path),
            path: file.rel_path,
            content: file.content,
            kind,
            entry: false,
            verbatim: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn asset(rel: &str, content: &str) -> SourceAsset {
        SourceAsset::new(PathBuf::from("/src").join(rel), rel.to_string(), content.as_bytes().to_vec())
    }

    #[test]
    fn test_entry_names_are_stable() {
        let config = BuildConfig::default();
        let namer = OutputNamer::new(&config);
        let js = namer.transformed(&asset("app/index.js", "a"), TransformResult::new(b"a".to_vec(), AssetKind::Script));
        let css = namer.transformed(&asset("styles/index.scss", ""), TransformResult::new(b".a{}".to_vec(), AssetKind::Style));
        assert_eq!(js.primary.path, "index.js");
        assert!(js.primary.entry);
        assert_eq!(css.primary.path, "index.css");
    }

    #[test]
    fn test_fingerprinted_names() {
        let config = BuildConfig::default();
        let namer = OutputNamer::new(&config);
        let a = namer.transformed(&asset("shared/logo.png", "x"), TransformResult::new(b"x".to_vec(), AssetKind::Image));
        let b = namer.transformed(&asset("shared/icon.png", "y"), TransformResult::new(b"y".to_vec(), AssetKind::Image));
        let c = namer.transformed(&asset("other/logo.png", "x"), TransformResult::new(b"x".to_vec(), AssetKind::Image));
        assert_eq!(a.primary.path, format!("{}.png", content_hash(b"x", 20)));
        assert_ne!(a.primary.path, b.primary.path);
        assert_eq!(a.primary.path, c.primary.path);
        assert!(!a.primary.entry);
    }

    #[test]
    fn test_raw_module_gets_script_extension() {
        let config = BuildConfig::default();
        let namer = OutputNamer::new(&config);
        let out = namer.transformed(
            &asset("app/gl/wave.frag", ""),
            TransformResult::new(b"export default \"\";\n".to_vec(), AssetKind::Script),
        );
        assert!(out.primary.path.ends_with(".js"));
        assert!(out.source_map.is_none());
    }

    #[test]
    fn test_source_map_sidecar() {
        let config = BuildConfig::default();
        let namer = OutputNamer::new(&config);
        let mut result = TransformResult::new(b"a()".to_vec(), AssetKind::Script);
        result.source_map = Some(b"{}".to_vec());
        let out = namer.transformed(&asset("app/index.js", "a()"), result);
        assert_eq!(out.primary.content, b"a()\n//# sourceMappingURL=index.js.map\n");
        let map = out.source_map.unwrap();
        assert_eq!(map.path, "index.js.map");
        assert_eq!(map.content, b"{}");
    }

    #[test]
    fn test_fingerprint_excludes_source_map_trailer() {
        let config = BuildConfig::default();
        let namer = OutputNamer::new(&config);
        let mut result = TransformResult::new(b"util()".to_vec(), AssetKind::Script);
        result.source_map = Some(b"{}".to_vec());
        let out = namer.transformed(&asset("app/util.js", "util()"), result);

        let hashed = format!("{}.js", content_hash(b"util()", 20));
        assert_eq!(out.primary.path, hashed);
        let trailer = format!("//# sourceMappingURL={hashed}.map\n");
        assert!(out.primary.content.ends_with(trailer.as_bytes()));
    }

    #[test]
    fn test_verbatim_keeps_path_and_bytes() {
        let config = BuildConfig::default();
        let namer = OutputNamer::new(&config);
        let out = namer.verbatim(&asset("node_modules/lib/x.js", "raw"));
        assert_eq!(out.path, "node_modules/lib/x.js");
        assert_eq!(out.content, b"raw");
        assert!(out.verbatim);
    }
}
