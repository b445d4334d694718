//! Optimizer - post-naming compaction of production artifacts
//!
//! Each artifact is optimized independently. A failure keeps the original
//! bytes and becomes a warning; it never fails the build.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{ColorType, DynamicImage, ExtendedColorType, ImageEncoder};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

use crate::asset::AssetKind;
use crate::config::OptimizationConfig;
use crate::diagnostics::Diagnostic;
use crate::manifest::{BuildManifest, OutputArtifact};
use crate::script::{self, SyntaxError};
use crate::stages::style::compile_css;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static OPTIMIZE_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_optimize_call_count() -> u32 {
    OPTIMIZE_CALL_COUNT.load(Ordering::SeqCst)
}

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("Script minification failed: {0}")]
    Script(#[from] SyntaxError),

    #[error("CSS minification failed: {0}")]
    Css(String),

    #[error("Image re-encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Artifact is not valid UTF-8")]
    Encoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageFormat {
    Png,
    Jpeg,
    WebP,
}

impl ImageFormat {
    fn of(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }
}

pub struct Optimizer<'a> {
    config: &'a OptimizationConfig,
}

impl<'a> Optimizer<'a> {
    pub fn new(config: &'a OptimizationConfig) -> Self {
        Self { config }
    }

    /// Optimize every eligible artifact in place, in parallel. Returns one
    /// warning per artifact whose optimization failed.
    pub fn run(&self, manifest: &mut BuildManifest) -> Vec<Diagnostic> {
        let mut artifacts: Vec<&mut OutputArtifact> = manifest.iter_mut().filter(|a| !a.verbatim).collect();

        artifacts
            .par_iter_mut()
            .filter_map(|artifact| match self.optimize(artifact) {
                Ok(Some(bytes)) => {
                    debug!(path = %artifact.path, before = artifact.content.len(), after = bytes.len(), "optimized");
                    artifact.content = bytes;
                    None
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(path = %artifact.path, error = %e, "optimization failed, keeping original");
                    Some(Diagnostic::optimization_error(&artifact.path, e.to_string()))
                }
            })
            .collect()
    }

    /// Optimized bytes for `artifact`, or `None` when there is nothing to gain.
    pub fn optimize(&self, artifact: &OutputArtifact) -> Result<Option<Vec<u8>>, OptimizeError> {
        #[cfg(feature = "test-hooks")]
        OPTIMIZE_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        match artifact.kind {
            AssetKind::Script if self.config.minify => {
                let code = std::str::from_utf8(&artifact.content).map_err(|_| OptimizeError::Encoding)?;
                Ok(Some(script::minify(code)?.into_bytes()))
            }
            AssetKind::Style if self.config.minify => {
                let code = std::str::from_utf8(&artifact.content).map_err(|_| OptimizeError::Encoding)?;
                let css = compile_css(&artifact.path, code, true).map_err(OptimizeError::Css)?;
                Ok(Some(css.into_bytes()))
            }
            AssetKind::Image => self.reencode(artifact),
            _ => Ok(None),
        }
    }

    fn reencode(&self, artifact: &OutputArtifact) -> Result<Option<Vec<u8>>, OptimizeError> {
        let Some(format) = ImageFormat::of(&artifact.path) else {
            return Ok(None);
        };
        let img = image::load_from_memory(&artifact.content)?;

        let encoded = match format {
            ImageFormat::Png => match encode_png(&img)? {
                Some(bytes) => bytes,
                None => return Ok(None),
            },
            ImageFormat::Jpeg => encode_jpeg(&img, self.config.image_quality)?,
            ImageFormat::WebP => encode_webp(&img)?,
        };

        if encoded.len() < artifact.content.len() {
            Ok(Some(encoded))
        } else {
            Ok(None)
        }
    }
}

/// Lossless re-encode at maximum compression. 16-bit and float images are
/// left alone.
fn encode_png(img: &DynamicImage) -> Result<Option<Vec<u8>>, OptimizeError> {
    let color = img.color();
    if !matches!(color, ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8) {
        return Ok(None);
    }
    let mut buf = Vec::new();
    PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive)
        .write_image(img.as_bytes(), img.width(), img.height(), color.into())?;
    Ok(Some(buf))
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, OptimizeError> {
    let (pixels, color) = match img.color() {
        ColorType::L8 => (img.as_bytes().to_vec(), ExtendedColorType::L8),
        _ => (img.to_rgb8().into_raw(), ExtendedColorType::Rgb8),
    };
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .write_image(&pixels, img.width(), img.height(), color)?;
    Ok(buf)
}

/// Lossless WebP. Pixels are widened to 8-bit RGB(A) first.
fn encode_webp(img: &DynamicImage) -> Result<Vec<u8>, OptimizeError> {
    let (pixels, color) = if img.color().has_alpha() {
        (img.to_rgba8().into_raw(), ExtendedColorType::Rgba8)
    } else {
        (img.to_rgb8().into_raw(), ExtendedColorType::Rgb8)
    };
    let mut buf = Vec::new();
    WebPEncoder::new_lossless(&mut buf).write_image(&pixels, img.width(), img.height(), color)?;
    Ok(buf)
}
