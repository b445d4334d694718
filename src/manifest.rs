//! Build Manifest - the output directory as a value
//!
//! Built in memory during Name, mutated in place by Optimize, written to disk
//! once in Write. No two artifacts share a final path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::asset::AssetKind;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Severity};
use crate::hashing::sha256_hex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    /// Final path relative to the output root, `/`-separated.
    pub path: String,
    pub content: Vec<u8>,
    pub kind: AssetKind,
    /// Stable-named entry bundle.
    pub entry: bool,
    /// Source path the artifact was produced from.
    pub source: String,
    /// Copied verbatim; the optimizer leaves it alone.
    pub verbatim: bool,
}

impl OutputArtifact {
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            path: self.path.clone(),
            kind: self.kind,
            size: self.size(),
            entry: self.entry,
            source: self.source.clone(),
        }
    }
}

/// What the build report shows for each artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    pub path: String,
    pub kind: AssetKind,
    pub size: u64,
    pub entry: bool,
    pub source: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Naming collision at {path}: {first} and {second} produce different content")]
pub struct CollisionError {
    pub path: String,
    pub first: String,
    pub second: String,
}

impl From<&CollisionError> for Diagnostic {
    fn from(e: &CollisionError) -> Self {
        Diagnostic {
            kind: DiagnosticKind::NamingCollision,
            severity: Severity::Error,
            path: Some(e.path.clone()),
            message: e.to_string(),
            expected: Some(e.first.clone()),
            actual: Some(e.second.clone()),
        }
    }
}

/// What `BuildManifest::insert` did with an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Added,
    /// Identical bytes were already at the path.
    Deduplicated,
}

#[derive(Debug, Clone, Default)]
pub struct BuildManifest {
    artifacts: BTreeMap<String, OutputArtifact>,
}

impl BuildManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact. Byte-identical content at an occupied path is
    /// deduplicated (an entry flag is kept); anything else is a collision.
    pub fn insert(&mut self, artifact: OutputArtifact) -> Result<Insertion, CollisionError> {
        match self.artifacts.get_mut(&artifact.path) {
            Some(existing) if existing.content == artifact.content => {
                existing.entry |= artifact.entry;
                Ok(Insertion::Deduplicated)
            }
            Some(existing) => Err(CollisionError {
                path: artifact.path,
                first: existing.source.clone(),
                second: artifact.source,
            }),
            None => {
                self.artifacts.insert(artifact.path.clone(), artifact);
                Ok(Insertion::Added)
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&OutputArtifact> {
        self.artifacts.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputArtifact> {
        self.artifacts.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OutputArtifact> {
        self.artifacts.values_mut()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Path to content digest, the input of the manifest hash.
    pub fn digests(&self) -> BTreeMap<String, String> {
        self.artifacts
            .iter()
            .map(|(path, a)| (path.clone(), sha256_hex(&a.content)))
            .collect()
    }

    pub fn summaries(&self) -> Vec<ArtifactSummary> {
        self.iter().map(OutputArtifact::summary).collect()
    }
}
