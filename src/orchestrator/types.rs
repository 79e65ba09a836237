//! Orchestrator data types.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::module::{MemPackage, ModuleKind};

/// A Go file written by the precompiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Where the file was written
    pub path: PathBuf,
    /// Gno source it was generated from
    pub source: PathBuf,
    /// Generated filename (last component of `path`)
    pub filename: String,
    /// Build constraint written into the header
    pub tags: String,
    pub kind: ModuleKind,
}

/// Everything one run produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrecompileReport {
    /// Artifacts still on disk, in write order
    pub artifacts: Vec<GeneratedArtifact>,
    /// Package directories precompiled during the run, roots included
    pub packages: Vec<PathBuf>,
}

impl PrecompileReport {
    /// Artifacts written into `dir`
    pub fn artifacts_in<'a>(
        &'a self,
        dir: &'a Path,
    ) -> impl Iterator<Item = &'a GeneratedArtifact> {
        self.artifacts
            .iter()
            .filter(move |a| a.path.parent() == Some(dir))
    }
}

/// Input of the translate-and-check flow
#[derive(Debug, Clone, Copy)]
pub enum CheckSource<'a> {
    /// An in-memory package, written to a temporary directory first
    Memory(&'a MemPackage),
    /// Files or package directories already on disk
    Paths(&'a [PathBuf]),
}
