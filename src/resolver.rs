//! Package resolution: mapping rewritten imports back to package
//! directories and remembering which packages a run already precompiled.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use crate::error::{PrecompileError, Result};
use crate::module::ModuleKind;
use crate::policy::IMPORT_PREFIX;

/// Package directory as it appears on disk
pub type ImportPath = PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageState {
    InProgress,
    Done,
}

/// Result of trying to mark a package for precompilation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// First encounter; the caller now owns this package
    Fresh,
    /// Currently being resolved further up the stack
    InProgress,
    /// Already precompiled in this run
    Done,
}

/// Packages precompiled during one orchestrator run.
///
/// `mark` is a single test-and-insert under the lock, so a package is
/// claimed at most once even when discovered from several dependents.
#[derive(Debug, Default)]
pub struct PrecompiledSet {
    packages: Mutex<HashMap<ImportPath, PackageState>>,
}

impl PrecompiledSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ImportPath, PackageState>> {
        self.packages.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `pkg` if nobody has, otherwise report its state
    pub fn mark(&self, pkg: &Path) -> Mark {
        let mut packages = self.lock();
        match packages.get(pkg) {
            Some(PackageState::Done) => Mark::Done,
            Some(PackageState::InProgress) => Mark::InProgress,
            None => {
                packages.insert(pkg.to_path_buf(), PackageState::InProgress);
                Mark::Fresh
            }
        }
    }

    /// Record that `pkg` finished, successfully or not
    pub fn finish(&self, pkg: &Path) {
        self.lock().insert(pkg.to_path_buf(), PackageState::Done);
    }

    pub fn is_precompiled(&self, pkg: &Path) -> bool {
        self.lock().contains_key(pkg)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Every package marked so far, sorted
    pub fn packages(&self) -> Vec<ImportPath> {
        let mut pkgs: Vec<_> = self.lock().keys().cloned().collect();
        pkgs.sort();
        pkgs
    }
}

/// Chain of packages currently being resolved, used to name cycles.
///
/// Each frame remembers the kind of file whose import entered it. Go lets
/// a test or filetest import its own package, and lets an external test
/// package import anything that imports the package under test, so only a
/// chain made entirely of implementation imports is a cycle.
#[derive(Debug, Default, Clone)]
pub struct ResolutionStack {
    frames: Vec<(ImportPath, ModuleKind)>,
}

impl ResolutionStack {
    /// Enter `pkg` through an import made from a file of kind `via`.
    /// Packages given on the command line enter as implementation.
    pub fn push(&mut self, pkg: ImportPath, via: ModuleKind) {
        self.frames.push((pkg, via));
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether importing `pkg` from a file of kind `importer` closes a
    /// real cycle
    pub fn closes_cycle(&self, pkg: &Path, importer: ModuleKind) -> bool {
        if importer != ModuleKind::Implementation {
            return false;
        }
        match self.frames.iter().position(|(p, _)| p == pkg) {
            Some(start) => self.frames[start + 1..]
                .iter()
                .all(|(_, via)| *via == ModuleKind::Implementation),
            None => false,
        }
    }

    /// Error describing the cycle closed by revisiting `pkg`
    pub fn cycle_error(&self, pkg: &Path) -> PrecompileError {
        let start = self.frames.iter().position(|(p, _)| p == pkg).unwrap_or(0);
        let mut chain: Vec<String> = self.frames[start..]
            .iter()
            .map(|(p, _)| p.display().to_string())
            .collect();
        chain.push(pkg.display().to_string());
        PrecompileError::ImportCycle {
            chain: chain.join(" -> "),
        }
    }
}

/// Package directory for a rewritten import, relative to the Gno
/// repository root. `None` for imports outside the repository.
pub fn package_dir_for_import(import: &str, root_dir: &Path) -> Option<ImportPath> {
    let rest = import.strip_prefix(IMPORT_PREFIX)?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        return Some(root_dir.to_path_buf());
    }
    Some(root_dir.join(rest))
}

/// Directory where artifacts for sources in `src_dir` are written.
///
/// With the default output (`.`) artifacts sit next to their sources.
/// Otherwise the source directory, taken relative to `root_dir`, is
/// recreated under `output`.
pub fn resolve_output_dir(output: &Path, root_dir: &Path, src_dir: &Path) -> Result<PathBuf> {
    if output == Path::new(".") {
        return Ok(src_dir.to_path_buf());
    }
    let abs_output = absolute(output)?;
    let abs_src = absolute(src_dir)?;
    let abs_root = absolute(root_dir)?;

    let relative = abs_src.strip_prefix(&abs_root).unwrap_or(&abs_src);
    let relative: PathBuf = relative
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    Ok(abs_output.join(relative))
}

/// Absolute, lexically normalized form of `path`
pub fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| PrecompileError::io(path, e))?
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}
