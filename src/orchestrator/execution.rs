//! Precompiler execution engine.

use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::types::{CheckSource, GeneratedArtifact, PrecompileReport};
use crate::codegen::{is_generated_file, precompile_filename_and_tags, Header};
use crate::config::PrecompileConfig;
use crate::error::{AggregateError, PrecompileError, Result};
use crate::module::{
    gno_files_from_args, gno_packages_from_args, glob_gno_files, MemFile, MemPackage, ModuleKind,
};
use crate::resolver::{
    absolute, package_dir_for_import, resolve_output_dir, Mark, PrecompiledSet, ResolutionStack,
};
use crate::toolchain::{CancelToken, GoToolchain, ENTRY_FILENAME};
use crate::translate::translate;

/// Drives translation, import resolution and the Go toolchain for one run
pub struct Precompiler {
    config: PrecompileConfig,
    toolchain: GoToolchain,
    precompiled: PrecompiledSet,
    stack: ResolutionStack,
    artifacts: Vec<GeneratedArtifact>,
}

impl Precompiler {
    pub fn new(config: PrecompileConfig) -> Self {
        Self::with_cancel(config, CancelToken::new())
    }

    /// Precompiler whose toolchain processes are killed once `cancel` fires
    pub fn with_cancel(config: PrecompileConfig, cancel: CancelToken) -> Self {
        let toolchain = GoToolchain::new(&config, cancel);
        Self {
            config,
            toolchain,
            precompiled: PrecompiledSet::new(),
            stack: ResolutionStack::default(),
            artifacts: Vec::new(),
        }
    }

    pub fn config(&self) -> &PrecompileConfig {
        &self.config
    }

    pub fn precompiled(&self) -> &PrecompiledSet {
        &self.precompiled
    }

    pub fn toolchain(&self) -> &GoToolchain {
        &self.toolchain
    }

    /// Artifacts written so far and not yet cleaned up
    pub fn artifacts(&self) -> &[GeneratedArtifact] {
        &self.artifacts
    }

    pub fn report(&self) -> PrecompileReport {
        PrecompileReport {
            artifacts: self.artifacts.clone(),
            packages: self.precompiled.packages(),
        }
    }

    /// Precompile every Gno file under `paths`, then build if configured.
    ///
    /// Translation failures are collected across all files before
    /// returning.
    pub fn precompile_paths(&mut self, paths: &[PathBuf]) -> Result<()> {
        self.translate_roots(paths)?;
        if self.config.go_build {
            self.build_paths(paths)?;
        }
        Ok(())
    }

    /// Translate the files named by `paths`, grouped by package directory.
    ///
    /// Each directory is marked before its files are translated, so a root
    /// package that another root already pulled in as an import is not
    /// translated twice.
    fn translate_roots(&mut self, paths: &[PathBuf]) -> Result<()> {
        let files = gno_files_from_args(paths)?;
        info!("Precompiling {} file(s)", files.len());

        let mut packages: IndexMap<PathBuf, Vec<PathBuf>> = IndexMap::new();
        for file in files {
            let dir = absolute(parent_dir(&file))?;
            packages.entry(dir).or_default().push(file);
        }

        let mut errors = AggregateError::new();
        for (dir, files) in packages {
            if self.precompiled.mark(&dir) != Mark::Fresh {
                debug!("{} already precompiled", dir.display());
                continue;
            }
            self.stack.push(dir.clone(), ModuleKind::Implementation);
            for file in &files {
                if let Err(e) = self.precompile_file(file) {
                    warn!("{}: {}", file.display(), e);
                    errors.push(e.in_file(file));
                }
            }
            self.stack.pop();
            self.precompiled.finish(&dir);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PrecompileError::TranslateFailed {
                count: errors.len(),
                errors,
            })
        }
    }

    /// Precompile every Gno file of an imported package, once per run
    pub fn precompile_pkg(&mut self, pkg: &Path) -> Result<()> {
        self.resolve_package(pkg, ModuleKind::Implementation)
    }

    /// Precompile `pkg` as imported from a file of kind `importer`.
    ///
    /// Reaching a package still in progress is a cycle only along a chain
    /// of implementation imports. Test and filetest files may import their
    /// own package, directly or through another one.
    fn resolve_package(&mut self, pkg: &Path, importer: ModuleKind) -> Result<()> {
        let key = absolute(pkg)?;
        match self.precompiled.mark(&key) {
            Mark::Done => {
                debug!("{} already precompiled", key.display());
                return Ok(());
            }
            Mark::InProgress if self.stack.closes_cycle(&key, importer) => {
                return Err(self.stack.cycle_error(&key));
            }
            Mark::InProgress => {
                debug!("{} in progress, imported from a test", key.display());
                return Ok(());
            }
            Mark::Fresh => {}
        }

        self.stack.push(key.clone(), importer);
        let result = self.precompile_pkg_files(&key);
        self.stack.pop();
        self.precompiled.finish(&key);
        result
    }

    fn precompile_pkg_files(&mut self, pkg: &Path) -> Result<()> {
        if !pkg.is_dir() {
            debug!("Package {} not found on disk, skipping", pkg.display());
            return Ok(());
        }
        info!("Precompiling imported package {}", pkg.display());

        let mut errors = AggregateError::new();
        for file in glob_gno_files(pkg)? {
            if let Err(e) = self.precompile_file(&file) {
                errors.push(e.in_file(&file));
            }
        }
        errors.into_result()
    }

    /// Translate one file to disk, format-check it and resolve its imports
    pub fn precompile_file(&mut self, src: &Path) -> Result<()> {
        if self.config.verbose {
            info!("{}", src.display());
        }

        let source = fs::read_to_string(src).map_err(|e| PrecompileError::io(src, e))?;
        let (filename, tags) = precompile_filename_and_tags(src);
        let src_name = src.to_string_lossy();
        let kind = ModuleKind::from_filename(&src_name);
        let result = translate(&source, Header::Tagged(tags), &src_name)?.check()?;
        let translated = if self.config.skip_fmt {
            result.translated.clone()
        } else {
            self.toolchain.format_source(&result.translated, &src_name)?
        };

        let target_dir =
            resolve_output_dir(&self.config.output, &self.config.root_dir, parent_dir(src))?;
        let target = target_dir.join(&filename);
        fs::create_dir_all(&target_dir).map_err(|e| PrecompileError::io(&target_dir, e))?;
        fs::write(&target, &translated).map_err(|e| PrecompileError::io(&target, e))?;
        debug!("Wrote {}", target.display());

        self.record(GeneratedArtifact {
            path: target.clone(),
            source: src.to_path_buf(),
            filename,
            tags: tags.to_string(),
            kind,
        });

        if !self.config.skip_fmt {
            self.toolchain.format_check(&target)?;
        }

        if self.config.skip_imports {
            return Ok(());
        }

        let mut errors = AggregateError::new();
        let imports: Vec<String> = result.repository_imports().map(str::to_string).collect();
        for import in imports {
            let Some(dir) = package_dir_for_import(&import, &self.config.root_dir) else {
                continue;
            };
            if let Err(e) = self.resolve_package(&dir, kind) {
                errors.push(e);
            }
        }
        errors.into_result()
    }

    fn record(&mut self, artifact: GeneratedArtifact) {
        if !self.artifacts.iter().any(|a| a.path == artifact.path) {
            self.artifacts.push(artifact);
        }
    }

    /// Build the generated files of each package under `paths`
    pub fn build_paths(&self, paths: &[PathBuf]) -> Result<()> {
        let mut errors = AggregateError::new();
        for dir in self.output_dirs(paths)? {
            if let Err(e) = self.toolchain.build_package(&dir) {
                warn!("{}", e);
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PrecompileError::BuildFailed {
                count: errors.len(),
                errors,
            })
        }
    }

    /// Directories holding the artifacts for the packages under `paths`
    fn output_dirs(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for pkg in gno_packages_from_args(paths)? {
            let src_dir = if pkg.is_dir() {
                pkg
            } else {
                parent_dir(&pkg).to_path_buf()
            };
            let dir = resolve_output_dir(&self.config.output, &self.config.root_dir, &src_dir)?;
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        Ok(dirs)
    }

    /// Translate and build, then remove every generated artifact.
    ///
    /// An in-memory package is written to a temporary directory under the
    /// current directory first, so the Go module lookup behaves as it would
    /// for a package in the working tree. Cleanup always runs; a cleanup
    /// failure is returned ahead of the check's own outcome.
    pub fn check_package(&mut self, source: CheckSource<'_>) -> Result<()> {
        let mut tmp_dir = None;
        let paths = match source {
            CheckSource::Memory(pkg) => {
                let dir = write_temp_package(pkg)?;
                let path = dir.path().to_path_buf();
                tmp_dir = Some(dir);
                vec![path]
            }
            CheckSource::Paths(paths) => paths.to_vec(),
        };

        let outcome = self.translate_and_build(&paths);

        let cleanup = self.cleanup_artifacts();
        let tmp_cleanup = match tmp_dir {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                dir.close().map_err(|source| PrecompileError::Cleanup { path, source })
            }
            None => Ok(()),
        };

        if let Err(e) = &outcome {
            debug!("Check failed before cleanup: {}", e);
        }
        cleanup?;
        tmp_cleanup?;
        outcome
    }

    fn translate_and_build(&mut self, paths: &[PathBuf]) -> Result<()> {
        self.translate_roots(paths)?;
        self.build_paths(paths)
    }

    /// Remove every artifact recorded so far, including those of
    /// transitively precompiled packages
    pub fn cleanup_artifacts(&mut self) -> Result<()> {
        let mut first_err = None;
        for artifact in self.artifacts.drain(..) {
            match fs::remove_file(&artifact.path) {
                Ok(()) => debug!("Removed {}", artifact.path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    warn!("Failed to remove {}: {}", artifact.path.display(), source);
                    if first_err.is_none() {
                        first_err = Some(PrecompileError::Cleanup {
                            path: artifact.path,
                            source,
                        });
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Translate and execute each file of `pkg` as a standalone program.
    ///
    /// Outputs are concatenated in file order. Compiler diagnostics are
    /// rewritten to point at `logical_path`.
    pub fn run_package(&self, pkg: &MemPackage, logical_path: &str) -> Result<String> {
        let mut errors = AggregateError::new();
        let mut output = String::new();
        for file in pkg.gno_files() {
            match self.run_file(file, logical_path) {
                Ok(out) => output.push_str(&out),
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() {
            Ok(output)
        } else {
            Err(PrecompileError::Aggregate(errors))
        }
    }

    fn run_file(&self, file: &MemFile, logical_path: &str) -> Result<String> {
        let result = translate(&file.body, Header::Suppressed, &file.name)?.check()?;

        let dir = tempfile::Builder::new()
            .prefix("gno-run-")
            .tempdir()
            .map_err(|e| PrecompileError::io(std::env::temp_dir(), e))?;
        let entry = dir.path().join(ENTRY_FILENAME);
        fs::write(&entry, &result.translated).map_err(|e| PrecompileError::io(&entry, e))?;

        let outcome = self.toolchain.run_entry(dir.path(), logical_path);

        let path = dir.path().to_path_buf();
        dir.close()
            .map_err(|source| PrecompileError::Cleanup { path, source })?;
        outcome
    }

    /// Delete generated files from the output directories of `paths`.
    /// Returns how many were removed.
    pub fn clean_paths(&self, paths: &[PathBuf]) -> Result<usize> {
        let mut removed = 0;
        for dir in self.output_dirs(paths)? {
            removed += clean_generated_files(&dir)?;
        }
        Ok(removed)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Delete the generated Go files directly inside `dir`
pub fn clean_generated_files(dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(PrecompileError::io(dir, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| PrecompileError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_generated_file(&name) || !entry.path().is_file() {
            continue;
        }
        fs::remove_file(entry.path()).map_err(|source| PrecompileError::Cleanup {
            path: entry.path(),
            source,
        })?;
        debug!("Removed {}", entry.path().display());
        removed += 1;
    }
    Ok(removed)
}

/// Write the Gno files of `pkg` into a fresh directory under the current
/// directory
fn write_temp_package(pkg: &MemPackage) -> Result<TempDir> {
    let cwd = std::env::current_dir().map_err(|e| PrecompileError::io(".", e))?;
    let prefix = if pkg.name.is_empty() {
        "gno-check-".to_string()
    } else {
        format!("{}-", pkg.name)
    };
    let dir = tempfile::Builder::new()
        .prefix(&prefix)
        .tempdir_in(&cwd)
        .map_err(|e| PrecompileError::io(&cwd, e))?;

    for file in pkg.gno_files() {
        let path = dir.path().join(&file.name);
        fs::write(&path, &file.body).map_err(|e| PrecompileError::io(&path, e))?;
    }
    debug!("Wrote {} to {}", pkg.name, dir.path().display());
    Ok(dir)
}
