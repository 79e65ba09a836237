//! Format-check, build and run steps against generated Go files.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::diagnostics::{normalize_diagnostic, ENTRY_FILENAME};
use super::process::{
    run_process, run_process_with_input, CancelToken, ProcessLimits, ProcessOutput,
};
use crate::config::PrecompileConfig;
use crate::error::{PrecompileError, Result};
use crate::policy::IMPORT_PREFIX;
use crate::resolver::absolute;

/// Build tag selecting generated files
pub const BUILD_TAGS_FLAG: &str = "-tags=gno";

/// Go binaries plus the limits applied to each invocation
#[derive(Debug, Clone)]
pub struct GoToolchain {
    go_binary: String,
    gofmt_binary: String,
    limits: ProcessLimits,
}

impl GoToolchain {
    pub fn new(config: &PrecompileConfig, cancel: CancelToken) -> Self {
        Self {
            go_binary: config.go_binary.clone(),
            gofmt_binary: config.gofmt_binary.clone(),
            limits: ProcessLimits {
                timeout: config.timeout_secs.map(Duration::from_secs),
                cancel,
            },
        }
    }

    pub fn go_binary(&self) -> &str {
        &self.go_binary
    }

    pub fn gofmt_binary(&self) -> &str {
        &self.gofmt_binary
    }

    fn run(&self, cmd: &mut Command, tool: &str) -> Result<ProcessOutput> {
        run_process(cmd, tool, &self.limits)
    }

    /// Pipe generated source through `gofmt` and return the canonical text.
    ///
    /// A formatter failure means the generated source is not valid Go.
    pub fn format_source(&self, source: &str, filename: &str) -> Result<String> {
        let mut cmd = Command::new(&self.gofmt_binary);
        let output = run_process_with_input(
            &mut cmd,
            &self.gofmt_binary,
            &self.limits,
            Some(source.as_bytes()),
        )?;
        if !output.success() {
            return Err(PrecompileError::CodeGen {
                filename: filename.to_string(),
                message: format!("gofmt: {}", output.stderr.trim()),
            });
        }
        if output.stdout.trim().is_empty() && !source.trim().is_empty() {
            return Err(PrecompileError::CodeGen {
                filename: filename.to_string(),
                message: "gofmt produced no output".to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Run `gofmt -l -e` against one generated file.
    ///
    /// Fast, and does not need imports to resolve.
    pub fn format_check(&self, path: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.gofmt_binary);
        cmd.args(["-l", "-e"]).arg(path);

        let output = self.run(&mut cmd, &self.gofmt_binary)?;
        if !output.success() {
            return Err(PrecompileError::FormatCheck {
                path: path.to_path_buf(),
                output: output.combined().trim().to_string(),
            });
        }

        let listing = output.stdout.trim();
        if !listing.is_empty() {
            return Err(PrecompileError::FormatCheck {
                path: path.to_path_buf(),
                output: format!("not gofmt-formatted: {}", listing),
            });
        }
        Ok(())
    }

    /// Directory of the module providing the Gno repository, as reported by
    /// `go list -m` from inside `file_or_pkg`
    pub fn guess_root_dir(&self, file_or_pkg: &Path) -> Result<PathBuf> {
        let abs = absolute(file_or_pkg)?;
        let dir = if abs.is_dir() {
            abs
        } else {
            abs.parent().map(Path::to_path_buf).unwrap_or(abs)
        };

        let mut cmd = Command::new(&self.go_binary);
        cmd.args(["list", "-m", "-mod=mod", "-f", "{{.Dir}}", IMPORT_PREFIX])
            .current_dir(&dir);

        let output = self.run(&mut cmd, &self.go_binary)?;
        let root = output.stdout.trim();
        if !output.success() || root.is_empty() {
            return Err(PrecompileError::Build {
                package: dir,
                output: format!("can't guess --root-dir: {}", output.combined().trim()),
            });
        }
        Ok(PathBuf::from(root))
    }

    /// Run `go build` over the generated production files of a package.
    ///
    /// Needs every import to be precompiled and resolvable.
    pub fn build_package(&self, file_or_pkg: &Path) -> Result<()> {
        let files = select_build_files(file_or_pkg)?;
        if files.is_empty() {
            warn!("No Go files to build in {}", file_or_pkg.display());
            return Ok(());
        }

        let mut cmd = Command::new(&self.go_binary);
        cmd.args(["build", "-v", BUILD_TAGS_FLAG]).args(&files);

        match self.guess_root_dir(file_or_pkg) {
            Ok(root) => {
                debug!("Building from root dir {}", root.display());
                cmd.current_dir(root);
            }
            Err(e) => debug!("Falling back to current directory: {}", e),
        }

        info!("Building {} ({} files)", file_or_pkg.display(), files.len());
        let output = self.run(&mut cmd, &self.go_binary)?;
        if !output.success() {
            return Err(PrecompileError::Build {
                package: file_or_pkg.to_path_buf(),
                output: output.combined().trim().to_string(),
            });
        }
        Ok(())
    }

    /// `go run` the entry file inside `dir` and normalize what it printed
    pub fn run_entry(&self, dir: &Path, logical_path: &str) -> Result<String> {
        let entry = dir.join(ENTRY_FILENAME);
        let mut cmd = Command::new(&self.go_binary);
        cmd.arg("run").arg(&entry).current_dir(dir);

        let output = self.run(&mut cmd, &self.go_binary)?;
        debug!(
            "go run exited with {:?} ({} bytes stdout, {} bytes stderr)",
            output.status.code(),
            output.stdout.len(),
            output.stderr.len()
        );
        classify_run(&output.stdout, &output.stderr, logical_path)
    }
}

/// Decide the outcome of a run from its captured streams
///
/// A compiler diagnostic on stderr is an error. Otherwise the program's
/// stdout comes first, followed by whatever it wrote to stderr.
pub fn classify_run(stdout: &str, stderr: &str, logical_path: &str) -> Result<String> {
    let diag = normalize_diagnostic(stderr, logical_path);
    if diag.is_error && !diag.normalized.is_empty() {
        return Err(PrecompileError::Run {
            output: diag.normalized,
        });
    }

    let mut out = stdout.to_string();
    if !diag.normalized.is_empty() {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&diag.normalized);
    }
    Ok(out)
}

/// Whether a Go file is left out of a production build
pub fn is_build_excluded(name: &str) -> bool {
    name.starts_with('.')
        || name.ends_with("_filetest.go")
        || name.ends_with("_filetest.gno.gen.go")
        || name.ends_with("_test.go")
        || name.ends_with("_test.gno.gen.go")
        || name.ends_with(".gno.gen_test.go")
}

/// Go files of a package that go into a production build, sorted and
/// absolute. A file argument selects just that file.
pub fn select_build_files(file_or_pkg: &Path) -> Result<Vec<PathBuf>> {
    let meta = std::fs::metadata(file_or_pkg).map_err(|e| PrecompileError::io(file_or_pkg, e))?;
    if !meta.is_dir() {
        return Ok(vec![absolute(file_or_pkg)?]);
    }

    let pattern = file_or_pkg.join("*.go");
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern).map_err(|e| PrecompileError::Io {
        path: file_or_pkg.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
    })?;

    let mut files = Vec::new();
    for path in entries.flatten() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if is_build_excluded(&name) {
            continue;
        }
        files.push(absolute(&path)?);
    }
    files.sort();
    Ok(files)
}
