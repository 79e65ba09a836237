//! In-memory Gno packages and source discovery.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{PrecompileError, Result};

pub const GNO_EXTENSION: &str = "gno";
const TEST_SUFFIX: &str = "_test.gno";
const FILETEST_SUFFIX: &str = "_filetest.gno";

/// Kind of a Gno module, derived from its filename suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    Implementation,
    Test,
    FileTest,
}

impl ModuleKind {
    pub fn from_filename(name: &str) -> Self {
        if name.ends_with(FILETEST_SUFFIX) {
            ModuleKind::FileTest
        } else if name.ends_with(TEST_SUFFIX) {
            ModuleKind::Test
        } else {
            ModuleKind::Implementation
        }
    }

    /// Whether imports must pass the whitelist
    pub fn checks_whitelist(self) -> bool {
        self == ModuleKind::Implementation
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleKind::Implementation => write!(f, "implementation"),
            ModuleKind::Test => write!(f, "test"),
            ModuleKind::FileTest => write!(f, "filetest"),
        }
    }
}

/// A single source file held in memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemFile {
    pub name: String,
    pub body: String,
}

impl MemFile {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }

    pub fn kind(&self) -> ModuleKind {
        ModuleKind::from_filename(&self.name)
    }

    pub fn is_gno(&self) -> bool {
        is_gno_file(Path::new(&self.name))
    }
}

/// A package held in memory: a name, an import path and its files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemPackage {
    pub name: String,
    pub path: String,
    pub files: Vec<MemFile>,
}

impl MemPackage {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: MemFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files that are Gno sources, in package order
    pub fn gno_files(&self) -> impl Iterator<Item = &MemFile> {
        self.files.iter().filter(|f| f.is_gno())
    }

    /// Read every `.gno` file of a directory (not recursive), sorted by name
    pub fn from_dir(dir: &Path, pkg_path: &str) -> Result<Self> {
        let mut files = Vec::new();
        for path in glob_gno_files(dir)? {
            let body = std::fs::read_to_string(&path).map_err(|e| PrecompileError::io(&path, e))?;
            let name = file_name(&path);
            files.push(MemFile { name, body });
        }

        let name = package_name(&files).unwrap_or_else(|| {
            dir.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "main".to_string())
        });

        Ok(Self {
            name,
            path: pkg_path.to_string(),
            files,
        })
    }

    /// Wrap a single file as a one-file package
    pub fn from_file(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path).map_err(|e| PrecompileError::io(path, e))?;
        let files = vec![MemFile {
            name: file_name(path),
            body,
        }];
        let name = package_name(&files).unwrap_or_else(|| "main".to_string());
        Ok(Self {
            name,
            path: String::new(),
            files,
        })
    }

    /// Read one module from a stream, named `stdin.gno`
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut body = String::new();
        reader
            .read_to_string(&mut body)
            .map_err(|e| PrecompileError::io("<stdin>", e))?;
        let files = vec![MemFile::new("stdin.gno", body)];
        let name = package_name(&files).unwrap_or_else(|| "main".to_string());
        Ok(Self {
            name,
            path: String::new(),
            files,
        })
    }

    /// Load a directory, a single file, or `-` for stdin
    pub fn load(source: &str) -> Result<Self> {
        if source == "-" {
            return Self::from_reader(std::io::stdin().lock());
        }
        let path = Path::new(source);
        let meta = std::fs::metadata(path).map_err(|e| PrecompileError::io(path, e))?;
        if meta.is_dir() {
            Self::from_dir(path, "")
        } else {
            Self::from_file(path)
        }
    }
}

/// Package name declared by the first file that has a package clause
fn package_name(files: &[MemFile]) -> Option<String> {
    files.iter().find_map(|f| {
        f.body.lines().find_map(|line| {
            let rest = line.trim_start().strip_prefix("package")?;
            if !rest.starts_with(char::is_whitespace) {
                return None;
            }
            rest.split_whitespace().next().map(|s| s.to_string())
        })
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn is_gno_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == GNO_EXTENSION)
}

/// List the `.gno` files directly inside `dir`, sorted
pub fn glob_gno_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join("*.gno");
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern).map_err(|e| PrecompileError::Io {
        path: dir.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
    })?;

    let mut files: Vec<PathBuf> = entries.flatten().filter(|p| p.is_file()).collect();
    files.sort();
    Ok(files)
}

/// Expand arguments into Gno source files: directories are walked
/// recursively, explicit files are taken as-is.
pub fn gno_files_from_args(args: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for arg in args {
        let meta = std::fs::metadata(arg).map_err(|e| PrecompileError::io(arg, e))?;
        if !meta.is_dir() {
            files.push(arg.clone());
            continue;
        }
        for entry in WalkDir::new(arg)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && is_gno_file(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    debug!("Found {} gno files in {} argument(s)", files.len(), args.len());
    Ok(files)
}

/// Expand arguments into package directories containing at least one
/// `.gno` file. A file argument yields itself.
pub fn gno_packages_from_args(args: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut pkgs: Vec<PathBuf> = Vec::new();
    for arg in args {
        let meta = std::fs::metadata(arg).map_err(|e| PrecompileError::io(arg, e))?;
        if !meta.is_dir() {
            pkgs.push(arg.clone());
            continue;
        }
        for entry in WalkDir::new(arg)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !(entry.file_type().is_file() && is_gno_file(entry.path())) {
                continue;
            }
            if let Some(parent) = entry.path().parent() {
                let parent = parent.to_path_buf();
                if !pkgs.contains(&parent) {
                    pkgs.push(parent);
                }
            }
        }
    }
    Ok(pkgs)
}
