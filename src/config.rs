use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default config file looked up in the current directory
pub const CONFIG_FILENAME: &str = "gno-precompile.toml";

/// Precompiler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecompileConfig {
    /// Verbose output when running
    pub verbose: bool,

    /// Do not check syntax of generated .go files
    pub skip_fmt: bool,

    /// Do not precompile imports recursively
    pub skip_imports: bool,

    /// Run go build on generated go files, ignoring test files. Only read by
    /// the precompile flow; check always builds.
    pub go_build: bool,

    /// Go binary to use for building and running
    pub go_binary: String,

    /// gofmt binary to use for syntax checking
    pub gofmt_binary: String,

    /// Output directory (`.` writes next to the sources)
    pub output: PathBuf,

    /// Root of the Gno repository that rewritten imports resolve against
    pub root_dir: PathBuf,

    /// Kill toolchain processes that run longer than this
    pub timeout_secs: Option<u64>,
}

impl Default for PrecompileConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            skip_fmt: false,
            skip_imports: false,
            go_build: false,
            go_binary: "go".to_string(),
            gofmt_binary: "gofmt".to_string(),
            output: PathBuf::from("."),
            root_dir: PathBuf::from("."),
            timeout_secs: None,
        }
    }
}

impl PrecompileConfig {
    /// Load configuration from TOML file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `gno-precompile.toml` from the current directory if present
    pub fn load_optional() -> anyhow::Result<Option<Self>> {
        let path = std::path::Path::new(CONFIG_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Whether artifacts are written somewhere other than next to sources
    pub fn has_output_override(&self) -> bool {
        self.output != std::path::Path::new(".")
    }
}
