use std::process::Command;
use tracing::{debug, info};

use crate::config::PrecompileConfig;

/// Detected tool information
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub version: Option<String>,
    pub path: String,
    pub available: bool,
}

/// Go toolchain binaries used by the precompiler
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    pub go: Option<ToolInfo>,
    pub gofmt: Option<ToolInfo>,
}

impl ToolRegistry {
    /// Detect the configured Go binaries
    pub fn detect(config: &PrecompileConfig) -> Self {
        info!("Detecting Go toolchain...");

        Self {
            go: detect_tool(&config.go_binary, &["version"]),
            gofmt: detect_tool(&config.gofmt_binary, &[]),
        }
    }

    /// Whether format-check and build can run
    pub fn is_complete(&self) -> bool {
        self.go.is_some() && self.gofmt.is_some()
    }

    /// Human readable list of available tools
    pub fn available_tools(&self) -> Vec<String> {
        let mut tools = Vec::new();

        if let Some(tool) = &self.go {
            if tool.available {
                tools.push(format!(
                    "go ({})",
                    tool.version.as_deref().unwrap_or("unknown version")
                ));
            }
        }
        if let Some(tool) = &self.gofmt {
            if tool.available {
                tools.push("gofmt".to_string());
            }
        }

        tools
    }

    /// Get installation instructions for missing tools
    pub fn get_installation_instructions(&self) -> Vec<String> {
        let mut instructions = Vec::new();
        if self.go.is_none() {
            instructions.push("Install Go: https://go.dev/doc/install".to_string());
        }
        if self.gofmt.is_none() {
            instructions.push(
                "gofmt ships with Go; make sure $(go env GOROOT)/bin is on PATH".to_string(),
            );
        }
        instructions
    }
}

/// Detect a single tool
pub fn detect_tool(name: &str, version_args: &[&str]) -> Option<ToolInfo> {
    debug!("Checking for tool: {}", name);

    let path = match which::which(name) {
        Ok(p) => p.to_string_lossy().to_string(),
        Err(_) => {
            debug!("Tool '{}' not found in PATH", name);
            return None;
        }
    };

    let version = if version_args.is_empty() {
        None
    } else {
        get_tool_version(name, version_args)
    };

    debug!(
        "Found tool '{}' at '{}' (version: {:?})",
        name, path, version
    );

    Some(ToolInfo {
        name: name.to_string(),
        version,
        path,
        available: true,
    })
}

/// Get tool version, e.g. `go version go1.21.5 linux/amd64` -> `go1.21.5`
fn get_tool_version(name: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(name).args(args).output().ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version_line = stdout.lines().next()?;
    parse_version(version_line)
}

fn parse_version(line: &str) -> Option<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    parts
        .iter()
        .find(|p| p.starts_with("go1") || p.starts_with("devel"))
        .or_else(|| parts.last())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_info_creation() {
        let tool = ToolInfo {
            name: "go".to_string(),
            version: Some("go1.21.5".to_string()),
            path: "/usr/local/go/bin/go".to_string(),
            available: true,
        };

        assert_eq!(tool.name, "go");
        assert_eq!(tool.version.as_deref(), Some("go1.21.5"));
        assert!(tool.available);
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("go version go1.21.5 linux/amd64").as_deref(),
            Some("go1.21.5")
        );
        assert_eq!(parse_version("tool 1.2.3").as_deref(), Some("1.2.3"));
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_detect_missing_tool() {
        assert!(detect_tool("definitely-not-a-real-binary-xyz", &["version"]).is_none());
    }

    #[test]
    fn test_registry_instructions_for_missing() {
        let registry = ToolRegistry {
            go: None,
            gofmt: None,
        };
        assert!(!registry.is_complete());
        assert!(registry.available_tools().is_empty());
        assert_eq!(registry.get_installation_instructions().len(), 2);
    }

    #[test]
    fn test_registry_lists_available() {
        let registry = ToolRegistry {
            go: Some(ToolInfo {
                name: "go".to_string(),
                version: Some("go1.22.0".to_string()),
                path: "/usr/bin/go".to_string(),
                available: true,
            }),
            gofmt: Some(ToolInfo {
                name: "gofmt".to_string(),
                version: None,
                path: "/usr/bin/gofmt".to_string(),
                available: true,
            }),
        };
        assert!(registry.is_complete());
        assert_eq!(
            registry.available_tools(),
            vec!["go (go1.22.0)".to_string(), "gofmt".to_string()]
        );
        assert!(registry.get_installation_instructions().is_empty());
    }
}
