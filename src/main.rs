use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gno_precompile::{
    CheckSource, MemPackage, PrecompileConfig, PrecompileError, Precompiler, ToolRegistry,
};

#[derive(Parser)]
#[command(name = "gno-precompile")]
#[command(version, long_about = None)]
#[command(about = "Precompile Gno packages to Go and check them with the Go toolchain")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Configuration file (defaults to ./gno-precompile.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate .gno files to .go files next to them (or under --output)
    Precompile {
        /// Files or directories to precompile
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        /// Do not check syntax of generated .go files
        #[arg(long)]
        skip_fmt: bool,

        /// Do not precompile imports recursively
        #[arg(long)]
        skip_imports: bool,

        /// Run go build on generated go files, ignoring test files
        #[arg(long)]
        gobuild: bool,

        /// Output directory
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        toolchain: ToolchainArgs,

        /// Print a JSON report of generated files
        #[arg(long)]
        json: bool,
    },

    /// Precompile and build a package, leaving no generated files behind
    Check {
        /// Files or directories to check, or `-` to read one module from stdin
        #[arg(required = true)]
        sources: Vec<String>,

        #[command(flatten)]
        toolchain: ToolchainArgs,
    },

    /// Translate each file of a package and execute it with `go run`
    Run {
        /// Package directory, a single file, or `-` for stdin
        source: String,

        /// Path reported in compiler diagnostics (defaults to the source)
        #[arg(long)]
        logical_path: Option<String>,

        #[command(flatten)]
        toolchain: ToolchainArgs,
    },

    /// Build previously generated files with `go build -tags=gno`
    Build {
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        /// Directory the generated files were written to
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        toolchain: ToolchainArgs,
    },

    /// Remove generated .go files
    Clean {
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        /// Directory the generated files were written to
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show the detected Go toolchain
    Tools,
}

/// Toolchain flags shared by the subcommands that spawn Go tools
#[derive(Args)]
struct ToolchainArgs {
    /// Root of the Gno repository used to resolve imports
    #[arg(long)]
    root_dir: Option<PathBuf>,

    /// Go binary to use
    #[arg(long)]
    go_binary: Option<String>,

    /// gofmt binary to use
    #[arg(long)]
    gofmt_binary: Option<String>,

    /// Kill toolchain processes after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl ToolchainArgs {
    fn apply(self, config: &mut PrecompileConfig) {
        if let Some(root_dir) = self.root_dir {
            config.root_dir = root_dir;
        }
        if let Some(go) = self.go_binary {
            config.go_binary = go;
        }
        if let Some(gofmt) = self.gofmt_binary {
            config.gofmt_binary = gofmt;
        }
        if self.timeout.is_some() {
            config.timeout_secs = self.timeout;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter_layer = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::new("info")
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("gno-precompile v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(cli.config.as_deref())?;
    config.verbose |= cli.verbose;

    match cli.command {
        Commands::Precompile {
            paths,
            skip_fmt,
            skip_imports,
            gobuild,
            output,
            toolchain,
            json,
        } => {
            config.skip_fmt |= skip_fmt;
            config.skip_imports |= skip_imports;
            config.go_build |= gobuild;
            if let Some(output) = output {
                config.output = output;
            }
            toolchain.apply(&mut config);
            cmd_precompile(config, &paths, json)
        }
        Commands::Check { sources, toolchain } => {
            toolchain.apply(&mut config);
            cmd_check(config, &sources)
        }
        Commands::Run {
            source,
            logical_path,
            toolchain,
        } => {
            toolchain.apply(&mut config);
            cmd_run(config, &source, logical_path)
        }
        Commands::Build {
            paths,
            output,
            toolchain,
        } => {
            if let Some(output) = output {
                config.output = output;
            }
            toolchain.apply(&mut config);
            cmd_build(config, &paths)
        }
        Commands::Clean { paths, output } => {
            if let Some(output) = output {
                config.output = output;
            }
            cmd_clean(config, &paths)
        }
        Commands::Tools => {
            cmd_tools(&config);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PrecompileConfig> {
    if let Some(path) = path {
        debug!("Loading config from {}", path.display());
        return PrecompileConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }
    let loaded = PrecompileConfig::load_optional().context("Failed to load gno-precompile.toml")?;
    Ok(loaded.unwrap_or_default())
}

/// Print every individual failure and exit non-zero
fn fail(err: PrecompileError) -> ! {
    let errors = err.flatten();
    if errors.len() > 1 {
        eprintln!("{} {} errors", "✗".bright_red(), errors.len());
    }
    for e in errors {
        eprintln!("{} {}", "✗".bright_red(), e);
    }
    std::process::exit(1);
}

fn cmd_precompile(config: PrecompileConfig, paths: &[PathBuf], json: bool) -> anyhow::Result<()> {
    let mut precompiler = Precompiler::new(config);
    if let Err(e) = precompiler.precompile_paths(paths) {
        fail(e);
    }

    let report = precompiler.report();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} Precompiled {} file(s) in {} package(s)",
        "✓".bright_green(),
        report.artifacts.len(),
        report.packages.len()
    );
    if precompiler.config().verbose {
        for artifact in &report.artifacts {
            println!("  {} [{}]", artifact.path.display(), artifact.tags.dimmed());
        }
    }
    Ok(())
}

fn cmd_check(config: PrecompileConfig, sources: &[String]) -> anyhow::Result<()> {
    let mut precompiler = Precompiler::new(config);

    let result = if sources.iter().any(|s| s == "-") {
        if sources.len() > 1 {
            anyhow::bail!("`-` cannot be combined with other sources");
        }
        let pkg = MemPackage::from_reader(std::io::stdin().lock())?;
        precompiler.check_package(CheckSource::Memory(&pkg))
    } else {
        let paths: Vec<PathBuf> = sources.iter().map(PathBuf::from).collect();
        precompiler.check_package(CheckSource::Paths(&paths))
    };

    match result {
        Ok(()) => {
            println!("{} {}", "✓".bright_green(), "Check passed".green());
            Ok(())
        }
        Err(e) => fail(e),
    }
}

fn cmd_run(
    config: PrecompileConfig,
    source: &str,
    logical_path: Option<String>,
) -> anyhow::Result<()> {
    let pkg = MemPackage::load(source).with_context(|| format!("Failed to load {}", source))?;
    let logical_path = logical_path.unwrap_or_else(|| {
        if source == "-" {
            "stdin.gno".to_string()
        } else {
            source.to_string()
        }
    });

    let precompiler = Precompiler::new(config);
    match precompiler.run_package(&pkg, &logical_path) {
        Ok(output) => {
            print!("{}", output);
            Ok(())
        }
        Err(e) => fail(e),
    }
}

fn cmd_build(config: PrecompileConfig, paths: &[PathBuf]) -> anyhow::Result<()> {
    let precompiler = Precompiler::new(config);
    match precompiler.build_paths(paths) {
        Ok(()) => {
            println!("{} {}", "✓".bright_green(), "Build succeeded".green());
            Ok(())
        }
        Err(e) => fail(e),
    }
}

fn cmd_clean(config: PrecompileConfig, paths: &[PathBuf]) -> anyhow::Result<()> {
    let precompiler = Precompiler::new(config);
    let removed = precompiler.clean_paths(paths)?;
    println!("{} Removed {} generated file(s)", "✓".bright_green(), removed);
    Ok(())
}

fn cmd_tools(config: &PrecompileConfig) {
    let registry = ToolRegistry::detect(config);

    println!("{}", "Go toolchain".bright_cyan().bold());
    println!("{}", "─".repeat(50).dimmed());

    let available = registry.available_tools();
    if available.is_empty() {
        println!("  {}", "No tools found".yellow());
    }
    for tool in available {
        println!("  {} {}", "✓".bright_green(), tool);
    }

    let instructions = registry.get_installation_instructions();
    if !instructions.is_empty() {
        println!();
        for line in instructions {
            println!("  {} {}", "•".yellow(), line);
        }
    }
}
