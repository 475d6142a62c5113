//! zippy - build, run and inspect self-executing application archives.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::{info, Level};
use zippy_core::archive::{Archive, EntryPoint, LaunchPrefix};
use zippy_core::build::{ArchiveBuilder, DependencyInstaller, DependencySource};
use zippy_core::config::BuildConfig;
use zippy_core::{runtime, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(name = "zippy")]
#[command(version, about = "Build and run self-executing application archives")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Package a source tree and its dependencies into an archive
    Build(BuildArgs),
    /// Extract and run an archive
    Run(RunArgs),
    /// Print an archive's manifest and entries as JSON
    Inspect {
        /// Archive to inspect
        archive: PathBuf,
    },
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Application source directory
    source: PathBuf,

    /// Output archive path
    #[arg(short, long)]
    output: PathBuf,

    /// Entry script, relative to the source directory
    #[arg(short, long, required_unless_present = "module", conflicts_with = "module")]
    entry: Option<String>,

    /// Entry native module (dotted name), run in-process
    #[arg(short, long)]
    module: Option<String>,

    /// Interpreter for the entry script, e.g. "python3 -u"
    #[arg(long, requires = "entry")]
    interpreter: Option<String>,

    /// Dependency manifest handed to the installer
    #[arg(short, long, conflicts_with_all = ["deps_dir", "no_deps"])]
    requirements: Option<PathBuf>,

    /// Pre-populated dependency directory, packed under deps/
    #[arg(long, conflicts_with = "no_deps")]
    deps_dir: Option<PathBuf>,

    /// Do not install or pack any dependencies
    #[arg(long)]
    no_deps: bool,

    /// Installer program
    #[arg(long, default_value = BuildConfig::DEFAULT_INSTALLER)]
    installer: String,

    /// Installer argument (repeatable); {manifest} and {target} are substituted
    #[arg(long = "installer-arg", allow_hyphen_values = true)]
    installer_args: Vec<String>,

    /// Shebang line written before the archive
    #[arg(long, conflicts_with = "stub")]
    prefix: Option<String>,

    /// Runtime executable written before the archive instead of a shebang
    #[arg(long)]
    stub: Option<PathBuf>,

    /// Native module imported before a module entry runs (repeatable)
    #[arg(long)]
    preload: Vec<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Archive to run
    archive: PathBuf,

    /// Extract here instead of a fresh temporary directory
    #[arg(long)]
    extract_dir: Option<PathBuf>,

    /// Always load native modules through temporary files
    #[arg(long)]
    no_memfd: bool,

    /// Arguments passed to the entry point
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<OsString>,
}

fn main() {
    let cli = Cli::parse();
    zippy_cli::init_logging(cli.debug, Level::INFO);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => std::process::exit(zippy_cli::report("zippy", &e)),
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Build(args) => build(args),
        Command::Run(args) => {
            let mut config = RuntimeConfig::from_env();
            if let Some(dir) = args.extract_dir {
                config = config.with_extract_dir(dir);
            }
            if args.no_memfd {
                config = config.with_memory_backing(false);
            }
            Ok(runtime::launch(&args.archive, &args.args, &config)?)
        }
        Command::Inspect { archive } => inspect(archive),
    }
}

fn build(args: BuildArgs) -> Result<i32> {
    let entry = match (args.entry, args.module) {
        (Some(path), None) => EntryPoint::Script {
            path,
            interpreter: args.interpreter,
        },
        (None, Some(name)) => EntryPoint::module(name),
        _ => anyhow::bail!("exactly one of --entry or --module is required"),
    };

    let dependencies = if args.no_deps {
        DependencySource::None
    } else if let Some(manifest) = args.requirements {
        DependencySource::Manifest(manifest)
    } else if let Some(dir) = args.deps_dir {
        DependencySource::Directory(dir)
    } else {
        DependencySource::Auto
    };

    let prefix = match (args.prefix, args.stub) {
        (_, Some(stub)) => LaunchPrefix::Stub(stub),
        (Some(line), None) => LaunchPrefix::Shebang(line),
        (None, None) => LaunchPrefix::default(),
    };

    let installer = if args.installer_args.is_empty() {
        DependencyInstaller::new(
            args.installer,
            BuildConfig::DEFAULT_INSTALLER_ARGS.iter().copied(),
        )
    } else {
        DependencyInstaller::new(args.installer, args.installer_args)
    };

    let report = ArchiveBuilder::new(&args.source, &args.output, entry)
        .with_prefix(prefix)
        .with_dependencies(dependencies)
        .with_installer(installer)
        .with_preload(args.preload)
        .build()?;

    info!(
        "Built {} ({} source files, {} dependency files)",
        report.output.display(),
        report.source_files,
        report.dependency_files
    );
    Ok(0)
}

fn inspect(path: PathBuf) -> Result<i32> {
    let mut archive = Archive::open(&path)?;
    let manifest = archive.manifest()?;
    let report = serde_json::json!({
        "archive": path,
        "manifest": manifest,
        "entries": archive.entry_names(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to render manifest")?
    );
    Ok(0)
}
