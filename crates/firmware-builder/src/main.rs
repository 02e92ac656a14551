use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use firmware_builder::catalog::checks;
use firmware_builder::compiler::{self, MakeCompiler};
use firmware_builder::config::{self, ConfigDoc};
use firmware_builder::executor::{self, BuildRequest, ExecCtx, StdoutSink};
use firmware_builder::publish::{self, InvalidationStatus};
use firmware_builder::resolve::undeclared_parameters;
use firmware_builder::workspace::{self, WorkspacePaths};
use firmware_builder::{Error, Result};
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Build, validate and publish firmware for every catalog target")]
struct Args {
    /// Project root holding the catalog, kconfigs and builds
    #[arg(long, global = true, default_value = ".")]
    root_dir: PathBuf,
    /// Project config (default: <root-dir>/fwbuild.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build firmware for every target and permutation
    Build {
        /// Version string, e.g. v0.12.0-124
        version: String,
        /// Firmware source tree the toolchain runs in
        #[arg(long)]
        source_dir: PathBuf,
        /// Commit URL recorded with the build entry
        #[arg(long, alias = "commit-url", default_value = "")]
        commit_ref: String,
        /// Resolve and report without compiling or touching the catalog
        #[arg(long)]
        dry_run: bool,
    },
    /// Check that every permutation value has a displayName
    CheckConfigurations,
    /// Check that every required kconfig file exists
    Validate,
    /// Rebuild the catalog's builds list from the builds directory
    RebuildIndex,
    /// Upload the catalog and builds, then invalidate the CDN cache
    Sync {
        /// Show what would be uploaded without uploading
        #[arg(long)]
        dry_run: bool,
    },
}

struct Project {
    doc: ConfigDoc,
    paths: WorkspacePaths,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(args: Args) -> Result<ExitCode> {
    let project = open_project(&args.root_dir, args.config.as_deref())?;
    match args.cmd {
        Command::Build {
            version,
            source_dir,
            commit_ref,
            dry_run,
        } => cmd_build(&project, version, source_dir, &commit_ref, dry_run),
        Command::CheckConfigurations => cmd_check_configurations(&project),
        Command::Validate => cmd_validate(&project),
        Command::RebuildIndex => cmd_rebuild_index(&project),
        Command::Sync { dry_run } => cmd_sync(&project, dry_run),
    }
}

fn open_project(root: &Path, config_path: Option<&Path>) -> Result<Project> {
    if !root.is_dir() {
        return Err(Error::msg(format!(
            "root directory not found: {}",
            root.display()
        )));
    }
    // Credentials for the publish backends usually live here.
    let env_file = root.join(".env");
    if env_file.is_file() {
        dotenv::from_path(&env_file)
            .map_err(|e| Error::msg(format!("failed to load {}: {e}", env_file.display())))?;
    }
    let doc = config::load_for_root(root, config_path)?;
    let ws = workspace::load_cfg(&doc)?;
    let paths = workspace::load_paths(root, &ws)?;
    Ok(Project { doc, paths })
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn cmd_build(
    project: &Project,
    version: String,
    source_dir: PathBuf,
    commit_ref: &str,
    dry_run: bool,
) -> Result<ExitCode> {
    let compiler = MakeCompiler::new(compiler::load_cfg(&project.doc)?);
    let store = project.paths.catalog_store();
    let catalog = store.load()?;

    let ctx = ExecCtx::new(dry_run, Arc::new(StdoutSink));
    let req = BuildRequest {
        version,
        source_dir,
    };
    let report = executor::run_builds(&catalog, &compiler, &project.paths, &req, &ctx)?;

    if !report.dry_run {
        store.record_build(&report.version, commit_ref)?;
    }
    Ok(exit_code(!report.has_failures()))
}

fn cmd_check_configurations(project: &Project) -> Result<ExitCode> {
    let catalog = project.paths.catalog_store().load()?;
    let report = checks::check_configuration_completeness(&catalog);
    print!("{}", checks::format_completeness_report(&report));
    Ok(exit_code(report.ok()))
}

fn cmd_validate(project: &Project) -> Result<ExitCode> {
    let catalog = project.paths.catalog_store().load()?;
    for target in catalog.targets() {
        // Malformed templates show up in the presence report below.
        let Ok(undeclared) = undeclared_parameters(target) else {
            continue;
        };
        for (kind, name) in undeclared {
            warn!(
                target = %target.target_id,
                "{kind} template uses '{{{name}}}' but no permutation axis declares it"
            );
        }
    }
    let report = checks::validate_kconfig_presence(&catalog, &project.paths.kconfigs_dir);
    print!("{}", checks::format_presence_report(&report));
    Ok(exit_code(report.ok()))
}

fn cmd_rebuild_index(project: &Project) -> Result<ExitCode> {
    let catalog = project
        .paths
        .catalog_store()
        .rebuild_index(&project.paths.builds_dir)?;
    println!("✓ Rebuilt index with {} builds", catalog.builds.len());
    Ok(ExitCode::SUCCESS)
}

fn cmd_sync(project: &Project, dry_run: bool) -> Result<ExitCode> {
    let cfg = publish::load_cfg(&project.doc)?;
    let store = publish::open_store(&cfg)?;
    let report = publish::sync(store.as_ref(), &project.paths, &cfg, dry_run)?;
    println!("{}", report.summary());
    match &report.invalidation {
        InvalidationStatus::Skipped => {}
        InvalidationStatus::Submitted(id) => println!("Cache invalidation: {id}"),
        InvalidationStatus::Failed(e) => println!("Warning: cache invalidation failed - {e}"),
    }
    Ok(ExitCode::SUCCESS)
}
