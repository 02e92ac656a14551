//! Runs the firmware matrix: every target in catalog order, every permutation
//! in expansion order.
//!
//! Per-item problems (missing kconfig, template errors, compiler failures)
//! are recorded in the [`BuildReport`] and the run carries on. Only problems
//! that make the whole run meaningless are returned as errors.

use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, Target};
use crate::compiler::{CompileRequest, FirmwareCompiler};
use crate::error::{Error, Result};
use crate::metadata::ReleaseMetadata;
use crate::permutations::{Permutation, expand};
use crate::resolve::{ResolvedNames, resolve_names};
use crate::util::{ensure_dir, validate_rel_like_path};
use crate::workspace::WorkspacePaths;

#[derive(Debug, Clone)]
pub enum BuildEvent {
    TargetStarted {
        target_id: String,
    },
    ItemSkipped {
        target_id: String,
        kconfig: String,
    },
    ItemBuilt {
        target_id: String,
        firmware: String,
        dry_run: bool,
    },
    ItemFailed {
        target_id: String,
        name: String,
        error: String,
    },
    RunFinished {
        counts: Counts,
        /// Version directory relative to the workspace root, `/`-separated.
        output_dir: String,
    },
}

pub trait BuildSink: Send + Sync {
    fn emit(&self, ev: BuildEvent);
}

/// Progress lines for a terminal.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl BuildSink for StdoutSink {
    fn emit(&self, ev: BuildEvent) {
        match ev {
            BuildEvent::TargetStarted { target_id } => println!("\n[{target_id}]"),
            BuildEvent::ItemSkipped { kconfig, .. } => println!("  ⚠ {kconfig} - not found"),
            BuildEvent::ItemBuilt {
                firmware, dry_run, ..
            } => {
                if dry_run {
                    println!("  [DRY RUN] {firmware}");
                } else {
                    println!("  ✓ {firmware}");
                }
            }
            BuildEvent::ItemFailed { name, error, .. } => println!("  ✗ {name} - {error}"),
            BuildEvent::RunFinished { counts, output_dir } => println!(
                "\nBuild: {}/{} successful → {output_dir}",
                counts.succeeded, counts.attempted
            ),
        }
    }
}

#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<BuildEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<BuildEvent>) -> Self {
        Self { tx }
    }
}

impl BuildSink for ChannelSink {
    fn emit(&self, ev: BuildEvent) {
        let _ = self.tx.send(ev);
    }
}

#[derive(Clone)]
pub struct ExecCtx {
    pub dry_run: bool,
    pub sink: Arc<dyn BuildSink>,
}

impl ExecCtx {
    pub fn new(dry_run: bool, sink: Arc<dyn BuildSink>) -> Self {
        Self { dry_run, sink }
    }

    fn emit(&self, ev: BuildEvent) {
        self.sink.emit(ev);
    }
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub version: String,
    /// Firmware source tree the compiler runs in.
    pub source_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ItemReport {
    pub permutation: Permutation,
    /// `None` when the names could not be resolved.
    pub names: Option<ResolvedNames>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Counts {
    fn record(&mut self, outcome: &Outcome) {
        self.attempted += 1;
        match outcome {
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }

    fn add(&mut self, other: Counts) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone)]
pub struct TargetReport {
    pub target_id: String,
    pub items: Vec<ItemReport>,
    pub counts: Counts,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub version: String,
    pub version_dir: PathBuf,
    pub metadata_path: PathBuf,
    pub dry_run: bool,
    pub targets: Vec<TargetReport>,
}

impl BuildReport {
    pub fn totals(&self) -> Counts {
        let mut out = Counts::default();
        for t in &self.targets {
            out.add(t.counts);
        }
        out
    }

    pub fn has_failures(&self) -> bool {
        self.totals().failed > 0
    }
}

pub fn run_builds(
    catalog: &Catalog,
    compiler: &dyn FirmwareCompiler,
    paths: &WorkspacePaths,
    req: &BuildRequest,
    ctx: &ExecCtx,
) -> Result<BuildReport> {
    let version_dir = paths.version_dir(&req.version)?;
    let metadata_path = paths.metadata_path(&req.version)?;
    if !ctx.dry_run && !req.source_dir.is_dir() {
        return Err(Error::msg(format!(
            "firmware source directory not found: {}",
            req.source_dir.display()
        )));
    }
    ensure_dir(&version_dir)?;
    info!(
        version = %req.version,
        dry_run = ctx.dry_run,
        targets = catalog.targets.len(),
        "starting build run"
    );

    let mut targets = Vec::with_capacity(catalog.targets.len());
    let mut totals = Counts::default();
    for target in catalog.targets() {
        ctx.emit(BuildEvent::TargetStarted {
            target_id: target.target_id.clone(),
        });
        let mut report = TargetReport {
            target_id: target.target_id.clone(),
            items: Vec::new(),
            counts: Counts::default(),
        };
        for permutation in expand(&target.configuration.permutations) {
            let item = build_item(target, permutation, compiler, paths, &version_dir, req, ctx);
            report.counts.record(&item.outcome);
            report.items.push(item);
        }
        debug!(target = %report.target_id, counts = ?report.counts, "target finished");
        totals.add(report.counts);
        targets.push(report);
    }

    ReleaseMetadata::from_catalog(catalog).write(&metadata_path)?;
    let output_dir = paths
        .relative_key(&version_dir)
        .unwrap_or_else(|_| version_dir.display().to_string());
    ctx.emit(BuildEvent::RunFinished {
        counts: totals,
        output_dir,
    });

    Ok(BuildReport {
        version: req.version.clone(),
        version_dir,
        metadata_path,
        dry_run: ctx.dry_run,
        targets,
    })
}

fn build_item(
    target: &Target,
    permutation: Permutation,
    compiler: &dyn FirmwareCompiler,
    paths: &WorkspacePaths,
    version_dir: &Path,
    req: &BuildRequest,
    ctx: &ExecCtx,
) -> ItemReport {
    let fail = |name: String, error: String, names: Option<ResolvedNames>, permutation: Permutation| {
        warn!(target = %target.target_id, item = %name, error = %error, "build item failed");
        ctx.emit(BuildEvent::ItemFailed {
            target_id: target.target_id.clone(),
            name,
            error: error.clone(),
        });
        ItemReport {
            permutation,
            names,
            outcome: Outcome::Failed(error),
        }
    };

    let names = match resolve_names(target, &permutation) {
        Ok(n) => n,
        Err(e) => return fail(permutation.to_string(), e.to_string(), None, permutation),
    };
    let unusable = [&names.kconfig, &names.firmware].into_iter().find_map(|n| {
        validate_rel_like_path(n)
            .err()
            .map(|e| format!("resolved filename '{n}' is not usable: {e}"))
    });
    if let Some(error) = unusable {
        return fail(names.firmware.clone(), error, Some(names), permutation);
    }

    let kconfig = paths.kconfig_path(&names.kconfig);
    if !kconfig.is_file() {
        debug!(target = %target.target_id, kconfig = %kconfig.display(), "kconfig not found");
        ctx.emit(BuildEvent::ItemSkipped {
            target_id: target.target_id.clone(),
            kconfig: names.kconfig.clone(),
        });
        return ItemReport {
            permutation,
            names: Some(names),
            outcome: Outcome::Skipped,
        };
    }

    if !ctx.dry_run {
        let output = version_dir.join(&names.firmware);
        let compiled = compiler.compile(&CompileRequest {
            kconfig: &kconfig,
            output: &output,
            work_dir: &req.source_dir,
        });
        if let Err(e) = compiled {
            return fail(names.firmware.clone(), e.to_string(), Some(names), permutation);
        }
    }

    ctx.emit(BuildEvent::ItemBuilt {
        target_id: target.target_id.clone(),
        firmware: names.firmware.clone(),
        dry_run: ctx.dry_run,
    });
    ItemReport {
        permutation,
        names: Some(names),
        outcome: Outcome::Succeeded,
    }
}
