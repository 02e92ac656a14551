//! The external firmware toolchain.
//!
//! The orchestrator only sees [`FirmwareCompiler`]; [`MakeCompiler`] drives a
//! make-based firmware tree (copy kconfig to `.config`, `make clean`,
//! `make -jN`, pick up the first known output file).

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::Deserialize;
use tracing::debug;

use crate::config::ConfigDoc;
use crate::error::{Error, Result};
use crate::log_sanitize::output_tail;
use crate::util::copy_file;

const FAILURE_TAIL_LINES: usize = 8;

fn default_make() -> String {
    "make".into()
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> String {
    "out".into()
}

fn default_output_names() -> Vec<String> {
    vec!["klipper.bin".into(), "klipper.elf".into()]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    #[serde(default = "default_make")]
    pub make: String,
    /// Arguments placed before every make invocation's own arguments.
    pub args: Vec<String>,
    /// Parallel make jobs; 0 uses the CPU count.
    pub jobs: usize,
    #[serde(default = "default_true")]
    pub clean: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Artifact names probed under `output_dir`, in priority order.
    #[serde(default = "default_output_names")]
    pub output_names: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            make: default_make(),
            args: Vec::new(),
            jobs: 0,
            clean: true,
            output_dir: default_output_dir(),
            output_names: default_output_names(),
        }
    }
}

pub fn load_cfg(doc: &ConfigDoc) -> Result<CompilerConfig> {
    let cfg: CompilerConfig = doc.deserialize_path("compiler")?.unwrap_or_default();
    if cfg.make.trim().is_empty() {
        return Err(Error::msg("compiler.make is empty"));
    }
    if cfg.output_names.iter().all(|n| n.trim().is_empty()) {
        return Err(Error::msg("compiler.output_names has no usable entries"));
    }
    Ok(cfg)
}

#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub kconfig: &'a Path,
    pub output: &'a Path,
    pub work_dir: &'a Path,
}

pub trait FirmwareCompiler {
    /// Builds the firmware described by `req.kconfig` and leaves it at `req.output`.
    fn compile(&self, req: &CompileRequest<'_>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct MakeCompiler {
    cfg: CompilerConfig,
}

impl MakeCompiler {
    pub fn new(cfg: CompilerConfig) -> Self {
        Self { cfg }
    }

    fn jobs(&self) -> usize {
        if self.cfg.jobs == 0 {
            num_cpus::get().max(1)
        } else {
            self.cfg.jobs
        }
    }

    fn make(&self, work_dir: &Path, args: &[String]) -> Result<()> {
        let mut cmd = Command::new(&self.cfg.make);
        cmd.current_dir(work_dir).args(&self.cfg.args).args(args);
        debug!(cmd = ?cmd, "running toolchain");
        let out = cmd
            .output()
            .map_err(|e| Error::msg(format!("failed to run {}: {e}", self.cfg.make)))?;
        if out.status.success() {
            return Ok(());
        }
        Err(Error::msg(format!(
            "{} {} failed: {}",
            self.cfg.make,
            args.join(" "),
            command_summary(&out)
        )))
    }
}

impl FirmwareCompiler for MakeCompiler {
    fn compile(&self, req: &CompileRequest<'_>) -> Result<()> {
        copy_file(req.kconfig, &req.work_dir.join(".config"))?;
        if self.cfg.clean {
            self.make(req.work_dir, &["clean".to_string()])?;
        }
        self.make(req.work_dir, &[format!("-j{}", self.jobs())])?;

        let Some(artifact) = find_artifact(req.work_dir, &self.cfg) else {
            return Err(Error::msg(format!(
                "no output found (looked for {} in {})",
                self.cfg.output_names.join(", "),
                req.work_dir.join(&self.cfg.output_dir).display()
            )));
        };
        debug!(artifact = %artifact.display(), output = %req.output.display(), "collecting firmware");
        copy_file(&artifact, req.output)
    }
}

/// The first configured output name that exists, in priority order.
pub fn find_artifact(work_dir: &Path, cfg: &CompilerConfig) -> Option<PathBuf> {
    let dir = work_dir.join(&cfg.output_dir);
    cfg.output_names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(|n| dir.join(n))
        .find(|p| p.is_file())
}

fn command_summary(out: &Output) -> String {
    let mut lines = output_tail(&out.stderr, FAILURE_TAIL_LINES);
    if lines.is_empty() {
        lines = output_tail(&out.stdout, FAILURE_TAIL_LINES);
    }
    if lines.is_empty() {
        return format!("status {}", out.status);
    }
    format!("status {}: {}", out.status, lines.join(" | "))
}
