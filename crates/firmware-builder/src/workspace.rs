use std::path::Component;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::catalog::CatalogStore;
use crate::config::ConfigDoc;
use crate::error::{Error, Result};
use crate::util::validate_rel_like_path;

fn default_kconfigs_dir() -> String {
    "kconfigs".into()
}

fn default_builds_dir() -> String {
    "builds".into()
}

fn default_index_file() -> String {
    "index.json".into()
}

fn default_index_template_file() -> String {
    "index-template.json".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    #[serde(default = "default_kconfigs_dir")]
    pub kconfigs_dir: String,
    #[serde(default = "default_builds_dir")]
    pub builds_dir: String,
    #[serde(default = "default_index_file")]
    pub index_file: String,
    #[serde(default = "default_index_template_file")]
    pub index_template_file: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            kconfigs_dir: default_kconfigs_dir(),
            builds_dir: default_builds_dir(),
            index_file: default_index_file(),
            index_template_file: default_index_template_file(),
        }
    }
}

pub fn load_cfg(doc: &ConfigDoc) -> Result<WorkspaceConfig> {
    Ok(doc.deserialize_path("workspace")?.unwrap_or_default())
}

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub kconfigs_dir: PathBuf,
    pub builds_dir: PathBuf,
    pub index_file: PathBuf,
    pub index_template_file: PathBuf,
}

impl WorkspacePaths {
    pub fn catalog_store(&self) -> CatalogStore {
        CatalogStore::new(&self.index_file, &self.index_template_file)
    }

    /// `<builds>/<version>`; the version must be a single plain path segment.
    pub fn version_dir(&self, version: &str) -> Result<PathBuf> {
        let v = version.trim();
        if v.is_empty() || v != version {
            return Err(Error::msg(format!("invalid version '{version}'")));
        }
        if v.contains(['/', '\\']) || v == "." || v == ".." {
            return Err(Error::msg(format!(
                "invalid version '{version}' (must be a single directory name)"
            )));
        }
        Ok(self.builds_dir.join(v))
    }

    pub fn metadata_path(&self, version: &str) -> Result<PathBuf> {
        Ok(self.version_dir(version)?.join("metadata.json"))
    }

    pub fn kconfig_path(&self, name: &str) -> PathBuf {
        self.kconfigs_dir.join(name)
    }

    /// Object key for a file under the workspace root, with `/` separators.
    pub fn relative_key(&self, path: &Path) -> Result<String> {
        let rel = path.strip_prefix(&self.root).map_err(|_| {
            Error::msg(format!(
                "{} is outside the workspace root {}",
                path.display(),
                self.root.display()
            ))
        })?;
        let parts = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        Ok(parts.join("/"))
    }
}

pub fn load_paths(root: &Path, cfg: &WorkspaceConfig) -> Result<WorkspacePaths> {
    let root = if root.is_absolute() {
        root.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|e| Error::msg(format!("cwd error: {e}")))?;
        cwd.join(root)
    };
    Ok(WorkspacePaths {
        kconfigs_dir: resolve_user_path(&root, "workspace.kconfigs_dir", &cfg.kconfigs_dir)?,
        builds_dir: resolve_user_path(&root, "workspace.builds_dir", &cfg.builds_dir)?,
        index_file: resolve_user_path(&root, "workspace.index_file", &cfg.index_file)?,
        index_template_file: resolve_user_path(
            &root,
            "workspace.index_template_file",
            &cfg.index_template_file,
        )?,
        root: normalize(&root),
    })
}

// Absolute paths are used as-is; relative ones are rooted at the workspace root.
fn resolve_user_path(root: &Path, field: &str, p: &str) -> Result<PathBuf> {
    let p = p.trim();
    if p.is_empty() {
        return Err(Error::msg(format!("{field} is empty")));
    }
    let pb = PathBuf::from(p);
    if pb.is_absolute() {
        return Ok(pb);
    }
    validate_rel_like_path(p).map_err(|e| Error::msg(format!("{field}: {e}")))?;
    Ok(normalize(&root.join(pb)))
}

fn normalize(p: &Path) -> PathBuf {
    p.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
