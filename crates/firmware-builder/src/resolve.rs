//! Kconfig and firmware filename resolution for a (target, permutation) pair.

use std::fmt;

use crate::catalog::{Target, TargetConfiguration};
use crate::error::Result;
use crate::permutations::Permutation;
use crate::template::{self, Params};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Kconfig,
    Firmware,
}

/// Candidate configuration keys for one template, most preferred first.
#[derive(Debug)]
pub struct TemplateSetting {
    pub keys: &'static [&'static str],
    pub default: &'static str,
}

pub const KCONFIG_TEMPLATE: TemplateSetting = TemplateSetting {
    keys: &["kconfigFilenameTemplate", "kconfigTemplate"],
    default: "{targetId}_{vendorId}.kconfig",
};

pub const FIRMWARE_TEMPLATE: TemplateSetting = TemplateSetting {
    keys: &["firmwareFilenameTemplate", "fileTemplate"],
    default: "{targetId}_{vendorId}.bin",
};

impl FileKind {
    pub fn setting(self) -> &'static TemplateSetting {
        match self {
            FileKind::Kconfig => &KCONFIG_TEMPLATE,
            FileKind::Firmware => &FIRMWARE_TEMPLATE,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Kconfig => f.write_str("kconfig"),
            FileKind::Firmware => f.write_str("firmware"),
        }
    }
}

impl TemplateSetting {
    /// The first key with a non-empty value, without falling back to the default.
    pub fn configured<'a>(&self, cfg: &'a TargetConfiguration) -> Option<&'a str> {
        self.keys.iter().find_map(|k| cfg.setting(k))
    }

    pub fn select<'a>(&self, cfg: &'a TargetConfiguration) -> &'a str {
        self.configured(cfg).unwrap_or(self.default)
    }
}

/// Target identity overlaid with the permutation; permutation keys win on collision.
pub fn params(target: &Target, permutation: &Permutation) -> Params {
    let mut out = Params::new();
    out.insert("targetId".into(), target.target_id.clone());
    out.insert("vendorId".into(), target.vendor_id.clone());
    for (k, v) in permutation.iter() {
        out.insert(k.to_string(), v.to_string());
    }
    out
}

pub fn resolve(target: &Target, permutation: &Permutation, kind: FileKind) -> Result<String> {
    let tpl = kind.setting().select(&target.configuration);
    template::render(tpl, &params(target, permutation))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNames {
    pub kconfig: String,
    pub firmware: String,
}

pub fn resolve_names(target: &Target, permutation: &Permutation) -> Result<ResolvedNames> {
    Ok(ResolvedNames {
        kconfig: resolve(target, permutation, FileKind::Kconfig)?,
        firmware: resolve(target, permutation, FileKind::Firmware)?,
    })
}

/// Placeholders in the selected templates that no permutation can ever fill.
pub fn undeclared_parameters(target: &Target) -> Result<Vec<(FileKind, String)>> {
    let mut out = Vec::new();
    for kind in [FileKind::Kconfig, FileKind::Firmware] {
        let tpl = kind.setting().select(&target.configuration);
        for name in template::placeholders(tpl)? {
            let known = name == "targetId"
                || name == "vendorId"
                || target.configuration.permutations.get(&name).is_some();
            if !known {
                out.push((kind, name));
            }
        }
    }
    Ok(out)
}
