//! The per-version release snapshot (`builds/<version>/metadata.json`).

use std::path::Path;

use serde::Serialize;

use crate::catalog::{Catalog, Target};
use crate::error::Result;
use crate::permutations::Axes;
use crate::resolve::{FIRMWARE_TEMPLATE, KCONFIG_TEMPLATE};
use crate::util::write_json_pretty;

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseMetadata {
    pub targets: Vec<TargetReleaseBundle>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReleaseBundle {
    pub target_id: String,
    pub vendor_id: String,
    pub configuration: BundleConfiguration,
}

/// Templates as configured; unset ones stay `null` rather than taking the default.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleConfiguration {
    pub firmware_filename_template: Option<String>,
    pub kconfig_filename_template: Option<String>,
    pub permutations: Axes,
}

impl TargetReleaseBundle {
    pub fn from_target(target: &Target) -> Self {
        let cfg = &target.configuration;
        Self {
            target_id: target.target_id.clone(),
            vendor_id: target.vendor_id.clone(),
            configuration: BundleConfiguration {
                firmware_filename_template: FIRMWARE_TEMPLATE.configured(cfg).map(str::to_string),
                kconfig_filename_template: KCONFIG_TEMPLATE.configured(cfg).map(str::to_string),
                permutations: cfg.permutations.clone(),
            },
        }
    }
}

impl ReleaseMetadata {
    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self {
            targets: catalog.targets().map(TargetReleaseBundle::from_target).collect(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_json_pretty(path, self)
    }
}
