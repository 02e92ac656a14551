//! The JSON catalog (`index.json`): targets, documented configuration values,
//! and the list of published builds.
//!
//! Targets and configuration documentation are parsed into typed structures
//! for validation but written back exactly as they were read, so saving the
//! catalog after a build only changes the `builds` array. Text is written
//! ASCII-only, with `\uXXXX` escapes for everything else.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::permutations::Axes;
use crate::resolve::FileKind;
use crate::util::write_json_pretty;

pub mod checks;

/// A catalog node parsed into `T` but serialized from the JSON it was read from.
#[derive(Debug, Clone)]
pub struct Verbatim<T> {
    value: T,
    raw: Value,
}

impl<T> Deref for Verbatim<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Serialize for Verbatim<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Verbatim<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let value = T::deserialize(&raw).map_err(serde::de::Error::custom)?;
        Ok(Self { value, raw })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub target_id: String,
    pub vendor_id: String,
    #[serde(default)]
    pub configuration: TargetConfiguration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfiguration {
    #[serde(default)]
    pub permutations: Axes,
    /// Filename templates (current and legacy keys) and any other settings.
    #[serde(flatten)]
    pub settings: BTreeMap<String, Value>,
}

impl TargetConfiguration {
    /// A setting's string value; empty strings count as unset.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn with_setting(mut self, key: &str, value: &str) -> Self {
        self.settings
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    fn validate(&self, target_id: &str) -> Result<()> {
        for kind in [FileKind::Kconfig, FileKind::Firmware] {
            for key in kind.setting().keys {
                match self.settings.get(*key) {
                    None | Some(Value::Null) | Some(Value::String(_)) => {}
                    Some(other) => {
                        return Err(Error::catalog(format!(
                            "target '{target_id}': configuration.{key} must be a string, got {other}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigurationGroup {
    #[serde(default)]
    pub permutations: Vec<ConfigurationValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationValue {
    pub id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildEntry {
    pub version: String,
    pub build_date: String,
    #[serde(default)]
    pub github_commit_url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BuildEntry {
    pub fn new(version: &str, commit_ref: &str, now: DateTime<Utc>) -> Self {
        Self {
            version: version.to_string(),
            build_date: format_build_date(now),
            github_commit_url: commit_ref.to_string(),
            extra: Map::new(),
        }
    }
}

/// ISO-8601 UTC at seconds precision with a `Z` suffix.
pub fn format_build_date(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub targets: Vec<Verbatim<Target>>,
    #[serde(default)]
    pub configurations: Vec<Verbatim<ConfigurationGroup>>,
    #[serde(default)]
    pub builds: Vec<BuildEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Catalog {
    pub fn parse(raw: &str, origin: &Path) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(raw).map_err(|e| {
            Error::catalog(format!("failed to parse catalog {}: {e}", origin.display()))
        })?;
        catalog.validate().map_err(|e| {
            Error::catalog(format!("invalid catalog {}: {e}", origin.display()))
        })?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<()> {
        for t in self.targets() {
            if t.target_id.trim().is_empty() {
                return Err(Error::catalog("targets[].targetId is empty"));
            }
            t.configuration.validate(&t.target_id)?;
        }
        Ok(())
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().map(|t| &**t)
    }

    pub fn build(&self, version: &str) -> Option<&BuildEntry> {
        self.builds.iter().find(|b| b.version == version)
    }

    /// Replaces the entry for `entry.version` or appends it, then re-sorts.
    pub fn upsert_build(&mut self, entry: BuildEntry) {
        match self.builds.iter_mut().find(|b| b.version == entry.version) {
            Some(existing) => *existing = entry,
            None => self.builds.push(entry),
        }
        self.sort_builds();
    }

    /// Newest first by plain string comparison of the version.
    pub fn sort_builds(&mut self) {
        self.builds.sort_by(|a, b| b.version.cmp(&a.version));
    }
}

/// Where the catalog and its seed template live on disk.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    pub index_path: PathBuf,
    pub template_path: PathBuf,
}

impl CatalogStore {
    pub fn new(index_path: impl Into<PathBuf>, template_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            template_path: template_path.into(),
        }
    }

    pub fn load_template(&self) -> Result<Catalog> {
        read_catalog(&self.template_path, "catalog template")
    }

    /// Reads the catalog, seeding it from the template first if it does not exist yet.
    pub fn load(&self) -> Result<Catalog> {
        if !self.index_path.exists() {
            let template = self.load_template()?;
            info!(
                index = %self.index_path.display(),
                template = %self.template_path.display(),
                "catalog missing; seeding from template"
            );
            self.save(&template)?;
        }
        read_catalog(&self.index_path, "catalog")
    }

    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        write_json_pretty(&self.index_path, catalog).map_err(|e| {
            Error::msg(format!(
                "failed to write catalog {}: {e}",
                self.index_path.display()
            ))
        })
    }

    /// Adds or refreshes the build entry for `version`, stamped with the current time.
    pub fn record_build(&self, version: &str, commit_ref: &str) -> Result<BuildEntry> {
        let mut catalog = self.load()?;
        let entry = BuildEntry::new(version, commit_ref, Utc::now());
        catalog.upsert_build(entry.clone());
        self.save(&catalog)?;
        debug!(version, builds = catalog.builds.len(), "recorded build entry");
        Ok(entry)
    }

    /// Rewrites the catalog from the template plus one build entry per
    /// directory under `builds_dir`, keeping existing entries for known versions.
    pub fn rebuild_index(&self, builds_dir: &Path) -> Result<Catalog> {
        self.rebuild_index_at(builds_dir, Utc::now())
    }

    pub fn rebuild_index_at(&self, builds_dir: &Path, now: DateTime<Utc>) -> Result<Catalog> {
        if !builds_dir.is_dir() {
            return Err(Error::msg(format!(
                "builds directory not found: {}",
                builds_dir.display()
            )));
        }

        let mut catalog = self.load_template()?;
        let existing = if self.index_path.exists() {
            self.load()?.builds
        } else {
            Vec::new()
        };
        let mut by_version = BTreeMap::<String, BuildEntry>::new();
        for b in existing {
            by_version.insert(b.version.clone(), b);
        }

        let mut builds = Vec::new();
        for version in scan_versions(builds_dir)? {
            let entry = match by_version.remove(&version) {
                Some(kept) => kept,
                None => {
                    debug!(version = %version, "new build directory");
                    BuildEntry::new(&version, "", now)
                }
            };
            builds.push(entry);
        }

        catalog.builds = builds;
        catalog.sort_builds();
        self.save(&catalog)?;
        Ok(catalog)
    }
}

fn read_catalog(path: &Path, what: &str) -> Result<Catalog> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::catalog(format!("failed to read {what} {}: {e}", path.display())))?;
    Catalog::parse(&raw, path)
}

/// Names of the immediate subdirectories of `builds_dir`.
pub fn scan_versions(builds_dir: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(builds_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| Error::msg(format!("walkdir error: {e}")))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            return Err(Error::msg(format!(
                "build directory name is not valid UTF-8: {}",
                entry.path().display()
            )));
        };
        out.push(name.to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = r#"{
    "targets": [
        {
            "name": "Octopus",
            "targetId": "octopus",
            "vendorId": "btt",
            "configuration": {
                "kconfigFilenameTemplate": "{targetId}_{vendorId}_{mcu}.kconfig",
                "permutations": {
                    "mcu": [
                        "f446",
                        "h723"
                    ]
                }
            }
        }
    ],
    "configurations": [
        {
            "name": "MCU",
            "permutations": [
                {
                    "id": "f446",
                    "displayName": "STM32F446"
                }
            ]
        }
    ],
    "builds": []
}
"#;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("timestamp")
    }

    fn store_in(dir: &Path) -> CatalogStore {
        CatalogStore::new(dir.join("index.json"), dir.join("index-template.json"))
    }

    #[test]
    fn build_date_is_second_precision_utc() {
        let e = BuildEntry::new("v1", "", at(1_700_000_000));
        assert_eq!(e.build_date, "2023-11-14T22:13:20Z");
    }

    #[test]
    fn upsert_same_version_keeps_one_entry_and_second_wins() {
        let mut c = Catalog::default();
        c.upsert_build(BuildEntry::new("v0.12.0-10", "first", at(100)));
        c.upsert_build(BuildEntry::new("v0.12.0-9", "", at(150)));
        c.upsert_build(BuildEntry::new("v0.12.0-10", "second", at(200)));

        let matching = c
            .builds
            .iter()
            .filter(|b| b.version == "v0.12.0-10")
            .collect::<Vec<_>>();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].github_commit_url, "second");
        assert_eq!(matching[0].build_date, format_build_date(at(200)));
    }

    #[test]
    fn builds_sorted_descending_by_string() {
        let mut c = Catalog::default();
        for v in ["v0.12.0-10", "v0.12.0-9", "v0.13.0-1", "v0.12.0-100"] {
            c.upsert_build(BuildEntry::new(v, "", at(0)));
        }
        let got = c.builds.iter().map(|b| b.version.as_str()).collect::<Vec<_>>();
        assert_eq!(got, vec!["v0.13.0-1", "v0.12.0-9", "v0.12.0-100", "v0.12.0-10"]);
    }

    #[test]
    fn save_round_trips_targets_verbatim() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store_in(tmp.path());
        fs::write(&store.index_path, SAMPLE).expect("seed");

        let mut c = store.load().expect("load");
        assert_eq!(c.targets().next().expect("target").target_id, "octopus");
        store.save(&c).expect("save");
        assert_eq!(fs::read_to_string(&store.index_path).expect("read"), SAMPLE);

        c.upsert_build(BuildEntry::new("v1", "https://example.invalid/c/1", at(0)));
        store.save(&c).expect("save");
        let body = fs::read_to_string(&store.index_path).expect("read");
        assert!(body.contains("\"name\": \"Octopus\""));
        assert!(body.contains("\"githubCommitUrl\": \"https://example.invalid/c/1\""));
        assert!(body.ends_with("}\n"));
    }

    #[test]
    fn save_keeps_unicode_escapes_byte_exact() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store_in(tmp.path());
        let body = SAMPLE.replace(
            r#""displayName": "STM32F446""#,
            r#""displayName": "\u00b5C \u2713""#,
        );
        fs::write(&store.index_path, &body).expect("seed");

        let mut c = store.load().expect("load");
        store.save(&c).expect("save");
        assert_eq!(fs::read_to_string(&store.index_path).expect("read"), body);

        c.upsert_build(BuildEntry::new("v1", "", at(0)));
        store.save(&c).expect("save");
        let after = fs::read_to_string(&store.index_path).expect("read");
        assert!(after.contains(r#""displayName": "\u00b5C \u2713""#), "{after}");
        assert!(after.is_ascii());
    }

    #[test]
    fn load_seeds_from_template_but_never_overwrites() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store_in(tmp.path());
        fs::write(&store.template_path, SAMPLE).expect("template");

        let c = store.load().expect("load");
        assert_eq!(c.targets.len(), 1);
        assert!(store.index_path.is_file());

        fs::write(&store.index_path, r#"{"targets": [], "builds": []}"#).expect("edit");
        let c = store.load().expect("load again");
        assert!(c.targets.is_empty(), "existing catalog must win over template");
    }

    #[test]
    fn load_without_catalog_or_template_fails() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = store_in(tmp.path()).load().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Catalog);
        assert!(err.to_string().contains("index-template.json"), "unexpected err: {err}");
    }

    #[test]
    fn rejects_non_string_template() {
        let raw = r#"{"targets": [{"targetId": "a", "vendorId": "b",
            "configuration": {"fileTemplate": 3}}]}"#;
        let err = Catalog::parse(raw, Path::new("index.json")).unwrap_err();
        assert!(err.to_string().contains("fileTemplate"), "unexpected err: {err}");
    }

    #[test]
    fn rejects_target_without_vendor() {
        let raw = r#"{"targets": [{"targetId": "a"}]}"#;
        let err = Catalog::parse(raw, Path::new("index.json")).unwrap_err();
        assert!(err.to_string().contains("vendorId"), "unexpected err: {err}");
    }

    #[test]
    fn rebuild_preserves_known_entries_and_synthesizes_new_ones() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store_in(tmp.path());
        fs::write(&store.template_path, SAMPLE).expect("template");

        let mut c = store.load().expect("load");
        c.upsert_build(BuildEntry::new("v1", "https://example.invalid/c/1", at(10)));
        c.upsert_build(BuildEntry::new("gone", "", at(20)));
        store.save(&c).expect("save");

        let builds = tmp.path().join("builds");
        fs::create_dir_all(builds.join("v1")).expect("v1");
        fs::create_dir_all(builds.join("v2")).expect("v2");
        fs::write(builds.join("stray.txt"), "x").expect("stray file");

        let rebuilt = store.rebuild_index_at(&builds, at(1000)).expect("rebuild");
        let versions = rebuilt
            .builds
            .iter()
            .map(|b| b.version.as_str())
            .collect::<Vec<_>>();
        assert_eq!(versions, vec!["v2", "v1"]);

        let v1 = rebuilt.build("v1").expect("v1");
        assert_eq!(v1.build_date, format_build_date(at(10)));
        assert_eq!(v1.github_commit_url, "https://example.invalid/c/1");

        let v2 = rebuilt.build("v2").expect("v2");
        assert_eq!(v2.build_date, format_build_date(at(1000)));
        assert_eq!(v2.github_commit_url, "");

        let on_disk = store.load().expect("reload");
        assert_eq!(on_disk.builds, rebuilt.builds);
    }

    #[test]
    fn rebuild_requires_builds_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store_in(tmp.path());
        fs::write(&store.template_path, SAMPLE).expect("template");
        let err = store.rebuild_index(&tmp.path().join("builds")).unwrap_err();
        assert!(err.to_string().contains("builds directory not found"));
    }
}
