use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;

use crate::catalog::Catalog;
use crate::permutations::expand;
use crate::resolve::{FileKind, resolve};

/// How many missing names a report lists before summarizing the rest.
pub const MISSING_SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct ConfigurationCompleteness {
    pub used: BTreeSet<String>,
    pub missing: BTreeSet<String>,
}

impl ConfigurationCompleteness {
    pub fn ok(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Permutation values used by any target but absent from `configurations`.
pub fn check_configuration_completeness(catalog: &Catalog) -> ConfigurationCompleteness {
    let documented = catalog
        .configurations
        .iter()
        .flat_map(|g| g.permutations.iter().map(|p| p.id.clone()))
        .collect::<BTreeSet<_>>();
    let used = catalog
        .targets()
        .flat_map(|t| t.configuration.permutations.values().map(str::to_string))
        .collect::<BTreeSet<_>>();
    let missing = used.difference(&documented).cloned().collect();
    ConfigurationCompleteness { used, missing }
}

pub fn format_completeness_report(r: &ConfigurationCompleteness) -> String {
    if r.ok() {
        return format!(
            "✓ All {} permutation values have displayNames\n",
            r.used.len()
        );
    }
    let mut out = format!("Missing {} configuration displayNames:\n", r.missing.len());
    for id in &r.missing {
        out.push_str(&format!("  - {id}\n"));
    }
    out
}

#[derive(Debug, Clone)]
pub struct UnresolvedKconfig {
    pub target_id: String,
    pub permutation: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct KconfigPresence {
    pub total: usize,
    pub present: Vec<String>,
    pub missing: Vec<String>,
    pub unresolved: Vec<UnresolvedKconfig>,
}

impl KconfigPresence {
    pub fn ok(&self) -> bool {
        self.missing.is_empty() && self.unresolved.is_empty()
    }

    /// Share of present files, rounded down.
    pub fn percent_complete(&self) -> usize {
        if self.total == 0 {
            return 0;
        }
        self.present.len() * 100 / self.total
    }
}

/// Checks that a kconfig exists for every (target, permutation) pair.
///
/// Template errors are collected alongside missing files so one pass shows
/// every problem.
pub fn validate_kconfig_presence(catalog: &Catalog, kconfigs_dir: &Path) -> KconfigPresence {
    let mut report = KconfigPresence::default();
    for target in catalog.targets() {
        for permutation in expand(&target.configuration.permutations) {
            report.total += 1;
            match resolve(target, &permutation, FileKind::Kconfig) {
                Ok(name) => {
                    if kconfigs_dir.join(&name).is_file() {
                        report.present.push(name);
                    } else {
                        debug!(target = %target.target_id, kconfig = %name, "kconfig missing");
                        report.missing.push(name);
                    }
                }
                Err(e) => report.unresolved.push(UnresolvedKconfig {
                    target_id: target.target_id.clone(),
                    permutation: permutation.to_string(),
                    error: e.to_string(),
                }),
            }
        }
    }
    report
}

pub fn format_presence_report(r: &KconfigPresence) -> String {
    if r.ok() {
        return format!("✓ All {} kconfig files present\n", r.total);
    }
    let mut out = String::new();
    if !r.missing.is_empty() {
        out.push_str(&format!(
            "Missing {}/{} kconfig files ({}% complete):\n",
            r.missing.len(),
            r.total,
            r.percent_complete()
        ));
        out.push_str(&format_sample(&r.missing, MISSING_SAMPLE_LIMIT));
    }
    if !r.unresolved.is_empty() {
        out.push_str(&format!(
            "Unresolvable kconfig names for {} permutations:\n",
            r.unresolved.len()
        ));
        let lines = r
            .unresolved
            .iter()
            .map(|u| format!("[{}] {}: {}", u.target_id, u.permutation, u.error))
            .collect::<Vec<_>>();
        out.push_str(&format_sample(&lines, MISSING_SAMPLE_LIMIT));
    }
    out
}

/// First `limit` items as a bullet list, plus an `... and N more` line.
pub fn format_sample(items: &[String], limit: usize) -> String {
    let mut out = String::new();
    for item in items.iter().take(limit) {
        out.push_str(&format!("  - {item}\n"));
    }
    if items.len() > limit {
        out.push_str(&format!("  ... and {} more\n", items.len() - limit));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn catalog(raw: &str) -> Catalog {
        Catalog::parse(raw, Path::new("index.json")).expect("parse catalog")
    }

    #[test]
    fn complete_when_every_value_is_documented() {
        let c = catalog(
            r#"{
            "targets": [{"targetId": "a", "vendorId": "b",
                "configuration": {"permutations": {"rev": ["v1"], "bus": ["usb"]}}}],
            "configurations": [
                {"permutations": [{"id": "v1", "displayName": "V1"}]},
                {"permutations": [{"id": "usb", "displayName": "USB"}, {"id": "can"}]}
            ]
        }"#,
        );
        let r = check_configuration_completeness(&c);
        assert!(r.ok());
        assert_eq!(r.used.len(), 2);
        assert!(format_completeness_report(&r).starts_with("✓ All 2 permutation values"));
    }

    #[test]
    fn reports_used_minus_documented() {
        let c = catalog(
            r#"{
            "targets": [
                {"targetId": "a", "vendorId": "b",
                 "configuration": {"permutations": {"rev": ["v1", "v2"]}}},
                {"targetId": "c", "vendorId": "d"}
            ],
            "configurations": [{"permutations": [{"id": "v1"}, {"id": "unused"}]}]
        }"#,
        );
        let r = check_configuration_completeness(&c);
        assert_eq!(r.missing, BTreeSet::from(["v2".to_string()]));
        assert_eq!(
            format_completeness_report(&r),
            "Missing 1 configuration displayNames:\n  - v2\n"
        );
    }

    #[test]
    fn presence_counts_and_truncates_missing_list() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let kconfigs = tmp.path().join("kconfigs");
        fs::create_dir_all(&kconfigs).expect("mkdir");
        fs::write(kconfigs.join("a_b_0.kconfig"), "").expect("seed");

        let revs = (0..12)
            .map(|i| format!("\"{i:02}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let c = catalog(&format!(
            r#"{{"targets": [{{"targetId": "a", "vendorId": "b", "configuration": {{
                "kconfigFilenameTemplate": "{{targetId}}_{{vendorId}}_{{rev}}.kconfig",
                "permutations": {{"rev": [{revs}, "0"]}}}}}}]}}"#
        ));
        let r = validate_kconfig_presence(&c, &kconfigs);
        assert_eq!(r.total, 13);
        assert_eq!(r.present, vec!["a_b_0.kconfig".to_string()]);
        assert_eq!(r.missing.len(), 12);
        assert_eq!(r.percent_complete(), 7);

        let text = format_presence_report(&r);
        assert!(text.starts_with("Missing 12/13 kconfig files (7% complete):\n"));
        assert!(text.contains("  - a_b_00.kconfig\n"));
        assert!(!text.contains("a_b_10.kconfig"));
        assert!(text.ends_with("  ... and 2 more\n"));
    }

    #[test]
    fn template_errors_are_collected_not_fatal() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("ok_x.kconfig"), "").expect("seed");
        let c = catalog(
            r#"{"targets": [
                {"targetId": "bad", "vendorId": "x",
                 "configuration": {"kconfigTemplate": "{targetId}_{missing}.kconfig"}},
                {"targetId": "ok", "vendorId": "x"}
            ]}"#,
        );
        let r = validate_kconfig_presence(&c, tmp.path());
        assert_eq!(r.total, 2);
        assert_eq!(r.present.len(), 1);
        assert_eq!(r.unresolved.len(), 1);
        assert!(!r.ok());
        assert!(format_presence_report(&r).contains("[bad] (default)"));
    }
}
