//! S3 + CloudFront through the `aws` CLI, so credentials, profiles and SSO
//! work exactly as they do for the operator's shell.

use std::path::Path;
use std::process::{Command, Output};

use serde::Deserialize;
use tracing::debug;

use super::{ObjectStore, resolve_required_string_field, resolve_string_field};
use crate::error::{Error, Result};
use crate::log_sanitize::output_tail;

const ERROR_TAIL_LINES: usize = 4;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub bucket: Option<String>,
    pub bucket_env: Option<String>,
    pub region: Option<String>,
    pub region_env: Option<String>,
    pub profile: Option<String>,
    pub profile_env: Option<String>,
    pub endpoint_url: Option<String>,
    pub endpoint_url_env: Option<String>,
    pub prefix: Option<String>,
    pub prefix_env: Option<String>,
    /// CloudFront distribution to invalidate after uploading.
    pub distribution_id: Option<String>,
    pub distribution_id_env: Option<String>,
}

#[derive(Debug, Clone)]
pub struct S3Store {
    bucket: String,
    region: Option<String>,
    profile: Option<String>,
    endpoint_url: Option<String>,
    prefix: Option<String>,
    distribution_id: Option<String>,
}

impl S3Store {
    pub fn from_config(cfg: &S3Config) -> Result<Self> {
        let bucket = resolve_required_string_field(
            "publish.s3.bucket",
            cfg.bucket.as_deref(),
            cfg.bucket_env.as_deref(),
        )?;
        let prefix = resolve_string_field(cfg.prefix.as_deref(), cfg.prefix_env.as_deref())
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Ok(Self {
            bucket,
            region: resolve_string_field(cfg.region.as_deref(), cfg.region_env.as_deref()),
            profile: resolve_string_field(cfg.profile.as_deref(), cfg.profile_env.as_deref()),
            endpoint_url: resolve_string_field(
                cfg.endpoint_url.as_deref(),
                cfg.endpoint_url_env.as_deref(),
            ),
            prefix,
            distribution_id: resolve_string_field(
                cfg.distribution_id.as_deref(),
                cfg.distribution_id_env.as_deref(),
            ),
        })
    }

    fn object_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    fn aws(&self) -> Command {
        let mut cmd = Command::new("aws");
        if let Some(profile) = &self.profile {
            cmd.arg("--profile").arg(profile);
        }
        if let Some(region) = &self.region {
            cmd.arg("--region").arg(region);
        }
        if let Some(endpoint) = &self.endpoint_url {
            cmd.arg("--endpoint-url").arg(endpoint);
        }
        cmd
    }

    fn head_bucket_command(&self) -> Command {
        let mut cmd = self.aws();
        cmd.args(["s3api", "head-bucket", "--bucket"]).arg(&self.bucket);
        cmd
    }

    fn upload_command(&self, local: &Path, key: &str, content_type: &str) -> Command {
        let mut cmd = self.aws();
        cmd.args(["s3", "cp", "--only-show-errors", "--content-type", content_type])
            .arg(local)
            .arg(format!("s3://{}/{}", self.bucket, self.object_key(key)));
        cmd
    }

    fn invalidation_command(&self, distribution_id: &str, paths: &[String]) -> Command {
        // CloudFront is global; only the profile applies.
        let mut cmd = Command::new("aws");
        if let Some(profile) = &self.profile {
            cmd.arg("--profile").arg(profile);
        }
        cmd.args(["cloudfront", "create-invalidation", "--output", "json"])
            .arg("--distribution-id")
            .arg(distribution_id)
            .arg("--paths")
            .args(paths);
        cmd
    }
}

impl ObjectStore for S3Store {
    fn destination(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("s3://{}/{prefix}/", self.bucket),
            None => format!("s3://{}/", self.bucket),
        }
    }

    fn preflight(&self) -> Result<()> {
        run_aws(self.head_bucket_command())
            .map(|_| ())
            .map_err(|e| Error::msg(format!("bucket {} is not reachable: {e}", self.bucket)))
    }

    fn upload(&self, local: &Path, key: &str, content_type: &str) -> Result<()> {
        run_aws(self.upload_command(local, key, content_type))
            .map(|_| ())
            .map_err(|e| Error::msg(format!("failed to upload {}: {e}", local.display())))
    }

    fn invalidate(&self, paths: &[String]) -> Result<Option<String>> {
        let Some(distribution_id) = &self.distribution_id else {
            return Ok(None);
        };
        let out = run_aws(self.invalidation_command(distribution_id, paths))?;
        Ok(Some(invalidation_id(&out.stdout).unwrap_or_else(|| "submitted".into())))
    }
}

fn run_aws(mut cmd: Command) -> Result<Output> {
    debug!(cmd = ?cmd, "running aws cli");
    let out = cmd
        .output()
        .map_err(|e| Error::msg(format!("failed to run aws cli: {e}")))?;
    if out.status.success() {
        return Ok(out);
    }
    let mut lines = output_tail(&out.stderr, ERROR_TAIL_LINES);
    if lines.is_empty() {
        lines = output_tail(&out.stdout, ERROR_TAIL_LINES);
    }
    if lines.is_empty() {
        return Err(Error::msg(format!("aws cli failed: status {}", out.status)));
    }
    Err(Error::msg(format!("aws cli failed: {}", lines.join(" | "))))
}

fn invalidation_id(stdout: &[u8]) -> Option<String> {
    let v: serde_json::Value = serde_json::from_slice(stdout).ok()?;
    v.pointer("/Invalidation/Id")
        .and_then(|id| id.as_str())
        .map(str::to_string)
}
