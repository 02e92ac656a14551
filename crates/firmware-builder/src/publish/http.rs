use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

use super::{ObjectStore, resolve_required_string_field, resolve_string_field};
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: Option<String>,
    pub base_url_env: Option<String>,
    pub token: Option<String>,
    pub token_env: Option<String>,
    /// Receives `POST {"paths": [...]}` after the upload.
    pub purge_url: Option<String>,
    pub purge_url_env: Option<String>,
}

/// Objects are `PUT` to `<base_url>/<key>`.
pub struct HttpStore {
    base_url: String,
    token: Option<String>,
    purge_url: Option<String>,
    client: Client,
}

impl HttpStore {
    pub fn from_config(cfg: &HttpConfig) -> Result<Self> {
        let base_url = resolve_required_string_field(
            "publish.http.base_url",
            cfg.base_url.as_deref(),
            cfg.base_url_env.as_deref(),
        )?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: resolve_string_field(cfg.token.as_deref(), cfg.token_env.as_deref()),
            purge_url: resolve_string_field(cfg.purge_url.as_deref(), cfg.purge_url_env.as_deref()),
            client,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }

    fn authorize(
        &self,
        req: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match self.token.as_deref() {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }
}

impl ObjectStore for HttpStore {
    fn destination(&self) -> String {
        format!("{}/", self.base_url)
    }

    fn upload(&self, local: &Path, key: &str, content_type: &str) -> Result<()> {
        let body = fs::read(local)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", local.display())))?;
        let url = self.object_url(key);
        debug!(url = %url, bytes = body.len(), "PUT object");
        let res = self
            .authorize(self.client.put(&url).header(CONTENT_TYPE, content_type).body(body))
            .send()
            .map_err(|e| Error::msg(format!("HTTP upload of {key} failed: {e}")))?;
        if res.status().is_success() {
            return Ok(());
        }
        Err(Error::msg(format!(
            "HTTP upload of {key} failed with status {}",
            res.status()
        )))
    }

    fn invalidate(&self, paths: &[String]) -> Result<Option<String>> {
        let Some(purge_url) = &self.purge_url else {
            return Ok(None);
        };
        let res = self
            .authorize(self.client.post(purge_url).json(&serde_json::json!({ "paths": paths })))
            .send()
            .map_err(|e| Error::msg(format!("purge request failed: {e}")))?;
        if !res.status().is_success() {
            return Err(Error::msg(format!(
                "purge request failed with status {}",
                res.status()
            )));
        }
        Ok(Some(res.status().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_urls_join_with_single_slash() {
        let store = HttpStore::from_config(&HttpConfig {
            base_url: Some("https://fw.example.invalid/releases/".into()),
            ..HttpConfig::default()
        })
        .expect("store");
        assert_eq!(
            store.object_url("builds/v1/a_b.bin"),
            "https://fw.example.invalid/releases/builds/v1/a_b.bin"
        );
        assert_eq!(store.destination(), "https://fw.example.invalid/releases/");
    }

    #[test]
    fn no_purge_url_means_nothing_to_invalidate() {
        let store = HttpStore::from_config(&HttpConfig {
            base_url: Some("https://fw.example.invalid".into()),
            ..HttpConfig::default()
        })
        .expect("store");
        assert_eq!(store.invalidate(&["/*".to_string()]).expect("invalidate"), None);
    }

    #[test]
    fn base_url_is_required() {
        let err = HttpStore::from_config(&HttpConfig::default()).err().expect("error");
        assert!(err.to_string().contains("publish.http.base_url"), "unexpected err: {err}");
    }
}
