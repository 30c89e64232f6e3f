use std::{path::Path, time::Duration};

use anyhow::{anyhow, Result};
use serde::Deserialize;

pub const DEFAULT_ENDPOINT: &str = "https://query.wikidata.org/sparql";

pub const DEFAULT_API_URL: &str = "https://www.wikidata.org/w/api.php";

/// Wikidata's "VIAF ID" external-identifier property.
pub const DEFAULT_PROPERTY: &str = "P214";

const DEFAULT_LANGUAGE: &str = "en";

const DEFAULT_ARTICLE_SITE: &str = "https://en.wikipedia.org/";

const TIMEOUT_SECS: u64 = 10;

const DEFAULT_USER_AGENT: &str =
    concat!("viaf-reconcile/", env!("CARGO_PKG_VERSION"), " (batch VIAF reconciliation)");

/// Everything a lookup needs to know about the remote side. Built once and
/// passed by reference into every client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    pub endpoint: String,
    pub api_url: String,
    pub language: String,
    pub property: String,
    pub article_site: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            api_url: DEFAULT_API_URL.to_owned(),
            language: DEFAULT_LANGUAGE.to_owned(),
            property: DEFAULT_PROPERTY.to_owned(),
            article_site: DEFAULT_ARTICLE_SITE.to_owned(),
            timeout_secs: TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl ReconcileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        match serde_json::from_str::<ReconcileConfig>(&contents) {
            Ok(config) => config.validated(),
            Err(err) => Err(anyhow!(
                "Failed to load config {}: {}",
                path.as_ref().display(),
                err
            )),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn with_endpoint<T: Into<String>>(mut self, endpoint: T) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_language<T: Into<String>>(mut self, language: T) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Rejects values that would end up spliced into a query in a broken way.
    pub fn validated(self) -> Result<Self> {
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be greater than zero"));
        }
        if self.language.is_empty()
            || !self
                .language
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(anyhow!("invalid language tag {:?}", self.language));
        }
        let property_digits = self.property.strip_prefix('P').unwrap_or_default();
        if property_digits.is_empty() || !property_digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow!("invalid property id {:?}", self.property));
        }
        if self.article_site.contains(['<', '>', '"', ' ']) {
            return Err(anyhow!("invalid article site {:?}", self.article_site));
        }
        Ok(self)
    }
}
