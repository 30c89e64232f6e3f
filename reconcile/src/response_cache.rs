use std::{fs::create_dir_all, io::Write, path::PathBuf};

use anyhow::Result;
use tracing::{debug, warn};

use crate::{error::FetchError, sparql_endpoint::SparqlEndpoint};

const ROOT_CACHE_SUBDIR: &str = "sparql";

/// Keeps successful query responses on disk, so re-running a batch doesn't
/// hit the remote endpoint again for identifiers it has already answered.
pub struct ResponseCache {
    cache_dir: PathBuf,
}

impl ResponseCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    pub fn get_cached_path<T: AsRef<str>>(&self, relative_pathname: T) -> PathBuf {
        let mut result = self.cache_dir.clone();
        for path_part in relative_pathname.as_ref().split('/') {
            result.push(path_part);
        }
        result
    }

    pub fn filename_for_key<T: AsRef<str>>(key: T) -> String {
        format!(
            "{ROOT_CACHE_SUBDIR}/{:x}.json",
            md5::compute(key.as_ref().as_bytes())
        )
    }

    /// A cache entry that can't be read or isn't JSON counts as a miss, so
    /// the response gets fetched and stored again.
    pub fn load<T: AsRef<str>>(&self, key: T) -> Option<String> {
        let cached_path = self.get_cached_path(Self::filename_for_key(key));
        if !cached_path.exists() {
            return None;
        }
        let contents = match std::fs::read_to_string(&cached_path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("Unable to read {}: {err:?}", cached_path.display());
                return None;
            }
        };
        if let Err(err) = serde_json::from_str::<serde_json::Value>(&contents) {
            warn!("Ignoring corrupt cache entry {}: {err}", cached_path.display());
            return None;
        }
        Some(contents)
    }

    /// Stores `body` pretty-printed. Bodies that aren't JSON are refused.
    /// The entry is written to a temporary file next to it and then renamed
    /// into place, so readers never see a partly written entry.
    pub fn store<T: AsRef<str>, U: AsRef<str>>(&self, key: T, body: U) -> Result<()> {
        let cached_path = self.get_cached_path(Self::filename_for_key(key));
        let json_body: serde_json::Value = serde_json::from_str(body.as_ref())?;
        let pretty_printed = serde_json::to_string_pretty(&json_body)?;
        let parent_dir = cached_path
            .parent()
            .map(|dir| dir.to_path_buf())
            .unwrap_or_else(|| self.cache_dir.clone());
        create_dir_all(&parent_dir)?;
        let mut entry = tempfile::NamedTempFile::new_in(&parent_dir)?;
        entry.write_all(pretty_printed.as_bytes())?;
        entry.persist(&cached_path)?;
        Ok(())
    }
}

/// Wraps another endpoint, answering from the cache when it can.
pub struct CachingEndpoint<E> {
    inner: E,
    cache: ResponseCache,
}

impl<E: SparqlEndpoint> CachingEndpoint<E> {
    pub fn new(inner: E, cache: ResponseCache) -> Self {
        Self { inner, cache }
    }
}

impl<E: SparqlEndpoint> SparqlEndpoint for CachingEndpoint<E> {
    fn select(&self, query: &str) -> Result<String, FetchError> {
        let key = self.inner.request_key(query);
        if let Some(body) = self.cache.load(&key) {
            debug!("answered query from cache");
            return Ok(body);
        }
        let body = self.inner.select(query)?;
        if let Err(err) = self.cache.store(&key, &body) {
            warn!(
                "Not caching response in {}: {err}",
                self.cache.cache_dir().display()
            );
        }
        Ok(body)
    }

    fn request_key(&self, query: &str) -> String {
        self.inner.request_key(query)
    }
}
