//! On-disk cache for scrape results.
//!
//! Each REST sweep's payload is stored as a JSON file whose name is the
//! SHA-256 of its source URL, so the same query always lands in the same
//! file. A small index file maps the six payload sections (bugs,
//! developers, attachments, comments, history, relations) back to their
//! source URLs, which makes the scrape and analyze phases fully
//! separable: `analyze` runs entirely from the cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use triago_core::{Result, TriagoError};

const INDEX_FILE: &str = "index.json";

/// The six payload sections a scrape produces.
pub const SECTIONS: [&str; 6] = [
    "bugs",
    "developers",
    "attachments",
    "comments",
    "history",
    "relations",
];

/// Maps each section name to the source URL its payload was fetched from.
///
/// # Examples
///
/// ```
/// use triago_cache::CacheIndex;
///
/// let mut index = CacheIndex::default();
/// index.insert("bugs", "https://bugzilla.example/rest/bug?product=Core");
/// assert!(index.url_for("bugs").is_some());
/// assert!(index.url_for("comments").is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheIndex {
    sections: BTreeMap<String, String>,
}

impl CacheIndex {
    pub fn insert(&mut self, section: &str, url: impl Into<String>) {
        self.sections.insert(section.to_string(), url.into());
    }

    pub fn url_for(&self, section: &str) -> Option<&str> {
        self.sections.get(section).map(String::as_str)
    }
}

/// Content-addressed JSON file cache rooted at a directory.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use triago_cache::IssueCache;
///
/// let cache = IssueCache::new(Path::new("/tmp/triago-cache"));
/// cache.put("https://bugzilla.example/rest/bug?id=1", &vec![1, 2, 3]).unwrap();
/// let ids: Vec<i32> = cache.get("https://bugzilla.example/rest/bug?id=1").unwrap();
/// assert_eq!(ids, vec![1, 2, 3]);
/// ```
pub struct IssueCache {
    root: PathBuf,
}

impl IssueCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path a URL's payload is stored at: the hex SHA-256 of the URL
    /// under the cache root.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        let mut name = String::with_capacity(64);
        for byte in digest {
            name.push_str(&format!("{byte:02x}"));
        }
        self.root.join(format!("{name}.json"))
    }

    /// Serialize `value` to the URL's cache slot, creating the cache
    /// directory on first use.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Io`] on filesystem failures or
    /// [`TriagoError::Serialization`] if the value cannot be encoded.
    pub fn put<T: Serialize>(&self, url: &str, value: &T) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.path_for(url);
        let payload = serde_json::to_vec(value)?;
        std::fs::write(&path, payload)?;
        Ok(path)
    }

    /// Read back the payload cached for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::FileNotFound`] if the URL was never cached.
    pub fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let path = self.path_for(url);
        if !path.exists() {
            return Err(TriagoError::FileNotFound(path));
        }
        let payload = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Persist the section index.
    pub fn write_index(&self, index: &CacheIndex) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(INDEX_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(index)?)?;
        Ok(path)
    }

    /// Load the section index written by the last scrape.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::FileNotFound`] when no scrape has populated
    /// this cache directory yet.
    pub fn read_index(&self) -> Result<CacheIndex> {
        let path = self.root.join(INDEX_FILE);
        if !path.exists() {
            return Err(TriagoError::FileNotFound(path));
        }
        let payload = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    pub fn index_exists(&self) -> bool {
        self.root.join(INDEX_FILE).exists()
    }

    /// Delete the whole cache directory.
    pub fn clear(&self) -> Result<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}
