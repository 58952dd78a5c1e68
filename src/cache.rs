//! Content-addressed store of completed verdicts.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::protocol::{truncate_chars, AnalysisRequest, AnalysisResult};

/// Identity of a (source, content) pair.
///
/// Hash of the source URL and the leading `prefix_chars` characters of the
/// trimmed text, so rescans of an unchanged page land on the same key while
/// whitespace noise around the sample does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(request: &AnalysisRequest, prefix_chars: usize) -> Self {
        let prefix = truncate_chars(request.text.trim(), prefix_chars);

        let mut hasher = Sha256::new();
        hasher.update(request.source_url.as_bytes());
        hasher.update([0u8]);
        hasher.update(prefix.as_bytes());
        CacheKey(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full digests make log lines unreadable.
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub result: AnalysisResult,
    pub stored_at: DateTime<Utc>,
}

/// Completed verdicts for the lifetime of the process. No expiry.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<CacheKey, CacheEntry>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Stores `result`, replacing whatever the key held before.
    pub fn store(&mut self, key: CacheKey, result: AnalysisResult) {
        let entry = CacheEntry {
            key: key.clone(),
            result,
            stored_at: Utc::now(),
        };
        self.entries.insert(key, entry);
    }

    /// Drops every entry and reports how many there were.
    pub fn clear(&mut self) -> usize {
        let evicted = self.entries.len();
        self.entries.clear();
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
