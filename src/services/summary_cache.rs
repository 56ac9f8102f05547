use std::sync::Arc;

use moka::sync::Cache;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::models::CsvAnalysis;
use crate::services::csv_loader::analyze_csv;

/// Memoizes CSV analyses by the SHA-256 of the raw bytes.
///
/// A capacity of zero turns caching off entirely.
#[derive(Clone)]
pub struct SummaryCache {
    inner: Option<Cache<String, Arc<CsvAnalysis>>>,
}

impl SummaryCache {
    pub fn new(capacity: u64) -> Self {
        let inner = (capacity > 0).then(|| Cache::new(capacity));
        Self { inner }
    }

    pub fn key_for(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    pub fn get_or_analyze(&self, data: &[u8]) -> Result<Arc<CsvAnalysis>, AppError> {
        let Some(cache) = &self.inner else {
            return analyze_csv(data).map(Arc::new);
        };

        let key = Self::key_for(data);
        if let Some(hit) = cache.get(&key) {
            tracing::debug!("Summary cache hit for {}", key);
            return Ok(hit);
        }

        // Parse failures are not cached; a retry re-parses.
        let analysis = Arc::new(analyze_csv(data)?);
        cache.insert(key, Arc::clone(&analysis));
        Ok(analysis)
    }
}
