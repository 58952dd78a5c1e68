use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::AnalysisResult;

#[derive(Deserialize)]
pub struct ScanRequest {
    pub url: String,
}

#[derive(Serialize)]
pub struct ScanResponse {
    pub url: String,
    pub result: AnalysisResult,
    pub scanned_at: DateTime<Utc>,
    pub word_count: usize,
}

#[derive(Serialize)]
pub struct ClearCacheResponse {
    pub cleared: usize,
}
