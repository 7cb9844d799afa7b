// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CloudFetch-specific types for streaming downloads.
//!
//! These types are used by `CloudFetchResultHandler` and related components
//! for downloading result data from cloud storage via presigned URLs.

use crate::error::{Error, Result};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;

/// Default number of links downloaded in parallel.
pub const DEFAULT_CONCURRENT_DOWNLOADS: usize = 10;

/// Default slow-download warning threshold in MB/s.
pub const DEFAULT_SPEED_THRESHOLD_MBPS: f64 = 0.1;

/// Configuration for CloudFetch streaming.
#[derive(Debug, Clone)]
pub struct CloudFetchConfig {
    /// Maximum number of downloads in flight at once.
    pub concurrency_limit: usize,
    /// Log warning if download speed falls below this threshold (MB/s).
    pub speed_threshold_mbps: f64,
}

impl Default for CloudFetchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENT_DOWNLOADS,
            speed_threshold_mbps: DEFAULT_SPEED_THRESHOLD_MBPS,
        }
    }
}

impl CloudFetchConfig {
    /// Check that the configuration can drive a download pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(Error::InvalidConfig(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.speed_threshold_mbps.is_nan() || self.speed_threshold_mbps < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "speed_threshold_mbps must be a non-negative number, got {}",
                self.speed_threshold_mbps
            )));
        }
        Ok(())
    }
}

/// One downloadable unit of a CloudFetch result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultLink {
    /// Pre-signed URL for downloading the chunk.
    pub url: String,
    /// HTTP headers to include in the download request.
    pub http_headers: HashMap<String, String>,
    /// When this link expires, in milliseconds since the Unix epoch.
    pub expiry_time_ms: i64,
    /// Row offset of this chunk in the result set.
    pub start_row_offset: i64,
    /// Number of rows in this chunk.
    pub row_count: i64,
    /// Size of this chunk in bytes, as reported by the server.
    pub byte_count: i64,
}

impl ResultLink {
    pub fn new(url: impl Into<String>, expiry_time_ms: i64, row_count: i64) -> Self {
        Self {
            url: url.into(),
            http_headers: HashMap::new(),
            expiry_time_ms,
            start_row_offset: 0,
            row_count,
            byte_count: 0,
        }
    }

    /// Add an HTTP header sent with the download request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_headers.insert(name.into(), value.into());
        self
    }

    /// Check if the link has expired at `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expiry_time_ms
    }

    /// Check if the link has expired now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }
}

/// Link as reported in a fetched row set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrowResultLink {
    pub file_link: String,
    pub expiry_time: i64,
    #[serde(default)]
    pub start_row_offset: i64,
    pub row_count: i64,
    #[serde(default)]
    pub bytes_num: i64,
    #[serde(default)]
    pub http_headers: Option<HashMap<String, String>>,
}

impl From<ArrowResultLink> for ResultLink {
    fn from(link: ArrowResultLink) -> Self {
        Self {
            url: link.file_link,
            http_headers: link.http_headers.unwrap_or_default(),
            expiry_time_ms: link.expiry_time,
            start_row_offset: link.start_row_offset,
            row_count: link.row_count,
            byte_count: link.bytes_num,
        }
    }
}

impl<'de> Deserialize<'de> for ResultLink {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        ArrowResultLink::deserialize(deserializer).map(ResultLink::from)
    }
}

/// A page of results produced by the upstream source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowSetPage {
    #[serde(default)]
    pub result_links: Option<Vec<ResultLink>>,
}

impl RowSetPage {
    pub fn with_links(links: Vec<ResultLink>) -> Self {
        Self {
            result_links: Some(links),
        }
    }

    /// Parse a page from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::from_source)
    }
}

/// Raw result data for one downloaded link.
///
/// Payloads are opaque Arrow IPC bytes; decoding happens downstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrowBatch {
    pub payloads: Vec<Bytes>,
    pub row_count: i64,
}

impl ArrowBatch {
    pub fn new(payloads: Vec<Bytes>, row_count: i64) -> Self {
        Self {
            payloads,
            row_count,
        }
    }

    /// Batch returned by a pull that had nothing to deliver.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty() && self.row_count == 0
    }

    /// Total payload size in bytes.
    pub fn byte_len(&self) -> usize {
        self.payloads.iter().map(Bytes::len).sum()
    }
}
