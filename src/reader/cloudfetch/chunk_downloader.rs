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

//! ChunkDownloader for downloading result data from cloud storage.
//!
//! This module handles downloading chunk data from presigned URLs,
//! including expiry checks, HTTP header handling, status checks, and
//! speed monitoring. The downloaded bytes are returned undecoded.

use crate::client::http::strip_query;
use crate::client::CloudFetchHttpClient;
use crate::error::{Error, Result};
use crate::types::cloudfetch::{ArrowBatch, ResultLink};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Downloads the data behind one [`ResultLink`].
#[async_trait]
pub trait BatchDownloader: Send + Sync + Debug {
    async fn download(&self, link: &ResultLink) -> Result<ArrowBatch>;
}

/// Downloads result data from cloud storage presigned URLs.
///
/// Handles:
/// - Expiry check before any request is made
/// - HTTP GET to presigned URL with the link's headers
/// - Download speed monitoring
#[derive(Debug)]
pub struct ChunkDownloader {
    http_client: Arc<CloudFetchHttpClient>,
    speed_threshold_mbps: f64,
}

impl ChunkDownloader {
    /// Create a new chunk downloader.
    ///
    /// # Arguments
    /// * `http_client` - HTTP client for making requests
    /// * `speed_threshold_mbps` - Log warning if speed falls below this (MB/s)
    pub fn new(http_client: Arc<CloudFetchHttpClient>, speed_threshold_mbps: f64) -> Self {
        Self {
            http_client,
            speed_threshold_mbps,
        }
    }
}

#[async_trait]
impl BatchDownloader for ChunkDownloader {
    async fn download(&self, link: &ResultLink) -> Result<ArrowBatch> {
        if link.is_expired() {
            return Err(Error::ExpiredLink {
                expiry_time_ms: link.expiry_time_ms,
            });
        }

        let start = Instant::now();

        debug!(
            "Downloading rows {}..{} from {} ({} bytes expected)",
            link.start_row_offset,
            link.start_row_offset + link.row_count,
            strip_query(&link.url),
            link.byte_count
        );

        let response = self.http_client.get(&link.url, &link.http_headers).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let bytes = response.bytes().await?;

        log_download_metrics(
            &link.url,
            bytes.len(),
            start.elapsed(),
            self.speed_threshold_mbps,
        );

        Ok(ArrowBatch::new(vec![bytes], link.row_count))
    }
}

/// Download speed in MB/s.
pub fn download_speed_mbps(byte_count: usize, elapsed: Duration) -> f64 {
    let size_mb = byte_count as f64 / (1024.0 * 1024.0);
    size_mb / elapsed.as_secs_f64()
}

fn log_download_metrics(url: &str, byte_count: usize, elapsed: Duration, threshold_mbps: f64) {
    let speed_mbps = download_speed_mbps(byte_count, elapsed);

    info!(
        "CloudFetch download speed from {}: {:.4} MB/s",
        strip_query(url),
        speed_mbps
    );

    if speed_mbps < threshold_mbps {
        warn!(
            "CloudFetch download slower than threshold speed of {:.4} MB/s: {:.4} MB/s",
            threshold_mbps, speed_mbps
        );
    }
}
