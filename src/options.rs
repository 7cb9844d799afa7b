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

//! String-keyed client options.
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `databricks.cloudfetch.concurrent_downloads` | 10 | Parallel downloads |
//! | `databricks.cloudfetch.speed_threshold_mbps` | 0.1 | Slow download warning threshold |
//! | `databricks.http.connect_timeout_ms` | 30000 | Connect timeout |
//! | `databricks.http.read_timeout_ms` | 60000 | Read timeout |
//! | `databricks.http.max_retries` | 0 | Transport retry attempts |
//! | `databricks.http.retry_delay_ms` | 1500 | Base retry delay |
//! | `databricks.log_level` | unset | Log level, or `off` |
//! | `databricks.log_file` | unset | Log file path |

use crate::client::HttpClientConfig;
use crate::error::{Error, Result};
use crate::logging::LogConfig;
use crate::types::cloudfetch::CloudFetchConfig;
use std::time::Duration;

pub const OPT_CONCURRENT_DOWNLOADS: &str = "databricks.cloudfetch.concurrent_downloads";
pub const OPT_SPEED_THRESHOLD_MBPS: &str = "databricks.cloudfetch.speed_threshold_mbps";
pub const OPT_CONNECT_TIMEOUT_MS: &str = "databricks.http.connect_timeout_ms";
pub const OPT_READ_TIMEOUT_MS: &str = "databricks.http.read_timeout_ms";
pub const OPT_MAX_RETRIES: &str = "databricks.http.max_retries";
pub const OPT_RETRY_DELAY_MS: &str = "databricks.http.retry_delay_ms";
pub const OPT_LOG_LEVEL: &str = "databricks.log_level";
pub const OPT_LOG_FILE: &str = "databricks.log_file";

/// All configuration consumed by the result pipeline.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub cloudfetch: CloudFetchConfig,
    pub http: HttpClientConfig,
    pub log: LogConfig,
}

impl ClientOptions {
    /// Build options from key/value pairs, applied in order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (key, value) in pairs {
            options.set_option(key.as_ref(), value.as_ref())?;
        }
        options.cloudfetch.validate()?;
        Ok(options)
    }

    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            OPT_CONCURRENT_DOWNLOADS => {
                let v = parse_int_option(key, value)?;
                self.cloudfetch.concurrency_limit = usize::try_from(v)
                    .ok()
                    .filter(|&limit| limit >= 1)
                    .ok_or_else(|| Error::invalid_option(key, value))?;
            }
            OPT_SPEED_THRESHOLD_MBPS => {
                self.cloudfetch.speed_threshold_mbps = parse_float_option(key, value)?;
            }
            OPT_CONNECT_TIMEOUT_MS => {
                self.http.connect_timeout = parse_millis_option(key, value)?;
            }
            OPT_READ_TIMEOUT_MS => {
                self.http.read_timeout = parse_millis_option(key, value)?;
            }
            OPT_MAX_RETRIES => {
                let v = parse_int_option(key, value)?;
                self.http.max_retries =
                    u32::try_from(v).map_err(|_| Error::invalid_option(key, value))?;
            }
            OPT_RETRY_DELAY_MS => {
                self.http.retry_delay = parse_millis_option(key, value)?;
            }
            OPT_LOG_LEVEL => {
                self.log.level = Some(value.to_string());
            }
            OPT_LOG_FILE => {
                self.log.file = Some(value.to_string());
            }
            _ => return Err(Error::invalid_option(key, value)),
        }
        Ok(())
    }

    pub fn get_option(&self, key: &str) -> Option<String> {
        match key {
            OPT_CONCURRENT_DOWNLOADS => Some(self.cloudfetch.concurrency_limit.to_string()),
            OPT_SPEED_THRESHOLD_MBPS => Some(self.cloudfetch.speed_threshold_mbps.to_string()),
            OPT_CONNECT_TIMEOUT_MS => Some(self.http.connect_timeout.as_millis().to_string()),
            OPT_READ_TIMEOUT_MS => Some(self.http.read_timeout.as_millis().to_string()),
            OPT_MAX_RETRIES => Some(self.http.max_retries.to_string()),
            OPT_RETRY_DELAY_MS => Some(self.http.retry_delay.as_millis().to_string()),
            OPT_LOG_LEVEL => self.log.level.clone(),
            OPT_LOG_FILE => self.log.file.clone(),
            _ => None,
        }
    }
}

/// Parse an integer option value.
fn parse_int_option(key: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::invalid_option(key, value))
}

/// Parse a float option value.
fn parse_float_option(key: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::invalid_option(key, value))
}

fn parse_millis_option(key: &str, value: &str) -> Result<Duration> {
    let v = parse_int_option(key, value)?;
    u64::try_from(v)
        .map(Duration::from_millis)
        .map_err(|_| Error::invalid_option(key, value))
}
