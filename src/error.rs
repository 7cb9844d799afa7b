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

//! Error types for the CloudFetch download pipeline.
//!
//! None of these errors are retried or suppressed by the pipeline itself.
//! A failed download surfaces from the `fetch_next` call that awaits it.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while fetching CloudFetch results.
#[derive(Debug, Error)]
pub enum Error {
    /// The link's expiry passed before the download was dispatched.
    /// No network request was made.
    #[error("CloudFetch link has expired (expiry time {expiry_time_ms} ms)")]
    ExpiredLink { expiry_time_ms: i64 },

    /// Cloud storage answered with a non-2xx status.
    #[error("CloudFetch HTTP error {status} {reason}")]
    HttpStatus { status: u16, reason: String },

    /// Network-level failure from the HTTP client.
    #[error("CloudFetch transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Failure reported by the upstream page source.
    #[error("Result source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The download was abandoned before it produced a result.
    #[error("CloudFetch download cancelled: {0}")]
    Cancelled(String),

    /// Configuration failed validation.
    #[error("Invalid CloudFetch configuration: {0}")]
    InvalidConfig(String),

    /// An option key was unknown or its value could not be parsed.
    #[error("Invalid option {key}={value}")]
    InvalidOption { key: String, value: String },
}

impl Error {
    /// Wrap an arbitrary upstream error.
    pub fn from_source<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Source(error.into())
    }

    pub(crate) fn cancelled(message: impl Into<String>) -> Self {
        Error::Cancelled(message.into())
    }

    pub(crate) fn invalid_option(key: &str, value: &str) -> Self {
        Error::InvalidOption {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// HTTP status code, if this error came from a non-2xx response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
