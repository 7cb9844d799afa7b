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

//! CloudFetch result download pipeline for Databricks SQL clients.
//!
//! Large query results are published as a sequence of presigned cloud-storage
//! links. This crate downloads those links with bounded concurrency and hands
//! the raw Arrow bytes back in the order the links were produced.
//!
//! ## Overview
//!
//! - [`ResultsProvider`] - Pull interface shared by every stage
//! - [`CloudFetchResultHandler`] - Turns link pages into downloaded batches
//! - [`ChunkDownloader`] - Downloads one link over HTTP
//! - [`CloudFetchHttpClient`] - reqwest client plus a pluggable [`RetryPolicy`]
//!
//! ## Example
//!
//! ```ignore
//! use databricks_cloudfetch::{ClientOptions, CloudFetchResultHandler, FetchNextOptions, ResultsProvider};
//!
//! let options = ClientOptions::from_pairs([
//!     ("databricks.cloudfetch.concurrent_downloads", "8"),
//!     ("databricks.log_level", "info"),
//! ])?;
//! let mut handler = CloudFetchResultHandler::from_options(&options, Box::new(my_link_source))?;
//!
//! let fetch_options = FetchNextOptions::default();
//! while handler.has_more().await? {
//!     let batch = handler.fetch_next(&fetch_options).await?;
//!     decode(batch.payloads);
//! }
//! ```

pub mod client;
pub mod error;
pub mod logging;
pub mod options;
pub mod reader;
pub mod types;

pub use client::{CloudFetchHttpClient, HttpClientConfig, RetryPolicy};
pub use error::{Error, Result};
pub use logging::{init_logging, LogConfig};
pub use options::ClientOptions;
pub use reader::cloudfetch::{BatchDownloader, ChunkDownloader, CloudFetchResultHandler};
pub use reader::{FetchNextOptions, ResultsProvider};
pub use types::cloudfetch::{ArrowBatch, CloudFetchConfig, ResultLink, RowSetPage};
