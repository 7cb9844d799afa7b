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

//! CloudFetch implementation for downloading result data from cloud storage.
//!
//! This module provides:
//! - `CloudFetchResultHandler`: Schedules downloads and returns batches in order
//! - `BatchDownloader`: Trait for downloading a single link
//! - `ChunkDownloader`: Downloads raw chunk bytes from presigned URLs
//! - Download workers and the task/handle types connecting them to the handler

pub mod chunk_downloader;
pub mod download_workers;
pub mod pipeline_types;
pub mod result_handler;

pub use chunk_downloader::{download_speed_mbps, BatchDownloader, ChunkDownloader};
pub use download_workers::{shared_receiver, spawn_download_worker, SharedDownloadReceiver};
pub use pipeline_types::{
    create_download_pair, DownloadHandle, DownloadTask, InFlightLedger, PendingQueue,
};
pub use result_handler::{CloudFetchResultHandler, LinkSource};
