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

//! Pipeline types for the CloudFetch download pipeline.
//!
//! This module defines the types that flow through the pipeline:
//! - `DownloadTask` - Sent through the download channel, owned by download workers
//! - `DownloadHandle` - Kept in the in-flight ledger, awaited by the handler
//! - `PendingQueue` - Links received from the source but not yet scheduled
//! - `InFlightLedger` - Started downloads in the order they were started
//!
//! ```text
//! [Source] --> PendingQueue --> [Handler] --> download_channel --> [Download Workers]
//!                                   |                                     |
//!                             InFlightLedger                              |
//!                                   |                                     v
//!                            DownloadHandle  <------ oneshot ------ DownloadTask
//! ```

use crate::error::{Error, Result};
use crate::types::cloudfetch::{ArrowBatch, ResultLink};
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// A download task sent to download workers via the download channel.
///
/// The worker consumes `result_tx` when it sends the download result.
#[derive(Debug)]
pub struct DownloadTask {
    /// Position of this link in scheduling order (used for logging).
    pub chunk_index: i64,
    /// Link containing URL, headers, and metadata for the download.
    pub link: ResultLink,
    /// Oneshot sender for the download result.
    pub result_tx: oneshot::Sender<Result<ArrowBatch>>,
}

impl DownloadTask {
    /// Resolve the task without downloading.
    pub fn fail(self, error: Error) {
        // Receiver may already be gone
        let _ = self.result_tx.send(Err(error));
    }
}

/// A handle for awaiting one download result.
#[derive(Debug)]
pub struct DownloadHandle {
    /// Position of this link in scheduling order (used for logging).
    pub chunk_index: i64,
    /// Oneshot receiver for the download result.
    pub result_rx: oneshot::Receiver<Result<ArrowBatch>>,
}

impl DownloadHandle {
    /// Wait for the download to finish.
    ///
    /// A task dropped without sending a result yields `Error::Cancelled`.
    pub async fn wait(self) -> Result<ArrowBatch> {
        let chunk_index = self.chunk_index;
        self.result_rx.await.map_err(|_| {
            Error::cancelled(format!("download task for chunk {} was dropped", chunk_index))
        })?
    }
}

/// Creates a connected (DownloadTask, DownloadHandle) pair.
pub fn create_download_pair(chunk_index: i64, link: ResultLink) -> (DownloadTask, DownloadHandle) {
    let (result_tx, result_rx) = oneshot::channel();

    let task = DownloadTask {
        chunk_index,
        link,
        result_tx,
    };

    let handle = DownloadHandle {
        chunk_index,
        result_rx,
    };

    (task, handle)
}

/// Links waiting to be scheduled, in the order the source produced them.
#[derive(Debug, Default)]
pub struct PendingQueue {
    links: VecDeque<ResultLink>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, links: impl IntoIterator<Item = ResultLink>) {
        self.links.extend(links);
    }

    /// Remove up to `count` links from the head.
    pub fn take(&mut self, count: usize) -> impl Iterator<Item = ResultLink> + '_ {
        let count = count.min(self.links.len());
        self.links.drain(..count)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }
}

/// Started downloads, ordered by start time, bounded by `capacity`.
#[derive(Debug)]
pub struct InFlightLedger {
    handles: VecDeque<DownloadHandle>,
    capacity: usize,
}

impl InFlightLedger {
    /// Create an empty ledger; storage grows with the handles pushed.
    pub fn new(capacity: usize) -> Self {
        Self {
            handles: VecDeque::new(),
            capacity,
        }
    }

    /// Number of downloads that may still be started.
    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.handles.len())
    }

    /// Append a handle at the tail.
    ///
    /// Callers must check [`free_slots`](Self::free_slots) first.
    pub fn push(&mut self, handle: DownloadHandle) {
        debug_assert!(
            self.handles.len() < self.capacity,
            "in-flight ledger over capacity"
        );
        self.handles.push_back(handle);
    }

    /// Remove the oldest handle.
    pub fn pop(&mut self) -> Option<DownloadHandle> {
        self.handles.pop_front()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }
}
