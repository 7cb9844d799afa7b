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

//! Download workers for the CloudFetch pipeline.
//!
//! Long-lived tokio tasks pull [`DownloadTask`]s from a shared download
//! channel, run them through a [`BatchDownloader`], and send each result back
//! through the task's oneshot channel. The handler starts them one at a time
//! as downloads are dispatched.
//!
//! Workers do not retry. Transport-level retry belongs to the HTTP client's
//! retry policy.

use crate::error::Error;
use crate::reader::cloudfetch::chunk_downloader::BatchDownloader;
use crate::reader::cloudfetch::pipeline_types::DownloadTask;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Download channel receiver shared by every worker of one handler.
pub type SharedDownloadReceiver = Arc<Mutex<mpsc::UnboundedReceiver<DownloadTask>>>;

pub fn shared_receiver(
    download_rx: mpsc::UnboundedReceiver<DownloadTask>,
) -> SharedDownloadReceiver {
    Arc::new(Mutex::new(download_rx))
}

/// Spawns one download worker on the shared download channel.
///
/// The worker loops until the channel closes or `cancel_token` is triggered.
pub fn spawn_download_worker(
    worker_id: usize,
    download_rx: &SharedDownloadReceiver,
    downloader: &Arc<dyn BatchDownloader>,
    cancel_token: &CancellationToken,
) -> JoinHandle<()> {
    debug!("Spawning download worker {}", worker_id);
    tokio::spawn(worker_task(
        worker_id,
        Arc::clone(download_rx),
        Arc::clone(downloader),
        cancel_token.clone(),
    ))
}

async fn worker_task(
    worker_id: usize,
    download_rx: Arc<Mutex<mpsc::UnboundedReceiver<DownloadTask>>>,
    downloader: Arc<dyn BatchDownloader>,
    cancel_token: CancellationToken,
) {
    debug!("Worker {} started", worker_id);

    loop {
        let task = {
            let mut rx = download_rx.lock().await;
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Worker {} cancelled while waiting for task", worker_id);
                    return;
                }
                task = rx.recv() => task
            }
        };

        let Some(task) = task else {
            debug!("Worker {} exiting: download channel closed", worker_id);
            break;
        };

        trace!(
            "Worker {} received task for chunk {}",
            worker_id,
            task.chunk_index
        );

        let result = tokio::select! {
            _ = cancel_token.cancelled() => {
                Err(Error::cancelled(format!("chunk {} download aborted", task.chunk_index)))
            }
            result = downloader.download(&task.link) => result
        };

        if let Err(ref e) = result {
            debug!(
                "Worker {}: chunk {} download failed: {}",
                worker_id, task.chunk_index, e
            );
        }

        // Receiver may have been dropped (handler cancelled)
        if task.result_tx.send(result).is_err() {
            debug!(
                "Worker {}: result receiver dropped for chunk {}",
                worker_id, task.chunk_index
            );
        }
    }

    debug!("Worker {} exiting", worker_id);
}
