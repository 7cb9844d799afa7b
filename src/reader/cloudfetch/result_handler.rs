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

//! Download scheduler for CloudFetch results.
//!
//! [`CloudFetchResultHandler`] turns an upstream source of link pages into a
//! stream of downloaded batches. Each `fetch_next` call:
//!
//! 1. Pulls one page from the source (if it has more) into the pending queue
//! 2. Starts downloads for as many pending links as free capacity allows
//! 3. Waits for the *oldest* started download and returns its batch
//!
//! ## Ordering Invariant
//!
//! Batches are returned in the order their downloads were started. A slow
//! early download holds back later ones that already finished.
//!
//! ## Failure
//!
//! A failed download is returned from the `fetch_next` call that awaits it.
//! Downloads started after it stay in the ledger and keep running; call
//! [`CloudFetchResultHandler::cancel`] (or drop the handler) to abort them.

use crate::client::CloudFetchHttpClient;
use crate::error::{Error, Result};
use crate::logging::init_logging;
use crate::options::ClientOptions;
use crate::reader::cloudfetch::chunk_downloader::{BatchDownloader, ChunkDownloader};
use crate::reader::cloudfetch::download_workers::{
    shared_receiver, spawn_download_worker, SharedDownloadReceiver,
};
use crate::reader::cloudfetch::pipeline_types::{
    create_download_pair, DownloadTask, InFlightLedger, PendingQueue,
};
use crate::reader::{FetchNextOptions, ResultsProvider};
use crate::types::cloudfetch::{ArrowBatch, CloudFetchConfig, ResultLink, RowSetPage};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Upstream source of link pages.
pub type LinkSource = Box<dyn ResultsProvider<Option<RowSetPage>>>;

/// Downloads CloudFetch links with bounded concurrency, in submission order.
pub struct CloudFetchResultHandler {
    source: LinkSource,
    downloader: Arc<dyn BatchDownloader>,
    config: CloudFetchConfig,

    pending_links: PendingQueue,
    download_tasks: InFlightLedger,
    next_chunk_index: i64,

    // Worker pool, grown by one worker per dispatch up to concurrency_limit
    download_tx: Option<mpsc::UnboundedSender<DownloadTask>>,
    download_rx: Option<SharedDownloadReceiver>,
    workers: Vec<JoinHandle<()>>,

    cancel_token: CancellationToken,
}

impl std::fmt::Debug for CloudFetchResultHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFetchResultHandler")
            .field("config", &self.config)
            .field("pending_links", &self.pending_links.len())
            .field("in_flight", &self.download_tasks.len())
            .field("next_chunk_index", &self.next_chunk_index)
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl CloudFetchResultHandler {
    /// Create a handler.
    ///
    /// # Arguments
    /// * `config` - CloudFetch configuration (validated here)
    /// * `source` - Upstream source of link pages
    /// * `downloader` - Downloads a single link
    pub fn new(
        config: CloudFetchConfig,
        source: LinkSource,
        downloader: Arc<dyn BatchDownloader>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            source,
            downloader,
            pending_links: PendingQueue::new(),
            download_tasks: InFlightLedger::new(config.concurrency_limit),
            config,
            next_chunk_index: 0,
            download_tx: None,
            download_rx: None,
            workers: Vec::new(),
            cancel_token: CancellationToken::new(),
        })
    }

    /// Create a handler that downloads over HTTP with `http_client`.
    pub fn with_http_client(
        config: CloudFetchConfig,
        source: LinkSource,
        http_client: Arc<CloudFetchHttpClient>,
    ) -> Result<Self> {
        let downloader = Arc::new(ChunkDownloader::new(
            http_client,
            config.speed_threshold_mbps,
        ));
        Self::new(config, source, downloader)
    }

    /// Create a handler from client options.
    ///
    /// Initializes logging, then builds the HTTP client and retry policy
    /// from the options.
    pub fn from_options(options: &ClientOptions, source: LinkSource) -> Result<Self> {
        init_logging(&options.log);
        let http_client = Arc::new(CloudFetchHttpClient::new(&options.http)?);
        Self::with_http_client(options.cloudfetch.clone(), source, http_client)
    }

    pub fn config(&self) -> &CloudFetchConfig {
        &self.config
    }

    /// Links received from the source but not yet started.
    pub fn pending_len(&self) -> usize {
        self.pending_links.len()
    }

    /// Started downloads whose batch has not been returned yet.
    pub fn in_flight_len(&self) -> usize {
        self.download_tasks.len()
    }

    /// Abort all in-flight downloads and discard pending links.
    ///
    /// Later `fetch_next` calls still pull from the source.
    pub fn cancel(&mut self) {
        debug!(
            "Cancelling CloudFetch handler: {} pending, {} in flight",
            self.pending_links.len(),
            self.download_tasks.len()
        );
        self.cancel_token.cancel();
        self.pending_links.clear();
        self.download_tasks.clear();
        self.download_tx = None;
        self.download_rx = None;
        self.workers.clear();
        self.cancel_token = CancellationToken::new();
    }

    /// Start downloads for pending links until the ledger is full.
    fn schedule_downloads(&mut self) {
        let free_slots = self.download_tasks.free_slots();
        if free_slots == 0 {
            return;
        }

        let links: Vec<ResultLink> = self.pending_links.take(free_slots).collect();
        for link in links {
            self.start_download(link);
        }

        trace!(
            "Scheduled downloads: {} in flight, {} pending",
            self.download_tasks.len(),
            self.pending_links.len()
        );
    }

    fn start_download(&mut self, link: ResultLink) {
        let chunk_index = self.next_chunk_index;
        self.next_chunk_index += 1;

        let expired = link.is_expired();
        let (task, handle) = create_download_pair(chunk_index, link);
        self.download_tasks.push(handle);

        if expired {
            warn!(
                "Chunk {} link expired before download (expiry {} ms)",
                chunk_index, task.link.expiry_time_ms
            );
            let expiry_time_ms = task.link.expiry_time_ms;
            task.fail(Error::ExpiredLink { expiry_time_ms });
            return;
        }

        let download_tx = self.ensure_workers();
        if let Err(mpsc::error::SendError(task)) = download_tx.send(task) {
            task.fail(Error::cancelled("download workers are not running"));
        }
    }

    /// Create the download channel on first use and add one worker per
    /// dispatch until `concurrency_limit` workers are running.
    fn ensure_workers(&mut self) -> mpsc::UnboundedSender<DownloadTask> {
        let (download_tx, download_rx) = match (&self.download_tx, &self.download_rx) {
            (Some(tx), Some(rx)) => (tx.clone(), Arc::clone(rx)),
            _ => {
                let (tx, rx) = mpsc::unbounded_channel();
                let rx = shared_receiver(rx);
                self.download_tx = Some(tx.clone());
                self.download_rx = Some(Arc::clone(&rx));
                (tx, rx)
            }
        };

        if self.workers.len() < self.config.concurrency_limit {
            let worker = spawn_download_worker(
                self.workers.len(),
                &download_rx,
                &self.downloader,
                &self.cancel_token,
            );
            self.workers.push(worker);
        }

        download_tx
    }
}

#[async_trait]
impl ResultsProvider<ArrowBatch> for CloudFetchResultHandler {
    async fn has_more(&self) -> Result<bool> {
        if !self.pending_links.is_empty() || !self.download_tasks.is_empty() {
            return Ok(true);
        }
        self.source.has_more().await
    }

    async fn fetch_next(&mut self, options: &FetchNextOptions) -> Result<ArrowBatch> {
        if self.source.has_more().await? {
            if let Some(page) = self.source.fetch_next(options).await? {
                let links = page.result_links.unwrap_or_default();
                trace!("Received {} links from source", links.len());
                self.pending_links.extend(links);
            }
        }

        self.schedule_downloads();

        let Some(handle) = self.download_tasks.pop() else {
            return Ok(ArrowBatch::empty());
        };

        trace!("Waiting for chunk {}", handle.chunk_index);
        handle.wait().await
    }
}

impl Drop for CloudFetchResultHandler {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    fn future_expiry_ms() -> i64 {
        (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp_millis()
    }

    fn create_test_link(name: &str) -> ResultLink {
        ResultLink::new(
            format!("https://storage.example.com/{}?sig=secret", name),
            future_expiry_ms(),
            100,
        )
    }

    fn payload_name(batch: &ArrowBatch) -> String {
        String::from_utf8(batch.payloads[0].to_vec()).unwrap()
    }

    /// Source yielding predefined pages
    struct MockSource {
        pages: VecDeque<Option<RowSetPage>>,
        fetch_count: Arc<AtomicUsize>,
    }

    impl MockSource {
        fn new(pages: Vec<Vec<ResultLink>>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|links| Some(RowSetPage::with_links(links)))
                    .collect(),
                fetch_count: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn with_raw_pages(pages: Vec<Option<RowSetPage>>) -> Self {
            Self {
                pages: pages.into(),
                fetch_count: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ResultsProvider<Option<RowSetPage>> for MockSource {
        async fn has_more(&self) -> Result<bool> {
            Ok(!self.pages.is_empty())
        }

        async fn fetch_next(&mut self, _options: &FetchNextOptions) -> Result<Option<RowSetPage>> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.pages.pop_front().flatten())
        }
    }

    /// Source whose page fetch fails
    struct FailingSource;

    #[async_trait]
    impl ResultsProvider<Option<RowSetPage>> for FailingSource {
        async fn has_more(&self) -> Result<bool> {
            Ok(true)
        }

        async fn fetch_next(&mut self, _options: &FetchNextOptions) -> Result<Option<RowSetPage>> {
            Err(Error::from_source("statement was closed"))
        }
    }

    /// Downloader with per-link delays and failures; tracks concurrency
    #[derive(Debug, Default)]
    struct MockDownloader {
        delays: HashMap<String, Duration>,
        failures: HashSet<String>,
        downloads: Mutex<Vec<String>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl MockDownloader {
        fn with_delay(mut self, name: &str, delay: Duration) -> Self {
            self.delays.insert(name.to_string(), delay);
            self
        }

        fn with_failure(mut self, name: &str) -> Self {
            self.failures.insert(name.to_string());
            self
        }

        fn downloads(&self) -> Vec<String> {
            self.downloads.lock().unwrap().clone()
        }

        fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }
    }

    fn link_name(link: &ResultLink) -> String {
        let path = link.url.split('?').next().unwrap();
        path.rsplit('/').next().unwrap().to_string()
    }

    #[async_trait]
    impl BatchDownloader for MockDownloader {
        async fn download(&self, link: &ResultLink) -> Result<ArrowBatch> {
            let name = link_name(link);
            self.downloads.lock().unwrap().push(name.clone());

            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            if let Some(delay) = self.delays.get(&name) {
                tokio::time::sleep(*delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.failures.contains(&name) {
                return Err(Error::HttpStatus {
                    status: 500,
                    reason: "Internal Server Error".to_string(),
                });
            }
            Ok(ArrowBatch::new(vec![Bytes::from(name)], link.row_count))
        }
    }

    fn create_handler(
        concurrency_limit: usize,
        source: MockSource,
        downloader: Arc<MockDownloader>,
    ) -> CloudFetchResultHandler {
        let config = CloudFetchConfig {
            concurrency_limit,
            ..Default::default()
        };
        CloudFetchResultHandler::new(config, Box::new(source), downloader).unwrap()
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = CloudFetchConfig {
            concurrency_limit: 0,
            ..Default::default()
        };
        let result = CloudFetchResultHandler::new(
            config,
            Box::new(MockSource::new(vec![])),
            Arc::new(MockDownloader::default()),
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_three_links_with_two_slots() {
        let source = MockSource::new(vec![vec![
            create_test_link("a"),
            create_test_link("b"),
            create_test_link("c"),
        ]]);
        let downloader = Arc::new(MockDownloader::default());
        let mut handler = create_handler(2, source, downloader.clone());
        let options = FetchNextOptions::default();

        // Call 1: A and B start, A is returned
        let batch = handler.fetch_next(&options).await.unwrap();
        assert_eq!(payload_name(&batch), "a");
        assert_eq!(handler.in_flight_len(), 1);
        assert_eq!(handler.pending_len(), 1);

        // Call 2: C starts in the freed slot, B is returned
        let batch = handler.fetch_next(&options).await.unwrap();
        assert_eq!(payload_name(&batch), "b");
        assert_eq!(handler.in_flight_len(), 1);
        assert_eq!(handler.pending_len(), 0);

        // Call 3: C is returned
        assert!(handler.has_more().await.unwrap());
        let batch = handler.fetch_next(&options).await.unwrap();
        assert_eq!(payload_name(&batch), "c");
        assert_eq!(handler.in_flight_len(), 0);

        // Call 4: end of stream
        assert!(!handler.has_more().await.unwrap());

        let mut downloads = downloader.downloads();
        downloads.sort();
        assert_eq!(downloads, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_batches_delivered_in_start_order() {
        // B finishes long before A
        let source = MockSource::new(vec![vec![
            create_test_link("a"),
            create_test_link("b"),
            create_test_link("c"),
        ]]);
        let downloader = Arc::new(
            MockDownloader::default()
                .with_delay("a", Duration::from_millis(150))
                .with_delay("b", Duration::from_millis(1))
                .with_delay("c", Duration::from_millis(20)),
        );
        let mut handler = create_handler(3, source, downloader);
        let options = FetchNextOptions::default();

        let mut names = Vec::new();
        while handler.has_more().await.unwrap() {
            names.push(payload_name(&handler.fetch_next(&options).await.unwrap()));
        }

        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_limit() {
        let pages: Vec<Vec<ResultLink>> = (0..5)
            .map(|p| {
                (0..4)
                    .map(|i| create_test_link(&format!("p{}l{}", p, i)))
                    .collect()
            })
            .collect();
        let mut downloader = MockDownloader::default();
        for p in 0..5 {
            for i in 0..4 {
                downloader = downloader.with_delay(&format!("p{}l{}", p, i), Duration::from_millis(5));
            }
        }
        let downloader = Arc::new(downloader);
        let mut handler = create_handler(3, MockSource::new(pages), downloader.clone());
        let options = FetchNextOptions::default();

        let mut delivered = 0;
        while handler.has_more().await.unwrap() {
            let batch = handler.fetch_next(&options).await.unwrap();
            if !batch.is_empty() {
                delivered += 1;
            }
            assert!(handler.in_flight_len() <= 3);
        }

        assert_eq!(delivered, 20);
        assert!(downloader.max_active() <= 3);

        // Every link downloaded exactly once
        let downloads = downloader.downloads();
        let unique: HashSet<_> = downloads.iter().collect();
        assert_eq!(downloads.len(), 20);
        assert_eq!(unique.len(), 20);
    }

    #[tokio::test]
    async fn test_page_order_preserved_across_pages() {
        let source = MockSource::new(vec![
            vec![create_test_link("a"), create_test_link("b")],
            vec![],
            vec![create_test_link("c")],
        ]);
        let downloader = Arc::new(MockDownloader::default().with_delay("a", Duration::from_millis(30)));
        let mut handler = create_handler(4, source, downloader);
        let options = FetchNextOptions::default();

        let mut names = Vec::new();
        while handler.has_more().await.unwrap() {
            let batch = handler.fetch_next(&options).await.unwrap();
            if !batch.is_empty() {
                names.push(payload_name(&batch));
            }
        }

        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_source_returns_empty_batch() {
        let source = MockSource::with_raw_pages(vec![None]);
        let fetch_count = source.fetch_count.clone();
        let mut handler = create_handler(2, source, Arc::new(MockDownloader::default()));

        assert!(handler.has_more().await.unwrap());
        let batch = handler.fetch_next(&FetchNextOptions::default()).await.unwrap();
        assert!(batch.is_empty());
        assert!(!handler.has_more().await.unwrap());

        // Exhausted source is not pulled again
        let batch = handler.fetch_next(&FetchNextOptions::default()).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_link_fails_without_download() {
        let expired = ResultLink::new("https://storage.example.com/old?sig=x", 0, 100);
        let source = MockSource::new(vec![vec![expired, create_test_link("fresh")]]);
        let downloader = Arc::new(MockDownloader::default());
        let mut handler = create_handler(2, source, downloader.clone());
        let options = FetchNextOptions::default();

        let err = handler.fetch_next(&options).await.unwrap_err();
        assert!(matches!(err, Error::ExpiredLink { expiry_time_ms: 0 }));

        // Later links are unaffected
        let batch = handler.fetch_next(&options).await.unwrap();
        assert_eq!(payload_name(&batch), "fresh");
        assert_eq!(downloader.downloads(), vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_head_failure_leaves_later_downloads_in_ledger() {
        let source = MockSource::new(vec![vec![
            create_test_link("a"),
            create_test_link("b"),
            create_test_link("c"),
        ]]);
        let downloader = Arc::new(MockDownloader::default().with_failure("a"));
        let mut handler = create_handler(3, source, downloader);
        let options = FetchNextOptions::default();

        let err = handler.fetch_next(&options).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(handler.in_flight_len(), 2);

        assert_eq!(payload_name(&handler.fetch_next(&options).await.unwrap()), "b");
        assert_eq!(payload_name(&handler.fetch_next(&options).await.unwrap()), "c");
        assert!(!handler.has_more().await.unwrap());
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        let config = CloudFetchConfig::default();
        let mut handler = CloudFetchResultHandler::new(
            config,
            Box::new(FailingSource),
            Arc::new(MockDownloader::default()),
        )
        .unwrap();

        let err = handler
            .fetch_next(&FetchNextOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("statement was closed"));
    }

    #[tokio::test]
    async fn test_cancel_clears_queues_and_aborts_downloads() {
        let source = MockSource::new(vec![vec![
            create_test_link("a"),
            create_test_link("b"),
            create_test_link("c"),
        ]]);
        let downloader = Arc::new(
            MockDownloader::default()
                .with_delay("b", Duration::from_secs(30))
                .with_delay("c", Duration::from_secs(30)),
        );
        let mut handler = create_handler(2, source, downloader);
        let options = FetchNextOptions::default();

        assert_eq!(payload_name(&handler.fetch_next(&options).await.unwrap()), "a");
        assert_eq!(handler.in_flight_len(), 1);
        assert_eq!(handler.pending_len(), 1);

        handler.cancel();

        assert_eq!(handler.in_flight_len(), 0);
        assert_eq!(handler.pending_len(), 0);
        assert!(!handler.has_more().await.unwrap());

        let batch = timeout(Duration::from_millis(500), handler.fetch_next(&options))
            .await
            .expect("fetch after cancel should not block")
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_huge_concurrency_limit_spawns_workers_per_download() {
        let config = CloudFetchConfig {
            concurrency_limit: usize::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let source = MockSource::new(vec![vec![
            create_test_link("a"),
            create_test_link("b"),
            create_test_link("c"),
        ]]);
        let mut handler = CloudFetchResultHandler::new(
            config,
            Box::new(source),
            Arc::new(MockDownloader::default()),
        )
        .unwrap();
        let options = FetchNextOptions::default();

        assert_eq!(payload_name(&handler.fetch_next(&options).await.unwrap()), "a");
        assert_eq!(handler.workers.len(), 3);
        assert_eq!(payload_name(&handler.fetch_next(&options).await.unwrap()), "b");
        assert_eq!(payload_name(&handler.fetch_next(&options).await.unwrap()), "c");
        assert!(!handler.has_more().await.unwrap());
    }

    #[tokio::test]
    async fn test_worker_count_capped_by_concurrency_limit() {
        let links = (0..6).map(|i| create_test_link(&format!("l{}", i))).collect();
        let mut handler = create_handler(
            2,
            MockSource::new(vec![links]),
            Arc::new(MockDownloader::default()),
        );
        let options = FetchNextOptions::default();

        while handler.has_more().await.unwrap() {
            handler.fetch_next(&options).await.unwrap();
            assert!(handler.workers.len() <= 2);
        }
        assert_eq!(handler.workers.len(), 2);
    }

    #[test]
    fn test_workers_not_spawned_before_first_download() {
        let handler = create_handler(
            4,
            MockSource::new(vec![]),
            Arc::new(MockDownloader::default()),
        );
        assert!(handler.workers.is_empty());
        assert!(handler.download_tx.is_none());
        assert!(handler.download_rx.is_none());
    }
}
