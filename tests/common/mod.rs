//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a temporary
//! upload directory and a full [`AppContext`] with a deterministic
//! classifier and fast analysis. [`TestHarness::serve`] starts Axum on a
//! random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vidsentry::pipeline::{
    AnalysisReport, AnalysisStage, Classifier, ProgressReporter, TimedAnalysis,
};
use vidsentry::server::{create_router, AppContext};
use vidsentry_core::config::Config;
use vidsentry_core::events::{MediaEvent, Subscription};
use vidsentry_core::{Error, MediaItemId, MediaStatus, OwnerId, Result, Verdict};
use vidsentry_db::models::MediaItem;
use vidsentry_db::pool::{init_memory_pool, DbPool};
use vidsentry_db::queries::media_items::{self, NewMediaItem};

pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";
pub const OWNER_HEADER: &str = "x-owner-id";

// ---------------------------------------------------------------------------
// Stub pipeline stages
// ---------------------------------------------------------------------------

/// Always returns the same verdict and counts invocations.
pub struct FixedClassifier {
    verdict: Verdict,
    pub calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn safe() -> Arc<Self> {
        Arc::new(Self {
            verdict: Verdict::safe(0.95),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn flagged() -> Arc<Self> {
        Arc::new(Self {
            verdict: Verdict::flagged(0.85),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn classify(&self, _item: &MediaItem) -> Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict)
    }
}

/// Always errors.
pub struct FailingClassifier;

#[async_trait]
impl Classifier for FailingClassifier {
    fn name(&self) -> &str {
        "failing"
    }

    async fn classify(&self, _item: &MediaItem) -> Result<Verdict> {
        Err(Error::classifier("failing", "model unavailable"))
    }
}

/// Panics instead of returning a verdict.
pub struct PanickingClassifier;

#[async_trait]
impl Classifier for PanickingClassifier {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn classify(&self, _item: &MediaItem) -> Result<Verdict> {
        panic!("classifier blew up");
    }
}

/// Deletes the record it is asked to classify, then answers safe.
///
/// Reproduces a delete landing before the run is cancelled.
#[derive(Default)]
pub struct DeletingClassifier {
    pub db: OnceLock<DbPool>,
}

#[async_trait]
impl Classifier for DeletingClassifier {
    fn name(&self) -> &str {
        "deleting"
    }

    async fn classify(&self, item: &MediaItem) -> Result<Verdict> {
        let db = self.db.get().expect("pool not attached");
        let conn = vidsentry_db::pool::get_conn(db)?;
        media_items::delete_owned_media_item(&conn, item.id, &item.owner_id)?;
        Ok(Verdict::safe(0.9))
    }
}

/// Analysis that never finishes on its own; only cancellation ends it.
pub struct StalledAnalysis;

#[async_trait]
impl AnalysisStage for StalledAnalysis {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn analyze(
        &self,
        _item: &MediaItem,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport> {
        progress.report(10)?;
        cancel.cancelled().await;
        Ok(AnalysisReport::default())
    }
}

/// Timed analysis ticking fast enough for tests.
pub fn fast_analysis() -> Arc<TimedAnalysis> {
    Arc::new(TimedAnalysis::new(Duration::from_millis(2), 25))
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory database and a temporary upload directory.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub storage: tempfile::TempDir,
}

impl TestHarness {
    /// Default config, a classifier that always says safe, fast analysis.
    pub fn new() -> Self {
        Self::with_parts(Config::default(), FixedClassifier::safe(), fast_analysis())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_parts(config, FixedClassifier::safe(), fast_analysis())
    }

    pub fn with_classifier(classifier: Arc<dyn Classifier>) -> Self {
        Self::with_parts(Config::default(), classifier, fast_analysis())
    }

    pub fn with_analysis(analysis: Arc<dyn AnalysisStage>) -> Self {
        Self::with_parts(Config::default(), FixedClassifier::safe(), analysis)
    }

    pub fn with_parts(
        mut config: Config,
        classifier: Arc<dyn Classifier>,
        analysis: Arc<dyn AnalysisStage>,
    ) -> Self {
        let storage = tempfile::tempdir().expect("failed to create storage dir");
        config.upload.storage_dir = storage.path().to_path_buf();

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let ctx = AppContext::build(config, db.clone(), classifier, analysis)
            .expect("failed to build app context");

        Self { ctx, db, storage }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = create_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }

    /// Start a default harness on a random port.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().serve().await
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> vidsentry_db::pool::PooledConnection {
        vidsentry_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    pub fn get(&self, id: MediaItemId) -> Option<MediaItem> {
        media_items::get_media_item(&self.conn(), id).expect("query failed")
    }

    /// Write `data` into the upload directory and create a queued record for
    /// it without scheduling a run.
    pub fn insert_item(&self, owner: &str, data: &[u8], mime_type: &str) -> MediaItem {
        let file_name = format!("{}.bin", MediaItemId::new());
        let path = self.storage.path().join(&file_name);
        std::fs::write(&path, data).expect("failed to write fixture");

        let owner = OwnerId::parse(owner).expect("valid owner");
        media_items::create_media_item(
            &self.conn(),
            &NewMediaItem {
                owner_id: &owner,
                original_name: "fixture.mp4",
                file_name: &file_name,
                file_path: &path.to_string_lossy(),
                mime_type,
                size_bytes: data.len() as u64,
            },
        )
        .expect("failed to create item")
    }

    /// Insert an item and move it straight to the terminal state of `verdict`.
    pub fn insert_classified(&self, owner: &str, data: &[u8], verdict: Verdict) -> MediaItem {
        let item = self.insert_item(owner, data, "video/mp4");
        let conn = self.conn();
        media_items::start_processing(&conn, item.id)
            .expect("start failed")
            .expect("item not queued");
        assert!(media_items::complete_media_item(&conn, item.id, &verdict, None).unwrap());
        media_items::get_media_item(&conn, item.id)
            .unwrap()
            .expect("item vanished")
    }

    /// Poll the store until `id` reaches a terminal state.
    pub async fn wait_for_terminal(&self, id: MediaItemId) -> MediaItem {
        self.wait_for(id, |item| item.status.is_terminal()).await
    }

    /// Poll the store until `id` reaches `status`.
    pub async fn wait_for_status(&self, id: MediaItemId, status: MediaStatus) -> MediaItem {
        self.wait_for(id, |item| item.status == status).await
    }

    async fn wait_for(&self, id: MediaItemId, done: impl Fn(&MediaItem) -> bool) -> MediaItem {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(item) = self.get(id) {
                if done(&item) {
                    return item;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for item {id}: {:?}",
                self.get(id).map(|i| i.status)
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until the pipeline has no run registered for `id`.
    pub async fn wait_until_idle(&self, id: MediaItemId) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.ctx.pipeline.is_active(id) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "run for {id} never finished"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Collect events for `id` until its terminal event arrives.
pub async fn collect_until_terminal(sub: &mut Subscription, id: MediaItemId) -> Vec<MediaEvent> {
    let mut events = Vec::new();
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = sub.next().await {
            if event.item_id != id {
                continue;
            }
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for terminal event: {events:?}");
    events
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Sample media payload of `len` bytes with a recognizable pattern.
pub fn sample_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Multipart upload of `data` as `file_name` with `mime_type`.
pub async fn upload(
    addr: SocketAddr,
    owner: Option<&str>,
    file_name: &str,
    mime_type: &str,
    data: Vec<u8>,
) -> reqwest::Response {
    let part = reqwest::multipart::Part::bytes(data)
        .file_name(file_name.to_string())
        .mime_str(mime_type)
        .expect("valid mime");
    let form = reqwest::multipart::Form::new().part("file", part);

    let mut request = reqwest::Client::new()
        .post(format!("http://{addr}/api/media"))
        .multipart(form);
    if let Some(owner) = owner {
        request = request.header(OWNER_HEADER, owner);
    }
    request.send().await.expect("upload request failed")
}

/// Upload and return the created item's id.
pub async fn upload_ok(addr: SocketAddr, owner: &str, data: Vec<u8>) -> MediaItemId {
    let resp = upload(addr, Some(owner), "clip.mp4", "video/mp4", data).await;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().parse().unwrap()
}
