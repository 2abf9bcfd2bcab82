//! End-to-end tests of the image endpoint
//!
//! The real router and pipeline run against an in-memory object store and a
//! temporary local cache tier. Originals are generated in memory.

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::TestServer;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use std::future::IntoFuture;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio_util::task::TaskTracker;

use image_resizer::{
    config::Config,
    errors::TransformResult,
    imaging::{Dimensions, ImageTransformer, RustTransformer, TransformParams},
    observability::AppObservability,
    orchestrator::Orchestrator,
    storage::{MemoryObjectStore, ObjectStorage},
    web::{AppState, create_router},
};

/// Counts transforms and optionally slows them down
struct CountingTransformer {
    inner: RustTransformer,
    transforms: Arc<AtomicUsize>,
    delay: Duration,
}

impl ImageTransformer for CountingTransformer {
    fn dimensions(&self, path: &Path) -> TransformResult<Dimensions> {
        self.inner.dimensions(path)
    }

    fn transform(&self, params: &TransformParams) -> TransformResult<()> {
        self.transforms.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.transform(params)
    }
}

struct Harness {
    server: TestServer,
    storage: Arc<MemoryObjectStore>,
    tracker: TaskTracker,
    transforms: Arc<AtomicUsize>,
    cache_root: PathBuf,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self::with(Duration::ZERO, |_| {}).await
    }

    async fn with(delay: Duration, configure: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().unwrap();
        let cache_root = dir.path().join("cache");
        let not_found_file = dir.path().join("static").join("no_image.png");
        std::fs::create_dir_all(not_found_file.parent().unwrap()).unwrap();
        std::fs::write(&not_found_file, png(300, 300)).unwrap();

        let mut config = Config::default();
        config.storage.bucket = "media".to_string();
        config.cache.local_root = cache_root.clone();
        config.images.not_found_file = not_found_file;
        configure(&mut config);

        let storage = Arc::new(MemoryObjectStore::new());
        let transforms = Arc::new(AtomicUsize::new(0));
        let tracker = TaskTracker::new();
        let transformer = CountingTransformer {
            inner: RustTransformer::new(),
            transforms: transforms.clone(),
            delay,
        };

        let orchestrator = Orchestrator::from_config(
            &config,
            storage.clone() as Arc<dyn ObjectStorage>,
            Arc::new(transformer),
            tracker.clone(),
            AppObservability::new("image-resizer-test"),
        )
        .await
        .unwrap();

        let server = TestServer::new(create_router(AppState::new(&config, orchestrator))).unwrap();

        Self {
            server,
            storage,
            tracker,
            transforms,
            cache_root,
            _dir: dir,
        }
    }

    /// Wait for background cache population to finish
    async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn transforms(&self) -> usize {
        self.transforms.load(Ordering::SeqCst)
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

fn decoded_size(content: &[u8]) -> (u32, u32) {
    let image = image::load_from_memory(content).unwrap();
    (image.width(), image.height())
}

#[tokio::test]
async fn test_resize_miss_populates_both_tiers() {
    let harness = Harness::new().await;
    harness
        .storage
        .insert("photos/cat.png", png(400, 200), SystemTime::now());

    let response = harness.server.get("/image/custom-w100/photos/cat.png").await;
    response.assert_status_ok();
    assert_eq!(
        response.header(header::CACHE_CONTROL),
        HeaderValue::from_static("max-age=7200, public")
    );
    assert_eq!(
        response.header(header::CONTENT_TYPE),
        HeaderValue::from_static("image/png")
    );
    assert!(response.maybe_header(header::LAST_MODIFIED).is_some());
    assert_eq!(decoded_size(response.as_bytes()), (100, 50));

    harness.settle().await;
    assert!(harness.storage.object("custom-w100/photos/cat.png").is_some());
    assert!(harness.cache_root.join("custom-w100/photos/cat.png").exists());
    assert_eq!(harness.transforms(), 1);
}

#[tokio::test]
async fn test_artifact_has_computed_dimensions() {
    let harness = Harness::new().await;
    harness
        .storage
        .insert("photos/wide.png", png(400, 300), SystemTime::now());

    let cases = [
        ("custom-2x1", (600, 300)),
        ("custom-1x2", (400, 800)),
        ("custom-w200-h50", (200, 50)),
        ("custom-w200-2x1", (200, 100)),
        ("custom-h100-2x1", (200, 100)),
        ("custom-w800", (800, 600)),
        ("custom-h150", (200, 150)),
        ("custom-w100-h100-crop", (100, 100)),
    ];
    for (template, expected) in cases {
        let response = harness
            .server
            .get(&format!("/image/{template}/photos/wide.png"))
            .await;
        response.assert_status_ok();
        assert_eq!(decoded_size(response.as_bytes()), expected, "{template}");
    }
}

#[tokio::test]
async fn test_local_hit_makes_no_storage_calls() {
    let harness = Harness::new().await;
    harness
        .storage
        .insert("photos/cat.png", png(400, 200), SystemTime::now());

    harness
        .server
        .get("/image/custom-w100/photos/cat.png")
        .await
        .assert_status_ok();
    harness.settle().await;

    let calls = harness.storage.calls();
    let response = harness.server.get("/image/custom-w100/photos/cat.png").await;
    response.assert_status_ok();
    assert_eq!(decoded_size(response.as_bytes()), (100, 50));
    assert_eq!(harness.storage.calls(), calls);
    assert_eq!(harness.transforms(), 1);
}

#[tokio::test]
async fn test_remote_hit_is_copied_to_local_tier() {
    let harness = Harness::new().await;
    harness
        .storage
        .insert("custom-w100/photos/cat.png", png(100, 50), SystemTime::now());

    let response = harness.server.get("/image/custom-w100/photos/cat.png").await;
    response.assert_status_ok();
    assert_eq!(decoded_size(response.as_bytes()), (100, 50));
    assert_eq!(harness.transforms(), 0);
    assert!(harness.cache_root.join("custom-w100/photos/cat.png").exists());
}

#[tokio::test]
async fn test_remote_tier_disabled() {
    let harness = Harness::with(Duration::ZERO, |config| {
        config.cache.remote_enabled = false;
    })
    .await;
    harness
        .storage
        .insert("photos/cat.png", png(400, 200), SystemTime::now());

    harness
        .server
        .get("/image/custom-w100/photos/cat.png")
        .await
        .assert_status_ok();
    harness.settle().await;

    assert_eq!(harness.storage.keys(), vec!["photos/cat.png".to_string()]);
    assert!(harness.cache_root.join("custom-w100/photos/cat.png").exists());
}

#[tokio::test]
async fn test_missing_original_serves_placeholder() {
    let harness = Harness::new().await;

    let response = harness
        .server
        .get("/image/custom-w100/missing.png")
        .add_query_param("status", "410")
        .await;
    response.assert_status(StatusCode::GONE);
    assert_eq!(
        response.header(header::CACHE_CONTROL),
        HeaderValue::from_static("max-age=60, public")
    );
    assert_eq!(decoded_size(response.as_bytes()), (100, 100));

    harness.settle().await;
    assert!(harness.storage.object("custom-w100/no_image.png").is_some());
    assert!(harness.cache_root.join("custom-w100/no_image.png").exists());

    // The placeholder artifact is shared by every missing path
    let again = harness.server.get("/image/custom-w100/other/gone.png").await;
    again.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(harness.transforms(), 1);
}

#[tokio::test]
async fn test_placeholder_status_out_of_range_falls_back_to_404() {
    let harness = Harness::new().await;

    let response = harness
        .server
        .get("/image/custom-w100/missing.png")
        .add_query_param("status", "503")
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejects_invalid_requests_before_storage() {
    let harness = Harness::new().await;

    let response = harness.server.get("/image/bogus/photos/cat.png").await;
    response.assert_status_bad_request();
    response.assert_text("not supported template\n");

    let response = harness.server.get("/image/custom-w100/photos/cat.bmp").await;
    response.assert_status_bad_request();
    response.assert_text("not supported file extension\n");
    assert_eq!(
        response.header(header::CACHE_CONTROL),
        HeaderValue::from_static("max-age=60, public")
    );

    assert_eq!(harness.storage.calls().total(), 0);
    assert_eq!(harness.transforms(), 0);
}

#[tokio::test]
async fn test_original_extension_override() {
    let harness = Harness::new().await;
    harness
        .storage
        .insert("photos/cat.png", png(400, 200), SystemTime::now());

    let response = harness
        .server
        .get("/image/custom-w100/photos/cat.jpg")
        .add_query_param("original", "png")
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.header(header::CONTENT_TYPE),
        HeaderValue::from_static("image/jpeg")
    );
    assert_eq!(decoded_size(response.as_bytes()), (100, 50));
}

#[tokio::test]
async fn test_original_template_skips_transform() {
    let harness = Harness::new().await;
    let original = png(40, 20);
    harness
        .storage
        .insert("photos/cat.png", original.clone(), SystemTime::now());

    let response = harness.server.get("/image/original/photos/cat.png").await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), original.as_slice());
    assert_eq!(harness.transforms(), 0);
}

#[tokio::test]
async fn test_vector_original_is_passed_through() {
    let harness = Harness::new().await;
    let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"/>"#.to_vec();
    harness
        .storage
        .insert("icons/logo.svg", svg.clone(), SystemTime::now());

    let response = harness.server.get("/image/custom-w100/icons/logo.svg").await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), svg.as_slice());
    assert_eq!(harness.transforms(), 0);
}

#[tokio::test]
async fn test_conditional_and_range_requests() {
    let harness = Harness::new().await;
    harness
        .storage
        .insert("photos/cat.png", png(400, 200), SystemTime::now());

    let first = harness.server.get("/image/custom-w100/photos/cat.png").await;
    first.assert_status_ok();
    let last_modified = first.header(header::LAST_MODIFIED);
    let length = first.as_bytes().len();

    let not_modified = harness
        .server
        .get("/image/custom-w100/photos/cat.png")
        .add_header(header::IF_MODIFIED_SINCE, last_modified)
        .await;
    not_modified.assert_status(StatusCode::NOT_MODIFIED);

    let partial = harness
        .server
        .get("/image/custom-w100/photos/cat.png")
        .add_header(header::RANGE, HeaderValue::from_static("bytes=0-3"))
        .await;
    partial.assert_status(StatusCode::PARTIAL_CONTENT);
    assert_eq!(partial.as_bytes().as_ref(), b"\x89PNG");
    assert_eq!(
        partial.header(header::CONTENT_RANGE),
        HeaderValue::from_str(&format!("bytes 0-3/{length}")).unwrap()
    );
}

#[tokio::test]
async fn test_concurrent_misses_share_one_transform() {
    let harness = Harness::with(Duration::from_millis(300), |_| {}).await;
    harness
        .storage
        .insert("photos/cat.png", png(400, 200), SystemTime::now());

    let requests = (0..5).map(|_| {
        harness
            .server
            .get("/image/custom-w100/photos/cat.png")
            .into_future()
    });
    for response in futures::future::join_all(requests).await {
        response.assert_status_ok();
        assert_eq!(decoded_size(response.as_bytes()), (100, 50));
    }
    assert_eq!(harness.transforms(), 1);
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new().await;

    let response = harness.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "image-resizer");
}
