//! Request orchestration
//!
//! One call to [`Orchestrator::handle`] drives a request through:
//!
//! 1. template validation
//! 2. filename validation (after the `?original=` extension override)
//! 3. cache resolution of the resized artifact
//! 4. on a miss: fetch the original, transform or copy it, optimize it, and
//!    start populating both cache tiers in the background
//! 5. if the original cannot be fetched: the not-found fallback, which runs
//!    the placeholder image through the same cache and transform pipeline
//!
//! Concurrent misses for one cache key share a single production unless
//! single-flight is disabled.

use crate::cache::{
    ArtifactSource, CacheKey, CachePopulator, CacheResolver, CachedArtifact, LocalTier,
    RemoteTier, SingleFlight,
};
use crate::config::Config;
use crate::errors::{AppError, AppResult, TransformError};
use crate::imaging::{
    Background, ImageTransformer, OptimizerRegistry, TransformParams,
    replace_extension, should_skip_transform, validate_filename,
};
use crate::observability::AppObservability;
use crate::storage::{DownloadedObject, ObjectStorage, object_key};
use crate::template::Template;
use axum::http::StatusCode;
use bytes::Bytes;
use sandboxed_file_store::detect_content_type;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Lowest and highest status a caller may request for a not-found response
const NOT_FOUND_STATUS_RANGE: std::ops::RangeInclusive<u16> = 200..=499;

/// Parsed inbound request
#[derive(Debug, Clone, Default)]
pub struct ImageRequest {
    pub template: String,
    /// Request path with a leading `/`
    pub path: String,
    /// `?original=` extension override for the source lookup
    pub original_extension: Option<String>,
    /// `?status=` override for not-found responses
    pub status: Option<String>,
}

/// Artifact chosen for a response
#[derive(Debug, Clone)]
pub struct ServedImage {
    pub key: CacheKey,
    pub artifact: CachedArtifact,
    pub status: StatusCode,
    /// True when the placeholder stands in for a missing original
    pub placeholder: bool,
}

impl ServedImage {
    pub fn content_type(&self) -> String {
        detect_content_type(self.key.as_str(), &self.artifact.content).mime_type
    }
}

/// Settings the pipeline reads on every request
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub source_prefix: String,
    pub not_found_file: PathBuf,
    pub jpeg_quality: u8,
    pub transform_timeout: Duration,
    pub backfill_on_hit: bool,
    pub single_flight: bool,
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            source_prefix: config.storage.source_prefix.clone(),
            not_found_file: config.images.not_found_file.clone(),
            jpeg_quality: config.images.jpeg_quality,
            transform_timeout: config.images.transform_timeout,
            backfill_on_hit: config.cache.backfill_on_hit,
            single_flight: config.cache.single_flight,
        }
    }
}

type Production = Result<CachedArtifact, Arc<AppError>>;

/// Input of one production
enum Source {
    Object(String),
    File(PathBuf),
}

/// Source bytes on local disk for the transform engine
enum SourceFile {
    Downloaded(DownloadedObject),
    Local(PathBuf),
}

impl SourceFile {
    fn path(&self) -> &Path {
        match self {
            Self::Downloaded(object) => object.path(),
            Self::Local(path) => path,
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    settings: Arc<OrchestratorSettings>,
    storage: Arc<dyn ObjectStorage>,
    resolver: CacheResolver,
    populator: CachePopulator,
    transformer: Arc<dyn ImageTransformer>,
    optimizers: Arc<OptimizerRegistry>,
    flights: SingleFlight<Production>,
    observability: AppObservability,
}

impl Orchestrator {
    /// Wire the pipeline from configuration.
    ///
    /// `storage` holds the originals and, when enabled, the remote cache
    /// tier. Population tasks are spawned on `tracker`.
    pub async fn from_config(
        config: &Config,
        storage: Arc<dyn ObjectStorage>,
        transformer: Arc<dyn ImageTransformer>,
        tracker: TaskTracker,
        observability: AppObservability,
    ) -> AppResult<Self> {
        let local = LocalTier::open(&config.cache.local_root).await?;
        let remote = config
            .cache
            .remote_enabled
            .then(|| RemoteTier::new(storage.clone(), config.cache.remote_prefix.clone()));

        let resolver = CacheResolver::new(local.clone(), remote.clone())
            .with_observability(observability.clone());
        let populator = CachePopulator::new(local, remote, config.cache.max_age, tracker)
            .with_observability(observability.clone());

        info!(
            "Pipeline ready: local cache {}, remote cache {}",
            config.cache.local_root.display(),
            if config.cache.remote_enabled {
                "enabled"
            } else {
                "disabled"
            }
        );

        Ok(Self {
            settings: Arc::new(OrchestratorSettings::from(config)),
            storage,
            resolver,
            populator,
            transformer,
            optimizers: Arc::new(OptimizerRegistry::from_config(&config.images)),
            flights: SingleFlight::new(),
            observability,
        })
    }

    pub fn populator(&self) -> &CachePopulator {
        &self.populator
    }

    pub async fn handle(&self, request: &ImageRequest) -> AppResult<ServedImage> {
        let template = Template::parse(&request.template)?;

        let original_path = match request.original_extension.as_deref() {
            Some(extension) if !extension.is_empty() => replace_extension(&request.path, extension),
            _ => request.path.clone(),
        };
        validate_request_path(&request.path)?;
        validate_filename(&original_path)?;
        validate_filename(&request.path)?;
        let template = template.with_extensions(&original_path, &request.path);

        let key = CacheKey::new(template.id(), &request.path);
        if let Some(artifact) = self.lookup(&key).await {
            return Ok(ServedImage {
                key,
                artifact,
                status: StatusCode::OK,
                placeholder: false,
            });
        }

        let source_key = object_key(&self.settings.source_prefix, &original_path);
        match self
            .produce_once(&key, &template, Source::Object(source_key))
            .await
        {
            Ok(artifact) => Ok(ServedImage {
                key,
                artifact,
                status: StatusCode::OK,
                placeholder: false,
            }),
            Err(e) if e.is_not_found() => {
                warn!("Original {} unavailable: {}", original_path, e);
                self.not_found(&template, request.status.as_deref()).await
            }
            Err(e) => Err(unshare(e)),
        }
    }

    /// Serve the placeholder, resized for `template`, with the not-found status
    async fn not_found(&self, template: &Template, status: Option<&str>) -> AppResult<ServedImage> {
        self.observability.record_not_found(template.id());
        let status = not_found_status(status);

        let placeholder = &self.settings.not_found_file;
        let basename = placeholder
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AppError::configuration(format!(
                    "not-found file {} has no usable file name",
                    placeholder.display()
                ))
            })?;

        let template = template.clone().with_extensions(basename, basename);
        let key = CacheKey::new(template.id(), basename);
        let artifact = match self.lookup(&key).await {
            Some(artifact) => artifact,
            None => self
                .produce_once(&key, &template, Source::File(placeholder.clone()))
                .await
                .map_err(unshare)?,
        };

        info!("Serving placeholder {} with status {}", key, status.as_u16());
        Ok(ServedImage {
            key,
            artifact,
            status,
            placeholder: true,
        })
    }

    async fn lookup(&self, key: &CacheKey) -> Option<CachedArtifact> {
        let artifact = self.resolver.resolve(key).await?;
        debug!("Cache hit {} ({})", key, artifact.source.as_str());
        if self.settings.backfill_on_hit {
            drop(self.populator.populate(key.clone(), artifact.content.clone()));
        }
        Some(artifact)
    }

    async fn produce_once(&self, key: &CacheKey, template: &Template, source: Source) -> Production {
        let this = self.clone();
        let owned_key = key.clone();
        let template = template.clone();
        let produce = move || async move {
            this.produce(owned_key, template, source)
                .await
                .map_err(Arc::new)
        };

        if self.settings.single_flight {
            self.flights.run(key.as_str(), produce).await
        } else {
            produce().await
        }
    }

    /// Fetch, transform or copy, optimize, then start population
    async fn produce(&self, key: CacheKey, template: Template, source: Source) -> AppResult<CachedArtifact> {
        let source = match source {
            Source::Object(object_key) => {
                debug!("Get original image {}", object_key);
                let object = self
                    .storage
                    .download_with_mod_time(&object_key, None)
                    .await
                    .map_err(|e| AppError::not_found(format!("{object_key}: {e}")))?;
                SourceFile::Downloaded(object)
            }
            Source::File(path) => SourceFile::Local(path),
        };

        let started = Instant::now();
        let result = self.transform(&key, &template, &source).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        self.observability.record_transform(outcome, started.elapsed());
        let content = result?;

        drop(self.populator.populate(key, content.clone()));

        Ok(CachedArtifact {
            content,
            last_modified: SystemTime::now(),
            source: ArtifactSource::Produced,
        })
    }

    async fn transform(&self, key: &CacheKey, template: &Template, source: &SourceFile) -> AppResult<Bytes> {
        let output_extension = template.output_extension.clone().unwrap_or_default();
        let workdir = tempfile::Builder::new()
            .prefix("_resize_")
            .tempdir()
            .map_err(TransformError::from)?;
        let output = workdir.path().join(format!("artifact.{output_extension}"));

        if should_skip_transform(template) {
            debug!("Return original for {}", key);
            tokio::fs::copy(source.path(), &output)
                .await
                .map_err(TransformError::from)?;
        } else {
            let transformer = self.transformer.clone();
            let template = template.clone();
            let params = TransformParams {
                source: source.path().to_path_buf(),
                output: output.clone(),
                width: 0,
                height: 0,
                crop: template.crop,
                upscale: template.upscale,
                background: Background::for_extension(&output_extension),
                jpeg_quality: self.settings.jpeg_quality,
            };

            let timeout = self.settings.transform_timeout;
            let task = tokio::task::spawn_blocking(move || -> AppResult<()> {
                let dims = transformer.dimensions(&params.source)?;
                let (width, height) = template.dimensions(dims.width, dims.height);
                debug!(
                    "Resize {}x{} -> {}x{} (crop: {}, upscale: {})",
                    dims.width, dims.height, width, height, params.crop, params.upscale
                );
                transformer.transform(&TransformParams {
                    width,
                    height,
                    ..params
                })?;
                Ok(())
            });

            match tokio::time::timeout(timeout, task).await {
                Ok(joined) => joined.map_err(TransformError::from)??,
                Err(_) => {
                    return Err(TransformError::Timeout {
                        operation: format!("transform of {key}"),
                        timeout,
                    }
                    .into());
                }
            }
        }

        self.optimizers.optimize(&output).await?;

        let content = tokio::fs::read(&output).await.map_err(TransformError::from)?;
        Ok(Bytes::from(content))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("optimizers", &self.optimizers)
            .finish_non_exhaustive()
    }
}

/// Status for a not-found response: the override when it parses into
/// `200..=499`, otherwise 404.
pub fn not_found_status(raw: Option<&str>) -> StatusCode {
    raw.and_then(|value| value.trim().parse::<u16>().ok())
        .filter(|code| NOT_FOUND_STATUS_RANGE.contains(code))
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::NOT_FOUND)
}

fn validate_request_path(path: &str) -> AppResult<()> {
    if path.contains('\0') || path.split('/').any(|segment| segment == "..") {
        return Err(AppError::validation("invalid file path"));
    }
    Ok(())
}

/// Recover an owned error from a shared production failure
fn unshare(error: Arc<AppError>) -> AppError {
    Arc::try_unwrap(error).unwrap_or_else(|shared| match shared.as_ref() {
        AppError::Validation { message } => AppError::validation(message.clone()),
        AppError::NotFound { resource } => AppError::not_found(resource.clone()),
        AppError::Configuration { message } => AppError::configuration(message.clone()),
        other => AppError::internal(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, 404)]
    #[case(Some("410"), 410)]
    #[case(Some("200"), 200)]
    #[case(Some("499"), 499)]
    #[case(Some("500"), 404)]
    #[case(Some("199"), 404)]
    #[case(Some("abc"), 404)]
    #[case(Some(""), 404)]
    #[case(Some("-1"), 404)]
    fn test_not_found_status_is_clamped(#[case] raw: Option<&str>, #[case] expected: u16) {
        assert_eq!(not_found_status(raw).as_u16(), expected);
    }

    #[test]
    fn test_request_path_validation() {
        assert!(validate_request_path("/photos/cat.jpg").is_ok());
        assert!(validate_request_path("/photos/../etc/passwd.jpg").is_err());
        assert!(validate_request_path("/photos/cat\0.jpg").is_err());
    }

    #[test]
    fn test_unshare_keeps_category() {
        let shared = Arc::new(AppError::not_found("a"));
        let _other = shared.clone();
        assert!(unshare(shared).is_not_found());

        let shared = Arc::new(AppError::from(TransformError::Decode("bad".into())));
        let _other = shared.clone();
        assert_eq!(
            unshare(shared).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
