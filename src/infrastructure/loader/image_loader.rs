//! Memory, then disk, then network image loading.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use image::DynamicImage;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::failure_registry::FailureRegistry;
use super::options::LoadOptions;
use crate::domain::entities::{
    CacheEntry, CacheKey, ImageSource, LoadEvent, LoadOutcome, LoadedImage,
};
use crate::domain::errors::{CacheError, LoadError};
use crate::domain::ports::{CacheKeyFilter, DefaultHooks, LoaderHooks, NetworkClient};
use crate::infrastructure::cache::TieredCache;
use crate::infrastructure::codec;
use crate::infrastructure::config::{LoaderConfig, WebImageConfig};
use crate::infrastructure::download::{
    DownloadCoordinator, DownloadEvent, DownloadOutcome, DownloadToken, ReqwestNetworkClient,
};

/// Failure to assemble the default loader stack.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The disk cache directory could not be prepared.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The HTTP client could not be built.
    #[error(transparent)]
    Network(#[from] LoadError),
}

/// Cancellation state shared by a handle and its running load.
#[derive(Debug, Default)]
struct LoadOperation {
    cancelled: AtomicBool,
    download: Mutex<Option<DownloadToken>>,
}

impl LoadOperation {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(token) = self.download.lock().take() {
            token.cancel();
        }
    }

    /// Records the download subscription, or cancels it at once if the
    /// handle was cancelled first.
    fn attach(&self, token: DownloadToken) {
        let mut slot = self.download.lock();
        if self.is_cancelled() {
            token.cancel();
        } else {
            *slot = Some(token);
        }
    }

    fn detach(&self) {
        self.download.lock().take();
    }
}

/// A caller's view of one load request.
///
/// Events arrive on the handle in order and end with exactly one
/// [`LoadEvent::Finished`]. Dropping the handle does not cancel the load.
#[derive(Debug)]
pub struct LoadHandle {
    operation: Arc<LoadOperation>,
    events: mpsc::UnboundedReceiver<LoadEvent>,
}

impl LoadHandle {
    /// Cancels the request. Safe to call at any stage, and more than once.
    pub fn cancel(&self) {
        self.operation.cancel();
    }

    /// Returns true once [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.operation.is_cancelled()
    }

    /// Receives the next event. `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<LoadEvent> {
        let event = self.events.recv().await?;
        if event.is_terminal() {
            self.events.close();
        }
        Some(event)
    }

    /// Skips intermediate events and waits for the terminal outcome.
    pub async fn outcome(mut self) -> LoadOutcome {
        while let Some(event) = self.events.recv().await {
            if let LoadEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        LoadOutcome::Cancelled
    }
}

struct LoaderInner {
    cache: Arc<TieredCache>,
    downloader: DownloadCoordinator,
    failed: FailureRegistry,
    hooks: Arc<dyn LoaderHooks>,
    key_filter: Option<Arc<dyn CacheKeyFilter>>,
    config: LoaderConfig,
    running: Mutex<HashMap<u64, Arc<LoadOperation>>>,
    next_id: AtomicU64,
}

impl LoaderInner {
    fn key_for(&self, url: &str) -> CacheKey {
        match &self.key_filter {
            Some(filter) => CacheKey::new(filter.filter(url)),
            None => CacheKey::new(url),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        self: Arc<Self>,
        id: u64,
        url: String,
        key: CacheKey,
        options: LoadOptions,
        cached: Option<LoadedImage>,
        operation: Arc<LoadOperation>,
        events: mpsc::UnboundedSender<LoadEvent>,
    ) {
        let outcome = self
            .resolve(&url, &key, options, cached, &operation, &events)
            .await;
        self.running.lock().remove(&id);
        let _ = events.send(LoadEvent::Finished(outcome));
    }

    async fn resolve(
        &self,
        url: &str,
        key: &CacheKey,
        options: LoadOptions,
        mut cached: Option<LoadedImage>,
        operation: &LoadOperation,
        events: &mpsc::UnboundedSender<LoadEvent>,
    ) -> LoadOutcome {
        if cached.is_none()
            && !options.bypass_cache
            && let Some((entry, source)) = self.cache.lookup(key).await
        {
            let image = LoadedImage {
                url: url.to_string(),
                entry,
                source,
            };
            if !options.refresh_if_stale {
                return LoadOutcome::Success(image);
            }
            let _ = events.send(LoadEvent::Cached(image.clone()));
            cached = Some(image);
        }

        if operation.is_cancelled() {
            return LoadOutcome::Cancelled;
        }

        if !options.retry_failed && self.failed.contains(url) {
            debug!(url = %url, "Skipping blacklisted URL");
            return cached.map_or_else(
                || LoadOutcome::Failure(LoadError::Blacklisted { url: url.to_string() }),
                LoadOutcome::Success,
            );
        }

        if !self.hooks.should_download(url) {
            debug!(url = %url, "Download declined by hooks");
            return cached.map_or_else(
                || LoadOutcome::Failure(LoadError::DownloadDeclined { url: url.to_string() }),
                LoadOutcome::Success,
            );
        }

        let download = self.download(url, options, operation, events).await;
        let data = match download {
            DownloadOutcome::Completed(data) => data,
            DownloadOutcome::Cancelled => return LoadOutcome::Cancelled,
            DownloadOutcome::Failed(err) => return self.fail(url, options, err),
        };

        let entry = match self.process(url, key, data, options).await {
            Ok(entry) => entry,
            Err(err) => return self.fail(url, options, err),
        };

        self.failed.remove(url);
        let to_disk = !options.memory_only && self.cache.config().should_cache_to_disk;
        drop(self.cache.store(entry.clone(), to_disk));

        if operation.is_cancelled() {
            return LoadOutcome::Cancelled;
        }
        LoadOutcome::Success(LoadedImage {
            url: url.to_string(),
            entry,
            source: ImageSource::Network,
        })
    }

    async fn download(
        &self,
        url: &str,
        options: LoadOptions,
        operation: &LoadOperation,
        events: &mpsc::UnboundedSender<LoadEvent>,
    ) -> DownloadOutcome {
        let handle = self
            .downloader
            .fetch(url, options.priority, options.download_options());
        let (token, mut download_events) = handle.into_parts();
        operation.attach(token);

        let outcome = loop {
            match download_events.recv().await {
                Some(DownloadEvent::Progress { received, expected }) => {
                    let _ = events.send(LoadEvent::Progress { received, expected });
                }
                Some(DownloadEvent::Partial(mut data)) => {
                    // Decoding is slow; only the newest prefix is worth it.
                    let mut finished = None;
                    while let Ok(event) = download_events.try_recv() {
                        match event {
                            DownloadEvent::Progress { received, expected } => {
                                let _ = events.send(LoadEvent::Progress { received, expected });
                            }
                            DownloadEvent::Partial(newer) => data = newer,
                            DownloadEvent::Finished(outcome) => {
                                finished = Some(outcome);
                                break;
                            }
                        }
                    }
                    if let Some(outcome) = finished {
                        break outcome;
                    }
                    let image = self.decode_partial(&data).await;
                    let _ = events.send(LoadEvent::Partial { data, image });
                }
                Some(DownloadEvent::Finished(outcome)) => break outcome,
                None => break DownloadOutcome::Cancelled,
            }
        };
        operation.detach();
        outcome
    }

    /// Best-effort decode of a partially received image. Most formats only
    /// decode once complete, so failures are expected and ignored.
    async fn decode_partial(&self, data: &Bytes) -> Option<Arc<DynamicImage>> {
        if !self.cache.config().decode_images {
            return None;
        }
        match codec::decode(data.clone()).await {
            Ok(img) => Some(Arc::new(img)),
            Err(e) => {
                trace!(received = data.len(), error = %e, "Partial data not decodable yet");
                None
            }
        }
    }

    fn fail(&self, url: &str, options: LoadOptions, err: LoadError) -> LoadOutcome {
        if !options.retry_failed && err.should_blacklist() {
            self.failed.insert(url);
        }
        warn!(url = %url, error = %err, "Image load failed");
        LoadOutcome::Failure(err)
    }

    /// Decodes and validates downloaded bytes, then applies scaling and the
    /// transform hook. A changed image is re-encoded as PNG so the disk tier
    /// holds what memory holds.
    ///
    /// With decoding disabled the bytes are only checked for a known format
    /// and stored as fetched; scaling and the transform hook need pixels and
    /// are skipped.
    async fn process(
        &self,
        url: &str,
        key: &CacheKey,
        data: Bytes,
        options: LoadOptions,
    ) -> Result<CacheEntry, LoadError> {
        if !self.cache.config().decode_images {
            codec::validate(&data)?;
            return Ok(CacheEntry::new(key.clone(), data));
        }
        let decoded = codec::decode(data.clone()).await?;

        let hooks = Arc::clone(&self.hooks);
        let owned_url = url.to_string();
        let max_dimension = if options.scale_down_large_images {
            self.config.scale_down_max_dimension
        } else {
            0
        };

        let (decoded, data) = tokio::task::spawn_blocking(move || {
            let original = (decoded.width(), decoded.height());
            let mut img = codec::scale_down(decoded, max_dimension);
            let mut changed = (img.width(), img.height()) != original;
            if let Some(transformed) = hooks.transform(&img, &owned_url) {
                img = transformed;
                changed = true;
            }
            let data = if changed {
                Bytes::from(codec::encode_png(&img).map_err(|e| {
                    LoadError::invalid_data(format!("Failed to encode transformed image: {e}"))
                })?)
            } else {
                data
            };
            Ok::<(DynamicImage, Bytes), LoadError>((img, data))
        })
        .await
        .map_err(|e| LoadError::invalid_data(format!("Image task panicked: {e}")))??;

        Ok(CacheEntry::new(key.clone(), data).with_decoded(Arc::new(decoded)))
    }
}

/// Builder for [`ImageLoader`].
pub struct ImageLoaderBuilder {
    cache: Arc<TieredCache>,
    downloader: DownloadCoordinator,
    hooks: Arc<dyn LoaderHooks>,
    key_filter: Option<Arc<dyn CacheKeyFilter>>,
    config: LoaderConfig,
}

impl ImageLoaderBuilder {
    /// Sets the download and transform hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn LoaderHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets the URL to cache key mapping.
    #[must_use]
    pub fn key_filter(mut self, filter: impl CacheKeyFilter + 'static) -> Self {
        self.key_filter = Some(Arc::new(filter));
        self
    }

    /// Sets loader options.
    #[must_use]
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the loader.
    #[must_use]
    pub fn build(self) -> ImageLoader {
        ImageLoader {
            inner: Arc::new(LoaderInner {
                cache: self.cache,
                downloader: self.downloader,
                failed: FailureRegistry::new(),
                hooks: self.hooks,
                key_filter: self.key_filter,
                config: self.config,
                running: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

/// Loads images through the memory cache, the disk cache and the network.
///
/// Cheap to clone; clones share caches, downloads and the failure registry.
#[derive(Clone)]
pub struct ImageLoader {
    inner: Arc<LoaderInner>,
}

impl ImageLoader {
    /// Starts building a loader over the given cache and downloader.
    #[must_use]
    pub fn builder(
        cache: impl Into<Arc<TieredCache>>,
        downloader: DownloadCoordinator,
    ) -> ImageLoaderBuilder {
        ImageLoaderBuilder {
            cache: cache.into(),
            downloader,
            hooks: Arc::new(DefaultHooks),
            key_filter: None,
            config: LoaderConfig::default(),
        }
    }

    /// Builds the default stack: a disk cache under the configured root,
    /// background retention sweeps and a `reqwest` transport.
    ///
    /// # Errors
    /// Returns error if the cache directory or HTTP client cannot be created.
    pub async fn with_defaults(config: &WebImageConfig) -> Result<Self, SetupError> {
        let cache = Arc::new(TieredCache::new(config.cache.clone()).await?);
        if let Some(period) = config.cache.maintenance_interval() {
            // Ends by itself once the loader and its cache are dropped.
            drop(cache.spawn_maintenance(period));
        }
        let client: Arc<dyn NetworkClient> = Arc::new(ReqwestNetworkClient::new()?);
        let downloader = DownloadCoordinator::new(client, &config.downloader);
        Ok(Self::builder(cache, downloader)
            .config(config.loader.clone())
            .build())
    }

    /// Returns the cache key for `url`.
    #[must_use]
    pub fn key_for(&self, url: &str) -> CacheKey {
        self.inner.key_for(url)
    }

    /// Starts loading `url`.
    ///
    /// A memory hit is answered before this returns; everything else runs on
    /// a spawned task. Must be called inside a tokio runtime.
    pub fn load(&self, url: &str, options: LoadOptions) -> LoadHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let operation = Arc::new(LoadOperation::default());
        let handle = LoadHandle {
            operation: Arc::clone(&operation),
            events: rx,
        };

        if url.is_empty() {
            let _ = tx.send(LoadEvent::Finished(LoadOutcome::Failure(LoadError::InvalidUrl)));
            return handle;
        }

        let key = self.key_for(url);
        let mut cached = None;
        if !options.bypass_cache
            && let Some(entry) = self.inner.cache.lookup_memory(&key)
        {
            let image = LoadedImage {
                url: url.to_string(),
                entry,
                source: ImageSource::MemoryCache,
            };
            trace!(url = %url, "Served from memory cache");
            if !options.refresh_if_stale {
                let _ = tx.send(LoadEvent::Finished(LoadOutcome::Success(image)));
                return handle;
            }
            let _ = tx.send(LoadEvent::Cached(image.clone()));
            cached = Some(image);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.running.lock().insert(id, Arc::clone(&operation));

        let inner = Arc::clone(&self.inner);
        let url = url.to_string();
        tokio::spawn(async move {
            inner
                .run(id, url, key, options, cached, operation, tx)
                .await;
        });
        handle
    }

    /// Cancels `handle`. Same as [`LoadHandle::cancel`].
    pub fn cancel(&self, handle: &LoadHandle) {
        handle.cancel();
    }

    /// Cancels every running load and every download.
    pub fn cancel_all(&self) {
        let operations: Vec<_> = self.inner.running.lock().values().cloned().collect();
        for operation in &operations {
            operation.cancel();
        }
        self.inner.downloader.cancel_all();
        debug!(count = operations.len(), "Cancelled all loads");
    }

    /// Returns true while any load is past the memory stage.
    #[must_use]
    pub fn is_any_request_active(&self) -> bool {
        !self.inner.running.lock().is_empty()
    }

    /// Number of loads past the memory stage.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.inner.running.lock().len()
    }

    /// Stores `data` for `url` without touching the network.
    ///
    /// # Errors
    /// Returns `InvalidData` if `data` is not a decodable image, or with
    /// decoding disabled, not a recognised format.
    pub async fn save(&self, url: &str, data: Bytes) -> Result<CacheEntry, LoadError> {
        let key = self.key_for(url);
        let entry = if self.inner.cache.config().decode_images {
            let decoded = codec::decode(data.clone()).await?;
            CacheEntry::new(key, data).with_decoded(Arc::new(decoded))
        } else {
            codec::validate(&data)?;
            CacheEntry::new(key, data)
        };

        let to_disk = self.inner.cache.config().should_cache_to_disk;
        self.inner.cache.store(entry.clone(), to_disk).finished().await;
        self.inner.failed.remove(url);
        Ok(entry)
    }

    /// Returns true if `url` is in memory or on disk.
    pub async fn cached_image_exists(&self, url: &str) -> bool {
        let key = self.key_for(url);
        self.inner.cache.memory_contains(&key) || self.inner.cache.disk_exists(&key).await
    }

    /// Returns true if `url` is on disk.
    pub async fn disk_image_exists(&self, url: &str) -> bool {
        self.inner.cache.disk_exists(&self.key_for(url)).await
    }

    /// Returns true if `url` is blacklisted.
    #[must_use]
    pub fn is_failed(&self, url: &str) -> bool {
        self.inner.failed.contains(url)
    }

    /// Forgets every blacklisted URL.
    pub fn clear_failed_urls(&self) {
        self.inner.failed.clear();
    }

    /// Returns the cache.
    #[must_use]
    pub fn cache(&self) -> &TieredCache {
        &self.inner.cache
    }

    /// Returns the download coordinator.
    #[must_use]
    pub fn downloader(&self) -> &DownloadCoordinator {
        &self.inner.downloader
    }
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("cache", &self.inner.cache)
            .field("running", &self.running_count())
            .finish_non_exhaustive()
    }
}
