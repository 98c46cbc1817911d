// Copyright 2025 Chris Custine
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

//! Overlay image prefetching.
//!
//! Builds the list of time-indexed image URLs for the active overlay, warms
//! them concurrently and publishes a readiness gate the renderer must wait
//! for before showing any time-indexed image. Each rebuild produces a new
//! plan generation; statuses are replaced wholesale, never edited in place.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use tokio::sync::watch;

use crate::error::{Result, TimelineError};
use crate::overlay::{OverlayMetadata, TimeKind, WmsRequest};
use crate::window::{floor_to_step, TimeWindow};

/// Default age after which cached overlay images are discarded.
pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// One image to warm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchEntry {
    pub timestamp: i64,
    pub kind: TimeKind,
    pub url: String,
}

/// The ordered set of images for one window/boundary pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchPlan {
    /// Monotonic build counter; 0 is the empty initial plan
    pub generation: u64,
    pub overlay_id: String,
    pub boundary: i64,
    pub entries: Vec<PrefetchEntry>,
}

impl PrefetchPlan {
    /// URL to display for `timestamp`, if the plan covers it.
    #[must_use]
    pub fn url_for(&self, timestamp: i64) -> Option<&str> {
        self.entries
            .binary_search_by_key(&timestamp, |entry| entry.timestamp)
            .ok()
            .map(|i| self.entries[i].url.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Snapshot of the current plan and its readiness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchStatus {
    pub plan: Arc<PrefetchPlan>,
    /// True once every prefetch of `plan` has settled
    pub ready: bool,
    /// Per-entry outcome, aligned with `plan.entries`; empty until settled
    pub cached: Vec<bool>,
}

impl PrefetchStatus {
    /// Timestamps whose prefetch failed; they are left for on-demand loading.
    #[must_use]
    pub fn uncached_timestamps(&self) -> Vec<i64> {
        self.plan
            .entries
            .iter()
            .zip(&self.cached)
            .filter(|(_, cached)| !**cached)
            .map(|(entry, _)| entry.timestamp)
            .collect()
    }
}

/// Something able to warm and look up remote overlay images.
#[async_trait]
pub trait ImagePrefetcher: Send + Sync {
    /// Fetch `url` into the cache.
    async fn prefetch(&self, url: &str) -> Result<()>;

    /// Read-through check whether `url` is already cached.
    async fn is_cached(&self, url: &str) -> bool;
}

/// Builds, executes and gates overlay prefetch plans.
pub struct OverlayPrefetchCache {
    prefetcher: Arc<dyn ImagePrefetcher>,
    wms: WmsRequest,
    prefetch_step_seconds: Option<i64>,
    generation: AtomicU64,
    status_tx: watch::Sender<Arc<PrefetchStatus>>,
}

impl std::fmt::Debug for OverlayPrefetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayPrefetchCache")
            .field("wms", &self.wms)
            .field("prefetch_step_seconds", &self.prefetch_step_seconds)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl OverlayPrefetchCache {
    #[must_use]
    pub fn new(prefetcher: Arc<dyn ImagePrefetcher>, wms: WmsRequest) -> Self {
        let (status_tx, _) = watch::channel(Arc::new(PrefetchStatus::default()));
        Self {
            prefetcher,
            wms,
            prefetch_step_seconds: None,
            generation: AtomicU64::new(0),
            status_tx,
        }
    }

    /// Enumerate at this step instead of the window's display step.
    ///
    /// Usually the coarsest step the user can choose, which bounds the number
    /// of requests regardless of the selected display step.
    #[must_use]
    pub fn with_prefetch_step_minutes(mut self, minutes: u32) -> Self {
        self.prefetch_step_seconds = Some(i64::from(minutes.max(1)) * 60);
        self
    }

    #[must_use]
    pub fn wms(&self) -> &WmsRequest {
        &self.wms
    }

    /// Subscribe to status snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<PrefetchStatus>> {
        self.status_tx.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> Arc<PrefetchStatus> {
        self.status_tx.borrow().clone()
    }

    /// Whether the renderer may display time-indexed imagery.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status_tx.borrow().ready
    }

    /// Build and install a new plan; readiness drops to false until it settles.
    pub fn build(&self, overlay: &OverlayMetadata, window: &TimeWindow, boundary: i64) -> Arc<PrefetchPlan> {
        let step = self.prefetch_step_seconds.unwrap_or(window.step_seconds);
        let entries = if window.is_not_ready() {
            Vec::new()
        } else {
            TimeWindow::new(window.min_unix, floor_to_step(window.max_unix, step), step)
                .timestamps_at(step)
                .into_iter()
                .map(|timestamp| {
                    let kind = TimeKind::classify(timestamp, boundary);
                    PrefetchEntry {
                        timestamp,
                        kind,
                        url: self.wms.image_url(overlay.layer_for(kind), timestamp),
                    }
                })
                .collect()
        };

        let plan = Arc::new(PrefetchPlan {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            overlay_id: overlay.id.clone(),
            boundary,
            entries,
        });

        debug!(
            "Built prefetch plan #{} for '{}' with {} images",
            plan.generation,
            plan.overlay_id,
            plan.len()
        );

        self.status_tx.send_replace(Arc::new(PrefetchStatus {
            plan: Arc::clone(&plan),
            ready: false,
            cached: Vec::new(),
        }));
        plan
    }

    /// Drop the current plan, e.g. when the overlay is deactivated.
    pub fn clear(&self) {
        let plan = Arc::new(PrefetchPlan {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            ..PrefetchPlan::default()
        });
        self.status_tx.send_replace(Arc::new(PrefetchStatus {
            plan,
            ready: false,
            cached: Vec::new(),
        }));
    }

    /// Warm every image of `plan` and open the readiness gate.
    ///
    /// Individual failures never abort the batch. Returns true when the gate
    /// of `plan` is open afterwards, false if a newer plan replaced it while
    /// the batch was in flight.
    pub async fn execute(&self, plan: Arc<PrefetchPlan>) -> bool {
        let outcomes = join_all(plan.entries.iter().map(|entry| async move {
            match self.prefetcher.prefetch(&entry.url).await {
                Ok(()) => true,
                Err(e) => {
                    debug!("Prefetch of {} failed: {}", entry.url, e);
                    false
                }
            }
        }))
        .await;

        let failed = outcomes.iter().filter(|ok| !**ok).count();
        if failed > 0 {
            warn!(
                "{} of {} overlay images could not be prefetched for '{}'",
                failed,
                outcomes.len(),
                plan.overlay_id
            );
        }

        // Diagnostics only; the result never holds back readiness.
        let hits = join_all(plan.entries.iter().map(|entry| self.prefetcher.is_cached(&entry.url)))
            .await
            .into_iter()
            .filter(|hit| *hit)
            .count();
        debug!("Cache check for plan #{}: {}/{} cached", plan.generation, hits, plan.len());

        let opened = self.status_tx.send_if_modified(|status| {
            if status.plan.generation != plan.generation {
                return false;
            }
            *status = Arc::new(PrefetchStatus {
                plan: Arc::clone(&plan),
                ready: true,
                cached: outcomes.clone(),
            });
            true
        });

        if opened {
            info!(
                "Overlay '{}' ready: {} images prefetched, {} failed",
                plan.overlay_id,
                outcomes.len() - failed,
                failed
            );
        } else {
            debug!("Prefetch plan #{} settled after being superseded", plan.generation);
        }
        opened
    }
}

/// On-disk image cache keyed by the SHA-256 of the image URL.
#[derive(Debug, Clone)]
pub struct DiskImageCache {
    cache_dir: PathBuf,
}

impl DiskImageCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    /// Platform cache directory for overlay images.
    #[must_use]
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("radar-timeline")
            .join("overlays")
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    #[must_use]
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.png", url_digest(url)))
    }

    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.path_for(url).exists()
    }

    #[must_use]
    pub fn read(&self, url: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(url)).ok()
    }

    /// Store `bytes` for `url`. The image only becomes visible to
    /// [`DiskImageCache::contains`] once completely written.
    pub fn write(&self, url: &str, bytes: &[u8]) -> Result<()> {
        let sequence = PARTIAL_WRITES.fetch_add(1, Ordering::Relaxed);
        let partial = self
            .cache_dir
            .join(format!("{}.{}.{}.part", url_digest(url), std::process::id(), sequence));

        if let Err(e) = fs::write(&partial, bytes).and_then(|()| fs::rename(&partial, self.path_for(url))) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove cached images at least `max_age` old; returns how many were removed.
    pub fn cleanup_older_than(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let Ok(entries) = fs::read_dir(&self.cache_dir) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let age = entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());

            if age.is_some_and(|age| age >= max_age) {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove cached image {:?}: {}", entry.path(), e),
                }
            }
        }

        if removed > 0 {
            info!("Removed {} expired overlay images", removed);
        }
        removed
    }
}

static PARTIAL_WRITES: AtomicU64 = AtomicU64::new(0);

fn url_digest(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Downloads overlay images over HTTP into a [`DiskImageCache`].
#[derive(Debug, Clone)]
pub struct HttpImagePrefetcher {
    client: reqwest::Client,
    cache: DiskImageCache,
}

impl HttpImagePrefetcher {
    pub fn new(cache: DiskImageCache, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, cache })
    }

    #[must_use]
    pub fn cache(&self) -> &DiskImageCache {
        &self.cache
    }
}

#[async_trait]
impl ImagePrefetcher for HttpImagePrefetcher {
    async fn prefetch(&self, url: &str) -> Result<()> {
        if self.cache.contains(url) {
            return Ok(());
        }

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(TimelineError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        // WMS servers report errors such as an out of range time as an XML
        // exception document with status 200.
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(TimelineError::NotAnImage {
                content_type,
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        self.cache.write(url, &bytes)
    }

    async fn is_cached(&self, url: &str) -> bool {
        self.cache.contains(url)
    }
}
