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

//! Forecast boundary resolution.
//!
//! Determines the instant at which forecast imagery supersedes observation
//! imagery by reading the forecast layer's time dimension from the WMS
//! capabilities document. The resolver never fails: any problem is logged and
//! the instant observed at the start of the call is used instead.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};

use crate::capabilities;
use crate::error::{Result, TimelineError};
use crate::overlay::OverlayMetadata;

/// Default limit for the capabilities round trip.
pub const DEFAULT_CAPABILITIES_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything able to produce a capabilities document.
#[async_trait]
pub trait CapabilitiesSource: Send + Sync {
    async fn fetch_capabilities(&self) -> Result<String>;
}

/// Fetches the capabilities document over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCapabilitiesSource {
    client: reqwest::Client,
    url: String,
}

impl HttpCapabilitiesSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CapabilitiesSource for HttpCapabilitiesSource {
    async fn fetch_capabilities(&self) -> Result<String> {
        debug!("Fetching capabilities from {}", self.url);
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(TimelineError::Status {
                status: response.status().as_u16(),
                url: self.url.clone(),
            });
        }

        Ok(response.text().await?)
    }
}

/// Resolves and caches the forecast boundary of the active overlay.
pub struct ForecastBoundaryResolver {
    source: Arc<dyn CapabilitiesSource>,
    timeout: Duration,
    // (overlay id, boundary) of the current display session
    cached: Mutex<Option<(String, i64)>>,
}

impl std::fmt::Debug for ForecastBoundaryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastBoundaryResolver")
            .field("timeout", &self.timeout)
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

impl ForecastBoundaryResolver {
    #[must_use]
    pub fn new(source: Arc<dyn CapabilitiesSource>) -> Self {
        Self::with_timeout(source, DEFAULT_CAPABILITIES_TIMEOUT)
    }

    #[must_use]
    pub fn with_timeout(source: Arc<dyn CapabilitiesSource>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            cached: Mutex::new(None),
        }
    }

    /// Boundary already resolved for `overlay_id`, if any.
    #[must_use]
    pub fn cached_boundary(&self, overlay_id: &str) -> Option<i64> {
        self.cached
            .lock()
            .ok()
            .and_then(|cached| cached.as_ref().filter(|(id, _)| id == overlay_id).map(|(_, b)| *b))
    }

    /// Forget the cached boundary so the next call re-resolves.
    pub fn invalidate(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = None;
        }
    }

    /// Resolve the forecast boundary (unix seconds) for `overlay`.
    ///
    /// Fetches at most once per overlay activation. Falls back to the current
    /// instant on any failure.
    pub async fn resolve_boundary(&self, overlay: &OverlayMetadata) -> i64 {
        if let Some(boundary) = self.cached_boundary(&overlay.id) {
            return boundary;
        }

        let fallback = Utc::now().timestamp();
        let boundary = match self.fetch_boundary(overlay).await {
            Ok(boundary) => {
                info!(
                    "Forecast boundary for '{}' resolved to {}",
                    overlay.id,
                    crate::overlay::iso_instant(boundary)
                );
                boundary
            }
            Err(e) => {
                warn!(
                    "Could not resolve forecast boundary for '{}', using current time: {}",
                    overlay.id, e
                );
                fallback
            }
        };

        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some((overlay.id.clone(), boundary));
        }
        boundary
    }

    async fn fetch_boundary(&self, overlay: &OverlayMetadata) -> Result<i64> {
        let xml = tokio::time::timeout(self.timeout, self.source.fetch_capabilities())
            .await
            .map_err(|elapsed| {
                debug!("Capabilities fetch exceeded {:?}: {}", self.timeout, elapsed);
                TimelineError::Timeout(overlay.forecast_layer.clone())
            })??;

        capabilities::first_forecast_instant(&xml, &overlay.forecast_layer)
    }
}
