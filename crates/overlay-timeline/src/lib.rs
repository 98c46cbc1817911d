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

//! Time-indexed map overlay engine.
//!
//! Turns a continuous scroll gesture into a validated instant on a bounded
//! timeline, drives scheduled playback over it, and gates display of remote
//! WMS overlay imagery behind a prefetch step whose observation/forecast
//! boundary is resolved from the service's capabilities document.
//!
//! The layers can be used independently:
//!
//! - [`window`]: time window resolution for an overlay
//! - [`capabilities`] and [`boundary`]: forecast boundary with fallback
//! - [`slider`]: timeline generation and offset to index mapping
//! - [`prefetch`]: image URL plans, concurrent warming and the readiness gate
//! - [`animation`]: drag/playback state machine and its timer
//!
//! [`TimelineSession`] wires them together for one display session.
//!
//! ```
//! use overlay_timeline::slider::{index_for_offset, SliderTimeline};
//! use overlay_timeline::window::TimeWindow;
//!
//! let timeline = SliderTimeline::from_window(&TimeWindow::new(0, 7200, 3600));
//! assert_eq!(timeline.timestamps(), &[0, 3600, 7200]);
//! assert_eq!(index_for_offset(150.0, 100.0, timeline.len()), Some(1));
//! ```

pub mod animation;
pub mod boundary;
pub mod capabilities;
pub mod error;
pub mod overlay;
pub mod prefetch;
pub mod slider;
pub mod window;

use std::sync::Arc;
use std::time::Duration;

use log::info;

pub use animation::{AnimationEngine, Haptics, PlaybackState, ScrollEvents, ScrollSurface};
pub use boundary::{CapabilitiesSource, ForecastBoundaryResolver, HttpCapabilitiesSource};
pub use error::{Result, TimelineError};
pub use overlay::{OverlayMetadata, TimeKind, WmsRequest};
pub use prefetch::{
    DiskImageCache, HttpImagePrefetcher, ImagePrefetcher, OverlayPrefetchCache, PrefetchPlan, PrefetchStatus,
};
pub use slider::{SliderLayout, SliderTimeline, TimelinePosition};
pub use window::TimeWindow;

/// Everything derived from the active overlay.
#[derive(Debug, Clone)]
struct ActiveOverlay {
    overlay: OverlayMetadata,
    boundary: i64,
    window: TimeWindow,
    timeline: SliderTimeline,
    plan: Arc<PrefetchPlan>,
}

/// One display session of the overlay timeline.
///
/// Owns the boundary resolver, the prefetch cache and the animation engine,
/// and recomputes window, timeline and prefetch plan whenever the overlay or
/// the step changes.
pub struct TimelineSession {
    resolver: ForecastBoundaryResolver,
    prefetch: OverlayPrefetchCache,
    engine: AnimationEngine,
    step_minutes: u32,
    device_width: f64,
    active: Option<ActiveOverlay>,
}

impl std::fmt::Debug for TimelineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineSession")
            .field("step_minutes", &self.step_minutes)
            .field("device_width", &self.device_width)
            .field("active", &self.active.as_ref().map(|a| &a.overlay.id))
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl TimelineSession {
    #[must_use]
    pub fn new(
        resolver: ForecastBoundaryResolver,
        prefetch: OverlayPrefetchCache,
        engine: AnimationEngine,
        step_minutes: u32,
        device_width: f64,
    ) -> Self {
        Self {
            resolver,
            prefetch,
            engine,
            step_minutes: step_minutes.max(1),
            device_width,
            active: None,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &AnimationEngine {
        &self.engine
    }

    #[must_use]
    pub fn prefetch(&self) -> &OverlayPrefetchCache {
        &self.prefetch
    }

    #[must_use]
    pub fn overlay(&self) -> Option<&OverlayMetadata> {
        self.active.as_ref().map(|a| &a.overlay)
    }

    #[must_use]
    pub fn boundary(&self) -> Option<i64> {
        self.active.as_ref().map(|a| a.boundary)
    }

    #[must_use]
    pub fn window(&self) -> Option<TimeWindow> {
        self.active.as_ref().map(|a| a.window)
    }

    #[must_use]
    pub fn timeline(&self) -> Option<&SliderTimeline> {
        self.active.as_ref().map(|a| &a.timeline)
    }

    #[must_use]
    pub fn plan(&self) -> Option<Arc<PrefetchPlan>> {
        self.active.as_ref().map(|a| Arc::clone(&a.plan))
    }

    /// Step in effect: the overlay's own step if it declares one.
    #[must_use]
    pub fn effective_step_minutes(&self) -> u32 {
        self.overlay()
            .and_then(|o| o.step_minutes)
            .unwrap_or(self.step_minutes)
            .max(1)
    }

    /// Make `overlay` the active overlay.
    ///
    /// Stops playback, resolves the boundary (once per activation) and
    /// rebuilds timeline and prefetch plan. The returned plan still has to be
    /// executed with [`TimelineSession::prefetch_active`].
    pub async fn activate(&mut self, overlay: OverlayMetadata, now: i64) -> Arc<PrefetchPlan> {
        self.engine.overlay_changed();
        self.resolver.invalidate();

        let boundary = self.resolver.resolve_boundary(&overlay).await;
        info!("Activated overlay '{}' with forecast boundary {}", overlay.id, boundary);
        self.rebuild(overlay, boundary, now)
    }

    /// Change the user selected step; returns the new plan when an overlay
    /// is active.
    pub fn set_step(&mut self, step_minutes: u32, now: i64) -> Option<Arc<PrefetchPlan>> {
        self.step_minutes = step_minutes.max(1);
        let active = self.active.take()?;
        Some(self.rebuild(active.overlay, active.boundary, now))
    }

    /// Drop the active overlay and publish "loading".
    pub fn deactivate(&mut self) {
        self.active = None;
        self.engine.reset_time();
        self.prefetch.clear();
        self.resolver.invalidate();
    }

    /// Execute the active plan. Returns whether the readiness gate opened.
    pub async fn prefetch_active(&self) -> bool {
        match self.plan() {
            Some(plan) => self.prefetch.execute(plan).await,
            None => false,
        }
    }

    /// Image URL to display at `timestamp`, or `None` while the readiness
    /// gate is closed or no overlay is active.
    #[must_use]
    pub fn image_url(&self, timestamp: i64) -> Option<String> {
        let active = self.active.as_ref()?;
        if !self.prefetch.is_ready() {
            return None;
        }
        let kind = TimeKind::classify(timestamp, active.boundary);
        Some(self.prefetch.wms().image_url(active.overlay.layer_for(kind), timestamp))
    }

    fn rebuild(&mut self, overlay: OverlayMetadata, boundary: i64, now: i64) -> Arc<PrefetchPlan> {
        let step_minutes = overlay.step_minutes.unwrap_or(self.step_minutes).max(1);
        let window = window::resolve(&overlay.id, Some(&overlay), step_minutes, now);
        let timeline = SliderTimeline::from_window(&window);
        let layout = SliderLayout::for_step(step_minutes, self.device_width);
        let interval = overlay.animation_interval_ms.map(Duration::from_millis);

        self.engine.set_timeline(timeline.clone(), layout, interval, now);
        let plan = self.prefetch.build(&overlay, &window, boundary);

        self.active = Some(ActiveOverlay {
            overlay,
            boundary,
            window,
            timeline,
            plan: Arc::clone(&plan),
        });
        plan
    }
}
