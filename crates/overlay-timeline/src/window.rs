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

//! Time window resolution.
//!
//! Derives the inclusive, step-aligned time range an overlay can be scrubbed
//! over from its declared bounds and the configured step.

use crate::overlay::OverlayMetadata;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 3600;

/// Inclusive time range with the step used to walk it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    pub min_unix: i64,
    pub max_unix: i64,
    pub step_seconds: i64,
}

impl TimeWindow {
    /// Create a window, swapping inverted bounds and forcing a positive step.
    #[must_use]
    pub fn new(min_unix: i64, max_unix: i64, step_seconds: i64) -> Self {
        let (min_unix, max_unix) = if min_unix <= max_unix {
            (min_unix, max_unix)
        } else {
            (max_unix, min_unix)
        };
        Self {
            min_unix,
            max_unix,
            step_seconds: step_seconds.max(1),
        }
    }

    /// Window returned while overlay metadata is not loaded yet.
    #[must_use]
    pub fn not_ready(step_seconds: i64) -> Self {
        Self::new(0, 0, step_seconds)
    }

    /// A window spanning a single instant yields no scrubbable timeline.
    #[must_use]
    pub fn is_not_ready(&self) -> bool {
        self.min_unix == self.max_unix
    }

    /// Every step-aligned instant from `floor(min_unix, step)` up to
    /// `max_unix` inclusive.
    #[must_use]
    pub fn timestamps_at(&self, step_seconds: i64) -> Vec<i64> {
        let step = step_seconds.max(1);
        let first = floor_to_step(self.min_unix, step);
        if self.max_unix < first {
            return Vec::new();
        }

        let count = (self.max_unix - first) / step + 1;
        (0..count).map(|i| first + i * step).collect()
    }
}

/// Round `value` down to the nearest multiple of `step` (towards negative infinity).
#[must_use]
pub fn floor_to_step(value: i64, step: i64) -> i64 {
    let step = step.max(1);
    value - value.rem_euclid(step)
}

/// Resolve the time window of an overlay.
///
/// Explicit `observation_start`/`forecast_end` bounds win; otherwise the
/// overlay's look-back/look-ahead hours are applied around `now` floored to
/// the step. Missing metadata, or metadata for a different overlay, produces
/// the not-ready window.
#[must_use]
pub fn resolve(
    overlay_id: &str,
    overlay: Option<&OverlayMetadata>,
    configured_step_minutes: u32,
    now: i64,
) -> TimeWindow {
    let step_seconds = i64::from(configured_step_minutes.max(1)) * SECONDS_PER_MINUTE;

    let Some(overlay) = overlay.filter(|o| o.id == overlay_id) else {
        return TimeWindow::not_ready(step_seconds);
    };

    let anchor = floor_to_step(now, step_seconds);
    let min_unix = overlay
        .observation_start
        .unwrap_or_else(|| anchor - overlay.look_back_hours.max(0) * SECONDS_PER_HOUR);
    let max_unix = overlay
        .forecast_end
        .unwrap_or_else(|| anchor + overlay.look_ahead_hours.max(0) * SECONDS_PER_HOUR);

    TimeWindow::new(min_unix, max_unix, step_seconds)
}
