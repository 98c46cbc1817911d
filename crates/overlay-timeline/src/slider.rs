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

//! Discrete slider timeline and scroll offset mapping.
//!
//! The timeline is the list of selectable instants; the layout converts
//! between those instants and horizontal pixel offsets on the scrub track.

use chrono::{DateTime, FixedOffset};

use crate::window::TimeWindow;

/// Width of one step when the step is shorter than an hour.
pub const COMPACT_STEP_WIDTH: f64 = 16.0;

/// Width of one step for hourly or coarser steps, wide enough for an hour label.
pub const HOURLY_STEP_WIDTH: f64 = 48.0;

/// Minimum hit width of the final segment so its label is not clipped.
pub const LAST_SEGMENT_LABEL_WIDTH: f64 = 56.0;

/// Device width the base step widths were designed for.
pub const REFERENCE_DEVICE_WIDTH: f64 = 375.0;

const MAX_WIDTH_MULTIPLIER: f64 = 2.0;

const SNAP_EPSILON: f64 = 1e-6;

/// Placeholder shown while no time can be displayed.
pub const LOADING_LABEL: &str = "Loading…";

/// The instant currently selected on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimelinePosition {
    pub index: usize,
    pub timestamp: i64,
}

/// Ordered, step-spaced instants a user can scrub through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliderTimeline {
    timestamps: Vec<i64>,
    step_seconds: i64,
}

impl SliderTimeline {
    /// Generate the timeline for `window` at the window's own step.
    ///
    /// A window producing a single instant yields an empty timeline.
    #[must_use]
    pub fn from_window(window: &TimeWindow) -> Self {
        let timestamps = window.timestamps_at(window.step_seconds);
        Self {
            timestamps: if timestamps.len() > 1 { timestamps } else { Vec::new() },
            step_seconds: window.step_seconds,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True when there is nothing to scrub.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.len() <= 1
    }

    #[must_use]
    pub fn step_seconds(&self) -> i64 {
        self.step_seconds
    }

    #[must_use]
    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<i64> {
        self.timestamps.get(index).copied()
    }

    #[must_use]
    pub fn position(&self, index: usize) -> Option<TimelinePosition> {
        self.get(index).map(|timestamp| TimelinePosition { index, timestamp })
    }

    #[must_use]
    pub fn last_index(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(self.timestamps.len() - 1)
        }
    }

    /// Index of the latest instant at or before `timestamp`, clamped to the timeline.
    #[must_use]
    pub fn index_at_or_before(&self, timestamp: i64) -> Option<usize> {
        let last = self.last_index()?;
        Some(self.timestamps.partition_point(|t| *t <= timestamp).saturating_sub(1).min(last))
    }

    /// Map a scroll offset to the selected position.
    #[must_use]
    pub fn position_for_offset(&self, offset: f64, layout: &SliderLayout) -> Option<TimelinePosition> {
        index_for_offset(offset, layout.step_width, self.len()).and_then(|index| self.position(index))
    }
}

/// Map a continuous scroll offset to the nearest valid timeline index.
///
/// `index = floor(offset / step_width_px)` clamped to `[0, timeline_len - 1]`.
/// Anything landing in the (wider) last segment maps to the last index.
/// Negative and non-finite offsets clamp to 0. Returns `None` when the
/// timeline has one element or fewer.
#[must_use]
pub fn index_for_offset(offset: f64, step_width_px: f64, timeline_len: usize) -> Option<usize> {
    if timeline_len <= 1 {
        return None;
    }
    let last = timeline_len - 1;

    if !offset.is_finite() || offset <= 0.0 || !step_width_px.is_finite() || step_width_px <= 0.0 {
        return Some(if offset == f64::INFINITY { last } else { 0 });
    }

    // Absorbs rounding so a snapped offset maps back to its own index
    let raw = (offset / step_width_px + SNAP_EPSILON).floor();
    if raw >= last as f64 {
        Some(last)
    } else {
        Some(raw as usize)
    }
}

/// Pixel geometry of the scrub track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderLayout {
    /// Width of one interior step
    pub step_width: f64,
    /// Hit width of the final segment
    pub last_segment_width: f64,
}

impl SliderLayout {
    /// Layout for a step size on a device of the given width.
    ///
    /// Sub-hour steps use the compact width, hourly or coarser steps the wider
    /// one; both scale with the device width relative to the reference width.
    #[must_use]
    pub fn for_step(step_minutes: u32, device_width_px: f64) -> Self {
        let multiplier = device_width_multiplier(device_width_px);
        let base = if step_minutes < 60 {
            COMPACT_STEP_WIDTH
        } else {
            HOURLY_STEP_WIDTH
        };
        let step_width = base * multiplier;

        Self {
            step_width,
            last_segment_width: step_width.max(LAST_SEGMENT_LABEL_WIDTH * multiplier),
        }
    }

    /// Offset at which `index` rests exactly.
    #[must_use]
    pub fn nominal_offset(&self, index: usize) -> f64 {
        index as f64 * self.step_width
    }

    /// Largest meaningful scroll offset for a timeline of `len` instants.
    #[must_use]
    pub fn max_offset(&self, len: usize) -> f64 {
        self.nominal_offset(len.saturating_sub(1))
    }

    /// Full rendered track width, including the wider last segment.
    #[must_use]
    pub fn track_width(&self, len: usize) -> f64 {
        if len == 0 {
            0.0
        } else {
            self.max_offset(len) + self.last_segment_width
        }
    }

    /// Sub-step advance applied per animation tick.
    #[must_use]
    pub fn tick_advance(&self) -> f64 {
        self.step_width / crate::animation::TICKS_PER_STEP
    }
}

fn device_width_multiplier(device_width_px: f64) -> f64 {
    if !device_width_px.is_finite() || device_width_px <= 0.0 {
        return 1.0;
    }
    (device_width_px / REFERENCE_DEVICE_WIDTH).clamp(1.0, MAX_WIDTH_MULTIPLIER)
}

/// Label for the displayed time, or the loading placeholder.
#[must_use]
pub fn format_time_label(position: Option<&TimelinePosition>, utc_offset_seconds: i32) -> String {
    let Some(position) = position else {
        return LOADING_LABEL.to_string();
    };
    let offset = FixedOffset::east_opt(utc_offset_seconds).or_else(|| FixedOffset::east_opt(0));

    offset
        .zip(DateTime::from_timestamp(position.timestamp, 0))
        .map(|(offset, instant)| instant.with_timezone(&offset).format("%H:%M").to_string())
        .unwrap_or_else(|| LOADING_LABEL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly_timeline() -> SliderTimeline {
        SliderTimeline::from_window(&TimeWindow::new(0, 7200, 3600))
    }

    #[test]
    fn test_timeline_from_window() {
        assert_eq!(hourly_timeline().timestamps(), &[0, 3600, 7200]);
    }

    #[test]
    fn test_single_instant_timeline_is_empty() {
        let timeline = SliderTimeline::from_window(&TimeWindow::not_ready(900));
        assert!(timeline.is_empty());
        assert_eq!(timeline.len(), 0);
        assert_eq!(timeline.last_index(), None);
        assert_eq!(timeline.position_for_offset(0.0, &SliderLayout::for_step(15, 375.0)), None);
    }

    #[test]
    fn test_index_for_offset_examples() {
        assert_eq!(index_for_offset(0.0, 100.0, 3), Some(0));
        assert_eq!(index_for_offset(150.0, 100.0, 3), Some(1));
        assert_eq!(index_for_offset(250.0, 100.0, 3), Some(2));
    }

    #[test]
    fn test_index_for_offset_clamps() {
        assert_eq!(index_for_offset(-40.0, 100.0, 3), Some(0));
        assert_eq!(index_for_offset(10_000.0, 100.0, 3), Some(2));
        assert_eq!(index_for_offset(f64::NAN, 100.0, 3), Some(0));
        assert_eq!(index_for_offset(f64::INFINITY, 100.0, 3), Some(2));
    }

    #[test]
    fn test_index_for_offset_requires_two_elements() {
        assert_eq!(index_for_offset(0.0, 100.0, 0), None);
        assert_eq!(index_for_offset(50.0, 100.0, 1), None);
    }

    #[test]
    fn test_last_segment_boundary() {
        // The last segment starts at (len - 1) * width and extends past the rendered track
        assert_eq!(index_for_offset(199.999, 100.0, 3), Some(1));
        assert_eq!(index_for_offset(200.0, 100.0, 3), Some(2));
        assert_eq!(index_for_offset(299.0, 100.0, 3), Some(2));
    }

    #[test]
    fn test_index_for_offset_monotonic() {
        let mut previous = 0;
        for step in 0..5_000 {
            let offset = f64::from(step) * 0.37 - 20.0;
            let index = index_for_offset(offset, 48.0, 25).unwrap();
            assert!(index >= previous);
            previous = index;
        }
        assert_eq!(previous, 24);
    }

    #[test]
    fn test_snap_then_remap_is_idempotent() {
        let layout = SliderLayout::for_step(15, 414.0);
        for len in 2..40 {
            for index in 0..len {
                let snapped = layout.nominal_offset(index);
                assert_eq!(index_for_offset(snapped, layout.step_width, len), Some(index));
            }
        }
    }

    #[test]
    fn test_layout_widths() {
        let compact = SliderLayout::for_step(15, 375.0);
        let hourly = SliderLayout::for_step(60, 375.0);
        assert!((compact.step_width - COMPACT_STEP_WIDTH).abs() < f64::EPSILON);
        assert!((hourly.step_width - HOURLY_STEP_WIDTH).abs() < f64::EPSILON);
        assert!(compact.last_segment_width > compact.step_width);

        let tablet = SliderLayout::for_step(60, 750.0);
        assert!((tablet.step_width - 2.0 * HOURLY_STEP_WIDTH).abs() < f64::EPSILON);

        let narrow = SliderLayout::for_step(60, 320.0);
        assert!((narrow.step_width - HOURLY_STEP_WIDTH).abs() < f64::EPSILON);
    }

    #[test]
    fn test_track_geometry() {
        let layout = SliderLayout::for_step(60, 375.0);
        assert!((layout.max_offset(3) - 96.0).abs() < f64::EPSILON);
        assert!((layout.track_width(3) - (96.0 + LAST_SEGMENT_LABEL_WIDTH)).abs() < f64::EPSILON);
        assert!((layout.track_width(0)).abs() < f64::EPSILON);
        assert!((layout.tick_advance() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_index_at_or_before() {
        let timeline = hourly_timeline();
        assert_eq!(timeline.index_at_or_before(-10), Some(0));
        assert_eq!(timeline.index_at_or_before(3599), Some(0));
        assert_eq!(timeline.index_at_or_before(3600), Some(1));
        assert_eq!(timeline.index_at_or_before(99_999), Some(2));
    }

    #[test]
    fn test_format_time_label() {
        assert_eq!(format_time_label(None, 0), LOADING_LABEL);
        let position = TimelinePosition { index: 1, timestamp: 3600 };
        assert_eq!(format_time_label(Some(&position), 0), "01:00");
        assert_eq!(format_time_label(Some(&position), 3 * 3600), "04:00");
    }
}
