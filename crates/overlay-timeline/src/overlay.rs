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

//! Overlay metadata and WMS image request construction.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Default observation look-back when an overlay declares no explicit start.
pub const DEFAULT_LOOK_BACK_HOURS: i64 = 2;

/// Default forecast look-ahead when an overlay declares no explicit end.
pub const DEFAULT_LOOK_AHEAD_HOURS: i64 = 12;

/// Which image variant a timestamp is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeKind {
    /// Measured data, strictly before the forecast boundary.
    Observation,
    /// Predicted data, at or after the forecast boundary.
    Forecast,
}

impl TimeKind {
    /// Classify a timestamp against the forecast boundary.
    #[must_use]
    pub fn classify(timestamp: i64, boundary: i64) -> Self {
        if timestamp < boundary {
            Self::Observation
        } else {
            Self::Forecast
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeKind::Observation => "observation",
            TimeKind::Forecast => "forecast",
        }
    }
}

/// Declared metadata of a map overlay, as supplied by the app configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayMetadata {
    /// Stable overlay identifier (e.g. "radar").
    pub id: String,

    /// Human readable title
    #[serde(default)]
    pub title: String,

    /// WMS layer serving measured imagery
    pub observation_layer: String,

    /// WMS layer serving predicted imagery; its time dimension defines the boundary
    pub forecast_layer: String,

    /// Explicit first selectable instant (unix seconds)
    #[serde(default)]
    pub observation_start: Option<i64>,

    /// Explicit last selectable instant (unix seconds)
    #[serde(default)]
    pub forecast_end: Option<i64>,

    /// Look-back used when `observation_start` is absent
    #[serde(default = "default_look_back_hours")]
    pub look_back_hours: i64,

    /// Look-ahead used when `forecast_end` is absent
    #[serde(default = "default_look_ahead_hours")]
    pub look_ahead_hours: i64,

    /// Playback tick interval for this overlay in milliseconds
    #[serde(default)]
    pub animation_interval_ms: Option<u64>,

    /// Overlay specific step, overriding the user selected step
    #[serde(default)]
    pub step_minutes: Option<u32>,
}

fn default_look_back_hours() -> i64 {
    DEFAULT_LOOK_BACK_HOURS
}

fn default_look_ahead_hours() -> i64 {
    DEFAULT_LOOK_AHEAD_HOURS
}

impl OverlayMetadata {
    /// Create an overlay that relies on the default look-back/look-ahead policy.
    pub fn new(
        id: impl Into<String>,
        observation_layer: impl Into<String>,
        forecast_layer: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            observation_layer: observation_layer.into(),
            forecast_layer: forecast_layer.into(),
            observation_start: None,
            forecast_end: None,
            look_back_hours: DEFAULT_LOOK_BACK_HOURS,
            look_ahead_hours: DEFAULT_LOOK_AHEAD_HOURS,
            animation_interval_ms: None,
            step_minutes: None,
        }
    }

    /// Pin explicit bounds instead of the look-back/look-ahead policy.
    #[must_use]
    pub fn with_bounds(mut self, observation_start: i64, forecast_end: i64) -> Self {
        self.observation_start = Some(observation_start);
        self.forecast_end = Some(forecast_end);
        self
    }

    #[must_use]
    pub fn with_animation_interval_ms(mut self, interval_ms: u64) -> Self {
        self.animation_interval_ms = Some(interval_ms);
        self
    }

    /// The WMS layer name serving the given variant.
    #[must_use]
    pub fn layer_for(&self, kind: TimeKind) -> &str {
        match kind {
            TimeKind::Observation => &self.observation_layer,
            TimeKind::Forecast => &self.forecast_layer,
        }
    }
}

/// Parameters of a WMS `GetMap` request, minus the layer and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WmsRequest {
    /// Service endpoint, without query string
    pub base_url: String,
    /// Coordinate reference system, e.g. "EPSG:3857"
    pub crs: String,
    /// Bounding box as `min_x,min_y,max_x,max_y` in `crs` units
    pub bbox: [f64; 4],
    pub width: u32,
    pub height: u32,
}

impl WmsRequest {
    /// Build the `GetMap` URL for one layer at one instant.
    #[must_use]
    pub fn image_url(&self, layer: &str, timestamp: i64) -> String {
        let [min_x, min_y, max_x, max_y] = self.bbox;
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}service=WMS&version=1.3.0&request=GetMap&layers={}&styles=&crs={}&bbox={},{},{},{}&width={}&height={}&format=image/png&transparent=true&time={}",
            self.base_url,
            separator,
            layer,
            self.crs,
            min_x,
            min_y,
            max_x,
            max_y,
            self.width,
            self.height,
            iso_instant(timestamp)
        )
    }
}

impl Default for WmsRequest {
    fn default() -> Self {
        Self {
            base_url: "https://openwms.fmi.fi/geoserver/wms".to_string(),
            crs: "EPSG:3857".to_string(),
            bbox: [2_000_000.0, 8_000_000.0, 3_800_000.0, 11_500_000.0],
            width: 512,
            height: 1024,
        }
    }
}

/// Format a unix instant as an RFC 3339 UTC string (`2024-05-01T12:00:00Z`).
///
/// Out-of-range instants format as the epoch.
#[must_use]
pub fn iso_instant(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}
