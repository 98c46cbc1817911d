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

//! WMS capabilities parsing.
//!
//! Extracts the temporal extent of a named layer from a WMS 1.1.1 or 1.3.0
//! `GetCapabilities` document. Layers nest, a layer is identified by its
//! direct `<Name>` child, and a layer without its own time dimension inherits
//! the one declared by its closest ancestor.

use chrono::DateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Result, TimelineError};

#[derive(Debug, Default)]
struct LayerFrame {
    name: Option<String>,
    time_extent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Nothing,
    Name,
    TimeExtent,
}

/// Resolve the first instant (unix seconds) of `layer`'s time dimension.
pub fn first_forecast_instant(xml: &str, layer: &str) -> Result<i64> {
    let extent = time_extent_for_layer(xml, layer)?;
    first_instant(&extent)
}

/// Return the raw time extent text declared for `layer`.
pub fn time_extent_for_layer(xml: &str, layer: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut elements: Vec<Vec<u8>> = Vec::new();
    let mut layers: Vec<LayerFrame> = Vec::new();
    let mut capture = Capture::Nothing;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                let in_layer = elements.last().is_some_and(|parent| parent == b"Layer");

                match local.as_slice() {
                    b"Layer" => layers.push(LayerFrame::default()),
                    b"Name" if in_layer => capture = Capture::Name,
                    b"Dimension" | b"Extent" if in_layer && is_time_dimension(&e) => {
                        capture = Capture::TimeExtent;
                    }
                    _ => capture = Capture::Nothing,
                }
                text.clear();
                elements.push(local);
            }
            Event::Text(t) if capture != Capture::Nothing => {
                text.push_str(&t.unescape()?);
            }
            Event::End(e) => {
                let local = e.local_name();
                let local = local.as_ref();

                if let Some(frame) = layers.last_mut() {
                    match capture {
                        Capture::Name if local == b"Name" => {
                            frame.name = Some(text.trim().to_string());
                        }
                        Capture::TimeExtent if local == b"Dimension" || local == b"Extent" => {
                            let extent = text.trim();
                            // WMS 1.1.1 splits the declaration: an empty <Dimension>
                            // followed by an <Extent> carrying the values.
                            if !extent.is_empty() {
                                frame.time_extent = Some(extent.to_string());
                            }
                        }
                        _ => {}
                    }
                }
                capture = Capture::Nothing;

                if local == b"Layer" {
                    if let Some(frame) = layers.pop() {
                        if frame.name.as_deref() == Some(layer) {
                            return frame
                                .time_extent
                                .or_else(|| layers.iter().rev().find_map(|f| f.time_extent.clone()))
                                .ok_or_else(|| TimelineError::MissingTimeDimension(layer.to_string()));
                        }
                    }
                }
                elements.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(TimelineError::LayerNotFound(layer.to_string()))
}

fn is_time_dimension(element: &BytesStart<'_>) -> bool {
    element.attributes().flatten().any(|attr| {
        attr.key.local_name().as_ref() == b"name" && attr.value.as_ref().eq_ignore_ascii_case(b"time")
    })
}

/// Parse the first instant of a WMS time extent.
///
/// Accepts `start/end/period`, comma separated instants and comma separated
/// intervals; only the leading instant matters.
pub fn first_instant(extent: &str) -> Result<i64> {
    let token = extent
        .split(',')
        .next()
        .and_then(|item| item.split('/').next())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| TimelineError::InvalidExtent(extent.to_string()))?;

    DateTime::parse_from_rfc3339(token)
        .map(|instant| instant.timestamp())
        .map_err(|source| TimelineError::InvalidInstant {
            value: token.to_string(),
            source,
        })
}
