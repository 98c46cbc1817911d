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

//! Error taxonomy for the timeline engine.
//!
//! Nothing in the engine is fatal to a display session: these errors are
//! produced by the fallible inner steps and converted to a safe default
//! (fallback boundary, uncached entry) at the component boundary.

use thiserror::Error;

/// Errors raised while fetching or interpreting remote overlay resources.
#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected http status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("capabilities request for layer '{0}' timed out")]
    Timeout(String),

    #[error("expected an image from {url}, got '{content_type}'")]
    NotAnImage { content_type: String, url: String },

    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed capabilities document: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("layer '{0}' not found in capabilities document")]
    LayerNotFound(String),

    #[error("layer '{0}' declares no time dimension")]
    MissingTimeDimension(String),

    #[error("time extent is empty or malformed: '{0}'")]
    InvalidExtent(String),

    #[error("invalid instant '{value}': {source}")]
    InvalidInstant {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TimelineError>;
