//! Tolerances and limits of a conflation run

use crate::{Result, SmoothieError};
use chrono::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for a conflation run
///
/// Distances are in meters, areas in square kilometers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct Config {
    /// Width of the corridor around the reference; also the fetch buffer.
    /// Vertices farther than this from the reference are never pulled.
    pub buffer_width: f64,
    /// Area cap for a single fetch rectangle
    pub max_area: f64,
    /// Vertices within this distance of a reference vertex snap onto it
    pub snap_radius: f64,
    /// Untagged vertices closer than this to a reference vertex are left alone,
    /// and edge midpoints farther than this from the reference get a new vertex
    pub max_distance: f64,
    /// Vertices already within this distance of the reference line are not pulled
    pub max_error: f64,
    /// Edges shorter than this are never split
    pub min_segment_length: f64,
    /// Radius of the random offset applied to touched vertices (0 disables it)
    pub variance: f64,
    /// Vertices edited within this window count as recently modified
    #[cfg_attr(feature = "serde", serde(with = "duration_seconds"))]
    pub recent_window: Duration,
    /// Warn when more than this many recently modified vertices are found
    pub recent_warn_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_width: 50.0,
            max_area: 25.0,
            snap_radius: 2.0,
            max_distance: 20.0,
            max_error: 0.5,
            min_segment_length: 10.0,
            variance: 0.2,
            recent_window: Duration::hours(24),
            recent_warn_threshold: 2,
        }
    }
}

impl Config {
    /// Reject tolerances that would make the run meaningless
    pub fn validate(&self) -> Result<()> {
        let distances = [
            ("buffer_width", self.buffer_width),
            ("snap_radius", self.snap_radius),
            ("max_distance", self.max_distance),
            ("max_error", self.max_error),
            ("min_segment_length", self.min_segment_length),
            ("variance", self.variance),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(SmoothieError::InvalidConfig(format!(
                    "{name} must be a finite, non-negative distance, got {value}"
                )));
            }
        }

        if !self.max_area.is_finite() || self.max_area <= 0.0 {
            return Err(SmoothieError::InvalidConfig(format!(
                "max_area must be positive, got {}",
                self.max_area
            )));
        }

        Ok(())
    }
}

#[cfg(feature = "serde")]
mod duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::seconds)
    }
}
