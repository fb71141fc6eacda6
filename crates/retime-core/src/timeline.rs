//! Proportional timestamp mapping.
//!
//! A history spanning `[original_start, original_end]` is laid onto a new
//! timeline that starts at `start_timestamp` and lasts
//! `original_duration * ratio` seconds. Relative spacing between commits is
//! kept; only the scale and the anchor change.

use crate::date::{is_representable, seconds_to_days};
use crate::error::CompressError;
use serde::Serialize;

/// Scale factor applied to the original span.
///
/// Values below 1 compress, values above 1 stretch. An explicit ratio above
/// 1 is only accepted when expansion is opted into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CompressionRatio(f64);

impl CompressionRatio {
    /// Accept an explicit ratio in `(0, 1]`, or `(0, inf)` with `allow_expansion`.
    pub fn explicit(ratio: f64, allow_expansion: bool) -> Result<Self, CompressError> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(CompressError::config(format!(
                "compression ratio must be a positive number (got {ratio})"
            )));
        }
        if ratio > 1.0 && !allow_expansion {
            return Err(CompressError::config(format!(
                "compression ratio must be between 0 and 1 (got {ratio}); pass --allow-expansion to stretch the timeline"
            )));
        }
        Ok(Self(ratio))
    }

    /// `target_days / original_days`. Both must be positive.
    pub fn from_days(original_days: f64, target_days: f64) -> Result<Self, CompressError> {
        if !original_days.is_finite() || original_days <= 0.0 {
            return Err(CompressError::config(format!(
                "original days must be positive (got {original_days})"
            )));
        }
        if !target_days.is_finite() || target_days <= 0.0 {
            return Err(CompressError::config(format!(
                "target days must be positive (got {target_days})"
            )));
        }
        Ok(Self(target_days / original_days))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_expansion(self) -> bool {
        self.0 > 1.0
    }
}

impl std::fmt::Display for CompressionRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Derived bounds for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimelineMapping {
    pub original_start: i64,
    pub original_end: i64,
    pub compression_ratio: CompressionRatio,
    pub start_timestamp: i64,
}

impl TimelineMapping {
    /// Derive bounds from the original timestamps. `None` for an empty history.
    pub fn from_timestamps(
        timestamps: &[i64],
        compression_ratio: CompressionRatio,
        start_timestamp: i64,
    ) -> Option<Self> {
        let original_start = *timestamps.iter().min()?;
        let original_end = *timestamps.iter().max()?;
        Some(Self {
            original_start,
            original_end,
            compression_ratio,
            start_timestamp,
        })
    }

    pub fn original_duration(&self) -> i64 {
        self.original_end - self.original_start
    }

    pub fn target_duration(&self) -> f64 {
        self.original_duration() as f64 * self.compression_ratio.value()
    }

    pub fn original_days(&self) -> f64 {
        seconds_to_days(self.original_duration() as f64)
    }

    pub fn target_days(&self) -> f64 {
        seconds_to_days(self.target_duration())
    }

    /// Last instant of the new timeline.
    pub fn end_timestamp(&self) -> i64 {
        self.map(self.original_end)
    }

    /// New timestamp for an original one, floored to whole seconds.
    ///
    /// A zero-length history maps every commit onto `start_timestamp`.
    /// Results past the `i64` range saturate; [`TimelineMapping::check_range`]
    /// rejects them.
    pub fn map(&self, timestamp: i64) -> i64 {
        let original_duration = self.original_duration();
        if original_duration == 0 {
            return self.start_timestamp;
        }
        let elapsed = timestamp.saturating_sub(self.original_start) as f64;
        let offset = elapsed * self.target_duration() / original_duration as f64;
        // `as` saturates out-of-range floats.
        self.start_timestamp.saturating_add(offset.floor() as i64)
    }

    /// Fails when the new timeline ends outside the dates git and the
    /// formatter can represent, as a large expansion ratio can make it.
    pub fn check_range(&self) -> Result<(), CompressError> {
        let end = self.end_timestamp();
        if is_representable(self.start_timestamp) && is_representable(end) {
            Ok(())
        } else {
            Err(CompressError::Configuration(format!(
                "ratio {} maps a {:.1}-day history past the representable date range",
                self.compression_ratio,
                self.original_days()
            )))
        }
    }
}

/// Map every timestamp onto the new timeline in one go.
pub fn map_timestamps(
    timestamps: &[i64],
    start_timestamp: i64,
    compression_ratio: CompressionRatio,
) -> Vec<i64> {
    match TimelineMapping::from_timestamps(timestamps, compression_ratio, start_timestamp) {
        Some(mapping) => timestamps.iter().map(|&t| mapping.map(t)).collect(),
        None => Vec::new(),
    }
}
