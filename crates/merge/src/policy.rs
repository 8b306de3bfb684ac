//! Gap and duration thresholds for one alert.

use vigil_core::config::MergeConfig;
use vigil_core::{parse_period, AnomalyInterval};

use crate::error::{MergeError, Result};

pub const DEFAULT_MAX_GAP_MS: i64 = 2 * 3_600_000;
pub const DEFAULT_MAX_DURATION_MS: i64 = 7 * 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePolicy {
    pub max_gap_ms: i64,
    pub max_duration_ms: i64,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            max_gap_ms: DEFAULT_MAX_GAP_MS,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
        }
    }
}

impl MergePolicy {
    pub fn new(max_gap_ms: i64, max_duration_ms: i64) -> Self {
        Self {
            max_gap_ms,
            max_duration_ms,
        }
    }

    /// Alert-level overrides on top of process defaults. Empty strings count
    /// as unset.
    pub fn resolve(
        max_gap: Option<&str>,
        max_duration: Option<&str>,
        defaults: &MergeConfig,
    ) -> Result<Self> {
        let pick = |over: Option<&str>, default: &str| -> Result<i64> {
            let raw = over.filter(|s| !s.trim().is_empty()).unwrap_or(default);
            let ms = parse_period(raw)
                .map_err(|e| MergeError::InvalidPolicy(e.to_string()))?
                .num_milliseconds();
            if ms < 0 {
                return Err(MergeError::InvalidPolicy(format!("negative period '{raw}'")));
            }
            Ok(ms)
        };
        Ok(Self {
            max_gap_ms: pick(max_gap, &defaults.max_gap)?,
            max_duration_ms: pick(max_duration, &defaults.max_duration)?,
        })
    }

    /// `candidate` starts less than `max_gap` after `parent` ends, and either
    /// sits inside `parent` or keeps the merged span under `max_duration`.
    pub fn should_merge(&self, parent: &AnomalyInterval, candidate: &AnomalyInterval) -> bool {
        candidate.start_time.saturating_sub(parent.end_time) < self.max_gap_ms
            && (candidate.end_time <= parent.end_time
                || candidate.end_time.saturating_sub(parent.start_time) < self.max_duration_ms)
    }
}
