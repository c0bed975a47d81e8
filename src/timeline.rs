//! Timeline generator. Expands settings into the full list of phase events.
//!
//! The timeline always ends on a cycle boundary: once the configured total
//! is reached, the current cycle is allowed to finish.

use serde::{Deserialize, Serialize};

use crate::error::{BreathError, Result};
use crate::settings::{PhaseKey, PhaseType, SessionSettings};

/// Upper bound on cycles walked before giving up.
pub const MAX_CYCLES: usize = 100_000;

/// A phase occurrence at a known offset into the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub start_offset_seconds: f64,
    pub phase_type: PhaseType,
    pub key: PhaseKey,
    pub duration_seconds: f64,
}

impl TimelineEvent {
    pub fn end_offset_seconds(&self) -> f64 {
        self.start_offset_seconds + self.duration_seconds
    }
}

/// Output of [`build_timeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    /// All events sorted by start offset.
    pub events: Vec<TimelineEvent>,
    /// Actual session length, rounded up to whole cycles.
    pub total_duration_seconds: f64,
}

impl Timeline {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Walk the phase cycle until the configured total is covered.
pub fn build_timeline(settings: &SessionSettings) -> Result<Timeline> {
    let phases = settings.phases();
    if phases.iter().all(|p| p.duration_seconds == 0) {
        return Err(BreathError::Configuration(
            "every phase has zero duration; the cycle can never advance".into(),
        ));
    }

    let target = settings.target_seconds();
    let mut events = Vec::new();
    let mut elapsed = 0.0_f64;
    let mut stop_after_cycle = false;

    for _ in 0..MAX_CYCLES {
        for (index, phase) in phases.iter().enumerate() {
            if stop_after_cycle && index == 0 && elapsed > 0.0 {
                return Ok(Timeline {
                    events,
                    total_duration_seconds: elapsed,
                });
            }
            if phase.duration_seconds == 0 {
                continue;
            }
            let duration = phase.duration_seconds as f64;
            events.push(TimelineEvent {
                start_offset_seconds: elapsed,
                phase_type: phase.phase_type,
                key: phase.key,
                duration_seconds: duration,
            });
            elapsed += duration;
            if elapsed >= target {
                stop_after_cycle = true;
            }
        }
    }

    // The stop rule fires on the first cycle boundary after the target, so
    // reaching here means the target exceeds MAX_CYCLES cycles.
    if stop_after_cycle {
        return Ok(Timeline {
            events,
            total_duration_seconds: elapsed,
        });
    }
    Err(BreathError::Configuration(format!(
        "a {}-minute session needs more than {MAX_CYCLES} cycles",
        settings.total_minutes
    )))
}
