//! Session clock: the live phase state machine.
//!
//! The clock is fed monotonic timestamps in seconds by its driver and never
//! reads time itself. Every transition returns the [`ClockEvent`]s it caused,
//! which the driver turns into sound.

use std::fmt;

use tracing::{debug, info};

use crate::error::{BreathError, Result};
use crate::settings::{PHASE_COUNT, PhaseSpec, SessionSettings};

/// Consecutive phase advances allowed in one poll or one advance call.
pub const MAX_CATCH_UP: usize = 8;

/// Suggested interval between polls.
pub const POLL_INTERVAL_SECONDS: f64 = 0.12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Finished,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
            RunState::Paused => write!(f, "paused"),
            RunState::Finished => write!(f, "finished"),
        }
    }
}

/// Something the driver has to act on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
    /// A phase began at `at`; its sound should start now.
    PhaseStarted {
        index: usize,
        phase: PhaseSpec,
        at: f64,
        ends_at: f64,
    },
    /// The target was reached; the session ends with the current cycle.
    StopScheduled { at: f64 },
    /// The last cycle completed.
    Finished { at: f64 },
}

/// Presentation snapshot for the status display.
#[derive(Debug, Clone, PartialEq)]
pub struct Readout {
    pub state: RunState,
    pub phase_label: Option<&'static str>,
    pub phase_remaining_seconds: f64,
    pub total_remaining_seconds: f64,
    pub stop_scheduled: bool,
}

impl Readout {
    pub fn phase_remaining(&self) -> String {
        format_clock(self.phase_remaining_seconds)
    }

    pub fn total_remaining(&self) -> String {
        format_clock(self.total_remaining_seconds)
    }
}

/// Format seconds as `MM:SS`, rounding partial seconds up.
pub fn format_clock(seconds: f64) -> String {
    // Shave float noise so 4.0000000001 s still reads as 00:04.
    let whole = (seconds - 1e-9).ceil().max(0.0) as u64;
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

#[derive(Debug, Clone)]
pub struct SessionClock {
    state: RunState,
    phases: Option<[PhaseSpec; PHASE_COUNT]>,
    phase_index: Option<usize>,
    phase_end_at: f64,
    session_start_at: f64,
    total_paused: f64,
    paused_at: f64,
    elapsed_when_paused: f64,
    target_seconds: f64,
    stop_after_cycle: bool,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClock {
    pub fn new() -> Self {
        SessionClock {
            state: RunState::Idle,
            phases: None,
            phase_index: None,
            phase_end_at: 0.0,
            session_start_at: 0.0,
            total_paused: 0.0,
            paused_at: 0.0,
            elapsed_when_paused: 0.0,
            target_seconds: 0.0,
            stop_after_cycle: false,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Running or paused.
    pub fn is_active(&self) -> bool {
        matches!(self.state, RunState::Running | RunState::Paused)
    }

    pub fn stop_scheduled(&self) -> bool {
        self.stop_after_cycle
    }

    pub fn phase_end_at(&self) -> f64 {
        self.phase_end_at
    }

    pub fn current_phase(&self) -> Option<PhaseSpec> {
        let phases = self.phases.as_ref()?;
        self.phase_index.map(|i| phases[i])
    }

    /// Begin a session at `now` and enter its first phase.
    pub fn start(&mut self, settings: &SessionSettings, now: f64) -> Result<Vec<ClockEvent>> {
        if self.is_active() {
            return Err(BreathError::InvalidState {
                action: "start",
                state: self.state,
            });
        }
        settings.validate()?;
        let phases = settings.phases();
        if phases.iter().all(|p| p.duration_seconds == 0) {
            return Err(BreathError::Configuration(
                "every phase has zero duration; the cycle can never advance".into(),
            ));
        }

        *self = SessionClock {
            state: RunState::Running,
            phases: Some(phases),
            session_start_at: now,
            target_seconds: settings.target_seconds(),
            ..SessionClock::new()
        };
        info!(rhythm = %settings.rhythm(), minutes = settings.total_minutes, "session started");

        let mut events = Vec::new();
        self.advance(now, &mut events);
        Ok(events)
    }

    /// Advance phases whose end time has passed.
    pub fn poll(&mut self, now: f64) -> Vec<ClockEvent> {
        let mut events = Vec::new();
        if self.state != RunState::Running {
            return events;
        }

        if self.elapsed(now) >= self.target_seconds && !self.stop_after_cycle {
            self.stop_after_cycle = true;
            debug!(at = now, "target reached, finishing current cycle");
            events.push(ClockEvent::StopScheduled { at: now });
        }

        let mut guard = 0;
        while now >= self.phase_end_at && self.state == RunState::Running && guard < MAX_CATCH_UP {
            guard += 1;
            if !self.advance(now, &mut events) {
                break;
            }
        }
        events
    }

    /// Enter the next phase with positive duration, or finish.
    fn advance(&mut self, now: f64, events: &mut Vec<ClockEvent>) -> bool {
        let Some(phases) = self.phases else {
            return false;
        };

        for _ in 0..MAX_CATCH_UP {
            let next = self.phase_index.map_or(0, |i| (i + 1) % PHASE_COUNT);
            if self.stop_after_cycle && next == 0 && self.phase_index.is_some() {
                self.finish(now, events);
                return false;
            }
            self.phase_index = Some(next);
            let phase = phases[next];
            if phase.duration_seconds == 0 {
                continue;
            }
            self.phase_end_at = now + phase.duration_seconds as f64;
            debug!(phase = phase.label, at = now, "phase started");
            events.push(ClockEvent::PhaseStarted {
                index: next,
                phase,
                at: now,
                ends_at: self.phase_end_at,
            });
            return true;
        }

        self.finish(now, events);
        false
    }

    fn finish(&mut self, now: f64, events: &mut Vec<ClockEvent>) {
        self.state = RunState::Finished;
        info!(at = now, "session finished");
        events.push(ClockEvent::Finished { at: now });
    }

    /// Freeze the session. Returns false unless it was running.
    pub fn pause(&mut self, now: f64) -> bool {
        if self.state != RunState::Running {
            return false;
        }
        self.elapsed_when_paused = self.elapsed(now);
        self.paused_at = now;
        self.state = RunState::Paused;
        debug!(at = now, "session paused");
        true
    }

    /// Continue a paused session, shifting the phase end by the pause length.
    pub fn resume(&mut self, now: f64) -> bool {
        if self.state != RunState::Paused {
            return false;
        }
        let delta = now - self.paused_at;
        self.total_paused += delta;
        self.phase_end_at += delta;
        self.paused_at = 0.0;
        self.state = RunState::Running;
        debug!(at = now, paused_for = delta, "session resumed");
        true
    }

    /// Drop all session state and return to idle.
    pub fn stop(&mut self) {
        if self.state != RunState::Idle {
            debug!(state = %self.state, "session stopped");
        }
        *self = SessionClock::new();
    }

    /// Session time excluding pauses. Frozen while paused.
    pub fn elapsed(&self, now: f64) -> f64 {
        match self.state {
            RunState::Idle => 0.0,
            RunState::Paused => self.elapsed_when_paused,
            RunState::Running | RunState::Finished => now - self.session_start_at - self.total_paused,
        }
    }

    pub fn total_remaining(&self, now: f64) -> f64 {
        if self.state == RunState::Idle {
            return 0.0;
        }
        (self.target_seconds - self.elapsed(now)).max(0.0)
    }

    pub fn phase_remaining(&self, now: f64) -> f64 {
        match self.state {
            RunState::Running => (self.phase_end_at - now).max(0.0),
            RunState::Paused => (self.phase_end_at - self.paused_at).max(0.0),
            RunState::Idle | RunState::Finished => 0.0,
        }
    }

    pub fn readout(&self, now: f64) -> Readout {
        let phase_label = match self.state {
            RunState::Running | RunState::Paused => self.current_phase().map(|p| p.label),
            RunState::Idle | RunState::Finished => None,
        };
        Readout {
            state: self.state,
            phase_label,
            phase_remaining_seconds: self.phase_remaining(now),
            total_remaining_seconds: self.total_remaining(now),
            stop_scheduled: self.stop_after_cycle,
        }
    }
}
