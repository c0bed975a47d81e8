//! Live session driver.
//!
//! [`LiveSession`] glues a [`SessionClock`] to an [`AudioEngine`] and an
//! [`AudioSink`]. The caller ticks it roughly every
//! [`POLL_INTERVAL_SECONDS`](crate::clock::POLL_INTERVAL_SECONDS); each tick
//! renders audio up to the present (plus the lookahead) and then lets the
//! clock advance. Sounds for a new phase are triggered at the engine's write
//! head, which sits one lookahead past the clock reading for every phase
//! including the first, so the live cue offsets are the timeline offsets
//! shifted by a constant.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::assets::{AssetConfig, load_exhale};
use crate::clock::{ClockEvent, Readout, RunState, SessionClock};
use crate::dsp::engine::{AudioEngine, Cue, EngineConfig};
use crate::dsp::sampler::SampleBuffer;
use crate::error::{BreathError, Result};
use crate::output::AudioSink;
use crate::settings::SessionSettings;

/// Frames rendered per sink write.
const PUMP_CHUNK_FRAMES: usize = 4096;

/// Default distance between the engine's write head and the wall clock.
pub const DEFAULT_LOOKAHEAD_SECONDS: f64 = 0.25;

/// Cues kept for inspection while a session runs.
pub const LIVE_CUE_HISTORY: usize = 64;

/// Reverb ring-out kept after the last voice of a finished session.
const RELEASE_SECONDS: f64 = 3.0;

/// A monotonic time source in seconds.
pub trait Timebase {
    fn now(&self) -> f64;
}

/// Wall-clock seconds since creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimebase {
    origin: Instant,
}

impl MonotonicTimebase {
    pub fn new() -> Self {
        MonotonicTimebase {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimebase {
    fn default() -> Self {
        Self::new()
    }
}

impl Timebase for MonotonicTimebase {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to. For headless runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualTimebase {
    now: f64,
}

impl ManualTimebase {
    pub fn new(now: f64) -> Self {
        ManualTimebase { now }
    }

    pub fn set(&mut self, now: f64) {
        self.now = now;
    }

    pub fn advance(&mut self, seconds: f64) {
        self.now += seconds;
    }
}

impl Timebase for ManualTimebase {
    fn now(&self) -> f64 {
        self.now
    }
}

pub struct LiveSession<S: AudioSink, T: Timebase> {
    settings: SessionSettings,
    assets: AssetConfig,
    engine_config: EngineConfig,
    sink: S,
    timebase: T,
    clock: SessionClock,
    engine: Option<AudioEngine>,
    /// Timebase reading at engine frame zero.
    origin: f64,
    lookahead: f64,
    /// Engine time at which a finished session went quiet.
    quiet_since: Option<f64>,
    /// Loaded on first start and kept for later sessions.
    exhale: Option<Option<Arc<SampleBuffer>>>,
    scratch: Vec<f32>,
}

impl<S: AudioSink, T: Timebase> LiveSession<S, T> {
    /// The engine runs at the sink's rate and channel count; the rest of
    /// `engine_config` is kept.
    pub fn new(
        settings: SessionSettings,
        assets: AssetConfig,
        engine_config: EngineConfig,
        sink: S,
        timebase: T,
    ) -> Self {
        let engine_config = EngineConfig {
            sample_rate: sink.sample_rate(),
            channels: sink.channels(),
            ..engine_config
        };
        LiveSession {
            settings,
            assets,
            engine_config,
            sink,
            timebase,
            clock: SessionClock::new(),
            engine: None,
            origin: 0.0,
            lookahead: DEFAULT_LOOKAHEAD_SECONDS,
            quiet_since: None,
            exhale: None,
            scratch: Vec::new(),
        }
    }

    pub fn with_lookahead(mut self, seconds: f64) -> Self {
        self.lookahead = seconds.max(0.0);
        self
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Replace the settings used by the next start.
    pub fn set_settings(&mut self, settings: SessionSettings) -> Result<()> {
        if self.clock.is_active() {
            return Err(BreathError::InvalidState {
                action: "change settings",
                state: self.clock.state(),
            });
        }
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    pub fn state(&self) -> RunState {
        self.clock.state()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn timebase(&self) -> &T {
        &self.timebase
    }

    pub fn timebase_mut(&mut self) -> &mut T {
        &mut self.timebase
    }

    /// The most recent recipes triggered in the current session.
    pub fn cues(&self) -> &[Cue] {
        self.engine
            .as_ref()
            .map(AudioEngine::cues)
            .unwrap_or_default()
    }

    /// Start a session now. Fails if one is active, the settings are
    /// invalid, or the output cannot be resumed; no phase starts then.
    pub fn start(&mut self) -> Result<Vec<ClockEvent>> {
        if self.clock.is_active() {
            return Err(BreathError::InvalidState {
                action: "start",
                state: self.clock.state(),
            });
        }
        self.settings.validate()?;
        self.sink.resume()?;

        let exhale = self
            .exhale
            .get_or_insert_with(|| load_exhale(&self.assets))
            .clone();
        let mut engine = AudioEngine::new(
            self.engine_config,
            self.settings.master_volume(),
            self.settings.mute,
        );
        engine.set_exhale_sample(exhale);
        engine.limit_cues(LIVE_CUE_HISTORY);

        let now = self.timebase.now();
        let events = self.clock.start(&self.settings, now)?;
        engine.start_ambience();
        self.engine = Some(engine);
        self.origin = now;
        self.quiet_since = None;
        // Fill the lookahead first so the opening phase lands on the write
        // head like every later one.
        if let Err(e) = self.pump(now) {
            self.stop();
            return Err(e);
        }
        info!(
            lookahead = self.lookahead,
            sample_rate = self.engine_config.sample_rate,
            "live session started"
        );
        self.apply(&events);
        Ok(events)
    }

    /// Render audio up to now and advance the clock.
    pub fn tick(&mut self) -> Result<Vec<ClockEvent>> {
        let now = self.timebase.now();
        self.pump(now)?;
        let events = self.clock.poll(now);
        self.apply(&events);
        self.release_if_done();
        Ok(events)
    }

    /// Whether an engine exists: from start until stop, or until a finished
    /// session has rung out.
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Drop the engine of a finished session once it has gone quiet and the
    /// reverb has had time to decay.
    fn release_if_done(&mut self) {
        if self.clock.state() != RunState::Finished {
            return;
        }
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        if !engine.is_quiet() {
            self.quiet_since = None;
            return;
        }
        let now = engine.now();
        let since = *self.quiet_since.get_or_insert(now);
        if now - since >= RELEASE_SECONDS {
            self.engine = None;
            self.quiet_since = None;
            debug!(at = now, "finished session released its engine");
        }
    }

    /// Pause the session and silence the ambience. Returns false unless running.
    pub fn pause(&mut self) -> Result<bool> {
        let now = self.timebase.now();
        self.pump(now)?;
        if !self.clock.pause(now) {
            return Ok(false);
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.stop_ambience();
        }
        Ok(true)
    }

    /// Resume a paused session. Returns false unless paused.
    pub fn resume(&mut self) -> Result<bool> {
        if self.clock.state() != RunState::Paused {
            return Ok(false);
        }
        self.sink.resume()?;
        let now = self.timebase.now();
        self.pump(now)?;
        self.clock.resume(now);
        if let Some(engine) = self.engine.as_mut() {
            engine.start_ambience();
        }
        Ok(true)
    }

    /// Stop immediately; every sound is cut and the engine dropped.
    pub fn stop(&mut self) {
        self.clock.stop();
        self.quiet_since = None;
        if let Some(mut engine) = self.engine.take() {
            engine.teardown();
            info!(cues = engine.cues().len(), "live session stopped");
        }
    }

    /// Set the volume (0 to 100); ramps if a session is running.
    pub fn set_volume(&mut self, volume: u32) {
        self.settings.volume = volume.min(100);
        if let Some(engine) = self.engine.as_mut() {
            engine.set_volume(self.settings.master_volume());
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.settings.mute = muted;
        if let Some(engine) = self.engine.as_mut() {
            engine.set_muted(muted);
        }
    }

    pub fn readout(&self) -> Readout {
        self.clock.readout(self.timebase.now())
    }

    fn apply(&mut self, events: &[ClockEvent]) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        for event in events {
            match *event {
                ClockEvent::PhaseStarted { phase, .. } => {
                    let t0 = engine.now();
                    engine.trigger(phase.phase_type, t0, phase.duration_seconds as f64);
                }
                ClockEvent::StopScheduled { .. } => {}
                ClockEvent::Finished { at } => {
                    engine.stop_ambience();
                    debug!(at, "ambience released, tails ring out");
                }
            }
        }
    }

    /// Render frames until the engine reaches `now + lookahead`.
    fn pump(&mut self, now: f64) -> Result<()> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        let rate = engine.sample_rate() as f64;
        let target = ((now - self.origin + self.lookahead) * rate).floor().max(0.0) as u64;
        let channels = engine.channels();
        while engine.frame() < target {
            let frames = ((target - engine.frame()) as usize).min(PUMP_CHUNK_FRAMES);
            self.scratch.resize(frames * channels, 0.0);
            engine.render_into(&mut self.scratch);
            self.sink.write(&self.scratch)?;
        }
        Ok(())
    }
}
