//! Audio engine: the session-scoped synthesis context.
//!
//! One engine exists per live session or per offline export. It owns the
//! in-flight voices, the shared reverb, the ambience bed and the master bus,
//! and renders interleaved f32 frames on demand. Time inside the engine is
//! the number of frames rendered so far; `now()` is that count in seconds.

use std::sync::Arc;

use tracing::{debug, trace};

use super::ambience::{AmbienceBed, AmbienceConfig, noise_loop};
use super::mixer::MasterBus;
use super::recipe::{self, Sound, SoundKind};
use super::reverb::{ReverbConfig, SpaceReverb};
use super::sampler::SampleBuffer;
use super::voice::{SoundVoice, VoiceArena, VoiceId};
use crate::settings::PhaseType;

/// Frames processed per block by batch renders.
pub const BLOCK_SIZE: usize = 128;

/// Fixed parameters of an engine instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub reverb: ReverbConfig,
    pub ambience: AmbienceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100,
            channels: 2,
            reverb: ReverbConfig::default(),
            ambience: AmbienceConfig::default(),
        }
    }
}

/// A recipe the engine was asked to play.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cue {
    pub sound: SoundKind,
    pub phase: PhaseType,
    pub at: f64,
    pub duration: f64,
}

pub struct AudioEngine {
    config: EngineConfig,
    sample_rate: f64,
    frame: u64,
    voices: VoiceArena,
    reverb: SpaceReverb,
    master: MasterBus,
    noise: Arc<Vec<f64>>,
    /// The running bed is last; earlier entries are fading out.
    ambience: Vec<AmbienceBed>,
    exhale: Option<Arc<SampleBuffer>>,
    cues: Vec<Cue>,
    cue_limit: Option<usize>,
}

impl AudioEngine {
    pub fn new(config: EngineConfig, volume: f64, muted: bool) -> Self {
        let sample_rate = config.sample_rate.max(1) as f64;
        let noise = noise_loop(config.ambience.loop_seconds, sample_rate, config.ambience.seed);
        debug!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            "audio engine created"
        );
        AudioEngine {
            config,
            sample_rate,
            frame: 0,
            voices: VoiceArena::new(),
            reverb: SpaceReverb::new(config.reverb, sample_rate),
            master: MasterBus::new(volume, muted, sample_rate),
            noise: Arc::new(noise),
            ambience: Vec::new(),
            exhale: None,
            cues: Vec::new(),
            cue_limit: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.config.channels.max(1) as usize
    }

    /// Frames rendered so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Engine time in seconds.
    pub fn now(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    /// Keep only the most recent `limit` cues. Unbounded by default.
    pub fn limit_cues(&mut self, limit: usize) {
        let limit = limit.max(1);
        self.cue_limit = Some(limit);
        if self.cues.len() > limit {
            self.cues.drain(..self.cues.len() - limit);
        }
    }

    pub fn set_exhale_sample(&mut self, sample: Option<Arc<SampleBuffer>>) {
        self.exhale = sample;
    }

    pub fn has_exhale_sample(&self) -> bool {
        self.exhale.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// Schedule the recipe for `phase` starting at `t0`.
    pub fn trigger(&mut self, phase: PhaseType, t0: f64, duration: f64) -> VoiceId {
        let sound = recipe::for_phase(phase, t0, duration, self.exhale.as_ref());
        if let Some(limit) = self.cue_limit {
            if self.cues.len() >= limit {
                self.cues.drain(..=self.cues.len() - limit);
            }
        }
        self.cues.push(Cue {
            sound: sound.kind,
            phase,
            at: t0,
            duration,
        });
        trace!(sound = %sound.kind, at = t0, duration, "cue scheduled");
        self.schedule(sound)
    }

    /// Schedule an arbitrary sound.
    pub fn schedule(&mut self, sound: Sound) -> VoiceId {
        self.voices.insert(SoundVoice::new(sound, self.sample_rate))
    }

    /// Cancel a scheduled or playing voice.
    pub fn cancel(&mut self, id: VoiceId) -> bool {
        self.voices.remove(id).is_some()
    }

    /// Recipes triggered so far, in trigger order.
    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// No voice is scheduled and no ambience bed is playing or fading.
    /// Only the reverb tail can still be sounding.
    pub fn is_quiet(&self) -> bool {
        self.voices.is_empty() && self.ambience.is_empty()
    }

    /// Start the ambience bed unless one is already running.
    pub fn start_ambience(&mut self) {
        if self.ambience_running() {
            return;
        }
        self.ambience.push(AmbienceBed::new(
            Arc::clone(&self.noise),
            &self.config.ambience,
            self.sample_rate,
        ));
        debug!(at = self.now(), "ambience started");
    }

    /// Fade the running bed out.
    pub fn stop_ambience(&mut self) {
        if let Some(bed) = self.ambience.last_mut().filter(|b| !b.is_fading()) {
            bed.fade_out();
            debug!(at = self.frame as f64 / self.sample_rate, "ambience stopping");
        }
    }

    pub fn ambience_running(&self) -> bool {
        self.ambience.last().is_some_and(|b| !b.is_fading())
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.master.set_volume(volume);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.master.set_muted(muted);
    }

    pub fn master(&self) -> &MasterBus {
        &self.master
    }

    /// Render interleaved frames into `out`. A trailing partial frame is
    /// left untouched.
    pub fn render_into(&mut self, out: &mut [f32]) {
        let channels = self.channels();
        for frame_out in out.chunks_exact_mut(channels) {
            let sample = self.next_frame() as f32;
            frame_out.fill(sample);
        }
        self.voices.reap(self.frame);
        self.ambience.retain(|b| !b.is_finished());
    }

    /// Render `frames` interleaved frames.
    pub fn render_frames(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.channels()];
        self.render_into(&mut out);
        out
    }

    fn next_frame(&mut self) -> f64 {
        let frame = self.frame;
        let t = frame as f64 / self.sample_rate;

        let mut dry = 0.0;
        let mut send = 0.0;
        for voice in self.voices.iter_mut() {
            let out = voice.render(frame, t);
            dry += out.dry;
            send += out.send;
        }
        for bed in self.ambience.iter_mut() {
            dry += bed.next_sample();
        }
        let wet = self.reverb.process(send);

        self.frame += 1;
        self.master.process(dry + wet)
    }

    /// Drop every voice and the ambience; silence the reverb.
    pub fn teardown(&mut self) {
        self.voices.clear();
        self.ambience.clear();
        self.reverb.clear();
        debug!(at = self.now(), "audio engine torn down");
    }
}
