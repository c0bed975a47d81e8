//! Offline renderer: a whole session into one buffer, faster than real time.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::engine::{AudioEngine, BLOCK_SIZE, Cue, EngineConfig};
use super::sampler::SampleBuffer;
use super::voice::to_frame;
use crate::error::{BreathError, Result};
use crate::settings::SessionSettings;
use crate::timeline::Timeline;

/// Interleaved f32 audio produced by an offline render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples, nominally in [-1, 1].
    pub samples: Vec<f32>,
}

impl RenderedBuffer {
    /// A buffer of silence.
    pub fn silence(sample_rate: u32, channels: u16, frames: usize) -> Self {
        RenderedBuffer {
            sample_rate,
            channels,
            samples: vec![0.0; frames * channels.max(1) as usize],
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }

    /// De-interleave one channel.
    pub fn channel(&self, index: usize) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        self.samples
            .iter()
            .skip(index)
            .step_by(channels)
            .copied()
            .collect()
    }
}

/// What the export is doing; shown next to the percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Preparing,
    BuildingTimeline,
    LoadingSample,
    Scheduling,
    Rendering,
    Encoding,
    Done,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderStage::Preparing => write!(f, "Preparing export"),
            RenderStage::BuildingTimeline => write!(f, "Building timeline"),
            RenderStage::LoadingSample => write!(f, "Loading exhale sample"),
            RenderStage::Scheduling => write!(f, "Scheduling sounds"),
            RenderStage::Rendering => write!(f, "Rendering audio"),
            RenderStage::Encoding => write!(f, "Encoding WAV"),
            RenderStage::Done => write!(f, "Export complete"),
        }
    }
}

/// Progress report emitted during an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderProgress {
    /// 0 to 100.
    pub percent: u8,
    pub stage: RenderStage,
}

impl RenderProgress {
    pub fn new(percent: u8, stage: RenderStage) -> Self {
        RenderProgress {
            percent: percent.min(100),
            stage,
        }
    }
}

const SCHEDULING_PERCENT: u8 = 44;
const RENDER_START_PERCENT: u8 = 52;
const RENDER_END_PERCENT: u8 = 94;

/// Renders timelines through the same engine the live session uses.
#[derive(Debug, Clone, Default)]
pub struct OfflineRenderer {
    config: EngineConfig,
}

impl OfflineRenderer {
    pub fn new(config: EngineConfig) -> Self {
        OfflineRenderer { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of frames a timeline renders to.
    pub fn frame_count(&self, timeline: &Timeline) -> Result<usize> {
        if self.config.sample_rate == 0 {
            return Err(BreathError::Configuration(
                "sample rate must be positive".into(),
            ));
        }
        let total = timeline.total_duration_seconds;
        if !total.is_finite() || total < 0.0 {
            return Err(BreathError::RenderFailure(format!(
                "invalid session length {total}"
            )));
        }
        let frames = (total * self.config.sample_rate as f64).ceil().max(1.0);
        let bytes = frames * self.config.channels.max(1) as f64 * 2.0 + 36.0;
        if bytes > u32::MAX as f64 {
            return Err(BreathError::RenderFailure(format!(
                "a {total} s session does not fit in a WAV file"
            )));
        }
        Ok(frames as usize)
    }

    /// Render every timeline event plus one ambience bed spanning the buffer.
    ///
    /// The master volume follows `settings`; mute only applies to live
    /// playback. Exhales use `exhale` when present and the swell otherwise.
    pub fn render(
        &self,
        settings: &SessionSettings,
        timeline: &Timeline,
        exhale: Option<Arc<SampleBuffer>>,
        on_progress: impl FnMut(RenderProgress),
    ) -> Result<RenderedBuffer> {
        self.render_with_cues(settings, timeline, exhale, on_progress)
            .map(|(buffer, _)| buffer)
    }

    /// Like [`render`](Self::render), also returning every recipe triggered.
    pub fn render_with_cues(
        &self,
        settings: &SessionSettings,
        timeline: &Timeline,
        exhale: Option<Arc<SampleBuffer>>,
        mut on_progress: impl FnMut(RenderProgress),
    ) -> Result<(RenderedBuffer, Vec<Cue>)> {
        let frames = self.frame_count(timeline)?;
        let channels = self.config.channels.max(1) as usize;
        let sample_rate = self.config.sample_rate as f64;

        on_progress(RenderProgress::new(SCHEDULING_PERCENT, RenderStage::Scheduling));
        let mut engine = AudioEngine::new(self.config, settings.master_volume(), false);
        engine.set_exhale_sample(exhale);
        engine.start_ambience();

        let mut events = timeline.events.clone();
        events.sort_by(|a, b| a.start_offset_seconds.total_cmp(&b.start_offset_seconds));

        info!(
            frames,
            events = events.len(),
            sample_rate = self.config.sample_rate,
            "offline render started"
        );
        on_progress(RenderProgress::new(RENDER_START_PERCENT, RenderStage::Rendering));

        let mut samples = vec![0.0_f32; frames * channels];
        let mut next_event = 0;
        let mut last_percent = RENDER_START_PERCENT;
        let mut block_start = 0;
        while block_start < frames {
            let block_end = (block_start + BLOCK_SIZE).min(frames);

            // Voices are inserted just before the block containing their start.
            while next_event < events.len()
                && to_frame(events[next_event].start_offset_seconds, sample_rate)
                    < block_end as u64
            {
                let event = &events[next_event];
                engine.trigger(
                    event.phase_type,
                    event.start_offset_seconds,
                    event.duration_seconds,
                );
                next_event += 1;
            }

            engine.render_into(&mut samples[block_start * channels..block_end * channels]);
            block_start = block_end;

            let span = (RENDER_END_PERCENT - RENDER_START_PERCENT) as usize;
            let percent = RENDER_START_PERCENT + (span * block_end / frames) as u8;
            if percent != last_percent {
                last_percent = percent;
                on_progress(RenderProgress::new(percent, RenderStage::Rendering));
            }
        }

        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(BreathError::RenderFailure(format!(
                "non-finite sample at frame {}",
                index / channels
            )));
        }

        debug!(cues = engine.cues().len(), "offline render finished");
        let buffer = RenderedBuffer {
            sample_rate: self.config.sample_rate,
            channels: self.config.channels.max(1),
            samples,
        };
        Ok((buffer, engine.cues().to_vec()))
    }
}
