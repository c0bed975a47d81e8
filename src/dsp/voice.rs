//! Voices: one rendered instance of a [`Sound`], and the arena holding them.

use super::filter::BiquadFilter;
use super::oscillator::Oscillator;
use super::recipe::{Layer, Sound, SoundKind};
use super::sampler::SamplePlayer;

/// First frame at or after time `t`.
pub fn to_frame(t: f64, sample_rate: f64) -> u64 {
    // Tolerate float noise from frame → seconds → frame round trips.
    (t * sample_rate - 1e-6).ceil().max(0.0) as u64
}

#[derive(Debug, Clone)]
enum LayerState {
    Tone {
        oscillator: Oscillator,
        filter: Option<BiquadFilter>,
    },
    Sample(SamplePlayer),
}

#[derive(Debug, Clone)]
struct LayerVoice {
    state: LayerState,
    start_frame: u64,
    stop_frame: u64,
}

/// Output of one voice for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoiceFrame {
    pub dry: f64,
    pub send: f64,
}

/// A scheduled sound being rendered frame by frame.
#[derive(Debug, Clone)]
pub struct SoundVoice {
    sound: Sound,
    layers: Vec<LayerVoice>,
    bus_filter: Option<BiquadFilter>,
    start_frame: u64,
    end_frame: u64,
}

impl SoundVoice {
    pub fn new(sound: Sound, sample_rate: f64) -> Self {
        let layers = sound
            .layers
            .iter()
            .map(|layer| {
                let state = match layer {
                    Layer::Tone(tone) => LayerState::Tone {
                        oscillator: Oscillator::new(tone.waveform, sample_rate),
                        filter: tone.filter.map(|f| {
                            BiquadFilter::new(f.filter_type, f.frequency, f.q, sample_rate)
                        }),
                    },
                    Layer::Sample(spec) => {
                        LayerState::Sample(SamplePlayer::new(&spec.buffer, spec.gain, sample_rate))
                    }
                };
                LayerVoice {
                    state,
                    start_frame: to_frame(layer.start(), sample_rate),
                    stop_frame: to_frame(layer.stop(), sample_rate),
                }
            })
            .collect::<Vec<_>>();
        let bus_filter = sound
            .bus_filter
            .map(|f| BiquadFilter::new(f.filter_type, f.frequency, f.q, sample_rate));
        let start_frame = layers.iter().map(|l| l.start_frame).min().unwrap_or(0);
        let end_frame = layers.iter().map(|l| l.stop_frame).max().unwrap_or(0);
        SoundVoice {
            sound,
            layers,
            bus_filter,
            start_frame,
            end_frame,
        }
    }

    pub fn kind(&self) -> SoundKind {
        self.sound.kind
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    /// Frame from which the voice is silent.
    pub fn end_frame(&self) -> u64 {
        self.end_frame
    }

    pub fn is_finished(&self, frame: u64) -> bool {
        frame >= self.end_frame
    }

    /// Render the frame at index `frame`, whose time is `t` seconds.
    #[inline]
    pub fn render(&mut self, frame: u64, t: f64) -> VoiceFrame {
        if frame < self.start_frame || frame >= self.end_frame {
            return VoiceFrame::default();
        }

        let mut sum = 0.0;
        for (layer, spec) in self.layers.iter_mut().zip(&self.sound.layers) {
            if frame < layer.start_frame || frame >= layer.stop_frame {
                continue;
            }
            match (&mut layer.state, spec) {
                (LayerState::Tone { oscillator, filter }, Layer::Tone(tone)) => {
                    let mut s = oscillator.next_sample(tone.frequency.value_at(t));
                    if let Some(filter) = filter {
                        s = filter.process(s);
                    }
                    sum += s * tone.gain.value_at(t);
                }
                (LayerState::Sample(player), Layer::Sample(sample)) => {
                    sum += player.next_sample(&sample.buffer);
                }
                _ => {}
            }
        }

        let mut bus = sum * self.sound.bus_gain;
        if let Some(filter) = self.bus_filter.as_mut() {
            bus = filter.process(bus);
        }
        VoiceFrame {
            dry: bus,
            send: bus * self.sound.reverb_send,
        }
    }
}

/// Generational handle to a voice in a [`VoiceArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    voice: Option<SoundVoice>,
}

/// In-flight voices. Handles go stale once their voice is removed, so a
/// late removal can never hit a newer voice in the same slot.
#[derive(Debug, Clone, Default)]
pub struct VoiceArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

impl VoiceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn insert(&mut self, voice: SoundVoice) -> VoiceId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.voice = Some(voice);
            return VoiceId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            voice: Some(voice),
        });
        VoiceId {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    pub fn get(&self, id: VoiceId) -> Option<&SoundVoice> {
        self.slots
            .get(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.voice.as_ref())
    }

    pub fn remove(&mut self, id: VoiceId) -> Option<SoundVoice> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        let voice = slot.voice.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(voice)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SoundVoice> {
        self.slots.iter_mut().filter_map(|s| s.voice.as_mut())
    }

    /// Remove every voice that is silent from `frame` on. Returns how many.
    pub fn reap(&mut self, frame: u64) -> usize {
        let mut reaped = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.voice.as_ref().is_some_and(|v| v.is_finished(frame)) {
                slot.voice = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index);
                reaped += 1;
            }
        }
        self.live -= reaped;
        reaped
    }

    /// Drop every voice.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.voice.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index);
            }
        }
        self.live = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::recipe::{exhale_sample, hold_drum, inhale_drop};
    use crate::dsp::sampler::SampleBuffer;
    use std::sync::Arc;

    const SR: f64 = 8000.0;

    fn render_all(voice: &mut SoundVoice, frames: u64) -> Vec<VoiceFrame> {
        (0..frames)
            .map(|n| voice.render(n, n as f64 / SR))
            .collect()
    }

    #[test]
    fn frame_conversion_tolerates_rounding() {
        assert_eq!(to_frame(4.0, 16000.0), 64000);
        assert_eq!(to_frame(64000.0 / 16000.0 + 1e-13, 16000.0), 64000);
        assert_eq!(to_frame(0.00001, 44100.0), 1);
        assert_eq!(to_frame(-1.0, 44100.0), 0);
    }

    #[test]
    fn voice_is_silent_outside_its_window() {
        let mut voice = SoundVoice::new(inhale_drop(0.5), SR);
        assert_eq!(voice.start_frame(), 4000);
        assert_eq!(voice.end_frame(), 12640);
        let out = render_all(&mut voice, 14000);
        assert!(out[..4000].iter().all(|f| f.dry == 0.0));
        assert!(out[12640..].iter().all(|f| f.dry == 0.0));
        let peak = out.iter().map(|f| f.dry.abs()).fold(0.0, f64::max);
        assert!(peak > 0.01 && peak < 1.0, "peak {peak}");
    }

    #[test]
    fn send_follows_the_recipe_level() {
        let mut voice = SoundVoice::new(hold_drum(0.0), SR);
        for f in render_all(&mut voice, 4000) {
            assert!((f.send - f.dry * 0.38).abs() < 1e-12);
        }
    }

    #[test]
    fn sample_voice_stops_at_the_cut() {
        let buffer = Arc::new(SampleBuffer::new(vec![1.0; 16000], 8000));
        let mut voice = SoundVoice::new(exhale_sample(0.0, 1.0, &buffer), SR);
        let out = render_all(&mut voice, 10000);
        assert!((out[7999].dry - 0.95).abs() < 1e-12);
        assert_eq!(out[8000].dry, 0.0);
        assert_eq!(out[0].send, 0.0);
    }

    #[test]
    fn arena_handles_go_stale() {
        let mut arena = VoiceArena::new();
        let a = arena.insert(SoundVoice::new(inhale_drop(0.0), SR));
        let b = arena.insert(SoundVoice::new(hold_drum(0.0), SR));
        assert_eq!(arena.len(), 2);

        assert!(arena.remove(a).is_some());
        assert!(arena.remove(a).is_none());
        let c = arena.insert(SoundVoice::new(hold_drum(1.0), SR));
        // Slot reused, old handle still dead.
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(c).map(SoundVoice::kind), Some(SoundKind::HoldDrum));
        assert!(arena.get(b).is_some());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn reap_removes_finished_voices() {
        let mut arena = VoiceArena::new();
        let early = arena.insert(SoundVoice::new(inhale_drop(0.0), SR));
        let late = arena.insert(SoundVoice::new(inhale_drop(5.0), SR));
        assert_eq!(arena.reap(1000), 0);
        assert_eq!(arena.reap(to_frame(1.08, SR)), 1);
        assert!(arena.get(early).is_none());
        assert!(arena.get(late).is_some());
        arena.clear();
        assert!(arena.is_empty());
        assert!(arena.get(late).is_none());
    }
}
