//! Sound recipes, one per phase type.
//!
//! A recipe is a pure function of a time origin and a phase duration. It
//! returns a fully scheduled [`Sound`]; nothing is rendered here. The live
//! session passes "now" as the origin, the offline renderer passes the
//! event's offset, and both hand the result to the same engine.

use std::fmt;
use std::sync::Arc;

use super::automation::{Automation, SILENCE_FLOOR};
use super::filter::FilterType;
use super::oscillator::Waveform;
use super::sampler::SampleBuffer;
use crate::settings::PhaseType;

/// Frequency of an oscillator before its first scheduled value.
pub const DEFAULT_OSCILLATOR_HZ: f64 = 440.0;

/// Reverb send of the inhale and hold strikes.
pub const STRIKE_SEND: f64 = 0.38;
/// Reverb send of the synthesized exhale.
pub const SWELL_SEND: f64 = 0.26;
/// Playback gain of the recorded exhale.
pub const EXHALE_SAMPLE_GAIN: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundKind {
    InhaleDrop,
    HoldDrum,
    ExhaleSample,
    ExhaleSwell,
}

impl fmt::Display for SoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundKind::InhaleDrop => write!(f, "inhale-drop"),
            SoundKind::HoldDrum => write!(f, "hold-drum"),
            SoundKind::ExhaleSample => write!(f, "exhale-sample"),
            SoundKind::ExhaleSwell => write!(f, "exhale-swell"),
        }
    }
}

/// Static biquad settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,
}

/// Oscillator → optional filter → gain.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneSpec {
    pub waveform: Waveform,
    pub frequency: Automation,
    pub filter: Option<FilterSpec>,
    pub gain: Automation,
    pub start: f64,
    pub stop: f64,
}

/// A recorded buffer played once at a fixed gain, cut at `stop`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSpec {
    pub buffer: Arc<SampleBuffer>,
    pub gain: f64,
    pub start: f64,
    pub stop: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Tone(ToneSpec),
    Sample(SampleSpec),
}

impl Layer {
    pub fn start(&self) -> f64 {
        match self {
            Layer::Tone(t) => t.start,
            Layer::Sample(s) => s.start,
        }
    }

    pub fn stop(&self) -> f64 {
        match self {
            Layer::Tone(t) => t.stop,
            Layer::Sample(s) => s.stop,
        }
    }
}

/// A fully scheduled sound: layers summed into a bus, optionally filtered,
/// then sent to the master at unity and to the reverb at `reverb_send`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sound {
    pub kind: SoundKind,
    pub layers: Vec<Layer>,
    pub bus_gain: f64,
    pub bus_filter: Option<FilterSpec>,
    pub reverb_send: f64,
}

impl Sound {
    pub fn start_time(&self) -> f64 {
        self.layers
            .iter()
            .map(Layer::start)
            .fold(f64::INFINITY, f64::min)
    }

    /// Time after which every layer is silent.
    pub fn end_time(&self) -> f64 {
        self.layers
            .iter()
            .map(Layer::stop)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Fast attack to `peak`, exponential decay to silence.
fn strike_envelope(t0: f64, peak: f64, attack: f64, decay_end: f64) -> Automation {
    Automation::new(1.0)
        .set_value_at(SILENCE_FLOOR, t0)
        .linear_ramp_to(peak, t0 + attack)
        .exponential_ramp_to(SILENCE_FLOOR, t0 + decay_end)
}

fn sweep(t0: f64, from: f64, from_at: f64, to: f64, to_at: f64) -> Automation {
    Automation::new(DEFAULT_OSCILLATOR_HZ)
        .set_value_at(from, t0 + from_at)
        .exponential_ramp_to(to, t0 + to_at)
}

/// Inhale: a bright band-passed drop over a triangle tail.
pub fn inhale_drop(t0: f64) -> Sound {
    let drop = ToneSpec {
        waveform: Waveform::Sine,
        frequency: sweep(t0, 980.0, 0.0, 410.0, 0.2),
        filter: Some(FilterSpec {
            filter_type: FilterType::Bandpass,
            frequency: 1050.0,
            q: 7.5,
        }),
        gain: strike_envelope(t0, 0.3, 0.01, 0.32),
        start: t0,
        stop: t0 + 0.34,
    };
    let tail = ToneSpec {
        waveform: Waveform::Triangle,
        frequency: sweep(t0, 560.0, 0.02, 300.0, 1.0),
        filter: None,
        gain: strike_envelope(t0, 0.13, 0.04, 1.05),
        start: t0,
        stop: t0 + 1.08,
    };
    Sound {
        kind: SoundKind::InhaleDrop,
        layers: vec![Layer::Tone(drop), Layer::Tone(tail)],
        bus_gain: 1.0,
        bus_filter: None,
        reverb_send: STRIKE_SEND,
    }
}

/// Hold: a low triangle strike with a sine resonance, darkened by a low-pass.
pub fn hold_drum(t0: f64) -> Sound {
    let strike = ToneSpec {
        waveform: Waveform::Triangle,
        frequency: sweep(t0, 190.0, 0.0, 82.0, 0.2),
        filter: None,
        gain: strike_envelope(t0, 0.3, 0.01, 0.32),
        start: t0,
        stop: t0 + 0.34,
    };
    let resonance = ToneSpec {
        waveform: Waveform::Sine,
        frequency: sweep(t0, 120.0, 0.02, 68.0, 1.0),
        filter: None,
        gain: strike_envelope(t0, 0.13, 0.04, 1.05),
        start: t0,
        stop: t0 + 1.08,
    };
    Sound {
        kind: SoundKind::HoldDrum,
        layers: vec![Layer::Tone(strike), Layer::Tone(resonance)],
        bus_gain: 1.0,
        bus_filter: Some(FilterSpec {
            filter_type: FilterType::Lowpass,
            frequency: 340.0,
            q: 1.05,
        }),
        reverb_send: STRIKE_SEND,
    }
}

/// Exhale: the recorded breath, cut at the end of the phase.
pub fn exhale_sample(t0: f64, duration: f64, buffer: &Arc<SampleBuffer>) -> Sound {
    let natural_end = t0 + buffer.duration_seconds();
    let stop = if duration > 0.0 {
        (t0 + duration).min(natural_end)
    } else {
        natural_end
    };
    Sound {
        kind: SoundKind::ExhaleSample,
        layers: vec![Layer::Sample(SampleSpec {
            buffer: Arc::clone(buffer),
            gain: EXHALE_SAMPLE_GAIN,
            start: t0,
            stop,
        })],
        bus_gain: 1.0,
        bus_filter: None,
        reverb_send: 0.0,
    }
}

/// Exhale without a recording: two falling tones swelling in and fading out
/// over the phase.
pub fn exhale_swell(t0: f64, duration: f64) -> Sound {
    let duration = if duration > 0.0 { duration } else { 1.8 };
    let safe = duration.clamp(0.4, 20.0);
    let attack = (safe * 0.22).min(0.2);
    let release = t0 + safe;

    let envelope = |peak: f64, attack_at: f64| {
        Automation::new(1.0)
            .set_value_at(SILENCE_FLOOR, t0)
            .linear_ramp_to(peak, t0 + attack_at)
            .exponential_ramp_to(SILENCE_FLOOR, release)
    };
    let glide = |from: f64, to: f64| {
        Automation::new(DEFAULT_OSCILLATOR_HZ)
            .set_value_at(from, t0)
            .exponential_ramp_to(to, release)
    };

    let tone = ToneSpec {
        waveform: Waveform::Sine,
        frequency: glide(620.0, 430.0),
        filter: None,
        gain: envelope(0.2, attack),
        start: t0,
        stop: release + 0.03,
    };
    let shimmer = ToneSpec {
        waveform: Waveform::Triangle,
        frequency: glide(940.0, 620.0),
        filter: None,
        gain: envelope(0.08, attack * 0.85),
        start: t0,
        stop: release + 0.03,
    };
    Sound {
        kind: SoundKind::ExhaleSwell,
        layers: vec![Layer::Tone(tone), Layer::Tone(shimmer)],
        bus_gain: 0.92,
        bus_filter: Some(FilterSpec {
            filter_type: FilterType::Lowpass,
            frequency: 2200.0,
            q: 0.8,
        }),
        reverb_send: SWELL_SEND,
    }
}

/// The recipe for a phase. Exhales use the recording when one is loaded.
pub fn for_phase(
    phase: PhaseType,
    t0: f64,
    duration: f64,
    exhale: Option<&Arc<SampleBuffer>>,
) -> Sound {
    match phase {
        PhaseType::Inhale => inhale_drop(t0),
        PhaseType::Hold => hold_drum(t0),
        PhaseType::Exhale => match exhale {
            Some(buffer) if !buffer.is_empty() => exhale_sample(t0, duration, buffer),
            _ => exhale_swell(t0, duration),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tones(sound: &Sound) -> Vec<&ToneSpec> {
        sound
            .layers
            .iter()
            .filter_map(|l| match l {
                Layer::Tone(t) => Some(t),
                Layer::Sample(_) => None,
            })
            .collect()
    }

    #[test]
    fn recipes_are_pure_in_their_origin() {
        let a = inhale_drop(0.0);
        let b = inhale_drop(12.5);
        let (ta, tb) = (tones(&a), tones(&b));
        for (x, y) in ta.iter().zip(&tb) {
            assert_relative_eq!(x.start + 12.5, y.start);
            assert_relative_eq!(x.stop + 12.5, y.stop);
            for dt in [0.0, 0.005, 0.05, 0.3, 0.9] {
                assert_relative_eq!(
                    x.frequency.value_at(dt),
                    y.frequency.value_at(12.5 + dt),
                    max_relative = 1e-9
                );
                assert_relative_eq!(
                    x.gain.value_at(dt),
                    y.gain.value_at(12.5 + dt),
                    max_relative = 1e-9
                );
            }
        }
        assert_eq!(a, inhale_drop(0.0));
    }

    #[test]
    fn inhale_drop_shape() {
        let s = inhale_drop(2.0);
        assert_eq!(s.kind, SoundKind::InhaleDrop);
        assert_eq!(s.reverb_send, STRIKE_SEND);
        let t = tones(&s);
        assert_eq!(t[0].waveform, Waveform::Sine);
        assert_eq!(t[0].frequency.value_at(2.0), 980.0);
        assert_eq!(t[0].frequency.value_at(2.5), 410.0);
        assert_eq!(t[0].filter.map(|f| f.filter_type), Some(FilterType::Bandpass));
        assert_relative_eq!(t[0].gain.value_at(2.0 + 0.01), 0.3, max_relative = 1e-6);
        // The tail holds the default pitch until its first scheduled value.
        assert_eq!(t[1].frequency.value_at(2.015), DEFAULT_OSCILLATOR_HZ);
        assert_relative_eq!(t[1].frequency.value_at(2.0 + 0.02), 560.0, max_relative = 1e-6);
        assert_relative_eq!(s.end_time(), 3.08);
        assert_eq!(s.start_time(), 2.0);
    }

    #[test]
    fn hold_drum_is_low_passed() {
        let s = hold_drum(0.0);
        let t = tones(&s);
        assert_eq!(t[0].waveform, Waveform::Triangle);
        assert_eq!(t[0].frequency.value_at(0.0), 190.0);
        assert_eq!(t[1].frequency.value_at(1.5), 68.0);
        let filter = s.bus_filter.unwrap();
        assert_eq!(filter.filter_type, FilterType::Lowpass);
        assert_eq!(filter.frequency, 340.0);
    }

    #[test]
    fn swell_scales_with_duration() {
        let s = exhale_swell(10.0, 6.0);
        let t = tones(&s);
        // attack = min(0.2, 6 * 0.22)
        assert_relative_eq!(t[0].gain.value_at(10.2), 0.2, max_relative = 1e-6);
        assert_relative_eq!(t[1].gain.value_at(10.17), 0.08, max_relative = 1e-6);
        assert_eq!(t[0].frequency.value_at(16.0), 430.0);
        assert_relative_eq!(s.end_time(), 16.03);
        assert_eq!(s.bus_gain, 0.92);
        assert_eq!(s.reverb_send, SWELL_SEND);
    }

    #[test]
    fn swell_duration_is_clamped() {
        let short = exhale_swell(0.0, 0.1);
        assert_relative_eq!(short.end_time(), 0.43);
        // attack = 0.4 * 0.22
        assert_relative_eq!(tones(&short)[0].gain.value_at(0.088), 0.2, max_relative = 1e-6);

        let long = exhale_swell(0.0, 60.0);
        assert_relative_eq!(long.end_time(), 20.03);
    }

    #[test]
    fn exhale_sample_is_cut_at_phase_end() {
        let buffer = Arc::new(SampleBuffer::new(vec![0.5; 8000 * 10], 8000));
        let s = exhale_sample(4.0, 6.0, &buffer);
        assert_eq!(s.kind, SoundKind::ExhaleSample);
        assert_eq!(s.end_time(), 10.0);
        assert_eq!(s.reverb_send, 0.0);

        let short = Arc::new(SampleBuffer::new(vec![0.5; 8000], 8000));
        assert_eq!(exhale_sample(4.0, 6.0, &short).end_time(), 5.0);
    }

    #[test]
    fn phase_dispatch_prefers_the_recording() {
        let buffer = Arc::new(SampleBuffer::new(vec![0.1; 100], 100));
        let empty = Arc::new(SampleBuffer::new(Vec::new(), 100));
        assert_eq!(
            for_phase(PhaseType::Inhale, 0.0, 4.0, None).kind,
            SoundKind::InhaleDrop
        );
        assert_eq!(
            for_phase(PhaseType::Hold, 0.0, 4.0, Some(&buffer)).kind,
            SoundKind::HoldDrum
        );
        assert_eq!(
            for_phase(PhaseType::Exhale, 0.0, 4.0, Some(&buffer)).kind,
            SoundKind::ExhaleSample
        );
        assert_eq!(
            for_phase(PhaseType::Exhale, 0.0, 4.0, Some(&empty)).kind,
            SoundKind::ExhaleSwell
        );
        assert_eq!(
            for_phase(PhaseType::Exhale, 0.0, 4.0, None).kind,
            SoundKind::ExhaleSwell
        );
    }
}
