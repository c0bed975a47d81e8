//! Ambience bed: a looped, band-limited noise wash with a slow flutter.

use std::f64::consts::PI;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::filter::{BiquadFilter, FilterType};
use super::mixer::Smoothed;

/// Shortest loop the generator will produce, in seconds.
pub const MIN_LOOP_SECONDS: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbienceConfig {
    pub loop_seconds: f64,
    pub highpass_hz: f64,
    pub lowpass_hz: f64,
    pub flutter_hz: f64,
    /// Flutter amplitude as a fraction of `level`.
    pub flutter_depth: f64,
    /// Gain under the master bus.
    pub level: f64,
    pub fade_time_constant: f64,
    pub fade_stop_seconds: f64,
    pub seed: u64,
}

impl Default for AmbienceConfig {
    fn default() -> Self {
        AmbienceConfig {
            loop_seconds: 2.4,
            highpass_hz: 900.0,
            lowpass_hz: 6200.0,
            flutter_hz: 0.24,
            flutter_depth: 0.18,
            level: 0.22,
            fade_time_constant: 0.04,
            fade_stop_seconds: 0.07,
            seed: 0x6272_6561_7468,
        }
    }
}

/// Leaky-integrated white noise: `s[i] = s[i-1] * 0.985 + white * 0.17`.
pub fn noise_loop(seconds: f64, sample_rate: f64, seed: u64) -> Vec<f64> {
    let frames = (sample_rate * seconds.max(MIN_LOOP_SECONDS)).floor() as usize;
    let mut rng = Pcg32::seed_from_u64(seed);
    let mut previous = 0.0;
    (0..frames)
        .map(|_| {
            let white: f64 = rng.random_range(-1.0..1.0);
            previous = previous * 0.985 + white * 0.17;
            previous
        })
        .collect()
}

/// One running instance of the bed.
#[derive(Debug, Clone)]
pub struct AmbienceBed {
    noise: Arc<Vec<f64>>,
    position: usize,
    highpass: BiquadFilter,
    lowpass: BiquadFilter,
    gain: Smoothed,
    flutter_gain: Smoothed,
    flutter_hz: f64,
    elapsed_frames: u64,
    stop_in: Option<u64>,
    sample_rate: f64,
    fade_stop_seconds: f64,
}

impl AmbienceBed {
    /// Start the bed on a shared noise loop.
    pub fn new(noise: Arc<Vec<f64>>, config: &AmbienceConfig, sample_rate: f64) -> Self {
        let level = config.level.max(0.0);
        AmbienceBed {
            noise,
            position: 0,
            highpass: BiquadFilter::new(
                FilterType::Highpass,
                config.highpass_hz,
                std::f64::consts::FRAC_1_SQRT_2,
                sample_rate,
            ),
            lowpass: BiquadFilter::new(
                FilterType::Lowpass,
                config.lowpass_hz,
                std::f64::consts::FRAC_1_SQRT_2,
                sample_rate,
            ),
            gain: Smoothed::new(level, config.fade_time_constant, sample_rate),
            flutter_gain: Smoothed::new(
                level * config.flutter_depth,
                config.fade_time_constant,
                sample_rate,
            ),
            flutter_hz: config.flutter_hz,
            elapsed_frames: 0,
            stop_in: None,
            sample_rate,
            fade_stop_seconds: config.fade_stop_seconds,
        }
    }

    /// Begin the teardown ramp; the bed goes silent shortly after.
    pub fn fade_out(&mut self) {
        if self.stop_in.is_some() {
            return;
        }
        self.gain.set_target(0.0001);
        self.flutter_gain.set_target(0.0001);
        self.stop_in = Some((self.fade_stop_seconds * self.sample_rate).round() as u64);
    }

    pub fn is_fading(&self) -> bool {
        self.stop_in.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.stop_in == Some(0)
    }

    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        if let Some(remaining) = self.stop_in.as_mut() {
            if *remaining == 0 {
                return 0.0;
            }
            *remaining -= 1;
        }
        if self.noise.is_empty() {
            return 0.0;
        }

        let raw = self.noise[self.position];
        self.position = (self.position + 1) % self.noise.len();
        let filtered = self.lowpass.process(self.highpass.process(raw));

        let t = self.elapsed_frames as f64 / self.sample_rate;
        self.elapsed_frames += 1;
        let flutter = (2.0 * PI * self.flutter_hz * t).sin();
        let gain = self.gain.next() + self.flutter_gain.next() * flutter;
        filtered * gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_loop_is_seeded() {
        let a = noise_loop(2.4, 8000.0, 7);
        let b = noise_loop(2.4, 8000.0, 7);
        let c = noise_loop(2.4, 8000.0, 8);
        assert_eq!(a.len(), 19200);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn noise_loop_has_a_minimum_length() {
        assert_eq!(noise_loop(0.1, 1000.0, 1).len(), 800);
    }

    #[test]
    fn noise_stays_bounded() {
        // |s| <= 0.17 / (1 - 0.985)
        let bound = 0.17 / 0.015;
        assert!(noise_loop(2.4, 44100.0, 3).iter().all(|s| s.abs() <= bound));
    }

    #[test]
    fn bed_produces_sound_until_faded() {
        let config = AmbienceConfig::default();
        let sr = 8000.0;
        let noise = Arc::new(noise_loop(config.loop_seconds, sr, config.seed));
        let mut bed = AmbienceBed::new(noise, &config, sr);

        let energy: f64 = (0..8000).map(|_| bed.next_sample().powi(2)).sum();
        assert!(energy > 0.0);
        assert!(!bed.is_fading());

        bed.fade_out();
        let stop_frames = (config.fade_stop_seconds * sr).round() as usize;
        let mut last = 1.0;
        for _ in 0..stop_frames {
            last = bed.next_sample();
        }
        assert!(last.abs() < 0.1);
        assert!(bed.is_finished());
        assert_eq!(bed.next_sample(), 0.0);
    }

    #[test]
    fn fade_out_is_idempotent() {
        let config = AmbienceConfig::default();
        let noise = Arc::new(noise_loop(1.0, 1000.0, 1));
        let mut bed = AmbienceBed::new(noise, &config, 1000.0);
        bed.fade_out();
        bed.next_sample();
        bed.fade_out();
        for _ in 0..69 {
            bed.next_sample();
        }
        assert!(bed.is_finished());
    }
}
