//! Shared "space" effect: a damped delay-feedback loop.
//!
//! ```text
//! send ─▶ input gain ─▶ delay ─┬─▶ wet ─▶ master
//!                        ▲     │
//!                        └─ feedback ◀─ low-pass
//! ```

use super::filter::{BiquadFilter, FilterType};

/// Tuning of the space effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbConfig {
    pub input_gain: f64,
    pub delay_seconds: f64,
    pub feedback: f64,
    pub damping_hz: f64,
    pub wet: f64,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        ReverbConfig {
            input_gain: 0.85,
            delay_seconds: 0.23,
            feedback: 0.32,
            damping_hz: 2600.0,
            wet: 0.36,
        }
    }
}

/// One instance per session; every voice sends into it.
#[derive(Debug, Clone)]
pub struct SpaceReverb {
    config: ReverbConfig,
    buffer: Vec<f64>,
    write_pos: usize,
    damping: BiquadFilter,
}

impl SpaceReverb {
    pub fn new(mut config: ReverbConfig, sample_rate: f64) -> Self {
        // The loop only decays with feedback below unity.
        config.feedback = config.feedback.clamp(0.0, 0.99);
        let delay_samples = ((config.delay_seconds * sample_rate).round() as usize).max(1);
        SpaceReverb {
            config,
            buffer: vec![0.0; delay_samples],
            write_pos: 0,
            damping: BiquadFilter::new(
                FilterType::Lowpass,
                config.damping_hz,
                std::f64::consts::FRAC_1_SQRT_2,
                sample_rate,
            ),
        }
    }

    pub fn config(&self) -> &ReverbConfig {
        &self.config
    }

    /// Delay length in samples.
    pub fn delay_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Feed the summed sends for one sample and return the wet output.
    #[inline]
    pub fn process(&mut self, send: f64) -> f64 {
        // The slot about to be overwritten holds the sample from one delay ago.
        let delayed = self.buffer[self.write_pos];
        let fed_back = self.damping.process(delayed) * self.config.feedback;
        self.buffer[self.write_pos] = send * self.config.input_gain + fed_back;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        delayed * self.config.wet
    }

    /// Clear the delay line.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.damping.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_response(config: ReverbConfig, sample_rate: f64, len: usize) -> Vec<f64> {
        let mut reverb = SpaceReverb::new(config, sample_rate);
        (0..len)
            .map(|i| reverb.process(if i == 0 { 1.0 } else { 0.0 }))
            .collect()
    }

    #[test]
    fn first_echo_arrives_after_the_delay() {
        let config = ReverbConfig::default();
        let out = impulse_response(config, 1000.0, 500);
        let delay = 230;
        assert!(out[..delay].iter().all(|&s| s == 0.0));
        assert!((out[delay] - 0.85 * 0.36).abs() < 1e-12);
    }

    #[test]
    fn echoes_decay() {
        let out = impulse_response(ReverbConfig::default(), 8000.0, 8000 * 3);
        let energy = |range: std::ops::Range<usize>| -> f64 {
            out[range].iter().map(|s| s * s).sum()
        };
        let early = energy(0..8000);
        let late = energy(16000..24000);
        assert!(early > 0.0);
        assert!(late < early * 0.01, "tail should die away: {early} vs {late}");
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn clear_silences_the_tail() {
        let mut reverb = SpaceReverb::new(ReverbConfig::default(), 1000.0);
        reverb.process(1.0);
        reverb.clear();
        for _ in 0..1000 {
            assert_eq!(reverb.process(0.0), 0.0);
        }
    }

    #[test]
    fn runaway_feedback_is_clamped() {
        let config = ReverbConfig {
            feedback: 4.0,
            ..ReverbConfig::default()
        };
        let reverb = SpaceReverb::new(config, 1000.0);
        assert!(reverb.config().feedback < 1.0);
    }
}
