//! Recorded-sample playback.
//!
//! Samples are stored mono at their native rate and resampled on the fly
//! with linear interpolation.

/// A single sample buffer loaded into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Mono f64 samples.
    pub data: Vec<f64>,
    /// Native sample rate of the audio.
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(data: Vec<f64>, sample_rate: u32) -> Self {
        SampleBuffer { data, sample_rate }
    }

    /// Create from 16-bit signed PCM data.
    pub fn from_i16(pcm: &[i16], sample_rate: u32) -> Self {
        let data: Vec<f64> = pcm.iter().map(|&s| s as f64 / 32768.0).collect();
        SampleBuffer { data, sample_rate }
    }

    /// Create from interleaved frames, averaging channels down to mono.
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let data = samples
            .chunks(channels)
            .map(|frame| frame.iter().map(|&s| s as f64).sum::<f64>() / frame.len() as f64)
            .collect();
        SampleBuffer { data, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.data.len() as f64 / self.sample_rate as f64
    }

    /// Read a sample with linear interpolation at a fractional position.
    pub fn read_interpolated(&self, position: f64) -> f64 {
        if self.data.is_empty() || position < 0.0 {
            return 0.0;
        }

        let idx = position as usize;
        if idx >= self.data.len() - 1 {
            return if idx < self.data.len() {
                self.data[idx]
            } else {
                0.0
            };
        }

        let frac = position - idx as f64;
        self.data[idx] * (1.0 - frac) + self.data[idx + 1] * frac
    }
}

/// Plays one buffer once, at a fixed gain, from the sample it was started on.
#[derive(Debug, Clone)]
pub struct SamplePlayer {
    position: f64,
    step: f64,
    gain: f64,
}

impl SamplePlayer {
    pub fn new(buffer: &SampleBuffer, gain: f64, output_rate: f64) -> Self {
        SamplePlayer {
            position: 0.0,
            step: buffer.sample_rate as f64 / output_rate,
            gain,
        }
    }

    #[inline]
    pub fn next_sample(&mut self, buffer: &SampleBuffer) -> f64 {
        let sample = buffer.read_interpolated(self.position) * self.gain;
        self.position += self.step;
        sample
    }

    /// True once the read head has passed the end of the buffer.
    pub fn is_exhausted(&self, buffer: &SampleBuffer) -> bool {
        self.position >= buffer.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_buffer() -> SampleBuffer {
        // One period of a ramp: 0.0, 0.25, 0.5, 0.75
        SampleBuffer::new(vec![0.0, 0.25, 0.5, 0.75], 4)
    }

    #[test]
    fn sample_buffer_interpolation() {
        let buf = make_test_buffer();
        assert!((buf.read_interpolated(0.0) - 0.0).abs() < 1e-10);
        assert!((buf.read_interpolated(0.5) - 0.125).abs() < 1e-10);
        assert!((buf.read_interpolated(1.0) - 0.25).abs() < 1e-10);
        assert!((buf.read_interpolated(3.0) - 0.75).abs() < 1e-10);
        assert_eq!(buf.read_interpolated(4.0), 0.0);
        assert_eq!(buf.read_interpolated(-1.0), 0.0);
    }

    #[test]
    fn sample_buffer_from_i16() {
        let pcm: Vec<i16> = vec![0, 16384, -16384, 32767];
        let buf = SampleBuffer::from_i16(&pcm, 44100);
        assert_eq!(buf.len(), 4);
        assert!((buf.data[0] - 0.0).abs() < 1e-10);
        assert!((buf.data[1] - 0.5).abs() < 1e-4);
        assert!((buf.data[2] - (-0.5)).abs() < 1e-4);
    }

    #[test]
    fn interleaved_stereo_is_averaged() {
        let buf = SampleBuffer::from_interleaved(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2, 8000);
        assert_eq!(buf.data, vec![0.5, 0.5, 0.0]);
        assert!((buf.duration_seconds() - 3.0 / 8000.0).abs() < 1e-12);
    }

    #[test]
    fn player_resamples_to_output_rate() {
        let buf = make_test_buffer();
        // Output at twice the native rate reads half-steps.
        let mut player = SamplePlayer::new(&buf, 1.0, 8.0);
        let out: Vec<f64> = (0..4).map(|_| player.next_sample(&buf)).collect();
        assert_eq!(out, vec![0.0, 0.125, 0.25, 0.375]);
        assert!(!player.is_exhausted(&buf));
    }

    #[test]
    fn player_applies_gain_and_ends() {
        let buf = SampleBuffer::new(vec![1.0; 10], 100);
        let mut player = SamplePlayer::new(&buf, 0.95, 100.0);
        for _ in 0..10 {
            assert!((player.next_sample(&buf) - 0.95).abs() < 1e-12);
        }
        assert!(player.is_exhausted(&buf));
        assert_eq!(player.next_sample(&buf), 0.0);
    }
}
