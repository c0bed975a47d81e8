//! Audio sinks for the live session.

use tracing::debug;

use crate::error::Result;

/// Where live audio goes. Samples are interleaved f32 frames.
pub trait AudioSink {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Make sure output is flowing. Called before every session start and
    /// resume; fails with [`BreathError::AudioUnavailable`] when the device
    /// cannot be acquired.
    ///
    /// [`BreathError::AudioUnavailable`]: crate::error::BreathError::AudioUnavailable
    fn resume(&mut self) -> Result<()>;

    fn write(&mut self, samples: &[f32]) -> Result<()>;
}

/// Discards audio; counts frames.
#[derive(Debug, Clone)]
pub struct NullSink {
    sample_rate: u32,
    channels: u16,
    frames_written: u64,
}

impl NullSink {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        NullSink {
            sample_rate,
            channels: channels.max(1),
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl AudioSink for NullSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        self.frames_written += (samples.len() / self.channels as usize) as u64;
        Ok(())
    }
}

/// Keeps everything written to it.
#[derive(Debug, Clone)]
pub struct CaptureSink {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
    resumes: usize,
}

impl CaptureSink {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        CaptureSink {
            sample_rate,
            channels: channels.max(1),
            samples: Vec::new(),
            resumes: 0,
        }
    }

    /// Interleaved samples captured so far.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn resumes(&self) -> usize {
        self.resumes
    }
}

impl AudioSink for CaptureSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn resume(&mut self) -> Result<()> {
        self.resumes += 1;
        debug!(resumes = self.resumes, "capture sink resumed");
        Ok(())
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        self.samples.extend_from_slice(samples);
        Ok(())
    }
}

#[cfg(feature = "device")]
pub use device::DeviceSink;

#[cfg(feature = "device")]
mod device {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use ringbuf::{
        HeapRb,
        traits::{Consumer, Observer, Producer, Split},
    };
    use tracing::{debug, error, info};

    use super::AudioSink;
    use crate::error::{BreathError, Result};

    /// Seconds of audio the ring buffer can hold.
    const RING_SECONDS: f64 = 1.0;

    /// The default output device, fed through a lock-free ring buffer.
    ///
    /// The stream is built paused and starts on the first [`resume`].
    ///
    /// [`resume`]: AudioSink::resume
    pub struct DeviceSink {
        producer: ringbuf::HeapProd<f32>,
        stream: cpal::Stream,
        sample_rate: u32,
        channels: u16,
        playing: bool,
    }

    impl DeviceSink {
        pub fn open() -> Result<Self> {
            let unavailable = |what: &str, e: &dyn std::fmt::Display| {
                BreathError::AudioUnavailable(format!("{what}: {e}"))
            };

            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| BreathError::AudioUnavailable("no output device".into()))?;
            let config = device
                .default_output_config()
                .map_err(|e| unavailable("no default output config", &e))?;

            let sample_rate = config.sample_rate().0;
            let channels = config.channels();
            let capacity = (sample_rate as f64 * RING_SECONDS) as usize * channels as usize;
            let (producer, mut consumer) = HeapRb::<f32>::new(capacity).split();

            let stream = match config.sample_format() {
                cpal::SampleFormat::F32 => device.build_output_stream(
                    &config.into(),
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let popped = consumer.pop_slice(data);
                        data[popped..].fill(0.0);
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                ),
                cpal::SampleFormat::I16 => {
                    let mut scratch: Vec<f32> = vec![0.0; 4096];
                    device.build_output_stream(
                        &config.into(),
                        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                            if scratch.len() < data.len() {
                                scratch.resize(data.len(), 0.0);
                            }
                            let popped = consumer.pop_slice(&mut scratch[..data.len()]);
                            for (out, &s) in data.iter_mut().zip(&scratch[..popped]) {
                                *out = crate::dsp::wav::to_pcm16(s);
                            }
                            data[popped..].fill(0);
                        },
                        |err| error!("audio stream error: {err}"),
                        None,
                    )
                }
                other => {
                    return Err(BreathError::AudioUnavailable(format!(
                        "unsupported sample format {other:?}"
                    )));
                }
            }
            .map_err(|e| unavailable("cannot build output stream", &e))?;

            info!(sample_rate, channels, "output device opened");
            Ok(DeviceSink {
                producer,
                stream,
                sample_rate,
                channels,
                playing: false,
            })
        }

        /// Frames queued but not yet played.
        pub fn buffered_frames(&self) -> usize {
            self.producer.occupied_len() / self.channels.max(1) as usize
        }
    }

    impl AudioSink for DeviceSink {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn channels(&self) -> u16 {
            self.channels
        }

        fn resume(&mut self) -> Result<()> {
            if !self.playing {
                self.stream
                    .play()
                    .map_err(|e| BreathError::AudioUnavailable(format!("cannot start output: {e}")))?;
                self.playing = true;
                debug!("output stream playing");
            }
            Ok(())
        }

        fn write(&mut self, samples: &[f32]) -> Result<()> {
            let pushed = self.producer.push_slice(samples);
            if pushed < samples.len() {
                debug!(dropped = samples.len() - pushed, "output ring buffer overflow");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_counts_whole_frames() {
        let mut sink = NullSink::new(8000, 2);
        sink.write(&[0.0; 10]).unwrap();
        sink.write(&[0.0; 3]).unwrap();
        assert_eq!(sink.frames_written(), 6);
    }

    #[test]
    fn capture_sink_keeps_samples_in_order() {
        let mut sink = CaptureSink::new(8000, 1);
        sink.resume().unwrap();
        sink.write(&[0.1, 0.2]).unwrap();
        sink.write(&[0.3]).unwrap();
        assert_eq!(sink.samples(), &[0.1, 0.2, 0.3]);
        assert_eq!(sink.frames(), 3);
        assert_eq!(sink.resumes(), 1);
    }
}
