//! WAV encoder: 44-byte RIFF header plus 16-bit little-endian PCM.

use super::renderer::RenderedBuffer;
use crate::error::{BreathError, Result};

/// Size of the canonical RIFF/WAVE header.
pub const WAV_HEADER_LEN: usize = 44;

/// Convert one float sample to 16-bit PCM.
///
/// Clipped to [-1, 1]; negative values scale by 32768 and positive values by
/// 32767, truncating toward zero.
#[inline]
pub fn to_pcm16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode a rendered buffer to a WAV file in memory.
pub fn encode_wav(buffer: &RenderedBuffer) -> Result<Vec<u8>> {
    let channels = buffer.channels.max(1);
    let sample_rate = buffer.sample_rate;
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate
        .checked_mul(channels as u32 * (bits_per_sample as u32 / 8))
        .ok_or_else(|| BreathError::RenderFailure("sample rate too high for WAV".into()))?;
    let block_align = channels * (bits_per_sample / 8);

    // Only whole frames are written.
    let sample_count = buffer.frames() * channels as usize;
    let data_size = u32::try_from(sample_count * 2)
        .ok()
        .filter(|size| size.checked_add(36).is_some())
        .ok_or_else(|| BreathError::RenderFailure("audio too long for WAV".into()))?;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(WAV_HEADER_LEN + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in &buffer.samples[..sample_count] {
        buf.extend_from_slice(&to_pcm16(sample).to_le_bytes());
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn u16_at(wav: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([wav[at], wav[at + 1]])
    }

    fn u32_at(wav: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([wav[at], wav[at + 1], wav[at + 2], wav[at + 3]])
    }

    #[test]
    fn silence_has_exact_size_and_header() {
        for (d, r, c) in [(1usize, 8000u32, 1u16), (2, 44100, 2), (3, 22050, 2)] {
            let buffer = RenderedBuffer::silence(r, c, d * r as usize);
            let wav = encode_wav(&buffer).unwrap();
            assert_eq!(wav.len(), 44 + d * r as usize * c as usize * 2);

            assert_eq!(&wav[0..4], b"RIFF");
            assert_eq!(u32_at(&wav, 4) as usize, wav.len() - 8);
            assert_eq!(&wav[8..12], b"WAVE");
            assert_eq!(&wav[12..16], b"fmt ");
            assert_eq!(u32_at(&wav, 16), 16);
            assert_eq!(u16_at(&wav, 20), 1);
            assert_eq!(u16_at(&wav, 22), c);
            assert_eq!(u32_at(&wav, 24), r);
            assert_eq!(u32_at(&wav, 28), r * c as u32 * 2);
            assert_eq!(u16_at(&wav, 32), c * 2);
            assert_eq!(u16_at(&wav, 34), 16);
            assert_eq!(&wav[36..40], b"data");
            assert_eq!(u32_at(&wav, 40) as usize, wav.len() - 44);
            assert!(wav[44..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn samples_are_clipped_and_scaled_asymmetrically() {
        assert_eq!(to_pcm16(1.0), 32767);
        assert_eq!(to_pcm16(2.5), 32767);
        assert_eq!(to_pcm16(-1.0), -32768);
        assert_eq!(to_pcm16(-7.0), -32768);
        assert_eq!(to_pcm16(0.5), 16383);
        assert_eq!(to_pcm16(-0.5), -16384);
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(f32::NAN), 0);
    }

    #[test]
    fn data_is_interleaved_little_endian() {
        let buffer = RenderedBuffer {
            sample_rate: 8000,
            channels: 2,
            samples: vec![1.0, -1.0, 0.5, -0.5],
        };
        let wav = encode_wav(&buffer).unwrap();
        let pcm: Vec<i16> = wav[44..]
            .chunks(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(pcm, vec![32767, -32768, 16383, -16384]);
    }

    #[test]
    fn partial_frames_are_dropped() {
        let buffer = RenderedBuffer {
            sample_rate: 8000,
            channels: 2,
            samples: vec![0.1, 0.2, 0.3],
        };
        assert_eq!(encode_wav(&buffer).unwrap().len(), 44 + 4);
    }

    #[test]
    fn standard_readers_accept_the_file() {
        let samples: Vec<f32> = (0..800)
            .map(|i| (i as f32 / 800.0 * std::f32::consts::TAU).sin() * 0.5)
            .collect();
        let buffer = RenderedBuffer {
            sample_rate: 8000,
            channels: 1,
            samples: samples.clone(),
        };
        let wav = encode_wav(&buffer).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&wav).unwrap();
        file.flush().unwrap();

        let mut reader = hound::WavReader::open(file.path()).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let expected: Vec<i16> = samples.iter().map(|&s| to_pcm16(s)).collect();
        assert_eq!(read, expected);
    }
}
