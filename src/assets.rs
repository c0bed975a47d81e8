//! Exhale sample loading.
//!
//! The recording is looked up through an ordered list of sources; the first
//! one that yields decodable audio wins. When every source fails, exhales
//! fall back to the synthesized swell, so a load failure is never fatal.

use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dsp::sampler::SampleBuffer;
use crate::error::AssetLoadError;

/// Where the exhale recording lives, relative to the app root.
pub const EXHALE_SAMPLE_PATH: &str = "assets/audio/exhale-light-short.mp3";

/// Where to look for the exhale recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetConfig {
    /// Local path tried first.
    pub sample_path: PathBuf,
    /// A `data:` URL with a base64 copy of the recording.
    pub embedded_data_url: Option<String>,
    /// Base URL the relative sample path is resolved against.
    pub base_url: Option<String>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        AssetConfig {
            sample_path: PathBuf::from(EXHALE_SAMPLE_PATH),
            embedded_data_url: None,
            base_url: None,
        }
    }
}

impl AssetConfig {
    /// The fallback chain in the order it is tried.
    pub fn sources(&self) -> Vec<Box<dyn SampleSource>> {
        let mut sources: Vec<Box<dyn SampleSource>> =
            vec![Box::new(FileSource::new(self.sample_path.clone()))];
        if let Some(url) = &self.embedded_data_url {
            sources.push(Box::new(EmbeddedSource::new(url.clone())));
        }
        if let Some(base) = &self.base_url {
            #[cfg(feature = "remote")]
            sources.push(Box::new(RemoteSource::new(
                base.clone(),
                self.sample_path.to_string_lossy().into_owned(),
            )));
            #[cfg(not(feature = "remote"))]
            tracing::debug!(base = %base, "remote sample source needs the `remote` feature");
        }
        sources
    }
}

/// One place an encoded sample can come from.
pub trait SampleSource: fmt::Debug {
    /// Human-readable origin, for logs.
    fn describe(&self) -> String;

    /// Fetch the encoded bytes.
    fn fetch(&self) -> Result<Vec<u8>, AssetLoadError>;
}

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into() }
    }
}

impl SampleSource for FileSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn fetch(&self) -> Result<Vec<u8>, AssetLoadError> {
        std::fs::read(&self.path).map_err(|source| AssetLoadError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}

/// A base64 `data:` URL carried alongside the app.
#[derive(Debug, Clone)]
pub struct EmbeddedSource {
    data_url: String,
}

impl EmbeddedSource {
    pub fn new(data_url: impl Into<String>) -> Self {
        EmbeddedSource {
            data_url: data_url.into(),
        }
    }
}

impl SampleSource for EmbeddedSource {
    fn describe(&self) -> String {
        "embedded data URL".to_string()
    }

    fn fetch(&self) -> Result<Vec<u8>, AssetLoadError> {
        decode_data_url(&self.data_url)
    }
}

/// Decode the base64 payload after the first comma (or the whole string).
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, AssetLoadError> {
    let payload = match data_url.find(',') {
        Some(comma) => &data_url[comma + 1..],
        None => data_url,
    };
    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| AssetLoadError::InvalidDataUrl(e.to_string()))?;
    if bytes.is_empty() {
        return Err(AssetLoadError::InvalidDataUrl("empty payload".into()));
    }
    Ok(bytes)
}

/// The sample path resolved against a base URL and fetched over HTTP.
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct RemoteSource {
    base_url: String,
    path: String,
}

#[cfg(feature = "remote")]
impl RemoteSource {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        RemoteSource {
            base_url: base_url.into(),
            path: path.into(),
        }
    }

    pub fn resolve(&self) -> Result<reqwest::Url, AssetLoadError> {
        let remote = |reason: String| AssetLoadError::Remote {
            url: self.base_url.clone(),
            reason,
        };
        reqwest::Url::parse(&self.base_url)
            .and_then(|base| base.join(&self.path))
            .map_err(|e| remote(e.to_string()))
    }
}

#[cfg(feature = "remote")]
impl SampleSource for RemoteSource {
    fn describe(&self) -> String {
        match self.resolve() {
            Ok(url) => format!("url {url}"),
            Err(_) => format!("url {} + {}", self.base_url, self.path),
        }
    }

    fn fetch(&self) -> Result<Vec<u8>, AssetLoadError> {
        let url = self.resolve()?;
        let failed = |reason: String| AssetLoadError::Remote {
            url: url.to_string(),
            reason,
        };
        let response = reqwest::blocking::get(url.clone())
            .and_then(|r| r.error_for_status())
            .map_err(|e| failed(e.to_string()))?;
        let bytes = response.bytes().map_err(|e| failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Decode WAV (any PCM or float layout) or, with the `mp3` feature, MP3.
/// Multichannel audio is averaged down to mono.
pub fn decode_sample(bytes: &[u8]) -> Result<SampleBuffer, AssetLoadError> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return decode_wav(bytes);
    }
    #[cfg(feature = "mp3")]
    {
        decode_mp3(bytes)
    }
    #[cfg(not(feature = "mp3"))]
    {
        Err(AssetLoadError::UnsupportedFormat)
    }
}

fn decode_wav(bytes: &[u8]) -> Result<SampleBuffer, AssetLoadError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    finish(samples, spec.channels as usize, spec.sample_rate)
}

#[cfg(feature = "mp3")]
fn decode_mp3(bytes: &[u8]) -> Result<SampleBuffer, AssetLoadError> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut channels = 0;
    let mut sample_rate = 0;
    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                channels = frame.channels;
                sample_rate = frame.sample_rate;
                samples.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(minimp3::Error::SkippedData) => continue,
            Err(e) => return Err(AssetLoadError::Decode(e.to_string())),
        }
    }
    if sample_rate <= 0 {
        return Err(AssetLoadError::UnsupportedFormat);
    }
    finish(samples, channels, sample_rate as u32)
}

fn finish(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Result<SampleBuffer, AssetLoadError> {
    if samples.is_empty() || sample_rate == 0 {
        return Err(AssetLoadError::Decode("no audio frames".into()));
    }
    Ok(SampleBuffer::from_interleaved(&samples, channels, sample_rate))
}

/// Try each source in order and return the first that decodes.
pub fn load_first(sources: &[Box<dyn SampleSource>]) -> Result<SampleBuffer, AssetLoadError> {
    for source in sources {
        match source.fetch().and_then(|bytes| decode_sample(&bytes)) {
            Ok(buffer) => {
                info!(
                    source = %source.describe(),
                    seconds = buffer.duration_seconds(),
                    "exhale sample loaded"
                );
                return Ok(buffer);
            }
            Err(e) => warn!(source = %source.describe(), error = %e, "sample source failed"),
        }
    }
    Err(AssetLoadError::Exhausted {
        attempts: sources.len(),
    })
}

/// Load the exhale recording, or `None` if the synthesized swell must stand in.
pub fn load_exhale(config: &AssetConfig) -> Option<Arc<SampleBuffer>> {
    match load_first(&config.sources()) {
        Ok(buffer) => Some(Arc::new(buffer)),
        Err(e) => {
            warn!(error = %e, "exhales will use the synthesized swell");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn temp_wav(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn decodes_stereo_wav_to_mono() {
        let bytes = wav_bytes(&[16384, 0, -16384, -16384], 2, 22050);
        let buffer = decode_sample(&bytes).unwrap();
        assert_eq!(buffer.sample_rate, 22050);
        assert_eq!(buffer.len(), 2);
        assert!((buffer.data[0] - 0.25).abs() < 1e-6);
        assert!((buffer.data[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_sample(b"RIFF\0\0\0\0WAVEjunk").is_err());
        assert!(decode_sample(&[]).is_err());
    }

    #[test]
    fn data_url_payload_follows_the_comma() {
        let encoded = BASE64_STANDARD.encode(b"hello");
        assert_eq!(
            decode_data_url(&format!("data:audio/mpeg;base64,{encoded}")).unwrap(),
            b"hello"
        );
        assert_eq!(decode_data_url(&encoded).unwrap(), b"hello");
        assert!(matches!(
            decode_data_url("data:audio/mpeg;base64,!!!"),
            Err(AssetLoadError::InvalidDataUrl(_))
        ));
    }

    #[test]
    fn file_source_reports_the_path() {
        let err = FileSource::new("/definitely/not/here.mp3").fetch().unwrap_err();
        assert!(matches!(err, AssetLoadError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.mp3"));
    }

    #[test]
    fn chain_falls_through_to_the_embedded_copy() {
        let bytes = wav_bytes(&[1000; 100], 1, 8000);
        let config = AssetConfig {
            sample_path: PathBuf::from("/missing/exhale.mp3"),
            embedded_data_url: Some(format!(
                "data:audio/wav;base64,{}",
                BASE64_STANDARD.encode(&bytes)
            )),
            base_url: None,
        };
        let buffer = load_exhale(&config).unwrap();
        assert_eq!(buffer.len(), 100);
    }

    #[test]
    fn first_working_source_wins() {
        let first = temp_wav(&wav_bytes(&[100; 10], 1, 8000));
        let second = temp_wav(&wav_bytes(&[100; 20], 1, 8000));
        let sources: Vec<Box<dyn SampleSource>> = vec![
            Box::new(FileSource::new("/missing.wav")),
            Box::new(FileSource::new(first.path())),
            Box::new(FileSource::new(second.path())),
        ];
        assert_eq!(load_first(&sources).unwrap().len(), 10);
    }

    #[test]
    fn exhausted_chain_reports_attempts() {
        let sources: Vec<Box<dyn SampleSource>> = vec![
            Box::new(FileSource::new("/missing-a.wav")),
            Box::new(EmbeddedSource::new("data:,")),
        ];
        assert!(matches!(
            load_first(&sources),
            Err(AssetLoadError::Exhausted { attempts: 2 })
        ));
        assert!(load_exhale(&AssetConfig {
            sample_path: PathBuf::from("/missing-b.wav"),
            ..AssetConfig::default()
        })
        .is_none());
    }

    #[test]
    fn config_reads_camel_case_json() {
        let config: AssetConfig =
            serde_json::from_str(r#"{"embeddedDataUrl":"data:,AAAA"}"#).unwrap();
        assert_eq!(config.sample_path, PathBuf::from(EXHALE_SAMPLE_PATH));
        assert_eq!(config.sources().len(), 2);
    }

    #[cfg(feature = "remote")]
    #[test]
    fn remote_path_resolves_against_the_base() {
        let source = RemoteSource::new("https://example.com/app/index.html", EXHALE_SAMPLE_PATH);
        assert_eq!(
            source.resolve().unwrap().as_str(),
            "https://example.com/app/assets/audio/exhale-light-short.mp3"
        );
    }
}
