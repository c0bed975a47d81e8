pub mod assets;
pub mod clock;
pub mod dsp;
pub mod error;
pub mod export;
pub mod live;
pub mod output;
pub mod settings;
pub mod timeline;

use crate::assets::AssetConfig;
use crate::dsp::engine::EngineConfig;
use crate::dsp::renderer::{OfflineRenderer, RenderedBuffer};
use crate::error::BreathError;
use crate::settings::SessionSettings;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the breathpace-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn settings_from_js(settings: JsValue) -> Result<SessionSettings, JsValue> {
    let settings: SessionSettings = serde_wasm_bindgen::from_value(settings)
        .map_err(|e| js_error(BreathError::Configuration(format!("malformed settings: {e}"))))?;
    settings.validate().map_err(js_error)?;
    Ok(settings)
}

/// Render a session through the offline path, using the embedded exhale
/// recording when one is passed.
fn render_session(
    settings: &SessionSettings,
    sample_rate: u32,
    channels: u16,
    exhale_data_url: Option<String>,
) -> error::Result<RenderedBuffer> {
    if sample_rate == 0 {
        return Err(BreathError::Configuration(
            "sample rate must be positive".into(),
        ));
    }
    let timeline = timeline::build_timeline(settings)?;
    let assets = AssetConfig {
        embedded_data_url: exhale_data_url,
        ..AssetConfig::default()
    };
    let exhale = assets::load_exhale(&assets);
    let config = EngineConfig {
        sample_rate,
        channels,
        ..EngineConfig::default()
    };
    OfflineRenderer::new(config).render(settings, &timeline, exhale, |_| {})
}

/// WASM-exposed: expand settings into the JSON phase timeline.
#[wasm_bindgen]
pub fn session_timeline(settings: JsValue) -> Result<JsValue, JsValue> {
    let settings = settings_from_js(settings)?;
    let timeline = timeline::build_timeline(&settings).map_err(js_error)?;
    serde_wasm_bindgen::to_value(&timeline).map_err(js_error)
}

/// WASM-exposed: the download name for an exported session.
#[wasm_bindgen]
pub fn export_file_name(settings: JsValue) -> Result<String, JsValue> {
    Ok(settings_from_js(settings)?.export_file_name())
}

/// WASM-exposed: render the whole session to a stereo WAV byte array.
#[wasm_bindgen]
pub fn render_session_wav(
    settings: JsValue,
    sample_rate: u32,
    exhale_data_url: Option<String>,
) -> Result<Vec<u8>, JsValue> {
    let settings = settings_from_js(settings)?;
    let buffer = render_session(&settings, sample_rate, 2, exhale_data_url).map_err(js_error)?;
    dsp::wav::encode_wav(&buffer).map_err(js_error)
}

/// WASM-exposed: render the whole session to mono f32 samples.
/// Returns the raw audio buffer for AudioWorklet playback.
#[wasm_bindgen]
pub fn render_session_samples(
    settings: JsValue,
    sample_rate: u32,
    exhale_data_url: Option<String>,
) -> Result<Vec<f32>, JsValue> {
    let settings = settings_from_js(settings)?;
    let buffer = render_session(&settings, sample_rate, 1, exhale_data_url).map_err(js_error)?;
    Ok(buffer.samples)
}
