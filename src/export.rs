//! Session export: settings in, a named WAV file out.

use std::path::Path;

use tracing::info;

use crate::assets::{AssetConfig, load_exhale};
use crate::dsp::engine::EngineConfig;
use crate::dsp::renderer::{OfflineRenderer, RenderProgress, RenderStage};
use crate::dsp::wav::encode_wav;
use crate::error::{BreathError, Result};
use crate::settings::SessionSettings;
use crate::timeline::build_timeline;

/// A finished export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedSession {
    /// Suggested download name, e.g. `4060breath.wav`.
    pub file_name: String,
    pub wav: Vec<u8>,
    pub duration_seconds: f64,
}

impl ExportedSession {
    /// Write the WAV into `dir` under its suggested name.
    pub fn save_in(&self, dir: &Path) -> Result<std::path::PathBuf> {
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.wav).map_err(|e| {
            BreathError::RenderFailure(format!("cannot write {}: {e}", path.display()))
        })?;
        Ok(path)
    }
}

/// Render the whole session offline and encode it.
///
/// Progress runs 5 → 12 → 20 → 44 → 52..94 → 96 → 100. Any failure aborts
/// the export; no partial file is produced.
pub fn export_session(
    settings: &SessionSettings,
    assets: &AssetConfig,
    engine: EngineConfig,
    mut on_progress: impl FnMut(RenderProgress),
) -> Result<ExportedSession> {
    on_progress(RenderProgress::new(5, RenderStage::Preparing));
    settings.validate()?;

    on_progress(RenderProgress::new(12, RenderStage::BuildingTimeline));
    let timeline = build_timeline(settings)?;

    on_progress(RenderProgress::new(20, RenderStage::LoadingSample));
    let exhale = load_exhale(assets);

    let renderer = OfflineRenderer::new(engine);
    let buffer = renderer.render(settings, &timeline, exhale, &mut on_progress)?;

    on_progress(RenderProgress::new(96, RenderStage::Encoding));
    let wav = encode_wav(&buffer)?;

    let exported = ExportedSession {
        file_name: settings.export_file_name(),
        wav,
        duration_seconds: buffer.duration_seconds(),
    };
    info!(
        file = %exported.file_name,
        bytes = exported.wav.len(),
        seconds = exported.duration_seconds,
        "export finished"
    );
    on_progress(RenderProgress::new(100, RenderStage::Done));
    Ok(exported)
}

/// [`export_session`] on tokio's blocking pool.
#[cfg(feature = "async-render")]
pub async fn export_session_async<F>(
    settings: SessionSettings,
    assets: AssetConfig,
    engine: EngineConfig,
    on_progress: F,
) -> Result<ExportedSession>
where
    F: FnMut(RenderProgress) + Send + 'static,
{
    tokio::task::spawn_blocking(move || export_session(&settings, &assets, engine, on_progress))
        .await
        .map_err(|e| BreathError::RenderFailure(format!("render task failed: {e}")))?
}
