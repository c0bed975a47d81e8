use thiserror::Error;

use crate::clock::RunState;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BreathError>;

#[derive(Debug, Error)]
pub enum BreathError {
    /// Settings failed validation, or the phase cycle can never advance.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The output device could not be acquired or resumed.
    #[error("Audio output unavailable: {0}")]
    AudioUnavailable(String),

    /// The exhale sample and all of its fallbacks failed to load.
    #[error(transparent)]
    AssetLoad(#[from] AssetLoadError),

    /// The offline batch render did not complete.
    #[error("Render failed: {0}")]
    RenderFailure(String),

    #[error("Cannot {action} while the session is {state}")]
    InvalidState { action: &'static str, state: RunState },
}

#[derive(Debug, Error)]
pub enum AssetLoadError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Cannot decode sample: {0}")]
    Decode(String),

    #[error("Unsupported sample format")]
    UnsupportedFormat,

    #[error("Remote fetch of {url} failed: {reason}")]
    Remote { url: String, reason: String },

    #[error("All {attempts} sample sources failed")]
    Exhausted { attempts: usize },
}

impl From<hound::Error> for AssetLoadError {
    fn from(e: hound::Error) -> Self {
        AssetLoadError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = BreathError::Configuration("inhale must be at least 1 second".into());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: inhale must be at least 1 second"
        );

        let err = BreathError::InvalidState {
            action: "pause",
            state: RunState::Idle,
        };
        assert_eq!(err.to_string(), "Cannot pause while the session is idle");
    }

    #[test]
    fn asset_errors_convert_transparently() {
        let err: BreathError = AssetLoadError::Exhausted { attempts: 3 }.into();
        assert_eq!(err.to_string(), "All 3 sample sources failed");
    }
}
