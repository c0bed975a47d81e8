//! Session settings and the four-phase breathing cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BreathError, Result};

/// Acoustic family of a phase. Both holds share one recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseType {
    Inhale,
    Hold,
    Exhale,
}

impl fmt::Display for PhaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseType::Inhale => write!(f, "inhale"),
            PhaseType::Hold => write!(f, "hold"),
            PhaseType::Exhale => write!(f, "exhale"),
        }
    }
}

/// Position of a phase within the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseKey {
    Inhale,
    Hold1,
    Exhale,
    Hold2,
}

/// One segment of the breathing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSpec {
    pub key: PhaseKey,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub phase_type: PhaseType,
    pub duration_seconds: u32,
}

/// Number of phases in one cycle.
pub const PHASE_COUNT: usize = 4;

/// Validated parameters of one breathing session.
///
/// Field names follow the camelCase JSON the settings form persists,
/// e.g. `{"inhaleSeconds":4,"hold1Seconds":7,...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    pub inhale_seconds: u32,
    pub hold1_seconds: u32,
    pub exhale_seconds: u32,
    pub hold2_seconds: u32,
    pub total_minutes: u32,
    /// Master volume in percent, 0–100.
    pub volume: u32,
    #[serde(default)]
    pub mute: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            inhale_seconds: 4,
            hold1_seconds: 0,
            exhale_seconds: 6,
            hold2_seconds: 0,
            total_minutes: 10,
            volume: 80,
            mute: false,
        }
    }
}

impl SessionSettings {
    /// Parse and validate settings from their JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: SessionSettings = serde_json::from_str(json)
            .map_err(|e| BreathError::Configuration(format!("malformed settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the bounds the settings form is expected to enforce.
    pub fn validate(&self) -> Result<()> {
        if self.inhale_seconds < 1 {
            return Err(BreathError::Configuration(
                "inhale must be at least 1 second".into(),
            ));
        }
        if self.exhale_seconds < 1 {
            return Err(BreathError::Configuration(
                "exhale must be at least 1 second".into(),
            ));
        }
        if self.total_minutes < 1 {
            return Err(BreathError::Configuration(
                "total duration must be at least 1 minute".into(),
            ));
        }
        if self.volume > 100 {
            return Err(BreathError::Configuration(format!(
                "volume must be between 0 and 100, got {}",
                self.volume
            )));
        }
        Ok(())
    }

    /// The four phases in cycle order.
    pub fn phases(&self) -> [PhaseSpec; PHASE_COUNT] {
        [
            PhaseSpec {
                key: PhaseKey::Inhale,
                label: "Inhale",
                phase_type: PhaseType::Inhale,
                duration_seconds: self.inhale_seconds,
            },
            PhaseSpec {
                key: PhaseKey::Hold1,
                label: "Hold (after inhale)",
                phase_type: PhaseType::Hold,
                duration_seconds: self.hold1_seconds,
            },
            PhaseSpec {
                key: PhaseKey::Exhale,
                label: "Exhale",
                phase_type: PhaseType::Exhale,
                duration_seconds: self.exhale_seconds,
            },
            PhaseSpec {
                key: PhaseKey::Hold2,
                label: "Hold (after exhale)",
                phase_type: PhaseType::Hold,
                duration_seconds: self.hold2_seconds,
            },
        ]
    }

    /// Length of one full cycle in seconds.
    pub fn cycle_seconds(&self) -> u64 {
        self.phases()
            .iter()
            .map(|p| p.duration_seconds as u64)
            .sum()
    }

    /// Configured session length in seconds.
    pub fn target_seconds(&self) -> f64 {
        self.total_minutes as f64 * 60.0
    }

    /// Master volume as a linear gain in [0, 1].
    pub fn master_volume(&self) -> f64 {
        (self.volume as f64 / 100.0).clamp(0.0, 1.0)
    }

    /// Rhythm in the `inhale-hold-exhale-hold` notation, e.g. `4-7-8-4`.
    pub fn rhythm(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.inhale_seconds, self.hold1_seconds, self.exhale_seconds, self.hold2_seconds
        )
    }

    /// File name for an exported session: the four durations concatenated.
    pub fn export_file_name(&self) -> String {
        format!(
            "{}{}{}{}breath.wav",
            self.inhale_seconds, self.hold1_seconds, self.exhale_seconds, self.hold2_seconds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(i: u32, h1: u32, e: u32, h2: u32) -> SessionSettings {
        SessionSettings {
            inhale_seconds: i,
            hold1_seconds: h1,
            exhale_seconds: e,
            hold2_seconds: h2,
            total_minutes: 1,
            volume: 80,
            mute: false,
        }
    }

    #[test]
    fn parses_camel_case_json() {
        let json = r#"{"inhaleSeconds":4,"hold1Seconds":7,"exhaleSeconds":8,
            "hold2Seconds":4,"totalMinutes":5,"volume":60,"mute":true}"#;
        let s = SessionSettings::from_json(json).unwrap();
        assert_eq!(s.rhythm(), "4-7-8-4");
        assert_eq!(s.total_minutes, 5);
        assert!(s.mute);
    }

    #[test]
    fn mute_defaults_to_false() {
        let json = r#"{"inhaleSeconds":4,"hold1Seconds":0,"exhaleSeconds":6,
            "hold2Seconds":0,"totalMinutes":1,"volume":80}"#;
        assert!(!SessionSettings::from_json(json).unwrap().mute);
    }

    #[test]
    fn rejects_malformed_structures() {
        assert!(matches!(
            SessionSettings::from_json(r#"{"inhaleSeconds":"four"}"#),
            Err(BreathError::Configuration(_))
        ));
        assert!(matches!(
            SessionSettings::from_json(r#"{"inhaleSeconds":-1}"#),
            Err(BreathError::Configuration(_))
        ));
    }

    #[test]
    fn validates_bounds() {
        assert!(settings(4, 0, 6, 0).validate().is_ok());
        assert!(settings(0, 0, 6, 0).validate().is_err());
        assert!(settings(4, 0, 0, 0).validate().is_err());

        let mut s = settings(4, 0, 6, 0);
        s.total_minutes = 0;
        assert!(s.validate().is_err());

        s.total_minutes = 1;
        s.volume = 101;
        assert!(s.validate().is_err());
    }

    #[test]
    fn phases_follow_cycle_order() {
        let phases = settings(4, 7, 8, 4).phases();
        let types: Vec<_> = phases.iter().map(|p| p.phase_type).collect();
        assert_eq!(
            types,
            vec![
                PhaseType::Inhale,
                PhaseType::Hold,
                PhaseType::Exhale,
                PhaseType::Hold
            ]
        );
        assert_eq!(phases[3].key, PhaseKey::Hold2);
        assert_eq!(settings(4, 7, 8, 4).cycle_seconds(), 23);
    }

    #[test]
    fn export_name_embeds_durations() {
        assert_eq!(settings(4, 0, 6, 0).export_file_name(), "4060breath.wav");
        assert_eq!(settings(4, 7, 8, 4).export_file_name(), "4784breath.wav");
    }

    #[test]
    fn master_volume_is_linear() {
        let mut s = settings(4, 0, 6, 0);
        s.volume = 25;
        assert!((s.master_volume() - 0.25).abs() < 1e-12);
    }
}
