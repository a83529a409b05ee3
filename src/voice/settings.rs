//! Voice settings consumed by speech synthesis

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Playback parameters for synthesized replies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub volume: f32,
    pub rate: f32,
    pub pitch: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

/// Process-wide voice settings handle
pub type SharedVoiceSettings = Arc<RwLock<VoiceSettings>>;

/// A float given either as a JSON number or as a numeric string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FloatInput {
    Number(f64),
    Text(String),
}

impl FloatInput {
    #[allow(clippy::cast_possible_truncation)]
    fn parse(&self, field: &str) -> Result<f32, String> {
        let value = match self {
            Self::Number(n) => *n as f32,
            Self::Text(s) => s
                .trim()
                .parse::<f32>()
                .map_err(|_| format!("{field} must be a number, got {s:?}"))?,
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("{field} must be finite"))
        }
    }
}

/// Settings update request
///
/// Every field is optional and an omitted field resets to `1.0`, but at
/// least one must be present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceSettingsUpdate {
    pub volume: Option<FloatInput>,
    pub rate: Option<FloatInput>,
    pub pitch: Option<FloatInput>,
}

impl VoiceSettingsUpdate {
    /// Whether the update names no setting at all
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.volume.is_none() && self.rate.is_none() && self.pitch.is_none()
    }

    /// Validate the update and produce the new settings
    ///
    /// # Errors
    ///
    /// Returns a message naming the offending field if a value is not a
    /// finite number
    pub fn resolve(&self) -> Result<VoiceSettings, String> {
        let field = |input: &Option<FloatInput>, name: &str| {
            input.as_ref().map_or(Ok(1.0), |v| v.parse(name))
        };

        Ok(VoiceSettings {
            volume: field(&self.volume, "volume")?,
            rate: field(&self.rate, "rate")?,
            pitch: field(&self.pitch, "pitch")?,
        })
    }
}
