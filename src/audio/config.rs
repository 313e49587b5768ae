use std::path::Path;

use serde::Deserialize;

use crate::audio::errors::ConfigError;

// --- EQ Filter Constants ---
pub const BASS_SHELF_HZ: f32 = 200.0;
pub const MID_PEAK_HZ: f32 = 1000.0;
pub const TREBLE_SHELF_HZ: f32 = 4000.0;
pub const SHELF_Q_FACTOR: f32 = std::f32::consts::FRAC_1_SQRT_2;
pub const MID_PEAK_Q_FACTOR: f32 = 1.0;
// Corner frequencies are pulled below Nyquist for low sample rates.
pub const MAX_CORNER_FRACTION_OF_RATE: f32 = 0.45;

// -- EQ Performance Constants --
/// Minimum change in dB before recalculating EQ filter coefficients
pub const EQ_RECALC_THRESHOLD_DB: f32 = 0.01;

// -- Initial Values --
pub const INITIAL_VOLUME: f32 = 1.0;
pub const INITIAL_MASTER_GAIN: f32 = 1.0;

// --- Sampling Loop Constants ---
// One frame at ~60 Hz, matching a display refresh.
pub const DEFAULT_SAMPLER_INTERVAL_MS: u64 = 16;
pub const COMMAND_CHANNEL_SIZE: usize = 32;

// --- Retrieval Constants ---
pub const DEFAULT_RETRIEVAL_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_RETRIEVAL_PATH: &str = "/api/audio";
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 512 * 1024 * 1024;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

// --- Utility Constants --
pub const DEFAULT_SAMPLE_CAPACITY: usize = 1024 * 256;

/// Runtime settings for the engine thread and the retrieval client.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub retrieval_base_url: String,
    pub retrieval_path: String,
    pub max_payload_bytes: u64,
    pub request_timeout_secs: u64,
    pub sampler_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            retrieval_base_url: DEFAULT_RETRIEVAL_BASE_URL.to_string(),
            retrieval_path: DEFAULT_RETRIEVAL_PATH.to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            sampler_interval_ms: DEFAULT_SAMPLER_INTERVAL_MS,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sampler_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "samplerIntervalMs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "maxPayloadBytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
