use config::Config;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::*;

/// Use default config if no path is provided
pub fn get_configuration(config: &Option<PathBuf>) -> Result<AppConfig, anyhow::Error> {
    let settings = if let Some(config) = config {
        info!("Using configuration from {:?}", config);
        Config::builder()
            .add_source(config::File::with_name(
                config
                    .to_str()
                    .ok_or_else(|| anyhow::anyhow!("Failed to convert path"))?,
            ))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
    } else {
        info!("Using dev configuration");
        Config::builder()
            .add_source(config::File::with_name("config/settings"))
            .add_source(config::File::with_name("config/dev_settings").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
    };

    validate(settings.try_deserialize()?)
}

fn validate(config: AppConfig) -> anyhow::Result<AppConfig> {
    if config.capture.interval_ms == 0 {
        anyhow::bail!("capture.interval_ms must be greater than zero");
    }
    Ok(config)
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub capture: CaptureConfig,
    pub alerts: AlertsConfig,
    pub speech: SpeechConfig,
    pub location: LocationConfig,
    pub voice_command: VoiceCommandConfig,
    pub output: OutputConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CaptureConfig {
    pub device_index: usize,
    pub width: u32,
    pub height: u32,
    pub interval_ms: u64,
    /// Replays this JPEG instead of opening a camera
    pub still_image: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AlertsConfig {
    /// A warning containing any of these is treated as an environment hazard
    pub environment_keywords: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEngineKind {
    Command,
    Silent,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SpeechConfig {
    pub engine: SpeechEngineKind,
    pub program: String,
    pub voice: String,
    pub base_words_per_minute: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub cache_ms: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct VoiceCommandConfig {
    pub record_secs: u64,
    /// Sent instead of recording from the microphone
    pub wav_file: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct OutputConfig {
    pub annotated_image_dir: PathBuf,
}
