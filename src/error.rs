use std::result::Result;
use thiserror::Error;

pub type GuideResult<T> = Result<T, GuideError>;

#[derive(Error, Debug)]
pub enum GuideError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("HTTP request failed")]
    HttpError(#[from] reqwest::Error),
    #[error("Json serde error")]
    JsonError(#[from] serde_json::Error),
    #[error("Failed to decode base64 payload")]
    Base64Error(#[from] base64::DecodeError),
    #[error("Failed to encode wav audio")]
    WavError(#[from] hound::Error),
    #[error("Background task failed")]
    TaskJoinError(#[from] tokio::task::JoinError),
    #[error("Backend returned status {status} for {endpoint}")]
    BackendStatus { endpoint: String, status: u16 },
    #[error("Camera error: {0}")]
    CameraError(String),
    #[error("Microphone error: {0}")]
    MicrophoneError(String),
    #[error("Voice recording already in progress")]
    RecordingInProgress,
    #[error("Speech engine error: {0}")]
    SpeechEngineError(String),
    #[error("Location unavailable")]
    LocationUnavailable,
    #[error("Unsupported facility code {0}")]
    UnsupportedFacility(String),
    #[error("Guide session closed")]
    SessionClosed,
}
