mod http_backend;

pub use http_backend::HttpBackend;

use crate::error::GuideResult;
use crate::location::{Coordinates, LocationQuery};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferMode {
    /// Live capture loop, no annotated image returned
    Realtime,
    /// One-off analysis, the backend returns an annotated image
    Upload,
}

impl InferMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferMode::Realtime => "realtime",
            InferMode::Upload => "upload",
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct InferenceResponse {
    #[serde(default, deserialize_with = "lenient_strings")]
    pub warnings: Vec<String>,
    /// Base64 JPEG with detections drawn on it
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "lenient_objects")]
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub latency: Option<Latency>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DetectedObject {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, rename = "class")]
    pub class_name: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Latency {
    pub total_ms: f64,
    pub inference_ms: f64,
    pub logic_ms: f64,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SttResponse {
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub norm: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ToggleResponse {
    pub enabled: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub(crate) struct IdentityRequest {
    lat: f64,
    lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    category_code: Option<&'static str>,
}

impl IdentityRequest {
    pub(crate) fn new(query: &LocationQuery, position: Coordinates) -> Self {
        let category_code = match query {
            LocationQuery::Facility(category) => Some(category.code()),
            _ => None,
        };
        Self {
            lat: position.lat,
            lng: position.lng,
            category_code,
        }
    }
}

/// Non-string entries and a null list are dropped rather than rejected
fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| match value {
            serde_json::Value::String(text) => Some(text),
            _ => None,
        })
        .collect())
}

fn lenient_objects<'de, D>(deserializer: D) -> Result<Vec<DetectedObject>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect())
}

#[async_trait]
pub trait GuideBackend: Send + Sync {
    async fn infer(&self, frame: Vec<u8>, mode: InferMode) -> GuideResult<InferenceResponse>;

    /// `audio` is a complete WAV file
    async fn transcribe(&self, audio: Vec<u8>) -> GuideResult<SttResponse>;

    async fn identity(
        &self,
        query: &LocationQuery,
        position: Coordinates,
    ) -> GuideResult<MessageResponse>;

    async fn nearby_objects(&self) -> GuideResult<MessageResponse>;

    async fn env_danger(&self) -> GuideResult<MessageResponse>;

    async fn env_safe(&self) -> GuideResult<MessageResponse>;

    async fn toggle_env_alerts(&self) -> GuideResult<ToggleResponse>;

    async fn health(&self) -> GuideResult<HealthResponse>;
}
