use super::{
    GuideBackend, HealthResponse, IdentityRequest, InferMode, InferenceResponse, MessageResponse,
    SttResponse, ToggleResponse,
};
use crate::configuration::BackendConfig;
use crate::error::{GuideError, GuideResult};
use crate::location::{Coordinates, LocationQuery};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::*;

const INFER_ENDPOINT: &str = "/api/infer";
const STT_ENDPOINT: &str = "/api/stt";
const NEARBY_OBJECTS_ENDPOINT: &str = "/api/nearby_objects";
const ENV_DANGER_ENDPOINT: &str = "/api/env/danger";
const ENV_SAFE_ENDPOINT: &str = "/api/env/safe";
const ENV_TOGGLE_ENDPOINT: &str = "/api/env/toggle";
const HEALTH_ENDPOINT: &str = "/api/health";

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> GuideResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn read_json<T: DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> GuideResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(GuideError::BackendStatus {
                endpoint: endpoint.to_owned(),
                status: status.as_u16(),
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> GuideResult<T> {
        debug!("GET {}", endpoint);
        let response = self.client.get(self.url(endpoint)).send().await?;
        Self::read_json(endpoint, response).await
    }
}

#[async_trait]
impl GuideBackend for HttpBackend {
    async fn infer(&self, frame: Vec<u8>, mode: InferMode) -> GuideResult<InferenceResponse> {
        debug!(mode = mode.as_str(), bytes = frame.len(), "Sending frame");
        let file = Part::bytes(frame)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new().text("mode", mode.as_str()).part("file", file);

        // the inference route reads mode from the query string
        let response = self
            .client
            .post(self.url(INFER_ENDPOINT))
            .query(&[("mode", mode.as_str())])
            .multipart(form)
            .send()
            .await?;
        let inference: InferenceResponse = Self::read_json(INFER_ENDPOINT, response).await?;
        if let Some(latency) = &inference.latency {
            trace!(
                total_ms = latency.total_ms,
                inference_ms = latency.inference_ms,
                "Inference latency"
            );
        }
        Ok(inference)
    }

    async fn transcribe(&self, audio: Vec<u8>) -> GuideResult<SttResponse> {
        debug!(bytes = audio.len(), "Sending voice command");
        let file = Part::bytes(audio)
            .file_name("voice.wav")
            .mime_str("audio/wav")?;
        let form = Form::new().part("file", file);
        let response = self
            .client
            .post(self.url(STT_ENDPOINT))
            .multipart(form)
            .send()
            .await?;
        let transcript: SttResponse = Self::read_json(STT_ENDPOINT, response).await?;
        info!(
            raw = transcript.raw.as_deref().unwrap_or_default(),
            intent = transcript.intent.as_deref().unwrap_or_default(),
            "Voice command transcribed"
        );
        Ok(transcript)
    }

    async fn identity(
        &self,
        query: &LocationQuery,
        position: Coordinates,
    ) -> GuideResult<MessageResponse> {
        let endpoint = query.endpoint();
        debug!("POST {}", endpoint);
        let response = self
            .client
            .post(self.url(endpoint))
            .json(&IdentityRequest::new(query, position))
            .send()
            .await?;
        Self::read_json(endpoint, response).await
    }

    async fn nearby_objects(&self) -> GuideResult<MessageResponse> {
        self.get_json(NEARBY_OBJECTS_ENDPOINT).await
    }

    async fn env_danger(&self) -> GuideResult<MessageResponse> {
        self.get_json(ENV_DANGER_ENDPOINT).await
    }

    async fn env_safe(&self) -> GuideResult<MessageResponse> {
        self.get_json(ENV_SAFE_ENDPOINT).await
    }

    async fn toggle_env_alerts(&self) -> GuideResult<ToggleResponse> {
        let response = self
            .client
            .post(self.url(ENV_TOGGLE_ENDPOINT))
            .send()
            .await?;
        Self::read_json(ENV_TOGGLE_ENDPOINT, response).await
    }

    async fn health(&self) -> GuideResult<HealthResponse> {
        self.get_json(HEALTH_ENDPOINT).await
    }
}
