use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::models::{Bounds, Stroke};
use crate::settings::RecognitionSettings;

use super::error::RecognitionError;
use super::recognizer::{RecognizeOptions, Recognizer, RecognizerOutput};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Confidence reported for a non-empty result when the service omits one.
const DEFAULT_REMOTE_CONFIDENCE: f64 = 0.8;

/// Turns strokes into PNG bytes for vision recognizers.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, strokes: &[Stroke], bounds: Option<&Bounds>) -> Result<Vec<u8>, RecognitionError>;
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    latex: String,
    confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub status: String,
    #[serde(default, alias = "model_loaded")]
    pub model_loaded: bool,
    #[serde(default, alias = "model_id")]
    pub model_id: Option<String>,
}

/// Client for an HTTP recognition service exposing `/recognize` and `/health`.
pub struct HttpRecognizer {
    id: String,
    client: Client,
    endpoint: String,
    model: Option<String>,
    rasterizer: Arc<dyn Rasterizer>,
}

impl HttpRecognizer {
    pub fn new(
        id: impl Into<String>,
        endpoint: impl Into<String>,
        model: Option<String>,
        timeout: Duration,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build recognition http client")?;

        Ok(Self {
            id: id.into(),
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model,
            rasterizer,
        })
    }

    pub fn from_settings(settings: &RecognitionSettings, rasterizer: Arc<dyn Rasterizer>) -> Result<Self> {
        Self::new(
            settings.provider.clone(),
            settings.endpoint.clone(),
            settings.model.clone(),
            Duration::from_millis(settings.request_timeout_ms),
            rasterizer,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn health(&self) -> Result<ProviderHealth, RecognitionError> {
        let url = format!("{}/health", self.endpoint);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|err| RecognitionError::Parse(format!("health response: {err}")))
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn recognize(
        &self,
        strokes: &[Stroke],
        options: &RecognizeOptions,
    ) -> Result<RecognizerOutput, RecognitionError> {
        if strokes.is_empty() {
            return Ok(RecognizerOutput::failed("render failure: no strokes to rasterize"));
        }

        let png = match self.rasterizer.rasterize(strokes, options.bounds.as_ref()) {
            Ok(png) if !png.is_empty() => png,
            Ok(_) => return Ok(RecognizerOutput::failed("render failure: empty image")),
            Err(err) => {
                log_warn!("rasterization failed for {} strokes: {err}", strokes.len());
                return Ok(RecognizerOutput::failed(err.to_string()));
            }
        };

        let request = RecognizeRequest {
            image: format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(&png)),
            model: self.model.as_deref(),
        };

        let url = format!("{}/recognize", self.endpoint);
        log_debug!("posting {} byte image to {}", png.len(), url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        parse_recognize_response(status, &body)
    }
}

/// Map a `/recognize` reply onto the recognizer contract.
pub fn parse_recognize_response(status: StatusCode, body: &str) -> Result<RecognizerOutput, RecognitionError> {
    if !status.is_success() {
        return Err(status_error(status, body));
    }

    let parsed: RecognizeResponse = serde_json::from_str(body)
        .map_err(|err| RecognitionError::Parse(format!("recognize response: {err}")))?;
    let latex = parsed.latex.trim().to_string();
    let confidence = match parsed.confidence {
        Some(value) if value.is_finite() => value.clamp(0.0, 1.0),
        Some(_) => 0.0,
        None if latex.is_empty() => 0.0,
        None => DEFAULT_REMOTE_CONFIDENCE,
    };

    Ok(RecognizerOutput::success(latex, confidence))
}

fn status_error(status: StatusCode, body: &str) -> RecognitionError {
    if status == StatusCode::SERVICE_UNAVAILABLE && body.contains("not_ready") {
        return RecognitionError::ProviderNotReady(error_detail(body));
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return RecognitionError::Network(format!("server responded {status}"));
    }
    RecognitionError::Provider(format!("{status}: {}", error_detail(body)))
}

/// Pull `detail.error` / `detail` out of an error body, else the raw text.
fn error_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    let detail = &value["detail"];
    detail["error"]
        .as_str()
        .or_else(|| detail.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

fn transport_error(err: reqwest::Error) -> RecognitionError {
    if err.is_decode() {
        RecognitionError::Parse(err.to_string())
    } else {
        RecognitionError::Network(err.to_string())
    }
}
