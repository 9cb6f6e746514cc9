use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, info};

use crate::classifier::traits::{sort_by_confidence, Classification, Classifier};
use crate::config::ClassifierConfig;
use crate::error::{ClassificationError, ConfigError, Result, StackerError};

/// Classifier backed by a hosted classification endpoint
///
/// Each frame is uploaded as a base64 JPEG in a form-encoded POST to
/// `{endpoint}/{project}/{version}?api_key=...`.
pub struct HostedClassifier {
    client: reqwest::Client,
    url: String,
    api_key: String,
    jpeg_quality: u8,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct HostedResponse {
    #[serde(default)]
    predictions: Vec<HostedPrediction>,
    top: Option<String>,
    confidence: Option<f32>,
}

// Newer responses name the label `class`, older ones `top`
#[derive(Debug, Deserialize)]
struct HostedPrediction {
    class: Option<String>,
    top: Option<String>,
    confidence: Option<f32>,
}

impl HostedClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::MissingKey {
                key: "classifier.api_key".to_string(),
            }.into());
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| StackerError::generic(format!("Failed to build HTTP client: {}", e)))?;

        let url = format!(
            "{}/{}/{}",
            config.endpoint.trim_end_matches('/'),
            config.project,
            config.version
        );
        info!("Using hosted classifier at {}", url);

        Ok(Self {
            client,
            url,
            api_key: config.api_key.trim().to_string(),
            jpeg_quality: config.jpeg_quality,
            timeout_ms: config.request_timeout_ms,
        })
    }

    fn encode_frame(&self, frame: &RgbImage) -> std::result::Result<String, ClassificationError> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality)
            .encode(frame.as_raw(), frame.width(), frame.height(), image::ColorType::Rgb8)
            .map_err(|e| ClassificationError::EncodingFailed { reason: e.to_string() })?;

        Ok(STANDARD.encode(&jpeg))
    }

    /// Turn a response body into predictions sorted by descending confidence
    pub(crate) fn parse_response(body: &str) -> std::result::Result<Vec<Classification>, ClassificationError> {
        let response: HostedResponse = serde_json::from_str(body)
            .map_err(|e| ClassificationError::MalformedResponse { reason: e.to_string() })?;

        let mut predictions = response
            .predictions
            .into_iter()
            .map(|p| match (p.class.or(p.top), p.confidence) {
                (Some(label), Some(confidence)) => Self::checked(label, confidence),
                _ => Err(ClassificationError::MalformedResponse {
                    reason: "prediction without label or confidence".to_string(),
                }),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if predictions.is_empty() {
            if let (Some(label), Some(confidence)) = (response.top, response.confidence) {
                predictions.push(Self::checked(label, confidence)?);
            }
        }

        sort_by_confidence(&mut predictions);
        Ok(predictions)
    }

    fn checked(label: String, confidence: f32) -> std::result::Result<Classification, ClassificationError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ClassificationError::MalformedResponse {
                reason: format!("confidence {} out of range for '{}'", confidence, label),
            });
        }
        Ok(Classification::new(label, confidence))
    }
}

#[async_trait]
impl Classifier for HostedClassifier {
    fn name(&self) -> &str {
        "hosted"
    }

    async fn classify(&self, frame: &RgbImage) -> std::result::Result<Vec<Classification>, ClassificationError> {
        let body = self.encode_frame(frame)?;

        let response = self
            .client
            .post(&self.url)
            .query(&[("api_key", self.api_key.as_str())])
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassificationError::Timeout { after_ms: self.timeout_ms }
                } else {
                    ClassificationError::RequestFailed { reason: e.to_string() }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassificationError::BadStatus { status: status.as_u16() });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ClassificationError::RequestFailed { reason: e.to_string() })?;

        let predictions = Self::parse_response(&text)?;
        debug!("Hosted classifier returned {} predictions", predictions.len());
        Ok(predictions)
    }
}
