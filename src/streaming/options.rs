//! Open-time parameters for a recognition session.

use crate::client::HeaderList;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Path of the recognition endpoint, relative to the service URL.
pub const RECOGNIZE_PATH: &str = "v1/recognize";

/// Timeouts and sizes governing a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    /// Bound on each outbound frame write.
    pub write_timeout: Duration,
    /// Longest silence tolerated from the server; `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Bytes of audio per binary frame.
    pub chunk_size: usize,
    pub event_capacity: usize,
    /// Extra headers sent with the upgrade request.
    pub headers: HeaderList,
    /// Accept any server certificate on `wss://` connections.
    pub disable_ssl_verification: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            read_timeout: Some(Duration::from_secs(60)),
            chunk_size: 8 * 1024,
            event_capacity: 256,
            headers: HeaderList::new(),
            disable_ssl_verification: false,
        }
    }
}

/// Recognition parameters.
///
/// Model and customization fields go on the upgrade URL; everything else is
/// sent in the `start` frame. Unset fields are omitted and left to the
/// service's defaults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecognizeOptions {
    #[serde(rename = "content-type")]
    pub content_type: String,

    #[serde(skip)]
    pub model: Option<String>,
    #[serde(skip)]
    pub language_customization_id: Option<String>,
    #[serde(skip)]
    pub acoustic_customization_id: Option<String>,
    #[serde(skip)]
    pub customization_weight: Option<f64>,
    #[serde(skip)]
    pub base_model_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactivity_timeout: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interim_results: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_alternatives: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_alternatives_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_confidence: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profanity_filter: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smart_formatting: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_labels: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redaction: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_metrics: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_metrics_interval: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_metrics: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_of_phrase_silence_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_transcript_at_phrase_end: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_detector_sensitivity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_audio_suppression: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_latency: Option<bool>,
}

impl RecognizeOptions {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            ..Default::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn interim_results(mut self, enable: bool) -> Self {
        self.interim_results = Some(enable);
        self
    }

    pub fn speaker_labels(mut self, enable: bool) -> Self {
        self.speaker_labels = Some(enable);
        self
    }

    pub fn keywords(mut self, keywords: Vec<String>, threshold: f64) -> Self {
        self.keywords = Some(keywords);
        self.keywords_threshold = Some(threshold);
        self
    }

    pub fn inactivity_timeout(mut self, seconds: i32) -> Self {
        self.inactivity_timeout = Some(seconds);
        self
    }

    pub fn language_customization_id(mut self, id: impl Into<String>) -> Self {
        self.language_customization_id = Some(id.into());
        self
    }

    pub fn acoustic_customization_id(mut self, id: impl Into<String>) -> Self {
        self.acoustic_customization_id = Some(id.into());
        self
    }

    pub(crate) fn validate(&self, config: &SessionConfig) -> Result<()> {
        if self.content_type.trim().is_empty() {
            return Err(Error::handshake("audio content type is required", None));
        }
        if config.chunk_size == 0 {
            return Err(Error::handshake("chunk size must be non-zero", None));
        }
        Ok(())
    }

    /// The `{"action":"start", ...}` frame.
    pub fn start_message(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("action".to_string(), Value::String("start".to_string()));
        }
        Ok(value)
    }

    /// `ws(s)://<host>/<base path>/v1/recognize?...` derived from the service URL.
    pub fn recognize_url(&self, service_url: &str) -> Result<Url> {
        if service_url.trim().is_empty() {
            return Err(Error::handshake("service URL is required", None));
        }
        let mut url = Url::parse(service_url)
            .map_err(|e| Error::handshake(format!("invalid service URL: {}", e), None))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(Error::handshake(
                    format!("unsupported URL scheme: {}", other),
                    None,
                ))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| Error::handshake("cannot switch URL scheme", None))?;

        let path = format!("{}/{}", url.path().trim_end_matches('/'), RECOGNIZE_PATH);
        url.set_path(&path);
        url.set_query(None);

        {
            let mut query = url.query_pairs_mut();
            if let Some(model) = &self.model {
                query.append_pair("model", model);
            }
            if let Some(id) = &self.language_customization_id {
                query.append_pair("language_customization_id", id);
            }
            if let Some(id) = &self.acoustic_customization_id {
                query.append_pair("acoustic_customization_id", id);
            }
            if let Some(weight) = self.customization_weight {
                query.append_pair("customization_weight", &weight.to_string());
            }
            if let Some(version) = &self.base_model_version {
                query.append_pair("base_model_version", version);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }
}
