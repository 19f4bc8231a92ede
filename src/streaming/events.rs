//! Server frames and the events a session delivers to its consumer.

use crate::Error;
use serde::Deserialize;
use serde_json::Value;

/// One decoded text frame from the recognition service.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecognitionMessage {
    Results(ResultsMessage),
    SpeakerLabels(SpeakerLabelsMessage),
    ProcessingMetrics(ProcessingMetricsMessage),
    State(StateMessage),
    Error(ErrorMessage),
}

impl RecognitionMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultsMessage {
    #[serde(default)]
    pub result_index: u32,
    pub results: Vec<RecognitionResult>,
    #[serde(default)]
    pub speaker_labels: Option<Vec<SpeakerLabel>>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

impl ResultsMessage {
    /// True when every result in the message is final.
    pub fn is_final(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.is_final)
    }

    /// Best-alternative transcripts joined in result order.
    pub fn transcript(&self) -> String {
        self.results
            .iter()
            .filter_map(|r| r.alternatives.first())
            .map(|a| a.transcript.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecognitionResult {
    #[serde(rename = "final", default)]
    pub is_final: bool,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub keywords_result: Option<Value>,
    #[serde(default)]
    pub word_alternatives: Option<Value>,
    #[serde(default)]
    pub end_of_utterance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// `[word, start, end]` triples.
    #[serde(default)]
    pub timestamps: Option<Vec<(String, f64, f64)>>,
    /// `[word, confidence]` pairs.
    #[serde(default)]
    pub word_confidence: Option<Vec<(String, f64)>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeakerLabelsMessage {
    pub speaker_labels: Vec<SpeakerLabel>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeakerLabel {
    pub from: f64,
    pub to: f64,
    pub speaker: i64,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(rename = "final", default)]
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessingMetricsMessage {
    pub processing_metrics: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateMessage {
    pub state: String,
}

impl StateMessage {
    pub fn is_listening(&self) -> bool {
        self.state == "listening"
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
    #[serde(default)]
    pub code: Option<i64>,
}

/// Why a session ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The service acknowledged the stop frame.
    EndOfTranscript,
    /// The service closed the socket.
    RemoteClosed { code: Option<u16>, reason: String },
    /// The caller closed or dropped the session.
    Cancelled,
}

/// Events delivered in arrival order. Exactly one terminal event
/// ([`SessionEvent::Closed`] or [`SessionEvent::Failed`]) ends the sequence.
#[derive(Debug)]
pub enum SessionEvent {
    /// The service is ready for audio.
    Listening,
    Interim(ResultsMessage),
    Final(ResultsMessage),
    SpeakerLabels(Vec<SpeakerLabel>),
    ProcessingMetrics(Value),
    /// A non-fatal error reported by the service; the session stays open.
    ServerError { message: String, code: Option<i64> },
    Closed(CloseReason),
    Failed(Error),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Closed(_) | SessionEvent::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_frame_kind() {
        let listening = RecognitionMessage::parse(r#"{"state":"listening"}"#).unwrap();
        assert!(matches!(listening, RecognitionMessage::State(s) if s.is_listening()));

        let results = RecognitionMessage::parse(
            r#"{"result_index":0,"results":[{"final":true,"alternatives":[{"transcript":"hello ","confidence":0.9}]}]}"#,
        )
        .unwrap();
        match results {
            RecognitionMessage::Results(r) => {
                assert!(r.is_final());
                assert_eq!(r.transcript(), "hello ");
            }
            other => panic!("unexpected {:?}", other),
        }

        let labels = RecognitionMessage::parse(
            r#"{"speaker_labels":[{"from":0.1,"to":0.5,"speaker":1,"confidence":0.8,"final":false}]}"#,
        )
        .unwrap();
        assert!(matches!(labels, RecognitionMessage::SpeakerLabels(m) if m.speaker_labels.len() == 1));

        let err = RecognitionMessage::parse(r#"{"error":"No speech detected for 30s.","code":400}"#).unwrap();
        assert!(matches!(err, RecognitionMessage::Error(e) if e.code == Some(400)));
    }

    #[test]
    fn interim_results_are_not_final() {
        let msg = RecognitionMessage::parse(
            r#"{"result_index":1,"results":[{"final":false,"alternatives":[{"transcript":"hel"}]}]}"#,
        )
        .unwrap();
        assert!(matches!(msg, RecognitionMessage::Results(r) if !r.is_final()));
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        assert!(RecognitionMessage::parse(r#"{"unexpected":true}"#).is_err());
        assert!(RecognitionMessage::parse("not json").is_err());
    }
}
