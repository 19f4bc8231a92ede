//! Real-time duplex transcription over WebSocket.
//!
//! ```no_run
//! use futures::StreamExt;
//! use watson_lib_rust::streaming::{AudioSource, RecognizeOptions, SessionEvent};
//! use watson_lib_rust::ServiceClient;
//!
//! # async fn demo(client: ServiceClient) -> watson_lib_rust::Result<()> {
//! let (source, feeder) = AudioSource::channel(16);
//! let options = RecognizeOptions::new("audio/l16;rate=16000").interim_results(true);
//! let (session, mut events) = client.recognize_stream(options, source).await?;
//!
//! tokio::spawn(async move {
//!     let _ = feeder.send(vec![0u8; 3200]).await;
//!     feeder.finish();
//! });
//!
//! while let Some(event) = events.next().await {
//!     match event {
//!         SessionEvent::Final(results) => println!("{}", results.transcript()),
//!         SessionEvent::Failed(e) => return Err(e),
//!         _ => {}
//!     }
//! }
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod options;
pub mod session;
pub mod source;

pub use events::{
    Alternative, CloseReason, RecognitionMessage, RecognitionResult, ResultsMessage, SessionEvent,
    SpeakerLabel,
};
pub use options::{RecognizeOptions, SessionConfig, RECOGNIZE_PATH};
pub use session::{SessionEvents, SessionStatus, StreamingSession};
pub use source::{AudioFeeder, AudioSource};
