//! Duplex recognition session over a WebSocket.
//!
//! A session owns one socket. After the handshake a driver task runs the
//! receive loop while a transmit task streams audio frames; both stop on the
//! session's [`CancellationToken`]. The driver delivers exactly one terminal
//! event, then releases the socket, then publishes the terminal status.

use super::events::{CloseReason, RecognitionMessage, SessionEvent};
use super::options::{RecognizeOptions, SessionConfig};
use super::source::AudioSource;
use crate::client::ServiceClient;
use crate::transport::http::USER_AGENT;
use crate::transport::tls::websocket_connector;
use crate::transport::TransportError;
use crate::{Error, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{
    HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT as USER_AGENT_HEADER,
};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

const STOP_FRAME: &str = r#"{"action":"stop"}"#;

/// Headers owned by the upgrade itself; configured values never replace them.
const UPGRADE_HEADERS: [&str; 7] = [
    "host",
    "connection",
    "upgrade",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-extensions",
    "sec-websocket-protocol",
];

/// Lifecycle of a session. `Closed` and `Failed` are terminal and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Open,
    /// Audio is finished or the session is shutting down.
    Closing,
    Closed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Closed | SessionStatus::Failed)
    }
}

/// Receiving side of a session's events; also a [`Stream`].
pub struct SessionEvents {
    rx: mpsc::Receiver<SessionEvent>,
}

impl SessionEvents {
    /// Next event, or `None` once the terminal event has been consumed.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }
}

impl Stream for SessionEvents {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Handle to a running recognition session.
///
/// Dropping the handle cancels the session.
pub struct StreamingSession {
    id: String,
    status: watch::Receiver<SessionStatus>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingSession {
    /// Open a session against `client`'s service, authenticating the upgrade
    /// with the client's authenticator.
    ///
    /// The client's default headers go on the upgrade request; headers set on
    /// the session config take precedence over them.
    pub async fn open(
        client: &ServiceClient,
        options: RecognizeOptions,
        source: AudioSource,
    ) -> Result<(Self, SessionEvents)> {
        let mut config = client.session_config().clone();
        config.headers = client.default_headers().merged_with(&config.headers);
        options.validate(&config)?;
        let url = options.recognize_url(&client.service_url())?;
        let authorization = client.authenticator().authorization().await?;
        Self::connect(url.as_str(), authorization, options, source, config).await
    }

    /// Open a session against an explicit `ws(s)://` URL.
    pub async fn connect(
        url: &str,
        authorization: Option<String>,
        options: RecognizeOptions,
        source: AudioSource,
        config: SessionConfig,
    ) -> Result<(Self, SessionEvents)> {
        options.validate(&config)?;
        let id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        let (status_tx, status_rx) = watch::channel(SessionStatus::Connecting);
        let start_frame = options.start_message()?.to_string();

        info!(session_id = %id, url = %url, "opening recognition session");

        let ws = match handshake(url, authorization.as_deref(), &start_frame, &config).await {
            Ok(ws) => ws,
            Err(e) => {
                error!(session_id = %id, error = %e, "recognition handshake failed");
                status_tx.send_replace(SessionStatus::Failed);
                return Err(e);
            }
        };
        status_tx.send_replace(SessionStatus::Open);

        let (events_tx, events_rx) = mpsc::channel(config.event_capacity.max(1));
        let cancel = CancellationToken::new();
        let driver = Driver {
            id: id.clone(),
            config,
            status: status_tx,
            events: events_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(driver.run(ws, source));

        Ok((
            Self {
                id,
                status: status_rx,
                cancel,
                driver: Mutex::new(Some(handle)),
            },
            SessionEvents { rx: events_rx },
        ))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Wait until the session reaches a terminal status.
    pub async fn closed(&self) -> SessionStatus {
        let mut rx = self.status.clone();
        let outcome = rx.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        outcome.unwrap_or_else(|_| *self.status.borrow())
    }

    /// Cancel the session and wait until its socket is released.
    ///
    /// Safe to call more than once; later calls only wait for the terminal status.
    pub async fn close(&self) -> SessionStatus {
        self.cancel.cancel();
        let handle = self.driver.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(session_id = %self.id, error = %e, "session driver ended abnormally");
            }
        }
        self.closed().await
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

async fn handshake(
    url: &str,
    authorization: Option<&str>,
    start_frame: &str,
    config: &SessionConfig,
) -> Result<WsStream> {
    let mut request = url
        .into_client_request()
        .map_err(|e| Error::handshake(format!("invalid recognize URL: {}", e), None))?;
    let headers = request.headers_mut();
    headers.insert(USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT));
    for (name, value) in config.headers.iter() {
        if UPGRADE_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            debug!(header = %name, "skipping configured header reserved by the upgrade");
            continue;
        }
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::handshake(format!("invalid header name: {}", name), None))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::handshake(format!("invalid value for header {}", name.as_str()), None))?;
        headers.insert(name, value);
    }
    if let Some(value) = authorization {
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::handshake("authorization value is not a valid header", None))?;
        headers.insert(AUTHORIZATION, value);
    }

    let connector = websocket_connector(config.disable_ssl_verification).map_err(Error::Transport)?;
    let connect = connect_async_tls_with_config(request, None, false, connector);
    let (mut ws, _response) = match timeout(config.connect_timeout, connect).await {
        Err(_) => {
            return Err(Error::Transport(TransportError::Timeout(format!(
                "WebSocket connect exceeded {:?}",
                config.connect_timeout
            ))))
        }
        Ok(Err(tungstenite::Error::Http(response))) => {
            let status = response.status().as_u16();
            return Err(Error::handshake(
                format!("server rejected the upgrade with HTTP {}", status),
                Some(status),
            ));
        }
        Ok(Err(tungstenite::Error::Io(e))) => {
            return Err(Error::Transport(TransportError::Connect(e.to_string())))
        }
        Ok(Err(e)) => return Err(Error::handshake(e.to_string(), None)),
        Ok(Ok(pair)) => pair,
    };

    match timeout(config.write_timeout, ws.send(Message::Text(start_frame.to_string()))).await {
        Ok(Ok(())) => Ok(ws),
        Ok(Err(e)) => Err(Error::handshake(format!("failed to send start frame: {}", e), None)),
        Err(_) => Err(Error::handshake("timed out sending start frame", None)),
    }
}

enum Outcome {
    Closed(CloseReason),
    Failed(Error),
}

struct Driver {
    id: String,
    config: SessionConfig,
    status: watch::Sender<SessionStatus>,
    events: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(self, ws: WsStream, source: AudioSource) {
        let (sink, mut stream) = ws.split();
        let sink: WsSink = Arc::new(Mutex::new(sink));
        let stop_sent = Arc::new(AtomicBool::new(false));
        let transmit_cancel = self.cancel.child_token();

        let mut transmit = tokio::spawn(transmit_audio(
            self.id.clone(),
            sink.clone(),
            source,
            self.config.clone(),
            transmit_cancel.clone(),
            stop_sent.clone(),
        ));
        let mut transmit_done = false;

        let outcome = self
            .receive(&mut stream, &mut transmit, &mut transmit_done, &stop_sent)
            .await;

        transmit_cancel.cancel();
        if !transmit_done {
            transmit.abort();
            let _ = transmit.await;
        }

        let remote_closed = matches!(outcome, Outcome::Closed(CloseReason::RemoteClosed { .. }));
        let (event, final_status) = match outcome {
            Outcome::Closed(reason) => {
                self.transition(SessionStatus::Closing);
                info!(session_id = %self.id, reason = ?reason, "recognition session closed");
                (SessionEvent::Closed(reason), SessionStatus::Closed)
            }
            Outcome::Failed(e) => {
                error!(session_id = %self.id, error = %e, "recognition session failed");
                (SessionEvent::Failed(e), SessionStatus::Failed)
            }
        };
        self.deliver_terminal(event).await;

        release(&self.id, &sink, remote_closed, self.config.write_timeout).await;
        drop(stream);
        drop(sink);

        self.transition(final_status);
    }

    async fn receive(
        &self,
        stream: &mut SplitStream<WsStream>,
        transmit: &mut JoinHandle<Result<()>>,
        transmit_done: &mut bool,
        stop_sent: &AtomicBool,
    ) -> Outcome {
        let mut listening_seen = false;

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Outcome::Closed(CloseReason::Cancelled),
                joined = &mut *transmit, if !*transmit_done => {
                    *transmit_done = true;
                    match joined {
                        Ok(Ok(())) => {
                            self.transition(SessionStatus::Closing);
                            continue;
                        }
                        Ok(Err(e)) => return Outcome::Failed(e),
                        Err(e) => {
                            return Outcome::Failed(Error::stream_protocol(format!(
                                "audio transmit task ended abnormally: {}",
                                e
                            )))
                        }
                    }
                }
                frame = read_frame(stream, self.config.read_timeout) => frame,
            };

            let message = match frame {
                Err(e) => return Outcome::Failed(e),
                Ok(None) => {
                    return Outcome::Closed(CloseReason::RemoteClosed {
                        code: None,
                        reason: String::new(),
                    })
                }
                Ok(Some(message)) => message,
            };

            let event = match message {
                Message::Text(text) => match RecognitionMessage::parse(&text) {
                    Ok(RecognitionMessage::State(state)) if state.is_listening() => {
                        if listening_seen && stop_sent.load(Ordering::Acquire) {
                            return Outcome::Closed(CloseReason::EndOfTranscript);
                        }
                        listening_seen = true;
                        SessionEvent::Listening
                    }
                    Ok(RecognitionMessage::State(state)) => {
                        debug!(session_id = %self.id, state = %state.state, "ignoring state frame");
                        continue;
                    }
                    Ok(RecognitionMessage::Results(results)) => {
                        if results.is_final() {
                            SessionEvent::Final(results)
                        } else {
                            SessionEvent::Interim(results)
                        }
                    }
                    Ok(RecognitionMessage::SpeakerLabels(labels)) => {
                        SessionEvent::SpeakerLabels(labels.speaker_labels)
                    }
                    Ok(RecognitionMessage::ProcessingMetrics(metrics)) => {
                        SessionEvent::ProcessingMetrics(metrics.processing_metrics)
                    }
                    Ok(RecognitionMessage::Error(err)) => {
                        warn!(session_id = %self.id, code = ?err.code, message = %err.error, "service reported an error");
                        SessionEvent::ServerError {
                            message: err.error,
                            code: err.code,
                        }
                    }
                    Err(e) => {
                        return Outcome::Failed(Error::stream_protocol(format!(
                            "malformed text frame: {}",
                            e
                        )))
                    }
                },
                Message::Binary(data) => {
                    return Outcome::Failed(Error::stream_protocol(format!(
                        "unexpected binary frame of {} bytes",
                        data.len()
                    )))
                }
                Message::Close(frame) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    return Outcome::Closed(CloseReason::RemoteClosed { code, reason });
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };

            debug!(session_id = %self.id, event = ?event, "recognition event");
            if let Some(outcome) = self.emit(event).await {
                return outcome;
            }
        }
    }

    /// Forward a non-terminal event; stops the session if the consumer is gone
    /// or the session is cancelled while waiting for queue space.
    async fn emit(&self, event: SessionEvent) -> Option<Outcome> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Some(Outcome::Closed(CloseReason::Cancelled)),
            sent = self.events.send(event) => match sent {
                Ok(()) => None,
                Err(_) => Some(Outcome::Closed(CloseReason::Cancelled)),
            },
        }
    }

    async fn deliver_terminal(&self, event: SessionEvent) {
        if self.cancel.is_cancelled() {
            let _ = self.events.try_send(event);
            return;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = self.events.send(event) => {}
        }
    }

    fn transition(&self, next: SessionStatus) {
        self.status.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn read_frame(
    stream: &mut SplitStream<WsStream>,
    read_timeout: Option<Duration>,
) -> Result<Option<Message>> {
    let next = match read_timeout {
        Some(limit) => timeout(limit, stream.next()).await.map_err(|_| {
            Error::Transport(TransportError::Timeout(format!(
                "no message from the service within {:?}",
                limit
            )))
        })?,
        None => stream.next().await,
    };
    match next {
        None => Ok(None),
        Some(Ok(message)) => Ok(Some(message)),
        Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => Ok(None),
        Some(Err(e)) => Err(Error::Transport(TransportError::WebSocket(e))),
    }
}

async fn transmit_audio(
    session_id: String,
    sink: WsSink,
    mut source: AudioSource,
    config: SessionConfig,
    cancel: CancellationToken,
    stop_sent: Arc<AtomicBool>,
) -> Result<()> {
    let mut frames = 0u64;
    let mut bytes = 0u64;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::SessionClosed),
            chunk = source.next_chunk(config.chunk_size) => chunk?,
        };
        let Some(chunk) = chunk else { break };
        bytes += chunk.len() as u64;
        frames += 1;
        write_frame(&sink, Message::Binary(chunk.to_vec()), config.write_timeout).await?;
    }

    // Set before the write so a reply to the stop frame can never be read first.
    stop_sent.store(true, Ordering::Release);
    write_frame(&sink, Message::Text(STOP_FRAME.to_string()), config.write_timeout).await?;
    debug!(session_id = %session_id, frames, bytes, "audio complete, stop sent");
    Ok(())
}

async fn write_frame(sink: &WsSink, message: Message, write_timeout: Duration) -> Result<()> {
    let mut guard = sink.lock().await;
    match timeout(write_timeout, guard.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::Transport(TransportError::WebSocket(e))),
        Err(_) => Err(Error::Transport(TransportError::Timeout(format!(
            "frame write exceeded {:?}",
            write_timeout
        )))),
    }
}

/// Close our half of the socket without waiting for the peer's close frame.
async fn release(session_id: &str, sink: &WsSink, remote_closed: bool, limit: Duration) {
    let mut guard = sink.lock().await;
    if !remote_closed {
        if let Ok(Err(e)) = timeout(limit, guard.send(Message::Close(None))).await {
            debug!(session_id = %session_id, error = %e, "close frame not sent");
        }
    }
    match timeout(limit, guard.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => {}
        Ok(Err(e)) => warn!(session_id = %session_id, error = %e, "socket close failed"),
        Err(_) => warn!(session_id = %session_id, "socket close timed out"),
    }
}
