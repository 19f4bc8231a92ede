//! Recognition sessions against a local WebSocket server.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use watson_lib_rust::streaming::CloseReason;
use watson_lib_rust::{
    AudioSource, Error, RecognizeOptions, ServiceClient, ServiceConfig, SessionConfig, SessionEvent,
    SessionEvents, SessionStatus, StreamingSession, TransportError,
};

type ServerSocket = WebSocketStream<TcpStream>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Accept one connection and hand the socket to `handler`; returns the `ws://` URL.
async fn serve_once<F, Fut>(handler: F) -> String
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        handler(ws).await;
    });
    format!("ws://{}/v1/recognize", addr)
}

async fn read_start(ws: &mut ServerSocket) -> Value {
    match ws.next().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected start frame, got {:?}", other),
    }
}

async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Read until the client closes; tolerate abrupt disconnects.
async fn drain(ws: &mut ServerSocket) {
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Close(_) = message {
            break;
        }
    }
}

async fn collect(events: &mut SessionEvents) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Some(event) = timeout(Duration::from_secs(5), events.next())
        .await
        .expect("event stream stalled")
    {
        out.push(event);
    }
    out
}

fn test_config() -> SessionConfig {
    SessionConfig {
        connect_timeout: Duration::from_secs(5),
        write_timeout: Duration::from_secs(5),
        read_timeout: Some(Duration::from_secs(5)),
        chunk_size: 8192,
        event_capacity: 16,
        ..SessionConfig::default()
    }
}

fn results(is_final: bool, transcript: &str) -> Value {
    json!({
        "result_index": 0,
        "results": [{"final": is_final, "alternatives": [{"transcript": transcript}]}]
    })
}

#[tokio::test]
async fn end_of_transcript_closes_with_one_terminal_event() {
    init_tracing();
    let (audio_tx, audio_rx) = oneshot::channel::<(Value, usize, usize)>();

    let url = serve_once(move |mut ws| async move {
        let start = read_start(&mut ws).await;
        send_json(&mut ws, json!({"state": "listening"})).await;

        let mut frames = 0;
        let mut bytes = 0;
        loop {
            match ws.next().await {
                Some(Ok(Message::Binary(data))) => {
                    frames += 1;
                    bytes += data.len();
                }
                Some(Ok(Message::Text(text))) => {
                    assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({"action": "stop"}));
                    break;
                }
                other => panic!("unexpected client frame {:?}", other),
            }
        }
        let _ = audio_tx.send((start, frames, bytes));

        send_json(&mut ws, results(false, "hello")).await;
        send_json(&mut ws, results(true, "hello world ")).await;
        send_json(&mut ws, json!({"state": "listening"})).await;
        drain(&mut ws).await;
    })
    .await;

    let options = RecognizeOptions::new("audio/l16;rate=16000").interim_results(true);
    let (session, mut events) = StreamingSession::connect(
        &url,
        Some("Bearer test".into()),
        options,
        AudioSource::from_bytes(vec![0u8; 20_000]),
        test_config(),
    )
    .await
    .unwrap();

    let received = collect(&mut events).await;
    assert!(matches!(received[0], SessionEvent::Listening));
    assert!(matches!(&received[1], SessionEvent::Interim(r) if r.transcript() == "hello"));
    assert!(matches!(&received[2], SessionEvent::Final(r) if r.transcript() == "hello world "));
    assert!(matches!(received[3], SessionEvent::Closed(CloseReason::EndOfTranscript)));
    assert_eq!(received.len(), 4);
    assert_eq!(received.iter().filter(|e| e.is_terminal()).count(), 1);

    assert_eq!(session.closed().await, SessionStatus::Closed);
    // Closing a finished session changes nothing.
    assert_eq!(session.close().await, SessionStatus::Closed);

    let (start, frames, bytes) = audio_rx.await.unwrap();
    assert_eq!(start["action"], "start");
    assert_eq!(start["content-type"], "audio/l16;rate=16000");
    assert_eq!(start["interim_results"], true);
    assert_eq!(frames, 3);
    assert_eq!(bytes, 20_000);
}

#[tokio::test]
async fn close_cancels_without_hanging() {
    let url = serve_once(|mut ws| async move {
        read_start(&mut ws).await;
        send_json(&mut ws, json!({"state": "listening"})).await;
        drain(&mut ws).await;
    })
    .await;

    let (source, feeder) = AudioSource::channel(4);
    let (session, mut events) = StreamingSession::connect(
        &url,
        None,
        RecognizeOptions::new("audio/wav"),
        source,
        test_config(),
    )
    .await
    .unwrap();
    feeder.send(vec![1u8; 512]).await.unwrap();

    let first = timeout(Duration::from_secs(5), events.next()).await.unwrap();
    assert!(matches!(first, Some(SessionEvent::Listening)));

    let status = timeout(Duration::from_secs(5), session.close())
        .await
        .expect("close hung");
    assert_eq!(status, SessionStatus::Closed);
    assert_eq!(session.close().await, SessionStatus::Closed);

    let rest = collect(&mut events).await;
    assert_eq!(rest.len(), 1);
    assert!(matches!(rest[0], SessionEvent::Closed(CloseReason::Cancelled)));

    assert!(feeder.is_closed());
    assert!(matches!(feeder.send(vec![0u8]).await, Err(Error::SessionClosed)));
}

#[tokio::test]
async fn dropping_the_session_cancels_it() {
    let url = serve_once(|mut ws| async move {
        read_start(&mut ws).await;
        drain(&mut ws).await;
    })
    .await;

    let (source, _feeder) = AudioSource::channel(1);
    let (session, mut events) =
        StreamingSession::connect(&url, None, RecognizeOptions::new("audio/wav"), source, test_config())
            .await
            .unwrap();
    drop(session);

    let rest = collect(&mut events).await;
    assert_eq!(rest.len(), 1);
    assert!(matches!(rest[0], SessionEvent::Closed(CloseReason::Cancelled)));
}

#[tokio::test]
async fn malformed_frame_fails_the_session() {
    let url = serve_once(|mut ws| async move {
        read_start(&mut ws).await;
        ws.send(Message::Text("this is not json".into())).await.unwrap();
        drain(&mut ws).await;
    })
    .await;

    let (source, _feeder) = AudioSource::channel(1);
    let (session, mut events) =
        StreamingSession::connect(&url, None, RecognizeOptions::new("audio/wav"), source, test_config())
            .await
            .unwrap();

    let received = collect(&mut events).await;
    assert_eq!(received.len(), 1);
    assert!(matches!(received[0], SessionEvent::Failed(Error::StreamProtocol { .. })));
    assert_eq!(session.closed().await, SessionStatus::Failed);
    assert_eq!(session.close().await, SessionStatus::Failed);
}

#[tokio::test]
async fn binary_frame_from_server_is_a_protocol_error() {
    let url = serve_once(|mut ws| async move {
        read_start(&mut ws).await;
        ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        drain(&mut ws).await;
    })
    .await;

    let (source, _feeder) = AudioSource::channel(1);
    let (_session, mut events) =
        StreamingSession::connect(&url, None, RecognizeOptions::new("audio/wav"), source, test_config())
            .await
            .unwrap();

    let received = collect(&mut events).await;
    assert!(matches!(received.as_slice(), [SessionEvent::Failed(Error::StreamProtocol { .. })]));
}

#[tokio::test]
async fn server_error_is_reported_then_remote_close_ends() {
    let url = serve_once(|mut ws| async move {
        read_start(&mut ws).await;
        send_json(&mut ws, json!({"state": "listening"})).await;
        send_json(&mut ws, json!({"error": "No speech detected for 30s.", "code": 400})).await;
        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "done".into(),
        }))
        .await
        .unwrap();
        drain(&mut ws).await;
    })
    .await;

    let (source, _feeder) = AudioSource::channel(1);
    let (session, mut events) =
        StreamingSession::connect(&url, None, RecognizeOptions::new("audio/wav"), source, test_config())
            .await
            .unwrap();

    let received = collect(&mut events).await;
    assert_eq!(received.len(), 3);
    assert!(matches!(received[0], SessionEvent::Listening));
    assert!(matches!(
        &received[1],
        SessionEvent::ServerError { message, code: Some(400) } if message.starts_with("No speech")
    ));
    assert!(matches!(
        &received[2],
        SessionEvent::Closed(CloseReason::RemoteClosed { code: Some(1000), reason }) if reason == "done"
    ));
    assert_eq!(session.closed().await, SessionStatus::Closed);
}

#[tokio::test]
async fn silent_server_trips_the_read_timeout() {
    let url = serve_once(|mut ws| async move {
        read_start(&mut ws).await;
        drain(&mut ws).await;
    })
    .await;

    let config = SessionConfig {
        read_timeout: Some(Duration::from_millis(200)),
        ..test_config()
    };
    let (session, mut events) = StreamingSession::connect(
        &url,
        None,
        RecognizeOptions::new("audio/wav"),
        AudioSource::from_bytes(Vec::<u8>::new()),
        config,
    )
    .await
    .unwrap();

    let received = collect(&mut events).await;
    assert!(matches!(
        received.as_slice(),
        [SessionEvent::Failed(Error::Transport(TransportError::Timeout(_)))]
    ));
    assert_eq!(session.closed().await, SessionStatus::Failed);
}

#[tokio::test]
async fn rejected_upgrade_is_a_handshake_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let reject = |_req: &Request, _resp: Response| -> Result<Response, ErrorResponse> {
            let mut denied = ErrorResponse::new(Some("unauthorized".into()));
            *denied.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::UNAUTHORIZED;
            Err(denied)
        };
        let _ = tokio_tungstenite::accept_hdr_async(tcp, reject).await;
    });

    let result = StreamingSession::connect(
        &format!("ws://{}/v1/recognize", addr),
        Some("Bearer bad".into()),
        RecognizeOptions::new("audio/wav"),
        AudioSource::from_bytes(vec![0u8; 10]),
        test_config(),
    )
    .await;

    match result {
        Err(Error::Handshake { status, .. }) => assert_eq!(status, Some(401)),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade should have been rejected"),
    }
}

#[tokio::test]
async fn missing_content_type_is_rejected_before_connecting() {
    let result = StreamingSession::connect(
        "ws://127.0.0.1:1/v1/recognize",
        None,
        RecognizeOptions::default(),
        AudioSource::from_bytes(vec![0u8; 10]),
        test_config(),
    )
    .await;
    assert!(matches!(result, Err(Error::Handshake { status: None, .. })));
}

#[tokio::test]
async fn client_session_uses_service_url_and_credentials() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Arc<StdMutex<Option<(String, Option<String>)>>> = Arc::new(StdMutex::new(None));
    let seen_by_server = seen.clone();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let capture = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let auth = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            *seen_by_server.lock().unwrap() = Some((req.uri().to_string(), auth));
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(tcp, capture).await.unwrap();
        read_start(&mut ws).await;
        send_json(&mut ws, json!({"state": "listening"})).await;
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(_) = message {
                break;
            }
        }
        send_json(&mut ws, json!({"state": "listening"})).await;
        drain(&mut ws).await;
    });

    let client = ServiceClient::builder("speech_to_text")
        .config(
            ServiceConfig::new("speech_to_text")
                .with_url(format!("http://{}/instances/abc", addr))
                .with_basic_auth("user", "pass"),
        )
        .session_config(test_config())
        .build()
        .unwrap();

    let options = RecognizeOptions::new("audio/flac").model("en-US_Telephony");
    let (session, mut events) = client
        .recognize_stream(options, AudioSource::from_bytes(vec![0u8; 100]))
        .await
        .unwrap();

    let received = collect(&mut events).await;
    assert!(matches!(
        received.last(),
        Some(SessionEvent::Closed(CloseReason::EndOfTranscript))
    ));
    assert_eq!(session.close().await, SessionStatus::Closed);

    let (uri, auth) = seen.lock().unwrap().clone().unwrap();
    assert_eq!(uri, "/instances/abc/v1/recognize?model=en-US_Telephony");
    assert_eq!(auth.as_deref(), Some("Basic dXNlcjpwYXNz"));
}

#[tokio::test]
async fn client_default_headers_reach_the_upgrade_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Arc<StdMutex<Vec<(String, String)>>> = Arc::new(StdMutex::new(Vec::new()));
    let seen_by_server = seen.clone();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let capture = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let mut seen = seen_by_server.lock().unwrap();
            for (name, value) in req.headers() {
                seen.push((name.as_str().to_string(), value.to_str().unwrap_or("").to_string()));
            }
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(tcp, capture).await.unwrap();
        read_start(&mut ws).await;
        send_json(&mut ws, json!({"state": "listening"})).await;
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(_) = message {
                break;
            }
        }
        send_json(&mut ws, json!({"state": "listening"})).await;
        drain(&mut ws).await;
    });

    let client = ServiceClient::builder("speech_to_text")
        .config(
            ServiceConfig::new("speech_to_text")
                .with_url(format!("http://{}", addr))
                .with_default_header("X-Watson-Learning-Opt-Out", "true"),
        )
        .default_header("Upgrade", "h2c")
        .session_config(test_config())
        .build()
        .unwrap();

    let (session, mut events) = client
        .recognize_stream(RecognizeOptions::new("audio/wav"), AudioSource::from_bytes(vec![0u8; 10]))
        .await
        .unwrap();
    let received = collect(&mut events).await;
    assert!(matches!(
        received.last(),
        Some(SessionEvent::Closed(CloseReason::EndOfTranscript))
    ));
    assert_eq!(session.close().await, SessionStatus::Closed);

    let seen = seen.lock().unwrap().clone();
    let value = |name: &str| {
        seen.iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };
    assert_eq!(value("x-watson-learning-opt-out").as_deref(), Some("true"));
    assert_eq!(value("upgrade").as_deref(), Some("websocket"));
    assert!(value("user-agent").unwrap().starts_with("watson-lib-rust/"));
}
