//! A stand-in for the object detection backend.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use axum::{Json, Router, extract::Multipart, extract::State, http::StatusCode, routing::post};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Bytes returned as the annotated image by a healthy fake backend.
pub const ANNOTATED_IMAGE: &[u8] = b"\x89PNG\r\n\x1a\nannotated";

/// How the fake backend answers.
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Detects the given `(label, score)` pairs and returns [`ANNOTATED_IMAGE`].
    Detect(Vec<(&'static str, f64)>),
    /// Answers every request with a 500.
    Fail,
}

impl Default for Behavior {
    fn default() -> Self {
        Behavior::Detect(vec![("dog", 0.9), ("cat", 0.6)])
    }
}

#[derive(Clone)]
struct FakeState {
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

/// A running fake backend.
pub struct FakeDetector {
    pub address: SocketAddr,
    calls: Arc<AtomicUsize>,
}

impl FakeDetector {
    /// Starts the backend on an ephemeral port.
    pub async fn start(behavior: Behavior) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));

        let state = FakeState {
            behavior,
            calls: calls.clone(),
        };

        let app = Router::new().route("/detect", post(detect)).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { address, calls }
    }

    /// URL to configure as `detector.url`.
    pub fn url(&self) -> String {
        format!("http://{}/detect", self.address)
    }

    /// Number of detection requests received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn detect(State(state): State<FakeState>, mut multipart: Multipart) -> (StatusCode, Json<Value>) {
    state.calls.fetch_add(1, Ordering::SeqCst);

    let mut received = false;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            received = field.bytes().await.is_ok_and(|bytes| !bytes.is_empty());
        }
    }

    if !received {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "missing file"})));
    }

    match state.behavior {
        Behavior::Fail => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "model crashed"}))),
        Behavior::Detect(objects) => {
            let detections: Vec<Value> = objects
                .iter()
                .enumerate()
                .map(|(i, (label, score))| {
                    let offset = i as f64 * 10.0;
                    json!({"label": label, "score": score, "bbox": [offset, offset, offset + 50.0, offset + 40.0]})
                })
                .collect();

            let body = json!({
                "detections": detections,
                "annotated_image": STANDARD.encode(ANNOTATED_IMAGE),
            });

            (StatusCode::OK, Json(body))
        }
    }
}
