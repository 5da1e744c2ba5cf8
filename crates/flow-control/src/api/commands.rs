//! Command endpoints.

use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::response::ResponseFrame;

use super::AppState;

/// Content type of streamed command responses.
pub const NDJSON: &str = "application/x-ndjson";

/// One line of a streamed command response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireFrame {
    /// Output chunk, as text.
    Chunk {
        /// Chunk contents.
        data: String,
    },
    /// Terminal error.
    Error {
        /// Wire error code.
        code: i32,
        /// Error message.
        message: String,
    },
    /// End of the response.
    Close,
}

impl From<ResponseFrame> for WireFrame {
    fn from(frame: ResponseFrame) -> Self {
        match frame {
            ResponseFrame::Chunk(chunk) => Self::Chunk {
                data: String::from_utf8_lossy(&chunk).into_owned(),
            },
            ResponseFrame::Error { code, message } => Self::Error { code, message },
            ResponseFrame::Close => Self::Close,
        }
    }
}

fn encode(frame: ResponseFrame) -> Bytes {
    let mut line = serde_json::to_vec(&WireFrame::from(frame)).unwrap_or_default();
    line.push(b'\n');
    Bytes::from(line)
}

/// List registered commands.
pub async fn list_commands(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.dispatcher.commands())
}

/// Run a command; the request body is its JSON payload.
pub async fn run_command(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Bytes,
) -> Response {
    let known = state.dispatcher.contains(&name);
    info!(command = %name, known, payload_len = payload.len(), "command requested");

    let receiver = state.dispatcher.dispatch(&name, payload);
    let status = if known {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    let body = Body::from_stream(
        receiver
            .into_stream()
            .map(|frame| Ok::<_, Infallible>(encode(frame))),
    );

    (status, [(header::CONTENT_TYPE, NDJSON)], body).into_response()
}
