//! Streaming response channel tied to one in-flight command.
//!
//! The sending half ([`ResponseStream`]) is cheap to clone so a handler and
//! its log buffer's flush callback can both write into it. The receiving half
//! ([`ResponseReceiver`]) yields frames in write order and ends after the
//! single terminal [`ResponseFrame::Close`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{ControlError, ControlResult};

/// One frame of a command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFrame {
    /// Opaque output chunk.
    Chunk(Bytes),
    /// Terminal error record; always followed by [`ResponseFrame::Close`].
    Error {
        /// Wire error code.
        code: i32,
        /// Human readable message.
        message: String,
    },
    /// End of the response.
    Close,
}

#[derive(Debug, Default)]
struct ChannelState {
    closed: AtomicBool,
    errored: AtomicBool,
}

/// Create a connected response channel pair.
#[must_use]
pub fn channel() -> (ResponseStream, ResponseReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = ResponseStream {
        tx,
        state: Arc::new(ChannelState::default()),
    };
    (stream, ResponseReceiver { rx, done: false })
}

/// Write half of a response channel.
#[derive(Debug, Clone)]
pub struct ResponseStream {
    tx: mpsc::UnboundedSender<ResponseFrame>,
    state: Arc<ChannelState>,
}

impl ResponseStream {
    /// Append a chunk to the response.
    ///
    /// Fails with [`ControlError::ChannelClosed`] once the channel is closed.
    pub fn write(&self, chunk: impl Into<Bytes>) -> ControlResult<()> {
        if self.is_closed() {
            return Err(ControlError::ChannelClosed);
        }
        self.send(ResponseFrame::Chunk(chunk.into()));
        Ok(())
    }

    /// Serialise `value` as JSON and append it as one chunk.
    pub fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> ControlResult<()> {
        let encoded = serde_json::to_vec(value)?;
        self.write(encoded)
    }

    /// Record the terminal error. Must be followed by [`close`](Self::close).
    ///
    /// Only one error may be recorded per command.
    pub fn error(&self, code: i32, message: impl Into<String>) -> ControlResult<()> {
        if self.is_closed() {
            return Err(ControlError::ChannelClosed);
        }
        if self.state.errored.swap(true, Ordering::AcqRel) {
            return Err(ControlError::internal("terminal error already recorded"));
        }
        self.send(ResponseFrame::Error {
            code,
            message: message.into(),
        });
        Ok(())
    }

    /// Close the channel. Returns `true` if this call performed the close.
    pub fn close(&self) -> bool {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.send(ResponseFrame::Close);
        true
    }

    /// Whether the channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Whether a terminal error has been recorded.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.state.errored.load(Ordering::Acquire)
    }

    fn send(&self, frame: ResponseFrame) {
        // The caller may have gone away; the command still runs to completion.
        if self.tx.send(frame).is_err() {
            debug!("response receiver dropped, discarding frame");
        }
    }
}

/// Read half of a response channel.
#[derive(Debug)]
pub struct ResponseReceiver {
    rx: mpsc::UnboundedReceiver<ResponseFrame>,
    done: bool,
}

impl ResponseReceiver {
    /// Receive the next frame, or `None` once the response has ended.
    pub async fn recv(&mut self) -> Option<ResponseFrame> {
        if self.done {
            return None;
        }
        let frame = self.rx.recv().await;
        if matches!(frame, Some(ResponseFrame::Close) | None) {
            self.done = true;
        }
        frame
    }

    /// Drain the whole response.
    pub async fn collect(mut self) -> CollectedResponse {
        let mut collected = CollectedResponse::default();
        while let Some(frame) = self.recv().await {
            match frame {
                ResponseFrame::Chunk(chunk) => collected.chunks.push(chunk),
                ResponseFrame::Error { code, message } => collected.error = Some((code, message)),
                ResponseFrame::Close => collected.closed = true,
            }
        }
        collected
    }

    /// Convert into a stream of frames ending with the terminal close.
    pub fn into_stream(self) -> impl futures::Stream<Item = ResponseFrame> + Send {
        futures::stream::unfold(self, |mut receiver| async move {
            receiver.recv().await.map(|frame| (frame, receiver))
        })
    }
}

/// A fully drained response.
#[derive(Debug, Default, Clone)]
pub struct CollectedResponse {
    /// Chunks in write order.
    pub chunks: Vec<Bytes>,
    /// Terminal error, if one was recorded.
    pub error: Option<(i32, String)>,
    /// Whether the response ended with an explicit close.
    pub closed: bool,
}

impl CollectedResponse {
    /// All chunks concatenated as text.
    #[must_use]
    pub fn text(&self) -> String {
        self.chunks
            .iter()
            .map(|c| String::from_utf8_lossy(c))
            .collect()
    }

    /// The last chunk decoded as JSON.
    pub fn last_json<T: serde::de::DeserializeOwned>(&self) -> ControlResult<T> {
        let last = self
            .chunks
            .last()
            .ok_or_else(|| ControlError::internal("response has no chunks"))?;
        Ok(serde_json::from_slice(last)?)
    }
}
