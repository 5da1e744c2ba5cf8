//! Command dispatch.
//!
//! A [`Dispatcher`] maps command names to handlers. Every dispatch gets a
//! fresh response channel, decodes the JSON payload before the handler runs,
//! and runs the handler in its own task. Whatever the handler does, the
//! channel is closed exactly once when the command ends.

mod handlers;

pub use handlers::{register, Services};

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::{ControlError, ControlResult};
use crate::response::{channel, ResponseReceiver, ResponseStream};

/// Name of the built-in command that lists the registry.
pub const API_COMMAND: &str = "API";

/// Version reported by the [`API_COMMAND`].
pub const API_VERSION: u32 = 1;

type BoxedHandler =
    Arc<dyn Fn(Bytes, ResponseStream) -> BoxFuture<'static, ControlResult<()>> + Send + Sync>;

/// Reply of the built-in [`API_COMMAND`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ApiDescription {
    /// Protocol version.
    pub version: u32,
    /// Registered command names.
    pub methods: Vec<String>,
}

/// Registry of command handlers.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: Arc<BTreeMap<String, BoxedHandler>>,
}

impl Dispatcher {
    /// Start building a dispatcher whose handlers share `state`.
    pub fn builder<S: Send + Sync + 'static>(state: Arc<S>) -> DispatcherBuilder<S> {
        DispatcherBuilder {
            state,
            handlers: BTreeMap::new(),
        }
    }

    /// Registered command names in ascending order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Whether a handler is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Run command `name` with `payload` and return its response.
    ///
    /// Must be called from within a tokio runtime. The returned receiver
    /// always ends with a close frame.
    pub fn dispatch(&self, name: &str, payload: impl Into<Bytes>) -> ResponseReceiver {
        let (response, receiver) = channel();

        let Some(handler) = self.handlers.get(name).cloned() else {
            warn!(command = %name, "unknown command");
            let err = ControlError::UnknownCommand(name.to_owned());
            if let Err(e) = response.error(err.code(), err.to_string()) {
                debug!(error = %e, "unable to report unknown command");
            }
            response.close();
            return receiver;
        };

        let payload = payload.into();
        let span = info_span!("command", command = %name);
        tokio::spawn(
            async move {
                let started = Instant::now();
                debug!(payload_len = payload.len(), "command started");

                let task = tokio::spawn(handler(payload, response.clone()).in_current_span());
                let result = match task.await {
                    Ok(result) => result,
                    Err(e) => Err(ControlError::internal(format!("handler aborted: {e}"))),
                };
                finish(&response, result);

                info!(elapsed = ?started.elapsed(), "command finished");
            }
            .instrument(span),
        );

        receiver
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("commands", &self.commands())
            .finish()
    }
}

/// Report the handler's result and close the channel.
fn finish(response: &ResponseStream, result: ControlResult<()>) {
    if response.is_closed() {
        if let Err(e) = result {
            warn!(error = %e, "handler failed after closing its response");
        }
        return;
    }

    if let Err(e) = result {
        error!(code = e.code(), error = %e, "command failed");
        if !response.has_error() {
            if let Err(write_err) = response.error(e.code(), e.to_string()) {
                debug!(error = %write_err, "unable to record command error");
            }
        }
    }
    response.close();
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> ControlResult<T> {
    let payload: &[u8] = if payload.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        payload
    };
    serde_json::from_slice(payload).map_err(|e| ControlError::Decode(e.to_string()))
}

/// Builder for a [`Dispatcher`].
pub struct DispatcherBuilder<S> {
    state: Arc<S>,
    handlers: BTreeMap<String, BoxedHandler>,
}

impl<S: Send + Sync + 'static> DispatcherBuilder<S> {
    /// Register a streaming handler.
    ///
    /// The handler writes its own output into the response; the dispatcher
    /// closes the channel once it returns.
    #[must_use]
    pub fn route<T, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(Arc<S>, T, ResponseStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ControlResult<()>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let boxed: BoxedHandler = Arc::new(move |payload: Bytes, response: ResponseStream| {
            match decode::<T>(&payload) {
                Ok(args) => handler(Arc::clone(&state), args, response).boxed(),
                Err(e) => future::ready(Err(e)).boxed(),
            }
        });
        if self.handlers.insert(name.to_owned(), boxed).is_some() {
            warn!(command = %name, "handler replaced");
        }
        self
    }

    /// Register a handler whose result is written as one JSON chunk.
    ///
    /// A result that serialises to `null` writes nothing.
    #[must_use]
    pub fn unary<T, R, F, Fut>(self, name: &str, handler: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<S>, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ControlResult<R>> + Send + 'static,
    {
        self.route(name, move |state, args: T, response: ResponseStream| {
            let call = handler(state, args);
            async move {
                let value = serde_json::to_value(call.await?)?;
                if !value.is_null() {
                    response.write_json(&value)?;
                }
                Ok(())
            }
        })
    }

    /// Finish the registry, adding the built-in [`API_COMMAND`].
    #[must_use]
    pub fn build(mut self) -> Dispatcher {
        let description = ApiDescription {
            version: API_VERSION,
            methods: self
                .handlers
                .keys()
                .filter(|name| name.as_str() != API_COMMAND)
                .cloned()
                .collect(),
        };
        let api: BoxedHandler = Arc::new(move |_payload: Bytes, response: ResponseStream| {
            future::ready(response.write_json(&description)).boxed()
        });
        self.handlers.insert(API_COMMAND.to_owned(), api);

        Dispatcher {
            handlers: Arc::new(self.handlers),
        }
    }
}
