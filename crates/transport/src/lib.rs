//! Single-shot request transports for the cluster admin surfaces.
//!
//! Two channels exist: the HTTP+GraphQL admin API of the control instance and
//! the Lua console reachable through an instance's control socket. Both take a
//! structured [`Payload`] and hand back an uninterpreted [`RawResponse`]. Neither
//! retries; the caller decides what a failure means.

use serde_json::{json, Map, Value};

#[cfg(unix)]
pub mod console;
pub mod error;
pub mod http;

#[cfg(unix)]
pub use console::ConsoleTransport;
pub use error::{TransportError, TransportResult};
pub use http::HttpTransport;

/// A GraphQL document with its variables. Caller data only ever travels in
/// `variables`; `query` is a constant per operation.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphqlRequest {
    pub operation: &'static str,
    pub query: &'static str,
    pub variables: Map<String, Value>,
}

impl GraphqlRequest {
    pub fn new(operation: &'static str, query: &'static str) -> Self {
        Self {
            operation,
            query,
            variables: Map::new(),
        }
    }

    /// Add a variable, skipping `None`-like nulls so optional arguments fall
    /// back to the server defaults.
    pub fn variable(mut self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.variables.insert(name.to_string(), value);
        }
        self
    }

    pub fn body(&self) -> Value {
        json!({
            "query": self.query,
            "variables": self.variables,
        })
    }
}

/// A fixed Lua function body evaluated on an instance with JSON arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleCall {
    pub operation: &'static str,
    pub body: &'static str,
    pub args: Vec<Value>,
}

impl ConsoleCall {
    pub fn new(operation: &'static str, body: &'static str) -> Self {
        Self {
            operation,
            body,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Graphql(GraphqlRequest),
    Console(ConsoleCall),
}

impl Payload {
    pub fn operation(&self) -> &'static str {
        match self {
            Payload::Graphql(request) => request.operation,
            Payload::Console(call) => call.operation,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Graphql(_) => "graphql",
            Payload::Console(_) => "console",
        }
    }
}

/// Response as received, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    /// Any HTTP response with a JSON body, whatever its status.
    Http { status: u16, body: Value },
    /// Result of a console evaluation: the function's return value and the
    /// error it reported (or raised).
    Console { result: Value, error: Option<Value> },
}

/// Sends one payload and returns the raw response.
pub trait Transport: Send + Sync {
    fn send(&self, payload: &Payload) -> TransportResult<RawResponse>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, payload: &Payload) -> TransportResult<RawResponse> {
        (**self).send(payload)
    }
}

/// Routes GraphQL payloads to the admin API and console payloads to the
/// control socket.
pub struct Channels {
    http: Box<dyn Transport>,
    console: Option<Box<dyn Transport>>,
}

impl Channels {
    pub fn new(http: impl Transport + 'static) -> Self {
        Self {
            http: Box::new(http),
            console: None,
        }
    }

    pub fn with_console(mut self, console: impl Transport + 'static) -> Self {
        self.console = Some(Box::new(console));
        self
    }

    /// Build both channels from client configuration.
    pub fn from_config(config: &common::ClientConfig) -> TransportResult<Self> {
        let channels = Self::new(HttpTransport::from_config(config)?);
        #[cfg(unix)]
        if let Some(path) = &config.console_socket {
            return Ok(channels.with_console(ConsoleTransport::new(path, config.timeout())));
        }
        Ok(channels)
    }
}

impl Transport for Channels {
    fn send(&self, payload: &Payload) -> TransportResult<RawResponse> {
        match payload {
            Payload::Graphql(_) => self.http.send(payload),
            Payload::Console(_) => match &self.console {
                Some(console) => console.send(payload),
                None => Err(TransportError::ConsoleNotConfigured),
            },
        }
    }
}
