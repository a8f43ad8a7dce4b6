use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{Payload, RawResponse, Transport, TransportError, TransportResult};

const ADMIN_API_PATH: &str = "/admin/api";

/// Blocking client for the GraphQL admin API of the control instance.
pub struct HttpTransport {
    endpoint: String,
    client: Client,
    credentials: Option<(String, String)>,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> TransportResult<Self> {
        let endpoint = format!("{}{ADMIN_API_PATH}", base_url.trim_end_matches('/'));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::protocol(&endpoint, err.to_string()))?;
        Ok(Self {
            endpoint,
            client,
            credentials: None,
        })
    }

    pub fn from_config(config: &common::ClientConfig) -> TransportResult<Self> {
        let transport = Self::new(&config.admin_url, config.timeout())?;
        Ok(match (&config.username, &config.password) {
            (Some(user), Some(password)) => transport.with_basic_auth(user, password),
            _ => transport,
        })
    }

    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                target: self.endpoint.clone(),
            }
        } else if err.is_connect() || err.is_request() {
            TransportError::Unreachable {
                target: self.endpoint.clone(),
                reason: err.to_string(),
            }
        } else {
            TransportError::protocol(&self.endpoint, err.to_string())
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, payload: &Payload) -> TransportResult<RawResponse> {
        let Payload::Graphql(request) = payload else {
            return Err(TransportError::Unsupported {
                transport: "http",
                payload: payload.kind(),
            });
        };

        debug!(operation = request.operation, endpoint = %self.endpoint, "sending graphql request");

        let mut builder = self.client.post(&self.endpoint).json(&request.body());
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, Some(password));
        }

        let response = builder.send().map_err(|err| self.classify(err))?;
        let status = response.status();
        let text = response.text().map_err(|err| self.classify(err))?;

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => {
                if !status.is_success() {
                    warn!(operation = request.operation, status = status.as_u16(), "admin api returned an error status");
                }
                Ok(RawResponse::Http {
                    status: status.as_u16(),
                    body,
                })
            }
            Err(err) if status.is_success() => Err(TransportError::protocol(
                &self.endpoint,
                format!("response body is not JSON: {err}"),
            )),
            Err(_) => Err(TransportError::Status {
                target: self.endpoint.clone(),
                status: status.as_u16(),
                body: text,
            }),
        }
    }
}
