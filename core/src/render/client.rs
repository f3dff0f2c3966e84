use async_trait::async_trait;
use log::debug;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use url::Url;

use super::{RawRenderedPage, RenderRequest, RenderService, RenderedPage};
use crate::error::{RenderServiceError, XssMapError};

const SERVICE_NAME: &str = "PhantomJS rendering engine";

/// Talks to the PhantomJS render server over HTTP.
pub struct PhantomRenderClient {
    inner: Client,
    address: Url,
    timeout: Duration,
}

impl PhantomRenderClient {
    pub fn new(address: &str, timeout_seconds: u64) -> Result<Self, XssMapError> {
        let address = Url::parse(address).map_err(|e| {
            XssMapError::Config(format!("Invalid render service address '{}': {}", address, e))
        })?;
        let timeout = Duration::from_secs(timeout_seconds);

        let inner = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(RenderServiceError::Transport)?;

        Ok(Self {
            inner,
            address,
            timeout,
        })
    }

    fn is_local(&self) -> bool {
        matches!(self.address.host_str(), Some("127.0.0.1") | Some("localhost"))
    }

    /// Best-effort check that something is listening on the local render port.
    ///
    /// Binding the port succeeding means nobody holds it. An unrelated
    /// process on the same port passes the check.
    pub async fn ensure_local_service_is_up(&self) -> Result<(), RenderServiceError> {
        if !self.is_local() {
            return Ok(());
        }

        let port = match self.address.port_or_known_default() {
            Some(port) => port,
            None => return Ok(()),
        };

        match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                drop(listener);
                Err(RenderServiceError::Unavailable {
                    name: SERVICE_NAME.to_string(),
                    address: self.address.to_string(),
                })
            }
            Err(_) => Ok(()),
        }
    }

    fn classify_transport_error(&self, err: reqwest::Error) -> RenderServiceError {
        if err.is_timeout() {
            RenderServiceError::Timeout {
                address: self.address.to_string(),
                timeout: self.timeout,
            }
        } else {
            RenderServiceError::Transport(err)
        }
    }
}

#[async_trait]
impl RenderService for PhantomRenderClient {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, RenderServiceError> {
        let fields = request
            .to_form_fields()
            .map_err(|e| RenderServiceError::malformed("request", e))?;

        debug!("Rendering {} {}", request.method, request.url);

        let response = self
            .inner
            .post(self.address.clone())
            .form(&fields)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderServiceError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let raw: RawRenderedPage =
            serde_json::from_str(&text).map_err(|e| RenderServiceError::malformed("response", e))?;

        raw.decode()
    }

    async fn ensure_available(&self) -> Result<(), RenderServiceError> {
        self.ensure_local_service_is_up().await
    }
}
