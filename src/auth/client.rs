//! Authenticated REST client for the partner API.
//!
//! The bearer header is built per request from whatever the session store
//! holds at that moment. A 401 ends the session through the controller; the
//! request is not retried.

use super::controller::AuthSessionController;
use super::login::parse_body;
use crate::config::ApiConfig;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP 401. Logout has already been initiated.
    #[error("session expired")]
    SessionExpired,

    #[error("{message} (HTTP {status})")]
    Status {
        status: u16,
        message: String,
        body: Value,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

pub struct ApiClient {
    http: reqwest::Client,
    api: ApiConfig,
    controller: Arc<AuthSessionController>,
}

impl ApiClient {
    pub fn new(api: &ApiConfig, controller: Arc<AuthSessionController>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api: api.clone(),
            controller,
        })
    }

    /// A request to `path` under the API base, carrying the current token.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, self.api.endpoint(path))
            .header(ACCEPT, "application/json");
        match self.controller.authorization_header() {
            Some((name, value)) => builder.header(name, value),
            None => builder,
        }
    }

    /// Send and classify the response status.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.controller.handle_session_expired().await;
            return Err(ApiError::SessionExpired);
        }
        if !status.is_success() {
            let body = parse_body(&response.bytes().await?);
            let message = ["/message", "/error"]
                .iter()
                .filter_map(|pointer| body.pointer(pointer))
                .find_map(Value::as_str)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed"))
                .to_string();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
                body,
            });
        }
        Ok(response)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        decode(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(self.request(Method::POST, path).json(body)).await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
