//! Direct email/password login against the identity authority.
//!
//! This is the secondary path next to the encrypted handoff. The response
//! shape is not fixed: the token is looked up at each of [`TOKEN_POINTERS`]
//! in order and the first non-empty string wins.
//!
//! Failures are split by where they happened:
//! - [`LoginError::Request`]: never left this process (bad input, bad URL)
//! - [`LoginError::NoResponse`]: sent, but nothing came back
//! - [`LoginError::Rejected`]: the server answered with an error status
//! - [`LoginError::MissingToken`]: the server answered 2xx without a token

use super::token::Token;
use crate::config::ApiConfig;
use reqwest::header::ACCEPT;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Token locations in a login response, highest priority first.
pub const TOKEN_POINTERS: [&str; 3] = ["/token", "/data/token", "/access_token"];

/// Server-supplied message locations, highest priority first.
const MESSAGE_POINTERS: [&str; 2] = ["/message", "/error"];

pub const MISSING_CREDENTIALS: &str = "Email and password are required";
pub const NO_RESPONSE: &str = "No response received from server";
pub const LOGIN_FAILED: &str = "Login failed";
pub const NO_TOKEN: &str = "No token received from server";

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// The request could not be built or sent.
    #[error("{message}")]
    Request { message: String },

    /// The request went out but no response arrived.
    #[error("{message}")]
    NoResponse {
        message: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server replied with an error status.
    #[error("{message} (HTTP {status})")]
    Rejected {
        status: u16,
        message: String,
        details: Value,
    },

    /// The server replied with success but no usable token.
    #[error("{message}")]
    MissingToken {
        status: u16,
        message: String,
        details: Value,
    },
}

impl LoginError {
    pub fn status(&self) -> Option<u16> {
        match self {
            LoginError::Rejected { status, .. } | LoginError::MissingToken { status, .. } => {
                Some(*status)
            }
            LoginError::Request { .. } | LoginError::NoResponse { .. } => None,
        }
    }

    /// User-facing message.
    pub fn message(&self) -> &str {
        match self {
            LoginError::Request { message }
            | LoginError::NoResponse { message, .. }
            | LoginError::Rejected { message, .. }
            | LoginError::MissingToken { message, .. } => message,
        }
    }

    /// Raw response body, when there was one.
    pub fn details(&self) -> Option<&Value> {
        match self {
            LoginError::Rejected { details, .. } | LoginError::MissingToken { details, .. } => {
                Some(details)
            }
            LoginError::Request { .. } | LoginError::NoResponse { .. } => None,
        }
    }

    /// True when the failure is in the transport rather than the application.
    pub fn is_transport(&self) -> bool {
        matches!(self, LoginError::NoResponse { .. })
    }
}

/// A successful login: the token plus the full response body.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub token: Token,
    pub body: Value,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// First non-empty string at [`TOKEN_POINTERS`].
pub fn extract_token(body: &Value) -> Option<Token> {
    TOKEN_POINTERS
        .iter()
        .filter_map(|pointer| body.pointer(pointer))
        .filter_map(Value::as_str)
        .find_map(Token::new)
}

fn first_message(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|pointer| body.pointer(pointer))
        .filter_map(Value::as_str)
        .find(|message| !message.trim().is_empty())
        .map(str::to_string)
}

/// Parse a response body as JSON, keeping non-JSON bodies as a string.
pub(crate) fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn classify_send_error(e: reqwest::Error) -> LoginError {
    if e.is_builder() {
        LoginError::Request {
            message: format!("Login request failed: {e}"),
        }
    } else {
        LoginError::NoResponse {
            message: NO_RESPONSE.to_string(),
            source: e,
        }
    }
}

/// HTTP client for the `login` and `logout` endpoints.
#[derive(Debug, Clone)]
pub struct LoginClient {
    http: reqwest::Client,
    login_url: String,
    logout_url: String,
    auth_header: String,
}

impl LoginClient {
    pub fn new(api: &ApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;
        Ok(Self::with_client(http, api))
    }

    pub fn with_client(http: reqwest::Client, api: &ApiConfig) -> Self {
        Self {
            http,
            login_url: api.endpoint("login"),
            logout_url: api.endpoint("logout"),
            auth_header: api.auth_header.clone(),
        }
    }

    /// Post credentials and extract the token. Empty credentials are rejected
    /// without touching the network.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginSuccess, LoginError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(LoginError::Request {
                message: MISSING_CREDENTIALS.to_string(),
            });
        }

        tracing::debug!(url = %self.login_url, "Posting login request");
        let response = self
            .http
            .post(&self.login_url)
            .header(ACCEPT, "application/json")
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|source| LoginError::NoResponse {
            message: NO_RESPONSE.to_string(),
            source,
        })?;
        let body = parse_body(&bytes);

        if !status.is_success() {
            return Err(LoginError::Rejected {
                status: status.as_u16(),
                message: first_message(&body, &MESSAGE_POINTERS)
                    .unwrap_or_else(|| LOGIN_FAILED.to_string()),
                details: body,
            });
        }

        match extract_token(&body) {
            Some(token) => Ok(LoginSuccess { token, body }),
            None => Err(LoginError::MissingToken {
                status: status.as_u16(),
                message: first_message(&body, &["/error"]).unwrap_or_else(|| NO_TOKEN.to_string()),
                details: body,
            }),
        }
    }

    /// Tell the server to invalidate `token`.
    pub async fn logout(&self, token: &Token) -> Result<(), LoginError> {
        let response = self
            .http
            .post(&self.logout_url)
            .header(ACCEPT, "application/json")
            .header(self.auth_header.as_str(), token.bearer())
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = parse_body(&response.bytes().await.unwrap_or_default());
        Err(LoginError::Rejected {
            status: status.as_u16(),
            message: first_message(&body, &MESSAGE_POINTERS)
                .unwrap_or_else(|| "Logout failed".to_string()),
            details: body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> LoginClient {
        let api = ApiConfig {
            base_url: format!("{}/api", server.uri()),
            ..ApiConfig::default()
        };
        LoginClient::new(&api).unwrap()
    }

    #[test]
    fn token_pointer_priority() {
        let all = json!({"token": "a", "data": {"token": "b"}, "access_token": "c"});
        assert_eq!(extract_token(&all).unwrap().as_str(), "a");

        let nested = json!({"data": {"token": "b"}, "access_token": "c"});
        assert_eq!(extract_token(&nested).unwrap().as_str(), "b");

        let oauth = json!({"access_token": "c"});
        assert_eq!(extract_token(&oauth).unwrap().as_str(), "c");

        let blank_first = json!({"token": "", "data": {"token": 7}, "access_token": "c"});
        assert_eq!(extract_token(&blank_first).unwrap().as_str(), "c");

        assert!(extract_token(&json!({"user": {"id": 1}})).is_none());
        assert!(extract_token(&Value::Null).is_none());
    }

    #[test]
    fn parse_body_keeps_non_json_text() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(b"{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_body(b"<html>502</html>"), json!("<html>502</html>"));
    }

    #[tokio::test]
    async fn empty_password_is_rejected_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server).login("a@b.com", "").await.unwrap_err();
        assert!(matches!(err, LoginError::Request { .. }));
        assert_eq!(err.message(), MISSING_CREDENTIALS);
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn successful_login_posts_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(header("accept", "application/json"))
            .and(body_json(json!({"email": "a@b.com", "password": "pw"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"token": "xyz"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let success = client_for(&server).login("a@b.com", "pw").await.unwrap();
        assert_eq!(success.token.as_str(), "xyz");
        assert_eq!(success.body["data"]["token"], "xyz");
    }

    #[tokio::test]
    async fn error_status_surfaces_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Identifiants invalides"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).login("a@b.com", "bad").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.message(), "Identifiants invalides");
        assert_eq!(err.details().unwrap()["message"], "Identifiants invalides");
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn error_message_falls_back_to_error_field_then_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"email": "a@b.com", "password": "one"})))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_json(json!({"email": "a@b.com", "password": "two"})))
            .respond_with(ResponseTemplate::new(422).set_body_string("unprocessable"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.login("a@b.com", "one").await.unwrap_err();
        assert_eq!(err.message(), "boom");
        assert_eq!(err.status(), Some(500));

        let err = client.login("a@b.com", "two").await.unwrap_err();
        assert_eq!(err.message(), LOGIN_FAILED);
        assert_eq!(err.details(), Some(&json!("unprocessable")));
    }

    #[tokio::test]
    async fn success_without_token_is_missing_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "Compte suspendu"})))
            .mount(&server)
            .await;

        let err = client_for(&server).login("a@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, LoginError::MissingToken { status: 200, .. }));
        assert_eq!(err.message(), "Compte suspendu");
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_failure() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let api = ApiConfig {
            base_url: format!("http://127.0.0.1:{port}/api"),
            timeout_secs: 5,
            ..ApiConfig::default()
        };

        let err = LoginClient::new(&api).unwrap().login("a@b.com", "pw").await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(err.message(), NO_RESPONSE);
    }

    #[tokio::test]
    async fn unbuildable_request_is_request_failure() {
        let api = ApiConfig {
            base_url: "not a url".into(),
            ..ApiConfig::default()
        };
        let err = LoginClient::new(&api).unwrap().login("a@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, LoginError::Request { .. }));
        assert_ne!(err.message(), MISSING_CREDENTIALS);
    }

    #[tokio::test]
    async fn logout_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/logout"))
            .and(header("authorization", "Bearer xyz"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let token = Token::new("xyz").unwrap();
        client_for(&server).logout(&token).await.unwrap();
    }
}
