//! HTTP collaborator: handshake, liveness, state round-trip and
//! per-component calls.

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::ClientConfig;

/// Header carrying the hub connection id on every request.
pub const CONNECTION_ID_HEADER: &str = "UDConnectionId";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Server responded with status {0}")]
    Status(u16),
    #[error("Server reported an error: {0}")]
    Remote(String),
    #[error("Failed to parse response: {0}")]
    Parse(String),
    #[error("Invalid header `{0}`")]
    InvalidHeader(String),
}

/// Reply to the initial dashboard load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponse {
    /// Root descriptor plus dashboard extras, or `{error: ..}`.
    pub dashboard: Value,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub user: Option<Value>,
}

impl HandshakeResponse {
    /// Error reported in place of the dashboard, if any.
    pub fn dashboard_error(&self) -> Option<String> {
        let error = self.dashboard.get("error")?;
        if error.is_null() {
            return None;
        }
        Some(remote_message(error))
    }
}

#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// `GET /api/internal/dashboard`
    async fn load_dashboard(&self) -> Result<HandshakeResponse, ApiError>;

    /// `GET /api/internal/session/{id}`; any error means the session is gone.
    async fn check_session(&self, session_id: &str) -> Result<(), ApiError>;

    /// `POST /api/internal/component/element/sessionState/{requestId}`
    async fn send_state(&self, request_id: &str, state: &Value) -> Result<(), ApiError>;

    /// `POST /api/internal/component/element/{id}`
    async fn post(&self, id: &str, data: &Value, headers: &[(String, String)]) -> Result<Value, ApiError>;

    /// `GET /api/internal/component/element/{id}`
    async fn component_data(&self, id: &str) -> Result<Value, ApiError>;

    /// Record the hub connection id for subsequent requests.
    fn set_connection_id(&self, connection_id: &str) {
        let _ = connection_id;
    }
}

/// [`DashboardApi`] over HTTP.
pub struct HttpApi {
    client: Client,
    config: ClientConfig,
    connection_id: RwLock<Option<String>>,
}

impl HttpApi {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(ApiError::Http)?;

        Ok(Self {
            client,
            config,
            connection_id: RwLock::new(None),
        })
    }

    fn with_connection_id(&self, request: RequestBuilder) -> RequestBuilder {
        let current = self.connection_id.read().ok().and_then(|id| id.clone());
        match current {
            Some(id) => request.header(CONNECTION_ID_HEADER, id),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .with_connection_id(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ApiError::Connection(format!("Cannot connect to {}", self.config.api_base))
                } else {
                    ApiError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        Ok(response)
    }

    /// Read a JSON body, turning `{error: {message}}` into [`ApiError::Remote`].
    async fn json_body(response: Response) -> Result<Value, ApiError> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        let body: Value = serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))?;
        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            return Err(ApiError::Remote(remote_message(error)));
        }
        Ok(body)
    }
}

fn element_path(id: &str) -> String {
    format!("/api/internal/component/element/{id}")
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, ApiError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| ApiError::InvalidHeader(name.clone()))?;
        let value = HeaderValue::from_str(value).map_err(|_| ApiError::InvalidHeader(name.as_str().to_string()))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn remote_message(error: &Value) -> String {
    match error.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

#[async_trait]
impl DashboardApi for HttpApi {
    async fn load_dashboard(&self) -> Result<HandshakeResponse, ApiError> {
        let url = self.config.api_url("/api/internal/dashboard");
        let response = self.send(self.client.get(url)).await?;
        response
            .json::<HandshakeResponse>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn check_session(&self, session_id: &str) -> Result<(), ApiError> {
        let url = self.config.api_url(&format!("/api/internal/session/{session_id}"));
        self.send(self.client.get(url)).await.map(|_| ())
    }

    async fn send_state(&self, request_id: &str, state: &Value) -> Result<(), ApiError> {
        let url = self.config.api_url(&element_path(&format!("sessionState/{request_id}")));
        let response = self.send(self.client.post(url).json(state)).await?;
        Self::json_body(response).await.map(|_| ())
    }

    async fn post(&self, id: &str, data: &Value, headers: &[(String, String)]) -> Result<Value, ApiError> {
        let url = self.config.api_url(&element_path(id));
        // Caller headers go on last so an explicit Content-Type wins over `.json`.
        let request = self.client.post(url).json(data).headers(header_map(headers)?);
        let response = self.send(request).await?;
        Self::json_body(response).await
    }

    async fn component_data(&self, id: &str) -> Result<Value, ApiError> {
        let url = self.config.api_url(&element_path(id));
        let response = self.send(self.client.get(url)).await?;
        Self::json_body(response).await
    }

    fn set_connection_id(&self, connection_id: &str) {
        if let Ok(mut slot) = self.connection_id.write() {
            *slot = Some(connection_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handshake_response_parsing() {
        let response: HandshakeResponse = serde_json::from_value(json!({
            "dashboard": {"id": "root", "type": "panel", "content": []},
            "sessionId": "s1",
            "roles": ["admin"]
        }))
        .unwrap();
        assert_eq!(response.session_id, "s1");
        assert_eq!(response.roles, Some(vec!["admin".to_string()]));
        assert_eq!(response.user, None);
        assert_eq!(response.dashboard_error(), None);
    }

    #[test]
    fn test_dashboard_error() {
        let response: HandshakeResponse = serde_json::from_value(json!({
            "dashboard": {"error": {"message": "script failed"}},
            "sessionId": "s1"
        }))
        .unwrap();
        assert_eq!(response.dashboard_error().as_deref(), Some("script failed"));

        let plain = HandshakeResponse {
            dashboard: json!({"error": "bad"}),
            session_id: String::new(),
            roles: None,
            user: None,
        };
        assert_eq!(plain.dashboard_error().as_deref(), Some("bad"));
    }

    #[test]
    fn test_header_map() {
        let map = header_map(&[
            ("Accept".into(), "application/json".into()),
            ("Content-Type".into(), "text/plain".into()),
        ])
        .unwrap();
        assert_eq!(map["accept"], "application/json");
        assert_eq!(map["content-type"], "text/plain");

        assert!(matches!(
            header_map(&[("bad header".into(), "x".into())]),
            Err(ApiError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_connection_id_slot() {
        let api = HttpApi::new(ClientConfig::default()).unwrap();
        assert!(api.connection_id.read().unwrap().is_none());
        api.set_connection_id("c1");
        assert_eq!(api.connection_id.read().unwrap().as_deref(), Some("c1"));
    }

    #[test]
    fn test_element_paths() {
        assert_eq!(element_path("btn"), "/api/internal/component/element/btn");
        assert_eq!(
            element_path("sessionState/r1"),
            "/api/internal/component/element/sessionState/r1"
        );
    }
}
