//! Client configuration, resolved once at startup.

use std::time::Duration;

use reqwest::Url;

/// Default API base when none is configured.
pub const DEFAULT_API_BASE: &str = "http://localhost:5000";
/// Hub path on the API host.
pub const HUB_PATH: &str = "/dashboardhub";
/// How often the session liveness check runs.
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the dashboard server, e.g. `http://localhost:5000`.
    pub api_base: String,
    /// Base path the client is mounted under, used for in-app routes.
    pub base_path: String,
    /// Identifier sent as the hub's `dashboardId` query parameter.
    pub dashboard_id: String,
    pub liveness_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            base_path: "/".to_string(),
            dashboard_id: String::new(),
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Self::default()
        }
    }

    pub fn with_dashboard_id(mut self, dashboard_id: impl Into<String>) -> Self {
        self.dashboard_id = dashboard_id.into();
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval = interval;
        self
    }

    /// Absolute URL of a REST path under the API base.
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// WebSocket URL of the hub, scoped to the dashboard.
    pub fn hub_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        let hub = format!("{ws_base}{HUB_PATH}");
        match Url::parse_with_params(&hub, [("dashboardId", self.dashboard_id.as_str())]) {
            Ok(url) => url.to_string(),
            Err(e) => {
                log::warn!("Hub URL {hub} does not parse: {e}");
                format!("{hub}?dashboardId={}", self.dashboard_id)
            }
        }
    }

    /// Prefix an in-app path with the base path.
    pub fn route(&self, path: &str) -> String {
        let base = self.base_path.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base, "http://localhost:5000");
        assert_eq!(config.liveness_interval, Duration::from_secs(5));
        assert_eq!(config.base_path, "/");
    }

    #[test]
    fn test_hub_url_scheme() {
        let plain = ClientConfig::new("http://host:5000/").with_dashboard_id("d1");
        assert_eq!(plain.hub_url(), "ws://host:5000/dashboardhub?dashboardId=d1");

        let tls = ClientConfig::new("https://host");
        assert_eq!(tls.hub_url(), "wss://host/dashboardhub?dashboardId=");
    }

    #[test]
    fn test_hub_url_encodes_dashboard_id() {
        let config = ClientConfig::new("http://host").with_dashboard_id("sales & ops#2");
        assert_eq!(config.hub_url(), "ws://host/dashboardhub?dashboardId=sales+%26+ops%232");
    }

    #[test]
    fn test_api_url_and_route() {
        let config = ClientConfig::new("http://host/").with_base_path("/app/");
        assert_eq!(config.api_url("/api/internal/dashboard"), "http://host/api/internal/dashboard");
        assert_eq!(config.route("/foo"), "/app/foo");
        assert_eq!(config.route("bar"), "/app/bar");
        assert_eq!(ClientConfig::default().route("/foo"), "/foo");
    }
}
