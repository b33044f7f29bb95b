//! Session data and the background liveness check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::api::DashboardApi;
use crate::engine::EngineEvent;

/// Per-client session context, filled in by the handshake.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub session_id: String,
    /// Issued by the hub; `None` until `setConnectionId` arrives.
    pub connection_id: Option<String>,
    pub user: Option<Value>,
    pub roles: Vec<String>,
    /// Encoded geolocation snapshot attached to client events.
    pub location: Option<String>,
    /// Dashboard was served in design mode.
    pub design: bool,
    /// Terminal once set.
    pub timed_out: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub accuracy: Option<f64>,
    pub altitude: Option<f64>,
    pub altitude_accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f64>,
}

/// Geolocation snapshot supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub coords: Coordinates,
    /// ISO-8601 time the fix was taken.
    pub timestamp: String,
}

impl Position {
    /// Base64 of the JSON form, as sent with client events.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }
}

/// Polls the session endpoint until the first failure.
///
/// The task stops itself on timeout and is aborted when the monitor is
/// dropped.
#[derive(Debug)]
pub struct LivenessMonitor {
    handle: JoinHandle<()>,
    timed_out: Arc<AtomicBool>,
}

impl LivenessMonitor {
    pub fn start(
        api: Arc<dyn DashboardApi>,
        session_id: String,
        period: Duration,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let timed_out = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&timed_out);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = api.check_session(&session_id).await {
                    log::warn!("Session {session_id} is no longer valid: {e}");
                    flag.store(true, Ordering::SeqCst);
                    let _ = events.send(EngineEvent::SessionTimedOut);
                    break;
                }
                log::trace!("Session {session_id} alive");
            }
        });

        Self { handle, timed_out }
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, HandshakeResponse};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingApi {
        checks: AtomicUsize,
        fail_after: usize,
    }

    #[async_trait]
    impl DashboardApi for CountingApi {
        async fn load_dashboard(&self) -> Result<HandshakeResponse, ApiError> {
            Err(ApiError::Remote("unused".into()))
        }

        async fn check_session(&self, _session_id: &str) -> Result<(), ApiError> {
            let n = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.fail_after {
                Err(ApiError::Status(401))
            } else {
                Ok(())
            }
        }

        async fn send_state(&self, _request_id: &str, _state: &Value) -> Result<(), ApiError> {
            Ok(())
        }

        async fn post(&self, _id: &str, _data: &Value, _headers: &[(String, String)]) -> Result<Value, ApiError> {
            Ok(Value::Null)
        }

        async fn component_data(&self, _id: &str) -> Result<Value, ApiError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_position_encoding() {
        let position = Position {
            coords: Coordinates {
                latitude: Some(1.5),
                longitude: Some(-2.0),
                ..Coordinates::default()
            },
            timestamp: "2024-01-01T00:00:00.000Z".into(),
        };
        let encoded = position.encode().unwrap();
        let decoded: Value = serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded["coords"]["latitude"], 1.5);
        assert_eq!(decoded["coords"]["altitudeAccuracy"], Value::Null);
        assert_eq!(decoded["timestamp"], "2024-01-01T00:00:00.000Z");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_first_failure() {
        let api = Arc::new(CountingApi {
            checks: AtomicUsize::new(0),
            fail_after: 2,
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let monitor = LivenessMonitor::start(api.clone(), "s1".into(), Duration::from_secs(5), tx);

        let event = rx.recv().await;
        assert!(matches!(event, Some(EngineEvent::SessionTimedOut)));
        assert!(monitor.timed_out());
        assert_eq!(api.checks.load(Ordering::SeqCst), 3);

        // The task has finished: no further checks happen.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.checks.load(Ordering::SeqCst), 3);
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_polling() {
        let api = Arc::new(CountingApi {
            checks: AtomicUsize::new(0),
            fail_after: usize::MAX,
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let monitor = LivenessMonitor::start(api.clone(), "s1".into(), Duration::from_secs(5), tx);

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(api.checks.load(Ordering::SeqCst), 1);

        drop(monitor);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.checks.load(Ordering::SeqCst), 1);
    }
}
