//! Shared fixtures: a scripted hub, an in-memory API and a recording host.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::tungstenite::Message;

use dashlink_core::{ComponentRegistry, PassthroughRenderer};
use dashlink_sync::host::HostError;
use dashlink_sync::protocol::{Frame, FrameBuffer, RECORD_SEPARATOR};
use dashlink_sync::{
    ApiError, ClientConfig, Dashboard, DashboardApi, HandshakeResponse, Host, Navigation, Notification, Position,
    View,
};

pub const WAIT: Duration = Duration::from_secs(3);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Hub that records client invocations and pushes whatever the test asks.
pub struct MockHub {
    pub addr: String,
    pushes: mpsc::UnboundedSender<String>,
    invocations: mpsc::UnboundedReceiver<(String, Vec<Value>)>,
    accepted: Arc<AtomicUsize>,
}

impl MockHub {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();
        let (inv_tx, inv_rx) = mpsc::unbounded_channel();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _handshake = ws.next().await;
            ws.send(Message::Text(format!("{{}}{RECORD_SEPARATOR}").into()))
                .await
                .unwrap();

            let mut buffer = FrameBuffer::new();
            loop {
                tokio::select! {
                    push = push_rx.recv() => match push {
                        Some(frame) => {
                            if ws.send(Message::Text(frame.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    incoming = ws.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            for frame in buffer.push(text.as_str()) {
                                let Ok(Frame::Invocation { invocation_id, target, arguments }) = Frame::decode(&frame) else {
                                    continue;
                                };
                                let _ = inv_tx.send((target, arguments));
                                if let Some(id) = invocation_id {
                                    let done = Frame::Completion { invocation_id: id, result: None, error: None };
                                    let _ = ws.send(Message::Text(done.encode().unwrap().into())).await;
                                }
                            }
                        }
                        Some(Ok(_)) => {}
                        _ => break,
                    },
                }
            }
        });

        Self {
            addr,
            pushes: push_tx,
            invocations: inv_rx,
            accepted,
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(format!("http://{}", self.addr)).with_dashboard_id("main")
    }

    /// Push a server → client call. Object payloads go over the wire as
    /// JSON-encoded strings.
    pub fn call(&self, target: &str, argument: Option<Value>) {
        let arguments = match argument {
            None => json!([]),
            Some(Value::Object(payload)) => json!([Value::Object(payload).to_string()]),
            Some(other) => json!([other]),
        };
        let frame = json!({"type": 1, "target": target, "arguments": arguments});
        let _ = self.pushes.send(format!("{frame}{RECORD_SEPARATOR}"));
    }

    pub fn close(&self, error: &str) {
        let frame = json!({"type": 7, "error": error});
        let _ = self.pushes.send(format!("{frame}{RECORD_SEPARATOR}"));
    }

    pub async fn next_invocation(&mut self) -> (String, Vec<Value>) {
        timeout(WAIT, self.invocations.recv())
            .await
            .expect("hub call within timeout")
            .expect("hub still running")
    }

    pub async fn no_invocation_within(&mut self, window: Duration) -> bool {
        timeout(window, self.invocations.recv()).await.is_err()
    }

    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// In-memory [`DashboardApi`].
pub struct MemoryApi {
    pub dashboard: Value,
    pub session_valid: AtomicBool,
    pub states: Mutex<Vec<(String, Value)>>,
    pub posts: Mutex<Vec<(String, Value, Vec<(String, String)>)>>,
    pub connection_id: Mutex<Option<String>>,
    pub session_checks: AtomicUsize,
}

impl MemoryApi {
    pub fn new(dashboard: Value) -> Arc<Self> {
        Arc::new(Self {
            dashboard,
            session_valid: AtomicBool::new(true),
            states: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
            connection_id: Mutex::new(None),
            session_checks: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DashboardApi for MemoryApi {
    async fn load_dashboard(&self) -> Result<HandshakeResponse, ApiError> {
        Ok(HandshakeResponse {
            dashboard: self.dashboard.clone(),
            session_id: "s1".into(),
            roles: Some(vec!["admin".into()]),
            user: Some(json!("alice")),
        })
    }

    async fn check_session(&self, _session_id: &str) -> Result<(), ApiError> {
        self.session_checks.fetch_add(1, Ordering::SeqCst);
        if self.session_valid.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ApiError::Status(401))
        }
    }

    async fn send_state(&self, request_id: &str, state: &Value) -> Result<(), ApiError> {
        self.states.lock().unwrap().push((request_id.to_string(), state.clone()));
        Ok(())
    }

    async fn post(&self, id: &str, data: &Value, headers: &[(String, String)]) -> Result<Value, ApiError> {
        self.posts
            .lock()
            .unwrap()
            .push((id.to_string(), data.clone(), headers.to_vec()));
        Ok(Value::Null)
    }

    async fn component_data(&self, id: &str) -> Result<Value, ApiError> {
        Ok(json!({"id": id, "data": [1, 2, 3]}))
    }

    fn set_connection_id(&self, connection_id: &str) {
        *self.connection_id.lock().unwrap() = Some(connection_id.to_string());
    }
}

/// Host that records every hook call.
#[derive(Default)]
pub struct RecordingHost {
    pub navigations: Vec<Navigation>,
    pub reloads: usize,
    pub focused: Vec<(String, bool)>,
    pub clipboard: Vec<String>,
    pub notifications: Vec<Notification>,
    pub timeouts: usize,
    pub assets: Vec<(Vec<String>, Vec<String>)>,
    pub position: Option<Position>,
    pub views: Vec<View>,
}

impl Host for RecordingHost {
    fn navigate(&mut self, target: Navigation) {
        self.navigations.push(target);
    }

    fn reload(&mut self) {
        self.reloads += 1;
    }

    fn focus(&mut self, element_id: &str, scroll_into_view: bool) {
        self.focused.push((element_id.to_string(), scroll_into_view));
    }

    fn copy_to_clipboard(&mut self, data: &str) -> Result<(), HostError> {
        self.clipboard.push(data.to_string());
        Ok(())
    }

    fn notify_user(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    fn session_timed_out(&mut self) {
        self.timeouts += 1;
    }

    fn location(&mut self) -> Option<Position> {
        self.position.clone()
    }

    fn load_assets(&mut self, stylesheets: &[String], scripts: &[String]) {
        self.assets.push((stylesheets.to_vec(), scripts.to_vec()));
    }

    fn on_render(&mut self, view: &View) {
        self.views.push(view.clone());
    }
}

pub fn registry() -> ComponentRegistry {
    ComponentRegistry::new()
        .with("panel", PassthroughRenderer)
        .with("card", PassthroughRenderer)
}

/// Start a dashboard against `hub`, answer `setSessionId` and wait for it
/// to become ready.
pub async fn ready_dashboard(
    hub: &mut MockHub,
    api: Arc<MemoryApi>,
    host: RecordingHost,
) -> Dashboard<RecordingHost> {
    init_logging();
    let mut dashboard = Dashboard::new(hub.config(), api, host, registry());
    dashboard.start().await.unwrap();
    let (target, _) = hub.next_invocation().await;
    assert_eq!(target, "setSessionId");

    hub.call("setConnectionId", Some(json!("c1")));
    pump_until(&mut dashboard, |d| matches!(d.view(), View::Ready(_))).await;
    dashboard
}

/// Pump events until `done` holds.
pub async fn pump_until(dashboard: &mut Dashboard<RecordingHost>, done: impl Fn(&Dashboard<RecordingHost>) -> bool) {
    timeout(WAIT, async {
        while !done(dashboard) {
            assert!(dashboard.pump().await.unwrap(), "engine stopped");
        }
    })
    .await
    .expect("condition reached within timeout");
}

/// Poll `check` until it holds, for effects of spawned calls.
pub async fn eventually(check: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached within timeout");
}
