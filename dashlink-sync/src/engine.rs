//! The dashboard engine.
//!
//! [`Dashboard`] owns one session: configuration, the HTTP collaborator,
//! the hub connection, the topic bus, the mounted component tree and the
//! host hooks. Everything runs on the task that drives it; only network
//! calls and the liveness poll run as spawned tasks, reporting back over
//! an internal channel.
//!
//! ```text
//!   start():  load dashboard ─► connect hub ─► setSessionId ─► liveness
//!                                   │
//!   pump():   hub event ──► decode ─┴► bus.publish(componentId | global)
//!                                          │
//!             store transitions ◄──────────┘
//!                    │
//!             outbox ─► spawned sends     dirty ─► re-render ─► Host::on_render
//! ```

use std::rc::Rc;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;

use dashlink_core::{ComponentRegistry, Descriptor, Rendered};

use crate::api::{ApiError, DashboardApi};
use crate::bus::{BusMessage, Subscription, TopicBus, TOPIC_MODAL_CLOSE, TOPIC_MODAL_OPEN, TOPIC_WRITE};
use crate::config::ClientConfig;
use crate::dispatch::{install_forwarder, outbox, EventDispatcher, Outbound, Outbox};
use crate::host::{Host, Navigation, Notification, ScriptError, ScriptEvaluator};
use crate::protocol::{HubInvocation, HubMessage};
use crate::session::{LivenessMonitor, Session};
use crate::store::ComponentMessage;
use crate::transport::{self, HubHandle, TransportError, TransportEvent};
use crate::tree::ComponentTree;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to load dashboard: {0}")]
    Load(#[from] ApiError),
    #[error("Dashboard reported an error: {0}")]
    Dashboard(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Server-sent script failed. Not contained by the engine.
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// What the presentation layer should show.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Loading,
    Failed(String),
    /// Last tree rendered before the session expired.
    TimedOut(Rendered),
    Ready(Rendered),
}

/// User interaction forwarded from any thread through a [`DashboardHandle`].
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    Notify {
        node_id: String,
        event_name: String,
        value: Value,
    },
    UnregisterEvent {
        event_id: String,
    },
    Post {
        id: String,
        data: Value,
    },
    CallEndpoint {
        node_id: String,
        property: String,
    },
    SetLocalState {
        node_id: String,
        state: Map<String, Value>,
    },
}

/// Events delivered to the engine task.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SessionTimedOut,
    SendFailed { call: String, error: String },
    User(UserAction),
    Shutdown,
}

/// Cloneable, `Send` sender of user actions into the engine.
#[derive(Debug, Clone)]
pub struct DashboardHandle {
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl DashboardHandle {
    fn action(&self, action: UserAction) -> bool {
        self.events.send(EngineEvent::User(action)).is_ok()
    }

    pub fn notify(&self, node_id: &str, event_name: &str, value: Value) -> bool {
        self.action(UserAction::Notify {
            node_id: node_id.to_string(),
            event_name: event_name.to_string(),
            value,
        })
    }

    pub fn unregister_event(&self, event_id: &str) -> bool {
        self.action(UserAction::UnregisterEvent {
            event_id: event_id.to_string(),
        })
    }

    pub fn post(&self, id: &str, data: Value) -> bool {
        self.action(UserAction::Post {
            id: id.to_string(),
            data,
        })
    }

    pub fn call_endpoint(&self, node_id: &str, property: &str) -> bool {
        self.action(UserAction::CallEndpoint {
            node_id: node_id.to_string(),
            property: property.to_string(),
        })
    }

    pub fn set_local_state(&self, node_id: &str, state: Map<String, Value>) -> bool {
        self.action(UserAction::SetLocalState {
            node_id: node_id.to_string(),
            state,
        })
    }

    /// Ask the engine loop to return.
    pub fn shutdown(&self) -> bool {
        self.events.send(EngineEvent::Shutdown).is_ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    Loading,
    Failed(String),
    Ready,
}

/// Optional fields of the dashboard object beyond the root descriptor.
#[derive(Debug, Default)]
struct DashboardExtras {
    stylesheets: Vec<String>,
    scripts: Vec<String>,
    design: bool,
    geolocation: bool,
}

impl DashboardExtras {
    fn from_value(dashboard: &Value) -> Self {
        let strings = |key: &str| -> Vec<String> {
            dashboard
                .get(key)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).map(str::to_owned).collect())
                .unwrap_or_default()
        };
        let flag = |key: &str| dashboard.get(key).is_some_and(dashlink_core::truthy);
        Self {
            stylesheets: strings("stylesheets"),
            scripts: strings("scripts"),
            design: flag("design"),
            geolocation: flag("geolocation"),
        }
    }
}

pub struct Dashboard<H: Host> {
    config: ClientConfig,
    api: Arc<dyn DashboardApi>,
    host: H,
    registry: ComponentRegistry,
    scripts: Option<Box<dyn ScriptEvaluator>>,

    bus: TopicBus<BusMessage>,
    outbox: Outbox,
    tree: ComponentTree,
    dispatcher: EventDispatcher,
    _forwarder: Subscription<BusMessage>,

    session: Session,
    phase: Phase,
    root: Descriptor,
    rendered: Rendered,

    hub: Option<HubHandle>,
    hub_events: Option<mpsc::Receiver<TransportEvent>>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    liveness: Option<LivenessMonitor>,
}

impl<H: Host> Dashboard<H> {
    pub fn new(config: ClientConfig, api: Arc<dyn DashboardApi>, host: H, registry: ComponentRegistry) -> Self {
        let bus = TopicBus::new();
        let outbox = outbox();
        let forwarder = install_forwarder(&bus, Rc::clone(&outbox));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            api,
            host,
            registry,
            scripts: None,
            tree: ComponentTree::new(bus.clone(), Rc::clone(&outbox)),
            dispatcher: EventDispatcher::new(bus.clone()),
            _forwarder: forwarder,
            bus,
            outbox,
            session: Session::default(),
            phase: Phase::Idle,
            root: Descriptor::Empty,
            rendered: Rendered::Empty,
            hub: None,
            hub_events: None,
            events_tx,
            events_rx,
            liveness: None,
        }
    }

    /// Install the capability that runs `invokejavascript` payloads.
    pub fn with_script_evaluator(mut self, evaluator: impl ScriptEvaluator + 'static) -> Self {
        self.scripts = Some(Box::new(evaluator));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn bus(&self) -> &TopicBus<BusMessage> {
        &self.bus
    }

    pub fn tree(&self) -> &ComponentTree {
        &self.tree
    }

    /// Subscribe to a topic, typically one of the global ones.
    pub fn subscribe(&self, topic: &str, handler: impl Fn(&BusMessage) + 'static) -> Subscription<BusMessage> {
        self.bus.subscribe_scoped(topic, handler)
    }

    pub fn handle(&self) -> DashboardHandle {
        DashboardHandle {
            events: self.events_tx.clone(),
        }
    }

    pub fn view(&self) -> View {
        match &self.phase {
            Phase::Idle | Phase::Loading => View::Loading,
            Phase::Failed(message) => View::Failed(message.clone()),
            Phase::Ready if self.session.timed_out => View::TimedOut(self.rendered.clone()),
            Phase::Ready => View::Ready(self.rendered.clone()),
        }
    }

    /// Load the dashboard, connect the hub and announce the session.
    ///
    /// The view stays [`View::Loading`] until the hub sends
    /// `setConnectionId`.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        self.set_phase(Phase::Loading);

        let response = match self.api.load_dashboard().await {
            Ok(response) => response,
            Err(e) => {
                self.set_phase(Phase::Failed(e.to_string()));
                return Err(e.into());
            }
        };
        if let Some(error) = response.dashboard_error() {
            log::error!("Dashboard failed to load: {error}");
            self.set_phase(Phase::Failed(error.clone()));
            return Err(EngineError::Dashboard(error));
        }

        let extras = DashboardExtras::from_value(&response.dashboard);
        self.session.session_id = response.session_id;
        self.session.roles = response.roles.unwrap_or_default();
        self.session.user = response.user;
        self.session.design = extras.design;

        if !extras.stylesheets.is_empty() || !extras.scripts.is_empty() {
            self.host.load_assets(&extras.stylesheets, &extras.scripts);
        }
        if extras.geolocation {
            self.session.location = self.host.location().and_then(|position| match position.encode() {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    log::warn!("Could not encode location: {e}");
                    None
                }
            });
        }
        self.root = Descriptor::from_value(response.dashboard);

        let (hub, hub_events) = match transport::connect(&self.config.hub_url()).await {
            Ok(connected) => connected,
            Err(e) => {
                self.set_phase(Phase::Failed(e.to_string()));
                return Err(e.into());
            }
        };
        // Inbound calls queue on `hub_events` from here on. The session id
        // goes out like any other call; its completion is not awaited here
        // because the reader may be parked on a full event channel.
        self.hub_events = Some(hub_events);
        self.hub = Some(hub);
        self.outbox
            .borrow_mut()
            .push_back(Outbound::Invoke(HubInvocation::SetSessionId(self.session.session_id.clone())));
        self.flush_outbox();

        self.liveness = Some(LivenessMonitor::start(
            Arc::clone(&self.api),
            self.session.session_id.clone(),
            self.config.liveness_interval,
            self.events_tx.clone(),
        ));
        log::info!("Session {} started", self.session.session_id);
        Ok(())
    }

    /// Start if needed, then process events until shutdown.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        if self.phase == Phase::Idle {
            self.start().await?;
        }
        while self.pump().await? {}
        Ok(())
    }

    /// Wait for and process one event. Returns `false` on shutdown.
    pub async fn pump(&mut self) -> Result<bool, EngineError> {
        enum Input {
            Hub(TransportEvent),
            Engine(EngineEvent),
        }

        self.flush_outbox();
        let input = tokio::select! {
            Some(event) = next_hub_event(&mut self.hub_events) => Input::Hub(event),
            Some(event) = self.events_rx.recv() => Input::Engine(event),
            else => return Ok(false),
        };

        match input {
            Input::Hub(TransportEvent::Message(message)) => {
                if self.session.timed_out {
                    log::debug!("Session timed out; ignoring {}", message.target());
                } else {
                    self.handle_message(message)?;
                }
            }
            Input::Hub(TransportEvent::Closed { error }) => {
                log::warn!("Hub connection lost{}", error.map(|e| format!(": {e}")).unwrap_or_default());
                self.hub_events = None;
            }
            Input::Engine(EngineEvent::SessionTimedOut) => self.time_out(),
            Input::Engine(EngineEvent::SendFailed { call, error }) => {
                log::warn!("{call} failed: {error}");
                self.host.notify_user(Notification::error(error));
            }
            Input::Engine(EngineEvent::User(action)) => self.apply_user_action(action),
            Input::Engine(EngineEvent::Shutdown) => {
                self.shutdown().await;
                return Ok(false);
            }
        }

        self.flush_outbox();
        self.refresh();
        Ok(true)
    }

    /// Apply one decoded hub call.
    pub fn handle_message(&mut self, message: HubMessage) -> Result<(), EngineError> {
        match message {
            HubMessage::SetState { component_id, state } => {
                self.publish_component(&component_id, ComponentMessage::SetState { state });
            }
            HubMessage::RequestState {
                component_id,
                request_id,
            } => {
                self.publish_component(&component_id, ComponentMessage::GetState { request_id });
            }
            HubMessage::AddElement { component_id, elements } => {
                self.publish_component(&component_id, ComponentMessage::AddElement { elements });
            }
            HubMessage::RemoveElement {
                component_id,
                parent_id,
            } => {
                self.publish_component(&component_id, ComponentMessage::RemoveElement { parent_id });
            }
            HubMessage::ClearElement { component_id } => {
                self.publish_component(&component_id, ComponentMessage::ClearElement);
            }
            HubMessage::SyncElement { component_id } => {
                self.publish_component(&component_id, ComponentMessage::SyncElement);
            }
            HubMessage::TestForm { component_id } => {
                self.publish_component(&component_id, ComponentMessage::TestForm);
            }
            HubMessage::ShowModal { props } => {
                self.bus
                    .publish(TOPIC_MODAL_OPEN, &BusMessage::Modal(Descriptor::from_value(props)));
            }
            HubMessage::CloseModal => {
                self.bus.publish(TOPIC_MODAL_CLOSE, &BusMessage::ModalClose);
            }
            HubMessage::Write { message } => {
                self.bus.publish(TOPIC_WRITE, &BusMessage::Write(message));
            }
            HubMessage::Redirect {
                url,
                open_in_new_window,
            } => {
                let target = match Navigation::from_redirect(&url, open_in_new_window) {
                    Navigation::InApp(path) => Navigation::InApp(self.config.route(&path)),
                    external => external,
                };
                self.host.navigate(target);
            }
            HubMessage::Refresh => self.host.reload(),
            HubMessage::Select {
                element_id,
                scroll_to_element,
            } => self.host.focus(&element_id, scroll_to_element),
            HubMessage::InvokeJavascript { script } => match self.scripts.as_mut() {
                Some(evaluator) => evaluator.evaluate(&script)?,
                None => log::warn!("No script evaluator installed; ignoring invokejavascript"),
            },
            HubMessage::Clipboard {
                data,
                toast_on_success,
                toast_on_error,
            } => self.copy_to_clipboard(data, toast_on_success, toast_on_error),
            HubMessage::SetConnectionId { connection_id } => {
                log::info!("Hub assigned connection {connection_id}");
                self.api.set_connection_id(&connection_id);
                self.session.connection_id = Some(connection_id);
                if self.phase == Phase::Loading {
                    self.set_phase(Phase::Ready);
                }
            }
        }
        Ok(())
    }

    /// Raise a client event for `node_id`.
    pub fn notify(&mut self, node_id: &str, event_name: &str, value: Value) {
        self.dispatcher.notify(node_id, event_name, value);
        self.flush_outbox();
    }

    pub fn unregister_event(&mut self, event_id: &str) {
        self.dispatcher.unregister(event_id);
        self.flush_outbox();
    }

    /// Fire-and-forget call to a component action endpoint.
    pub fn post(&mut self, id: &str, data: Value) {
        self.outbox.borrow_mut().push_back(Outbound::Post {
            id: id.to_string(),
            data,
            headers: Vec::new(),
        });
        self.flush_outbox();
    }

    /// Invoke the endpoint declared by `property` on a mounted node.
    pub fn call_endpoint(&mut self, node_id: &str, property: &str) -> bool {
        let Some(endpoint) = self.tree.endpoint(node_id, property) else {
            log::warn!("{node_id} has no endpoint property {property}");
            return false;
        };
        self.outbox.borrow_mut().push_back(Outbound::Post {
            headers: endpoint.headers(),
            id: endpoint.name,
            data: json!({}),
        });
        self.flush_outbox();
        true
    }

    /// Merge client-side state into a mounted node and re-render.
    pub fn set_local_state(&mut self, node_id: &str, state: Map<String, Value>) -> bool {
        let changed = self.tree.set_local_state(node_id, state);
        self.refresh();
        changed
    }

    /// Fetch ad-hoc data for a component.
    pub async fn component_data(&self, id: &str) -> Result<Value, EngineError> {
        Ok(self.api.component_data(id).await?)
    }

    /// Stop polling and close the hub.
    pub async fn shutdown(&mut self) {
        self.liveness = None;
        if let Some(hub) = self.hub.take() {
            hub.close().await;
        }
        self.tree.unmount_all();
    }

    fn publish_component(&self, component_id: &str, message: ComponentMessage) {
        let delivered = self.bus.publish(component_id, &BusMessage::Component(message));
        if delivered == 0 {
            log::debug!("No mounted component {component_id}");
        }
    }

    fn copy_to_clipboard(&mut self, data: Option<String>, toast_on_success: bool, toast_on_error: bool) {
        let Some(data) = data.filter(|d| !d.is_empty()) else {
            return;
        };
        match self.host.copy_to_clipboard(&data) {
            Ok(()) if toast_on_success => self.host.notify_user(Notification::success("Copied to clipboard")),
            Ok(()) => {}
            Err(e) => {
                log::debug!("Clipboard copy failed: {e}");
                if toast_on_error {
                    self.host.notify_user(Notification::error("Unable to copy to clipboard"));
                }
            }
        }
    }

    fn apply_user_action(&mut self, action: UserAction) {
        match action {
            UserAction::Notify {
                node_id,
                event_name,
                value,
            } => self.notify(&node_id, &event_name, value),
            UserAction::UnregisterEvent { event_id } => self.unregister_event(&event_id),
            UserAction::Post { id, data } => self.post(&id, data),
            UserAction::CallEndpoint { node_id, property } => {
                self.call_endpoint(&node_id, &property);
            }
            UserAction::SetLocalState { node_id, state } => {
                self.set_local_state(&node_id, state);
            }
        }
    }

    fn time_out(&mut self) {
        if self.session.timed_out {
            return;
        }
        log::warn!("Session {} timed out", self.session.session_id);
        self.session.timed_out = true;
        self.liveness = None;
        self.host.session_timed_out();
        self.host.on_render(&self.view());
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        self.phase = phase;
        if self.phase == Phase::Ready {
            self.rendered = self.tree.render(&self.root, &self.registry);
        }
        self.host.on_render(&self.view());
    }

    /// Re-render if any store changed.
    fn refresh(&mut self) {
        if self.phase != Phase::Ready || !self.tree.is_dirty() {
            return;
        }
        self.rendered = self.tree.render(&self.root, &self.registry);
        self.host.on_render(&self.view());
    }

    /// Spawn every queued outbound call. Results come back as events.
    fn flush_outbox(&mut self) {
        if tokio::runtime::Handle::try_current().is_err() {
            return;
        }
        let queued: Vec<Outbound> = self.outbox.borrow_mut().drain(..).collect();
        for call in queued {
            let events = self.events_tx.clone();
            match call {
                Outbound::Invoke(invocation) => {
                    let invocation = match invocation {
                        HubInvocation::ClientEvent {
                            event_id,
                            event_name,
                            event_data,
                            ..
                        } => HubInvocation::ClientEvent {
                            event_id,
                            event_name,
                            event_data,
                            location: self.session.location.clone(),
                        },
                        other => other,
                    };
                    let Some(hub) = self.hub.clone() else {
                        let _ = events.send(EngineEvent::SendFailed {
                            call: invocation.target().to_string(),
                            error: TransportError::ConnectionClosed.to_string(),
                        });
                        continue;
                    };
                    tokio::spawn(async move {
                        if let Err(e) = hub.send(&invocation).await {
                            let _ = events.send(EngineEvent::SendFailed {
                                call: invocation.target().to_string(),
                                error: e.to_string(),
                            });
                        }
                    });
                }
                Outbound::SendState { request_id, state } => {
                    let api = Arc::clone(&self.api);
                    tokio::spawn(async move {
                        if let Err(e) = api.send_state(&request_id, &state).await {
                            let _ = events.send(EngineEvent::SendFailed {
                                call: format!("sendState {request_id}"),
                                error: e.to_string(),
                            });
                        }
                    });
                }
                Outbound::Post { id, data, headers } => {
                    let api = Arc::clone(&self.api);
                    tokio::spawn(async move {
                        match api.post(&id, &data, &headers).await {
                            Ok(_) => log::debug!("post {id} done"),
                            Err(e) => {
                                let _ = events.send(EngineEvent::SendFailed {
                                    call: format!("post {id}"),
                                    error: e.to_string(),
                                });
                            }
                        }
                    });
                }
            }
        }
    }
}

async fn next_hub_event(events: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::HandshakeResponse;
    use crate::host::HostError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FixedApi {
        dashboard: Value,
        posts: Mutex<Vec<(String, Value, Vec<(String, String)>)>>,
    }

    #[async_trait]
    impl DashboardApi for FixedApi {
        async fn load_dashboard(&self) -> Result<HandshakeResponse, ApiError> {
            Ok(HandshakeResponse {
                dashboard: self.dashboard.clone(),
                session_id: "s1".into(),
                roles: None,
                user: None,
            })
        }

        async fn check_session(&self, _session_id: &str) -> Result<(), ApiError> {
            Ok(())
        }

        async fn send_state(&self, _request_id: &str, _state: &Value) -> Result<(), ApiError> {
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
            Ok(json!({"id": id}))
        }
    }

    #[derive(Default)]
    struct NullHost {
        views: Vec<View>,
        navigations: Vec<Navigation>,
        clipboard: Vec<String>,
        notifications: Vec<Notification>,
        clipboard_broken: bool,
    }

    impl Host for NullHost {
        fn navigate(&mut self, target: Navigation) {
            self.navigations.push(target);
        }
        fn reload(&mut self) {}
        fn focus(&mut self, _element_id: &str, _scroll_into_view: bool) {}
        fn copy_to_clipboard(&mut self, data: &str) -> Result<(), HostError> {
            if self.clipboard_broken {
                return Err(HostError::Clipboard("denied".into()));
            }
            self.clipboard.push(data.to_string());
            Ok(())
        }
        fn notify_user(&mut self, notification: Notification) {
            self.notifications.push(notification);
        }
        fn on_render(&mut self, view: &View) {
            self.views.push(view.clone());
        }
    }

    fn dashboard(value: Value) -> Dashboard<NullHost> {
        let api = Arc::new(FixedApi {
            dashboard: value,
            ..FixedApi::default()
        });
        Dashboard::new(
            ClientConfig::new("http://127.0.0.1:1"),
            api,
            NullHost::default(),
            ComponentRegistry::new(),
        )
    }

    #[tokio::test]
    async fn test_dashboard_error_blocks_connect() {
        let mut engine = dashboard(json!({"error": {"message": "boom"}}));
        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, EngineError::Dashboard(ref m) if m == "boom"));
        assert_eq!(engine.view(), View::Failed("boom".into()));
        assert!(engine.hub.is_none());
        assert!(engine.liveness.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_hub_fails_view() {
        let mut engine = dashboard(json!({"id": "root", "type": "panel"}));
        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(TransportError::Connect(_))));
        assert!(matches!(engine.view(), View::Failed(_)));
        assert_eq!(engine.session().session_id, "s1");
    }

    #[test]
    fn test_view_before_start() {
        let engine = dashboard(Value::Null);
        assert_eq!(engine.view(), View::Loading);
    }

    #[test]
    fn test_redirect_routes_in_app_under_base_path() {
        let mut engine = dashboard(Value::Null);
        engine.config.base_path = "/app".into();
        engine
            .handle_message(HubMessage::Redirect {
                url: "/foo".into(),
                open_in_new_window: false,
            })
            .unwrap();
        engine
            .handle_message(HubMessage::Redirect {
                url: "https://x.com".into(),
                open_in_new_window: true,
            })
            .unwrap();
        assert_eq!(
            engine.host().navigations,
            vec![
                Navigation::InApp("/app/foo".into()),
                Navigation::NewWindow("https://x.com".into())
            ]
        );
    }

    #[test]
    fn test_clipboard_feedback() {
        let mut engine = dashboard(Value::Null);
        let copy = |data: &str| HubMessage::Clipboard {
            data: Some(data.into()),
            toast_on_success: true,
            toast_on_error: true,
        };
        engine.handle_message(copy("hello")).unwrap();
        assert_eq!(engine.host().clipboard, vec!["hello"]);
        assert_eq!(engine.host().notifications, vec![Notification::success("Copied to clipboard")]);

        engine.host_mut().clipboard_broken = true;
        engine.handle_message(copy("again")).unwrap();
        assert_eq!(
            engine.host().notifications.last(),
            Some(&Notification::error("Unable to copy to clipboard"))
        );

        engine
            .handle_message(HubMessage::Clipboard {
                data: None,
                toast_on_success: true,
                toast_on_error: true,
            })
            .unwrap();
        assert_eq!(engine.host().notifications.len(), 2);
    }

    #[test]
    fn test_script_capability() {
        struct Failing;
        impl ScriptEvaluator for Failing {
            fn evaluate(&mut self, script: &str) -> Result<(), ScriptError> {
                Err(ScriptError(format!("cannot run {script}")))
            }
        }

        let mut without = dashboard(Value::Null);
        assert!(without
            .handle_message(HubMessage::InvokeJavascript { script: "x()".into() })
            .is_ok());

        let mut with = dashboard(Value::Null).with_script_evaluator(Failing);
        let err = with
            .handle_message(HubMessage::InvokeJavascript { script: "x()".into() })
            .unwrap_err();
        assert!(matches!(err, EngineError::Script(_)));
    }

    #[test]
    fn test_global_topics() {
        let mut engine = dashboard(Value::Null);
        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
        let s1 = Rc::clone(&seen);
        let _open = engine.subscribe(TOPIC_MODAL_OPEN, move |m| s1.borrow_mut().push(m.clone()));
        let s2 = Rc::clone(&seen);
        let _write = engine.subscribe(TOPIC_WRITE, move |m| s2.borrow_mut().push(m.clone()));

        engine
            .handle_message(HubMessage::ShowModal {
                props: json!(r#"{"id":"m","type":"modal"}"#),
            })
            .unwrap();
        engine.handle_message(HubMessage::CloseModal).unwrap();
        engine.handle_message(HubMessage::Write { message: json!("hi") }).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert!(matches!(&seen[0], BusMessage::Modal(d) if d.as_node().is_some_and(|n| n.id == "m")));
        assert_eq!(seen[1], BusMessage::Write(json!("hi")));
    }

    #[tokio::test]
    async fn test_call_endpoint_posts_empty_body_with_headers() {
        let api = Arc::new(FixedApi::default());
        let registry = ComponentRegistry::new().with("form", dashlink_core::PassthroughRenderer);
        let mut engine = Dashboard::new(ClientConfig::default(), api.clone(), NullHost::default(), registry);
        engine.root = Descriptor::from_value(json!({
            "id": "f", "type": "form",
            "properties": {"onSubmit": {"endpoint": true, "name": "f-submit", "contentType": "application/json"}}
        }));
        engine.phase = Phase::Loading;
        engine
            .handle_message(HubMessage::SetConnectionId { connection_id: "c1".into() })
            .unwrap();
        assert!(matches!(engine.view(), View::Ready(_)));

        assert!(engine.call_endpoint("f", "onSubmit"));
        assert!(!engine.call_endpoint("f", "onClick"));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let posts = api.posts.lock().unwrap();
        assert_eq!(
            *posts,
            vec![(
                "f-submit".to_string(),
                json!({}),
                vec![("Content-Type".to_string(), "application/json".to_string())]
            )]
        );
    }

    #[tokio::test]
    async fn test_notify_without_hub_reports_failure() {
        let mut engine = dashboard(Value::Null);
        let handle = engine.handle();
        assert!(handle.notify("btn", "onClick", Value::Null));
        assert!(engine.pump().await.unwrap());
        // The failure arrives as a second event.
        assert!(engine.pump().await.unwrap());
        assert_eq!(engine.host().notifications.len(), 1);
        assert_eq!(engine.host().notifications[0].level, crate::host::NotificationLevel::Error);

        assert!(handle.shutdown());
        assert!(!engine.pump().await.unwrap());
    }
}
