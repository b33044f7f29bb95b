//! JSON hub protocol spoken over the WebSocket.
//!
//! Wire format: each frame is a JSON object terminated by the ASCII record
//! separator `0x1E`. One WebSocket text message may carry several frames,
//! and a frame may in principle straddle messages, so inbound text goes
//! through a [`FrameBuffer`].
//!
//! ```text
//!  client                                   hub
//!    │── {"protocol":"json","version":1}␞ ──►│
//!    │◄──────────────── {}␞ ─────────────────│   handshake accepted
//!    │── {"type":1,"invocationId":"1",       │
//!    │    "target":"setSessionId",...}␞ ────►│
//!    │◄── {"type":3,"invocationId":"1"}␞ ────│   completion
//!    │◄── {"type":1,"target":"setConnectionId","arguments":["c1"]}␞
//! ```
//!
//! Inbound invocations are decoded into the typed [`HubMessage`] right here,
//! so nothing downstream matches on target strings.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use dashlink_core::Descriptor;

/// Frame terminator.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Protocol name and version sent in the handshake.
pub const PROTOCOL_NAME: &str = "json";
pub const PROTOCOL_VERSION: u32 = 1;

const TYPE_INVOCATION: u8 = 1;
const TYPE_COMPLETION: u8 = 3;
const TYPE_PING: u8 = 6;
const TYPE_CLOSE: u8 = 7;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Unknown hub target: {0}")]
    UnknownTarget(String),
    #[error("Missing argument {index} for `{target}`")]
    MissingArgument { target: String, index: usize },
    #[error("Invalid payload for `{target}`: {reason}")]
    InvalidPayload { target: String, reason: String },
}

// ───────────────────────────────────────────────────────────────────
// Framing
// ───────────────────────────────────────────────────────────────────

/// Accumulates inbound text and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: String,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text, returning every frame completed by it.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.pending.push_str(text);
        let mut frames = Vec::new();
        while let Some(end) = self.pending.find(RECORD_SEPARATOR) {
            let frame: String = self.pending.drain(..end).collect();
            // Drop the separator itself.
            self.pending.drain(..RECORD_SEPARATOR.len_utf8());
            if !frame.trim().is_empty() {
                frames.push(frame);
            }
        }
        frames
    }

    /// Bytes held back waiting for a separator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Handshake request, the first frame on a new connection.
pub fn handshake_request() -> String {
    let body = json!({"protocol": PROTOCOL_NAME, "version": PROTOCOL_VERSION});
    terminate(body.to_string())
}

/// Parse the hub's handshake reply: `{}` accepts, `{"error": ..}` rejects.
pub fn parse_handshake_response(frame: &str) -> Result<Option<String>, ProtocolError> {
    #[derive(Deserialize)]
    struct HandshakeResponse {
        #[serde(default)]
        error: Option<String>,
    }

    let parsed: HandshakeResponse = serde_json::from_str(frame)
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    Ok(parsed.error)
}

fn terminate(mut body: String) -> String {
    body.push(RECORD_SEPARATOR);
    body
}

/// One decoded hub frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
    },
    /// Streaming and cancellation frames; not used by this client.
    Unsupported(u8),
}

#[derive(Serialize, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(rename = "invocationId", default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Frame {
    pub fn invocation(invocation_id: impl Into<String>, target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Frame::Invocation {
            invocation_id: Some(invocation_id.into()),
            target: target.into(),
            arguments,
        }
    }

    /// Serialise including the trailing separator.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let raw = match self {
            Frame::Invocation { invocation_id, target, arguments } => RawFrame {
                kind: TYPE_INVOCATION,
                invocation_id: invocation_id.clone(),
                target: Some(target.clone()),
                arguments: Some(arguments.clone()),
                result: None,
                error: None,
            },
            Frame::Completion { invocation_id, result, error } => RawFrame {
                kind: TYPE_COMPLETION,
                invocation_id: Some(invocation_id.clone()),
                target: None,
                arguments: None,
                result: result.clone(),
                error: error.clone(),
            },
            Frame::Ping => RawFrame::bare(TYPE_PING),
            Frame::Close { error } => RawFrame {
                error: error.clone(),
                ..RawFrame::bare(TYPE_CLOSE)
            },
            Frame::Unsupported(kind) => RawFrame::bare(*kind),
        };
        serde_json::to_string(&raw)
            .map(terminate)
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Parse one frame (without separator).
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let raw: RawFrame = serde_json::from_str(frame)
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;

        Ok(match raw.kind {
            TYPE_INVOCATION => Frame::Invocation {
                invocation_id: raw.invocation_id,
                target: raw.target.ok_or_else(|| {
                    ProtocolError::Deserialization("invocation without target".into())
                })?,
                arguments: raw.arguments.unwrap_or_default(),
            },
            TYPE_COMPLETION => Frame::Completion {
                invocation_id: raw.invocation_id.ok_or_else(|| {
                    ProtocolError::Deserialization("completion without invocationId".into())
                })?,
                result: raw.result,
                error: raw.error,
            },
            TYPE_PING => Frame::Ping,
            TYPE_CLOSE => Frame::Close { error: raw.error },
            other => Frame::Unsupported(other),
        })
    }
}

impl RawFrame {
    fn bare(kind: u8) -> Self {
        Self {
            kind,
            invocation_id: None,
            target: None,
            arguments: None,
            result: None,
            error: None,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Inbound messages
// ───────────────────────────────────────────────────────────────────

/// Every server → client call the hub can make.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    SetState {
        component_id: String,
        state: Map<String, Value>,
    },
    RequestState {
        component_id: String,
        request_id: String,
    },
    AddElement {
        component_id: String,
        elements: Vec<Descriptor>,
    },
    /// `parent_id` is carried through but only the target itself is hidden.
    RemoveElement {
        component_id: String,
        parent_id: Option<String>,
    },
    ClearElement {
        component_id: String,
    },
    SyncElement {
        component_id: String,
    },
    TestForm {
        component_id: String,
    },
    ShowModal {
        props: Value,
    },
    CloseModal,
    Redirect {
        url: String,
        open_in_new_window: bool,
    },
    Refresh,
    Select {
        element_id: String,
        scroll_to_element: bool,
    },
    InvokeJavascript {
        script: String,
    },
    Clipboard {
        data: Option<String>,
        toast_on_success: bool,
        toast_on_error: bool,
    },
    Write {
        message: Value,
    },
    SetConnectionId {
        connection_id: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetStatePayload {
    component_id: String,
    #[serde(default)]
    state: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestStatePayload {
    component_id: String,
    request_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddElementPayload {
    component_id: String,
    #[serde(default)]
    elements: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveElementPayload {
    component_id: String,
    #[serde(default)]
    parent_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedirectPayload {
    url: String,
    #[serde(default)]
    open_in_new_window: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectPayload {
    id: String,
    #[serde(default)]
    scroll_to_element: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClipboardPayload {
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    toast_on_success: bool,
    #[serde(default)]
    toast_on_error: bool,
}

impl HubMessage {
    /// Decode an invocation by target name.
    pub fn decode(target: &str, arguments: &[Value]) -> Result<Self, ProtocolError> {
        let message = match target {
            "setState" => {
                let p: SetStatePayload = json_arg(target, arguments, 0)?;
                HubMessage::SetState {
                    component_id: p.component_id,
                    state: p.state,
                }
            }
            "requestState" => {
                let p: RequestStatePayload = json_arg(target, arguments, 0)?;
                HubMessage::RequestState {
                    component_id: p.component_id,
                    request_id: p.request_id,
                }
            }
            "addElement" => {
                let p: AddElementPayload = json_arg(target, arguments, 0)?;
                HubMessage::AddElement {
                    component_id: p.component_id,
                    elements: Descriptor::from_value(p.elements).as_children(),
                }
            }
            "removeElement" => {
                let p: RemoveElementPayload = json_arg(target, arguments, 0)?;
                HubMessage::RemoveElement {
                    component_id: p.component_id,
                    parent_id: p.parent_id,
                }
            }
            "clearElement" => HubMessage::ClearElement {
                component_id: string_arg(target, arguments, 0)?,
            },
            "syncElement" => HubMessage::SyncElement {
                component_id: string_arg(target, arguments, 0)?,
            },
            "testForm" => HubMessage::TestForm {
                component_id: string_arg(target, arguments, 0)?,
            },
            "showModal" => HubMessage::ShowModal {
                props: json_arg(target, arguments, 0)?,
            },
            "closeModal" => HubMessage::CloseModal,
            "redirect" => {
                let p: RedirectPayload = json_arg(target, arguments, 0)?;
                HubMessage::Redirect {
                    url: p.url,
                    open_in_new_window: p.open_in_new_window,
                }
            }
            "refresh" => HubMessage::Refresh,
            "select" => {
                let p: SelectPayload = json_arg(target, arguments, 0)?;
                HubMessage::Select {
                    element_id: p.id,
                    scroll_to_element: p.scroll_to_element,
                }
            }
            "invokejavascript" => HubMessage::InvokeJavascript {
                script: string_arg(target, arguments, 0)?,
            },
            "clipboard" => {
                let p: ClipboardPayload = json_arg(target, arguments, 0)?;
                HubMessage::Clipboard {
                    data: p.data,
                    toast_on_success: p.toast_on_success,
                    toast_on_error: p.toast_on_error,
                }
            }
            "write" => HubMessage::Write {
                message: arguments.first().cloned().unwrap_or(Value::Null),
            },
            "setConnectionId" => HubMessage::SetConnectionId {
                connection_id: string_arg(target, arguments, 0)?,
            },
            other => return Err(ProtocolError::UnknownTarget(other.to_string())),
        };
        Ok(message)
    }

    /// Hub target name of this message.
    pub fn target(&self) -> &'static str {
        match self {
            HubMessage::SetState { .. } => "setState",
            HubMessage::RequestState { .. } => "requestState",
            HubMessage::AddElement { .. } => "addElement",
            HubMessage::RemoveElement { .. } => "removeElement",
            HubMessage::ClearElement { .. } => "clearElement",
            HubMessage::SyncElement { .. } => "syncElement",
            HubMessage::TestForm { .. } => "testForm",
            HubMessage::ShowModal { .. } => "showModal",
            HubMessage::CloseModal => "closeModal",
            HubMessage::Redirect { .. } => "redirect",
            HubMessage::Refresh => "refresh",
            HubMessage::Select { .. } => "select",
            HubMessage::InvokeJavascript { .. } => "invokejavascript",
            HubMessage::Clipboard { .. } => "clipboard",
            HubMessage::Write { .. } => "write",
            HubMessage::SetConnectionId { .. } => "setConnectionId",
        }
    }

    /// Component topic the message is routed to, if it has one.
    pub fn component_id(&self) -> Option<&str> {
        match self {
            HubMessage::SetState { component_id, .. }
            | HubMessage::RequestState { component_id, .. }
            | HubMessage::AddElement { component_id, .. }
            | HubMessage::RemoveElement { component_id, .. }
            | HubMessage::ClearElement { component_id }
            | HubMessage::SyncElement { component_id }
            | HubMessage::TestForm { component_id } => Some(component_id),
            _ => None,
        }
    }
}

/// Payloads arrive JSON-encoded inside a string argument; a structured
/// argument is accepted as well.
fn json_arg<T: DeserializeOwned>(target: &str, arguments: &[Value], index: usize) -> Result<T, ProtocolError> {
    let arg = arguments.get(index).ok_or_else(|| ProtocolError::MissingArgument {
        target: target.to_string(),
        index,
    })?;
    let invalid = |e: serde_json::Error| ProtocolError::InvalidPayload {
        target: target.to_string(),
        reason: e.to_string(),
    };
    match arg {
        Value::String(text) => serde_json::from_str(text).map_err(invalid),
        other => serde_json::from_value(other.clone()).map_err(invalid),
    }
}

fn string_arg(target: &str, arguments: &[Value], index: usize) -> Result<String, ProtocolError> {
    match arguments.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ProtocolError::InvalidPayload {
            target: target.to_string(),
            reason: format!("expected string, got {other}"),
        }),
        None => Err(ProtocolError::MissingArgument {
            target: target.to_string(),
            index,
        }),
    }
}

// ───────────────────────────────────────────────────────────────────
// Outbound invocations
// ───────────────────────────────────────────────────────────────────

/// Every client → server hub call.
#[derive(Debug, Clone, PartialEq)]
pub enum HubInvocation {
    SetSessionId(String),
    ClientEvent {
        event_id: String,
        event_name: String,
        event_data: Value,
        location: Option<String>,
    },
    UnregisterEvent {
        event_id: String,
    },
}

impl HubInvocation {
    pub fn target(&self) -> &'static str {
        match self {
            HubInvocation::SetSessionId(_) => "setSessionId",
            HubInvocation::ClientEvent { .. } => "clientEvent",
            HubInvocation::UnregisterEvent { .. } => "unregisterEvent",
        }
    }

    pub fn arguments(&self) -> Vec<Value> {
        match self {
            HubInvocation::SetSessionId(session_id) => vec![Value::String(session_id.clone())],
            HubInvocation::ClientEvent {
                event_id,
                event_name,
                event_data,
                location,
            } => vec![
                Value::String(event_id.clone()),
                Value::String(event_name.clone()),
                event_data.clone(),
                location.clone().map_or(Value::Null, Value::String),
            ],
            HubInvocation::UnregisterEvent { event_id } => vec![Value::String(event_id.clone())],
        }
    }
}
