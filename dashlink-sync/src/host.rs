//! Collaborator hooks implemented by the embedding application.
//!
//! The engine never touches a window, clipboard or script runtime itself.
//! It calls into a [`Host`] for those, and into an optional
//! [`ScriptEvaluator`] for `invokejavascript`.

use thiserror::Error;

use crate::session::Position;
use crate::View;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("script failed: {0}")]
pub struct ScriptError(pub String);

/// Where a `redirect` should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Same-origin path, routed inside the client.
    InApp(String),
    /// External URL opened in a new window.
    NewWindow(String),
    /// External URL replacing the current page.
    Replace(String),
}

impl Navigation {
    /// Classify a redirect target.
    pub fn from_redirect(url: &str, open_in_new_window: bool) -> Self {
        if url.starts_with('/') {
            Navigation::InApp(url.to_string())
        } else if open_in_new_window {
            Navigation::NewWindow(url.to_string())
        } else {
            Navigation::Replace(url.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A user-visible toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

pub trait Host {
    fn navigate(&mut self, target: Navigation);

    /// Full client reload.
    fn reload(&mut self);

    /// Focus an element, optionally scrolling it into view.
    fn focus(&mut self, element_id: &str, scroll_into_view: bool);

    fn copy_to_clipboard(&mut self, data: &str) -> Result<(), HostError>;

    fn notify_user(&mut self, notification: Notification);

    /// Called once when the liveness check fails.
    fn session_timed_out(&mut self) {}

    /// Geolocation snapshot, when the dashboard asks for one.
    fn location(&mut self) -> Option<Position> {
        None
    }

    /// Stylesheets and scripts declared by the dashboard.
    fn load_assets(&mut self, stylesheets: &[String], scripts: &[String]) {
        let _ = (stylesheets, scripts);
    }

    /// Called after every render pass and view change.
    fn on_render(&mut self, view: &View) {
        let _ = view;
    }
}

/// Capability for server-sent scripts.
pub trait ScriptEvaluator {
    fn evaluate(&mut self, script: &str) -> Result<(), ScriptError>;
}
