//! Terminal host: prints every view change as an indented outline.

use std::io::Write;

use dashlink_core::Rendered;
use dashlink_sync::{Host, HostError, Navigation, Notification, NotificationLevel, View};

pub struct ConsoleHost<W: Write> {
    out: W,
    /// Last text copied; the console has no system clipboard.
    clipboard: Option<String>,
    last_view: Option<View>,
}

impl<W: Write> ConsoleHost<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            clipboard: None,
            last_view: None,
        }
    }

    pub fn clipboard(&self) -> Option<&str> {
        self.clipboard.as_deref()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            log::warn!("Console write failed: {e}");
        }
    }
}

impl<W: Write> Host for ConsoleHost<W> {
    fn navigate(&mut self, target: Navigation) {
        let text = match target {
            Navigation::InApp(path) => format!("-> navigate {path}"),
            Navigation::NewWindow(url) => format!("-> open {url} in a new window"),
            Navigation::Replace(url) => format!("-> replace location with {url}"),
        };
        self.line(&text);
    }

    fn reload(&mut self) {
        self.line("-> reload");
    }

    fn focus(&mut self, element_id: &str, scroll_into_view: bool) {
        let scroll = if scroll_into_view { " (scrolled into view)" } else { "" };
        self.line(&format!("-> focus {element_id}{scroll}"));
    }

    fn copy_to_clipboard(&mut self, data: &str) -> Result<(), HostError> {
        self.clipboard = Some(data.to_string());
        Ok(())
    }

    fn notify_user(&mut self, notification: Notification) {
        let level = match notification.level {
            NotificationLevel::Success => "ok",
            NotificationLevel::Error => "error",
        };
        self.line(&format!("[{level}] {}", notification.message));
    }

    fn session_timed_out(&mut self) {
        self.line("Your session has timed out.");
    }

    fn load_assets(&mut self, stylesheets: &[String], scripts: &[String]) {
        for asset in stylesheets.iter().chain(scripts) {
            log::info!("Dashboard asset {asset} (not loaded in the console)");
        }
    }

    fn on_render(&mut self, view: &View) {
        if self.last_view.as_ref() == Some(view) {
            return;
        }
        self.last_view = Some(view.clone());
        match view {
            View::Loading => self.line("Loading..."),
            View::Failed(message) => self.line(&format!("Dashboard failed: {message}")),
            View::TimedOut(tree) => {
                let text = outline(tree);
                self.line("(session timed out)");
                self.line(text.trim_end());
            }
            View::Ready(tree) => {
                let text = outline(tree);
                self.line(text.trim_end());
            }
        }
    }
}

/// One line per element or component, indented by depth.
pub fn outline(tree: &Rendered) -> String {
    let mut out = String::new();
    write_outline(tree, 0, &mut out);
    out
}

fn write_outline(node: &Rendered, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match node {
        Rendered::Empty => {}
        Rendered::Text { text } => {
            out.push_str(&format!("{indent}\"{text}\"\n"));
        }
        Rendered::Element {
            tag,
            key,
            attributes,
            children,
        } => {
            out.push_str(&indent);
            out.push('<');
            out.push_str(tag);
            if let Some(key) = key {
                out.push_str(&format!(" #{key}"));
            }
            for (name, value) in attributes {
                match value {
                    serde_json::Value::String(s) => out.push_str(&format!(" {name}=\"{s}\"")),
                    other => out.push_str(&format!(" {name}={other}")),
                }
            }
            out.push_str(">\n");
            for child in children {
                write_outline(child, depth + 1, out);
            }
        }
        Rendered::Component {
            component,
            id,
            version,
            generation,
            body,
        } => {
            out.push_str(&format!("{indent}[{component} {id} v{version}.{generation}]\n"));
            write_outline(body, depth + 1, out);
        }
        Rendered::Fragment { children } => {
            for child in children {
                write_outline(child, depth, out);
            }
        }
    }
}
