use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Feature tags a test may branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Cookies,
    Headers,
    Status,
    Javascript,
    Upload,
    InProcess,
    Visibility,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Cookies => "cookies",
            Capability::Headers => "headers",
            Capability::Status => "status",
            Capability::Javascript => "javascript",
            Capability::Upload => "upload",
            Capability::InProcess => "in-process",
            Capability::Visibility => "visibility",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Capability::as_str).collect();
        f.write_str(&names.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgent {
    pub browser: String,
    pub platform: String,
    pub version: String,
}

impl UserAgent {
    pub fn new(browser: &str, platform: &str, version: &str) -> Self {
        Self {
            browser: browser.to_string(),
            platform: platform.to_string(),
            version: version.to_string(),
        }
    }
}

/// A DOM event fired at an element on the user's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementEvent {
    DoubleClick,
    MouseOver,
    MouseOut,
    ContextMenu,
    Focus,
    /// Any other event, by its DOM name.
    Named(String),
}

impl ElementEvent {
    /// Event type as the DOM spells it, e.g. `"dblclick"`.
    pub fn dom_name(&self) -> &str {
        match self {
            ElementEvent::DoubleClick => "dblclick",
            ElementEvent::MouseOver => "mouseover",
            ElementEvent::MouseOut => "mouseout",
            ElementEvent::ContextMenu => "contextmenu",
            ElementEvent::Focus => "focus",
            ElementEvent::Named(name) => name,
        }
    }

    pub fn is_mouse(&self) -> bool {
        matches!(
            self,
            ElementEvent::DoubleClick
                | ElementEvent::MouseOver
                | ElementEvent::MouseOut
                | ElementEvent::ContextMenu
        )
    }
}

impl From<&str> for ElementEvent {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "dblclick" | "double_click" => ElementEvent::DoubleClick,
            "mouseover" | "mouse_over" => ElementEvent::MouseOver,
            "mouseout" | "mouse_out" => ElementEvent::MouseOut,
            "contextmenu" | "context_menu" => ElementEvent::ContextMenu,
            "focus" => ElementEvent::Focus,
            _ => ElementEvent::Named(name.trim().to_string()),
        }
    }
}

impl fmt::Display for ElementEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dom_name())
    }
}

/// A cookie to plant in a browsing session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub http_only: bool,
}

impl CookieSpec {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            ..Default::default()
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}
