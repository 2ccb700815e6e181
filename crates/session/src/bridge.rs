// Capability surface of the external visual editor.
//
// The session core never renders anything. It reads and writes project data
// through `EditorBridge` and listens for change events, subscribing once at
// construction and unsubscribing at teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use canvasdeck_common::types::PageSnapshot;
use serde_json::Value;

use crate::lock;

/// Change notifications emitted by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorEvent {
    ComponentsChanged,
    StyleChanged,
}

impl EditorEvent {
    pub const ALL: [EditorEvent; 2] = [EditorEvent::ComponentsChanged, EditorEvent::StyleChanged];

    /// Event name as the editor engine spells it.
    pub fn name(self) -> &'static str {
        match self {
            Self::ComponentsChanged => "change:components",
            Self::StyleChanged => "change:style",
        }
    }
}

pub type EditorEventHandler = Arc<dyn Fn(EditorEvent) + Send + Sync>;

/// Token returned by `EditorBridge::on`, consumed by `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

pub trait EditorBridge: Send + Sync {
    fn components(&self) -> Value;
    fn set_components(&self, components: &Value);
    fn style(&self) -> Value;
    fn set_style(&self, style: &Value);
    fn html(&self) -> String;
    fn css(&self) -> String;
    fn on(&self, event: EditorEvent, handler: EditorEventHandler) -> SubscriptionId;
    fn off(&self, subscription: SubscriptionId);
}

/// Read the editor's live state.
pub fn capture_snapshot(bridge: &dyn EditorBridge) -> PageSnapshot {
    PageSnapshot {
        components: bridge.components(),
        styles: bridge.style(),
        html: bridge.html(),
        css: bridge.css(),
    }
}

/// Replace the editor's content with a stored snapshot.
pub fn load_snapshot(bridge: &dyn EditorBridge, snapshot: &PageSnapshot) {
    bridge.set_components(&snapshot.components);
    bridge.set_style(&snapshot.styles);
}

// ── Headless editor ────────────────────────────────────────────────

#[derive(Default)]
struct HeadlessState {
    components: Value,
    style: Value,
    html: String,
    css: String,
}

/// In-process `EditorBridge` with no rendering.
///
/// Used for headless sessions (scripted edits, server-side imports) and as
/// the editor double in tests. Like real canvas engines it emits change
/// events when content is replaced programmatically.
#[derive(Default)]
pub struct HeadlessEditor {
    state: Mutex<HeadlessState>,
    handlers: Mutex<HashMap<SubscriptionId, (EditorEvent, EditorEventHandler)>>,
    next_subscription: AtomicU64,
}

impl HeadlessEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a user edit to the component tree and emit `ComponentsChanged`.
    pub fn edit_components(&self, components: Value) {
        {
            let mut state = lock(&self.state);
            state.html = render_html(&components);
            state.components = components;
        }
        self.emit(EditorEvent::ComponentsChanged);
    }

    /// Apply a user edit to the style rules and emit `StyleChanged`.
    pub fn edit_style(&self, style: Value) {
        {
            let mut state = lock(&self.state);
            state.css = render_css(&style);
            state.style = style;
        }
        self.emit(EditorEvent::StyleChanged);
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.handlers).len()
    }

    fn emit(&self, event: EditorEvent) {
        // Handlers run without the registry lock so they may call back in.
        let handlers: Vec<EditorEventHandler> = lock(&self.handlers)
            .values()
            .filter(|(kind, _)| *kind == event)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl EditorBridge for HeadlessEditor {
    fn components(&self) -> Value {
        lock(&self.state).components.clone()
    }

    fn set_components(&self, components: &Value) {
        {
            let mut state = lock(&self.state);
            state.components = components.clone();
            state.html = render_html(components);
        }
        self.emit(EditorEvent::ComponentsChanged);
    }

    fn style(&self) -> Value {
        lock(&self.state).style.clone()
    }

    fn set_style(&self, style: &Value) {
        {
            let mut state = lock(&self.state);
            state.style = style.clone();
            state.css = render_css(style);
        }
        self.emit(EditorEvent::StyleChanged);
    }

    fn html(&self) -> String {
        lock(&self.state).html.clone()
    }

    fn css(&self) -> String {
        lock(&self.state).css.clone()
    }

    fn on(&self, event: EditorEvent, handler: EditorEventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed) + 1);
        lock(&self.handlers).insert(id, (event, handler));
        id
    }

    fn off(&self, subscription: SubscriptionId) {
        lock(&self.handlers).remove(&subscription);
    }
}

// Minimal stand-ins for the engine's exporters: enough to keep the html/css
// caches in step with the project data.
fn render_html(components: &Value) -> String {
    match components {
        Value::Array(items) => items.iter().map(render_html).collect(),
        Value::Object(map) => {
            let tag = map.get("tagName").and_then(Value::as_str).unwrap_or("div");
            let inner = map
                .get("components")
                .map(render_html)
                .or_else(|| map.get("content").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_default();
            format!("<{tag}>{inner}</{tag}>")
        }
        Value::String(text) => text.clone(),
        _ => String::new(),
    }
}

fn render_css(style: &Value) -> String {
    match style {
        Value::String(css) => css.clone(),
        Value::Array(rules) => rules.iter().map(render_css).collect::<Vec<_>>().join(""),
        Value::Object(rule) => {
            let selector = rule.get("selectors").and_then(Value::as_str).unwrap_or("*");
            let body = rule
                .get("style")
                .and_then(Value::as_object)
                .map(|decls| {
                    decls
                        .iter()
                        .map(|(prop, value)| {
                            format!("{prop}:{};", value.as_str().unwrap_or_default())
                        })
                        .collect::<String>()
                })
                .unwrap_or_default();
            format!("{selector}{{{body}}}")
        }
        _ => String::new(),
    }
}
