use crate::dom::element::{Element, ElementHandle, ElementKind, Key, Lookup, TextContent};
use crate::dom::form::Form;
use crate::errors::{BrowserError, Result};
use crate::utils::javascript::js_quote;
use ego_tree::NodeId;
use scraper::{ElementRef, Html};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Maps tag names to element kinds. Each backend builds one at startup;
/// tags it does not list behave as [`ElementKind::Generic`].
#[derive(Debug, Clone, Default)]
pub struct TagTable {
    kinds: HashMap<String, ElementKind>,
}

impl TagTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Form controls every backend understands.
    pub fn base() -> Self {
        Self::empty()
            .with("form", ElementKind::Form)
            .with("input", ElementKind::Input)
            .with("select", ElementKind::Select)
            .with("textarea", ElementKind::Textarea)
            .with("button", ElementKind::Button)
    }

    pub fn with(mut self, tag: &str, kind: ElementKind) -> Self {
        self.kinds.insert(tag.to_ascii_lowercase(), kind);
        self
    }

    pub fn kind_of(&self, tag: &str) -> ElementKind {
        self.kinds
            .get(tag)
            .copied()
            .unwrap_or(ElementKind::Generic)
    }
}

/// Addresses an element in a live page independently of any parsed copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    Path(String),
}

impl Locator {
    /// A JavaScript expression evaluating to the element (or null).
    pub fn to_js(&self) -> String {
        match self {
            Locator::Id(id) => format!("document.getElementById({})", js_quote(id)),
            Locator::Path(path) => format!(
                "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                js_quote(path)
            ),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "#{}", id),
            Locator::Path(path) => f.write_str(path),
        }
    }
}

/// A form-state change made through the form model, queued for drivers
/// whose page lives elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Value { target: Locator, value: String },
    Typed { target: Locator, text: String, value: String },
    Checked { target: Locator, checked: bool },
    Selected { target: Locator, values: Vec<String> },
}

impl Mutation {
    pub fn target(&self) -> &Locator {
        match self {
            Mutation::Value { target, .. }
            | Mutation::Typed { target, .. }
            | Mutation::Checked { target, .. }
            | Mutation::Selected { target, .. } => target,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct LiveState {
    attrs: Vec<(String, String)>,
    text: Option<String>,
}

/// One parsed markup snapshot plus the form state written into it since.
pub struct Document {
    html: Html,
    source: String,
    kinds: HashMap<NodeId, ElementKind>,
    live: HashMap<NodeId, LiveState>,
    journal: Vec<Mutation>,
    generation: u64,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("generation", &self.generation)
            .field("bytes", &self.source.len())
            .field("pending_mutations", &self.journal.len())
            .finish()
    }
}

impl Document {
    pub fn parse(markup: &str, table: &TagTable) -> Self {
        let html = Html::parse_document(markup);
        let kinds = html
            .tree
            .root()
            .descendants()
            .filter_map(|node| {
                let el = node.value().as_element()?;
                match table.kind_of(el.name()) {
                    ElementKind::Generic => None,
                    kind => Some((node.id(), kind)),
                }
            })
            .collect();

        Self {
            html,
            source: markup.to_string(),
            kinds,
            live: HashMap::new(),
            journal: Vec::new(),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn parse_default(markup: &str) -> Self {
        Self::parse(markup, &TagTable::base())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The markup this document was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> Element<'_> {
        Element::new(self, self.html.root_element())
    }

    pub fn lookup<'k>(&self, key: impl Into<Key<'k>>) -> Result<Lookup<'_>> {
        self.root().lookup(key)
    }

    pub fn select(&self, query: &str) -> Result<Vec<Element<'_>>> {
        self.root().select(query)
    }

    pub fn contains<'k>(&self, key: impl Into<Key<'k>>) -> bool {
        self.root().contains(key)
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.root().contains_text(needle)
    }

    pub fn text_content(&self) -> TextContent {
        self.root().text_content()
    }

    pub fn forms(&self) -> Vec<Form<'_>> {
        self.root().forms()
    }

    pub fn form(&self, index: usize) -> Result<Form<'_>> {
        let forms = self.forms();
        let len = forms.len();
        forms
            .into_iter()
            .nth(index)
            .ok_or(BrowserError::IndexOutOfRange {
                scope: crate::errors::Scope::Document,
                index,
                len,
            })
    }

    pub fn title(&self) -> Option<String> {
        self.select("title")
            .ok()?
            .first()
            .map(|el| el.text_content().into_string())
    }

    /// Re-acquires an element previously taken from this document.
    pub fn resolve(&self, handle: ElementHandle) -> Result<Element<'_>> {
        if handle.generation != self.generation {
            return Err(BrowserError::StaleElement {
                held: handle.generation,
                current: self.generation,
            });
        }
        self.element(handle.node)
            .ok_or(BrowserError::StaleElement {
                held: handle.generation,
                current: self.generation,
            })
    }

    /// Finds the element at an absolute path as produced by
    /// [`Element::fq_xpath`].
    pub fn find_path(&self, path: &str) -> Option<Element<'_>> {
        let mut segments = path.split('/').filter(|s| !s.is_empty()).map(parse_step);
        let (name, index) = segments.next()?;
        let root = self.html.root_element();
        if root.value().name() != name || index != 1 {
            return None;
        }
        let mut current = root;
        for (name, index) in segments {
            current = current
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|child| child.value().name() == name)
                .nth(index.checked_sub(1)?)?;
        }
        Some(Element::new(self, current))
    }

    /// Drains queued form-state changes.
    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.journal)
    }

    pub fn pending_mutations(&self) -> &[Mutation] {
        &self.journal
    }

    pub(crate) fn html(&self) -> &Html {
        &self.html
    }

    pub(crate) fn element(&self, node: NodeId) -> Option<Element<'_>> {
        self.html
            .tree
            .get(node)
            .and_then(ElementRef::wrap)
            .map(|el| Element::new(self, el))
    }

    pub(crate) fn kind_of(&self, node: NodeId) -> ElementKind {
        self.kinds
            .get(&node)
            .copied()
            .unwrap_or(ElementKind::Generic)
    }

    pub(crate) fn attr_of(&self, node: NodeId, name: &str) -> Option<&str> {
        match self.live.get(&node) {
            Some(state) => state
                .attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            None => self.markup(node).and_then(|el| el.value().attr(name)),
        }
    }

    pub(crate) fn attrs_of(&self, node: NodeId) -> Vec<(&str, &str)> {
        match self.live.get(&node) {
            Some(state) => state
                .attrs
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            None => self
                .markup(node)
                .map(|el| el.value().attrs().collect())
                .unwrap_or_default(),
        }
    }

    pub(crate) fn text_override(&self, node: NodeId) -> Option<&str> {
        self.live.get(&node).and_then(|state| state.text.as_deref())
    }

    pub(crate) fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        let state = self.live_state(node);
        match state.attrs.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => state.attrs.push((name.to_string(), value.to_string())),
        }
    }

    pub(crate) fn remove_attr(&mut self, node: NodeId, name: &str) {
        self.live_state(node).attrs.retain(|(key, _)| key != name);
    }

    pub(crate) fn set_text(&mut self, node: NodeId, text: &str) {
        self.live_state(node).text = Some(text.to_string());
    }

    pub(crate) fn record(&mut self, mutation: Mutation) {
        self.journal.push(mutation);
    }

    fn markup(&self, node: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(node).and_then(ElementRef::wrap)
    }

    fn live_state(&mut self, node: NodeId) -> &mut LiveState {
        match self.live.entry(node) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let attrs = self
                    .html
                    .tree
                    .get(node)
                    .and_then(ElementRef::wrap)
                    .map(|el| {
                        el.value()
                            .attrs()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                entry.insert(LiveState { attrs, text: None })
            }
        }
    }
}

fn parse_step(step: &str) -> (&str, usize) {
    match step.strip_suffix(']').and_then(|s| s.split_once('[')) {
        Some((name, index)) => (name, index.parse().unwrap_or(0)),
        None => (step, 1),
    }
}
