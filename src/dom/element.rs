use crate::dom::document::{Document, Locator};
use crate::dom::form::Form;
use crate::errors::{BrowserError, Result, Scope};
use ego_tree::NodeId;
use regex::Regex;
use scraper::{ElementRef, Node, Selector};
use std::fmt;
use std::ops::Deref;
use std::sync::OnceLock;

/// Behavioral role of an element, assigned from its tag at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Generic,
    Form,
    Input,
    Select,
    Textarea,
    Button,
    Link,
}

impl ElementKind {
    pub fn is_control(self) -> bool {
        matches!(
            self,
            ElementKind::Input | ElementKind::Select | ElementKind::Textarea
        )
    }
}

/// Durable reference to an element of one specific [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub(crate) node: NodeId,
    pub(crate) generation: u64,
}

impl ElementHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Key accepted by [`Element::lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'k> {
    Index(usize),
    Query(&'k str),
}

impl From<usize> for Key<'_> {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl<'k> From<&'k str> for Key<'k> {
    fn from(query: &'k str) -> Self {
        Key::Query(query)
    }
}

impl<'k> From<&'k String> for Key<'k> {
    fn from(query: &'k String) -> Self {
        Key::Query(query.as_str())
    }
}

/// Result of a lookup: a single element, or every match in document order.
#[derive(Debug, Clone)]
pub enum Lookup<'a> {
    One(Element<'a>),
    Many(Vec<Element<'a>>),
}

impl<'a> Lookup<'a> {
    /// The single element, or a state error when the lookup matched several.
    pub fn one(self) -> Result<Element<'a>> {
        match self {
            Lookup::One(el) => Ok(el),
            Lookup::Many(all) => Err(BrowserError::state(format!(
                "expected a single element, lookup matched {}",
                all.len()
            ))),
        }
    }

    pub fn into_vec(self) -> Vec<Element<'a>> {
        match self {
            Lookup::One(el) => vec![el],
            Lookup::Many(all) => all,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Lookup::One(_) => 1,
            Lookup::Many(all) => all.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whitespace-normalized text of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextContent(String);

impl TextContent {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Deref for TextContent {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TextContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for TextContent {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TextContent {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<String> for TextContent {
    fn eq(&self, other: &String) -> bool {
        &self.0 == other
    }
}

impl From<TextContent> for String {
    fn from(text: TextContent) -> Self {
        text.0
    }
}

fn id_only() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#[A-Za-z][A-Za-z0-9:_.\-]*$").unwrap())
}

fn id_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#[A-Za-z][A-Za-z0-9:_.\-]*$").unwrap())
}

/// A node of a [`Document`]. Cheap to copy; borrows the document.
#[derive(Clone, Copy)]
pub struct Element<'a> {
    doc: &'a Document,
    el: ElementRef<'a>,
}

impl fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag())?;
        for (key, value) in self.attrs() {
            write!(f, " {}={:?}", key, value)?;
        }
        f.write_str(">")
    }
}

impl PartialEq for Element<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.node_id() == other.node_id()
    }
}

impl<'a> Element<'a> {
    pub(crate) fn new(doc: &'a Document, el: ElementRef<'a>) -> Self {
        Self { doc, el }
    }

    pub(crate) fn node_id(&self) -> NodeId {
        (*self.el).id()
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn handle(&self) -> ElementHandle {
        ElementHandle {
            node: self.node_id(),
            generation: self.doc.generation(),
        }
    }

    pub fn tag(&self) -> &'a str {
        self.el.value().name()
    }

    pub fn kind(&self) -> ElementKind {
        self.doc.kind_of(self.node_id())
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.doc.attr_of(self.node_id(), name)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn attrs(&self) -> Vec<(&'a str, &'a str)> {
        self.doc.attrs_of(self.node_id())
    }

    pub fn id(&self) -> Option<&'a str> {
        self.attr("id")
    }

    pub fn name(&self) -> Option<&'a str> {
        self.attr("name")
    }

    pub fn is_root(&self) -> bool {
        self.el.parent().and_then(ElementRef::wrap).is_none()
    }

    pub fn parent(&self) -> Option<Element<'a>> {
        self.el
            .parent()
            .and_then(ElementRef::wrap)
            .map(|el| Element::new(self.doc, el))
    }

    pub fn children(&self) -> Vec<Element<'a>> {
        self.el
            .children()
            .filter_map(ElementRef::wrap)
            .map(|el| Element::new(self.doc, el))
            .collect()
    }

    pub fn ancestors(&self) -> impl Iterator<Item = Element<'a>> + 'a {
        let doc = self.doc;
        self.el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .map(move |el| Element::new(doc, el))
    }

    /// Nearest enclosing form, if any.
    pub fn enclosing_form(&self) -> Option<Form<'a>> {
        self.ancestors().find_map(Form::from_element)
    }

    fn scope(&self) -> Scope {
        if self.is_root() {
            Scope::Document
        } else {
            Scope::Fragment
        }
    }

    fn covers(&self, node: NodeId) -> bool {
        if node == self.node_id() {
            return true;
        }
        self.doc
            .html()
            .tree
            .get(node)
            .map(|n| n.ancestors().any(|a| a.id() == self.node_id()))
            .unwrap_or(false)
    }

    /// Every element at or below this one matching `query`, in document
    /// order. Queries starting with `/` are absolute paths as produced by
    /// [`Element::fq_xpath`]; anything else is a CSS selector.
    pub fn select(&self, query: &str) -> Result<Vec<Element<'a>>> {
        if query.starts_with('/') {
            return Ok(self
                .doc
                .find_path(query)
                .filter(|found| self.covers(found.node_id()))
                .into_iter()
                .collect());
        }

        let selector = Selector::parse(query).map_err(|e| BrowserError::InvalidSelector {
            selector: query.to_string(),
            reason: format!("{:?}", e),
        })?;
        let doc = self.doc;
        Ok(doc
            .html()
            .select(&selector)
            .filter(|el| self.covers((**el).id()))
            .map(|el| Element::new(doc, el))
            .collect())
    }

    fn by_id(&self, id: &str) -> Option<Element<'a>> {
        let doc = self.doc;
        self.el
            .descendants()
            .filter_map(ElementRef::wrap)
            .map(|el| Element::new(doc, el))
            .find(|el| el.id() == Some(id))
    }

    /// Indexed, id and selector lookup.
    ///
    /// An integer indexes child elements. A bare `#id` resolves by id.
    /// Any other string is a selector: zero matches is an error, one match
    /// is returned directly, several are returned as a list. Selectors
    /// ending in an id must match exactly once.
    pub fn lookup<'k>(&self, key: impl Into<Key<'k>>) -> Result<Lookup<'a>> {
        match key.into() {
            Key::Index(index) => {
                let children = self.children();
                let len = children.len();
                children
                    .into_iter()
                    .nth(index)
                    .map(Lookup::One)
                    .ok_or(BrowserError::IndexOutOfRange {
                        scope: self.scope(),
                        index,
                        len,
                    })
            }
            Key::Query(query) if id_only().is_match(query) => self
                .by_id(&query[1..])
                .map(Lookup::One)
                .ok_or_else(|| BrowserError::NoSuchId {
                    scope: self.scope(),
                    key: query.to_string(),
                }),
            Key::Query(query) => {
                let mut found = self.select(query)?;
                if id_suffix().is_match(query) && found.len() > 1 {
                    return Err(BrowserError::AmbiguousId {
                        scope: self.scope(),
                        key: query.to_string(),
                        count: found.len(),
                    });
                }
                match found.len() {
                    0 => Err(BrowserError::NoMatch {
                        scope: self.scope(),
                        key: query.to_string(),
                    }),
                    1 => Ok(Lookup::One(found.remove(0))),
                    _ => Ok(Lookup::Many(found)),
                }
            }
        }
    }

    pub fn contains<'k>(&self, key: impl Into<Key<'k>>) -> bool {
        self.lookup(key).is_ok()
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.text_content().contains(needle)
    }

    pub fn text_content(&self) -> TextContent {
        let mut raw = String::new();
        self.collect_text(*self.el, &mut raw);
        TextContent(raw.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    /// Concatenated descendant text without whitespace normalization.
    pub fn raw_text(&self) -> String {
        let mut raw = String::new();
        self.collect_text(*self.el, &mut raw);
        raw
    }

    fn collect_text(&self, node: ego_tree::NodeRef<'a, Node>, out: &mut String) {
        if let Some(text) = self.doc.text_override(node.id()) {
            out.push_str(text);
            return;
        }
        for child in node.children() {
            match child.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(_) => self.collect_text(child, out),
                _ => {}
            }
        }
    }

    pub fn inner_html(&self) -> String {
        self.el.inner_html()
    }

    pub fn outer_html(&self) -> String {
        self.el.html()
    }

    /// Absolute path from the document root, with a 1-based position on
    /// every step that has same-tag siblings.
    pub fn fq_xpath(&self) -> String {
        let mut steps = Vec::new();
        let mut current = Some(self.el);
        while let Some(el) = current {
            let name = el.value().name();
            let parent = el.parent();
            let siblings: Vec<NodeId> = match parent {
                Some(parent) => parent
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|sibling| sibling.value().name() == name)
                    .map(|sibling| (*sibling).id())
                    .collect(),
                None => vec![(*el).id()],
            };
            if siblings.len() > 1 {
                let position = siblings
                    .iter()
                    .position(|id| *id == (*el).id())
                    .unwrap_or(0);
                steps.push(format!("{}[{}]", name, position + 1));
            } else {
                steps.push(name.to_string());
            }
            current = parent.and_then(ElementRef::wrap);
        }
        steps.reverse();
        format!("/{}", steps.join("/"))
    }

    /// How a live page finds this element: its id when it has one.
    pub fn locator(&self) -> Locator {
        match self.id() {
            Some(id) if !id.is_empty() => Locator::Id(id.to_string()),
            _ => Locator::Path(self.fq_xpath()),
        }
    }

    pub fn forms(&self) -> Vec<Form<'a>> {
        self.select("form")
            .unwrap_or_default()
            .into_iter()
            .filter_map(Form::from_element)
            .collect()
    }

    pub fn as_form(&self) -> Option<Form<'a>> {
        Form::from_element(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::document::TagTable;

    const DOM: &str = r#"<html><head><title>DOM</title></head><body>
<dl id="A">
  <dt>term</dt>
  <dd class="def">one</dd>
  <dd class="def">two</dd>
</dl>
<p id="msg">msg<br>2</p>
<ul class="list"><li id="only">x</li></ul>
<ul class="list"><li>y</li></ul>
<a href="/next">next</a>
</body></html>"#;

    fn doc() -> Document {
        Document::parse(DOM, &TagTable::base().with("a", ElementKind::Link))
    }

    #[test]
    fn test_fq_xpath() {
        let doc = doc();
        let dl = doc.lookup("#A").unwrap().one().unwrap();
        assert_eq!(dl.fq_xpath(), "/html/body/dl");
        let second = doc.select("ul").unwrap()[1];
        assert_eq!(second.fq_xpath(), "/html/body/ul[2]");
        assert_eq!(doc.root().fq_xpath(), "/html");
    }

    #[test]
    fn test_lookup_single_and_many() {
        let doc = doc();
        match doc.lookup("dd.def").unwrap() {
            Lookup::Many(all) => {
                assert_eq!(all.len(), 2);
                assert_eq!(all[0].text_content(), "one");
                assert_eq!(all[1].text_content(), "two");
            }
            other => panic!("expected many, got {:?}", other),
        }
        let dt = doc.lookup("dl dt").unwrap().one().unwrap();
        assert_eq!(dt.tag(), "dt");
    }

    #[test]
    fn test_lookup_missing_id() {
        let doc = doc();
        assert!(!doc.contains("#missingid"));
        let err = doc.lookup("#missingid").unwrap_err();
        assert!(matches!(err, BrowserError::NoSuchId { scope: Scope::Document, .. }));
        assert!(err.to_string().contains("#missingid"));

        let dl = doc.lookup("#A").unwrap().one().unwrap();
        let err = dl.lookup("#missingid").unwrap_err();
        assert!(err.to_string().starts_with("Fragment"));
    }

    #[test]
    fn test_lookup_no_match_is_error() {
        let doc = doc();
        assert!(matches!(
            doc.lookup("table"),
            Err(BrowserError::NoMatch { .. })
        ));
        assert!(doc.select("table").unwrap().is_empty());
    }

    #[test]
    fn test_lookup_id_must_match_whole_key() {
        let doc = doc();
        // "#A dd" is a selector, not an id shortcut.
        assert_eq!(doc.lookup("#A dd").unwrap().len(), 2);
        assert!(matches!(
            doc.lookup("ul #only").unwrap(),
            Lookup::One(_)
        ));
    }

    #[test]
    fn test_lookup_by_index() {
        let doc = doc();
        let dl = doc.lookup("#A").unwrap().one().unwrap();
        let first = dl.lookup(0).unwrap().one().unwrap();
        assert_eq!(first.tag(), "dt");
        assert!(matches!(
            dl.lookup(3),
            Err(BrowserError::IndexOutOfRange { len: 3, .. })
        ));
    }

    #[test]
    fn test_text_content_normalizes_whitespace() {
        let doc = doc();
        let msg = doc.lookup("#msg").unwrap().one().unwrap();
        assert_eq!(msg.text_content(), "msg2");
        let dl = doc.lookup("#A").unwrap().one().unwrap();
        assert_eq!(dl.text_content(), "term one two");
        assert!(doc.contains_text("term one"));
    }

    #[test]
    fn test_scoped_select_and_path_queries() {
        let doc = doc();
        let dl = doc.lookup("#A").unwrap().one().unwrap();
        assert!(dl.select("li").unwrap().is_empty());
        assert_eq!(dl.select("/html/body/dl").unwrap().len(), 1);
        assert!(dl.select("/html/body/p").unwrap().is_empty());
        assert!(matches!(
            doc.select("dd[["),
            Err(BrowserError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_kinds_and_locators() {
        let doc = doc();
        let link = doc.lookup("a").unwrap().one().unwrap();
        assert_eq!(link.kind(), ElementKind::Link);
        assert_eq!(link.attr("href"), Some("/next"));
        assert_eq!(link.locator(), Locator::Path("/html/body/a".to_string()));
        let dl = doc.lookup("#A").unwrap().one().unwrap();
        assert_eq!(dl.locator(), Locator::Id("A".to_string()));
        assert_eq!(dl.parent().unwrap().tag(), "body");
        assert!(doc.root().is_root());
    }
}
