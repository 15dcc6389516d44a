use crate::dom::controls::{self, view, ControlMut};
use crate::dom::document::Document;
use crate::dom::element::{Element, ElementHandle};
use crate::errors::{BrowserError, Result};
use ego_tree::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use url::Url;

pub const URLENCODED: &str = "application/x-www-form-urlencoded";
pub const MULTIPART: &str = "multipart/form-data";

/// Input types a browser never submits as a field.
const UNSUBMITTED_TYPES: &[&str] = &["submit", "image", "reset", "button"];

/// Effective value of a named field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Text controls, textareas and single checkables.
    Text(String),
    /// A single select; `None` when no option is selected.
    Selected(Option<String>),
    /// Checkable groups and multiple selects.
    Set(BTreeSet<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Selected(selected) => selected.as_deref(),
            FieldValue::Set(_) => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            FieldValue::Set(set) => Some(set),
            _ => None,
        }
    }
}

impl PartialEq<&str> for FieldValue {
    fn eq(&self, other: &&str) -> bool {
        self.as_text() == Some(*other)
    }
}

/// A value written into a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldInput {
    Text(String),
    Checked(bool),
    Many(Vec<String>),
    Unset,
}

impl From<&str> for FieldInput {
    fn from(value: &str) -> Self {
        FieldInput::Text(value.to_string())
    }
}

impl From<String> for FieldInput {
    fn from(value: String) -> Self {
        FieldInput::Text(value)
    }
}

impl From<&String> for FieldInput {
    fn from(value: &String) -> Self {
        FieldInput::Text(value.clone())
    }
}

impl From<bool> for FieldInput {
    fn from(value: bool) -> Self {
        FieldInput::Checked(value)
    }
}

impl From<Vec<&str>> for FieldInput {
    fn from(values: Vec<&str>) -> Self {
        FieldInput::Many(values.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for FieldInput {
    fn from(values: Vec<String>) -> Self {
        FieldInput::Many(values)
    }
}

impl<const N: usize> From<[&str; N]> for FieldInput {
    fn from(values: [&str; N]) -> Self {
        FieldInput::Many(values.iter().map(|v| v.to_string()).collect())
    }
}

impl From<Option<&str>> for FieldInput {
    fn from(value: Option<&str>) -> Self {
        match value {
            Some(value) => FieldInput::Text(value.to_string()),
            None => FieldInput::Unset,
        }
    }
}

/// One submitted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormValue {
    Text(String),
    File { path: String, mimetype: String },
}

impl FormValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FormValue::Text(text) => Some(text),
            FormValue::File { .. } => None,
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        let path = path.into();
        let mimetype = guess_mimetype(&path).to_string();
        FormValue::File { path, mimetype }
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Text(value)
    }
}

pub fn guess_mimetype(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Everything a driver needs to dispatch a form submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub method: String,
    pub action: String,
    pub enctype: String,
    pub values: Vec<(String, FormValue)>,
}

/// Controls of a form grouped by name, in first-appearance order.
#[derive(Debug, Clone)]
pub struct Inputs<'a> {
    order: Vec<&'a str>,
    groups: HashMap<&'a str, Vec<Element<'a>>>,
}

impl<'a> Inputs<'a> {
    fn collect(controls: Vec<Element<'a>>) -> Self {
        let mut order = Vec::new();
        let mut groups: HashMap<&'a str, Vec<Element<'a>>> = HashMap::new();
        for control in controls {
            let name = match control.name() {
                Some(name) if !name.is_empty() => name,
                _ => continue,
            };
            groups
                .entry(name)
                .or_insert_with(|| {
                    order.push(name);
                    Vec::new()
                })
                .push(control);
        }
        Self { order, groups }
    }

    pub fn get(&self, name: &str) -> Result<&[Element<'a>]> {
        self.groups
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| BrowserError::NoSuchField(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn names(&self) -> &[&'a str] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &[Element<'a>])> + '_ {
        self.order
            .iter()
            .map(move |name| (*name, self.groups[name].as_slice()))
    }
}

fn group_value(group: &[Element<'_>]) -> FieldValue {
    let first = group[0];
    if first.is_checkable() {
        if group.len() == 1 {
            let value = if first.is_checked() {
                first.checkable_value()
            } else {
                String::new()
            };
            return FieldValue::Text(value);
        }
        return FieldValue::Set(
            group
                .iter()
                .filter(|el| el.is_checked())
                .map(|el| el.checkable_value())
                .collect(),
        );
    }
    match first.tag() {
        "select" if first.is_multiple() => FieldValue::Set(first.selected_values()),
        "select" => FieldValue::Selected(first.value()),
        _ => FieldValue::Text(first.value().unwrap_or_default()),
    }
}

/// Read-only view of a `<form>` element.
#[derive(Debug, Clone, Copy)]
pub struct Form<'a> {
    el: Element<'a>,
}

impl<'a> Form<'a> {
    pub(crate) fn from_element(el: Element<'a>) -> Option<Self> {
        (el.tag() == "form").then_some(Self { el })
    }

    pub fn element(&self) -> Element<'a> {
        self.el
    }

    pub fn handle(&self) -> ElementHandle {
        self.el.handle()
    }

    /// Inputs, selects and textareas in document order.
    pub fn controls(&self) -> Vec<Element<'a>> {
        self.el
            .select("input, select, textarea")
            .unwrap_or_default()
    }

    pub fn inputs(&self) -> Inputs<'a> {
        Inputs::collect(self.controls())
    }

    pub fn field(&self, name: &str) -> Result<FieldValue> {
        Ok(group_value(self.inputs().get(name)?))
    }

    pub fn fields(&self) -> Vec<(String, FieldValue)> {
        self.inputs()
            .iter()
            .map(|(name, group)| (name.to_string(), group_value(group)))
            .collect()
    }

    pub fn method(&self) -> String {
        self.el
            .attr("method")
            .map(|m| m.trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "GET".to_string())
    }

    pub fn action(&self) -> Option<&'a str> {
        self.el.attr("action").filter(|a| !a.trim().is_empty())
    }

    pub fn enctype(&self) -> String {
        self.el
            .attr("enctype")
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| URLENCODED.to_string())
    }

    /// The name/value pairs a browser would submit for this form.
    pub fn form_values(&self) -> Vec<(String, FormValue)> {
        let mut values = Vec::new();
        for (name, group) in self.inputs().iter() {
            if UNSUBMITTED_TYPES.contains(&group[0].input_type().as_str()) {
                continue;
            }
            for el in group {
                if el.is_disabled() {
                    continue;
                }
                if el.is_checkable() {
                    if el.is_checked() {
                        values.push((name.to_string(), FormValue::Text(el.checkable_value())));
                    }
                    continue;
                }
                match el.tag() {
                    "select" if el.is_multiple() => {
                        for value in el.selected_values() {
                            values.push((name.to_string(), FormValue::Text(value)));
                        }
                    }
                    "select" => match el.value() {
                        Some(value) => values.push((name.to_string(), FormValue::Text(value))),
                        None if !el.options().is_empty() => {
                            values.push((name.to_string(), FormValue::Text(String::new())))
                        }
                        None => {}
                    },
                    _ if el.input_type() == "file" => {
                        let value = match el.value().filter(|path| !path.is_empty()) {
                            Some(path) => FormValue::file(path),
                            None => FormValue::Text(String::new()),
                        };
                        values.push((name.to_string(), value));
                    }
                    _ => values.push((
                        name.to_string(),
                        FormValue::Text(el.value().unwrap_or_default()),
                    )),
                }
            }
        }
        values
    }

    /// Method, target and payload for submitting this form from the page
    /// at `location`.
    pub fn submission(
        &self,
        location: Option<&str>,
        extra: Vec<(String, FormValue)>,
    ) -> Submission {
        let method = self.method();
        let action = match (self.action(), location) {
            (Some(action), _) => action.trim().to_string(),
            (None, Some(location)) => location_target(location, method != "GET"),
            (None, None) => "/".to_string(),
        };
        let mut values = self.form_values();
        values.extend(extra);
        Submission {
            method,
            action,
            enctype: self.enctype(),
            values,
        }
    }
}

/// Path of `location`, with its query kept when the submission puts its
/// payload in the body.
fn location_target(location: &str, keep_query: bool) -> String {
    let (path, query) = match Url::parse(location) {
        Ok(url) => (url.path().to_string(), url.query().map(str::to_string)),
        Err(_) => match location.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (location.to_string(), None),
        },
    };
    let path = if path.is_empty() { "/".to_string() } else { path };
    match query {
        Some(query) if keep_query && !query.is_empty() => format!("{}?{}", path, query),
        _ => path,
    }
}

/// Groups name/value pairs by (prefixed) name in first-seen order,
/// merging repeated names into one multi-value input.
pub fn group_pairs<I, K, V>(values: I, prefix: &str) -> Result<Vec<(String, FieldInput)>>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<FieldInput>,
{
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<FieldInput>> = HashMap::new();
    for (name, value) in values {
        let mut name = name.into();
        if !name.starts_with(prefix) {
            name = format!("{}{}", prefix, name);
        }
        if !grouped.contains_key(&name) {
            order.push(name.clone());
        }
        grouped.entry(name).or_default().push(value.into());
    }

    order
        .into_iter()
        .map(|name| {
            let mut inputs = grouped.remove(&name).unwrap_or_default();
            if inputs.len() == 1 {
                return Ok((name, inputs.remove(0)));
            }
            let mut merged = Vec::new();
            for input in inputs {
                match input {
                    FieldInput::Text(text) => merged.push(text),
                    FieldInput::Many(many) => merged.extend(many),
                    other => {
                        return Err(BrowserError::invalid_value(
                            &name,
                            format!("{:?} can not be combined with other values", other),
                        ))
                    }
                }
            }
            Ok((name, FieldInput::Many(merged)))
        })
        .collect()
}

impl Document {
    /// Mutable access to one form.
    pub fn form_mut(&mut self, handle: ElementHandle) -> Result<FormMut<'_>> {
        let el = self.resolve(handle)?;
        if el.as_form().is_none() {
            return Err(BrowserError::state(format!("<{}> is not a form", el.tag())));
        }
        Ok(FormMut {
            doc: self,
            node: handle.node,
        })
    }
}

/// Write access to a form's fields.
pub struct FormMut<'d> {
    doc: &'d mut Document,
    node: NodeId,
}

impl<'d> FormMut<'d> {
    pub fn form(&self) -> Result<Form<'_>> {
        view(self.doc, self.node)?
            .as_form()
            .ok_or(BrowserError::NoDocument)
    }

    fn group(&self, name: &str) -> Result<Vec<NodeId>> {
        Ok(self
            .form()?
            .inputs()
            .get(name)?
            .iter()
            .map(|el| el.node_id())
            .collect())
    }

    /// First control carrying `name`.
    pub fn control_mut(&mut self, name: &str) -> Result<ControlMut<'_>> {
        let node = self.group(name)?[0];
        Ok(ControlMut::new(&mut *self.doc, node))
    }

    /// Live set of checked values of a checkable group.
    pub fn checkable_group(&mut self, name: &str) -> Result<CheckableGroup<'_>> {
        let nodes = self.group(name)?;
        if !view(self.doc, nodes[0])?.is_checkable() {
            return Err(BrowserError::state(format!(
                "field {:?} is not a checkable group",
                name
            )));
        }
        Ok(CheckableGroup {
            doc: &mut *self.doc,
            name: name.to_string(),
            nodes,
        })
    }

    pub fn set_field(&mut self, name: &str, input: impl Into<FieldInput>) -> Result<()> {
        let nodes = self.group(name)?;
        assign(self.doc, name, &nodes, input.into())
    }

    pub fn set_fields<I, K, V>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldInput>,
    {
        for (name, value) in values {
            self.set_field(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Assigns every pair after grouping repeated names. Fails before
    /// writing anything when a name has no control.
    pub fn fill<I, K, V>(&mut self, values: I, prefix: &str) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldInput>,
    {
        let grouped = group_pairs(values, prefix)?;
        self.check_names(&grouped)?;
        for (name, input) in grouped {
            self.set_field(&name, input)?;
        }
        Ok(())
    }

    /// Like [`FormMut::fill`] on pre-grouped pairs, but returns the fields
    /// whose values were rejected as unknown options or checkables
    /// instead of failing on them.
    pub fn try_fill(
        &mut self,
        grouped: Vec<(String, FieldInput)>,
    ) -> Result<Vec<(String, FieldInput, BrowserError)>> {
        self.check_names(&grouped)?;
        let mut rejected = Vec::new();
        for (name, input) in grouped {
            match self.set_field(&name, input.clone()) {
                Ok(()) => {}
                Err(err) if err.is_retryable_value() => rejected.push((name, input, err)),
                Err(err) => return Err(err),
            }
        }
        Ok(rejected)
    }

    fn check_names(&self, grouped: &[(String, FieldInput)]) -> Result<()> {
        let form = self.form()?;
        let inputs = form.inputs();
        for (name, _) in grouped {
            inputs.get(name)?;
        }
        Ok(())
    }
}

fn assign(doc: &mut Document, name: &str, nodes: &[NodeId], input: FieldInput) -> Result<()> {
    let first = view(doc, nodes[0])?;
    let checkable = first.is_checkable();

    if checkable && nodes.len() == 1 {
        let own = first.checkable_value();
        let checked = match &input {
            FieldInput::Checked(checked) => *checked,
            FieldInput::Text(text) if *text == own => true,
            FieldInput::Text(text) if text.is_empty() => false,
            other => {
                return Err(BrowserError::invalid_value(
                    name,
                    format!("expected {:?}, \"\", true or false; got {:?}", own, other),
                ))
            }
        };
        return controls::set_checked(doc, nodes[0], checked);
    }

    if checkable {
        let is_radio = first.input_type() == "radio";
        let wanted = match input {
            FieldInput::Text(text) => vec![text],
            FieldInput::Many(many) => many,
            FieldInput::Unset => Vec::new(),
            FieldInput::Checked(_) => {
                return Err(BrowserError::invalid_value(
                    name,
                    "a checkable group takes values, not a checked flag",
                ))
            }
        };
        if is_radio && wanted.len() > 1 {
            return Err(BrowserError::invalid_value(
                name,
                format!("a radio group takes one value, got {}", wanted.len()),
            ));
        }
        let members = nodes
            .iter()
            .map(|node| Ok((*node, view(doc, *node)?.checkable_value())))
            .collect::<Result<Vec<_>>>()?;
        for value in &wanted {
            if !members.iter().any(|(_, member)| member == value) {
                return Err(BrowserError::NoSuchCheckable {
                    name: name.to_string(),
                    value: value.clone(),
                });
            }
        }
        for (node, value) in members {
            controls::set_checked(doc, node, wanted.contains(&value))?;
        }
        return Ok(());
    }

    let multiple = first.is_multiple();
    let tag = first.tag().to_string();
    match (tag.as_str(), input) {
        ("select", FieldInput::Many(values)) if multiple => {
            controls::select_multiple(doc, nodes[0], &values)
        }
        ("select", FieldInput::Unset) if multiple => controls::select_multiple(doc, nodes[0], &[]),
        ("select", FieldInput::Text(_)) if multiple => Err(BrowserError::state(format!(
            "field {:?} is a multiple select; assign a list of values",
            name
        ))),
        ("select", FieldInput::Text(value)) => controls::select_single(doc, nodes[0], Some(&value)),
        ("select", FieldInput::Unset) => controls::select_single(doc, nodes[0], None),
        ("select", FieldInput::Many(values)) if values.len() == 1 => {
            controls::select_single(doc, nodes[0], Some(&values[0]))
        }
        (_, FieldInput::Text(value)) => controls::set_value(doc, nodes[0], Some(&value)),
        (_, FieldInput::Unset) => controls::set_value(doc, nodes[0], None),
        (_, FieldInput::Many(values)) if tag != "select" && values.len() <= nodes.len() => {
            for (node, value) in nodes.iter().zip(values.iter()) {
                controls::set_value(doc, *node, Some(value))?;
            }
            Ok(())
        }
        (_, other) => Err(BrowserError::invalid_value(
            name,
            format!("{:?} does not fit this control", other),
        )),
    }
}

/// Live set of checked values of a checkbox or radio group.
pub struct CheckableGroup<'d> {
    doc: &'d mut Document,
    name: String,
    nodes: Vec<NodeId>,
}

impl CheckableGroup<'_> {
    pub fn values(&self) -> Result<BTreeSet<String>> {
        let mut values = BTreeSet::new();
        for node in &self.nodes {
            let el = view(self.doc, *node)?;
            if el.is_checked() {
                values.insert(el.checkable_value());
            }
        }
        Ok(values)
    }

    pub fn contains(&self, value: &str) -> Result<bool> {
        Ok(self.values()?.contains(value))
    }

    pub fn insert(&mut self, value: &str) -> Result<()> {
        let node = self.member(value)?;
        controls::set_checked(self.doc, node, true)
    }

    pub fn remove(&mut self, value: &str) -> Result<()> {
        let node = self.member(value)?;
        controls::set_checked(self.doc, node, false)
    }

    fn member(&self, value: &str) -> Result<NodeId> {
        for node in &self.nodes {
            if view(self.doc, *node)?.checkable_value() == value {
                return Ok(*node);
            }
        }
        Err(BrowserError::NoSuchCheckable {
            name: self.name.clone(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMS: &str = r#"<html><body>
<form id="signup" method="post" action="/form/submit">
  <input type="text" name="first_name">
  <input type="text" name="email" value="old@example.com">
  <input type="submit" name="go" value="Go">
  <input type="checkbox" name="cb" value="m1">
  <input type="checkbox" name="cb" value="m2" checked>
  <input type="checkbox" name="cb" value="m3">
  <input type="checkbox" name="agree">
  <input type="radio" name="r" value="r1">
  <input type="radio" name="r" value="r2">
  <input type="radio" name="r" value="r3">
  <input type="radio" name="r" value="r4" checked>
  <select name="single"><option value="a">A</option><option>b</option></select>
  <select name="multi" multiple><option value="x">X</option><option value="y">Y</option></select>
  <select name="empty"></select>
  <textarea name="notes">hello</textarea>
  <input type="file" name="upload">
  <input type="text" name="locked" value="no" disabled>
  <input type="text" value="nameless">
</form>
<form id="bare"><input name="q"></form>
</body></html>"#;

    fn signup(doc: &Document) -> ElementHandle {
        doc.lookup("#signup").unwrap().one().unwrap().handle()
    }

    fn pairs(values: Vec<(String, FormValue)>) -> Vec<(String, String)> {
        values
            .into_iter()
            .map(|(name, value)| match value {
                FormValue::Text(text) => (name, text),
                FormValue::File { path, mimetype } => (name, format!("{}|{}", path, mimetype)),
            })
            .collect()
    }

    #[test]
    fn test_inputs_and_missing_field() {
        let doc = Document::parse_default(FORMS);
        let form = doc.resolve(signup(&doc)).unwrap().as_form().unwrap();
        let inputs = form.inputs();
        assert_eq!(inputs.get("cb").unwrap().len(), 3);
        assert_eq!(inputs.get("r").unwrap().len(), 4);
        assert!(matches!(
            inputs.get("nope"),
            Err(BrowserError::NoSuchField(_))
        ));
        assert_eq!(inputs.names()[0], "first_name");
    }

    #[test]
    fn test_field_reads() {
        let doc = Document::parse_default(FORMS);
        let form = doc.resolve(signup(&doc)).unwrap().as_form().unwrap();
        assert_eq!(form.field("email").unwrap(), "old@example.com");
        assert_eq!(form.field("agree").unwrap(), FieldValue::Text(String::new()));
        assert_eq!(form.field("single").unwrap(), FieldValue::Selected(None));
        assert_eq!(form.field("notes").unwrap(), "hello");
        let cb = form.field("cb").unwrap();
        assert_eq!(cb.as_set().unwrap().iter().collect::<Vec<_>>(), vec!["m2"]);
    }

    #[test]
    fn test_checkbox_group_replace() {
        let mut doc = Document::parse_default(FORMS);
        let handle = signup(&doc);
        doc.form_mut(handle).unwrap().set_field("cb", vec!["m1", "m3"]).unwrap();
        let form = doc.resolve(handle).unwrap().as_form().unwrap();
        let expected: BTreeSet<String> = ["m1", "m3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(form.field("cb").unwrap(), FieldValue::Set(expected));
        let submitted = pairs(form.form_values());
        assert!(!submitted.contains(&("cb".to_string(), "m2".to_string())));
        assert!(submitted.contains(&("cb".to_string(), "m1".to_string())));

        let err = doc
            .form_mut(handle)
            .unwrap()
            .set_field("cb", vec!["m9"])
            .unwrap_err();
        assert!(matches!(err, BrowserError::NoSuchCheckable { .. }));
    }

    #[test]
    fn test_checkable_group_proxy() {
        let mut doc = Document::parse_default(FORMS);
        let handle = signup(&doc);
        let mut form = doc.form_mut(handle).unwrap();
        let mut group = form.checkable_group("cb").unwrap();
        assert!(group.contains("m2").unwrap());
        group.insert("m3").unwrap();
        group.remove("m2").unwrap();
        assert!(group.insert("m7").is_err());
        let values: Vec<String> = group.values().unwrap().into_iter().collect();
        assert_eq!(values, vec!["m3".to_string()]);
    }

    #[test]
    fn test_single_checkbox_accepts_own_value_or_flags() {
        let mut doc = Document::parse_default(FORMS);
        let handle = signup(&doc);
        let mut form = doc.form_mut(handle).unwrap();
        form.set_field("agree", "on").unwrap();
        assert_eq!(form.form().unwrap().field("agree").unwrap(), "on");
        form.set_field("agree", "").unwrap();
        assert_eq!(form.form().unwrap().field("agree").unwrap(), "");
        form.set_field("agree", true).unwrap();
        let err = form.set_field("agree", "yes").unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Value);
        let submitted = pairs(form.form().unwrap().form_values());
        assert!(submitted.contains(&("agree".to_string(), "on".to_string())));
    }

    #[test]
    fn test_radio_boundaries() {
        let mut doc = Document::parse_default(FORMS);
        let handle = signup(&doc);
        let radios: Vec<ElementHandle> = doc
            .select("input[name=r]")
            .unwrap()
            .iter()
            .map(|el| el.handle())
            .collect();

        doc.control_mut(radios[3]).unwrap().set_checked(false).unwrap();
        assert!(doc.resolve(radios[3]).unwrap().is_checked());

        doc.control_mut(radios[2]).unwrap().set_checked(true).unwrap();
        assert!(doc.resolve(radios[2]).unwrap().is_checked());
        assert!(!doc.resolve(radios[3]).unwrap().is_checked());

        let form = doc.resolve(handle).unwrap().as_form().unwrap();
        let r: Vec<_> = pairs(form.form_values())
            .into_iter()
            .filter(|(name, _)| name == "r")
            .collect();
        assert_eq!(r, vec![("r".to_string(), "r3".to_string())]);

        let err = doc
            .form_mut(handle)
            .unwrap()
            .set_field("r", vec!["r1", "r2"])
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Value);
        doc.form_mut(handle).unwrap().set_field("r", "r1").unwrap();
        let form = doc.resolve(handle).unwrap().as_form().unwrap();
        assert_eq!(form.field("r").unwrap().as_set().unwrap().len(), 1);
    }

    #[test]
    fn test_form_values_match_browser() {
        let doc = Document::parse_default(FORMS);
        let form = doc.resolve(signup(&doc)).unwrap().as_form().unwrap();
        let submitted = pairs(form.form_values());
        assert_eq!(
            submitted,
            vec![
                ("first_name".to_string(), "".to_string()),
                ("email".to_string(), "old@example.com".to_string()),
                ("cb".to_string(), "m2".to_string()),
                ("r".to_string(), "r4".to_string()),
                ("single".to_string(), "".to_string()),
                ("notes".to_string(), "hello".to_string()),
                ("upload".to_string(), "".to_string()),
            ]
        );
    }

    #[test]
    fn test_fill_round_trip() {
        let mut doc = Document::parse_default(FORMS);
        let handle = signup(&doc);
        doc.form_mut(handle)
            .unwrap()
            .fill(
                vec![
                    ("first_name", FieldInput::from("Tester")),
                    ("email", "t@example.com".into()),
                    ("single", " b ".into()),
                    ("multi", "x".into()),
                    ("multi", "y".into()),
                    ("notes", "bye".into()),
                    ("upload", "/tmp/photo.PNG".into()),
                ],
                "",
            )
            .unwrap();
        let form = doc.resolve(handle).unwrap().as_form().unwrap();
        assert_eq!(form.field("first_name").unwrap(), "Tester");
        assert_eq!(form.field("email").unwrap(), "t@example.com");
        assert_eq!(form.field("single").unwrap(), "b");
        assert_eq!(form.field("notes").unwrap(), "bye");
        assert_eq!(form.field("multi").unwrap().as_set().unwrap().len(), 2);
        let submitted = pairs(form.form_values());
        assert!(submitted.contains(&("upload".to_string(), "/tmp/photo.PNG|image/png".to_string())));
        assert!(submitted.contains(&("multi".to_string(), "y".to_string())));
    }

    #[test]
    fn test_fill_failures() {
        let mut doc = Document::parse_default(FORMS);
        let handle = signup(&doc);
        let err = doc
            .form_mut(handle)
            .unwrap()
            .fill(vec![("first_name", "x"), ("missing", "y")], "")
            .unwrap_err();
        assert!(matches!(err, BrowserError::NoSuchField(_)));
        let form = doc.resolve(handle).unwrap().as_form().unwrap();
        assert_eq!(form.field("first_name").unwrap(), "");

        let err = doc
            .form_mut(handle)
            .unwrap()
            .fill(vec![("single", "zzz")], "")
            .unwrap_err();
        assert!(matches!(err, BrowserError::NoSuchOption(_)));

        let err = doc
            .form_mut(handle)
            .unwrap()
            .set_field("multi", "x")
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::State);
    }

    #[test]
    fn test_fill_prefix_and_try_fill() {
        let mut doc = Document::parse_default(FORMS);
        let handle = signup(&doc);
        doc.form_mut(handle)
            .unwrap()
            .fill(vec![("_name", "Tester")], "first")
            .unwrap();
        let form = doc.resolve(handle).unwrap().as_form().unwrap();
        assert_eq!(form.field("first_name").unwrap(), "Tester");

        let grouped = group_pairs(vec![("single", "zzz"), ("notes", "ok")], "").unwrap();
        let rejected = doc.form_mut(handle).unwrap().try_fill(grouped).unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, "single");
        let form = doc.resolve(handle).unwrap().as_form().unwrap();
        assert_eq!(form.field("notes").unwrap(), "ok");
    }

    #[test]
    fn test_group_pairs_preserves_first_seen_order() {
        let grouped = group_pairs(
            vec![("b", "1"), ("a", "2"), ("b", "3")],
            "",
        )
        .unwrap();
        assert_eq!(
            grouped,
            vec![
                ("b".to_string(), FieldInput::Many(vec!["1".to_string(), "3".to_string()])),
                ("a".to_string(), FieldInput::Text("2".to_string())),
            ]
        );
        assert!(group_pairs(vec![("a", FieldInput::Checked(true)), ("a", "x".into())], "").is_err());
    }

    #[test]
    fn test_submission_targets() {
        let doc = Document::parse_default(FORMS);
        let form = doc.resolve(signup(&doc)).unwrap().as_form().unwrap();
        let submission = form.submission(None, vec![("go".to_string(), "Go".into())]);
        assert_eq!(submission.method, "POST");
        assert_eq!(submission.action, "/form/submit");
        assert_eq!(submission.enctype, URLENCODED);
        assert_eq!(submission.values.last().unwrap().0, "go");

        let bare = doc.forms()[1];
        assert_eq!(bare.method(), "GET");
        assert_eq!(
            bare.submission(Some("http://localhost/search?x=1"), vec![]).action,
            "/search"
        );
        assert_eq!(bare.submission(None, vec![]).action, "/");
        assert_eq!(location_target("/post?x=1", true), "/post?x=1");
    }

    #[test]
    fn test_guess_mimetype() {
        assert_eq!(guess_mimetype("a/b/report.pdf"), "application/pdf");
        assert_eq!(guess_mimetype("noext"), "application/octet-stream");
    }
}
