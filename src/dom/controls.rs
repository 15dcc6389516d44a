use crate::dom::document::{Document, Mutation};
use crate::dom::element::{Element, ElementHandle};
use crate::errors::{BrowserError, Result};
use ego_tree::NodeId;
use std::collections::BTreeSet;

/// Input types that accept typed text.
const TEXT_ENTRY_TYPES: &[&str] = &[
    "text", "password", "search", "email", "url", "tel", "number",
];

impl<'a> Element<'a> {
    /// Lower-cased `type` of an `<input>` (default `text`); the tag name
    /// for every other element.
    pub fn input_type(&self) -> String {
        if self.tag() == "input" {
            self.attr("type")
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "text".to_string())
        } else {
            self.tag().to_string()
        }
    }

    pub fn is_checkable(&self) -> bool {
        self.tag() == "input" && matches!(self.input_type().as_str(), "checkbox" | "radio")
    }

    pub fn is_checked(&self) -> bool {
        self.has_attr("checked")
    }

    pub fn is_multiple(&self) -> bool {
        self.tag() == "select" && self.has_attr("multiple")
    }

    pub fn is_disabled(&self) -> bool {
        self.has_attr("disabled")
    }

    /// The value a checked checkable control submits.
    pub fn checkable_value(&self) -> String {
        self.attr("value").unwrap_or("on").to_string()
    }

    /// Current value of a value-carrying element.
    ///
    /// Inputs yield their `value` attribute, textareas their text, options
    /// their canonical value and single selects their selected option.
    pub fn value(&self) -> Option<String> {
        match self.tag() {
            "input" | "button" => self.attr("value").map(str::to_string),
            "textarea" => Some(self.raw_text()),
            "option" => Some(option_value(self)),
            "select" if !self.is_multiple() => self
                .options()
                .into_iter()
                .find(|o| o.has_attr("selected"))
                .map(|o| option_value(&o)),
            _ => None,
        }
    }

    pub fn options(&self) -> Vec<Element<'a>> {
        self.select("option").unwrap_or_default()
    }

    pub fn value_options(&self) -> Vec<String> {
        self.options().iter().map(option_value).collect()
    }

    pub fn selected_values(&self) -> BTreeSet<String> {
        self.options()
            .iter()
            .filter(|o| o.has_attr("selected"))
            .map(option_value)
            .collect()
    }
}

fn option_value(option: &Element<'_>) -> String {
    match option.attr("value") {
        Some(value) => value.trim().to_string(),
        None => option.raw_text().trim().to_string(),
    }
}

/// Applies typed characters to `current`, honoring backspace and
/// newline handling the way a keyboard would.
pub fn append_text_value(current: &str, text: &str, multiline: bool) -> Result<String> {
    let mut buffer: Vec<char> = current.chars().collect();
    for ch in text.chars() {
        match ch as u32 {
            127 => {
                return Err(BrowserError::state(
                    "the delete key is not supported when entering text",
                ))
            }
            8 => {
                if buffer.ends_with(&['\r', '\n']) {
                    buffer.truncate(buffer.len() - 2);
                } else {
                    buffer.pop();
                }
            }
            10 | 13 => {
                if multiline {
                    buffer.push(ch);
                }
            }
            code if code > 31 => buffer.push(ch),
            _ => {}
        }
    }
    Ok(buffer.into_iter().collect())
}

impl Document {
    /// Mutable access to one form control.
    pub fn control_mut(&mut self, handle: ElementHandle) -> Result<ControlMut<'_>> {
        let el = self.resolve(handle)?;
        if !el.kind().is_control() && !matches!(el.tag(), "input" | "select" | "textarea") {
            return Err(BrowserError::state(format!(
                "<{}> is not a form control",
                el.tag()
            )));
        }
        Ok(ControlMut {
            doc: self,
            node: handle.node,
        })
    }
}

/// Write access to a single input, select or textarea.
pub struct ControlMut<'d> {
    doc: &'d mut Document,
    node: NodeId,
}

impl<'d> ControlMut<'d> {
    pub(crate) fn new(doc: &'d mut Document, node: NodeId) -> Self {
        Self { doc, node }
    }

    pub fn element(&self) -> Result<Element<'_>> {
        view(self.doc, self.node)
    }

    pub fn set_value(&mut self, value: &str) -> Result<()> {
        set_value(self.doc, self.node, Some(value))
    }

    pub fn clear(&mut self) -> Result<()> {
        set_value(self.doc, self.node, None)
    }

    pub fn set_checked(&mut self, checked: bool) -> Result<()> {
        set_checked(self.doc, self.node, checked)
    }

    pub fn enter(&mut self, text: &str) -> Result<()> {
        enter(self.doc, self.node, text)
    }

    /// Selects one option of a single select, or clears it with `None`.
    pub fn select(&mut self, value: Option<&str>) -> Result<()> {
        select_single(self.doc, self.node, value)
    }

    pub fn select_many<I, S>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: Vec<String> = values.into_iter().map(|v| v.as_ref().to_string()).collect();
        select_multiple(self.doc, self.node, &values)
    }

    /// Set-like view over the selected options of a multiple select.
    pub fn selected_options(&mut self) -> Result<SelectedOptions<'_>> {
        if !view(self.doc, self.node)?.is_multiple() {
            return Err(BrowserError::state(
                "selected_options requires a <select multiple>",
            ));
        }
        Ok(SelectedOptions {
            doc: &mut *self.doc,
            node: self.node,
        })
    }
}

/// Live set of selected values of a `<select multiple>`.
pub struct SelectedOptions<'d> {
    doc: &'d mut Document,
    node: NodeId,
}

impl SelectedOptions<'_> {
    pub fn values(&self) -> Result<BTreeSet<String>> {
        Ok(view(self.doc, self.node)?.selected_values())
    }

    pub fn contains(&self, value: &str) -> Result<bool> {
        Ok(self.values()?.contains(value.trim()))
    }

    pub fn insert(&mut self, value: &str) -> Result<()> {
        let option = option_node(self.doc, self.node, value)?;
        self.doc.set_attr(option, "selected", "selected");
        self.journal()
    }

    /// Deselects `value`; returns whether it was selected.
    pub fn remove(&mut self, value: &str) -> Result<bool> {
        let option = option_node(self.doc, self.node, value)?;
        let was_selected = view(self.doc, option)?.has_attr("selected");
        self.doc.remove_attr(option, "selected");
        self.journal()?;
        Ok(was_selected)
    }

    pub fn clear(&mut self) -> Result<()> {
        select_multiple(self.doc, self.node, &[])
    }

    fn journal(&mut self) -> Result<()> {
        let el = view(self.doc, self.node)?;
        let mutation = Mutation::Selected {
            target: el.locator(),
            values: el.selected_values().into_iter().collect(),
        };
        self.doc.record(mutation);
        Ok(())
    }
}

pub(crate) fn view(doc: &Document, node: NodeId) -> Result<Element<'_>> {
    doc.element(node).ok_or(BrowserError::NoDocument)
}

fn option_node(doc: &Document, select: NodeId, value: &str) -> Result<NodeId> {
    let wanted = value.trim();
    view(doc, select)?
        .options()
        .into_iter()
        .find(|o| option_value(o) == wanted)
        .map(|o| o.node_id())
        .ok_or_else(|| BrowserError::NoSuchOption(wanted.to_string()))
}

pub(crate) fn set_value(doc: &mut Document, node: NodeId, value: Option<&str>) -> Result<()> {
    let el = view(doc, node)?;
    let target = el.locator();
    let tag = el.tag().to_string();
    let multiple = el.is_multiple();
    let checkable = el.is_checkable();
    match tag.as_str() {
        "select" if multiple => Err(BrowserError::state(
            "a multiple select takes a list of values",
        )),
        "select" => select_single(doc, node, value),
        "textarea" => {
            doc.set_text(node, value.unwrap_or(""));
            doc.record(Mutation::Value {
                target,
                value: value.unwrap_or("").to_string(),
            });
            Ok(())
        }
        "input" if checkable => Err(BrowserError::state(
            "set the checked state of a checkable input instead of its value",
        )),
        "input" => {
            match value {
                Some(value) => doc.set_attr(node, "value", value),
                None => doc.remove_attr(node, "value"),
            }
            doc.record(Mutation::Value {
                target,
                value: value.unwrap_or("").to_string(),
            });
            Ok(())
        }
        _ => Err(BrowserError::state(format!("<{}> has no value", tag))),
    }
}

/// Radios sharing a name with `node`: inside its form when it has one,
/// otherwise the form-less radios of the document.
fn radio_group(doc: &Document, node: NodeId) -> Result<Vec<NodeId>> {
    let el = view(doc, node)?;
    let name = match el.name() {
        Some(name) => name,
        None => return Ok(vec![node]),
    };
    let candidates = match el.enclosing_form() {
        Some(form) => form.controls(),
        None => doc
            .select("input")?
            .into_iter()
            .filter(|input| input.enclosing_form().is_none())
            .collect(),
    };
    Ok(candidates
        .into_iter()
        .filter(|c| c.input_type() == "radio" && c.name() == Some(name))
        .map(|c| c.node_id())
        .collect())
}

pub(crate) fn set_checked(doc: &mut Document, node: NodeId, checked: bool) -> Result<()> {
    let el = view(doc, node)?;
    if !el.is_checkable() {
        return Err(BrowserError::state(format!(
            "<{} type={}> is not a checkable input",
            el.tag(),
            el.input_type()
        )));
    }
    if el.is_checked() == checked {
        return Ok(());
    }
    let target = el.locator();

    if el.input_type() == "radio" {
        if !checked {
            // A checked radio is only released by checking a sibling.
            return Ok(());
        }
        for sibling in radio_group(doc, node)? {
            if sibling != node {
                doc.remove_attr(sibling, "checked");
            }
        }
    }

    if checked {
        doc.set_attr(node, "checked", "checked");
    } else {
        doc.remove_attr(node, "checked");
    }
    doc.record(Mutation::Checked { target, checked });
    Ok(())
}

pub(crate) fn select_single(doc: &mut Document, node: NodeId, value: Option<&str>) -> Result<()> {
    let el = view(doc, node)?;
    if el.tag() != "select" {
        return Err(BrowserError::state(format!("<{}> is not a select", el.tag())));
    }
    let target = el.locator();
    let options: Vec<NodeId> = el.options().iter().map(|o| o.node_id()).collect();
    let chosen = match value {
        Some(value) => Some(option_node(doc, node, value)?),
        None => None,
    };

    for option in options {
        doc.remove_attr(option, "selected");
    }
    if let Some(option) = chosen {
        doc.set_attr(option, "selected", "selected");
    }
    doc.record(Mutation::Selected {
        target,
        values: value.map(|v| vec![v.trim().to_string()]).unwrap_or_default(),
    });
    Ok(())
}

pub(crate) fn select_multiple(doc: &mut Document, node: NodeId, values: &[String]) -> Result<()> {
    let el = view(doc, node)?;
    if !el.is_multiple() {
        return Err(BrowserError::state(format!(
            "<{}> is not a multiple select",
            el.tag()
        )));
    }
    let target = el.locator();
    let options: Vec<NodeId> = el.options().iter().map(|o| o.node_id()).collect();
    let chosen = values
        .iter()
        .map(|v| option_node(doc, node, v))
        .collect::<Result<Vec<_>>>()?;

    for option in options {
        doc.remove_attr(option, "selected");
    }
    for option in chosen {
        doc.set_attr(option, "selected", "selected");
    }
    doc.record(Mutation::Selected {
        target,
        values: values.iter().map(|v| v.trim().to_string()).collect(),
    });
    Ok(())
}

pub(crate) fn enter(doc: &mut Document, node: NodeId, text: &str) -> Result<()> {
    let el = view(doc, node)?;
    let multiline = match el.tag() {
        "textarea" => true,
        "input" if TEXT_ENTRY_TYPES.contains(&el.input_type().as_str()) => false,
        _ => {
            return Err(BrowserError::state(format!(
                "can not type into <{} type={}>",
                el.tag(),
                el.input_type()
            )))
        }
    };
    let target = el.locator();
    let value = append_text_value(&el.value().unwrap_or_default(), text, multiline)?;

    if multiline {
        doc.set_text(node, &value);
    } else {
        doc.set_attr(node, "value", &value);
    }
    doc.record(Mutation::Typed {
        target,
        text: text.to_string(),
        value,
    });
    Ok(())
}
