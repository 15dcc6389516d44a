pub mod controls;
pub mod document;
pub mod element;
pub mod form;

pub use controls::{append_text_value, ControlMut, SelectedOptions};
pub use document::{Document, Locator, Mutation, TagTable};
pub use element::{Element, ElementHandle, ElementKind, Key, Lookup, TextContent};
pub use form::{
    group_pairs, guess_mimetype, CheckableGroup, FieldInput, FieldValue, Form, FormMut,
    FormValue, Inputs, Submission, MULTIPART, URLENCODED,
};
