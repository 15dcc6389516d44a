pub mod javascript;

pub use javascript::{js_quote, JavaScriptRunner};
