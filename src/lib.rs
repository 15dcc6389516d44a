pub mod apiclient;
pub mod browser;
pub mod core;
pub mod dom;
pub mod errors;
pub mod lifecycle;
pub mod types;
pub mod utils;
pub mod wait;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use apiclient::{ApiClient, ApiRequest, ApiResponse};
pub use browser::{InProcessDriver, RemoteDriver, ZeroDriver};
pub use crate::core::{BrowserManager, Configuration, Driver, RunnerOptions, Tool};
pub use dom::{Document, Element, ElementHandle, FieldInput, FieldValue, Form, FormValue};
pub use errors::{BrowserError, ErrorKind, Result};
pub use lifecycle::{ApiClientHandle, Declaration, WebBrowser};
pub use types::*;
pub use wait::{Wait, WaitExpression, WaitFor};
