use crate::dom::{Document, ElementHandle, FieldInput, FormValue};
use crate::errors::Result;
use crate::types::{Capabilities, CookieSpec, ElementEvent, UserAgent};
use crate::wait::{Wait, WaitFor};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// A browsing session over one transport.
///
/// Documents are `!Send`, so drivers are driven from a single task. Every
/// interaction replaces or resynchronizes the document; handles taken
/// before the call must be re-acquired afterwards.
#[async_trait(?Send)]
pub trait Driver {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> &Capabilities;

    fn user_agent(&self) -> &UserAgent;

    /// Navigate to `url` and resynchronize the document.
    async fn open(&mut self, url: &str, wait: Wait) -> Result<()>;

    /// Forget session state (cookies at least) without navigating.
    async fn reset(&mut self) -> Result<()>;

    /// Re-derive the document from the backend's current state.
    async fn sync_document(&mut self) -> Result<()>;

    /// Block until `condition` holds or the timeout elapses.
    async fn wait_for(&mut self, condition: &WaitFor, timeout_ms: Option<u64>) -> Result<()>;

    fn document(&self) -> Result<&Document>;

    fn document_mut(&mut self) -> Result<&mut Document>;

    fn location(&self) -> Option<String>;

    fn status_code(&self) -> Option<u16>;

    /// Status line of the last response, e.g. `"200 OK"`.
    fn status(&self) -> Option<String>;

    fn headers(&self) -> &[(String, String)];

    /// Raw body of the last response, where the backend has one.
    fn response(&self) -> Option<&str>;

    async fn cookies(&mut self) -> Result<BTreeMap<String, String>>;

    async fn set_cookie(&mut self, cookie: CookieSpec) -> Result<()>;

    async fn delete_cookie(
        &mut self,
        name: &str,
        domain: Option<&str>,
        path: Option<&str>,
    ) -> Result<()>;

    async fn click(&mut self, target: ElementHandle, wait: Wait) -> Result<()>;

    async fn submit(
        &mut self,
        form: ElementHandle,
        extra: Vec<(String, FormValue)>,
        wait: Wait,
    ) -> Result<()>;

    /// Fires `event` at `target`. Without a script engine nothing listens,
    /// so only the handle is checked.
    async fn fire_event(
        &mut self,
        target: ElementHandle,
        event: ElementEvent,
        wait: Wait,
    ) -> Result<()> {
        self.document()?.resolve(target)?;
        self.settle(wait).await
    }

    async fn double_click(&mut self, target: ElementHandle, wait: Wait) -> Result<()> {
        self.fire_event(target, ElementEvent::DoubleClick, wait).await
    }

    async fn mouse_over(&mut self, target: ElementHandle, wait: Wait) -> Result<()> {
        self.fire_event(target, ElementEvent::MouseOver, wait).await
    }

    async fn mouse_out(&mut self, target: ElementHandle, wait: Wait) -> Result<()> {
        self.fire_event(target, ElementEvent::MouseOut, wait).await
    }

    async fn context_menu(&mut self, target: ElementHandle, wait: Wait) -> Result<()> {
        self.fire_event(target, ElementEvent::ContextMenu, wait).await
    }

    async fn focus(&mut self, target: ElementHandle, wait: Wait) -> Result<()> {
        self.fire_event(target, ElementEvent::Focus, wait).await
    }

    /// Types `text` into a text control, honoring backspace and newline
    /// codes.
    async fn enter(&mut self, target: ElementHandle, text: &str, wait: Wait) -> Result<()> {
        self.document_mut()?.control_mut(target)?.enter(text)?;
        self.settle(wait).await
    }

    async fn fill(
        &mut self,
        form: ElementHandle,
        values: Vec<(String, FieldInput)>,
        prefix: &str,
        wait: Wait,
    ) -> Result<()> {
        self.document_mut()?.form_mut(form)?.fill(values, prefix)?;
        self.settle(wait).await
    }

    /// Always true where nothing is rendered.
    async fn is_visible(&mut self, target: ElementHandle) -> Result<bool> {
        self.document()?.resolve(target)?;
        Ok(true)
    }

    /// Releases the backend session. The driver is unusable afterwards.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Applies pending form edits to the backend, waits, and
    /// resynchronizes. Backends whose document is the only state just
    /// drop the journal.
    async fn settle(&mut self, _wait: Wait) -> Result<()> {
        self.document_mut()?.take_mutations();
        Ok(())
    }
}

/// Builds and tears down one driver around a test run.
#[async_trait(?Send)]
pub trait BrowserManager {
    fn backend(&self) -> &str;

    async fn create(&mut self) -> Result<Box<dyn Driver>>;

    /// Safe to call repeatedly, and before or after a failed `create`.
    async fn destroy(&mut self) -> Result<()>;
}
