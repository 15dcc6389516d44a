use crate::core::Driver;
use crate::dom::{Document, ElementHandle, FormValue, TagTable};
use crate::errors::Result;
use crate::types::{Capabilities, CookieSpec, UserAgent};
use crate::wait::{Wait, WaitFor};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;

pub const PLACEHOLDER: &str = "<html>
  <body>
    <h1>Not Implemented</h1>
    <p>Web browsing unavailable.</p>
  </body>
</html>
";

/// A browser that browses nowhere. Every call succeeds and the page is
/// always the same placeholder.
#[derive(Debug)]
pub struct ZeroDriver {
    capabilities: Capabilities,
    user_agent: UserAgent,
    document: Document,
}

impl Default for ZeroDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ZeroDriver {
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities::none(),
            user_agent: UserAgent::new("zero", "rust", "0.1"),
            document: Document::parse(PLACEHOLDER, &TagTable::base()),
        }
    }

    fn reload(&mut self) {
        self.document = Document::parse(PLACEHOLDER, &TagTable::base());
    }
}

#[async_trait(?Send)]
impl Driver for ZeroDriver {
    fn name(&self) -> &'static str {
        "zero"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn user_agent(&self) -> &UserAgent {
        &self.user_agent
    }

    async fn open(&mut self, url: &str, _wait: Wait) -> Result<()> {
        debug!("zero browser ignoring navigation to {}", url);
        self.reload();
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    async fn sync_document(&mut self) -> Result<()> {
        Ok(())
    }

    async fn wait_for(&mut self, _condition: &WaitFor, _timeout_ms: Option<u64>) -> Result<()> {
        Ok(())
    }

    fn document(&self) -> Result<&Document> {
        Ok(&self.document)
    }

    fn document_mut(&mut self) -> Result<&mut Document> {
        Ok(&mut self.document)
    }

    fn location(&self) -> Option<String> {
        Some("/".to_string())
    }

    fn status_code(&self) -> Option<u16> {
        None
    }

    fn status(&self) -> Option<String> {
        None
    }

    fn headers(&self) -> &[(String, String)] {
        &[]
    }

    fn response(&self) -> Option<&str> {
        Some(PLACEHOLDER)
    }

    async fn cookies(&mut self) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }

    async fn set_cookie(&mut self, _cookie: CookieSpec) -> Result<()> {
        Ok(())
    }

    async fn delete_cookie(
        &mut self,
        _name: &str,
        _domain: Option<&str>,
        _path: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }

    async fn click(&mut self, target: ElementHandle, _wait: Wait) -> Result<()> {
        self.document.resolve(target)?;
        Ok(())
    }

    async fn submit(
        &mut self,
        form: ElementHandle,
        _extra: Vec<(String, FormValue)>,
        _wait: Wait,
    ) -> Result<()> {
        self.document.resolve(form)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capability, ElementEvent};
    use crate::wait::WaitExpression;

    #[tokio::test]
    async fn test_everything_is_accepted() {
        let mut browser = ZeroDriver::new();
        browser.open("http://example.com/anything", Wait::page()).await.unwrap();
        assert_eq!(browser.location().as_deref(), Some("/"));
        assert!(browser.capabilities().is_empty());
        assert!(!browser.capabilities().contains(Capability::Cookies));
        assert_eq!(
            browser.document().unwrap().text_content(),
            "Not Implemented Web browsing unavailable."
        );
        let heading = browser.document().unwrap().lookup("h1").unwrap().one().unwrap().handle();
        assert_eq!(
            browser.document().unwrap().resolve(heading).unwrap().text_content(),
            "Not Implemented"
        );
        browser.double_click(heading, Wait::none()).await.unwrap();
        browser.mouse_over(heading, Wait::none()).await.unwrap();
        browser.mouse_out(heading, Wait::none()).await.unwrap();
        browser.focus(heading, Wait::none()).await.unwrap();
        browser
            .fire_event(heading, ElementEvent::from("change"), Wait::none())
            .await
            .unwrap();

        browser.set_cookie(CookieSpec::new("a", "1")).await.unwrap();
        assert!(browser.cookies().await.unwrap().is_empty());
        browser.delete_cookie("a", None, None).await.unwrap();
        browser.reset().await.unwrap();
        browser.reset().await.unwrap();

        let expression = WaitExpression::new().element_present("#never");
        browser
            .wait_for(&WaitFor::Expression(expression), Some(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_invalidates_handles() {
        let mut browser = ZeroDriver::new();
        let heading = browser.document().unwrap().lookup("h1").unwrap().one().unwrap().handle();
        assert!(browser.is_visible(heading).await.unwrap());
        browser.open("/", Wait::none()).await.unwrap();
        assert!(browser.click(heading, Wait::none()).await.is_err());
    }
}
