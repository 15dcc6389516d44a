use crate::core::{Driver, RemoteSession};
use crate::dom::{group_pairs, Document, ElementHandle, FieldInput, FormValue, TagTable};
use crate::errors::{BrowserError, Result};
use crate::types::{Capabilities, Capability, CookieSpec, ElementEvent, UserAgent};
use crate::utils::javascript::{
    click_script, event_script, mutation_script, set_cookie_script, submit_script, visibility_script,
    CLEAR_COOKIES_SCRIPT, COOKIES_SCRIPT, SYNC_DOCUMENT_SCRIPT, USER_AGENT_SCRIPT,
};
use crate::utils::JavaScriptRunner;
use crate::wait::{Wait, WaitFor};
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub const POLL_INTERVAL_MS: u64 = 50;

/// Passes `fill` makes over fields whose options appear only after
/// earlier fields changed.
pub const FILL_PASSES: usize = 5;

/// How long a `fill` pass waits for requests started by its changes.
const FILL_SETTLE_MS: u64 = 1_000;

fn user_agent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(HeadlessChrome|Chrome|Firefox|Safari)/([0-9.]+)").unwrap())
}

/// Splits a `navigator.userAgent` string into browser, platform and
/// version.
pub fn parse_user_agent(text: &str) -> UserAgent {
    let platform = text
        .split_once('(')
        .and_then(|(_, rest)| rest.split(';').next())
        .map(|p| p.trim().trim_end_matches(')').to_string())
        .unwrap_or_else(|| "unknown".to_string());
    match user_agent_pattern().captures(text) {
        Some(caps) => UserAgent::new(
            &caps[1].trim_start_matches("Headless").to_ascii_lowercase(),
            &platform,
            &caps[2],
        ),
        None => UserAgent::new("unknown", &platform, "unknown"),
    }
}

/// A browser driven over a remote session. Page state lives in the remote
/// browser; the local document is a snapshot refreshed after every
/// interaction.
pub struct RemoteDriver {
    session: Box<dyn RemoteSession>,
    base_url: Option<Url>,
    capabilities: Capabilities,
    user_agent: UserAgent,
    tags: TagTable,
    default_timeout_ms: u64,
    location: Option<String>,
    document: Option<Document>,
}

impl std::fmt::Debug for RemoteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDriver")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("location", &self.location)
            .finish()
    }
}

impl RemoteDriver {
    pub fn new(session: Box<dyn RemoteSession>) -> Self {
        Self {
            session,
            base_url: None,
            capabilities: [
                Capability::Cookies,
                Capability::Javascript,
                Capability::Visibility,
            ]
            .into_iter()
            .collect(),
            user_agent: UserAgent::new("unknown", "unknown", "unknown"),
            tags: TagTable::base(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            location: None,
            document: None,
        }
    }

    /// Relative URLs passed to `open` resolve against `base_url`.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = Some(Url::parse(base_url)?);
        Ok(self)
    }

    pub fn with_default_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    fn session(&self) -> &dyn RemoteSession {
        self.session.as_ref()
    }

    fn resolve_url(&self, url: &str) -> Result<String> {
        match &self.base_url {
            Some(base) => Ok(base.join(url)?.to_string()),
            None => Ok(Url::parse(url)?.to_string()),
        }
    }

    /// Replays queued form edits into the live page.
    async fn flush_mutations(&mut self) -> Result<()> {
        let mutations = match self.document.as_mut() {
            Some(document) => document.take_mutations(),
            None => return Ok(()),
        };
        for mutation in mutations {
            let applied = JavaScriptRunner::execute(self.session(), &mutation_script(&mutation))
                .await?;
            if applied.as_bool() != Some(true) {
                warn!("Form control {} is no longer in the page", mutation.target());
            }
        }
        Ok(())
    }

    async fn finish(&mut self, wait: Wait) -> Result<()> {
        if let Some(condition) = &wait.condition {
            self.wait_for(condition, wait.timeout_ms).await?;
        }
        self.sync_document().await
    }

    /// Runs an element script, then waits and resynchronizes.
    async fn interact(&mut self, script: String, wait: Wait) -> Result<()> {
        let found = JavaScriptRunner::execute(self.session(), &script).await?;
        if found.as_bool() != Some(true) {
            return Err(BrowserError::state(
                "the element is no longer present in the page",
            ));
        }
        self.finish(wait).await
    }

    async fn refresh_user_agent(&mut self) -> Result<()> {
        let text = JavaScriptRunner::string(self.session(), USER_AGENT_SCRIPT).await?;
        self.user_agent = parse_user_agent(&text);
        Ok(())
    }

    fn locate(&self, target: ElementHandle) -> Result<crate::dom::Locator> {
        Ok(self.document()?.resolve(target)?.locator())
    }
}

fn cookie_string(cookie: &CookieSpec) -> String {
    let mut text = format!(
        "{}={}; path={}",
        cookie.name,
        cookie.value,
        cookie.path.as_deref().unwrap_or("/")
    );
    if let Some(domain) = &cookie.domain {
        text.push_str(&format!("; domain={}", domain));
    }
    if let Some(expires) = cookie.expires {
        text.push_str(&format!(
            "; expires={}",
            expires.format("%a, %d %b %Y %H:%M:%S GMT")
        ));
    }
    if cookie.secure {
        text.push_str("; secure");
    }
    text
}

/// Parses `document.cookie` text.
pub fn parse_cookie_string(text: &str) -> BTreeMap<String, String> {
    text.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

#[async_trait(?Send)]
impl Driver for RemoteDriver {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn user_agent(&self) -> &UserAgent {
        &self.user_agent
    }

    async fn open(&mut self, url: &str, wait: Wait) -> Result<()> {
        let url = self.resolve_url(url)?;
        info!("Opening {}", url);
        self.session.navigate(&url).await?;
        if self.user_agent.version == "unknown" {
            self.refresh_user_agent().await?;
        }
        self.finish(wait).await
    }

    async fn reset(&mut self) -> Result<()> {
        JavaScriptRunner::execute(self.session(), CLEAR_COOKIES_SCRIPT).await?;
        Ok(())
    }

    async fn sync_document(&mut self) -> Result<()> {
        let markup = JavaScriptRunner::string(self.session(), SYNC_DOCUMENT_SCRIPT).await?;
        self.location = Some(self.session.current_url().await?);
        self.document = Some(Document::parse(&markup, &self.tags));
        Ok(())
    }

    async fn wait_for(&mut self, condition: &WaitFor, timeout_ms: Option<u64>) -> Result<()> {
        let timeout_ms = timeout_ms.unwrap_or(self.default_timeout_ms);
        let script = match condition.to_javascript() {
            Some(script) => script,
            None => {
                tokio::time::sleep(tokio::time::Duration::from_millis(timeout_ms)).await;
                return Ok(());
            }
        };
        let satisfied = JavaScriptRunner::wait_for_condition(
            self.session(),
            &script,
            timeout_ms,
            POLL_INTERVAL_MS,
        )
        .await?;
        if satisfied {
            Ok(())
        } else {
            warn!("Gave up waiting for {} after {}ms", condition, timeout_ms);
            Err(BrowserError::WaitTimeout {
                condition: condition.to_string(),
                timeout_ms,
            })
        }
    }

    fn document(&self) -> Result<&Document> {
        self.document.as_ref().ok_or(BrowserError::NoDocument)
    }

    fn document_mut(&mut self) -> Result<&mut Document> {
        self.document.as_mut().ok_or(BrowserError::NoDocument)
    }

    fn location(&self) -> Option<String> {
        self.location.clone()
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
        self.document.as_ref().map(Document::source)
    }

    async fn cookies(&mut self) -> Result<BTreeMap<String, String>> {
        let text = JavaScriptRunner::string(self.session(), COOKIES_SCRIPT).await?;
        Ok(parse_cookie_string(&text))
    }

    async fn set_cookie(&mut self, cookie: CookieSpec) -> Result<()> {
        JavaScriptRunner::execute(self.session(), &set_cookie_script(&cookie_string(&cookie)))
            .await?;
        Ok(())
    }

    async fn delete_cookie(
        &mut self,
        name: &str,
        domain: Option<&str>,
        path: Option<&str>,
    ) -> Result<()> {
        let mut text = format!(
            "{}=; expires=Thu, 01 Jan 1970 00:00:00 GMT; path={}",
            name,
            path.unwrap_or("/")
        );
        if let Some(domain) = domain {
            text.push_str(&format!("; domain={}", domain));
        }
        JavaScriptRunner::execute(self.session(), &set_cookie_script(&text)).await?;
        Ok(())
    }

    async fn click(&mut self, target: ElementHandle, wait: Wait) -> Result<()> {
        let locator = self.locate(target)?;
        self.flush_mutations().await?;
        self.interact(click_script(&locator), wait).await
    }

    async fn fire_event(
        &mut self,
        target: ElementHandle,
        event: ElementEvent,
        wait: Wait,
    ) -> Result<()> {
        let locator = self.locate(target)?;
        self.flush_mutations().await?;
        debug!("Firing {} on {}", event, locator);
        self.interact(event_script(&locator, &event), wait).await
    }

    async fn submit(
        &mut self,
        form: ElementHandle,
        extra: Vec<(String, FormValue)>,
        wait: Wait,
    ) -> Result<()> {
        let locator = self.locate(form)?;
        self.flush_mutations().await?;
        let extra: Vec<(String, String)> = extra
            .into_iter()
            .map(|(name, value)| {
                let text = match value {
                    FormValue::Text(text) => text,
                    FormValue::File { path, .. } => path,
                };
                (name, text)
            })
            .collect();
        self.interact(submit_script(&locator, &extra), wait).await
    }

    /// Fields whose values are rejected as unknown options are retried
    /// after the page settles, since scripts reacting to earlier fields
    /// may still be adding those options.
    async fn fill(
        &mut self,
        form: ElementHandle,
        values: Vec<(String, FieldInput)>,
        prefix: &str,
        wait: Wait,
    ) -> Result<()> {
        let mut pending = group_pairs(values, prefix)?;
        let path = self.document()?.resolve(form)?.fq_xpath();
        let mut handle = form;
        let mut last_error = None;

        for pass in 1..=FILL_PASSES {
            let rejected = self
                .document_mut()?
                .form_mut(handle)?
                .try_fill(std::mem::take(&mut pending))?;
            self.flush_mutations().await?;
            if rejected.is_empty() {
                return self.finish(wait).await;
            }
            debug!(
                "fill pass {} left {} field(s) unassigned",
                pass,
                rejected.len()
            );

            if let Err(err) = self.wait_for(&WaitFor::Ajax, Some(FILL_SETTLE_MS)).await {
                if !err.is_assertion() {
                    return Err(err);
                }
            }
            self.sync_document().await?;
            handle = self
                .document()?
                .find_path(&path)
                .ok_or_else(|| BrowserError::state(format!("form {} left the page", path)))?
                .handle();

            for (name, input, err) in rejected {
                pending.push((name, input));
                last_error = Some(err);
            }
        }
        Err(last_error.unwrap_or_else(|| BrowserError::state("fill did not complete")))
    }

    async fn is_visible(&mut self, target: ElementHandle) -> Result<bool> {
        let locator = self.locate(target)?;
        let visible = JavaScriptRunner::execute(self.session(), &visibility_script(&locator)).await?;
        Ok(visible.as_bool().unwrap_or(false))
    }

    async fn close(&mut self) -> Result<()> {
        self.document = None;
        self.session.close().await
    }

    async fn settle(&mut self, wait: Wait) -> Result<()> {
        self.flush_mutations().await?;
        self.finish(wait).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::FieldValue;
    use crate::wait::WaitExpression;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::sync::Arc;

    const CHROME_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
        (KHTML, like Gecko) HeadlessChrome/120.0.6099.109 Safari/537.36";

    const PAGE: &str = r#"<html><head><title>remote</title></head><body>
        <form id="f" action="/go">
          <select name="country"><option value="us">US</option></select>
          <select name="city"></select>
          <input type="text" name="q">
          <button id="go" name="go" value="1">Go</button>
        </form>
        <div id="status">idle</div>
        </body></html>"#;

    /// Page state a scripted session serves.
    #[derive(Default)]
    struct PageState {
        url: String,
        markup: String,
        /// Markup swapped in once the next form edit reaches the page.
        after_edit: Option<String>,
        cookies: String,
        predicate: bool,
        closed: bool,
        scripts: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct ScriptedSession(Arc<Mutex<PageState>>);

    impl ScriptedSession {
        fn new(markup: &str) -> Self {
            let session = Self::default();
            {
                let mut state = session.0.lock();
                state.markup = markup.to_string();
                state.predicate = true;
            }
            session
        }

        fn scripts(&self) -> Vec<String> {
            self.0.lock().scripts.clone()
        }
    }

    #[async_trait]
    impl RemoteSession for ScriptedSession {
        async fn navigate(&self, url: &str) -> Result<()> {
            self.0.lock().url = url.to_string();
            Ok(())
        }

        async fn execute_script(&self, script: &str) -> Result<Value> {
            let mut state = self.0.lock();
            state.scripts.push(script.to_string());
            if script == SYNC_DOCUMENT_SCRIPT {
                return Ok(Value::String(state.markup.clone()));
            }
            if script == USER_AGENT_SCRIPT {
                return Ok(Value::String(CHROME_UA.to_string()));
            }
            if script == COOKIES_SCRIPT {
                return Ok(Value::String(state.cookies.clone()));
            }
            if let Some(rest) = script.strip_prefix("document.cookie = '") {
                let pair = rest.split(';').next().unwrap_or("").to_string();
                if rest.contains("1970") {
                    state.cookies.clear();
                } else if state.cookies.is_empty() {
                    state.cookies = pair;
                } else {
                    state.cookies = format!("{}; {}", state.cookies, pair);
                }
                return Ok(Value::Bool(true));
            }
            if script.starts_with("(function (element)") {
                if script.contains("dispatchEvent") {
                    if let Some(next) = state.after_edit.take() {
                        state.markup = next;
                    }
                }
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(state.predicate))
        }

        async fn current_url(&self) -> Result<String> {
            Ok(self.0.lock().url.clone())
        }

        async fn close(&mut self) -> Result<()> {
            self.0.lock().closed = true;
            Ok(())
        }
    }

    async fn opened(session: &ScriptedSession) -> RemoteDriver {
        let mut browser = RemoteDriver::new(Box::new(session.clone()))
            .with_base_url("http://app.test/")
            .unwrap();
        browser.open("/start", Wait::none()).await.unwrap();
        browser
    }

    fn form(browser: &RemoteDriver) -> ElementHandle {
        browser.document().unwrap().form(0).unwrap().handle()
    }

    #[test]
    fn test_parse_user_agent() {
        let ua = parse_user_agent(CHROME_UA);
        assert_eq!(ua.browser, "chrome");
        assert_eq!(ua.platform, "X11");
        assert_eq!(ua.version, "120.0.6099.109");
        assert_eq!(parse_user_agent("curl").browser, "unknown");
    }

    #[tokio::test]
    async fn test_open_syncs_document() {
        let session = ScriptedSession::new(PAGE);
        let browser = opened(&session).await;
        assert_eq!(browser.location().as_deref(), Some("http://app.test/start"));
        assert_eq!(browser.document().unwrap().title().as_deref(), Some("remote"));
        assert_eq!(browser.user_agent().browser, "chrome");
        assert!(browser.capabilities().contains(Capability::Javascript));
        assert!(browser.status_code().is_none());
    }

    #[tokio::test]
    async fn test_fill_retries_until_options_appear() {
        let session = ScriptedSession::new(PAGE);
        session.0.lock().after_edit = Some(PAGE.replace(
            r#"<select name="city"></select>"#,
            r#"<select name="city"><option value="nyc">NYC</option></select>"#,
        ));
        let mut browser = opened(&session).await;
        let handle = form(&browser);

        browser
            .fill(
                handle,
                vec![
                    ("country".to_string(), FieldInput::from("us")),
                    ("city".to_string(), FieldInput::from("nyc")),
                ],
                "",
                Wait::none(),
            )
            .await
            .unwrap();

        let scripts = session.scripts();
        assert!(scripts.iter().any(|s| s.contains("var wanted = ['us']")));
        assert!(scripts.iter().any(|s| s.contains("var wanted = ['nyc']")));
        assert!(browser.document().unwrap().pending_mutations().is_empty());
    }

    #[tokio::test]
    async fn test_fill_gives_up_after_passes() {
        let session = ScriptedSession::new(PAGE);
        let mut browser = opened(&session).await;
        let handle = form(&browser);
        let err = browser
            .fill(
                handle,
                vec![("city".to_string(), FieldInput::from("paris"))],
                "",
                Wait::none(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::NoSuchOption(ref v) if v == "paris"));
        let syncs = session
            .scripts()
            .iter()
            .filter(|s| s.as_str() == SYNC_DOCUMENT_SCRIPT)
            .count();
        // One sync from open, one per failed pass.
        assert_eq!(syncs, 1 + FILL_PASSES);
    }

    #[tokio::test]
    async fn test_fill_unknown_field_fails_at_once() {
        let session = ScriptedSession::new(PAGE);
        let mut browser = opened(&session).await;
        let handle = form(&browser);
        let err = browser
            .fill(handle, vec![("nope".to_string(), FieldInput::from("x"))], "", Wait::none())
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::NoSuchField(_)));
    }

    #[tokio::test]
    async fn test_click_flushes_edits_first() {
        let session = ScriptedSession::new(PAGE);
        let mut browser = opened(&session).await;
        let handle = form(&browser);
        browser
            .document_mut()
            .unwrap()
            .form_mut(handle)
            .unwrap()
            .set_field("q", "rust")
            .unwrap();
        let button = browser.document().unwrap().lookup("#go").unwrap().one().unwrap().handle();
        browser.click(button, Wait::none()).await.unwrap();

        let scripts = session.scripts();
        let edit = scripts.iter().position(|s| s.contains("element.value = 'rust'")).unwrap();
        let click = scripts.iter().position(|s| s.contains("element.click()")).unwrap();
        assert!(edit < click);
        assert!(matches!(
            browser.click(button, Wait::none()).await,
            Err(BrowserError::StaleElement { .. })
        ));
    }

    #[tokio::test]
    async fn test_events_dispatch_and_resync() {
        let session = ScriptedSession::new(PAGE);
        session.0.lock().after_edit = Some(PAGE.replace(
            r#"<div id="status">idle</div>"#,
            r#"<div id="status">hovered</div>"#,
        ));
        let mut browser = opened(&session).await;
        let status = browser.document().unwrap().lookup("#status").unwrap().one().unwrap().handle();

        browser.mouse_over(status, Wait::none()).await.unwrap();
        let text = browser
            .document()
            .unwrap()
            .lookup("#status")
            .unwrap()
            .one()
            .unwrap()
            .text_content();
        assert_eq!(text, "hovered");
        assert!(matches!(
            browser.mouse_over(status, Wait::none()).await,
            Err(BrowserError::StaleElement { .. })
        ));

        let status = browser.document().unwrap().lookup("#status").unwrap().one().unwrap().handle();
        browser.double_click(status, Wait::none()).await.unwrap();
        let status = browser.document().unwrap().lookup("#status").unwrap().one().unwrap().handle();
        browser.mouse_out(status, Wait::none()).await.unwrap();
        let status = browser.document().unwrap().lookup("#status").unwrap().one().unwrap().handle();
        browser.focus(status, Wait::none()).await.unwrap();
        let status = browser.document().unwrap().lookup("#status").unwrap().one().unwrap().handle();
        browser
            .fire_event(status, ElementEvent::from("blur"), Wait::none())
            .await
            .unwrap();

        let scripts = session.scripts();
        assert!(scripts.iter().any(|s| s.contains("new MouseEvent('mouseover'")));
        assert!(scripts.iter().any(|s| s.contains("new MouseEvent('dblclick'")));
        assert!(scripts.iter().any(|s| s.contains("new MouseEvent('mouseout'")));
        assert!(scripts.iter().any(|s| s.contains("element.focus()")));
        assert!(scripts.iter().any(|s| s.contains("new Event('blur'")));
        let last = scripts.iter().rposition(|s| s.contains("new Event('blur'")).unwrap();
        assert!(scripts[last + 1..].iter().any(|s| s == SYNC_DOCUMENT_SCRIPT));
    }

    #[tokio::test]
    async fn test_wait_timeout_is_an_assertion() {
        let session = ScriptedSession::new(PAGE);
        let mut browser = opened(&session).await;
        session.0.lock().predicate = false;
        let condition = WaitFor::Expression(WaitExpression::new().element_present("#later"));
        let err = browser.wait_for(&condition, Some(120)).await.unwrap_err();
        assert!(err.is_assertion());
        assert!(matches!(err, BrowserError::WaitTimeout { timeout_ms: 120, .. }));

        session.0.lock().predicate = true;
        browser.wait_for(&condition, Some(120)).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_with_wait_polls_before_sync() {
        let session = ScriptedSession::new(PAGE);
        let mut browser = opened(&session).await;
        browser
            .open("/next", Wait::parse("element:#status", Some(500)).unwrap())
            .await
            .unwrap();
        let scripts = session.scripts();
        let poll = scripts
            .iter()
            .rposition(|s| s.contains("document.querySelector('#status')"))
            .unwrap();
        let sync = scripts.iter().rposition(|s| s == SYNC_DOCUMENT_SCRIPT).unwrap();
        assert!(poll < sync);
        assert_eq!(browser.location().as_deref(), Some("http://app.test/next"));
    }

    #[tokio::test]
    async fn test_cookies_through_document_cookie() {
        let session = ScriptedSession::new(PAGE);
        let mut browser = opened(&session).await;
        browser.set_cookie(CookieSpec::new("a", "1")).await.unwrap();
        browser.set_cookie(CookieSpec::new("b", "2")).await.unwrap();
        let cookies = browser.cookies().await.unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies["b"], "2");
        browser.delete_cookie("a", None, None).await.unwrap();
        assert!(browser.cookies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enter_mirrors_keystrokes_and_close() {
        let session = ScriptedSession::new(PAGE);
        let mut browser = opened(&session).await;
        let input = browser.document().unwrap().lookup("input[name=q]").unwrap().one().unwrap().handle();
        browser.enter(input, "hi", Wait::none()).await.unwrap();
        assert!(session.scripts().iter().any(|s| s.contains("KeyboardEvent('keydown'")));
        let form = browser.document().unwrap().form(0).unwrap();
        assert_eq!(form.field("q").unwrap(), FieldValue::Text(String::new()));

        browser.close().await.unwrap();
        assert!(session.0.lock().closed);
        assert!(browser.document().is_err());
    }

    #[test]
    fn test_cookie_strings() {
        let parsed = parse_cookie_string("a=1; b = two ;junk; =x");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["b"], "two");
        let spec = CookieSpec::new("s", "v").with_domain("example.com");
        assert_eq!(cookie_string(&spec), "s=v; path=/; domain=example.com");
    }
}
