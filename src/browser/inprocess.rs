use crate::browser::cookies::CookieJar;
use crate::browser::http::{form_request, join_url, Application, HttpRequest, HttpResponse};
use crate::core::Driver;
use crate::dom::{Document, ElementHandle, ElementKind, FormValue, TagTable};
use crate::errors::{BrowserError, Result};
use crate::types::{Capabilities, Capability, CookieSpec, UserAgent};
use crate::wait::{Wait, WaitFor};
use async_trait::async_trait;
use axum::Router;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost/";

pub const MAX_REDIRECTS: usize = 20;

/// What clicking an element does without a script engine.
enum ClickAction {
    Follow(String),
    Toggle(bool),
    Submit(ElementHandle, Vec<(String, FormValue)>),
    Nothing,
}

/// A browser without a script engine. Requests run straight through an
/// application's router, or over the network to a running server.
///
/// The document is always current: there is no script engine to change it
/// after the response arrives, so waits are satisfied immediately.
pub struct InProcessDriver {
    name: &'static str,
    app: Application,
    base_url: Url,
    tags: TagTable,
    capabilities: Capabilities,
    user_agent: UserAgent,
    jar: CookieJar,
    referrer: Option<Url>,
    location: Option<Url>,
    last_response: Option<HttpResponse>,
    response_text: Option<String>,
    document: Option<Document>,
}

impl std::fmt::Debug for InProcessDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessDriver")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .field("location", &self.location.as_ref().map(Url::as_str))
            .field("cookies", &self.jar.len())
            .finish()
    }
}

impl InProcessDriver {
    pub fn new(router: Router) -> Result<Self> {
        Self::with_application(Application::new(router), DEFAULT_BASE_URL)
    }

    /// Browses the server at `base_url` over real sockets.
    pub fn network(base_url: &str) -> Result<Self> {
        Self::with_application(Application::network()?, base_url)
    }

    pub fn with_application(app: Application, base_url: &str) -> Result<Self> {
        let name = if app.is_in_process() { "in-process" } else { "network" };
        let capabilities: Capabilities = [
            Capability::Cookies,
            Capability::Headers,
            Capability::Status,
            Capability::Upload,
        ]
        .into_iter()
        .chain(app.is_in_process().then_some(Capability::InProcess))
        .collect();
        Ok(Self {
            name,
            app,
            base_url: Url::parse(base_url)?,
            tags: TagTable::base().with("a", ElementKind::Link),
            capabilities,
            user_agent: UserAgent::new(name, "rust", "1.0"),
            jar: CookieJar::new(),
            referrer: None,
            location: None,
            last_response: None,
            response_text: None,
            document: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn cookie_jar(&self) -> &CookieJar {
        &self.jar
    }

    /// Resolves a link target against the current page, or the base URL
    /// before anything was opened.
    fn resolve_url(&self, target: &str, from_page: bool) -> Result<Url> {
        let base = match (&self.referrer, from_page) {
            (Some(page), true) => page,
            _ => &self.base_url,
        };
        join_url(base, target)
    }

    fn next_hop(origin: &Url, hops: &mut usize, url: Url) -> Result<HttpRequest> {
        *hops += 1;
        if *hops > MAX_REDIRECTS {
            return Err(BrowserError::TooManyRedirects {
                url: origin.to_string(),
                hops: *hops - 1,
            });
        }
        debug!("Redirect to {}", url);
        Ok(HttpRequest::get(url))
    }

    /// Sends `request` and follows redirects and refresh markers. The first
    /// request carries `referer`; each later hop is referred by the URL that
    /// redirected to it.
    async fn navigate(&mut self, request: HttpRequest, referer: Option<Url>) -> Result<()> {
        let started = Instant::now();
        let origin = request.url.clone();
        let mut request = request;
        let mut referer = referer;
        let mut hops = 0;

        loop {
            if let Some(referer) = &referer {
                request = request.header("Referer", referer.as_str());
            }
            if let Some(cookies) = self.jar.header_for(&request.url) {
                request = request.header("Cookie", &cookies);
            }

            let response = self.app.send(request).await?;
            self.jar
                .store_response(&response.url, response.header_all("set-cookie"));

            if let Some(target) = response.redirect_target() {
                let url = join_url(&response.url, target)?;
                request = Self::next_hop(&origin, &mut hops, url)?;
                referer = Some(response.url.clone());
                continue;
            }

            let text = response.text();
            let document = Document::parse(&text, &self.tags);
            if let Some(target) = meta_refresh(&document) {
                let url = join_url(&response.url, &target)?;
                request = Self::next_hop(&origin, &mut hops, url)?;
                referer = Some(response.url.clone());
                continue;
            }

            self.location = Some(response.url.clone());
            self.referrer = Some(response.url.clone());
            self.response_text = Some(text);
            self.document = Some(document);
            self.last_response = Some(response);
            info!(
                "Fetched {} in {:.3}sec",
                origin,
                started.elapsed().as_secs_f64()
            );
            return Ok(());
        }
    }

    fn click_action(&self, target: ElementHandle) -> Result<ClickAction> {
        let el = self.document()?.resolve(target)?;
        let submit_pair = |default: &str| -> Vec<(String, FormValue)> {
            match el.name() {
                Some(name) => vec![(
                    name.to_string(),
                    FormValue::from(el.attr("value").unwrap_or(default)),
                )],
                None => Vec::new(),
            }
        };

        let action = match el.kind() {
            ElementKind::Link => match el.attr("href") {
                Some(href) => ClickAction::Follow(href.to_string()),
                None => ClickAction::Nothing,
            },
            ElementKind::Input if el.is_checkable() => ClickAction::Toggle(el.is_checked()),
            ElementKind::Input if matches!(el.input_type().as_str(), "submit" | "image") => {
                match el.enclosing_form() {
                    Some(form) => ClickAction::Submit(form.handle(), submit_pair("Submit")),
                    None => ClickAction::Nothing,
                }
            }
            ElementKind::Button => {
                let kind = el.attr("type").unwrap_or("submit").trim().to_ascii_lowercase();
                match el.enclosing_form() {
                    Some(form) if kind != "button" && kind != "reset" => {
                        ClickAction::Submit(form.handle(), submit_pair(""))
                    }
                    _ => ClickAction::Nothing,
                }
            }
            _ => ClickAction::Nothing,
        };
        Ok(action)
    }
}

/// Target of a `<meta http-equiv="refresh" content="0;url=...">` marker.
fn meta_refresh(document: &Document) -> Option<String> {
    let metas = document.select("meta[http-equiv]").ok()?;
    metas.iter().find_map(|meta| {
        if !meta.attr("http-equiv")?.trim().eq_ignore_ascii_case("refresh") {
            return None;
        }
        let (_, target) = meta.attr("content")?.split_once(';')?;
        let (key, target) = target.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("url") {
            return None;
        }
        let target = target.trim().trim_matches(|c| c == '\'' || c == '"');
        if target.is_empty() {
            None
        } else {
            Some(target.to_string())
        }
    })
}

#[async_trait(?Send)]
impl Driver for InProcessDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn user_agent(&self) -> &UserAgent {
        &self.user_agent
    }

    async fn open(&mut self, url: &str, _wait: Wait) -> Result<()> {
        let url = self.resolve_url(url, false)?;
        self.navigate(HttpRequest::get(url), None).await
    }

    async fn reset(&mut self) -> Result<()> {
        self.jar.clear();
        Ok(())
    }

    async fn sync_document(&mut self) -> Result<()> {
        Ok(())
    }

    async fn wait_for(&mut self, condition: &WaitFor, _timeout_ms: Option<u64>) -> Result<()> {
        debug!("in-process browser treats wait for {} as satisfied", condition);
        Ok(())
    }

    fn document(&self) -> Result<&Document> {
        self.document.as_ref().ok_or(BrowserError::NoDocument)
    }

    fn document_mut(&mut self) -> Result<&mut Document> {
        self.document.as_mut().ok_or(BrowserError::NoDocument)
    }

    fn location(&self) -> Option<String> {
        self.location.as_ref().map(Url::to_string)
    }

    fn status_code(&self) -> Option<u16> {
        self.last_response.as_ref().map(|r| r.status)
    }

    fn status(&self) -> Option<String> {
        self.last_response.as_ref().map(HttpResponse::status_line)
    }

    fn headers(&self) -> &[(String, String)] {
        self.last_response
            .as_ref()
            .map(|r| r.headers.as_slice())
            .unwrap_or(&[])
    }

    fn response(&self) -> Option<&str> {
        self.response_text.as_deref()
    }

    async fn cookies(&mut self) -> Result<BTreeMap<String, String>> {
        Ok(match &self.location {
            Some(url) => self.jar.visible(url),
            None => BTreeMap::new(),
        })
    }

    async fn set_cookie(&mut self, cookie: CookieSpec) -> Result<()> {
        let url = self.location.clone().unwrap_or_else(|| self.base_url.clone());
        self.jar.set(&cookie, &url);
        Ok(())
    }

    async fn delete_cookie(
        &mut self,
        name: &str,
        domain: Option<&str>,
        path: Option<&str>,
    ) -> Result<()> {
        let removed = self.jar.remove(name, domain, path);
        debug!("Deleted {} cookie(s) named {}", removed, name);
        Ok(())
    }

    async fn click(&mut self, target: ElementHandle, wait: Wait) -> Result<()> {
        match self.click_action(target)? {
            ClickAction::Follow(href) => {
                self.document_mut()?.take_mutations();
                let url = self.resolve_url(&href, true)?;
                let referer = self.referrer.clone();
                self.navigate(HttpRequest::get(url), referer).await
            }
            ClickAction::Toggle(checked) => {
                self.document_mut()?
                    .control_mut(target)?
                    .set_checked(!checked)?;
                self.settle(wait).await
            }
            ClickAction::Submit(form, extra) => self.submit(form, extra, wait).await,
            ClickAction::Nothing => Ok(()),
        }
    }

    async fn submit(
        &mut self,
        form: ElementHandle,
        extra: Vec<(String, FormValue)>,
        _wait: Wait,
    ) -> Result<()> {
        let submission = {
            let doc = self.document()?;
            let form = doc
                .resolve(form)?
                .as_form()
                .ok_or_else(|| BrowserError::state("only forms can be submitted"))?;
            form.submission(self.location.as_ref().map(Url::as_str), extra)
        };
        self.document_mut()?.take_mutations();

        let url = self.resolve_url(&submission.action, true)?;
        let request = form_request(
            &submission.method,
            url,
            &submission.enctype,
            &submission.values,
        )
        .await?;
        let referer = self.referrer.clone();
        self.navigate(request, referer).await
    }
}
