use crate::apiclient::{ApiClient, ApiClientManager};
use crate::browser::http::Application;
use crate::browser::inprocess::DEFAULT_BASE_URL;
use crate::browser::remote::DEFAULT_TIMEOUT_MS;
use crate::browser::{InProcessDriver, RemoteDriver, ZeroDriver};
use crate::core::{flag, setting, BrowserManager, Driver, RemoteSession};
use crate::errors::{BrowserError, Result};
use crate::lifecycle::process::ServerProcess;
use crate::lifecycle::registry::{self, BackendContext};
use async_trait::async_trait;
use tracing::{debug, info};

fn required(ctx: &BackendContext, key: &str) -> Result<String> {
    setting(&ctx.options, &ctx.section, key).ok_or_else(|| BrowserError::MissingConfigKey {
        section: ctx.backend.clone(),
        key: key.to_string(),
    })
}

/// The null browser.
#[derive(Debug, Default)]
pub struct ZeroManager;

impl ZeroManager {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl BrowserManager for ZeroManager {
    fn backend(&self) -> &str {
        "zero"
    }

    async fn create(&mut self) -> Result<Box<dyn Driver>> {
        debug!("Creating zero browser");
        Ok(Box::new(ZeroDriver::new()))
    }

    async fn destroy(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-process browsers over an application registered under
/// `server-entry-point`.
#[derive(Debug, Clone)]
pub struct InProcessManager {
    entry_point: String,
    base_url: String,
}

impl InProcessManager {
    pub fn from_context(ctx: &BackendContext) -> Result<Self> {
        Ok(Self {
            entry_point: required(ctx, "server-entry-point")?,
            base_url: setting(&ctx.options, &ctx.section, "base_url")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

#[async_trait(?Send)]
impl BrowserManager for InProcessManager {
    fn backend(&self) -> &str {
        "in-process"
    }

    async fn create(&mut self) -> Result<Box<dyn Driver>> {
        let app = Application::new(registry::app(&self.entry_point)?);
        info!(
            "Creating in-process browser for {} at {}",
            self.entry_point, self.base_url
        );
        Ok(Box::new(InProcessDriver::with_application(
            app,
            &self.base_url,
        )?))
    }

    async fn destroy(&mut self) -> Result<()> {
        debug!("Destroying in-process browser for {}", self.entry_point);
        Ok(())
    }
}

/// The server under test behind `cmd`, started once and stopped on destroy.
#[derive(Debug)]
struct ManagedServer {
    command: Option<String>,
    ping_address: Option<String>,
    without_server: bool,
    process: Option<ServerProcess>,
}

impl ManagedServer {
    fn from_context(ctx: &BackendContext) -> Self {
        let get = |key: &str| setting(&ctx.options, &ctx.section, key);
        Self {
            command: get("cmd"),
            ping_address: get("ping-address"),
            without_server: flag(&ctx.options, &ctx.section, "without_server"),
            process: None,
        }
    }

    fn is_running(&mut self) -> bool {
        self.process.as_mut().map(ServerProcess::is_running).unwrap_or(false)
    }

    async fn start(&mut self) -> Result<()> {
        let command = match &self.command {
            Some(command) if self.process.is_none() => command,
            _ => return Ok(()),
        };
        if self.without_server {
            info!("Not starting {:?}: running without server", command);
            return Ok(());
        }
        let process = ServerProcess::start(command, self.ping_address.as_deref()).await?;
        self.process = Some(process);
        Ok(())
    }

    async fn stop(&mut self, server_url: &str) -> Result<()> {
        if let Some(mut process) = self.process.take() {
            info!("Stopping server for {}", server_url);
            process.stop().await?;
        }
        Ok(())
    }
}

/// Remote browsers, optionally with a server under test started first.
#[derive(Debug)]
pub struct RemoteManager {
    server_url: String,
    debugging_url: Option<String>,
    headless: bool,
    timeout_ms: u64,
    server: ManagedServer,
}

impl RemoteManager {
    pub fn from_context(ctx: &BackendContext) -> Result<Self> {
        let get = |key: &str| setting(&ctx.options, &ctx.section, key);
        let timeout_ms = match get("timeout") {
            Some(text) => text.trim().parse().map_err(|_| {
                BrowserError::invalid_value("timeout", format!("{:?} is not milliseconds", text))
            })?,
            None => DEFAULT_TIMEOUT_MS,
        };
        Ok(Self {
            server_url: required(ctx, "server_url")?,
            debugging_url: get("remote-debugging-url"),
            headless: get("headless").is_none() || flag(&ctx.options, &ctx.section, "headless"),
            timeout_ms,
            server: ManagedServer::from_context(ctx),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn is_headless(&self) -> bool {
        self.headless
    }

    #[cfg(feature = "chrome")]
    fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        use crate::browser::{ChromeOptions, ChromeSession};

        let options = ChromeOptions {
            headless: self.headless,
            debugging_url: self.debugging_url.clone(),
            ..ChromeOptions::default()
        };
        Ok(Box::new(ChromeSession::start(&options)?))
    }

    #[cfg(not(feature = "chrome"))]
    fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        Err(BrowserError::Unsupported {
            backend: "remote".to_string(),
            operation: format!(
                "connecting to {:?} without the chrome feature",
                self.debugging_url.as_deref().unwrap_or("a local browser")
            ),
        })
    }
}

#[async_trait(?Send)]
impl BrowserManager for RemoteManager {
    fn backend(&self) -> &str {
        "remote"
    }

    async fn create(&mut self) -> Result<Box<dyn Driver>> {
        self.server.start().await?;
        let session = self.connect()?;
        info!("Creating remote browser for {}", self.server_url);
        Ok(Box::new(
            RemoteDriver::new(session)
                .with_base_url(&self.server_url)?
                .with_default_timeout(self.timeout_ms),
        ))
    }

    async fn destroy(&mut self) -> Result<()> {
        self.server.stop(&self.server_url).await
    }
}

/// Browsers without a script engine that talk to a running server over
/// the network, starting it first when `cmd` is configured.
#[derive(Debug)]
pub struct NetworkManager {
    server_url: String,
    server: ManagedServer,
}

impl NetworkManager {
    pub fn from_context(ctx: &BackendContext) -> Result<Self> {
        Ok(Self {
            server_url: required(ctx, "server_url")?,
            server: ManagedServer::from_context(ctx),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

#[async_trait(?Send)]
impl BrowserManager for NetworkManager {
    fn backend(&self) -> &str {
        "network"
    }

    async fn create(&mut self) -> Result<Box<dyn Driver>> {
        self.server.start().await?;
        info!("Creating network browser for {}", self.server_url);
        Ok(Box::new(InProcessDriver::network(&self.server_url)?))
    }

    async fn destroy(&mut self) -> Result<()> {
        self.server.stop(&self.server_url).await
    }
}

/// In-process API clients over an application registered under
/// `server-entry-point`.
#[derive(Debug, Clone)]
pub struct InProcessApiClientManager {
    entry_point: String,
    base_url: String,
}

impl InProcessApiClientManager {
    pub fn from_context(ctx: &BackendContext) -> Result<Self> {
        Ok(Self {
            entry_point: required(ctx, "server-entry-point")?,
            base_url: setting(&ctx.options, &ctx.section, "base_url")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

impl ApiClientManager for InProcessApiClientManager {
    fn backend(&self) -> &str {
        "in-process"
    }

    fn create(&mut self) -> Result<ApiClient> {
        let app = Application::new(registry::app(&self.entry_point)?);
        info!("Creating in-process API client for {}", self.entry_point);
        ApiClient::with_application(app, &self.base_url)
    }

    fn destroy(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RunnerOptions, Section};
    use crate::testing::FIXTURE_ENTRY_POINT;
    use crate::types::Capability;
    use crate::wait::Wait;

    fn context(pairs: &[(&str, &str)], options: RunnerOptions) -> BackendContext {
        BackendContext {
            backend: "test".to_string(),
            section: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Section>(),
            options,
        }
    }

    #[tokio::test]
    async fn test_zero_manager() {
        let mut manager = ZeroManager::new();
        manager.destroy().await.unwrap();
        let browser = manager.create().await.unwrap();
        assert_eq!(browser.name(), "zero");
        manager.destroy().await.unwrap();
        manager.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn test_in_process_manager_serves_registered_app() {
        let ctx = context(
            &[
                ("server-entry-point", FIXTURE_ENTRY_POINT),
                ("base_url", "http://app.test/"),
            ],
            RunnerOptions::default(),
        );
        let mut manager = InProcessManager::from_context(&ctx).unwrap();
        let mut browser = manager.create().await.unwrap();
        browser.open("/seq/a", Wait::none()).await.unwrap();
        assert_eq!(browser.location().as_deref(), Some("http://app.test/seq/a"));
        assert_eq!(browser.status_code(), Some(200));
        manager.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn test_in_process_manager_errors() {
        let err = InProcessManager::from_context(&context(&[], RunnerOptions::default()))
            .unwrap_err();
        assert!(
            matches!(err, BrowserError::MissingConfigKey { ref key, .. } if key == "server-entry-point")
        );

        let ctx = context(&[("server_entry_point", "no.such.app")], RunnerOptions::default());
        let mut manager = InProcessManager::from_context(&ctx).unwrap();
        assert_eq!(manager.entry_point(), "no.such.app");
        assert!(matches!(
            manager.create().await,
            Err(BrowserError::UnknownEntryPoint(_))
        ));
        manager.destroy().await.unwrap();
    }

    #[test]
    fn test_remote_manager_settings() {
        let options = RunnerOptions::default().with_server_url("http://override.test/");
        let ctx = context(
            &[
                ("server_url", "http://configured.test/"),
                ("timeout", "5000"),
                ("headless", "false"),
            ],
            options,
        );
        let manager = RemoteManager::from_context(&ctx).unwrap();
        assert_eq!(manager.server_url(), "http://override.test/");
        assert_eq!(manager.timeout_ms(), 5000);
        assert!(!manager.is_headless());

        let manager = RemoteManager::from_context(&context(
            &[("server_url", "http://configured.test/")],
            RunnerOptions::default(),
        ))
        .unwrap();
        assert!(manager.is_headless());
        assert_eq!(manager.timeout_ms(), DEFAULT_TIMEOUT_MS);

        let err = RemoteManager::from_context(&context(
            &[("server_url", "http://x.test/"), ("timeout", "soon")],
            RunnerOptions::default(),
        ))
        .unwrap_err();
        assert!(matches!(err, BrowserError::InvalidValue { ref field, .. } if field == "timeout"));
    }

    #[tokio::test]
    async fn test_remote_destroy_without_create() {
        let ctx = context(&[("server_url", "http://x.test/")], RunnerOptions::default());
        let mut manager = RemoteManager::from_context(&ctx).unwrap();
        manager.destroy().await.unwrap();
        manager.destroy().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_remote_manager_stops_its_server() {
        let ctx = context(
            &[("server_url", "http://x.test/"), ("cmd", "sleep 30")],
            RunnerOptions::default(),
        );
        let mut manager = RemoteManager::from_context(&ctx).unwrap();
        manager.server.start().await.unwrap();
        assert!(manager.server.is_running());
        manager.destroy().await.unwrap();
        assert!(manager.server.process.is_none());
        manager.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn test_without_server_skips_command() {
        let mut options = RunnerOptions::default();
        options.without_server = true;
        let ctx = context(
            &[("server_url", "http://x.test/"), ("cmd", "no-such-binary --serve")],
            options,
        );
        let mut manager = RemoteManager::from_context(&ctx).unwrap();
        manager.server.start().await.unwrap();
        assert!(manager.server.process.is_none());

        let mut manager = NetworkManager::from_context(&ctx).unwrap();
        manager.server.start().await.unwrap();
        assert!(!manager.server.is_running());
    }

    #[tokio::test]
    async fn test_network_manager_browses_a_served_app() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, crate::testing::fixture_app()).await });

        let server_url = format!("http://{}/", address);
        let ctx = context(&[("server_url", server_url.as_str())], RunnerOptions::default());
        let mut manager = NetworkManager::from_context(&ctx).unwrap();
        assert_eq!(manager.server_url(), server_url);
        assert_eq!(manager.backend(), "network");

        let mut browser = manager.create().await.unwrap();
        assert_eq!(browser.name(), "network");
        assert!(!browser.capabilities().contains(Capability::InProcess));
        assert!(browser.capabilities().contains(Capability::Cookies));

        browser.open("/seq/a", Wait::none()).await.unwrap();
        assert_eq!(browser.status_code(), Some(200));
        assert_eq!(
            browser.location().as_deref(),
            Some(format!("{}seq/a", server_url).as_str())
        );
        manager.destroy().await.unwrap();
        manager.destroy().await.unwrap();
    }

    #[test]
    fn test_network_manager_needs_server_url() {
        let err = NetworkManager::from_context(&context(&[], RunnerOptions::default()))
            .unwrap_err();
        assert!(matches!(err, BrowserError::MissingConfigKey { ref key, .. } if key == "server_url"));

        let options = RunnerOptions::default().with_server_url("http://override.test/");
        let manager = NetworkManager::from_context(&context(&[], options)).unwrap();
        assert_eq!(manager.server_url(), "http://override.test/");
    }

    #[tokio::test]
    async fn test_api_client_manager() {
        let ctx = context(
            &[("server-entry-point", FIXTURE_ENTRY_POINT)],
            RunnerOptions::default(),
        );
        let mut manager = InProcessApiClientManager::from_context(&ctx).unwrap();
        let client = manager.create().unwrap();
        let response = client.get("/api/json").await.unwrap();
        assert!(response.is_json());
        manager.destroy().unwrap();
    }
}
