//! Browser and API-client handles a test suite declares up front and a
//! test runner activates once configuration is known.

use crate::apiclient::{ApiClient, ApiClientManager};
use crate::core::{BrowserManager, Configuration, Driver, RunnerOptions, Tool};
use crate::errors::{BrowserError, Result};
use crate::lifecycle::registry;
use crate::lifecycle::target::{resolve, Declaration, Target};
use tracing::{info, warn};

enum BrowserState {
    Unconfigured,
    Configured(Box<dyn BrowserManager>),
    Active {
        manager: Box<dyn BrowserManager>,
        driver: Box<dyn Driver>,
    },
}

/// A browser handle that exists before its backend is known.
///
/// `configure` picks the manager, `activate` creates the driver and
/// `deactivate` releases it. Reaching for the driver in any other state is
/// an error naming the handle.
pub struct WebBrowser {
    name: String,
    state: BrowserState,
}

impl std::fmt::Debug for WebBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            BrowserState::Unconfigured => "unconfigured".to_string(),
            BrowserState::Configured(manager) => format!("configured ({})", manager.backend()),
            BrowserState::Active { manager, .. } => format!("active ({})", manager.backend()),
        };
        f.debug_struct("WebBrowser")
            .field("name", &self.name)
            .field("state", &state)
            .finish()
    }
}

impl WebBrowser {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: BrowserState::Unconfigured,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self.state, BrowserState::Unconfigured)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, BrowserState::Active { .. })
    }

    /// Resolves the backend for `declaration` and builds its manager.
    pub fn configure(
        &mut self,
        config: &Configuration,
        declaration: &Declaration,
        options: &RunnerOptions,
    ) -> Result<Target> {
        if declaration.tool != Tool::Browser {
            return Err(BrowserError::state(format!(
                "{} can not be configured from a {} declaration",
                self.name, declaration.tool
            )));
        }
        let target = resolve(config, declaration, options)?;
        let factory = registry::browser_backend(&target.entry_point)?;
        let manager = factory(&target.context(options))?;
        self.configure_with(manager)?;
        Ok(target)
    }

    pub fn configure_with(&mut self, manager: Box<dyn BrowserManager>) -> Result<()> {
        if self.is_active() {
            return Err(BrowserError::state(format!(
                "{} is active; deactivate it before configuring it again",
                self.name
            )));
        }
        info!("Configured {} with the {} backend", self.name, manager.backend());
        self.state = BrowserState::Configured(manager);
        Ok(())
    }

    /// Creates the driver. Activating an active handle returns the
    /// existing driver. A failed creation leaves the handle configured.
    pub async fn activate(&mut self) -> Result<&mut dyn Driver> {
        self.state = match std::mem::replace(&mut self.state, BrowserState::Unconfigured) {
            BrowserState::Configured(mut manager) => match manager.create().await {
                Ok(driver) => {
                    info!("Activated {} ({})", self.name, manager.backend());
                    BrowserState::Active { manager, driver }
                }
                Err(err) => {
                    if let Err(cleanup) = manager.destroy().await {
                        warn!("Cleaning up {} failed: {}", self.name, cleanup);
                    }
                    self.state = BrowserState::Configured(manager);
                    return Err(err);
                }
            },
            other => other,
        };
        self.driver_mut()
    }

    /// Closes the driver and tears the backend down. The handle stays
    /// configured and can be activated again.
    pub async fn deactivate(&mut self) -> Result<()> {
        let (mut manager, mut driver) =
            match std::mem::replace(&mut self.state, BrowserState::Unconfigured) {
                BrowserState::Active { manager, driver } => (manager, driver),
                other => {
                    self.state = other;
                    return Ok(());
                }
            };
        let closed = driver.close().await;
        let destroyed = manager.destroy().await;
        info!("Deactivated {} ({})", self.name, manager.backend());
        self.state = BrowserState::Configured(manager);
        closed.and(destroyed)
    }

    pub fn driver(&self) -> Result<&dyn Driver> {
        match &self.state {
            BrowserState::Active { driver, .. } => Ok(driver.as_ref()),
            BrowserState::Configured(_) => Err(BrowserError::NotActivated(self.name.clone())),
            BrowserState::Unconfigured => Err(BrowserError::NotConfigured(self.name.clone())),
        }
    }

    pub fn driver_mut(&mut self) -> Result<&mut dyn Driver> {
        match &mut self.state {
            BrowserState::Active { driver, .. } => Ok(driver.as_mut()),
            BrowserState::Configured(_) => Err(BrowserError::NotActivated(self.name.clone())),
            BrowserState::Unconfigured => Err(BrowserError::NotConfigured(self.name.clone())),
        }
    }
}

enum ApiClientState {
    Unconfigured,
    Configured(Box<dyn ApiClientManager>),
    Active {
        manager: Box<dyn ApiClientManager>,
        client: ApiClient,
    },
}

/// The API-client counterpart of [`WebBrowser`]. Activation needs no I/O
/// and is synchronous.
pub struct ApiClientHandle {
    name: String,
    state: ApiClientState,
}

impl std::fmt::Debug for ApiClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClientHandle")
            .field("name", &self.name)
            .field("active", &matches!(self.state, ApiClientState::Active { .. }))
            .finish()
    }
}

impl ApiClientHandle {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: ApiClientState::Unconfigured,
        }
    }

    pub fn configure(
        &mut self,
        config: &Configuration,
        declaration: &Declaration,
        options: &RunnerOptions,
    ) -> Result<Target> {
        if declaration.tool != Tool::ApiClient {
            return Err(BrowserError::state(format!(
                "{} can not be configured from a {} declaration",
                self.name, declaration.tool
            )));
        }
        let target = resolve(config, declaration, options)?;
        let factory = registry::apiclient_backend(&target.entry_point)?;
        self.configure_with(factory(&target.context(options))?)?;
        Ok(target)
    }

    pub fn configure_with(&mut self, manager: Box<dyn ApiClientManager>) -> Result<()> {
        if matches!(self.state, ApiClientState::Active { .. }) {
            return Err(BrowserError::state(format!(
                "{} is active; deactivate it before configuring it again",
                self.name
            )));
        }
        self.state = ApiClientState::Configured(manager);
        Ok(())
    }

    pub fn activate(&mut self) -> Result<&ApiClient> {
        if let ApiClientState::Configured(manager) = &mut self.state {
            let client = match manager.create() {
                Ok(client) => client,
                Err(err) => {
                    if let Err(cleanup) = manager.destroy() {
                        warn!("Cleaning up {} failed: {}", self.name, cleanup);
                    }
                    return Err(err);
                }
            };
            if let ApiClientState::Configured(manager) =
                std::mem::replace(&mut self.state, ApiClientState::Unconfigured)
            {
                info!("Activated {} ({})", self.name, manager.backend());
                self.state = ApiClientState::Active { manager, client };
            }
        }
        self.client()
    }

    pub fn deactivate(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, ApiClientState::Unconfigured) {
            ApiClientState::Active { mut manager, .. } => {
                let destroyed = manager.destroy();
                self.state = ApiClientState::Configured(manager);
                destroyed
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }

    pub fn client(&self) -> Result<&ApiClient> {
        match &self.state {
            ApiClientState::Active { client, .. } => Ok(client),
            ApiClientState::Configured(_) => Err(BrowserError::NotActivated(self.name.clone())),
            ApiClientState::Unconfigured => Err(BrowserError::NotConfigured(self.name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::managers::ZeroManager;
    use crate::testing::FIXTURE_ENTRY_POINT;
    use crate::wait::Wait;
    use async_trait::async_trait;

    /// Fails to create, and counts teardown calls.
    struct FailingManager {
        destroyed: usize,
    }

    #[async_trait(?Send)]
    impl BrowserManager for FailingManager {
        fn backend(&self) -> &str {
            "failing"
        }

        async fn create(&mut self) -> Result<Box<dyn Driver>> {
            Err(BrowserError::LaunchFailed("no browser".to_string()))
        }

        async fn destroy(&mut self) -> Result<()> {
            self.destroyed += 1;
            Ok(())
        }
    }

    fn fixture_config() -> Configuration {
        Configuration::load_str(
            &format!(
                "[\"default+browser.in-process\"]\nserver-entry-point = \"{0}\"\n\
                 [\"default+apiclient.in-process\"]\nserver-entry-point = \"{0}\"\n\
                 [default-targets]\n\"default+apiclient\" = \"in-process\"\n",
                FIXTURE_ENTRY_POINT
            ),
            "fixture.toml",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_browser_phases() {
        let mut browser = WebBrowser::new("browser");
        assert!(matches!(browser.driver(), Err(BrowserError::NotConfigured(ref n)) if n == "browser"));
        browser.deactivate().await.unwrap();

        browser.configure_with(Box::new(ZeroManager::new())).unwrap();
        assert!(matches!(browser.driver(), Err(BrowserError::NotActivated(_))));

        let driver = browser.activate().await.unwrap();
        driver.open("/", Wait::none()).await.unwrap();
        assert_eq!(browser.driver().unwrap().name(), "zero");
        assert!(browser.configure_with(Box::new(ZeroManager::new())).is_err());

        browser.deactivate().await.unwrap();
        assert!(!browser.is_active());
        assert!(browser.is_configured());
        assert!(matches!(browser.driver_mut(), Err(BrowserError::NotActivated(_))));
        browser.deactivate().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_activation_stays_configured() {
        let mut browser = WebBrowser::new("browser");
        browser
            .configure_with(Box::new(FailingManager { destroyed: 0 }))
            .unwrap();
        assert!(matches!(browser.activate().await, Err(BrowserError::LaunchFailed(_))));
        assert!(browser.is_configured());
        assert!(!browser.is_active());
        assert!(format!("{:?}", browser).contains("configured (failing)"));
    }

    #[tokio::test]
    async fn test_configure_from_configuration() {
        let mut browser = WebBrowser::new("browser");
        let declaration = Declaration::new(Tool::Browser).with_default_target("in-process");
        let target = browser
            .configure(&fixture_config(), &declaration, &RunnerOptions::default())
            .unwrap();
        assert_eq!(target.backend, "in-process");

        let driver = browser.activate().await.unwrap();
        driver.open("/seq/a", Wait::none()).await.unwrap();
        assert_eq!(driver.status_code(), Some(200));
        browser.deactivate().await.unwrap();
    }

    #[test]
    fn test_configure_rejects_other_tools() {
        let mut browser = WebBrowser::new("browser");
        let declaration = Declaration::new(Tool::ApiClient);
        assert!(browser
            .configure(&fixture_config(), &declaration, &RunnerOptions::default())
            .is_err());
        assert!(!browser.is_configured());
    }

    #[tokio::test]
    async fn test_api_client_handle() {
        let mut handle = ApiClientHandle::new("api");
        assert!(matches!(handle.client(), Err(BrowserError::NotConfigured(_))));
        handle
            .configure(
                &fixture_config(),
                &Declaration::new(Tool::ApiClient),
                &RunnerOptions::default(),
            )
            .unwrap();
        assert!(matches!(handle.client(), Err(BrowserError::NotActivated(_))));

        let client = handle.activate().unwrap().clone();
        assert!(client.get("/api/json").await.unwrap().is_json());
        handle.deactivate().unwrap();
        assert!(matches!(handle.client(), Err(BrowserError::NotActivated(_))));
        handle.deactivate().unwrap();
    }
}
