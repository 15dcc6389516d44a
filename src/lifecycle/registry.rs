//! Process-wide table of backend managers and in-process applications,
//! looked up by qualified name.

use crate::apiclient::ApiClientManager;
use crate::core::{BrowserManager, RunnerOptions, Section, Tool};
use crate::errors::{BrowserError, Result};
use crate::lifecycle::managers::{
    InProcessApiClientManager, InProcessManager, NetworkManager, RemoteManager, ZeroManager,
};
use axum::Router;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Everything a manager factory is given.
#[derive(Debug, Clone)]
pub struct BackendContext {
    pub backend: String,
    pub section: Section,
    pub options: RunnerOptions,
}

pub type BrowserFactory =
    Arc<dyn Fn(&BackendContext) -> Result<Box<dyn BrowserManager>> + Send + Sync>;

pub type ApiClientFactory =
    Arc<dyn Fn(&BackendContext) -> Result<Box<dyn ApiClientManager>> + Send + Sync>;

pub type AppFactory = Arc<dyn Fn() -> Router + Send + Sync>;

/// `fieldtest::<tool>::<backend>`, the name built-in backends register
/// under.
pub fn qualified_name(tool: Tool, backend: &str) -> String {
    format!("fieldtest::{}::{}", tool, backend)
}

#[derive(Default)]
struct Registry {
    browsers: HashMap<String, BrowserFactory>,
    apiclients: HashMap<String, ApiClientFactory>,
    apps: HashMap<String, AppFactory>,
}

impl Registry {
    fn builtin() -> Self {
        let mut registry = Self::default();
        let browser = |name: &str| qualified_name(Tool::Browser, name);
        registry.browsers.insert(
            browser("zero"),
            Arc::new(|_: &BackendContext| Ok(Box::new(ZeroManager::new()) as Box<dyn BrowserManager>)),
        );
        registry.browsers.insert(
            browser("in-process"),
            Arc::new(|ctx: &BackendContext| {
                Ok(Box::new(InProcessManager::from_context(ctx)?) as Box<dyn BrowserManager>)
            }),
        );
        registry.browsers.insert(
            browser("remote"),
            Arc::new(|ctx: &BackendContext| {
                Ok(Box::new(RemoteManager::from_context(ctx)?) as Box<dyn BrowserManager>)
            }),
        );
        registry.browsers.insert(
            browser("network"),
            Arc::new(|ctx: &BackendContext| {
                Ok(Box::new(NetworkManager::from_context(ctx)?) as Box<dyn BrowserManager>)
            }),
        );
        registry.apiclients.insert(
            qualified_name(Tool::ApiClient, "in-process"),
            Arc::new(|ctx: &BackendContext| {
                Ok(Box::new(InProcessApiClientManager::from_context(ctx)?)
                    as Box<dyn ApiClientManager>)
            }),
        );
        #[cfg(any(test, feature = "testing"))]
        registry.apps.insert(
            crate::testing::FIXTURE_ENTRY_POINT.to_string(),
            Arc::new(crate::testing::fixture_app),
        );
        registry
    }
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Registry::builtin()))
}

/// Sets up the registry with the built-in backends. Hosts call this once
/// before registering their own entries; later calls do nothing.
pub fn init() {
    let registry = registry().read();
    debug!(
        "Backend registry holds {} browser, {} apiclient and {} application entries",
        registry.browsers.len(),
        registry.apiclients.len(),
        registry.apps.len()
    );
}

pub fn register_browser_backend<F>(name: &str, factory: F)
where
    F: Fn(&BackendContext) -> Result<Box<dyn BrowserManager>> + Send + Sync + 'static,
{
    registry()
        .write()
        .browsers
        .insert(name.to_string(), Arc::new(factory));
}

pub fn register_apiclient_backend<F>(name: &str, factory: F)
where
    F: Fn(&BackendContext) -> Result<Box<dyn ApiClientManager>> + Send + Sync + 'static,
{
    registry()
        .write()
        .apiclients
        .insert(name.to_string(), Arc::new(factory));
}

/// Makes an application available to `server-entry-point` settings.
pub fn register_app<F>(name: &str, factory: F)
where
    F: Fn() -> Router + Send + Sync + 'static,
{
    registry()
        .write()
        .apps
        .insert(name.to_string(), Arc::new(factory));
}

pub fn browser_backend(name: &str) -> Result<BrowserFactory> {
    registry()
        .read()
        .browsers
        .get(name)
        .cloned()
        .ok_or_else(|| BrowserError::UnknownEntryPoint(name.to_string()))
}

pub fn apiclient_backend(name: &str) -> Result<ApiClientFactory> {
    registry()
        .read()
        .apiclients
        .get(name)
        .cloned()
        .ok_or_else(|| BrowserError::UnknownEntryPoint(name.to_string()))
}

/// Builds the application registered under `name`.
pub fn app(name: &str) -> Result<Router> {
    let factory = registry()
        .read()
        .apps
        .get(name)
        .cloned()
        .ok_or_else(|| BrowserError::UnknownEntryPoint(name.to_string()))?;
    Ok(factory())
}
