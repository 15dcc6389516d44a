pub mod browser;
pub mod config;
pub mod session;

pub use browser::{BrowserManager, Driver};
pub use config::{flag, setting, Configuration, RunnerOptions, Section, Tool};
pub use session::RemoteSession;
