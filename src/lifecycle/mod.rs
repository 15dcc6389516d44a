pub mod handle;
pub mod managers;
pub mod process;
pub mod registry;
pub mod target;

pub use handle::{ApiClientHandle, WebBrowser};
pub use managers::{
    InProcessApiClientManager, InProcessManager, NetworkManager, RemoteManager, ZeroManager,
};
pub use process::ServerProcess;
pub use registry::{
    init, register_apiclient_backend, register_app, register_browser_backend, BackendContext,
};
pub use target::{resolve, Declaration, Target};
