#[cfg(feature = "chrome")]
pub mod chrome;
pub mod cookies;
pub mod http;
pub mod inprocess;
pub mod remote;
pub mod zero;

#[cfg(feature = "chrome")]
pub use chrome::{ChromeOptions, ChromeSession};
pub use cookies::{Cookie, CookieJar};
pub use http::{Application, HttpRequest, HttpResponse};
pub use inprocess::InProcessDriver;
pub use remote::RemoteDriver;
pub use zero::ZeroDriver;
