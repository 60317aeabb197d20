pub mod config;
pub mod error;
pub mod server;
pub mod translate;
pub mod upstream;

pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use server::{build_router, AppState};
pub use upstream::UpstreamClient;
