//! HTTP gateway: chat and health endpoints with bearer auth, rate
//! limiting, and CORS for browser frontends.

mod error;
mod handlers;
mod router;
mod server;
#[cfg(feature = "speech")]
mod voice;

pub use error::GatewayError;
pub use server::GatewayServer;
#[cfg(feature = "speech")]
pub use voice::VoiceServices;
