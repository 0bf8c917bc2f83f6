use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use maitre_core::ChatService;
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;

#[derive(Clone)]
pub(crate) struct AppState {
    pub chat: Arc<dyn ChatService>,
    #[cfg(feature = "speech")]
    pub speech: Option<Arc<crate::voice::VoiceServices>>,
    pub started_at: Instant,
}

impl AppState {
    pub(crate) fn new(chat: Arc<dyn ChatService>) -> Self {
        Self {
            chat,
            #[cfg(feature = "speech")]
            speech: None,
            started_at: Instant::now(),
        }
    }
}

pub struct GatewayServer {
    addr: SocketAddr,
    auth_token: Option<String>,
    rate_limit: u32,
    max_body_size: usize,
    chat: Arc<dyn ChatService>,
    #[cfg(feature = "speech")]
    speech: Option<Arc<crate::voice::VoiceServices>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        chat: Arc<dyn ChatService>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        Self {
            addr,
            auth_token: None,
            rate_limit: 120,
            max_body_size: 1_048_576,
            chat,
            #[cfg(feature = "speech")]
            speech: None,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_auth(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, limit: u32) -> Self {
        self.rate_limit = limit;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    #[cfg(feature = "speech")]
    #[must_use]
    pub fn with_speech(mut self, speech: crate::voice::VoiceServices) -> Self {
        self.speech = Some(Arc::new(speech));
        self
    }

    /// Start the HTTP gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server hits
    /// a fatal I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        #[cfg(feature = "speech")]
        let state = {
            let mut state = AppState::new(self.chat);
            state.speech = self.speech;
            state
        };
        #[cfg(not(feature = "speech"))]
        let state = AppState::new(self.chat);

        let router = build_router(state, self.auth_token, self.rate_limit, self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("gateway listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            tracing::info!("gateway shutting down");
        })
        .await
        .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}
