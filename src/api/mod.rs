//! HTTP API server for the voice front-end
//!
//! Serves published audio to remote renderers and accepts local
//! announcements. Announcements are only queued here; the daemon's main loop
//! speaks them.

pub mod health;
pub mod media;
pub mod speak;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::voice::MediaStore;

pub use speak::SpeakRequest;

/// Pending announcements before `/speak` starts refusing
pub const SPEAK_QUEUE_CAPACITY: usize = 16;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Audio currently published for renderers
    pub media: Arc<MediaStore>,
    /// Announcements forwarded to the daemon
    pub speak_tx: mpsc::Sender<SpeakRequest>,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    port: u16,
    media: Arc<MediaStore>,
    speak_tx: mpsc::Sender<SpeakRequest>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(port: u16, media: Arc<MediaStore>, speak_tx: mpsc::Sender<SpeakRequest>) -> Self {
        Self {
            port,
            media,
            speak_tx,
        }
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        ApiServer {
            port: self.port,
            state: Arc::new(ApiState {
                media: self.media,
                speak_tx: self.speak_tx,
            }),
        }
    }
}

/// HTTP API server
pub struct ApiServer {
    port: u16,
    state: Arc<ApiState>,
}

impl ApiServer {
    /// Build the router with every route and the trace layer
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .merge(health::router())
            .merge(speak::router(Arc::clone(&self.state)))
            .merge(media::router(Arc::clone(&self.state)))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the listening socket
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("0.0.0.0:{}", self.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server on {addr}: {e}")))
    }

    /// Serve requests on an already bound listener
    ///
    /// # Errors
    ///
    /// Returns error if the server stops on an I/O failure
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(port = addr.port(), "API server listening");
        }

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Bind, then serve in a background task
    ///
    /// A port that is already taken is reported here rather than lost in
    /// the task. A server that stops later is logged.
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound
    pub async fn spawn(self) -> Result<tokio::task::JoinHandle<()>> {
        let listener = self.bind().await?;
        Ok(tokio::spawn(async move {
            if let Err(e) = self.serve(listener).await {
                tracing::error!(error = %e, "API server stopped");
            }
        }))
    }
}
