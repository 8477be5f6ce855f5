//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::directory::EmbedDirectory;
use crate::embed::EmbedService;
use crate::identity::{IdentityClient, SessionStore};
use crate::platform::PlatformClient;
use crate::{Error, Result};

/// How often idle sessions are swept
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// hubsync gateway server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Shared handler state
    state: Arc<AppState>,
}

impl Gateway {
    /// Create a gateway, loading the embed directory from `config.directory.path`
    pub fn new(config: Config) -> Result<Self> {
        let directory = EmbedDirectory::load(&config.directory.path)?;
        Self::with_directory(config, directory)
    }

    /// Create a gateway around an already loaded directory
    pub fn with_directory(config: Config, directory: EmbedDirectory) -> Result<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.platform.http_timeout)
            .build()?;

        let platform = PlatformClient::with_http_client(http_client.clone(), &config.platform);
        let embeds = Arc::new(EmbedService::with_client(
            platform,
            &config.platform,
            Arc::new(directory),
        ));

        let identity = if config.identity_configured() {
            Some(IdentityClient::new(http_client, &config.identity))
        } else {
            warn!("Identity provider not configured - login routes disabled");
            None
        };

        let state = Arc::new(AppState {
            embeds,
            identity,
            sessions: Arc::new(SessionStore::new(config.session.ttl)),
            session: config.session.clone(),
            redirect_path: config.identity.redirect_path.clone(),
            public_url: config.server.public_url.clone(),
            request_timeout: config.server.request_timeout,
        });

        Ok(Self { config, state })
    }

    /// Shared handler state
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the gateway until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        let app = create_router(Arc::clone(&self.state));
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("HUBSYNC v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(
            entries = self.state.embeds.directory().len(),
            users = self.state.embeds.directory().user_count(),
            "Embed directory"
        );
        info!(
            api_host = %self.config.platform.api_host,
            embed_host = %self.config.platform.embed_host,
            card_target = %self.config.platform.card_target,
            "Analytics platform"
        );
        if self.state.identity.is_some() {
            info!(
                tenant = %self.config.identity.tenant_id,
                callback = %self.config.identity.redirect_path,
                "Identity provider"
            );
        }
        info!("============================================================");

        // Sweep idle sessions
        let sessions = Arc::clone(&self.state.sessions);
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let purged = sessions.purge_expired();
                        if purged > 0 {
                            debug!(purged, remaining = sessions.len(), "Purged idle sessions");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
