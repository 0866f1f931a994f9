//! `BrowsercraftServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → lobby manager.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use browsercraft_lobby::{LobbyConfig, LobbyFailure, LobbyManager};
use browsercraft_protocol::{Codec, JsonCodec};
use browsercraft_session::{AccountService, IdentitySession};
use browsercraft_sim::Simulation;
use browsercraft_transport::{Transport, WebSocketTransport};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::BrowsercraftError;
use crate::config::ServerConfig;
use crate::handler::serve;

/// How long a socket may take to finish its WebSocket upgrade.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How often empty lobbies are collected.
pub const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Knobs the connection handler reads.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HandlerSettings {
    pub(crate) allow_guests: bool,
    pub(crate) idle_timeout: Duration,
    pub(crate) handshake_timeout: Duration,
    pub(crate) outbound_capacity: usize,
}

/// State shared by every connection task.
pub(crate) struct ServerState<S: Simulation, A, I, C: Codec> {
    pub(crate) lobbies: Mutex<LobbyManager<S, C>>,
    pub(crate) accounts: A,
    pub(crate) identity: I,
    pub(crate) codec: C,
    pub(crate) settings: HandlerSettings,
    started: Instant,
}

impl<S: Simulation, A, I, C: Codec> ServerState<S, A, I, C> {
    /// Milliseconds since the server started.
    pub(crate) fn server_time_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Builder for configuring and starting a Browsercraft server.
///
/// ```rust,ignore
/// use browsercraft::prelude::*;
///
/// let server = BrowsercraftServerBuilder::new()
///     .bind("0.0.0.0:5000")
///     .build::<World>(InMemoryAccounts::new(), InMemorySessions::new())
///     .await?;
/// server.run().await
/// ```
#[derive(Debug, Clone)]
pub struct BrowsercraftServerBuilder {
    bind_addr: String,
    lobby_config: LobbyConfig,
    allow_guests: bool,
    idle_timeout: Duration,
    handshake_timeout: Duration,
}

impl BrowsercraftServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            lobby_config: LobbyConfig::default(),
            allow_guests: true,
            idle_timeout: Duration::from_secs(30),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Takes every setting from a parsed [`ServerConfig`].
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new()
            .bind(&config.bind_addr())
            .lobby_config(config.lobby_config())
            .allow_guests(config.allow_guests)
            .idle_timeout(config.idle_timeout())
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn lobby_config(mut self, config: LobbyConfig) -> Self {
        self.lobby_config = config;
        self
    }

    pub fn allow_guests(mut self, allow: bool) -> Self {
        self.allow_guests = allow;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Binds the listener with the simulation's default configuration.
    pub async fn build<S: Simulation>(
        self,
        accounts: impl AccountService,
        identity: impl IdentitySession,
    ) -> Result<BrowsercraftServer<S, impl AccountService, impl IdentitySession, JsonCodec>, BrowsercraftError>
    {
        self.build_with::<S, _, _>(S::Config::default(), accounts, identity)
            .await
    }

    /// Binds the listener. Uses `JsonCodec` over `WebSocketTransport`.
    pub async fn build_with<S, A, I>(
        self,
        sim_config: S::Config,
        accounts: A,
        identity: I,
    ) -> Result<BrowsercraftServer<S, A, I, JsonCodec>, BrowsercraftError>
    where
        S: Simulation,
        A: AccountService,
        I: IdentitySession,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let lobby_config = self.lobby_config.validated();
        let settings = HandlerSettings {
            allow_guests: self.allow_guests,
            idle_timeout: self.idle_timeout,
            handshake_timeout: self.handshake_timeout,
            outbound_capacity: lobby_config.outbound_capacity,
        };
        let mut manager = LobbyManager::new(lobby_config, sim_config, JsonCodec);
        let failures = manager.take_failures();

        let state = Arc::new(ServerState {
            lobbies: Mutex::new(manager),
            accounts,
            identity,
            codec: JsonCodec,
            settings,
            started: Instant::now(),
        });

        Ok(BrowsercraftServer {
            transport,
            state,
            failures,
        })
    }
}

impl Default for BrowsercraftServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Browsercraft server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct BrowsercraftServer<S: Simulation, A, I, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, A, I, C>>,
    failures: Option<mpsc::UnboundedReceiver<LobbyFailure>>,
}

impl<S, A, I, C> BrowsercraftServer<S, A, I, C>
where
    S: Simulation,
    A: AccountService,
    I: IdentitySession,
    C: Codec,
{
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop until a lobby crashes.
    pub async fn run(self) -> Result<(), BrowsercraftError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves or a lobby crashes.
    ///
    /// Either way every lobby is told to stop before this returns. A crash
    /// is returned as [`BrowsercraftError::LobbyFailed`].
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), BrowsercraftError> {
        info!(addr = ?self.local_addr().ok(), "Browsercraft server running");
        tokio::pin!(shutdown);

        let mut failures = self.failures.take();
        let mut reap = tokio::time::interval(REAP_INTERVAL);
        reap.tick().await;

        let outcome = loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = serve(pending, state).await {
                                debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                Some(failure) = next_failure(&mut failures) => {
                    error!(%failure, "lobby failure, stopping server");
                    break Err(BrowsercraftError::LobbyFailed(failure));
                }
                _ = reap.tick() => {
                    let reaped = self.state.lobbies.lock().await.reap_empty().await;
                    if !reaped.is_empty() {
                        debug!(count = reaped.len(), "reaped empty lobbies");
                    }
                }
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break Ok(());
                }
            }
        };

        self.state.lobbies.lock().await.shutdown_all().await;
        outcome
    }
}

/// Waits for the next lobby failure, or forever if nobody reports them.
async fn next_failure(
    failures: &mut Option<mpsc::UnboundedReceiver<LobbyFailure>>,
) -> Option<LobbyFailure> {
    match failures {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
