//! The lobby actor.
//!
//! A lobby is one Tokio task owning a connection registry, an input intake,
//! a simulation, a dispatcher and a tick scheduler. Everything reaches it
//! through a bounded command queue, and ticks fire in the same `select!`
//! loop, so the task is the only writer of all of that state.

use browsercraft_protocol::{ChatLine, Codec, LobbyId, PlayerId, RawIntent, ServerMessage};
use browsercraft_session::{ConnectionRegistry, InputIntake, OutboundTx, RegistryError};
use browsercraft_sim::Simulation;
use browsercraft_tick::{TickInfo, TickScheduler};
use browsercraft_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{BroadcastDispatcher, DispatchReport, LobbyConfig, LobbyError, SERVER_CHAT_NAME};

pub(crate) enum LobbyCommand {
    Join {
        connection: ConnectionId,
        name: String,
        outbound: OutboundTx,
        reply: oneshot::Sender<Result<PlayerId, LobbyError>>,
    },
    Input {
        connection: ConnectionId,
        intent: RawIntent,
    },
    Chat {
        connection: ConnectionId,
        text: String,
    },
    Leave {
        connection: ConnectionId,
    },
    Info {
        reply: oneshot::Sender<LobbyInfo>,
    },
    Shutdown,
}

/// Lobby metadata, not the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyInfo {
    pub lobby_id: LobbyId,
    /// Connections that own a player.
    pub player_count: usize,
    pub connection_count: usize,
    pub max_players: usize,
    /// Ticks fired so far.
    pub tick: u64,
    /// Chat lines relayed so far.
    pub chat_count: u64,
}

impl LobbyInfo {
    pub fn has_room(&self) -> bool {
        self.player_count < self.max_players
    }
}

/// Cheap, cloneable address of a running lobby.
#[derive(Debug, Clone)]
pub struct LobbyHandle {
    lobby_id: LobbyId,
    sender: mpsc::Sender<LobbyCommand>,
}

impl LobbyHandle {
    pub fn lobby_id(&self) -> LobbyId {
        self.lobby_id
    }

    /// `true` once the lobby task has exited.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Registers `connection` and binds a player named `name` to it.
    ///
    /// On success the lobby has already queued the join ack on `outbound`,
    /// ahead of any state update.
    pub async fn join(
        &self,
        connection: ConnectionId,
        name: impl Into<String>,
        outbound: OutboundTx,
    ) -> Result<PlayerId, LobbyError> {
        let (reply, rx) = oneshot::channel();
        self.send(LobbyCommand::Join {
            connection,
            name: name.into(),
            outbound,
            reply,
        })
        .await?;
        rx.await.map_err(|_| LobbyError::Unavailable(self.lobby_id))?
    }

    /// Queues a raw input intent. Fire-and-forget.
    pub async fn input(&self, connection: ConnectionId, intent: RawIntent) -> Result<(), LobbyError> {
        self.send(LobbyCommand::Input { connection, intent }).await
    }

    /// Queues a chat line. It is relayed as soon as the lobby dequeues it.
    pub async fn chat(&self, connection: ConnectionId, text: impl Into<String>) -> Result<(), LobbyError> {
        self.send(LobbyCommand::Chat {
            connection,
            text: text.into(),
        })
        .await
    }

    /// Removes the connection and its player. Safe to repeat.
    pub async fn leave(&self, connection: ConnectionId) -> Result<(), LobbyError> {
        self.send(LobbyCommand::Leave { connection }).await
    }

    pub async fn info(&self) -> Result<LobbyInfo, LobbyError> {
        let (reply, rx) = oneshot::channel();
        self.send(LobbyCommand::Info { reply }).await?;
        rx.await.map_err(|_| LobbyError::Unavailable(self.lobby_id))
    }

    pub async fn shutdown(&self) -> Result<(), LobbyError> {
        self.send(LobbyCommand::Shutdown).await
    }

    async fn send(&self, command: LobbyCommand) -> Result<(), LobbyError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| LobbyError::Unavailable(self.lobby_id))
    }
}

struct LobbyActor<S: Simulation, C: Codec> {
    lobby_id: LobbyId,
    config: LobbyConfig,
    registry: ConnectionRegistry,
    intake: InputIntake,
    sim: S,
    dispatcher: BroadcastDispatcher<C>,
    scheduler: TickScheduler,
    chat_order: u64,
    receiver: mpsc::Receiver<LobbyCommand>,
}

impl<S: Simulation, C: Codec> LobbyActor<S, C> {
    async fn run(mut self) {
        info!("lobby started");
        if let Err(e) = self.scheduler.start(self.config.tick_interval) {
            error!(error = %e, "tick scheduler failed to start");
            return;
        }

        loop {
            tokio::select! {
                command = self.receiver.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle_command(command) {
                        break;
                    }
                }
                tick = self.scheduler.wait_for_tick() => self.on_tick(tick),
            }
        }

        self.scheduler.stop();
        info!(players = self.registry.bound_count(), "lobby stopped");
    }

    /// Returns `false` when the lobby should stop.
    fn handle_command(&mut self, command: LobbyCommand) -> bool {
        match command {
            LobbyCommand::Join {
                connection,
                name,
                outbound,
                reply,
            } => {
                let result = self.handle_join(connection, &name, outbound);
                let _ = reply.send(result);
            }
            LobbyCommand::Input { connection, intent } => {
                if let Err(e) = self.intake.submit(&self.registry, connection, &intent) {
                    debug!(conn_id = %connection, error = %e, "input dropped");
                }
            }
            LobbyCommand::Chat { connection, text } => self.handle_chat(connection, &text),
            LobbyCommand::Leave { connection } => self.disconnect(connection),
            LobbyCommand::Info { reply } => {
                let _ = reply.send(self.info());
            }
            LobbyCommand::Shutdown => {
                info!("lobby shutting down");
                return false;
            }
        }
        true
    }

    fn handle_join(
        &mut self,
        connection: ConnectionId,
        name: &str,
        outbound: OutboundTx,
    ) -> Result<PlayerId, LobbyError> {
        let known = self.registry.get(connection).is_some();
        if !known && self.registry.bound_count() >= self.config.max_players {
            return Err(LobbyError::Full(self.lobby_id));
        }

        if let Some(player_id) = self.registry.player_of(connection) {
            return Err(RegistryError::DuplicateBinding(connection, player_id).into());
        }

        // The ack's slot is taken before binding, so a bound player always
        // receives its ack ahead of any state update.
        let permit = outbound
            .clone()
            .try_reserve_owned()
            .map_err(|_| LobbyError::Congested(connection))?;

        self.registry.register(connection, outbound);
        let player_id = self.registry.bind(connection, name)?.player_id;

        let ack = ServerMessage::<()>::JoinAck {
            player_id,
            lobby_id: self.lobby_id,
        };
        match self.dispatcher.encode_message(&ack) {
            Ok(frame) => {
                permit.send(frame);
            }
            Err(e) => error!(conn_id = %connection, error = %e, "join ack not encodable"),
        }
        if self.config.announce_joins {
            self.relay(SERVER_CHAT_NAME.to_owned(), format!("{name} joined the game"));
        }
        Ok(player_id)
    }

    fn handle_chat(&mut self, connection: ConnectionId, text: &str) {
        let Some(name) = self.registry.player_name(connection) else {
            debug!(conn_id = %connection, "chat from unbound connection dropped");
            return;
        };
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let name = name.to_owned();
        let message = text.chars().take(self.config.max_chat_len).collect();
        let order = self.relay(name, message);
        debug!(conn_id = %connection, order, "chat relayed");
    }

    /// Stamps the next receipt order on a chat line and sends it to every
    /// connection. Returns the order.
    fn relay(&mut self, name: String, message: String) -> u64 {
        self.chat_order += 1;
        let line = ChatLine {
            name,
            message,
            order: self.chat_order,
        };
        match self.dispatcher.relay_chat(&self.registry, &line) {
            Ok(report) => self.drop_failed(report),
            Err(e) => error!(error = %e, "chat line not encodable"),
        }
        line.order
    }

    fn on_tick(&mut self, tick: TickInfo) {
        let frame = self.intake.drain_all(&self.registry);
        let snapshot = self.sim.advance(&frame, tick.dt);
        self.scheduler.record_tick_end();

        match self.dispatcher.broadcast_state(&self.registry, tick.tick, &snapshot) {
            Ok(report) => self.drop_failed(report),
            Err(e) => error!(tick = tick.tick, error = %e, "snapshot not encodable"),
        }
    }

    /// Disconnects every connection whose outbound queue turned out closed.
    fn drop_failed(&mut self, report: DispatchReport) {
        for connection in report.failed {
            warn!(conn_id = %connection, "send failure, disconnecting");
            self.disconnect(connection);
        }
    }

    /// Unregisters the connection. Its player is absent from the next tick.
    fn disconnect(&mut self, connection: ConnectionId) {
        let Some(handle) = self.registry.unregister(connection) else {
            return;
        };
        if let Some(binding) = handle.binding() {
            self.intake.forget(binding.player_id);
            info!(
                conn_id = %connection,
                player_id = %binding.player_id,
                players = self.registry.bound_count(),
                "player left lobby"
            );
            if self.config.announce_joins {
                let notice = format!("{} left the game", binding.name);
                self.relay(SERVER_CHAT_NAME.to_owned(), notice);
            }
        }
    }

    fn info(&self) -> LobbyInfo {
        LobbyInfo {
            lobby_id: self.lobby_id,
            player_count: self.registry.bound_count(),
            connection_count: self.registry.len(),
            max_players: self.config.max_players,
            tick: self.scheduler.tick_count(),
            chat_count: self.chat_order,
        }
    }
}

/// Spawns a lobby task. The returned `JoinHandle` resolves when the task
/// ends; a panic inside the simulation surfaces there as a `JoinError`.
pub(crate) fn spawn_lobby<S: Simulation, C: Codec>(
    lobby_id: LobbyId,
    config: LobbyConfig,
    sim_config: &S::Config,
    codec: C,
) -> (LobbyHandle, JoinHandle<()>) {
    let config = config.validated();
    let (tx, rx) = mpsc::channel(config.command_capacity);

    let actor = LobbyActor::<S, C> {
        lobby_id,
        registry: ConnectionRegistry::new(),
        intake: InputIntake::new(),
        sim: S::new(sim_config),
        dispatcher: BroadcastDispatcher::new(codec, lobby_id),
        scheduler: TickScheduler::new(config.tick.clone()),
        chat_order: 0,
        receiver: rx,
        config,
    };

    let span = info_span!("lobby", lobby_id = %lobby_id);
    let task = tokio::spawn(actor.run().instrument(span));

    (
        LobbyHandle {
            lobby_id,
            sender: tx,
        },
        task,
    )
}
