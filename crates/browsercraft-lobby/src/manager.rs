//! Lobby manager: creates lobbies, places connections in them, and watches
//! lobby tasks for crashes.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};

use browsercraft_protocol::{Codec, LobbyId, PlayerId};
use browsercraft_session::OutboundTx;
use browsercraft_sim::Simulation;
use browsercraft_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::lobby::spawn_lobby;
use crate::{LobbyConfig, LobbyError, LobbyHandle, LobbyInfo};

/// A lobby task that ended by panicking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyFailure {
    pub lobby_id: LobbyId,
    pub reason: String,
}

impl std::fmt::Display for LobbyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lobby {} crashed: {}", self.lobby_id, self.reason)
    }
}

/// Where a successful join landed.
#[derive(Debug, Clone)]
pub struct Placement {
    pub lobby_id: LobbyId,
    pub player_id: PlayerId,
    /// Handle for sending the player's input and chat straight to its lobby.
    pub handle: LobbyHandle,
}

/// Owns every lobby and the connection → lobby index.
///
/// A connection belongs to at most one lobby at a time.
pub struct LobbyManager<S: Simulation, C: Codec> {
    config: LobbyConfig,
    sim_config: S::Config,
    codec: C,
    /// Ordered so matchmaking always tries the oldest lobby first.
    lobbies: BTreeMap<LobbyId, LobbyHandle>,
    members: HashMap<ConnectionId, LobbyId>,
    next_lobby_id: u64,
    failures_tx: mpsc::UnboundedSender<LobbyFailure>,
    failures_rx: Option<mpsc::UnboundedReceiver<LobbyFailure>>,
}

impl<S: Simulation, C: Codec> LobbyManager<S, C> {
    pub fn new(config: LobbyConfig, sim_config: S::Config, codec: C) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            config: config.validated(),
            sim_config,
            codec,
            lobbies: BTreeMap::new(),
            members: HashMap::new(),
            next_lobby_id: 0,
            failures_tx,
            failures_rx: Some(failures_rx),
        }
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    /// Takes the receiver of lobby crash reports. Only the first call gets it.
    pub fn take_failures(&mut self) -> Option<mpsc::UnboundedReceiver<LobbyFailure>> {
        self.failures_rx.take()
    }

    /// Spawns a new, empty lobby and returns its id.
    pub fn create(&mut self) -> LobbyId {
        self.next_lobby_id += 1;
        let lobby_id = LobbyId(self.next_lobby_id);
        let (handle, task) =
            spawn_lobby::<S, C>(lobby_id, self.config.clone(), &self.sim_config, self.codec.clone());
        supervise(lobby_id, task, self.failures_tx.clone());
        self.lobbies.insert(lobby_id, handle);
        info!(%lobby_id, lobbies = self.lobbies.len(), "lobby created");
        lobby_id
    }

    /// Places the connection in the first lobby with a free player slot,
    /// creating a lobby when all are full.
    ///
    /// A connection that already belongs to a lobby is sent back to that
    /// lobby, which rejects the second binding.
    pub async fn join_or_create(
        &mut self,
        connection: ConnectionId,
        name: &str,
        outbound: OutboundTx,
    ) -> Result<Placement, LobbyError> {
        if let Some(&lobby_id) = self.members.get(&connection) {
            return self.join(lobby_id, connection, name, outbound).await;
        }

        let candidates: Vec<LobbyHandle> = self.lobbies.values().cloned().collect();
        for handle in candidates {
            let Ok(info) = handle.info().await else {
                continue;
            };
            if !info.has_room() {
                continue;
            }
            match handle.join(connection, name, outbound.clone()).await {
                Ok(player_id) => return Ok(self.placed(connection, player_id, handle)),
                // Filled up or died since `info`; keep looking.
                Err(LobbyError::Full(_) | LobbyError::Unavailable(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let lobby_id = self.create();
        self.join(lobby_id, connection, name, outbound).await
    }

    /// Places the connection in a specific lobby.
    pub async fn join(
        &mut self,
        lobby_id: LobbyId,
        connection: ConnectionId,
        name: &str,
        outbound: OutboundTx,
    ) -> Result<Placement, LobbyError> {
        if let Some(&current) = self.members.get(&connection) {
            if current != lobby_id {
                return Err(LobbyError::AlreadyInLobby(connection, current));
            }
        }
        let handle = self
            .lobbies
            .get(&lobby_id)
            .cloned()
            .ok_or(LobbyError::NotFound(lobby_id))?;
        let player_id = handle.join(connection, name, outbound).await?;
        Ok(self.placed(connection, player_id, handle))
    }

    fn placed(&mut self, connection: ConnectionId, player_id: PlayerId, handle: LobbyHandle) -> Placement {
        let lobby_id = handle.lobby_id();
        self.members.insert(connection, lobby_id);
        Placement {
            lobby_id,
            player_id,
            handle,
        }
    }

    /// Removes the connection from its lobby. Returns the lobby it was in.
    pub async fn leave(&mut self, connection: ConnectionId) -> Option<LobbyId> {
        let lobby_id = self.members.remove(&connection)?;
        if let Some(handle) = self.lobbies.get(&lobby_id) {
            // A dead lobby has nothing left to clean up.
            let _ = handle.leave(connection).await;
        }
        Some(lobby_id)
    }

    pub fn lobby_of(&self, connection: ConnectionId) -> Option<LobbyId> {
        self.members.get(&connection).copied()
    }

    pub fn handle(&self, lobby_id: LobbyId) -> Option<&LobbyHandle> {
        self.lobbies.get(&lobby_id)
    }

    /// Info of every responsive lobby, oldest first.
    pub async fn list(&self) -> Vec<LobbyInfo> {
        let mut infos = Vec::with_capacity(self.lobbies.len());
        for handle in self.lobbies.values() {
            if let Ok(info) = handle.info().await {
                infos.push(info);
            }
        }
        infos
    }

    /// Shuts a lobby down and forgets its members.
    pub async fn destroy(&mut self, lobby_id: LobbyId) -> Result<(), LobbyError> {
        let handle = self
            .lobbies
            .remove(&lobby_id)
            .ok_or(LobbyError::NotFound(lobby_id))?;
        let _ = handle.shutdown().await;
        self.members.retain(|_, id| *id != lobby_id);
        info!(%lobby_id, lobbies = self.lobbies.len(), "lobby destroyed");
        Ok(())
    }

    /// Destroys lobbies without connections, always keeping at least one
    /// lobby. Dead lobbies are removed too. Returns the ids destroyed.
    pub async fn reap_empty(&mut self) -> Vec<LobbyId> {
        let mut doomed = Vec::new();
        let mut kept = 0usize;
        for (lobby_id, handle) in &self.lobbies {
            match handle.info().await {
                Ok(info) if info.connection_count > 0 => kept += 1,
                Ok(_) => doomed.push(*lobby_id),
                Err(_) => doomed.push(*lobby_id),
            }
        }
        if kept == 0 {
            // Keep the oldest live empty lobby.
            if let Some(pos) = doomed
                .iter()
                .position(|id| self.lobbies.get(id).is_some_and(|h| !h.is_closed()))
            {
                doomed.remove(pos);
            }
        }

        for lobby_id in &doomed {
            let _ = self.destroy(*lobby_id).await;
        }
        doomed
    }

    /// Shuts every lobby down.
    pub async fn shutdown_all(&mut self) {
        let ids: Vec<LobbyId> = self.lobbies.keys().copied().collect();
        for lobby_id in ids {
            let _ = self.destroy(lobby_id).await;
        }
    }

    pub fn lobby_count(&self) -> usize {
        self.lobbies.len()
    }

    pub fn lobby_ids(&self) -> Vec<LobbyId> {
        self.lobbies.keys().copied().collect()
    }
}

/// Watches a lobby task and reports a panic as a [`LobbyFailure`].
fn supervise(lobby_id: LobbyId, task: JoinHandle<()>, failures: mpsc::UnboundedSender<LobbyFailure>) {
    tokio::spawn(async move {
        let Err(join_error) = task.await else {
            return;
        };
        if !join_error.is_panic() {
            return;
        }
        let reason = panic_message(join_error.into_panic());
        error!(%lobby_id, %reason, "lobby task panicked");
        let _ = failures.send(LobbyFailure { lobby_id, reason });
    });
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic");
    }

    #[test]
    fn test_failure_display() {
        let failure = LobbyFailure {
            lobby_id: LobbyId(3),
            reason: "boom".into(),
        };
        assert_eq!(failure.to_string(), "lobby L-3 crashed: boom");
    }
}
